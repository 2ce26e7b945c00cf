use crate::expr::AttributeReference;
use crate::operator::{PhysicalOperatorTrait, PhysicalType};
use crate::plan::PlanNodeRef;

/// A table function such as `generate_series`.
#[derive(Clone, Debug, PartialEq)]
pub struct TableGenerator {
    generator_name: String,
    table_alias: String,
    attribute_list: Vec<AttributeReference>,
    estimated_cardinality: usize,
}

impl TableGenerator {
    pub fn new<S: Into<String>, A: Into<String>>(
        generator_name: S,
        table_alias: A,
        attribute_list: Vec<AttributeReference>,
        estimated_cardinality: usize,
    ) -> Self {
        Self {
            generator_name: generator_name.into(),
            table_alias: table_alias.into(),
            attribute_list,
            estimated_cardinality,
        }
    }

    pub fn generator_name(&self) -> &str {
        &self.generator_name
    }

    pub fn table_alias(&self) -> &str {
        &self.table_alias
    }

    pub fn attribute_list(&self) -> &[AttributeReference] {
        &self.attribute_list
    }

    pub fn estimated_cardinality(&self) -> usize {
        self.estimated_cardinality
    }
}

impl PhysicalOperatorTrait for TableGenerator {
    fn physical_type(&self) -> PhysicalType {
        PhysicalType::TableGenerator
    }

    fn name(&self) -> String {
        format!("TableGenerator({})", self.generator_name)
    }

    fn output_attributes(&self, _inputs: &[PlanNodeRef]) -> Vec<AttributeReference> {
        self.attribute_list.clone()
    }

    fn referenced_attributes(&self, _inputs: &[PlanNodeRef]) -> Vec<AttributeReference> {
        vec![]
    }
}
