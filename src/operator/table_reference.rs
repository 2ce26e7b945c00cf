use crate::expr::AttributeReference;
use crate::operator::{PhysicalOperatorTrait, PhysicalType};
use crate::plan::PlanNodeRef;
use crate::stat::RelationRef;

/// Scan of a stored relation. The output shape is fixed by the catalog.
#[derive(Clone, Debug, PartialEq)]
pub struct TableReference {
    relation: RelationRef,
    alias: String,
    attribute_list: Vec<AttributeReference>,
}

impl TableReference {
    pub fn new<S: Into<String>>(
        relation: RelationRef,
        alias: S,
        attribute_list: Vec<AttributeReference>,
    ) -> Self {
        Self {
            relation,
            alias: alias.into(),
            attribute_list,
        }
    }

    pub fn relation(&self) -> &RelationRef {
        &self.relation
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn attribute_list(&self) -> &[AttributeReference] {
        &self.attribute_list
    }

    /// Catalog column name of one of this scan's attributes.
    pub fn column_name(&self, attr: &AttributeReference) -> Option<&str> {
        self.attribute_list
            .iter()
            .position(|a| a.id() == attr.id())
            .and_then(|idx| self.relation.columns().get(idx))
            .map(|(name, _)| name.as_str())
    }
}

impl PhysicalOperatorTrait for TableReference {
    fn physical_type(&self) -> PhysicalType {
        PhysicalType::TableReference
    }

    fn name(&self) -> String {
        format!("TableReference({})", self.relation.name())
    }

    fn output_attributes(&self, _inputs: &[PlanNodeRef]) -> Vec<AttributeReference> {
        self.attribute_list.clone()
    }

    fn referenced_attributes(&self, _inputs: &[PlanNodeRef]) -> Vec<AttributeReference> {
        vec![]
    }
}
