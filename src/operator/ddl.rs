use crate::expr::AttributeReference;
use crate::operator::{PhysicalOperatorTrait, PhysicalType};
use crate::plan::PlanNodeRef;
use crate::stat::RelationRef;

#[derive(Clone, Debug, PartialEq)]
pub struct CreateTable {
    relation_name: String,
    attributes: Vec<AttributeReference>,
}

impl CreateTable {
    pub fn new<S: Into<String>>(relation_name: S, attributes: Vec<AttributeReference>) -> Self {
        Self {
            relation_name: relation_name.into(),
            attributes,
        }
    }

    pub fn relation_name(&self) -> &str {
        &self.relation_name
    }

    pub fn attributes(&self) -> &[AttributeReference] {
        &self.attributes
    }
}

impl PhysicalOperatorTrait for CreateTable {
    fn physical_type(&self) -> PhysicalType {
        PhysicalType::CreateTable
    }

    fn output_attributes(&self, _inputs: &[PlanNodeRef]) -> Vec<AttributeReference> {
        vec![]
    }

    fn referenced_attributes(&self, _inputs: &[PlanNodeRef]) -> Vec<AttributeReference> {
        vec![]
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DropTable {
    relation: RelationRef,
}

impl DropTable {
    pub fn new(relation: RelationRef) -> Self {
        Self { relation }
    }

    pub fn relation(&self) -> &RelationRef {
        &self.relation
    }
}

impl PhysicalOperatorTrait for DropTable {
    fn physical_type(&self) -> PhysicalType {
        PhysicalType::DropTable
    }

    fn output_attributes(&self, _inputs: &[PlanNodeRef]) -> Vec<AttributeReference> {
        vec![]
    }

    fn referenced_attributes(&self, _inputs: &[PlanNodeRef]) -> Vec<AttributeReference> {
        vec![]
    }
}
