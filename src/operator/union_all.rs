use crate::expr::AttributeReference;
use crate::operator::{PhysicalOperatorTrait, PhysicalType};
use crate::plan::PlanNodeRef;

/// Bag union of its operands. The i-th project attribute is the i-th output column of every
/// operand.
#[derive(Clone, Debug, PartialEq)]
pub struct UnionAll {
    project_attributes: Vec<AttributeReference>,
}

impl UnionAll {
    pub fn new(project_attributes: Vec<AttributeReference>) -> Self {
        Self { project_attributes }
    }

    pub fn project_attributes(&self) -> &[AttributeReference] {
        &self.project_attributes
    }
}

impl PhysicalOperatorTrait for UnionAll {
    fn physical_type(&self) -> PhysicalType {
        PhysicalType::UnionAll
    }

    fn output_attributes(&self, _inputs: &[PlanNodeRef]) -> Vec<AttributeReference> {
        self.project_attributes.clone()
    }

    fn referenced_attributes(&self, inputs: &[PlanNodeRef]) -> Vec<AttributeReference> {
        inputs
            .iter()
            .flat_map(|operand| operand.output_attributes())
            .collect()
    }
}
