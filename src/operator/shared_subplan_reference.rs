use crate::expr::AttributeReference;
use crate::operator::{PhysicalOperatorTrait, PhysicalType};
use crate::plan::PlanNodeRef;

/// Leaf reading the output of a shared subplan of the enclosing top level plan.
///
/// `referenced_attributes` are the subplan's output attributes; `output_attributes` are the
/// (possibly renamed) attributes this reference exposes, position by position.
#[derive(Clone, Debug, PartialEq)]
pub struct SharedSubplanReference {
    subplan_id: usize,
    referenced_attributes: Vec<AttributeReference>,
    output_attributes: Vec<AttributeReference>,
}

impl SharedSubplanReference {
    pub fn new(
        subplan_id: usize,
        referenced_attributes: Vec<AttributeReference>,
        output_attributes: Vec<AttributeReference>,
    ) -> Self {
        assert_eq!(referenced_attributes.len(), output_attributes.len());
        Self {
            subplan_id,
            referenced_attributes,
            output_attributes,
        }
    }

    /// Index into the top level plan's shared subplans.
    pub fn subplan_id(&self) -> usize {
        self.subplan_id
    }
}

impl PhysicalOperatorTrait for SharedSubplanReference {
    fn physical_type(&self) -> PhysicalType {
        PhysicalType::SharedSubplanReference
    }

    fn name(&self) -> String {
        format!("SharedSubplanReference({})", self.subplan_id)
    }

    fn output_attributes(&self, _inputs: &[PlanNodeRef]) -> Vec<AttributeReference> {
        self.output_attributes.clone()
    }

    fn referenced_attributes(&self, _inputs: &[PlanNodeRef]) -> Vec<AttributeReference> {
        self.referenced_attributes.clone()
    }
}
