use crate::expr::AttributeReference;
use crate::operator::{input_output_attributes, PhysicalOperatorTrait, PhysicalType};
use crate::plan::PlanNodeRef;
use crate::properties::LipFilterConfiguration;

/// Root of every physical plan. Inputs are `[plan, shared_subplans...]`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TopLevelPlan {
    lip_filter_configuration: Option<LipFilterConfiguration>,
}

impl TopLevelPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lip_filter_configuration(configuration: LipFilterConfiguration) -> Self {
        Self {
            lip_filter_configuration: Some(configuration),
        }
    }

    pub fn lip_filter_configuration(&self) -> Option<&LipFilterConfiguration> {
        self.lip_filter_configuration.as_ref()
    }
}

impl PhysicalOperatorTrait for TopLevelPlan {
    fn physical_type(&self) -> PhysicalType {
        PhysicalType::TopLevelPlan
    }

    fn output_attributes(&self, inputs: &[PlanNodeRef]) -> Vec<AttributeReference> {
        input_output_attributes(inputs)
    }

    fn referenced_attributes(&self, inputs: &[PlanNodeRef]) -> Vec<AttributeReference> {
        input_output_attributes(inputs)
    }
}
