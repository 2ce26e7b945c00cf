use crate::expr::AttributeReference;
use crate::operator::{input_output_attributes, PhysicalOperatorTrait, PhysicalType};
use crate::plan::PlanNodeRef;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sample {
    is_block_sample: bool,
    percentage: u32,
}

impl Sample {
    pub fn new(is_block_sample: bool, percentage: u32) -> Self {
        assert!(percentage <= 100, "sample percentage {} above 100", percentage);
        Self {
            is_block_sample,
            percentage,
        }
    }

    pub fn is_block_sample(&self) -> bool {
        self.is_block_sample
    }

    pub fn percentage(&self) -> u32 {
        self.percentage
    }
}

impl PhysicalOperatorTrait for Sample {
    fn physical_type(&self) -> PhysicalType {
        PhysicalType::Sample
    }

    fn output_attributes(&self, inputs: &[PlanNodeRef]) -> Vec<AttributeReference> {
        input_output_attributes(inputs)
    }

    fn referenced_attributes(&self, inputs: &[PlanNodeRef]) -> Vec<AttributeReference> {
        input_output_attributes(inputs)
    }
}
