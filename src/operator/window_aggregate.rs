use crate::expr::{Alias, AttributeReference, NamedExpression};
use crate::operator::{input_output_attributes, PhysicalOperatorTrait, PhysicalType};
use crate::plan::PlanNodeRef;

/// Appends one windowed aggregate column to every input row.
#[derive(Clone, Debug, PartialEq)]
pub struct WindowAggregate {
    window_aggregate_expression: Alias,
}

impl WindowAggregate {
    pub fn new(window_aggregate_expression: Alias) -> Self {
        Self {
            window_aggregate_expression,
        }
    }

    pub fn window_aggregate_expression(&self) -> &Alias {
        &self.window_aggregate_expression
    }
}

impl PhysicalOperatorTrait for WindowAggregate {
    fn physical_type(&self) -> PhysicalType {
        PhysicalType::WindowAggregate
    }

    fn output_attributes(&self, inputs: &[PlanNodeRef]) -> Vec<AttributeReference> {
        let mut attributes = input_output_attributes(inputs);
        attributes.push(NamedExpression::Alias(self.window_aggregate_expression.clone()).to_ref());
        attributes
    }

    fn referenced_attributes(&self, inputs: &[PlanNodeRef]) -> Vec<AttributeReference> {
        input_output_attributes(inputs)
    }
}
