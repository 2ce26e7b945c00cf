use crate::expr::{to_refs, AttributeReference, NamedExpression, Predicate};
use crate::operator::{PhysicalOperatorTrait, PhysicalType};
use crate::plan::PlanNodeRef;
use crate::properties::BloomFilterConfig;

/// Filter and projection over a single input.
#[derive(Clone, Debug, PartialEq)]
pub struct Selection {
    project_expressions: Vec<NamedExpression>,
    filter_predicate: Option<Predicate>,
    bloom_filter_config: Option<BloomFilterConfig>,
}

impl Selection {
    pub fn new(project_expressions: Vec<NamedExpression>, filter_predicate: Option<Predicate>) -> Self {
        Self {
            project_expressions,
            filter_predicate,
            bloom_filter_config: None,
        }
    }

    pub fn with_bloom_filter_config(mut self, config: BloomFilterConfig) -> Self {
        self.bloom_filter_config = Some(config);
        self
    }

    pub fn with_project_expressions(&self, project_expressions: Vec<NamedExpression>) -> Self {
        Self {
            project_expressions,
            ..self.clone()
        }
    }

    pub fn project_expressions(&self) -> &[NamedExpression] {
        &self.project_expressions
    }

    pub fn filter_predicate(&self) -> Option<&Predicate> {
        self.filter_predicate.as_ref()
    }

    pub fn bloom_filter_config(&self) -> Option<&BloomFilterConfig> {
        self.bloom_filter_config.as_ref()
    }
}

impl PhysicalOperatorTrait for Selection {
    fn physical_type(&self) -> PhysicalType {
        PhysicalType::Selection
    }

    fn output_attributes(&self, _inputs: &[PlanNodeRef]) -> Vec<AttributeReference> {
        to_refs(&self.project_expressions)
    }

    fn referenced_attributes(&self, _inputs: &[PlanNodeRef]) -> Vec<AttributeReference> {
        let mut attributes = Vec::new();
        for expr in &self.project_expressions {
            attributes.extend(expr.referenced_attributes());
        }
        if let Some(predicate) = &self.filter_predicate {
            attributes.extend(predicate.referenced_attributes());
        }
        attributes
    }
}
