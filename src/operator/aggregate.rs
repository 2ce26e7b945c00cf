use crate::expr::{to_refs, Alias, AttributeReference, NamedExpression, Predicate};
use crate::operator::{input_output_attributes, PhysicalOperatorTrait, PhysicalType};
use crate::plan::PlanNodeRef;
use crate::properties::BloomFilterConfig;

#[derive(Clone, Debug, PartialEq)]
pub struct Aggregate {
    grouping_expressions: Vec<NamedExpression>,
    aggregate_expressions: Vec<Alias>,
    filter_predicate: Option<Predicate>,
    bloom_filter_config: Option<BloomFilterConfig>,
}

impl Aggregate {
    pub fn new(
        grouping_expressions: Vec<NamedExpression>,
        aggregate_expressions: Vec<Alias>,
        filter_predicate: Option<Predicate>,
    ) -> Self {
        Self {
            grouping_expressions,
            aggregate_expressions,
            filter_predicate,
            bloom_filter_config: None,
        }
    }

    pub fn with_bloom_filter_config(mut self, config: BloomFilterConfig) -> Self {
        self.bloom_filter_config = Some(config);
        self
    }

    pub fn with_aggregate_expressions(&self, aggregate_expressions: Vec<Alias>) -> Self {
        Self {
            aggregate_expressions,
            ..self.clone()
        }
    }

    pub fn grouping_expressions(&self) -> &[NamedExpression] {
        &self.grouping_expressions
    }

    pub fn aggregate_expressions(&self) -> &[Alias] {
        &self.aggregate_expressions
    }

    pub fn filter_predicate(&self) -> Option<&Predicate> {
        self.filter_predicate.as_ref()
    }

    pub fn bloom_filter_config(&self) -> Option<&BloomFilterConfig> {
        self.bloom_filter_config.as_ref()
    }
}

impl PhysicalOperatorTrait for Aggregate {
    fn physical_type(&self) -> PhysicalType {
        PhysicalType::Aggregate
    }

    fn output_attributes(&self, _inputs: &[PlanNodeRef]) -> Vec<AttributeReference> {
        let mut attributes = to_refs(&self.grouping_expressions);
        attributes.extend(
            self.aggregate_expressions
                .iter()
                .map(|alias| NamedExpression::Alias(alias.clone()).to_ref()),
        );
        attributes
    }

    fn referenced_attributes(&self, _inputs: &[PlanNodeRef]) -> Vec<AttributeReference> {
        let mut attributes = Vec::new();
        for expr in &self.grouping_expressions {
            attributes.extend(expr.referenced_attributes());
        }
        for alias in &self.aggregate_expressions {
            attributes.extend(alias.expr().referenced_attributes());
        }
        if let Some(predicate) = &self.filter_predicate {
            attributes.extend(predicate.referenced_attributes());
        }
        attributes
    }
}

/// Aggregation keyed by the (dense, integer) key of a group-by table, over rows of a second
/// input that reference it. Inputs are `[group_by_table, input]`.
#[derive(Clone, Debug, PartialEq)]
pub struct CrossReferenceCoalesceAggregate {
    left_join_attributes: Vec<AttributeReference>,
    right_join_attributes: Vec<AttributeReference>,
    right_filter_predicate: Option<Predicate>,
    aggregate_expressions: Vec<Alias>,
    group_by_key_value_range: usize,
}

impl CrossReferenceCoalesceAggregate {
    pub fn new(
        left_join_attributes: Vec<AttributeReference>,
        right_join_attributes: Vec<AttributeReference>,
        right_filter_predicate: Option<Predicate>,
        aggregate_expressions: Vec<Alias>,
        group_by_key_value_range: usize,
    ) -> Self {
        Self {
            left_join_attributes,
            right_join_attributes,
            right_filter_predicate,
            aggregate_expressions,
            group_by_key_value_range,
        }
    }

    pub fn left_join_attributes(&self) -> &[AttributeReference] {
        &self.left_join_attributes
    }

    pub fn right_join_attributes(&self) -> &[AttributeReference] {
        &self.right_join_attributes
    }

    pub fn right_filter_predicate(&self) -> Option<&Predicate> {
        self.right_filter_predicate.as_ref()
    }

    pub fn aggregate_expressions(&self) -> &[Alias] {
        &self.aggregate_expressions
    }

    pub fn group_by_key_value_range(&self) -> usize {
        self.group_by_key_value_range
    }
}

impl PhysicalOperatorTrait for CrossReferenceCoalesceAggregate {
    fn physical_type(&self) -> PhysicalType {
        PhysicalType::CrossReferenceCoalesceAggregate
    }

    fn output_attributes(&self, inputs: &[PlanNodeRef]) -> Vec<AttributeReference> {
        let mut attributes = input_output_attributes(inputs);
        attributes.extend(
            self.aggregate_expressions
                .iter()
                .map(|alias| NamedExpression::Alias(alias.clone()).to_ref()),
        );
        attributes
    }

    fn referenced_attributes(&self, inputs: &[PlanNodeRef]) -> Vec<AttributeReference> {
        let mut attributes = input_output_attributes(inputs);
        attributes.extend(self.left_join_attributes.iter().cloned());
        attributes.extend(self.right_join_attributes.iter().cloned());
        if let Some(predicate) = &self.right_filter_predicate {
            attributes.extend(predicate.referenced_attributes());
        }
        for alias in &self.aggregate_expressions {
            attributes.extend(alias.expr().referenced_attributes());
        }
        attributes
    }
}
