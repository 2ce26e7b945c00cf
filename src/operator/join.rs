use anyhow::ensure;
use enumset::EnumSetType;
use strum_macros::Display as StrumDisplay;

use crate::error::{OptError, OptResult};
use crate::expr::{to_refs, AttributeReference, NamedExpression, Predicate};
use crate::operator::{PhysicalOperatorTrait, PhysicalType};
use crate::plan::PlanNodeRef;
use crate::properties::BloomFilterConfig;

#[derive(EnumSetType, Debug, Hash, StrumDisplay)]
pub enum JoinType {
    Inner,
    LeftSemi,
    LeftAnti,
    LeftOuter,
}

/// Hash join with the left input as probe side and the right input as build side.
#[derive(Clone, Debug, PartialEq)]
pub struct HashJoin {
    left_join_attributes: Vec<AttributeReference>,
    right_join_attributes: Vec<AttributeReference>,
    residual_predicate: Option<Predicate>,
    /// Filter over the build side evaluated while building the hash table.
    build_predicate: Option<Predicate>,
    project_expressions: Vec<NamedExpression>,
    join_type: JoinType,
    bloom_filter_config: Option<BloomFilterConfig>,
}

impl HashJoin {
    pub fn create(
        left_join_attributes: Vec<AttributeReference>,
        right_join_attributes: Vec<AttributeReference>,
        residual_predicate: Option<Predicate>,
        project_expressions: Vec<NamedExpression>,
        join_type: JoinType,
    ) -> OptResult<Self> {
        ensure!(
            left_join_attributes.len() == right_join_attributes.len(),
            OptError::InvalidPlan(format!(
                "hash join has {} left join attributes but {} right join attributes",
                left_join_attributes.len(),
                right_join_attributes.len()
            ))
        );
        Ok(Self::new(
            left_join_attributes,
            right_join_attributes,
            residual_predicate,
            project_expressions,
            join_type,
        ))
    }

    /// Unchecked constructor for rules that derive join attributes pairwise.
    pub(crate) fn new(
        left_join_attributes: Vec<AttributeReference>,
        right_join_attributes: Vec<AttributeReference>,
        residual_predicate: Option<Predicate>,
        project_expressions: Vec<NamedExpression>,
        join_type: JoinType,
    ) -> Self {
        debug_assert_eq!(left_join_attributes.len(), right_join_attributes.len());
        Self {
            left_join_attributes,
            right_join_attributes,
            residual_predicate,
            build_predicate: None,
            project_expressions,
            join_type,
            bloom_filter_config: None,
        }
    }

    pub fn with_build_predicate(mut self, build_predicate: Option<Predicate>) -> Self {
        self.build_predicate = build_predicate;
        self
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

    pub fn left_join_attributes(&self) -> &[AttributeReference] {
        &self.left_join_attributes
    }

    pub fn right_join_attributes(&self) -> &[AttributeReference] {
        &self.right_join_attributes
    }

    pub fn residual_predicate(&self) -> Option<&Predicate> {
        self.residual_predicate.as_ref()
    }

    pub fn build_predicate(&self) -> Option<&Predicate> {
        self.build_predicate.as_ref()
    }

    pub fn project_expressions(&self) -> &[NamedExpression] {
        &self.project_expressions
    }

    pub fn join_type(&self) -> JoinType {
        self.join_type
    }

    pub fn bloom_filter_config(&self) -> Option<&BloomFilterConfig> {
        self.bloom_filter_config.as_ref()
    }
}

impl PhysicalOperatorTrait for HashJoin {
    fn physical_type(&self) -> PhysicalType {
        PhysicalType::HashJoin
    }

    fn name(&self) -> String {
        match self.join_type {
            JoinType::Inner => "HashJoin".to_string(),
            join_type => format!("Hash{}Join", join_type),
        }
    }

    fn output_attributes(&self, _inputs: &[PlanNodeRef]) -> Vec<AttributeReference> {
        to_refs(&self.project_expressions)
    }

    fn referenced_attributes(&self, _inputs: &[PlanNodeRef]) -> Vec<AttributeReference> {
        let mut attributes = self.left_join_attributes.clone();
        attributes.extend(self.right_join_attributes.iter().cloned());
        if let Some(predicate) = &self.residual_predicate {
            attributes.extend(predicate.referenced_attributes());
        }
        if let Some(predicate) = &self.build_predicate {
            attributes.extend(predicate.referenced_attributes());
        }
        for expr in &self.project_expressions {
            attributes.extend(expr.referenced_attributes());
        }
        attributes
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct NestedLoopsJoin {
    join_predicate: Predicate,
    project_expressions: Vec<NamedExpression>,
}

impl NestedLoopsJoin {
    pub fn new(join_predicate: Predicate, project_expressions: Vec<NamedExpression>) -> Self {
        Self {
            join_predicate,
            project_expressions,
        }
    }

    pub fn join_predicate(&self) -> &Predicate {
        &self.join_predicate
    }

    pub fn project_expressions(&self) -> &[NamedExpression] {
        &self.project_expressions
    }

    pub fn with_project_expressions(&self, project_expressions: Vec<NamedExpression>) -> Self {
        Self::new(self.join_predicate.clone(), project_expressions)
    }
}

impl PhysicalOperatorTrait for NestedLoopsJoin {
    fn physical_type(&self) -> PhysicalType {
        PhysicalType::NestedLoopsJoin
    }

    fn output_attributes(&self, _inputs: &[PlanNodeRef]) -> Vec<AttributeReference> {
        to_refs(&self.project_expressions)
    }

    fn referenced_attributes(&self, _inputs: &[PlanNodeRef]) -> Vec<AttributeReference> {
        let mut attributes = self.join_predicate.referenced_attributes();
        for expr in &self.project_expressions {
            attributes.extend(expr.referenced_attributes());
        }
        attributes
    }
}

/// A semi join evaluated with an exact bit vector built over the build side join attribute.
/// Only attributes of the probe side (left input) are projected.
#[derive(Clone, Debug, PartialEq)]
pub struct FilterJoin {
    probe_attributes: Vec<AttributeReference>,
    build_attributes: Vec<AttributeReference>,
    project_expressions: Vec<NamedExpression>,
    build_side_filter_predicate: Option<Predicate>,
    is_anti_join: bool,
}

impl FilterJoin {
    pub fn new(
        probe_attributes: Vec<AttributeReference>,
        build_attributes: Vec<AttributeReference>,
        project_expressions: Vec<NamedExpression>,
        build_side_filter_predicate: Option<Predicate>,
        is_anti_join: bool,
    ) -> Self {
        assert_eq!(probe_attributes.len(), build_attributes.len());
        Self {
            probe_attributes,
            build_attributes,
            project_expressions,
            build_side_filter_predicate,
            is_anti_join,
        }
    }

    pub fn probe_attributes(&self) -> &[AttributeReference] {
        &self.probe_attributes
    }

    pub fn build_attributes(&self) -> &[AttributeReference] {
        &self.build_attributes
    }

    pub fn project_expressions(&self) -> &[NamedExpression] {
        &self.project_expressions
    }

    pub fn build_side_filter_predicate(&self) -> Option<&Predicate> {
        self.build_side_filter_predicate.as_ref()
    }

    pub fn is_anti_join(&self) -> bool {
        self.is_anti_join
    }

    pub fn with_project_expressions(&self, project_expressions: Vec<NamedExpression>) -> Self {
        Self {
            project_expressions,
            ..self.clone()
        }
    }
}

impl PhysicalOperatorTrait for FilterJoin {
    fn physical_type(&self) -> PhysicalType {
        PhysicalType::FilterJoin
    }

    fn name(&self) -> String {
        if self.is_anti_join {
            "FilterJoin(Anti)".to_string()
        } else {
            "FilterJoin".to_string()
        }
    }

    fn output_attributes(&self, _inputs: &[PlanNodeRef]) -> Vec<AttributeReference> {
        to_refs(&self.project_expressions)
    }

    fn referenced_attributes(&self, _inputs: &[PlanNodeRef]) -> Vec<AttributeReference> {
        let mut attributes = self.probe_attributes.clone();
        attributes.extend(self.build_attributes.iter().cloned());
        for expr in &self.project_expressions {
            attributes.extend(expr.referenced_attributes());
        }
        if let Some(predicate) = &self.build_side_filter_predicate {
            attributes.extend(predicate.referenced_attributes());
        }
        attributes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{DataType, ExprId};

    #[test]
    fn test_join_attribute_arity_mismatch_is_invalid_plan() {
        let a = AttributeReference::new(ExprId::from(1), "a", "r", DataType::Int);
        let err = HashJoin::create(vec![a], vec![], None, vec![], JoinType::Inner).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<OptError>(),
            Some(OptError::InvalidPlan(_))
        ));
    }

    #[test]
    fn test_join_names() {
        let join = HashJoin::new(vec![], vec![], None, vec![], JoinType::LeftSemi);
        assert_eq!("HashLeftSemiJoin", join.name());
        let filter_join = FilterJoin::new(vec![], vec![], vec![], None, true);
        assert_eq!("FilterJoin(Anti)", filter_join.name());
    }
}
