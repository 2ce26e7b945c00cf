use std::rc::Rc;

use log::debug;

use crate::cost::StarSchemaCostModel;
use crate::error::OptResult;
use crate::expr::{expr_ids, subset_of_expressions, to_named_expressions, NamedExpression, Scalar};
use crate::heuristic::{HepOptimizer, MatchOrder, NodeRule};
use crate::operator::{
    Aggregate, CrossReferenceCoalesceAggregate, JoinType, PhysicalOperator, PhysicalType,
    Selection,
};
use crate::optimizer::OptimizerContext;
use crate::plan::{PlanNodeBuilder, PlanNodeRef};
use crate::rules::Rule;

/// Turns an aggregate grouped by the key of the left side of a left outer join into a single
/// [`CrossReferenceCoalesceAggregate`], which aggregates the build side rows straight into
/// slots indexed by the key.
pub struct FuseAggregateJoin {
    context: Rc<OptimizerContext>,
}

impl FuseAggregateJoin {
    pub fn new(context: Rc<OptimizerContext>) -> Self {
        Self { context }
    }
}

impl Rule for FuseAggregateJoin {
    fn name(&self) -> &'static str {
        "FuseAggregateJoin"
    }

    fn apply(&self, input: &PlanNodeRef) -> OptResult<PlanNodeRef> {
        debug_assert_eq!(PhysicalType::TopLevelPlan, input.physical_type());
        let rule = FuseAggregateJoinNodes {
            cost_model: self.context.cost_model(input),
            max_table_size: self.context.config().collision_free_vector_table_max_size,
        };
        HepOptimizer::new(MatchOrder::BottomUp, 1, vec![Box::new(rule)]).find_best_plan(input)
    }
}

struct FuseAggregateJoinNodes {
    cost_model: StarSchemaCostModel,
    max_table_size: usize,
}

impl NodeRule for FuseAggregateJoinNodes {
    fn name(&self) -> &'static str {
        "FuseAggregateJoin"
    }

    fn apply_to_node(&self, node: &PlanNodeRef) -> OptResult<PlanNodeRef> {
        Ok(self.fuse(node).unwrap_or_else(|| node.clone()))
    }
}

impl FuseAggregateJoinNodes {
    fn fuse(&self, node: &PlanNodeRef) -> Option<PlanNodeRef> {
        let aggregate = node.operator().as_aggregate()?;
        if aggregate.filter_predicate().is_some() {
            return None;
        }
        let join_node = node.input(0);
        let join = join_node.operator().as_hash_join()?;
        if join.join_type() != JoinType::LeftOuter
            || join.residual_predicate().is_some()
            || join.build_predicate().is_some()
        {
            return None;
        }
        let (left, right) = (join_node.input(0), join_node.input(1));

        // One unique key on the left, which is also the only grouping attribute.
        let left_join_attributes = join.left_join_attributes();
        match (left_join_attributes, aggregate.grouping_expressions()) {
            ([key], [grouping]) if key.id() == grouping.id() => {}
            _ => return None,
        }
        if !self
            .cost_model
            .implies_unique_attributes(left, left_join_attributes)
        {
            return None;
        }

        // Every function aggregates a single attribute of the right side.
        let right_ids = expr_ids(&right.output_attributes());
        let arguments_from_right = aggregate.aggregate_expressions().iter().all(|alias| {
            match alias.expr() {
                Scalar::Aggregate(function) => matches!(
                    function.arguments(),
                    [Scalar::Attribute(attr)] if right_ids.contains(&attr.id())
                ),
                _ => false,
            }
        });
        if !arguments_from_right {
            return None;
        }

        let max_num_groups_left = self
            .cost_model
            .collision_free_num_groups(node, self.max_table_size)?;
        let right_aggregate = PlanNodeBuilder::new(PhysicalOperator::Aggregate(Aggregate::new(
            to_named_expressions(join.right_join_attributes()),
            aggregate.aggregate_expressions().to_vec(),
            None,
        )))
        .add_inputs(vec![right.clone()])
        .build_ref();
        let max_num_groups_right = self
            .cost_model
            .collision_free_num_groups(&right_aggregate, self.max_table_size)?;

        // A filter on the right side is evaluated while aggregating, as long as it does not
        // compute any column the aggregation reads.
        let (mut right_child, mut right_filter_predicate) = (right.clone(), None);
        if let PhysicalOperator::Selection(selection) = right.operator() {
            let selection_input = right.input(0).output_attributes();
            let mut needed = join.right_join_attributes().to_vec();
            for alias in aggregate.aggregate_expressions() {
                needed.extend(alias.expr().referenced_attributes());
            }
            if subset_of_expressions(&needed, &selection_input) {
                right_child = right.input(0).clone();
                right_filter_predicate = selection.filter_predicate().cloned();
            }
        }

        debug!(
            "Fusing Aggregate#{} with HashJoin#{}",
            node.id(),
            join_node.id()
        );
        let fused = PlanNodeBuilder::new(PhysicalOperator::CrossReferenceCoalesceAggregate(
            CrossReferenceCoalesceAggregate::new(
                left_join_attributes.to_vec(),
                join.right_join_attributes().to_vec(),
                right_filter_predicate,
                aggregate.aggregate_expressions().to_vec(),
                max_num_groups_left.max(max_num_groups_right),
            ),
        ))
        .add_inputs(vec![left.clone(), right_child])
        .build_ref();

        let output = node.output_attributes();
        if fused.output_attributes() == output {
            return Some(fused);
        }
        // The group by table may carry more columns than its key.
        Some(
            PlanNodeBuilder::new(PhysicalOperator::Selection(Selection::new(
                output.into_iter().map(NamedExpression::from).collect(),
                None,
            )))
            .add_inputs(vec![fused])
            .build_ref(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OptimizerConfig;
    use crate::expr::{
        AggregateFunction, AggregateKind, Alias, AttributeReference, ComparisonOp, DataType,
        ExprId, ExprIdGen, Literal, Predicate,
    };
    use crate::plan::PhysicalPlanBuilder;
    use crate::stat::{Relation, Statistics};

    fn attr(id: u64, name: &str, relation: &str) -> AttributeReference {
        AttributeReference::new(ExprId::from(id), name, relation, DataType::Int)
    }

    fn scan(name: &str, attrs: &[AttributeReference]) -> PhysicalPlanBuilder {
        let relation = Rc::new(Relation::new(
            name,
            attrs
                .iter()
                .map(|a| (a.name().to_string(), a.data_type()))
                .collect(),
        ));
        PhysicalPlanBuilder::scan(relation, name, attrs.to_vec())
    }

    fn rule(max_table_size: usize) -> FuseAggregateJoin {
        let stats = Statistics::new()
            .with_num_tuples("d", 100)
            .with_num_distinct_values("d", "pk", 100)
            .with_min_max("d", "pk", Literal::Int(0), Literal::Int(99), true)
            .with_num_tuples("f", 10_000)
            .with_num_distinct_values("f", "fk", 100)
            .with_min_max("f", "fk", Literal::Int(0), Literal::Int(99), true);
        let config = OptimizerConfig {
            collision_free_vector_table_max_size: max_table_size,
            ..OptimizerConfig::default()
        };
        FuseAggregateJoin::new(Rc::new(OptimizerContext::new(
            config,
            Rc::new(stats),
            ExprIdGen::starting_after(ExprId::from(100)),
        )))
    }

    fn sum(v: &AttributeReference) -> Alias {
        Alias::new(
            ExprId::from(9),
            "s",
            "",
            Scalar::Aggregate(AggregateFunction::new(
                AggregateKind::Sum,
                vec![v.clone().into()],
                false,
            )),
        )
    }

    /// `SELECT pk, SUM(v) FROM d LEFT OUTER JOIN <right> ON pk = fk GROUP BY pk`
    fn plan(
        d_attrs: &[AttributeReference],
        right: PlanNodeRef,
        join_type: JoinType,
        aggregate: Alias,
    ) -> PlanNodeRef {
        let (pk, fk, v) = (attr(1, "pk", "d"), attr(3, "fk", "f"), attr(4, "v", "f"));
        let mut project = to_named_expressions(d_attrs);
        project.push(v.into());
        scan("d", d_attrs)
            .hash_join(right, vec![pk.clone()], vec![fk], None, project, join_type)
            .unwrap()
            .aggregate(vec![pk.into()], vec![aggregate], None)
            .build()
            .root()
    }

    fn f() -> PhysicalPlanBuilder {
        scan("f", &[attr(3, "fk", "f"), attr(4, "v", "f"), attr(5, "w", "f")])
    }

    #[test]
    fn test_aggregate_over_outer_join_is_fused() {
        let v = attr(4, "v", "f");
        let filter = Predicate::comparison(
            ComparisonOp::Greater,
            attr(5, "w", "f"),
            Literal::Int(3),
        );
        let right = f().filter(filter.clone()).node();
        let root = plan(&[attr(1, "pk", "d")], right, JoinType::LeftOuter, sum(&v));
        let output = rule(1_000_000).apply(&root).unwrap();

        let fused = output.input(0);
        assert_eq!(root.input(0).output_attributes(), fused.output_attributes());
        let crca = fused
            .operator()
            .as_cross_reference_coalesce_aggregate()
            .unwrap();
        assert_eq!(100, crca.group_by_key_value_range());
        assert_eq!(Some(&filter), crca.right_filter_predicate());
        assert_eq!(&[attr(3, "fk", "f")], crca.right_join_attributes());
        assert_eq!(PhysicalType::TableReference, fused.input(1).physical_type());
    }

    #[test]
    fn test_extra_left_columns_are_projected_away() {
        let v = attr(4, "v", "f");
        let d_attrs = [attr(1, "pk", "d"), attr(2, "name", "d")];
        let root = plan(&d_attrs, f().node(), JoinType::LeftOuter, sum(&v));
        let output = rule(1_000_000).apply(&root).unwrap();

        let selection = output.input(0);
        assert_eq!(PhysicalType::Selection, selection.physical_type());
        assert_eq!(root.input(0).output_attributes(), selection.output_attributes());
        assert_eq!(
            PhysicalType::CrossReferenceCoalesceAggregate,
            selection.input(0).physical_type()
        );
    }

    #[test]
    fn test_inner_join_is_not_fused() {
        let v = attr(4, "v", "f");
        let root = plan(&[attr(1, "pk", "d")], f().node(), JoinType::Inner, sum(&v));
        assert!(Rc::ptr_eq(&root, &rule(1_000_000).apply(&root).unwrap()));
    }

    #[test]
    fn test_key_range_must_fit_the_vector() {
        let v = attr(4, "v", "f");
        let root = plan(&[attr(1, "pk", "d")], f().node(), JoinType::LeftOuter, sum(&v));
        assert!(Rc::ptr_eq(&root, &rule(99).apply(&root).unwrap()));
    }

    #[test]
    fn test_min_is_not_fused() {
        let v = attr(4, "v", "f");
        let min = Alias::new(
            ExprId::from(9),
            "m",
            "",
            Scalar::Aggregate(AggregateFunction::new(
                AggregateKind::Min,
                vec![v.into()],
                false,
            )),
        );
        let root = plan(&[attr(1, "pk", "d")], f().node(), JoinType::LeftOuter, min);
        assert!(Rc::ptr_eq(&root, &rule(1_000_000).apply(&root).unwrap()));
    }
}
