use std::collections::HashSet;
use std::rc::Rc;

use log::debug;

use crate::error::OptResult;
use crate::expr::{
    expr_ids, to_named_expressions, AggregateFunction, AggregateKind, Alias, AttributeReference, BinaryOp,
    ExprId, NamedExpression, Scalar,
};
use crate::heuristic::{HepOptimizer, MatchOrder, NodeRule};
use crate::operator::{Aggregate, HashJoin, PhysicalOperator, PhysicalType, Selection};
use crate::optimizer::OptimizerContext;
use crate::plan::{PlanNodeBuilder, PlanNodeRef};
use crate::properties::{
    EquivalentPartitionExprIds, PartitionSchemeHeader, PartitionType, PhysicalProp,
    PhysicalPropertySet,
};
use crate::rules::Rule;

/// Propagates the partitioning of stored relations up the plan, inserting repartitions where
/// an operator needs its input partitioned differently.
pub struct Partition {
    context: Rc<OptimizerContext>,
}

impl Partition {
    pub fn new(context: Rc<OptimizerContext>) -> Self {
        Self { context }
    }
}

impl Rule for Partition {
    fn name(&self) -> &'static str {
        "Partition"
    }

    fn apply(&self, input: &PlanNodeRef) -> OptResult<PlanNodeRef> {
        let rule = PartitionNodes {
            context: self.context.clone(),
        };
        // Rewritten nodes are partitioned already, so a single bottom up sweep suffices.
        HepOptimizer::new(MatchOrder::BottomUp, 1, vec![Box::new(rule)]).find_best_plan(input)
    }
}

struct PartitionNodes {
    context: Rc<OptimizerContext>,
}

impl NodeRule for PartitionNodes {
    fn name(&self) -> &'static str {
        "Partition"
    }

    fn apply_to_node(&self, node: &PlanNodeRef) -> OptResult<PlanNodeRef> {
        let output = match node.operator() {
            PhysicalOperator::Aggregate(aggregate) => self.apply_to_aggregate(node, aggregate),
            PhysicalOperator::HashJoin(join) => self.apply_to_hash_join(node, join),
            PhysicalOperator::NestedLoopsJoin(_) => self.apply_to_nested_loops_join(node),
            PhysicalOperator::Selection(_) => apply_to_selection(node),
            PhysicalOperator::Sort(_) => apply_to_sort(node),
            _ => None,
        };
        Ok(output.unwrap_or_else(|| node.clone()))
    }
}

fn needs_selection(physical_type: PhysicalType) -> bool {
    matches!(
        physical_type,
        PhysicalType::SharedSubplanReference
            | PhysicalType::Sort
            | PhysicalType::TableReference
            | PhysicalType::UnionAll
    )
}

/// Gives `node` the output partitioning `header`, either by overwriting its own or, for nodes
/// whose partitioning is fixed, through a repartitioning Selection on top.
fn repartition(node: &PlanNodeRef, header: Option<PartitionSchemeHeader>) -> PlanNodeRef {
    if needs_selection(node.physical_type()) {
        PlanNodeBuilder::new(PhysicalOperator::Selection(Selection::new(
            to_named_expressions(&node.output_attributes()),
            None,
        )))
        .add_inputs([node.clone()])
        .with_physical_props(PhysicalPropertySet::new(header, true))
        .build_ref()
    } else {
        node.copy_with_partition_scheme(header, true)
    }
}

fn hash_repartition(
    node: &PlanNodeRef,
    attributes: &[AttributeReference],
    num_partitions: usize,
) -> PlanNodeRef {
    debug!(
        "Hash repartitioning {}#{} into {} partitions",
        node.name(),
        node.id(),
        num_partitions
    );
    repartition(
        node,
        Some(PartitionSchemeHeader::hash(
            num_partitions,
            attributes.iter().map(|attr| attr.id()),
        )),
    )
}

/// Whether the two sides of a hash join have to be repartitioned, and into how many partitions.
///
/// A side is kept when it is hash partitioned on its join attributes. The right side is also
/// kept as the (unpartitioned) broadcast side when the left side needs no repartition.
pub fn needs_repartition_for_hash_join(
    left: Option<&PartitionSchemeHeader>,
    left_join_attributes: &[AttributeReference],
    right: Option<&PartitionSchemeHeader>,
    right_join_attributes: &[AttributeReference],
    num_repartitions: usize,
) -> (bool, bool, usize) {
    debug_assert!(left.is_some() || right.is_some());

    let left_ids: Vec<ExprId> = left_join_attributes.iter().map(|attr| attr.id()).collect();
    let right_ids: Vec<ExprId> = right_join_attributes.iter().map(|attr| attr.id()).collect();

    let mut num_partitions = 1;
    let mut left_needs_repartition = false;
    if let Some(left) = left {
        num_partitions = left.num_partitions();
        left_needs_repartition = !left.is_hash_partitioned_on(&left_ids);
    } else if let Some(right) = right {
        left_needs_repartition = true;
        num_partitions = right.num_partitions();
    }

    let mut right_needs_repartition = false;
    if let Some(right) = right {
        right_needs_repartition = true;
        // Same partition count as the left side, or the left side is re-hashed anyway.
        let required = PartitionSchemeHeader::hash(right.num_partitions(), right_ids);
        if right.satisfies(&required)
            && (left_needs_repartition || num_partitions == right.num_partitions())
        {
            right_needs_repartition = false;
            num_partitions = right.num_partitions();
        }
    } else if left_needs_repartition {
        right_needs_repartition = true;
    }

    if left_needs_repartition && right_needs_repartition {
        num_partitions = num_repartitions;
    }
    (left_needs_repartition, right_needs_repartition, num_partitions)
}

fn apply_to_selection(node: &PlanNodeRef) -> Option<PlanNodeRef> {
    let input_header = node.input(0).partition_scheme()?;
    if input_header.is_hash_partition() {
        let projected = expr_ids(&node.output_attributes());
        let output_groups = input_header.project(&projected);
        if output_groups.as_slice() != input_header.partition_expr_ids() {
            let header = PartitionSchemeHeader::new(
                PartitionType::Hash,
                input_header.num_partitions(),
                output_groups,
            );
            if node.partition_scheme() == Some(&header) {
                return None;
            }
            return Some(node.copy_with_partition_scheme(Some(header), true));
        }
    }

    assert!(
        input_header.partition_type() != PartitionType::Range,
        "range partitioned input of {}",
        node.name()
    );
    if node.partition_scheme() == Some(input_header) {
        return None;
    }
    Some(node.copy_with_partition_scheme(Some(input_header.clone()), false))
}

fn apply_to_sort(node: &PlanNodeRef) -> Option<PlanNodeRef> {
    let input = node.input(0);
    if input.physical_type() == PhysicalType::TableReference || input.partition_scheme().is_none() {
        return None;
    }
    Some(node.copy_with_new_children(vec![input.copy_with_partition_scheme(None, true)]))
}

impl PartitionNodes {
    fn apply_to_hash_join(&self, node: &PlanNodeRef, join: &HashJoin) -> Option<PlanNodeRef> {
        let (left, right) = (node.input(0), node.input(1));
        if left.partition_scheme().is_none() && right.partition_scheme().is_none() {
            return None;
        }

        let (left_needs_repartition, right_needs_repartition, num_partitions) =
            needs_repartition_for_hash_join(
                left.partition_scheme(),
                join.left_join_attributes(),
                right.partition_scheme(),
                join.right_join_attributes(),
                self.context.config().num_repartitions,
            );

        let projected = expr_ids(&node.output_attributes());
        let mut output_groups: Vec<EquivalentPartitionExprIds> = Vec::new();
        for (left_attr, right_attr) in join
            .left_join_attributes()
            .iter()
            .zip(join.right_join_attributes())
        {
            let group: EquivalentPartitionExprIds = [left_attr.id(), right_attr.id()]
                .into_iter()
                .filter(|id| projected.contains(id))
                .collect();
            if group.is_empty() {
                // A partition attribute is projected away: the output keeps the partition id
                // of its input.
                output_groups.clear();
                break;
            }
            output_groups.push(group);
        }
        let output_header =
            PartitionSchemeHeader::new(PartitionType::Hash, num_partitions, output_groups);

        if !left_needs_repartition && !right_needs_repartition {
            if node.partition_scheme() == Some(&output_header) {
                return None;
            }
            return Some(node.copy_with_partition_scheme(Some(output_header), false));
        }

        let new_left = if left_needs_repartition {
            hash_repartition(left, join.left_join_attributes(), num_partitions)
        } else {
            left.clone()
        };
        let new_right = if right_needs_repartition {
            hash_repartition(right, join.right_join_attributes(), num_partitions)
        } else {
            right.clone()
        };
        Some(
            PlanNodeBuilder::new(node.operator().clone())
                .add_inputs([new_left, new_right])
                .with_physical_props(PhysicalPropertySet::partitioned(output_header, false))
                .build_ref(),
        )
    }

    /// The left side is randomly partitioned unless it is partitioned already, and the right
    /// side is broadcast with the same partition count.
    fn apply_to_nested_loops_join(&self, node: &PlanNodeRef) -> Option<PlanNodeRef> {
        let (left, right) = (node.input(0), node.input(1));
        if left.partition_scheme().is_none() && right.partition_scheme().is_none() {
            return None;
        }
        if node.partition_scheme().is_some() {
            return None;
        }

        let num_partitions = left
            .partition_scheme()
            .map_or(self.context.config().num_repartitions, |header| {
                header.num_partitions()
            });
        let random = || Some(PartitionSchemeHeader::random(num_partitions));
        let new_left = match left.partition_scheme() {
            Some(_) if left.physical_type() == PhysicalType::TableReference => left.clone(),
            _ if needs_selection(left.physical_type()) => repartition(left, random()),
            Some(_) => left.clone(),
            None => left.copy_with_partition_scheme(random(), false),
        };

        let new_right = match right.partition_scheme() {
            Some(header) if header.num_partitions() != num_partitions => {
                repartition(right, Some(header.with_num_partitions(num_partitions)))
            }
            _ => right.clone(),
        };

        let left_header = new_left
            .partition_scheme()
            .cloned()
            .unwrap_or_else(|| PartitionSchemeHeader::random(num_partitions));
        let projected = expr_ids(&node.output_attributes());
        let output_groups = left_header.project(&projected);
        let (output_header, has_repartition) =
            if output_groups.as_slice() != left_header.partition_expr_ids() {
                (
                    PartitionSchemeHeader::new(
                        left_header.partition_type(),
                        num_partitions,
                        output_groups,
                    ),
                    true,
                )
            } else {
                (left_header, false)
            };

        Some(
            PlanNodeBuilder::new(node.operator().clone())
                .add_inputs([new_left, new_right])
                .with_physical_props(PhysicalPropertySet::partitioned(
                    output_header,
                    has_repartition,
                ))
                .build_ref(),
        )
    }

    fn apply_to_aggregate(&self, node: &PlanNodeRef, aggregate: &Aggregate) -> Option<PlanNodeRef> {
        let input = node.input(0);
        let input_header = input.partition_scheme()?;
        if node.partition_scheme().is_some() {
            return None;
        }

        let grouping = aggregate.grouping_expressions();
        let grouping_ids: HashSet<ExprId> = grouping.iter().map(|expr| expr.id()).collect();
        let grouping_header = || {
            (!grouping.is_empty()).then(|| {
                PartitionSchemeHeader::hash(
                    input_header.num_partitions(),
                    grouping.iter().map(|expr| expr.id()),
                )
            })
        };

        // No re-aggregation needed when the partition attributes are a subset of the grouping
        // attributes.
        if !grouping.is_empty() && input_header.reusable_partition_scheme(&grouping_ids) {
            return Some(node.copy_with_partition_scheme(grouping_header(), false));
        }

        let mut partial_aggregate_expressions: Vec<Alias> = Vec::new();
        let mut non_recompute_expressions: Vec<AttributeReference> = Vec::new();
        // (avg, sum, count)
        let mut avg_recompute_expressions: Vec<(Alias, AttributeReference, AttributeReference)> =
            Vec::new();
        for alias in aggregate.aggregate_expressions() {
            let function = match alias.expr() {
                Scalar::Aggregate(function) => function,
                other => panic!("aggregate expression {} is not an aggregate function", other),
            };

            if function.is_distinct() {
                let distinct_on_grouping = function
                    .arguments()
                    .iter()
                    .flat_map(|arg| arg.referenced_attributes())
                    .next()
                    .map_or(false, |attr| grouping_ids.contains(&attr.id()));
                if !distinct_on_grouping {
                    debug!("Dropping input partitioning of {}#{}", node.name(), node.id());
                    return Some(node.copy_with_new_children(vec![repartition(input, None)]));
                }
            }

            if function.is_distinct() || function.kind() != AggregateKind::Avg {
                partial_aggregate_expressions.push(alias.clone());
                non_recompute_expressions.push(NamedExpression::Alias(alias.clone()).to_ref());
                continue;
            }

            let expr_id_gen = self.context.expr_id_gen();
            let sum = Alias::new(
                expr_id_gen.next(),
                alias.name(),
                alias.relation(),
                Scalar::Aggregate(AggregateFunction::new(
                    AggregateKind::Sum,
                    function.arguments().to_vec(),
                    false,
                )),
            );
            let count = Alias::new(
                expr_id_gen.next(),
                alias.name(),
                alias.relation(),
                Scalar::Aggregate(AggregateFunction::new(
                    AggregateKind::Count,
                    function.arguments().to_vec(),
                    false,
                )),
            );
            let sum_ref = NamedExpression::Alias(sum.clone()).to_ref();
            let count_ref = NamedExpression::Alias(count.clone()).to_ref();
            partial_aggregate_expressions.push(sum);
            partial_aggregate_expressions.push(count);
            avg_recompute_expressions.push((alias.clone(), sum_ref, count_ref));
        }

        let partial_aggregate = if avg_recompute_expressions.is_empty() {
            node.copy_with_partition_scheme(grouping_header(), true)
        } else {
            PlanNodeBuilder::new(PhysicalOperator::Aggregate(Aggregate::new(
                grouping.to_vec(),
                partial_aggregate_expressions.clone(),
                aggregate.filter_predicate().cloned(),
            )))
            .add_inputs([input.clone()])
            .with_physical_props(PhysicalPropertySet::new(grouping_header(), true))
            .build_ref()
        };

        let reaggregate_expressions: Vec<Alias> = partial_aggregate_expressions
            .iter()
            .map(reaggregate_expression)
            .collect();
        let reaggregate = PlanNodeBuilder::new(PhysicalOperator::Aggregate(Aggregate::new(
            grouping.to_vec(),
            reaggregate_expressions,
            None,
        )))
        .add_inputs([partial_aggregate])
        .with_physical_props(PhysicalPropertySet::new(grouping_header(), false))
        .build_ref();
        debug!(
            "Split {}#{} into a partial aggregate and a re-aggregate",
            node.name(),
            node.id()
        );

        if avg_recompute_expressions.is_empty() {
            return Some(reaggregate);
        }

        let mut project_expressions: Vec<NamedExpression> = grouping
            .iter()
            .map(|expr| NamedExpression::Attribute(expr.to_ref()))
            .collect();
        project_expressions.extend(
            non_recompute_expressions
                .into_iter()
                .map(NamedExpression::Attribute),
        );
        for (avg, sum, count) in avg_recompute_expressions {
            project_expressions.push(NamedExpression::Alias(Alias::new(
                avg.id(),
                avg.name(),
                avg.relation(),
                Scalar::binary(BinaryOp::Divide, sum.into(), count.into()),
            )));
        }
        Some(
            PlanNodeBuilder::new(PhysicalOperator::Selection(Selection::new(
                project_expressions,
                None,
            )))
            .add_inputs([reaggregate])
            .with_physical_props(PhysicalPropertySet::new(grouping_header(), false))
            .build_ref(),
        )
    }
}

/// Combines the per partition results of a partial aggregate.
fn reaggregate_expression(partial: &Alias) -> Alias {
    let function = match partial.expr() {
        Scalar::Aggregate(function) => function,
        other => panic!("aggregate expression {} is not an aggregate function", other),
    };
    let kind = match function.kind() {
        AggregateKind::Count | AggregateKind::Sum => AggregateKind::Sum,
        AggregateKind::Max => AggregateKind::Max,
        AggregateKind::Min => AggregateKind::Min,
        AggregateKind::Avg => panic!("AVG cannot be re-aggregated"),
    };
    Alias::new(
        partial.id(),
        partial.name(),
        partial.relation(),
        Scalar::Aggregate(AggregateFunction::new(
            kind,
            vec![NamedExpression::Alias(partial.clone()).to_ref().into()],
            false,
        )),
    )
}
