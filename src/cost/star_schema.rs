use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use log::trace;

use crate::cost::{
    estimate_selectivity_for_predicate, CostModel, AGGREGATE_GROUP_DAMPENING,
    COLLISION_FREE_MAX_SPARSITY, DEFAULT_NUM_DISTINCT_VALUES,
    NON_ATTRIBUTE_GROUPING_NUM_DISTINCT_VALUES,
};
use crate::expr::{AggregateKind, AttributeReference, ExprId, Predicate, Scalar};
use crate::operator::{PhysicalOperator, PhysicalOperatorTrait, TableReference};
use crate::plan::{PlanNodeId, PlanNodeRef};
use crate::stat::{StatisticsProvider, ValueRange};

/// Cost model tuned for star schema queries: a large fact table joined with small, filtered
/// dimension tables.
///
/// The memoized variant caches cardinality and selectivity per node id, which is only sound
/// while the plan being estimated is not rewritten underneath it. Rules therefore create a
/// fresh model per pass.
pub struct StarSchemaCostModel {
    stats: Rc<dyn StatisticsProvider>,
    shared_subplans: Vec<PlanNodeRef>,
    memo: Option<RefCell<Memo>>,
}

#[derive(Default)]
struct Memo {
    cardinality: HashMap<PlanNodeId, usize>,
    selectivity: HashMap<PlanNodeId, f64>,
}

impl StarSchemaCostModel {
    pub fn new(stats: Rc<dyn StatisticsProvider>, shared_subplans: Vec<PlanNodeRef>) -> Self {
        Self {
            stats,
            shared_subplans,
            memo: None,
        }
    }

    /// Model for the plan rooted at `top_level_plan`, resolving shared subplan references
    /// against its shared subplans.
    pub fn for_plan(stats: Rc<dyn StatisticsProvider>, top_level_plan: &PlanNodeRef) -> Self {
        let shared_subplans = match top_level_plan.operator() {
            PhysicalOperator::TopLevelPlan(_) => top_level_plan.inputs()[1..].to_vec(),
            _ => vec![],
        };
        Self::new(stats, shared_subplans)
    }

    pub fn memoized(mut self) -> Self {
        self.memo = Some(RefCell::new(Memo::default()));
        self
    }

    fn shared_subplan(&self, subplan_id: usize) -> &PlanNodeRef {
        self.shared_subplans.get(subplan_id).unwrap_or_else(|| {
            panic!(
                "shared subplan {} out of range, plan has {}",
                subplan_id,
                self.shared_subplans.len()
            )
        })
    }

    fn compute_cardinality(&self, node: &PlanNodeRef) -> usize {
        match node.operator() {
            PhysicalOperator::TopLevelPlan(_) => self.estimate_cardinality(node.input(0)),
            PhysicalOperator::TableReference(table) => self.table_cardinality(table),
            PhysicalOperator::Selection(selection) => {
                let input_cardinality = self.estimate_cardinality(node.input(0));
                let selectivity =
                    self.predicate_selectivity(selection.filter_predicate(), node.input(0));
                ((input_cardinality as f64 * selectivity) as usize)
                    .max(1)
                    .min(input_cardinality)
            }
            PhysicalOperator::TableGenerator(generator) => generator.estimated_cardinality(),
            PhysicalOperator::HashJoin(_) => {
                let left_cardinality = self.estimate_cardinality(node.input(0)) as f64;
                let right_cardinality = self.estimate_cardinality(node.input(1)) as f64;
                let left_selectivity = self.estimate_selectivity(node.input(0));
                let right_selectivity = self.estimate_selectivity(node.input(1));
                (left_cardinality * right_selectivity + 0.5)
                    .max(right_cardinality * left_selectivity + 0.5) as usize
            }
            PhysicalOperator::NestedLoopsJoin(_) => self
                .estimate_cardinality(node.input(0))
                .max(self.estimate_cardinality(node.input(1))),
            PhysicalOperator::FilterJoin(filter_join) => {
                let probe_cardinality = self.estimate_cardinality(node.input(0)) as f64;
                let build_filter_selectivity = self.predicate_selectivity(
                    filter_join.build_side_filter_predicate(),
                    node.input(1),
                );
                let build_selectivity = self.estimate_selectivity(node.input(1));
                (probe_cardinality * build_filter_selectivity * build_selectivity) as usize
            }
            PhysicalOperator::Aggregate(aggregate) => {
                if aggregate.grouping_expressions().is_empty() {
                    return 1;
                }
                let filter_selectivity =
                    self.predicate_selectivity(aggregate.filter_predicate(), node.input(0));
                ((self.estimate_num_groups_for_aggregate(node) as f64 * filter_selectivity)
                    as usize)
                    .max(1)
            }
            PhysicalOperator::CrossReferenceCoalesceAggregate(_) => {
                self.estimate_cardinality(node.input(0))
            }
            PhysicalOperator::Sort(sort) => {
                let input_cardinality = self.estimate_cardinality(node.input(0));
                match sort.limit() {
                    Some(limit) => input_cardinality.min(limit),
                    None => input_cardinality,
                }
            }
            PhysicalOperator::Sample(sample) => {
                let input_cardinality = self.estimate_cardinality(node.input(0)) as f64;
                (input_cardinality * f64::from(sample.percentage()) / 100.0).round() as usize
            }
            PhysicalOperator::UnionAll(_) => node
                .inputs()
                .iter()
                .map(|operand| self.estimate_cardinality(operand))
                .sum(),
            PhysicalOperator::SharedSubplanReference(reference) => {
                self.estimate_cardinality(self.shared_subplan(reference.subplan_id()))
            }
            PhysicalOperator::WindowAggregate(_) => self.estimate_cardinality(node.input(0)),
            _ => panic!("Unsupported physical plan for cardinality estimation: {}", node.name()),
        }
    }

    fn compute_selectivity(&self, node: &PlanNodeRef) -> f64 {
        match node.operator() {
            PhysicalOperator::TopLevelPlan(_) => self.estimate_selectivity(node.input(0)),
            PhysicalOperator::Selection(selection) => {
                self.predicate_selectivity(selection.filter_predicate(), node.input(0))
                    * self.estimate_selectivity(node.input(0))
            }
            PhysicalOperator::HashJoin(join) => {
                self.join_predicate_selectivity(join.residual_predicate(), node)
                    * self.estimate_selectivity(node.input(0))
                    * self.estimate_selectivity(node.input(1))
            }
            PhysicalOperator::NestedLoopsJoin(join) => {
                self.join_predicate_selectivity(Some(join.join_predicate()), node)
                    * self.estimate_selectivity(node.input(0))
                    * self.estimate_selectivity(node.input(1))
            }
            PhysicalOperator::FilterJoin(filter_join) => {
                self.predicate_selectivity(filter_join.build_side_filter_predicate(), node.input(1))
                    * self.estimate_selectivity(node.input(0))
                    * self.estimate_selectivity(node.input(1))
            }
            PhysicalOperator::Aggregate(aggregate) => {
                self.predicate_selectivity(aggregate.filter_predicate(), node.input(0))
                    * self.estimate_selectivity(node.input(0))
            }
            PhysicalOperator::SharedSubplanReference(reference) => {
                self.estimate_selectivity(self.shared_subplan(reference.subplan_id()))
            }
            _ if node.inputs().len() == 1 => self.estimate_selectivity(node.input(0)),
            _ => 1.0,
        }
    }

    fn table_cardinality(&self, table: &TableReference) -> usize {
        let relation = table.relation();
        self.stats
            .num_tuples(relation.name())
            .unwrap_or_else(|| relation.estimated_num_tuples())
    }

    /// Selectivity of a filter evaluated over the output of `input`.
    pub fn predicate_selectivity(&self, predicate: Option<&Predicate>, input: &PlanNodeRef) -> f64 {
        match predicate {
            Some(predicate) => estimate_selectivity_for_predicate(predicate, &|attr| {
                self.known_num_distinct_values(attr, input)
            }),
            None => 1.0,
        }
    }

    /// Selectivity of a predicate over the attributes of both join inputs.
    fn join_predicate_selectivity(&self, predicate: Option<&Predicate>, join: &PlanNodeRef) -> f64 {
        match predicate {
            Some(predicate) => estimate_selectivity_for_predicate(predicate, &|attr| {
                join.inputs()
                    .iter()
                    .find_map(|input| self.known_num_distinct_values(attr, input))
            }),
            None => 1.0,
        }
    }

    /// Distinct value count of `attr` traced to a catalog statistic, if such a path exists.
    pub fn known_num_distinct_values(&self, attr: ExprId, node: &PlanNodeRef) -> Option<usize> {
        let scaled = |d: usize, selectivity: f64| ((d as f64 * selectivity) as usize).max(1);
        match node.operator() {
            PhysicalOperator::TableReference(table) => {
                let attribute = table.attribute_list().iter().find(|a| a.id() == attr)?;
                let column = table.column_name(attribute)?;
                self.stats
                    .num_distinct_values(table.relation().name(), column)
                    .map(|d| d.max(1))
            }
            PhysicalOperator::Selection(selection) => {
                if !outputs(node, attr) {
                    return None;
                }
                let d = self.known_num_distinct_values(attr, node.input(0))?;
                Some(scaled(
                    d,
                    self.predicate_selectivity(selection.filter_predicate(), node.input(0)),
                ))
            }
            PhysicalOperator::Aggregate(aggregate) => {
                if !outputs(node, attr) {
                    return None;
                }
                let d = self.known_num_distinct_values(attr, node.input(0))?;
                Some(scaled(
                    d,
                    self.predicate_selectivity(aggregate.filter_predicate(), node.input(0)),
                ))
            }
            PhysicalOperator::HashJoin(_) | PhysicalOperator::FilterJoin(_) => {
                if !outputs(node, attr) {
                    return None;
                }
                let (left, right) = (node.input(0), node.input(1));
                if outputs(left, attr) {
                    let d = self.known_num_distinct_values(attr, left)?;
                    Some(scaled(d, self.estimate_selectivity(right)))
                } else {
                    let d = self.known_num_distinct_values(attr, right)?;
                    Some(scaled(d, self.estimate_selectivity(left)))
                }
            }
            PhysicalOperator::SharedSubplanReference(reference) => {
                let position = node.output_attributes().iter().position(|a| a.id() == attr)?;
                let referenced = node.referenced_attributes();
                self.known_num_distinct_values(
                    referenced.get(position)?.id(),
                    self.shared_subplan(reference.subplan_id()),
                )
            }
            PhysicalOperator::TopLevelPlan(_)
            | PhysicalOperator::Sort(_)
            | PhysicalOperator::Sample(_)
            | PhysicalOperator::WindowAggregate(_) => {
                self.known_num_distinct_values(attr, node.input(0))
            }
            _ => None,
        }
    }

    /// Whether the rows of `node` are unique on (a subset of) `attributes`.
    pub fn implies_unique_attributes(
        &self,
        node: &PlanNodeRef,
        attributes: &[AttributeReference],
    ) -> bool {
        match node.operator() {
            PhysicalOperator::TableReference(table) => {
                let num_tuples = match self.stats.num_tuples(table.relation().name()) {
                    Some(n) if n > 0 => n,
                    _ => return false,
                };
                attributes.iter().any(|attr| {
                    table
                        .column_name(attr)
                        .and_then(|column| {
                            self.stats
                                .num_distinct_values(table.relation().name(), column)
                        })
                        .map_or(false, |d| d == num_tuples)
                })
            }
            PhysicalOperator::Aggregate(aggregate) => {
                let ids: HashSet<ExprId> = attributes.iter().map(|a| a.id()).collect();
                aggregate
                    .grouping_expressions()
                    .iter()
                    .all(|expr| ids.contains(&expr.id()))
            }
            PhysicalOperator::HashJoin(join) => {
                let (left, right) = (node.input(0), node.input(1));
                let unique_from_left = self
                    .implies_unique_attributes(right, join.right_join_attributes())
                    && self.implies_unique_attributes(left, attributes);
                let unique_from_right = self
                    .implies_unique_attributes(left, join.left_join_attributes())
                    && self.implies_unique_attributes(right, attributes);
                unique_from_left || unique_from_right
            }
            PhysicalOperator::Selection(_)
            | PhysicalOperator::Sort(_)
            | PhysicalOperator::Sample(_)
            | PhysicalOperator::FilterJoin(_) => {
                self.implies_unique_attributes(node.input(0), attributes)
            }
            _ => false,
        }
    }

    /// Catalog bounds of `attr`, found by walking down to the stored relation producing it.
    pub fn find_min_max(&self, node: &PlanNodeRef, attr: &AttributeReference) -> Option<ValueRange> {
        match node.operator() {
            PhysicalOperator::TableReference(table) => {
                let column = table.column_name(attr)?;
                self.stats.min_max(table.relation().name(), column)
            }
            PhysicalOperator::SharedSubplanReference(reference) => {
                let position = node
                    .output_attributes()
                    .iter()
                    .position(|a| a.id() == attr.id())?;
                let referenced = node.referenced_attributes();
                self.find_min_max(self.shared_subplan(reference.subplan_id()), referenced.get(position)?)
            }
            _ => node
                .inputs()
                .iter()
                .find(|input| outputs(input, attr.id()))
                .and_then(|input| self.find_min_max(input, attr)),
        }
    }

    /// Number of slots needed to aggregate `node` into a vector indexed by its grouping key,
    /// or `None` when the aggregation has to hash its keys.
    ///
    /// Requires a single integer grouping attribute with exact non negative catalog bounds
    /// below `max_table_size`, a key range not much sparser than the estimated groups, and
    /// only non distinct SUM and COUNT functions over at most one numeric argument.
    pub fn collision_free_num_groups(
        &self,
        node: &PlanNodeRef,
        max_table_size: usize,
    ) -> Option<usize> {
        let aggregate = node.operator().as_aggregate()?;
        let key = match aggregate.grouping_expressions() {
            [expr] => expr.as_attribute()?,
            _ => return None,
        };
        if !key.data_type().is_integer() {
            return None;
        }

        let range = self.find_min_max(node.input(0), key)?;
        if !range.exact || range.low.as_i64()? < 0 {
            return None;
        }
        let max = usize::try_from(range.high.as_i64()?).ok()?;
        if max >= max_table_size {
            return None;
        }
        if max / self.estimate_num_groups_for_aggregate(node) > COLLISION_FREE_MAX_SPARSITY {
            return None;
        }

        let supported = aggregate
            .aggregate_expressions()
            .iter()
            .all(|alias| match alias.expr() {
                Scalar::Aggregate(function) => {
                    !function.is_distinct()
                        && matches!(function.kind(), AggregateKind::Sum | AggregateKind::Count)
                        && function.arguments().len() <= 1
                        && function
                            .arguments()
                            .iter()
                            .all(|argument| argument.data_type().is_numeric())
                }
                _ => false,
            });
        supported.then(|| max + 1)
    }
}

fn outputs(node: &PlanNodeRef, attr: ExprId) -> bool {
    node.output_attributes().iter().any(|a| a.id() == attr)
}

impl CostModel for StarSchemaCostModel {
    fn estimate_cardinality(&self, node: &PlanNodeRef) -> usize {
        if let Some(memo) = &self.memo {
            if let Some(cardinality) = memo.borrow().cardinality.get(&node.id()) {
                return *cardinality;
            }
        }

        let cardinality = self.compute_cardinality(node);
        trace!("Estimated cardinality of {}#{}: {}", node.name(), node.id(), cardinality);

        if let Some(memo) = &self.memo {
            memo.borrow_mut().cardinality.insert(node.id(), cardinality);
        }
        cardinality
    }

    fn estimate_selectivity(&self, node: &PlanNodeRef) -> f64 {
        if let Some(memo) = &self.memo {
            if let Some(selectivity) = memo.borrow().selectivity.get(&node.id()) {
                return *selectivity;
            }
        }

        let selectivity = self.compute_selectivity(node);

        if let Some(memo) = &self.memo {
            memo.borrow_mut().selectivity.insert(node.id(), selectivity);
        }
        selectivity
    }

    fn estimate_num_groups_for_aggregate(&self, node: &PlanNodeRef) -> usize {
        let aggregate = node
            .operator()
            .as_aggregate()
            .unwrap_or_else(|| panic!("{} is not an aggregate", node.name()));
        if aggregate.grouping_expressions().is_empty() {
            return 1;
        }

        let input = node.input(0);
        let mut num_groups: usize = 1;
        let mut max_single_num_distinct_values: usize = 1;
        for expr in aggregate.grouping_expressions() {
            let d = match expr.as_attribute() {
                Some(attr) => self.estimate_num_distinct_values(attr.id(), input),
                None => NON_ATTRIBUTE_GROUPING_NUM_DISTINCT_VALUES,
            };
            num_groups = num_groups.saturating_mul(d);
            max_single_num_distinct_values = max_single_num_distinct_values.max(d);
        }

        num_groups
            .min(self.estimate_cardinality(input) / AGGREGATE_GROUP_DAMPENING)
            .max(max_single_num_distinct_values)
    }

    fn estimate_num_distinct_values(&self, attr: ExprId, node: &PlanNodeRef) -> usize {
        self.known_num_distinct_values(attr, node)
            .unwrap_or(DEFAULT_NUM_DISTINCT_VALUES)
            .max(1)
    }
}
