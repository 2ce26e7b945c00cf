use std::collections::BTreeMap;
use std::rc::Rc;

use log::debug;

use crate::cost::{CostModel, StarSchemaCostModel};
use crate::error::OptResult;
use crate::expr::{
    to_named_expressions, to_refs, AggregateFunction, AggregateKind, Alias, BinaryOp,
    NamedExpression, Scalar,
};
use crate::heuristic::{HepOptimizer, MatchOrder, NodeRule};
use crate::operator::{PhysicalOperator, PhysicalType, Selection};
use crate::optimizer::OptimizerContext;
use crate::plan::{PlanNodeBuilder, PlanNodeRef};
use crate::rules::Rule;

/// Computes each distinct aggregate function of an aggregate once.
///
/// Repeated functions over the same argument are evaluated a single time, and `AVG(x)` is
/// derived from `SUM(x)` and `COUNT(x)` when the aggregate computes a count anyway. The reduced
/// aggregate is wrapped in a selection restoring the original output columns.
pub struct ReuseAggregateExpressions {
    context: Rc<OptimizerContext>,
}

impl ReuseAggregateExpressions {
    pub fn new(context: Rc<OptimizerContext>) -> Self {
        Self { context }
    }
}

impl Rule for ReuseAggregateExpressions {
    fn name(&self) -> &'static str {
        "ReuseAggregateExpressions"
    }

    fn apply(&self, input: &PlanNodeRef) -> OptResult<PlanNodeRef> {
        debug_assert_eq!(PhysicalType::TopLevelPlan, input.physical_type());
        let rule = ReuseAggregateNodes {
            context: self.context.clone(),
            cost_model: self.context.cost_model(input),
        };
        HepOptimizer::new(MatchOrder::BottomUp, 1, vec![Box::new(rule)]).find_best_plan(input)
    }
}

/// How an aggregate function gets its value from the other functions of its aggregate.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Reuse {
    /// Same value as the function at this position.
    Duplicate(usize),
    /// `sum / count`. Without a SUM over the argument the AVG itself becomes one.
    Average { sum: Option<usize>, count: usize },
}

struct ReuseAggregateNodes {
    context: Rc<OptimizerContext>,
    cost_model: StarSchemaCostModel,
}

/// Whether the argument may evaluate to NULL. Only non null literals are known not to.
fn is_nullable(argument: &Scalar) -> bool {
    argument.as_literal().map_or(true, |literal| literal.is_null())
}

impl ReuseAggregateNodes {
    fn find_reuses(aggregate_expressions: &[Alias]) -> Vec<Option<Reuse>> {
        // Positions of the non distinct functions over each argument, per kind. COUNT(*) and
        // counts of non null arguments are all the same count.
        let mut by_argument: Vec<(&Scalar, BTreeMap<AggregateKind, Vec<usize>>)> = vec![];
        let mut count_star: Vec<usize> = vec![];
        for (i, alias) in aggregate_expressions.iter().enumerate() {
            let function = match alias.expr() {
                Scalar::Aggregate(function) if !function.is_distinct() => function,
                _ => continue,
            };
            let argument = match function.arguments() {
                [] if function.kind() == AggregateKind::Count => {
                    count_star.insert(0, i);
                    continue;
                }
                [argument] if function.kind() == AggregateKind::Count && !is_nullable(argument) => {
                    count_star.push(i);
                    continue;
                }
                [argument] => argument,
                _ => continue,
            };
            let position = match by_argument.iter().position(|(a, _)| *a == argument) {
                Some(position) => position,
                None => {
                    by_argument.push((argument, BTreeMap::new()));
                    by_argument.len() - 1
                }
            };
            by_argument[position]
                .1
                .entry(function.kind())
                .or_default()
                .push(i);
        }

        let mut reuses = vec![None; aggregate_expressions.len()];
        if let Some((first, rest)) = count_star.split_first() {
            for i in rest {
                reuses[*i] = Some(Reuse::Duplicate(*first));
            }
        }

        for (argument, kinds) in &by_argument {
            let count = if is_nullable(argument) {
                kinds.get(&AggregateKind::Count).map(|positions| positions[0])
            } else {
                count_star.first().copied()
            };
            let average = kinds.get(&AggregateKind::Avg).zip(count);
            if let Some((averages, count)) = average {
                let sum = kinds.get(&AggregateKind::Sum).map(|positions| positions[0]);
                reuses[averages[0]] = Some(Reuse::Average { sum, count });
                // Later AVGs divide the SUM the first one is turned into.
                let sum = sum.or(Some(averages[0]));
                for i in &averages[1..] {
                    reuses[*i] = Some(Reuse::Average { sum, count });
                }
            }

            for (kind, positions) in kinds {
                if *kind == AggregateKind::Avg && average.is_some() {
                    continue;
                }
                for i in &positions[1..] {
                    reuses[*i] = Some(Reuse::Duplicate(positions[0]));
                }
            }
        }
        reuses
    }

    fn is_worth_reducing(&self, node: &PlanNodeRef, num_eliminable: usize, num_total: usize) -> bool {
        let config = self.context.config();
        self.cost_model.estimate_num_groups_for_aggregate(node)
            < config.reuse_aggregate_group_size_threshold
            || num_eliminable as f64 / num_total as f64 > config.reuse_aggregate_ratio_threshold
    }
}

impl NodeRule for ReuseAggregateNodes {
    fn name(&self) -> &'static str {
        "ReuseAggregateExpressions"
    }

    fn apply_to_node(&self, node: &PlanNodeRef) -> OptResult<PlanNodeRef> {
        let aggregate = match node.operator() {
            PhysicalOperator::Aggregate(aggregate) => aggregate,
            _ => return Ok(node.clone()),
        };
        let aggregate_expressions = aggregate.aggregate_expressions();
        let reuses = Self::find_reuses(aggregate_expressions);

        // Functions no longer computed by the reduced aggregate.
        let num_eliminable = reuses
            .iter()
            .filter(|reuse| {
                matches!(
                    reuse,
                    Some(Reuse::Duplicate(_)) | Some(Reuse::Average { sum: Some(_), .. })
                )
            })
            .count();
        if num_eliminable == 0
            || !self.is_worth_reducing(node, num_eliminable, aggregate_expressions.len())
        {
            return Ok(node.clone());
        }
        debug!(
            "Reusing {} of {} aggregate functions of Aggregate#{}",
            num_eliminable,
            aggregate_expressions.len(),
            node.id()
        );

        let mut refs: Vec<Scalar> = aggregate_expressions
            .iter()
            .map(|alias| NamedExpression::Alias(alias.clone()).to_ref().into())
            .collect();
        let mut new_aggregate_expressions = vec![];
        let mut project_expressions = to_named_expressions(&to_refs(
            aggregate.grouping_expressions(),
        ));
        for (i, (alias, reuse)) in aggregate_expressions.iter().zip(&reuses).enumerate() {
            let project = match reuse {
                None => {
                    new_aggregate_expressions.push(alias.clone());
                    refs[i].clone()
                }
                Some(Reuse::Duplicate(source)) => refs[*source].clone(),
                Some(Reuse::Average { sum, count }) => {
                    let sum = match sum {
                        Some(sum) if *sum != i => refs[*sum].clone(),
                        _ => {
                            let arguments = match alias.expr() {
                                Scalar::Aggregate(function) => function.arguments().to_vec(),
                                _ => unreachable!("only aggregate functions are reused"),
                            };
                            let sum = Alias::new(
                                self.context.expr_id_gen().next(),
                                alias.name(),
                                alias.relation(),
                                Scalar::Aggregate(AggregateFunction::new(
                                    AggregateKind::Sum,
                                    arguments,
                                    false,
                                )),
                            );
                            new_aggregate_expressions.push(sum.clone());
                            let sum: Scalar = NamedExpression::Alias(sum).to_ref().into();
                            refs[i] = sum.clone();
                            sum
                        }
                    };
                    Scalar::binary(BinaryOp::Divide, sum, refs[*count].clone())
                }
            };
            project_expressions.push(match project {
                Scalar::Attribute(attr) if attr.id() == alias.id() => attr.into(),
                project => {
                    Alias::new(alias.id(), alias.name(), alias.relation(), project).into()
                }
            });
        }

        let reduced = PlanNodeBuilder::new(PhysicalOperator::Aggregate(
            aggregate.with_aggregate_expressions(new_aggregate_expressions),
        ))
        .add_inputs(vec![node.input(0).clone()])
        .build_ref();
        Ok(PlanNodeBuilder::new(PhysicalOperator::Selection(Selection::new(
            project_expressions,
            None,
        )))
        .add_inputs(vec![reduced])
        .build_ref())
    }
}
