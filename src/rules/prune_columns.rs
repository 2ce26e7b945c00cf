use std::collections::HashSet;

use crate::error::OptResult;
use crate::expr::ExprId;
use crate::heuristic::{HepOptimizer, MatchOrder, NodeRule};
use crate::operator::PhysicalOperator;
use crate::plan::PlanNodeRef;
use crate::rules::Rule;

/// Bound on top down sweeps. A sweep prunes every level below a changed node, so the plan is
/// stable after one sweep in practice.
const MAX_PRUNE_ITERATIONS: usize = 8;

/// Drops output expressions no consumer references.
#[derive(Clone, Copy, Debug, Default)]
pub struct PruneColumns;

impl PruneColumns {
    pub fn new() -> Self {
        Self
    }
}

impl NodeRule for PruneColumns {
    fn name(&self) -> &'static str {
        "PruneColumns"
    }

    fn apply_to_node(&self, node: &PlanNodeRef) -> OptResult<PlanNodeRef> {
        if node.inputs().is_empty() || matches!(node.operator(), PhysicalOperator::TopLevelPlan(_)) {
            return Ok(node.clone());
        }

        let referenced: HashSet<ExprId> = node
            .referenced_attributes()
            .iter()
            .map(|attr| attr.id())
            .collect();

        let mut changed = false;
        let new_inputs: Vec<PlanNodeRef> = node
            .inputs()
            .iter()
            .map(|input| match input.maybe_copy_with_pruned_expressions(&referenced) {
                Some(pruned) => {
                    changed = true;
                    pruned
                }
                None => input.clone(),
            })
            .collect();

        if changed {
            Ok(node.copy_with_new_children(new_inputs))
        } else {
            Ok(node.clone())
        }
    }
}

impl Rule for PruneColumns {
    fn name(&self) -> &'static str {
        "PruneColumns"
    }

    fn apply(&self, input: &PlanNodeRef) -> OptResult<PlanNodeRef> {
        HepOptimizer::new(MatchOrder::TopDown, MAX_PRUNE_ITERATIONS, vec![Box::new(*self)])
            .find_best_plan(input)
    }
}

/// Runs column pruning as a standalone pass, for rules that create pruning opportunities.
pub(crate) fn prune_columns(input: &PlanNodeRef) -> OptResult<PlanNodeRef> {
    Rule::apply(&PruneColumns, input)
}
