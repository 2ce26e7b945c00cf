use std::collections::HashMap;
use std::rc::Rc;

use log::trace;

use crate::error::OptResult;
use crate::expr::{ExprId, NamedExpression};
use crate::operator::{PhysicalOperator, PhysicalType};
use crate::plan::{PlanNodeBuilder, PlanNodeRef};
use crate::rules::Rule;

/// Reorders the project expressions along chains of HashJoins and Selections, so that columns
/// living over the same stretch of the chain sit next to each other.
///
/// Within a chain, expressions are ordered by the first node producing them (GEN), then by the
/// last node producing them (KILL), then by their position in the input of the chain. The
/// topmost chain keeps its ordering, as it defines the order of the query output.
#[derive(Clone, Copy, Debug, Default)]
pub struct ReorderColumns;

impl ReorderColumns {
    pub fn new() -> Self {
        Self
    }

    fn apply_internal(&self, input: &PlanNodeRef, lock_ordering: bool) -> PlanNodeRef {
        let is_not_transformable = !is_transformable(input);
        if lock_ordering || is_not_transformable {
            let new_inputs: Vec<PlanNodeRef> = input
                .inputs()
                .iter()
                .map(|child| self.apply_internal(child, lock_ordering && is_not_transformable))
                .collect();
            let changed = new_inputs
                .iter()
                .zip(input.inputs())
                .any(|(new_input, child)| !Rc::ptr_eq(new_input, child));
            return if changed {
                input.copy_with_new_children(new_inputs)
            } else {
                input.clone()
            };
        }

        // Maximal chain, bottom up.
        let mut chain = vec![];
        let mut node = input.clone();
        while is_transformable(&node) {
            let next = node.input(0).clone();
            chain.push(node);
            node = next;
        }
        chain.reverse();

        let base_node = self.apply_internal(chain[0].input(0), false);
        let base: HashMap<ExprId, usize> = base_node
            .output_attributes()
            .iter()
            .enumerate()
            .map(|(position, attr)| (attr.id(), position))
            .collect();
        let mut gen: HashMap<ExprId, usize> = HashMap::new();
        let mut kill: HashMap<ExprId, usize> = HashMap::new();
        for (idx, node) in chain.iter().enumerate() {
            for attr in node.output_attributes() {
                gen.entry(attr.id()).or_insert(idx);
                kill.insert(attr.id(), idx);
            }
        }
        let sort_key = |expr: &NamedExpression| {
            let id = expr.id();
            (
                gen[&id],
                kill[&id],
                base.get(&id).copied().unwrap_or(usize::MAX),
                id,
            )
        };

        let mut changed = !Rc::ptr_eq(&base_node, chain[0].input(0));
        let mut output = base_node;
        for node in &chain {
            let (operator, mut new_inputs) = match node.operator() {
                PhysicalOperator::HashJoin(join) => {
                    let mut exprs = join.project_expressions().to_vec();
                    exprs.sort_by_key(|expr| sort_key(expr));
                    changed |= exprs != join.project_expressions();
                    let build = self.apply_internal(node.input(1), false);
                    changed |= !Rc::ptr_eq(&build, node.input(1));
                    (
                        PhysicalOperator::HashJoin(join.with_project_expressions(exprs)),
                        vec![build],
                    )
                }
                PhysicalOperator::Selection(selection) => {
                    let mut exprs = selection.project_expressions().to_vec();
                    exprs.sort_by_key(|expr| sort_key(expr));
                    changed |= exprs != selection.project_expressions();
                    (
                        PhysicalOperator::Selection(selection.with_project_expressions(exprs)),
                        vec![],
                    )
                }
                _ => unreachable!("{} is not reorderable", node.name()),
            };

            output = if changed {
                trace!("Reordering columns of {}#{}", node.name(), node.id());
                new_inputs.insert(0, output);
                PlanNodeBuilder::new(operator)
                    .add_inputs(new_inputs)
                    .with_physical_props(node.physical_props().clone())
                    .build_ref()
            } else {
                node.clone()
            };
        }
        output
    }
}

fn is_transformable(node: &PlanNodeRef) -> bool {
    matches!(
        node.physical_type(),
        PhysicalType::HashJoin | PhysicalType::Selection
    )
}

impl Rule for ReorderColumns {
    fn name(&self) -> &'static str {
        "ReorderColumns"
    }

    fn apply(&self, input: &PlanNodeRef) -> OptResult<PlanNodeRef> {
        debug_assert_eq!(PhysicalType::TopLevelPlan, input.physical_type());
        Ok(self.apply_internal(input, true))
    }
}
