use std::rc::Rc;

use log::{debug, trace};

use crate::error::OptResult;
use crate::plan::PlanNodeRef;

/// Match order of plan tree.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MatchOrder {
    BottomUp,
    TopDown,
}

/// A rewrite looking at one node (and whatever it reaches from it) at a time.
///
/// Returning the same `Rc` means the rule did not apply.
pub trait NodeRule {
    fn name(&self) -> &'static str;

    fn apply_to_node(&self, node: &PlanNodeRef) -> OptResult<PlanNodeRef>;
}

pub struct HepOptimizer {
    match_order: MatchOrder,
    /// Max number of iteration
    max_iter_times: usize,
    rules: Vec<Box<dyn NodeRule>>,
}

impl HepOptimizer {
    pub fn new(match_order: MatchOrder, max_iter_times: usize, rules: Vec<Box<dyn NodeRule>>) -> Self {
        Self {
            match_order,
            max_iter_times,
            rules,
        }
    }

    /// Runs the rules over the whole tree until it no longer changes.
    pub fn find_best_plan(&self, root: &PlanNodeRef) -> OptResult<PlanNodeRef> {
        let mut plan = root.clone();
        for times in 0..self.max_iter_times {
            let new_plan = self.apply_to_tree(&plan)?;
            // The plan no longer changes after iteration
            if Rc::ptr_eq(&new_plan, &plan) {
                debug!("Reached fixed point after {} iterations", times);
                return Ok(plan);
            }
            plan = new_plan;
        }

        debug!("Stopped after {} iterations", self.max_iter_times);
        Ok(plan)
    }

    fn apply_to_tree(&self, node: &PlanNodeRef) -> OptResult<PlanNodeRef> {
        match self.match_order {
            MatchOrder::TopDown => {
                let node = self.apply_rules(node)?;
                self.apply_to_children(&node)
            }
            MatchOrder::BottomUp => {
                let node = self.apply_to_children(node)?;
                self.apply_rules(&node)
            }
        }
    }

    fn apply_to_children(&self, node: &PlanNodeRef) -> OptResult<PlanNodeRef> {
        let new_inputs = node
            .inputs()
            .iter()
            .map(|input| self.apply_to_tree(input))
            .collect::<OptResult<Vec<_>>>()?;

        let changed = new_inputs
            .iter()
            .zip(node.inputs())
            .any(|(new_input, input)| !Rc::ptr_eq(new_input, input));
        if changed {
            Ok(node.copy_with_new_children(new_inputs))
        } else {
            Ok(node.clone())
        }
    }

    fn apply_rules(&self, node: &PlanNodeRef) -> OptResult<PlanNodeRef> {
        let mut node = node.clone();
        for rule in &self.rules {
            let new_node = rule.apply_to_node(&node)?;
            if Rc::ptr_eq(&new_node, &node) {
                trace!("Skipped applying rule {} to {}", rule.name(), node.name());
            } else {
                trace!(
                    "Applied rule {} to {}#{}, got {}#{}",
                    rule.name(),
                    node.name(),
                    node.id(),
                    new_node.name(),
                    new_node.id()
                );
                node = new_node;
            }
        }
        Ok(node)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::expr::{to_named_expressions, AttributeReference, DataType, ExprId, Predicate};
    use crate::operator::PhysicalOperator;
    use crate::plan::PhysicalPlanBuilder;
    use crate::stat::Relation;

    /// Removes Selections that have no filter and forward their input unchanged.
    struct RemoveNoopSelection {
        applied: Cell<usize>,
    }

    impl NodeRule for RemoveNoopSelection {
        fn name(&self) -> &'static str {
            "RemoveNoopSelection"
        }

        fn apply_to_node(&self, node: &PlanNodeRef) -> OptResult<PlanNodeRef> {
            if let PhysicalOperator::Selection(selection) = node.operator() {
                if selection.filter_predicate().is_none()
                    && node.output_attributes() == node.input(0).output_attributes()
                {
                    self.applied.set(self.applied.get() + 1);
                    return Ok(node.input(0).clone());
                }
            }
            Ok(node.clone())
        }
    }

    #[test]
    fn test_top_down_reaches_fixed_point() {
        let a = AttributeReference::new(ExprId::from(1), "a", "r", DataType::Int);
        let relation = Rc::new(Relation::new("r", vec![("a".to_string(), DataType::Int)]));
        let project = to_named_expressions(&[a.clone()]);
        let plan = PhysicalPlanBuilder::scan(relation, "r", vec![a.clone()])
            .select(project.clone(), None)
            .select(project.clone(), None)
            .filter(Predicate::eq(a.clone(), a))
            .select(project, None)
            .build();

        let rule = Rc::new(RemoveNoopSelection {
            applied: Cell::new(0),
        });
        let optimizer = HepOptimizer::new(
            MatchOrder::TopDown,
            10,
            vec![Box::new(RemoveNoopSelectionRef(rule.clone()))],
        );
        let optimized = optimizer.find_best_plan(&plan.root()).unwrap();

        assert_eq!(3, rule.applied.get());
        // TopLevelPlan -> Selection(filter) -> TableReference
        let filter = optimized.input(0);
        assert!(filter.operator().as_selection().unwrap().filter_predicate().is_some());
        assert!(matches!(
            filter.input(0).operator(),
            PhysicalOperator::TableReference(_)
        ));

        let again = optimizer.find_best_plan(&optimized).unwrap();
        assert!(Rc::ptr_eq(&again, &optimized));
    }

    struct RemoveNoopSelectionRef(Rc<RemoveNoopSelection>);

    impl NodeRule for RemoveNoopSelectionRef {
        fn name(&self) -> &'static str {
            self.0.name()
        }

        fn apply_to_node(&self, node: &PlanNodeRef) -> OptResult<PlanNodeRef> {
            self.0.apply_to_node(node)
        }
    }
}
