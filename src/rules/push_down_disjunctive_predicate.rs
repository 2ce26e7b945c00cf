use std::collections::HashMap;
use std::rc::Rc;

use log::debug;

use crate::cost::{CostModel, StarSchemaCostModel};
use crate::error::OptResult;
use crate::expr::{subset_of_expressions, to_named_expressions, Predicate};
use crate::operator::{JoinType, PhysicalOperator, PhysicalType, Selection};
use crate::optimizer::OptimizerContext;
use crate::plan::{PlanNodeBuilder, PlanNodeId, PlanNodeRef};
use crate::rules::Rule;

/// Pre-filters small stored relations with the part of a disjunctive predicate that only
/// references them.
///
/// For `(d.c = 1 AND f.v > 5) OR (d.c = 2 AND f.v < 3)` above a join of `f` and `d`, the scan
/// of `d` gets a selection on `d.c = 1 OR d.c = 2`. The original predicate stays in place.
pub struct PushDownLowCostDisjunctivePredicate {
    context: Rc<OptimizerContext>,
}

impl PushDownLowCostDisjunctivePredicate {
    pub fn new(context: Rc<OptimizerContext>) -> Self {
        Self { context }
    }
}

impl Rule for PushDownLowCostDisjunctivePredicate {
    fn name(&self) -> &'static str {
        "PushDownLowCostDisjunctivePredicate"
    }

    fn apply(&self, input: &PlanNodeRef) -> OptResult<PlanNodeRef> {
        debug_assert_eq!(PhysicalType::TopLevelPlan, input.physical_type());
        let mut collector = PredicateCollector {
            cost_model: self.context.cost_model(input),
            cardinality_threshold: self.context.config().disjunctive_predicate_cardinality_threshold,
            predicates: HashMap::new(),
        };
        collector.collect(input);

        if collector.predicates.is_empty() {
            return Ok(input.clone());
        }
        debug!(
            "Pushing down disjunctive predicates to {} stored relations",
            collector.predicates.len()
        );
        Ok(collector.attach(input))
    }
}

struct PredicateCollector {
    cost_model: StarSchemaCostModel,
    cardinality_threshold: usize,
    /// Pre-filters per small table reference.
    predicates: HashMap<PlanNodeId, Vec<Predicate>>,
}

impl PredicateCollector {
    /// Collects pre-filters in the subtree of `node`, returning the small table references a
    /// predicate above `node` may filter.
    fn collect(&mut self, node: &PlanNodeRef) -> Vec<PlanNodeRef> {
        if let PhysicalOperator::TableReference(_) = node.operator() {
            return if self.cost_model.estimate_cardinality(node) <= self.cardinality_threshold {
                vec![node.clone()]
            } else {
                vec![]
            };
        }

        let mut tables = vec![];
        for (idx, input) in node.inputs().iter().enumerate() {
            let input_tables = self.collect(input);
            if is_filterable_from_above(node, idx) {
                tables.extend(input_tables);
            }
        }

        let filter_predicate = match node.operator() {
            PhysicalOperator::Aggregate(aggregate) => aggregate.filter_predicate(),
            PhysicalOperator::HashJoin(join) if join.join_type() == JoinType::Inner => {
                join.residual_predicate()
            }
            PhysicalOperator::NestedLoopsJoin(join) => Some(join.join_predicate()),
            PhysicalOperator::Selection(selection) => selection.filter_predicate(),
            _ => None,
        };
        if let Some(Predicate::Or(disjuncts)) = filter_predicate {
            for table in &tables {
                if let Some(predicate) = restrict_to_table(disjuncts, table) {
                    self.predicates.entry(table.id()).or_default().push(predicate);
                }
            }
        }

        match node.operator() {
            PhysicalOperator::Sort(sort) if sort.limit().is_some() => vec![],
            PhysicalOperator::WindowAggregate(_) => vec![],
            _ => tables,
        }
    }

    fn attach(&self, node: &PlanNodeRef) -> PlanNodeRef {
        let new_inputs: Vec<PlanNodeRef> = node.inputs().iter().map(|c| self.attach(c)).collect();
        let changed = new_inputs
            .iter()
            .zip(node.inputs())
            .any(|(new_input, input)| !Rc::ptr_eq(new_input, input));
        let output = if changed {
            node.copy_with_new_children(new_inputs)
        } else {
            node.clone()
        };

        match self.predicates.get(&node.id()) {
            Some(predicates) => {
                let project = to_named_expressions(&output.output_attributes());
                PlanNodeBuilder::new(PhysicalOperator::Selection(Selection::new(
                    project,
                    Some(Predicate::and(predicates.clone())),
                )))
                .add_inputs(vec![output])
                .build_ref()
            }
            None => output,
        }
    }
}

/// Whether a predicate above `node` may filter rows of its `idx`th input early. The null
/// supplying side of an outer join may not.
fn is_filterable_from_above(node: &PlanNodeRef, idx: usize) -> bool {
    match node.operator() {
        PhysicalOperator::HashJoin(join) => idx == 0 || join.join_type() == JoinType::Inner,
        PhysicalOperator::TopLevelPlan(_) => false,
        _ => true,
    }
}

/// The disjunction of the conjuncts of each disjunct referencing only `table`, if every
/// disjunct has at least one of them.
fn restrict_to_table(disjuncts: &[Predicate], table: &PlanNodeRef) -> Option<Predicate> {
    let table_attributes = table.output_attributes();
    let mut restricted = Vec::with_capacity(disjuncts.len());
    for disjunct in disjuncts {
        let selected: Vec<Predicate> = disjunct
            .conjuncts()
            .into_iter()
            .filter(|conjunct| {
                subset_of_expressions(&conjunct.referenced_attributes(), &table_attributes)
            })
            .cloned()
            .collect();
        if selected.is_empty() {
            return None;
        }
        restricted.push(Predicate::and(selected));
    }
    Some(Predicate::or(restricted))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OptimizerConfig;
    use crate::expr::{AttributeReference, ComparisonOp, DataType, ExprId, ExprIdGen, Literal};
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

    fn rule() -> PushDownLowCostDisjunctivePredicate {
        let stats = Statistics::new()
            .with_num_tuples("f", 1_000_000)
            .with_num_tuples("d", 10);
        PushDownLowCostDisjunctivePredicate::new(Rc::new(OptimizerContext::new(
            OptimizerConfig::default(),
            Rc::new(stats),
            ExprIdGen::starting_after(ExprId::from(100)),
        )))
    }

    fn compare(op: ComparisonOp, attr: &AttributeReference, value: i32) -> Predicate {
        Predicate::comparison(op, attr.clone(), Literal::Int(value))
    }

    /// `f` joined with `d` under a selection on `filter`.
    fn filtered_join(filter: Predicate, join_type: JoinType) -> PlanNodeRef {
        let (fk, v) = (attr(1, "fk", "f"), attr(2, "v", "f"));
        let (pk, c) = (attr(3, "pk", "d"), attr(4, "c", "d"));
        scan("f", &[fk.clone(), v.clone()])
            .hash_join(
                scan("d", &[pk.clone(), c.clone()]).node(),
                vec![fk],
                vec![pk],
                None,
                to_named_expressions(&[v, c]),
                join_type,
            )
            .unwrap()
            .filter(filter)
            .build()
            .root()
    }

    fn mixed_disjunction() -> Predicate {
        let (v, c) = (attr(2, "v", "f"), attr(4, "c", "d"));
        Predicate::or(vec![
            Predicate::and(vec![
                compare(ComparisonOp::Equal, &c, 1),
                compare(ComparisonOp::Greater, &v, 5),
            ]),
            Predicate::and(vec![
                compare(ComparisonOp::Equal, &c, 2),
                compare(ComparisonOp::Less, &v, 3),
            ]),
        ])
    }

    #[test]
    fn test_small_table_gets_restricted_disjunction() {
        let root = filtered_join(mixed_disjunction(), JoinType::Inner);
        let output = rule().apply(&root).unwrap();

        // The selection above the join is kept as is.
        let selection = output.input(0);
        assert_eq!(
            root.input(0).operator().as_selection().unwrap().filter_predicate(),
            selection.operator().as_selection().unwrap().filter_predicate()
        );
        let join = selection.input(0);
        assert!(Rc::ptr_eq(root.input(0).input(0).input(0), join.input(0)));

        let pre_filter = join.input(1);
        let c = attr(4, "c", "d");
        assert_eq!(
            Some(&Predicate::or(vec![
                compare(ComparisonOp::Equal, &c, 1),
                compare(ComparisonOp::Equal, &c, 2),
            ])),
            pre_filter.operator().as_selection().unwrap().filter_predicate()
        );
        assert_eq!(PhysicalType::TableReference, pre_filter.input(0).physical_type());
        assert_eq!(
            root.input(0).input(0).input(1).output_attributes(),
            pre_filter.output_attributes()
        );
    }

    #[test]
    fn test_disjunct_without_table_conjunct_blocks_push_down() {
        let (v, c) = (attr(2, "v", "f"), attr(4, "c", "d"));
        let filter = Predicate::or(vec![
            compare(ComparisonOp::Equal, &c, 1),
            compare(ComparisonOp::Greater, &v, 5),
        ]);
        let root = filtered_join(filter, JoinType::Inner);
        assert!(Rc::ptr_eq(&root, &rule().apply(&root).unwrap()));
    }

    #[test]
    fn test_large_table_is_not_filtered() {
        let v = attr(2, "v", "f");
        let filter = Predicate::or(vec![
            compare(ComparisonOp::Equal, &v, 1),
            compare(ComparisonOp::Equal, &v, 2),
        ]);
        let root = filtered_join(filter, JoinType::Inner);
        assert!(Rc::ptr_eq(&root, &rule().apply(&root).unwrap()));
    }

    #[test]
    fn test_outer_join_build_side_is_not_filtered() {
        let root = filtered_join(mixed_disjunction(), JoinType::LeftOuter);
        assert!(Rc::ptr_eq(&root, &rule().apply(&root).unwrap()));
    }
}
