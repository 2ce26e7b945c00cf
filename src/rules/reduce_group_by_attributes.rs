use std::collections::{BTreeMap, HashMap, HashSet};
use std::rc::Rc;

use log::debug;

use crate::cost::StarSchemaCostModel;
use crate::error::OptResult;
use crate::expr::{to_named_expressions, AttributeReference, ExprId, NamedExpression};
use crate::operator::{
    Aggregate, HashJoin, JoinType, PhysicalOperator, PhysicalType, Selection, TableReference,
};
use crate::optimizer::OptimizerContext;
use crate::plan::{PlanNodeBuilder, PlanNodeId, PlanNodeRef};
use crate::rules::{prune_columns, Rule};

/// Shrinks wide group by clauses. When an aggregate groups by many attributes of one stored
/// relation including a key of it, it groups by the key alone and the relation is joined back
/// on the key above the aggregate.
pub struct ReduceGroupByAttributes {
    context: Rc<OptimizerContext>,
}

impl ReduceGroupByAttributes {
    pub fn new(context: Rc<OptimizerContext>) -> Self {
        Self { context }
    }
}

impl Rule for ReduceGroupByAttributes {
    fn name(&self) -> &'static str {
        "ReduceGroupByAttributes"
    }

    fn apply(&self, input: &PlanNodeRef) -> OptResult<PlanNodeRef> {
        debug_assert_eq!(PhysicalType::TopLevelPlan, input.physical_type());
        let mut reducer = GroupByReducer {
            context: &self.context,
            cost_model: self.context.cost_model(input),
            threshold: self.context.config().reduce_group_by_attributes_threshold,
            source: HashMap::new(),
        };
        let output = reducer.apply_internal(input);
        if Rc::ptr_eq(&output, input) {
            Ok(output)
        } else {
            prune_columns(&output)
        }
    }
}

/// Ranks the group by attributes of one relation as join back key. Keys come first, then
/// fixed length attributes, then narrower ones.
#[derive(Debug)]
struct AttributeInfo<'a> {
    attribute: &'a AttributeReference,
    is_unique: bool,
    is_fixed_length: bool,
    maximum_size: usize,
}

impl AttributeInfo<'_> {
    fn rank(&self) -> (bool, bool, usize) {
        (!self.is_unique, !self.is_fixed_length, self.maximum_size)
    }
}

struct GroupByReducer<'a> {
    context: &'a OptimizerContext,
    cost_model: StarSchemaCostModel,
    threshold: usize,
    /// Table reference producing each stored attribute seen so far.
    source: HashMap<ExprId, (PlanNodeRef, AttributeReference)>,
}

impl GroupByReducer<'_> {
    fn apply_internal(&mut self, input: &PlanNodeRef) -> PlanNodeRef {
        let new_inputs: Vec<PlanNodeRef> =
            input.inputs().iter().map(|c| self.apply_internal(c)).collect();
        let changed = new_inputs
            .iter()
            .zip(input.inputs())
            .any(|(new_input, child)| !Rc::ptr_eq(new_input, child));
        if changed {
            self.apply_to_node(&input.copy_with_new_children(new_inputs))
        } else {
            self.apply_to_node(input)
        }
    }

    fn apply_to_node(&mut self, node: &PlanNodeRef) -> PlanNodeRef {
        let aggregate = match node.operator() {
            PhysicalOperator::TableReference(table) => {
                for attr in table.attribute_list() {
                    self.source.insert(attr.id(), (node.clone(), attr.clone()));
                }
                return node.clone();
            }
            PhysicalOperator::Aggregate(aggregate)
                if aggregate.grouping_expressions().len() > 1 =>
            {
                aggregate
            }
            _ => return node.clone(),
        };

        let mut table_attributes: BTreeMap<PlanNodeId, (PlanNodeRef, Vec<AttributeReference>)> =
            BTreeMap::new();
        for expr in aggregate.grouping_expressions() {
            if let Some((table, attr)) = self.source.get(&expr.id()) {
                table_attributes
                    .entry(table.id())
                    .or_insert_with(|| (table.clone(), vec![]))
                    .1
                    .push(attr.clone());
            }
        }

        let mut erased_ids = HashSet::new();
        let mut hoisted_tables = vec![];
        for (table, attributes) in table_attributes.into_values() {
            if attributes.len() <= self.threshold {
                continue;
            }
            let best = attributes
                .iter()
                .map(|attr| AttributeInfo {
                    attribute: attr,
                    is_unique: self
                        .cost_model
                        .implies_unique_attributes(&table, std::slice::from_ref(attr)),
                    is_fixed_length: !attr.data_type().is_variable_length(),
                    maximum_size: attr.data_type().maximum_byte_length(),
                })
                .min_by_key(|info| info.rank());
            let key = match best {
                Some(info) if info.is_unique => info.attribute.clone(),
                _ => continue,
            };
            erased_ids.extend(
                attributes
                    .iter()
                    .map(|attr| attr.id())
                    .filter(|id| *id != key.id()),
            );
            hoisted_tables.push((table, key));
        }

        if erased_ids.is_empty() {
            return node.clone();
        }
        debug!(
            "Reducing {} group by attributes of Aggregate#{}",
            erased_ids.len(),
            node.id()
        );

        let reduced_grouping: Vec<NamedExpression> = aggregate
            .grouping_expressions()
            .iter()
            .filter(|expr| !erased_ids.contains(&expr.id()))
            .cloned()
            .collect();
        let mut output = PlanNodeBuilder::new(PhysicalOperator::Aggregate(Aggregate::new(
            reduced_grouping,
            aggregate.aggregate_expressions().to_vec(),
            aggregate.filter_predicate().cloned(),
        )))
        .add_inputs(vec![node.input(0).clone()])
        .build_ref();

        let mut project_expressions = to_named_expressions(&output.output_attributes());
        for (table, key) in hoisted_tables {
            let source_table = table
                .operator()
                .as_table_reference()
                .unwrap_or_else(|| panic!("{} is not a table reference", table.name()));
            let build_key = key.with_new_id(self.context.expr_id_gen().next());
            let attribute_list = source_table
                .attribute_list()
                .iter()
                .map(|attr| {
                    if attr.id() == key.id() {
                        build_key.clone()
                    } else {
                        project_expressions.push(attr.clone().into());
                        attr.clone()
                    }
                })
                .collect();
            let build = PlanNodeBuilder::new(PhysicalOperator::TableReference(TableReference::new(
                source_table.relation().clone(),
                source_table.alias(),
                attribute_list,
            )))
            .build_ref();
            output = PlanNodeBuilder::new(PhysicalOperator::HashJoin(HashJoin::new(
                vec![key],
                vec![build_key],
                None,
                project_expressions.clone(),
                JoinType::Inner,
            )))
            .add_inputs(vec![output, build])
            .build_ref();
        }

        // Restore the output order of the aggregate.
        PlanNodeBuilder::new(PhysicalOperator::Selection(Selection::new(
            to_named_expressions(&node.output_attributes()),
            None,
        )))
        .add_inputs(vec![output])
        .build_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OptimizerConfig;
    use crate::expr::{
        AggregateFunction, AggregateKind, Alias, DataType, ExprIdGen, Scalar,
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

    fn rule(threshold: usize, pk_distinct_values: usize) -> ReduceGroupByAttributes {
        let stats = Statistics::new()
            .with_num_tuples("f", 1_000_000)
            .with_num_tuples("d", 100)
            .with_num_distinct_values("d", "pk", pk_distinct_values);
        let config = OptimizerConfig {
            reduce_group_by_attributes_threshold: threshold,
            ..OptimizerConfig::default()
        };
        ReduceGroupByAttributes::new(Rc::new(OptimizerContext::new(
            config,
            Rc::new(stats),
            ExprIdGen::starting_after(ExprId::from(100)),
        )))
    }

    /// `SELECT pk, a, b, c, SUM(v) FROM f JOIN d ON fk = pk GROUP BY pk, a, b, c`
    fn wide_group_by() -> PlanNodeRef {
        let (fk, v) = (attr(1, "fk", "f"), attr(2, "v", "f"));
        let d_attrs = [
            attr(3, "pk", "d"),
            attr(4, "a", "d"),
            attr(5, "b", "d"),
            attr(6, "c", "d"),
        ];
        let sum = Alias::new(
            ExprId::from(7),
            "s",
            "",
            Scalar::Aggregate(AggregateFunction::new(
                AggregateKind::Sum,
                vec![v.clone().into()],
                false,
            )),
        );
        let mut join_project = to_named_expressions(&d_attrs);
        join_project.push(v.clone().into());
        scan("f", &[fk.clone(), v])
            .hash_join(
                scan("d", &d_attrs).node(),
                vec![fk],
                vec![d_attrs[0].clone()],
                None,
                join_project,
                JoinType::Inner,
            )
            .unwrap()
            .aggregate(to_named_expressions(&d_attrs), vec![sum], None)
            .build()
            .root()
    }

    fn ids(node: &PlanNodeRef) -> Vec<ExprId> {
        node.output_attributes().iter().map(|a| a.id()).collect()
    }

    #[test]
    fn test_key_replaces_wide_group_by() {
        let root = wide_group_by();
        let output = rule(3, 100).apply(&root).unwrap();

        let selection = output.input(0);
        assert_eq!(PhysicalType::Selection, selection.physical_type());
        assert_eq!(ids(root.input(0)), ids(selection));

        let join = selection.input(0);
        let hash_join = join.operator().as_hash_join().unwrap();
        assert_eq!(&[attr(3, "pk", "d")], hash_join.left_join_attributes());
        assert_eq!(ExprId::from(101), hash_join.right_join_attributes()[0].id());

        let aggregate = join.input(0).operator().as_aggregate().unwrap();
        assert_eq!(
            vec![ExprId::from(3)],
            aggregate
                .grouping_expressions()
                .iter()
                .map(|expr| expr.id())
                .collect::<Vec<_>>()
        );
        let build = join.input(1).operator().as_table_reference().unwrap();
        assert_eq!(
            vec![ExprId::from(101), ExprId::from(4), ExprId::from(5), ExprId::from(6)],
            build.attribute_list().iter().map(|a| a.id()).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_group_by_without_key_is_unchanged() {
        let root = wide_group_by();
        assert!(Rc::ptr_eq(&root, &rule(3, 50).apply(&root).unwrap()));
    }

    #[test]
    fn test_narrow_group_by_is_unchanged() {
        let root = wide_group_by();
        assert!(Rc::ptr_eq(&root, &rule(4, 100).apply(&root).unwrap()));
    }
}
