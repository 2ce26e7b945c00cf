use std::collections::HashSet;
use std::mem::swap;
use std::rc::Rc;
use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::ensure;

use crate::error::{OptError, OptResult};
use crate::expr::{
    to_named_expressions, Alias, AttributeReference, ExprId, Literal, NamedExpression, Predicate,
};
use crate::operator::{
    Aggregate, HashJoin, InsertTuple, JoinType, NestedLoopsJoin, PhysicalOperator,
    PhysicalOperatorTrait, PhysicalType, Selection, Sort, TableReference, TopLevelPlan, UnionAll,
};
use crate::properties::{PartitionSchemeHeader, PhysicalPropertySet};
use crate::stat::RelationRef;

pub type PlanNodeId = u32;

pub type PlanNodeRef = Rc<PlanNode>;

static NEXT_PLAN_NODE_ID: AtomicU32 = AtomicU32::new(0);

/// Hands out a process wide unique node id. Rules may reserve ids ahead of building the node
/// that will carry them.
pub fn next_plan_node_id() -> PlanNodeId {
    NEXT_PLAN_NODE_ID.fetch_add(1, Ordering::Relaxed)
}

/// One node in a physical plan.
///
/// Nodes are immutable once built. Rewrites build new nodes that share every unchanged subtree
/// with the input plan.
#[derive(Debug)]
pub struct PlanNode {
    id: PlanNodeId,
    operator: PhysicalOperator,
    inputs: Vec<PlanNodeRef>,
    physical_props: PhysicalPropertySet,
}

/// The `eq` should ignore `id`.
impl PartialEq for PlanNode {
    fn eq(&self, other: &Self) -> bool {
        self.operator == other.operator
            && self.inputs == other.inputs
            && self.physical_props == other.physical_props
    }
}

/// A query plan.
///
/// A physical plan is a single root dag whose root is a [`TopLevelPlan`] node.
#[derive(PartialEq, Debug, Clone)]
pub struct Plan {
    root: PlanNodeRef,
}

/// Breath first iterator of a single root dag plan.
struct BFSPlanNodeIter {
    visited: HashSet<PlanNodeId>,
    cur_level: Vec<PlanNodeRef>,
    next_level: Vec<PlanNodeRef>,
}

impl Iterator for BFSPlanNodeIter {
    type Item = PlanNodeRef;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cur_level.is_empty() {
            swap(&mut self.cur_level, &mut self.next_level);
        }

        if let Some(p) = self.cur_level.pop() {
            for input in &p.inputs {
                if !self.visited.contains(&input.id) {
                    self.next_level.push(input.clone());
                    self.visited.insert(input.id);
                }
            }

            Some(p)
        } else {
            None
        }
    }
}

impl Plan {
    pub fn new(root: PlanNodeRef) -> Self {
        Self { root }
    }

    pub fn root(&self) -> PlanNodeRef {
        self.root.clone()
    }

    pub fn bfs_iterator(&self) -> impl Iterator<Item = PlanNodeRef> {
        let mut visited = HashSet::new();
        visited.insert(self.root.id);

        BFSPlanNodeIter {
            cur_level: vec![self.root.clone()],
            next_level: vec![],
            visited,
        }
    }

    /// Nodes of the given kind, in breath first order.
    pub fn nodes_of_type(&self, physical_type: PhysicalType) -> Vec<PlanNodeRef> {
        self.bfs_iterator()
            .filter(|node| node.physical_type() == physical_type)
            .collect()
    }
}

impl PlanNode {
    pub fn new(operator: PhysicalOperator, inputs: Vec<PlanNodeRef>) -> Self {
        Self {
            id: next_plan_node_id(),
            operator,
            inputs,
            physical_props: PhysicalPropertySet::default(),
        }
    }

    pub fn operator(&self) -> &PhysicalOperator {
        &self.operator
    }

    pub fn id(&self) -> PlanNodeId {
        self.id
    }

    pub fn inputs(&self) -> &[PlanNodeRef] {
        &self.inputs
    }

    pub fn input(&self, idx: usize) -> &PlanNodeRef {
        &self.inputs[idx]
    }

    pub fn physical_props(&self) -> &PhysicalPropertySet {
        &self.physical_props
    }

    pub fn partition_scheme(&self) -> Option<&PartitionSchemeHeader> {
        self.physical_props.partition_scheme()
    }

    pub fn physical_type(&self) -> PhysicalType {
        self.operator.physical_type()
    }

    pub fn name(&self) -> String {
        self.operator.name()
    }

    pub fn output_attributes(&self) -> Vec<AttributeReference> {
        self.operator.output_attributes(&self.inputs)
    }

    pub fn referenced_attributes(&self) -> Vec<AttributeReference> {
        self.operator.referenced_attributes(&self.inputs)
    }

    /// Same operator and properties over `new_inputs`.
    ///
    /// # Panics
    ///
    /// If the number of inputs differs.
    pub fn copy_with_new_children(&self, new_inputs: Vec<PlanNodeRef>) -> PlanNodeRef {
        assert_eq!(
            self.inputs.len(),
            new_inputs.len(),
            "{} expects {} inputs",
            self.name(),
            self.inputs.len()
        );
        PlanNodeBuilder::new(self.operator.clone())
            .add_inputs(new_inputs)
            .with_physical_props(self.physical_props.clone())
            .build_ref()
    }

    /// Same inputs and properties with another operator.
    pub fn copy_with_operator(&self, operator: PhysicalOperator) -> PlanNodeRef {
        PlanNodeBuilder::new(operator)
            .add_inputs(self.inputs.iter().cloned())
            .with_physical_props(self.physical_props.clone())
            .build_ref()
    }

    pub fn copy_with_partition_scheme(
        &self,
        partition_scheme: Option<PartitionSchemeHeader>,
        has_repartition: bool,
    ) -> PlanNodeRef {
        PlanNodeBuilder::new(self.operator.clone())
            .add_inputs(self.inputs.iter().cloned())
            .with_physical_props(PhysicalPropertySet::new(partition_scheme, has_repartition))
            .build_ref()
    }

    /// Tries to drop output expressions that are not in `referenced`.
    ///
    /// Returns `None` when nothing can be dropped, or when the node's output shape is fixed
    /// (stored tables, table generators). A node may end up with no output expressions.
    pub fn maybe_copy_with_pruned_expressions(
        &self,
        referenced: &HashSet<ExprId>,
    ) -> Option<PlanNodeRef> {
        let operator = match &self.operator {
            PhysicalOperator::Selection(selection) => {
                let exprs = prune_named_expressions(selection.project_expressions(), referenced)?;
                PhysicalOperator::Selection(selection.with_project_expressions(exprs))
            }
            PhysicalOperator::HashJoin(join) => {
                let exprs = prune_named_expressions(join.project_expressions(), referenced)?;
                PhysicalOperator::HashJoin(join.with_project_expressions(exprs))
            }
            PhysicalOperator::NestedLoopsJoin(join) => {
                let exprs = prune_named_expressions(join.project_expressions(), referenced)?;
                PhysicalOperator::NestedLoopsJoin(join.with_project_expressions(exprs))
            }
            PhysicalOperator::FilterJoin(join) => {
                let exprs = prune_named_expressions(join.project_expressions(), referenced)?;
                PhysicalOperator::FilterJoin(join.with_project_expressions(exprs))
            }
            PhysicalOperator::Aggregate(aggregate) => {
                let aliases: Vec<Alias> = aggregate
                    .aggregate_expressions()
                    .iter()
                    .filter(|alias| referenced.contains(&alias.id()))
                    .cloned()
                    .collect();
                if aliases.len() == aggregate.aggregate_expressions().len() {
                    return None;
                }
                PhysicalOperator::Aggregate(aggregate.with_aggregate_expressions(aliases))
            }
            PhysicalOperator::Sort(sort) => {
                let non_sort: Vec<AttributeReference> = sort
                    .non_sort_attributes()
                    .iter()
                    .filter(|attr| referenced.contains(&attr.id()))
                    .cloned()
                    .collect();
                if non_sort.len() == sort.non_sort_attributes().len() {
                    return None;
                }
                PhysicalOperator::Sort(sort.with_non_sort_attributes(non_sort))
            }
            PhysicalOperator::UnionAll(union_all) => {
                return self.maybe_copy_union_all_with_pruned_expressions(union_all, referenced)
            }
            _ => return None,
        };
        Some(self.copy_with_operator(operator))
    }

    /// Prunes a union by column position; every operand has to be a prunable Selection.
    fn maybe_copy_union_all_with_pruned_expressions(
        &self,
        union_all: &UnionAll,
        referenced: &HashSet<ExprId>,
    ) -> Option<PlanNodeRef> {
        let kept_positions: Vec<usize> = union_all
            .project_attributes()
            .iter()
            .enumerate()
            .filter(|(_, attr)| referenced.contains(&attr.id()))
            .map(|(idx, _)| idx)
            .collect();
        if kept_positions.len() == union_all.project_attributes().len() {
            return None;
        }

        let mut new_operands = Vec::with_capacity(self.inputs.len());
        for operand in &self.inputs {
            if operand.physical_type() != PhysicalType::Selection {
                return None;
            }
            let operand_outputs = operand.output_attributes();
            let operand_referenced: HashSet<ExprId> = kept_positions
                .iter()
                .map(|idx| operand_outputs[*idx].id())
                .collect();
            new_operands.push(operand.maybe_copy_with_pruned_expressions(&operand_referenced)?);
        }

        let project_attributes = kept_positions
            .iter()
            .map(|idx| union_all.project_attributes()[*idx].clone())
            .collect();
        Some(
            PlanNodeBuilder::new(PhysicalOperator::UnionAll(UnionAll::new(project_attributes)))
                .add_inputs(new_operands)
                .with_physical_props(self.physical_props.clone())
                .build_ref(),
        )
    }
}

fn prune_named_expressions(
    exprs: &[NamedExpression],
    referenced: &HashSet<ExprId>,
) -> Option<Vec<NamedExpression>> {
    let kept: Vec<NamedExpression> = exprs
        .iter()
        .filter(|expr| referenced.contains(&expr.id()))
        .cloned()
        .collect();
    if kept.len() == exprs.len() {
        None
    } else {
        Some(kept)
    }
}

pub struct PlanNodeBuilder {
    plan_node: PlanNode,
}

impl PlanNodeBuilder {
    pub fn new(operator: PhysicalOperator) -> Self {
        Self {
            plan_node: PlanNode::new(operator, vec![]),
        }
    }

    /// Uses a previously reserved id instead of a fresh one.
    pub fn with_id(mut self, id: PlanNodeId) -> Self {
        self.plan_node.id = id;
        self
    }

    pub fn add_inputs<I>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = PlanNodeRef>,
    {
        self.plan_node.inputs.extend(inputs);
        self
    }

    pub fn with_physical_props(mut self, physical_props: PhysicalPropertySet) -> Self {
        self.plan_node.physical_props = physical_props;
        self
    }

    pub fn build(self) -> PlanNode {
        self.plan_node
    }

    pub fn build_ref(self) -> PlanNodeRef {
        Rc::new(self.plan_node)
    }
}

/// Builds physical plans bottom up, mostly for tests and plan generators.
pub struct PhysicalPlanBuilder {
    root: PlanNodeRef,
}

impl PhysicalPlanBuilder {
    pub fn from_node(root: PlanNodeRef) -> Self {
        Self { root }
    }

    pub fn scan<S: Into<String>>(
        relation: RelationRef,
        alias: S,
        attribute_list: Vec<AttributeReference>,
    ) -> Self {
        Self::from_node(
            PlanNodeBuilder::new(PhysicalOperator::TableReference(TableReference::new(
                relation,
                alias,
                attribute_list,
            )))
            .build_ref(),
        )
    }

    /// A scan of a relation stored with the given partitioning.
    pub fn partitioned_scan<S: Into<String>>(
        relation: RelationRef,
        alias: S,
        attribute_list: Vec<AttributeReference>,
        partition_scheme: PartitionSchemeHeader,
    ) -> Self {
        Self::from_node(
            PlanNodeBuilder::new(PhysicalOperator::TableReference(TableReference::new(
                relation,
                alias,
                attribute_list,
            )))
            .with_physical_props(PhysicalPropertySet::partitioned(partition_scheme, false))
            .build_ref(),
        )
    }

    fn push(self, operator: PhysicalOperator, mut extra_inputs: Vec<PlanNodeRef>) -> Self {
        let mut inputs = vec![self.root];
        inputs.append(&mut extra_inputs);
        Self::from_node(
            PlanNodeBuilder::new(operator)
                .add_inputs(inputs)
                .build_ref(),
        )
    }

    pub fn select(self, project_expressions: Vec<NamedExpression>, filter: Option<Predicate>) -> Self {
        self.push(
            PhysicalOperator::Selection(Selection::new(project_expressions, filter)),
            vec![],
        )
    }

    /// Filter keeping every input column.
    pub fn filter(self, predicate: Predicate) -> Self {
        let project = to_named_expressions(&self.root.output_attributes());
        self.select(project, Some(predicate))
    }

    /// Hash join with the current plan as probe side.
    pub fn hash_join(
        self,
        build: PlanNodeRef,
        probe_attributes: Vec<AttributeReference>,
        build_attributes: Vec<AttributeReference>,
        residual_predicate: Option<Predicate>,
        project_expressions: Vec<NamedExpression>,
        join_type: JoinType,
    ) -> OptResult<Self> {
        let join = HashJoin::create(
            probe_attributes,
            build_attributes,
            residual_predicate,
            project_expressions,
            join_type,
        )?;
        Ok(self.push(PhysicalOperator::HashJoin(join), vec![build]))
    }

    pub fn nested_loops_join(
        self,
        right: PlanNodeRef,
        join_predicate: Predicate,
        project_expressions: Vec<NamedExpression>,
    ) -> Self {
        self.push(
            PhysicalOperator::NestedLoopsJoin(NestedLoopsJoin::new(
                join_predicate,
                project_expressions,
            )),
            vec![right],
        )
    }

    pub fn aggregate(
        self,
        grouping_expressions: Vec<NamedExpression>,
        aggregate_expressions: Vec<Alias>,
        filter: Option<Predicate>,
    ) -> Self {
        self.push(
            PhysicalOperator::Aggregate(Aggregate::new(
                grouping_expressions,
                aggregate_expressions,
                filter,
            )),
            vec![],
        )
    }

    pub fn sort(self, sort_attributes: Vec<AttributeReference>, limit: Option<usize>) -> Self {
        let sort_ids: HashSet<ExprId> = sort_attributes.iter().map(|a| a.id()).collect();
        let non_sort_attributes = self
            .root
            .output_attributes()
            .into_iter()
            .filter(|a| !sort_ids.contains(&a.id()))
            .collect();
        let n = sort_attributes.len();
        self.push(
            PhysicalOperator::Sort(Sort::new(
                sort_attributes,
                non_sort_attributes,
                vec![true; n],
                vec![false; n],
                limit,
            )),
            vec![],
        )
    }

    pub fn operator(self, operator: PhysicalOperator) -> Self {
        self.push(operator, vec![])
    }

    /// An INSERT of literal values into `relation`.
    pub fn insert_tuple(relation: RelationRef, column_values: Vec<Literal>) -> OptResult<Self> {
        ensure!(
            relation.allows_ad_hoc_insert(),
            OptError::InsertNotAllowed {
                relation: relation.name().to_string()
            }
        );
        ensure!(
            relation.columns().len() == column_values.len(),
            OptError::InvalidPlan(format!(
                "relation {} has {} columns but {} values were given",
                relation.name(),
                relation.columns().len(),
                column_values.len()
            ))
        );
        Ok(Self::from_node(
            PlanNodeBuilder::new(PhysicalOperator::InsertTuple(InsertTuple::new(
                relation,
                column_values,
            )))
            .build_ref(),
        ))
    }

    pub fn node(&self) -> PlanNodeRef {
        self.root.clone()
    }

    /// Wraps the current plan in a top level plan.
    pub fn build(self) -> Plan {
        self.build_with_shared_subplans(vec![])
    }

    pub fn build_with_shared_subplans(self, shared_subplans: Vec<PlanNodeRef>) -> Plan {
        let mut inputs = vec![self.root];
        inputs.extend(shared_subplans);
        Plan::new(
            PlanNodeBuilder::new(PhysicalOperator::TopLevelPlan(TopLevelPlan::new()))
                .add_inputs(inputs)
                .build_ref(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::DataType;
    use crate::stat::Relation;

    fn relation(name: &str, columns: &[&str]) -> RelationRef {
        Rc::new(Relation::new(
            name,
            columns
                .iter()
                .map(|c| (c.to_string(), DataType::Int))
                .collect(),
        ))
    }

    fn attrs(relation: &str, ids: &[(u64, &str)]) -> Vec<AttributeReference> {
        ids.iter()
            .map(|(id, name)| AttributeReference::new(ExprId::from(*id), *name, relation, DataType::Int))
            .collect()
    }

    #[test]
    fn test_plan_node_eq_ignores_id() {
        let r = relation("r", &["a"]);
        let a = attrs("r", &[(1, "a")]);
        let left = PhysicalPlanBuilder::scan(r.clone(), "r", a.clone()).node();
        let right = PhysicalPlanBuilder::scan(r, "r", a).node();
        assert_ne!(left.id(), right.id());
        assert_eq!(left, right);
    }

    #[test]
    fn test_pruning_selection() {
        let r = relation("r", &["a", "b"]);
        let a = attrs("r", &[(1, "a"), (2, "b")]);
        let selection = PhysicalPlanBuilder::scan(r, "r", a.clone())
            .select(to_named_expressions(&a), None)
            .node();

        let pruned = selection
            .maybe_copy_with_pruned_expressions(&HashSet::from([ExprId::from(2)]))
            .unwrap();
        assert_eq!(vec![a[1].clone()], pruned.output_attributes());
        assert_eq!(
            None,
            pruned.maybe_copy_with_pruned_expressions(&HashSet::from([ExprId::from(2)]))
        );
        assert!(pruned
            .maybe_copy_with_pruned_expressions(&HashSet::new())
            .unwrap()
            .output_attributes()
            .is_empty());
    }

    #[test]
    fn test_table_reference_refuses_pruning() {
        let r = relation("r", &["a", "b"]);
        let scan = PhysicalPlanBuilder::scan(r, "r", attrs("r", &[(1, "a"), (2, "b")])).node();
        assert!(scan
            .maybe_copy_with_pruned_expressions(&HashSet::new())
            .is_none());
    }

    #[test]
    #[should_panic]
    fn test_copy_with_wrong_number_of_children_panics() {
        let r = relation("r", &["a"]);
        let scan = PhysicalPlanBuilder::scan(r, "r", attrs("r", &[(1, "a")])).node();
        scan.copy_with_new_children(vec![scan.clone()]);
    }

    #[test]
    fn test_insert_into_relation_without_ad_hoc_insert() {
        let r = Rc::new(
            Relation::new("r", vec![("a".to_string(), DataType::Int)]).with_ad_hoc_insert(false),
        );
        let err = PhysicalPlanBuilder::insert_tuple(r, vec![Literal::Int(1)])
            .err()
            .unwrap();
        assert_eq!(
            Some(&OptError::InsertNotAllowed {
                relation: "r".to_string()
            }),
            err.downcast_ref::<OptError>()
        );
    }

    #[test]
    fn test_bfs_visits_every_node_once() {
        let r = relation("r", &["a"]);
        let a = attrs("r", &[(1, "a")]);
        let scan = PhysicalPlanBuilder::scan(r, "r", a.clone()).node();
        let plan = PhysicalPlanBuilder::from_node(scan.clone())
            .hash_join(
                scan,
                a.clone(),
                a.clone(),
                None,
                to_named_expressions(&a),
                JoinType::Inner,
            )
            .unwrap()
            .build();
        assert_eq!(3, plan.bfs_iterator().count());
        assert_eq!(1, plan.nodes_of_type(PhysicalType::HashJoin).len());
    }
}
