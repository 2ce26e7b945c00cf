use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::rc::Rc;

use anyhow::bail;
use log::debug;
use petgraph::unionfind::UnionFind;

use crate::cost::{CostModel, StarSchemaCostModel};
use crate::error::{OptError, OptResult};
use crate::expr::{to_named_expressions, AttributeReference, ExprId, NamedExpression, Predicate};
use crate::operator::{HashJoin, JoinType, PhysicalOperator};
use crate::optimizer::OptimizerContext;
use crate::plan::{PlanNodeBuilder, PlanNodeRef};
use crate::rules::Rule;

/// Joins whose sides together carry more attributes needed downstream than this are avoided
/// early in the chain.
const LARGE_OUTPUT_NUM_ATTRIBUTES: usize = 5;
/// Build sides below this cardinality are considered cheap to hash.
const SMALL_BUILD_CARDINALITY: usize = 0x100;

/// Greedy join ordering for maximal groups of inner hash joins, aimed at star schemas: small,
/// filtered dimension tables end up on the build side of a long probe chain over the fact
/// table.
pub struct StarSchemaHashJoinOrderOptimization {
    context: Rc<OptimizerContext>,
}

impl StarSchemaHashJoinOrderOptimization {
    pub fn new(context: Rc<OptimizerContext>) -> Self {
        Self { context }
    }
}

impl Rule for StarSchemaHashJoinOrderOptimization {
    fn name(&self) -> &'static str {
        "StarSchemaHashJoinOrderOptimization"
    }

    fn apply(&self, input: &PlanNodeRef) -> OptResult<PlanNodeRef> {
        let planner = JoinOrderPlanner {
            cost_model: self.context.cost_model(input),
        };
        planner.apply_internal(input)
    }
}

/// Operands and equality pairs of a group of cascading inner hash joins.
#[derive(Default)]
struct JoinGroupInfo {
    tables: Vec<PlanNodeRef>,
    join_attribute_pairs: Vec<(AttributeReference, AttributeReference)>,
}

struct TableInfo {
    table_info_id: usize,
    table: PlanNodeRef,
    estimated_cardinality: usize,
    estimated_selectivity: f64,
    /// Output attributes of the table needed above the join group.
    estimated_num_output_attributes: usize,
    is_aggregate: bool,
    /// Equivalence class -> the attributes of this table realizing it, which are not yet known
    /// to be equal to each other.
    join_attributes: BTreeMap<usize, Vec<AttributeReference>>,
}

struct JoinPair<'a> {
    probe: &'a TableInfo,
    build: &'a TableInfo,
    build_side_unique: bool,
    num_join_attributes: usize,
}

impl JoinPair<'_> {
    fn has_large_output(&self) -> bool {
        self.probe.estimated_num_output_attributes + self.build.estimated_num_output_attributes
            > LARGE_OUTPUT_NUM_ATTRIBUTES
    }

    fn has_small_build(&self) -> bool {
        !self.has_large_output() && self.build.estimated_cardinality < SMALL_BUILD_CARDINALITY
    }

    /// `Less` means `self` is the better join to perform next.
    fn compare(&self, other: &Self) -> Ordering {
        self.has_large_output()
            .cmp(&other.has_large_output())
            .then_with(|| other.build_side_unique.cmp(&self.build_side_unique))
            .then_with(|| other.has_small_build().cmp(&self.has_small_build()))
            .then_with(|| {
                self.probe
                    .estimated_cardinality
                    .cmp(&other.probe.estimated_cardinality)
            })
            .then_with(|| {
                self.build
                    .estimated_selectivity
                    .partial_cmp(&other.build.estimated_selectivity)
                    .unwrap_or(Ordering::Equal)
            })
            .then_with(|| {
                self.build
                    .estimated_cardinality
                    .cmp(&other.build.estimated_cardinality)
            })
            .then_with(|| other.num_join_attributes.cmp(&self.num_join_attributes))
            .then_with(|| other.build.is_aggregate.cmp(&self.build.is_aggregate))
            .then_with(|| self.probe.table_info_id.cmp(&other.probe.table_info_id))
            .then_with(|| self.build.table_info_id.cmp(&other.build.table_info_id))
    }
}

struct JoinOrderPlanner {
    cost_model: StarSchemaCostModel,
}

/// The hash join, if `node` may be flattened into a join group.
fn as_reorderable_join(node: &PlanNodeRef) -> Option<&HashJoin> {
    match node.operator() {
        PhysicalOperator::HashJoin(join)
            if join.join_type() == JoinType::Inner
                && !join.left_join_attributes().is_empty()
                && join.build_predicate().is_none()
                && join.bloom_filter_config().is_none() =>
        {
            Some(join)
        }
        _ => None,
    }
}

/// Whether a join below another one can be merged into its parent's group: its own output
/// must be a plain passthrough of its inputs' attributes.
fn is_cascading(join: &HashJoin) -> bool {
    join.residual_predicate().is_none()
        && join
            .project_expressions()
            .iter()
            .all(|expr| expr.as_attribute().is_some())
}

impl JoinOrderPlanner {
    fn apply_internal(&self, node: &PlanNodeRef) -> OptResult<PlanNodeRef> {
        if let Some(join) = as_reorderable_join(node) {
            let mut join_group = JoinGroupInfo::default();
            self.collect_join_group(node, join, &mut join_group)?;
            return self.generate_plan(
                join_group,
                join.residual_predicate(),
                join.project_expressions(),
            );
        }

        let new_inputs = node
            .inputs()
            .iter()
            .map(|input| self.apply_internal(input))
            .collect::<OptResult<Vec<_>>>()?;
        if new_inputs
            .iter()
            .zip(node.inputs())
            .all(|(new_input, input)| Rc::ptr_eq(new_input, input))
        {
            Ok(node.clone())
        } else {
            Ok(node.copy_with_new_children(new_inputs))
        }
    }

    fn collect_join_group(
        &self,
        node: &PlanNodeRef,
        join: &HashJoin,
        join_group: &mut JoinGroupInfo,
    ) -> OptResult<()> {
        for input in node.inputs() {
            match as_reorderable_join(input) {
                Some(child_join) if is_cascading(child_join) => {
                    self.collect_join_group(input, child_join, join_group)?
                }
                // Either not a join, or a join starting a group of its own.
                _ => join_group.tables.push(self.apply_internal(input)?),
            }
        }

        join_group.join_attribute_pairs.extend(
            join.left_join_attributes()
                .iter()
                .cloned()
                .zip(join.right_join_attributes().iter().cloned()),
        );
        Ok(())
    }

    fn generate_plan(
        &self,
        join_group: JoinGroupInfo,
        residual_predicate: Option<&Predicate>,
        project_expressions: &[NamedExpression],
    ) -> OptResult<PlanNodeRef> {
        let num_tables = join_group.tables.len();
        assert!(num_tables >= 2, "join group with {} tables", num_tables);

        let mut referenced: HashSet<ExprId> = project_expressions
            .iter()
            .flat_map(|expr| expr.referenced_attributes())
            .map(|attr| attr.id())
            .collect();
        if let Some(predicate) = residual_predicate {
            referenced.extend(predicate.referenced_attributes().iter().map(|a| a.id()));
        }

        let mut attribute_to_table: HashMap<ExprId, usize> = HashMap::new();
        for (table_idx, table) in join_group.tables.iter().enumerate() {
            for attr in table.output_attributes() {
                if attribute_to_table.insert(attr.id(), table_idx).is_some() {
                    bail!(OptError::SelfJoinNotSupported(format!(
                        "attribute {} is produced by more than one joined table",
                        attr
                    )));
                }
            }
        }

        // Equivalence classes of join attributes.
        let mut dense_ids: HashMap<ExprId, usize> = HashMap::new();
        for (left, right) in &join_group.join_attribute_pairs {
            for attr in [left, right] {
                let next = dense_ids.len();
                dense_ids.entry(attr.id()).or_insert(next);
            }
        }
        let mut classes = UnionFind::new(dense_ids.len());
        for (left, right) in &join_group.join_attribute_pairs {
            classes.union(dense_ids[&left.id()], dense_ids[&right.id()]);
        }
        let labels = classes.into_labeling();

        let mut remaining: Vec<TableInfo> = join_group
            .tables
            .iter()
            .enumerate()
            .map(|(table_idx, table)| TableInfo {
                table_info_id: table_idx,
                table: table.clone(),
                estimated_cardinality: self.cost_model.estimate_cardinality(table),
                estimated_selectivity: self.cost_model.estimate_selectivity(table),
                estimated_num_output_attributes: count_referenced(table, &referenced),
                is_aggregate: matches!(table.operator(), PhysicalOperator::Aggregate(_)),
                join_attributes: BTreeMap::new(),
            })
            .collect();
        for (left, right) in &join_group.join_attribute_pairs {
            for attr in [left, right] {
                if let Some(table_idx) = attribute_to_table.get(&attr.id()) {
                    let attrs = remaining[*table_idx]
                        .join_attributes
                        .entry(labels[dense_ids[&attr.id()]])
                        .or_default();
                    if !attrs.contains(attr) {
                        attrs.push(attr.clone());
                    }
                }
            }
        }

        loop {
            let (probe_idx, build_idx, build_side_unique) = self.choose_join_pair(&remaining)?;
            let (mut probe_idx, mut build_idx) = (probe_idx, build_idx);
            if !build_side_unique
                && remaining[probe_idx].estimated_cardinality
                    < remaining[build_idx].estimated_cardinality
            {
                std::mem::swap(&mut probe_idx, &mut build_idx);
            }

            let (probe_attributes, build_attributes) =
                shared_join_attributes(&remaining[probe_idx], &remaining[build_idx]);
            debug!(
                "Joining {}#{} (probe, ~{} rows) with {}#{} (build, ~{} rows) on {:?}",
                remaining[probe_idx].table.name(),
                remaining[probe_idx].table.id(),
                remaining[probe_idx].estimated_cardinality,
                remaining[build_idx].table.name(),
                remaining[build_idx].table.id(),
                remaining[build_idx].estimated_cardinality,
                probe_attributes.iter().map(|a| a.id()).collect::<Vec<_>>()
            );

            let (mut probe, build) = take_pair(&mut remaining, probe_idx, build_idx);

            if remaining.is_empty() {
                let join = HashJoin::new(
                    probe_attributes,
                    build_attributes,
                    residual_predicate.cloned(),
                    project_expressions.to_vec(),
                    JoinType::Inner,
                );
                return Ok(join_node(join, probe.table, build.table));
            }

            let mut output_attributes = probe.table.output_attributes();
            output_attributes.extend(build.table.output_attributes());
            let join = HashJoin::new(
                probe_attributes,
                build_attributes,
                None,
                to_named_expressions(&output_attributes),
                JoinType::Inner,
            );
            let output = join_node(join, probe.table.clone(), build.table.clone());

            probe.estimated_cardinality = self.cost_model.estimate_cardinality(&output);
            probe.estimated_selectivity = self.cost_model.estimate_selectivity(&output);
            probe.estimated_num_output_attributes = count_referenced(&output, &referenced);
            probe.is_aggregate = false;
            probe.table = output;
            for (class, attrs) in build.join_attributes {
                match probe.join_attributes.get_mut(&class) {
                    // Joined on: every attribute of the class now holds the same value.
                    Some(probe_attrs) => probe_attrs.truncate(1),
                    None => {
                        probe.join_attributes.insert(class, attrs);
                    }
                }
            }
            remaining.push(probe);
        }
    }

    /// Best (probe, build) pair among the remaining tables, as indexes into `remaining`, and
    /// whether the build side is unique on its join attributes.
    fn choose_join_pair(&self, remaining: &[TableInfo]) -> OptResult<(usize, usize, bool)> {
        let mut best: Option<(usize, usize, JoinPair)> = None;
        for (probe_idx, probe) in remaining.iter().enumerate() {
            for (build_idx, build) in remaining.iter().enumerate() {
                if probe_idx == build_idx {
                    continue;
                }
                let (_, build_attributes) = shared_join_attributes(probe, build);
                if build_attributes.is_empty() {
                    continue;
                }

                let candidate = JoinPair {
                    probe,
                    build,
                    build_side_unique: self
                        .cost_model
                        .implies_unique_attributes(&build.table, &build_attributes),
                    num_join_attributes: build_attributes.len(),
                };
                let is_better = match &best {
                    Some((_, _, current)) => candidate.compare(current) == Ordering::Less,
                    None => true,
                };
                if is_better {
                    best = Some((probe_idx, build_idx, candidate));
                }
            }
        }

        let (probe_idx, build_idx, pair) = best.ok_or_else(|| {
            OptError::InvalidPlan("inner join group is not connected".to_string())
        })?;
        Ok((probe_idx, build_idx, pair.build_side_unique))
    }
}

/// Removes the chosen pair from `tables`, returned as (probe, build).
fn take_pair(tables: &mut Vec<TableInfo>, probe_idx: usize, build_idx: usize) -> (TableInfo, TableInfo) {
    // Remove the higher index first so the lower one stays valid.
    if probe_idx > build_idx {
        let probe = tables.remove(probe_idx);
        let build = tables.remove(build_idx);
        (probe, build)
    } else {
        let build = tables.remove(build_idx);
        let probe = tables.remove(probe_idx);
        (probe, build)
    }
}

/// Join attributes of `probe` and `build`, pairwise, in equivalence class order.
/// Join attribute pairs equating every attribute of each equivalence class shared by `probe`
/// and `build`.
fn shared_join_attributes(
    probe: &TableInfo,
    build: &TableInfo,
) -> (Vec<AttributeReference>, Vec<AttributeReference>) {
    let mut pairs = Vec::new();
    for (class, probe_attrs) in &probe.join_attributes {
        let build_attrs = match build.join_attributes.get(class) {
            Some(build_attrs) => build_attrs,
            None => continue,
        };
        for probe_attr in probe_attrs {
            pairs.push((probe_attr.clone(), build_attrs[0].clone()));
        }
        for build_attr in &build_attrs[1..] {
            pairs.push((probe_attrs[0].clone(), build_attr.clone()));
        }
    }
    pairs.into_iter().unzip()
}

fn count_referenced(table: &PlanNodeRef, referenced: &HashSet<ExprId>) -> usize {
    table
        .output_attributes()
        .iter()
        .filter(|attr| referenced.contains(&attr.id()))
        .count()
}

fn join_node(join: HashJoin, probe: PlanNodeRef, build: PlanNodeRef) -> PlanNodeRef {
    PlanNodeBuilder::new(PhysicalOperator::HashJoin(join))
        .add_inputs([probe, build])
        .build_ref()
}
