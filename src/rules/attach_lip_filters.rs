use std::collections::{BTreeMap, HashMap, HashSet};
use std::rc::Rc;

use log::debug;

use crate::cost::{CostModel, StarSchemaCostModel};
use crate::error::OptResult;
use crate::expr::{expr_ids, AttributeReference, ExprId};
use crate::operator::{JoinType, PhysicalOperator, PhysicalType, TopLevelPlan};
use crate::optimizer::OptimizerContext;
use crate::plan::{PlanNodeId, PlanNodeRef};
use crate::properties::{LipFilterBuildInfo, LipFilterConfiguration};
use crate::rules::{NodeList, Rule};

/// Identity hash filters get this many slots per estimated build side row.
const FILTER_SLOTS_PER_ROW: usize = 8;

/// Attaches identity hash LIP filters built by selective hash joins to the large inputs of the
/// joins, aggregates and selections above them, recording them in the top level plan.
pub struct AttachLipFilters {
    context: Rc<OptimizerContext>,
}

impl AttachLipFilters {
    pub fn new(context: Rc<OptimizerContext>) -> Self {
        Self { context }
    }
}

impl Rule for AttachLipFilters {
    fn name(&self) -> &'static str {
        "AttachLIPFilters"
    }

    fn apply(&self, input: &PlanNodeRef) -> OptResult<PlanNodeRef> {
        debug_assert_eq!(PhysicalType::TopLevelPlan, input.physical_type());
        // Exact filters from filter join injection stay in place.
        let configuration = input
            .operator()
            .as_top_level_plan()
            .and_then(|top| top.lip_filter_configuration())
            .cloned()
            .unwrap_or_default();
        let num_existing_filters = configuration.num_filters();
        let mut planner = LipFilterPlanner {
            cost_model: self.context.cost_model(input),
            cardinality_threshold: self.context.config().lip_filter_cardinality_threshold,
            build_side_info: HashMap::new(),
            probe_side_info: HashMap::new(),
            configuration,
        };
        planner.attach_lip_filters(&NodeList::new().cons(input.clone()));

        let num_new_filters = planner.configuration.num_filters() - num_existing_filters;
        if num_new_filters == 0 {
            return Ok(input.clone());
        }
        debug!("Attached {} LIP filters to the plan", num_new_filters);
        Ok(input.copy_with_operator(PhysicalOperator::TopLevelPlan(
            TopLevelPlan::with_lip_filter_configuration(planner.configuration),
        )))
    }
}

#[derive(Debug)]
struct LipFilterInfo {
    /// The attribute the filter is probed with.
    attribute: AttributeReference,
    /// The HashJoin building the filter.
    source: PlanNodeRef,
    depth: usize,
    estimated_selectivity: f64,
    estimated_cardinality: usize,
    /// The attribute the filter is built on.
    source_attribute: AttributeReference,
}

impl LipFilterInfo {
    fn is_better_than(&self, other: &LipFilterInfo) -> bool {
        if self.estimated_selectivity == other.estimated_selectivity {
            self.depth > other.depth
        } else {
            self.estimated_selectivity < other.estimated_selectivity
        }
    }
}

type LipFilterInfos = Vec<Rc<LipFilterInfo>>;

fn head(path: &NodeList) -> &PlanNodeRef {
    path.head()
        .unwrap_or_else(|| panic!("LIP filter analysis reached an empty path"))
}

struct LipFilterPlanner {
    cost_model: StarSchemaCostModel,
    cardinality_threshold: usize,
    build_side_info: HashMap<PlanNodeId, LipFilterInfos>,
    probe_side_info: HashMap<PlanNodeId, LipFilterInfos>,
    configuration: LipFilterConfiguration,
}

impl LipFilterPlanner {
    /// Attaches filters in the subtree at the head of `path`, returning the build attributes
    /// of the filters probed there.
    fn attach_lip_filters(&mut self, path: &NodeList) -> HashSet<ExprId> {
        let node = head(path).clone();
        let mut already_filtered = HashSet::new();
        for input in node.inputs() {
            already_filtered.extend(self.attach_lip_filters(&path.cons(input.clone())));
        }

        let probe_child = match node.operator() {
            PhysicalOperator::HashJoin(_)
            | PhysicalOperator::Aggregate(_)
            | PhysicalOperator::Selection(_) => node.input(0),
            _ => return already_filtered,
        };
        if self.cost_model.estimate_cardinality(probe_child) <= self.cardinality_threshold {
            return already_filtered;
        }

        let candidates = self.probe_side_info(&path.cons(probe_child.clone()));
        let mut selected: BTreeMap<ExprId, &Rc<LipFilterInfo>> = BTreeMap::new();
        for info in &candidates {
            selected
                .entry(info.attribute.id())
                .and_modify(|current| {
                    if info.is_better_than(current) {
                        *current = info;
                    }
                })
                .or_insert(info);
        }

        for info in selected.into_values() {
            if !already_filtered.insert(info.source_attribute.id()) {
                continue;
            }
            self.configuration.add_build_info(
                &info.source,
                LipFilterBuildInfo::SingleIdentityHashFilter {
                    build_attribute: info.source_attribute.clone(),
                    filter_cardinality: info.estimated_cardinality * FILTER_SLOTS_PER_ROW,
                },
            );
            self.configuration.add_probe_info(
                info.attribute.clone(),
                &node,
                info.source_attribute.clone(),
                &info.source,
            );
        }
        already_filtered
    }

    /// Filters that can be built from the output of the head of `path`: those offered by its
    /// descendants plus, when its parent is a HashJoin with a selective build side, one per
    /// build join attribute.
    fn build_side_info(&mut self, path: &NodeList) -> LipFilterInfos {
        let node = head(path).clone();
        if let Some(infos) = self.build_side_info.get(&node.id()) {
            return infos.clone();
        }

        let mut infos = LipFilterInfos::new();
        if matches!(
            node.physical_type(),
            PhysicalType::Aggregate | PhysicalType::Selection | PhysicalType::HashJoin
        ) {
            let output_ids = expr_ids(&node.output_attributes());
            for input in node.inputs() {
                infos.extend(
                    self.build_side_info(&path.cons(input.clone()))
                        .into_iter()
                        .filter(|info| output_ids.contains(&info.attribute.id())),
                );
            }
        }

        let parent_path = path.tail();
        if let Some(parent) = parent_path.head() {
            if let PhysicalOperator::HashJoin(join) = parent.operator() {
                let build = parent.input(1);
                let selectivity = self.cost_model.estimate_selectivity(build);
                if selectivity < 1.0 {
                    let cardinality = self.cost_model.estimate_cardinality(build);
                    for attr in join.right_join_attributes() {
                        infos.push(Rc::new(LipFilterInfo {
                            attribute: attr.clone(),
                            source: parent.clone(),
                            depth: path.depth(),
                            estimated_selectivity: selectivity,
                            estimated_cardinality: cardinality,
                            source_attribute: attr.clone(),
                        }));
                    }
                }
            }
        }

        self.build_side_info.insert(node.id(), infos.clone());
        infos
    }

    /// Filters that can be probed against the output of the head of `path`: those usable by
    /// its parent plus, when it is the probe side of an inner or semi HashJoin, the filters
    /// offered by the join's build side.
    fn probe_side_info(&mut self, path: &NodeList) -> LipFilterInfos {
        let node = head(path).clone();
        if let Some(infos) = self.probe_side_info.get(&node.id()) {
            return infos.clone();
        }

        let mut infos = LipFilterInfos::new();
        let parent_path = path.tail();
        if let Some(parent) = parent_path.head() {
            let output_ids = expr_ids(&node.output_attributes());
            infos.extend(
                self.probe_side_info(&parent_path)
                    .into_iter()
                    .filter(|info| output_ids.contains(&info.attribute.id())),
            );

            if let PhysicalOperator::HashJoin(join) = parent.operator() {
                let is_probe_side = Rc::ptr_eq(parent.input(0), &node);
                if is_probe_side && matches!(join.join_type(), JoinType::Inner | JoinType::LeftSemi)
                {
                    let probe_attribute_by_build_id: HashMap<ExprId, &AttributeReference> = join
                        .right_join_attributes()
                        .iter()
                        .map(|attr| attr.id())
                        .zip(join.left_join_attributes())
                        .collect();
                    let build_path = parent_path.cons(parent.input(1).clone());
                    for info in self.build_side_info(&build_path) {
                        if let Some(probe_attribute) =
                            probe_attribute_by_build_id.get(&info.attribute.id())
                        {
                            infos.push(Rc::new(LipFilterInfo {
                                attribute: (*probe_attribute).clone(),
                                source: info.source.clone(),
                                depth: info.depth,
                                estimated_selectivity: info.estimated_selectivity,
                                estimated_cardinality: info.estimated_cardinality,
                                source_attribute: info.attribute.clone(),
                            }));
                        }
                    }
                }
            }
        }

        self.probe_side_info.insert(node.id(), infos.clone());
        infos
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OptimizerConfig;
    use crate::expr::{
        to_named_expressions, ComparisonOp, DataType, ExprIdGen, Literal, Predicate,
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

    fn rule(fact_rows: usize) -> AttachLipFilters {
        let stats = Statistics::new()
            .with_num_tuples("f", fact_rows)
            .with_num_tuples("d", 1000);
        AttachLipFilters::new(Rc::new(OptimizerContext::new(
            OptimizerConfig::default(),
            Rc::new(stats),
            ExprIdGen::starting_after(ExprId::from(100)),
        )))
    }

    fn filtered_star_join(join_type: JoinType) -> PlanNodeRef {
        let (fk, v) = (attr(1, "fk", "f"), attr(2, "v", "f"));
        let (pk, c) = (attr(3, "pk", "d"), attr(4, "c", "d"));
        let dimension = scan("d", &[pk.clone(), c.clone()])
            .filter(Predicate::comparison(ComparisonOp::Less, c, Literal::Int(5)))
            .node();
        scan("f", &[fk.clone(), v.clone()])
            .hash_join(
                dimension,
                vec![fk],
                vec![pk],
                None,
                to_named_expressions(&[v]),
                join_type,
            )
            .unwrap()
            .build()
            .root()
    }

    #[test]
    fn test_join_probes_its_own_build_side_filter() {
        let root = filtered_star_join(JoinType::Inner);
        let output = rule(20_000_000).apply(&root).unwrap();

        // The plan below the root is shared, only the configuration is new.
        assert!(Rc::ptr_eq(root.input(0), output.input(0)));
        let join = output.input(0);
        let configuration = output
            .operator()
            .as_top_level_plan()
            .unwrap()
            .lip_filter_configuration()
            .unwrap();
        assert_eq!(
            &[LipFilterBuildInfo::SingleIdentityHashFilter {
                build_attribute: attr(3, "pk", "d"),
                filter_cardinality: 500 * FILTER_SLOTS_PER_ROW,
            }],
            configuration.build_info(join.id())
        );
        let probes = configuration.probe_info(join.id());
        assert_eq!(1, probes.len());
        assert_eq!(attr(1, "fk", "f"), probes[0].probe_attribute);
        assert_eq!(join.id(), probes[0].builder.id());
    }

    #[test]
    fn test_anti_join_offers_no_filter_to_probe_side() {
        let root = filtered_star_join(JoinType::LeftAnti);
        let output = rule(20_000_000).apply(&root).unwrap();
        assert!(Rc::ptr_eq(&root, &output));
    }

    #[test]
    fn test_small_probe_side_is_left_alone() {
        let root = filtered_star_join(JoinType::Inner);
        let output = rule(1000).apply(&root).unwrap();
        assert!(Rc::ptr_eq(&root, &output));
    }
}
