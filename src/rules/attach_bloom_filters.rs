use std::collections::{BTreeMap, HashMap, HashSet};
use std::rc::Rc;

use log::{debug, trace};

use crate::cost::{CostModel, StarSchemaCostModel};
use crate::error::OptResult;
use crate::expr::{expr_ids, AttributeReference, ExprId};
use crate::operator::{JoinType, PhysicalOperator, PhysicalType};
use crate::optimizer::OptimizerContext;
use crate::plan::{next_plan_node_id, PlanNodeBuilder, PlanNodeId, PlanNodeRef};
use crate::properties::BloomFilterConfig;
use crate::rules::Rule;

/// Attaches bloom filters built by selective hash joins to the large inputs of the joins,
/// aggregates and selections above them.
///
/// A HashJoin whose build side is filtered offers a filter on each build join attribute. The
/// offer travels up through Aggregates, Selections and HashJoins while the attribute is
/// projected, and crosses over to the probe side of inner and semi joins on the matching probe
/// attribute. An operator whose input is estimated larger than the configured threshold probes
/// the best offer per attribute.
pub struct AttachBloomFilters {
    context: Rc<OptimizerContext>,
}

impl AttachBloomFilters {
    pub fn new(context: Rc<OptimizerContext>) -> Self {
        Self { context }
    }
}

impl Rule for AttachBloomFilters {
    fn name(&self) -> &'static str {
        "AttachBloomFilters"
    }

    fn apply(&self, input: &PlanNodeRef) -> OptResult<PlanNodeRef> {
        debug_assert_eq!(PhysicalType::TopLevelPlan, input.physical_type());
        let mut planner = BloomFilterPlanner {
            cost_model: self.context.cost_model(input),
            cardinality_threshold: self.context.config().lip_filter_cardinality_threshold,
            producers: HashMap::new(),
            consumers: HashMap::new(),
            attaches: HashMap::new(),
            reserved_ids: HashMap::new(),
        };

        planner.visit_producer(input, 0);
        planner.visit_consumer(input);
        planner.decide_attach(input);
        debug!("Attaching bloom filters to {} nodes", planner.attaches.len());
        Ok(planner.perform_attach(input))
    }
}

#[derive(Clone, Debug)]
struct BloomFilterInfo {
    /// The HashJoin building the filter.
    source: PlanNodeRef,
    /// The attribute the filter is probed with.
    attribute: AttributeReference,
    depth: usize,
    selectivity: f64,
    /// The attribute the filter is built on.
    source_attribute: AttributeReference,
}

impl BloomFilterInfo {
    fn new(
        source: &PlanNodeRef,
        attribute: &AttributeReference,
        depth: usize,
        selectivity: f64,
    ) -> Self {
        Self {
            source: source.clone(),
            attribute: attribute.clone(),
            depth,
            selectivity,
            source_attribute: attribute.clone(),
        }
    }

    /// The more selective filter wins, then the deeper one.
    fn is_better_than(&self, other: &BloomFilterInfo) -> bool {
        if self.selectivity == other.selectivity {
            self.depth > other.depth
        } else {
            self.selectivity < other.selectivity
        }
    }
}

struct BloomFilterPlanner {
    cost_model: StarSchemaCostModel,
    cardinality_threshold: usize,
    /// Filters available in the output of a node.
    producers: HashMap<PlanNodeId, Vec<BloomFilterInfo>>,
    /// Filters that may be applied to the output of a node.
    consumers: HashMap<PlanNodeId, Vec<BloomFilterInfo>>,
    attaches: HashMap<PlanNodeId, BloomFilterConfig>,
    /// Ids the rewritten nodes carrying a config will get, so probes can name their builders.
    reserved_ids: HashMap<PlanNodeId, PlanNodeId>,
}

impl BloomFilterPlanner {
    fn visit_producer(&mut self, node: &PlanNodeRef, depth: usize) {
        for input in node.inputs() {
            self.visit_producer(input, depth + 1);
        }

        if let PhysicalOperator::HashJoin(join) = node.operator() {
            let build = node.input(1);
            let selectivity = self.cost_model.estimate_selectivity(build);
            if selectivity < 1.0 {
                let offers = self.producers.entry(build.id()).or_default();
                for attr in join.right_join_attributes() {
                    offers.push(BloomFilterInfo::new(node, attr, depth, selectivity));
                }
            }
        }

        let inherited = match node.physical_type() {
            PhysicalType::Aggregate | PhysicalType::Selection | PhysicalType::HashJoin => {
                let output_ids = expr_ids(&node.output_attributes());
                node.inputs()
                    .iter()
                    .filter_map(|input| self.producers.get(&input.id()))
                    .flatten()
                    .filter(|info| output_ids.contains(&info.attribute.id()))
                    .cloned()
                    .collect()
            }
            _ => vec![],
        };
        self.producers.entry(node.id()).or_insert(inherited);
    }

    fn visit_consumer(&mut self, node: &PlanNodeRef) {
        let from_parent = self.consumers.get(&node.id()).cloned().unwrap_or_default();
        if !from_parent.is_empty() {
            for input in node.inputs() {
                let input_ids = expr_ids(&input.output_attributes());
                let passed: Vec<BloomFilterInfo> = from_parent
                    .iter()
                    .filter(|info| input_ids.contains(&info.attribute.id()))
                    .cloned()
                    .collect();
                self.consumers.entry(input.id()).or_insert(passed);
            }
        }

        if let PhysicalOperator::HashJoin(join) = node.operator() {
            if matches!(join.join_type(), JoinType::Inner | JoinType::LeftSemi) {
                let (probe, build) = (node.input(0), node.input(1));
                let probe_attribute_by_build_id: HashMap<ExprId, &AttributeReference> = join
                    .right_join_attributes()
                    .iter()
                    .map(|attr| attr.id())
                    .zip(join.left_join_attributes())
                    .collect();

                let crossed: Vec<BloomFilterInfo> = self
                    .producers
                    .get(&build.id())
                    .into_iter()
                    .flatten()
                    .filter_map(|info| {
                        probe_attribute_by_build_id
                            .get(&info.attribute.id())
                            .map(|probe_attribute| BloomFilterInfo {
                                attribute: (*probe_attribute).clone(),
                                source_attribute: info.attribute.clone(),
                                ..info.clone()
                            })
                    })
                    .collect();
                self.consumers.entry(probe.id()).or_default().extend(crossed);
            }
        }

        for input in node.inputs() {
            self.visit_consumer(input);
        }
    }

    /// Decides the filters probed in the subtree of `node`, returning the build attributes of
    /// the filters used there. A filter is probed at most once per subtree.
    fn decide_attach(&mut self, node: &PlanNodeRef) -> HashSet<ExprId> {
        let mut used = HashSet::new();
        for input in node.inputs() {
            used.extend(self.decide_attach(input));
        }

        let consumer = match node.operator() {
            PhysicalOperator::HashJoin(_)
            | PhysicalOperator::Aggregate(_)
            | PhysicalOperator::Selection(_) => node.input(0),
            _ => return used,
        };
        let offers = match self.consumers.get(&consumer.id()) {
            Some(offers) if !offers.is_empty() => offers,
            _ => return used,
        };
        if self.cost_model.estimate_cardinality(consumer) <= self.cardinality_threshold {
            return used;
        }

        let mut best: BTreeMap<ExprId, &BloomFilterInfo> = BTreeMap::new();
        for info in offers {
            best.entry(info.attribute.id())
                .and_modify(|current| {
                    if info.is_better_than(current) {
                        *current = info;
                    }
                })
                .or_insert(info);
        }
        let chosen: Vec<BloomFilterInfo> = best.into_values().cloned().collect();

        for info in chosen {
            if !used.insert(info.source_attribute.id()) {
                continue;
            }
            let builder = self.reserve_id(&info.source);
            self.attaches
                .entry(info.source.id())
                .or_default()
                .add_build_side_bloom_filter(info.source_attribute.clone());
            self.reserve_id(node);
            self.attaches
                .entry(node.id())
                .or_default()
                .add_probe_side_bloom_filter(info.attribute, info.source_attribute, builder);
            trace!(
                "{}#{} probes the filter built by {}#{}",
                node.name(),
                node.id(),
                info.source.name(),
                info.source.id()
            );
        }
        used
    }

    fn reserve_id(&mut self, node: &PlanNodeRef) -> PlanNodeId {
        *self
            .reserved_ids
            .entry(node.id())
            .or_insert_with(next_plan_node_id)
    }

    fn perform_attach(&self, node: &PlanNodeRef) -> PlanNodeRef {
        let new_inputs: Vec<PlanNodeRef> = node
            .inputs()
            .iter()
            .map(|input| self.perform_attach(input))
            .collect();

        if let Some(config) = self.attaches.get(&node.id()) {
            let operator = match node.operator() {
                PhysicalOperator::HashJoin(join) => PhysicalOperator::HashJoin(
                    join.clone().with_bloom_filter_config(config.clone()),
                ),
                PhysicalOperator::Aggregate(aggregate) => PhysicalOperator::Aggregate(
                    aggregate.clone().with_bloom_filter_config(config.clone()),
                ),
                PhysicalOperator::Selection(selection) => PhysicalOperator::Selection(
                    selection.clone().with_bloom_filter_config(config.clone()),
                ),
                _ => panic!("bloom filters attached to {}", node.name()),
            };
            let mut builder = PlanNodeBuilder::new(operator)
                .add_inputs(new_inputs)
                .with_physical_props(node.physical_props().clone());
            if let Some(id) = self.reserved_ids.get(&node.id()) {
                builder = builder.with_id(*id);
            }
            return builder.build_ref();
        }

        let changed = new_inputs
            .iter()
            .zip(node.inputs())
            .any(|(new_input, input)| !Rc::ptr_eq(new_input, input));
        if changed {
            node.copy_with_new_children(new_inputs)
        } else {
            node.clone()
        }
    }
}
