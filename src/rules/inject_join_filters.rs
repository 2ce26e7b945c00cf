use std::rc::Rc;

use enumset::{enum_set, EnumSet};
use log::debug;

use crate::cost::StarSchemaCostModel;
use crate::error::OptResult;
use crate::expr::{subset_of_expressions, to_named_expressions, AttributeReference, Predicate};
use crate::operator::{
    FilterJoin, HashJoin, JoinType, PhysicalOperator, PhysicalType, Selection, TopLevelPlan,
};
use crate::optimizer::OptimizerContext;
use crate::plan::{PlanNodeBuilder, PlanNodeRef};
use crate::properties::{LipFilterBuildInfo, LipFilterConfiguration, PhysicalPropertySet};
use crate::rules::{prune_columns, Rule};

/// Operators a FilterJoin may be pushed below, towards their first input.
const PUSH_DOWN_THROUGH: EnumSet<PhysicalType> = enum_set!(
    PhysicalType::Aggregate
        | PhysicalType::HashJoin
        | PhysicalType::Sample
        | PhysicalType::Selection
        | PhysicalType::Sort
        | PhysicalType::WindowAggregate
);

/// Replaces semi joins against small, densely keyed build sides with exact bit vector filters.
///
/// Each applicable HashJoin becomes a FilterJoin, which is pushed as far down its probe side as
/// possible and then attached as a LIP filter to the nearest Aggregate, Selection or FilterJoin
/// above it. A no-op Selection is added where no such anchor exists.
pub struct InjectJoinFilters {
    context: Rc<OptimizerContext>,
}

impl InjectJoinFilters {
    pub fn new(context: Rc<OptimizerContext>) -> Self {
        Self { context }
    }
}

impl Rule for InjectJoinFilters {
    fn name(&self) -> &'static str {
        "InjectJoinFilters"
    }

    fn apply(&self, input: &PlanNodeRef) -> OptResult<PlanNodeRef> {
        debug_assert_eq!(PhysicalType::TopLevelPlan, input.physical_type());
        let injector = FilterInjector {
            cost_model: self.context.cost_model(input),
            max_filter_join_range: self.context.config().max_filter_join_range,
        };

        let output = injector.transform_hash_joins_to_filters(input);
        let output = injector.push_down_filters(&output);
        let output = add_filter_anchors(&output, false);
        // Pushed down filters leave columns nothing references any more.
        let output = prune_columns(&output)?;

        let mut configuration = LipFilterConfiguration::new();
        injector.concretize_as_lip_filters(&output, None, &mut configuration);
        if configuration.is_empty() {
            return Ok(output);
        }
        debug!(
            "Attached {} exact filters to the plan",
            configuration.num_filters()
        );
        Ok(output.copy_with_operator(PhysicalOperator::TopLevelPlan(
            TopLevelPlan::with_lip_filter_configuration(configuration),
        )))
    }
}

struct FilterInjector {
    cost_model: StarSchemaCostModel,
    max_filter_join_range: i64,
}

/// A FilterJoin being pushed down, with its already rewritten inputs.
struct PendingFilterJoin<'a> {
    node: &'a PlanNodeRef,
    join: &'a FilterJoin,
    probe: &'a PlanNodeRef,
    build: &'a PlanNodeRef,
}

fn rewrite_inputs<F>(node: &PlanNodeRef, mut rewrite: F) -> (Vec<PlanNodeRef>, bool)
where
    F: FnMut(&PlanNodeRef) -> PlanNodeRef,
{
    let new_inputs: Vec<PlanNodeRef> = node.inputs().iter().map(&mut rewrite).collect();
    let changed = new_inputs
        .iter()
        .zip(node.inputs())
        .any(|(new_input, input)| !Rc::ptr_eq(new_input, input));
    (new_inputs, changed)
}

impl FilterInjector {
    /// Integer bounds of `attr` below `node`, if the catalog knows them exactly.
    fn exact_min_max(&self, node: &PlanNodeRef, attr: &AttributeReference) -> Option<(i64, i64)> {
        if !attr.data_type().is_integer() {
            return None;
        }
        let range = self.cost_model.find_min_max(node, attr)?;
        if !range.exact {
            return None;
        }
        Some((range.low.as_i64()?, range.high.as_i64()?))
    }

    fn is_transformable(&self, node: &PlanNodeRef, join: &HashJoin) -> bool {
        if join.residual_predicate().is_some() || join.right_join_attributes().len() != 1 {
            return false;
        }
        let (probe, build) = (node.input(0), node.input(1));
        if !subset_of_expressions(&node.output_attributes(), &probe.output_attributes()) {
            return false;
        }

        let build_attribute = &join.right_join_attributes()[0];
        let join_type_allows = match join.join_type() {
            JoinType::Inner => self
                .cost_model
                .implies_unique_attributes(build, join.right_join_attributes()),
            JoinType::LeftSemi | JoinType::LeftAnti => true,
            JoinType::LeftOuter => false,
        };
        if !join_type_allows {
            return false;
        }

        // A range that does not fit in an i64 is too wide for any bit vector.
        match self
            .exact_min_max(build, build_attribute)
            .and_then(|(min_value, max_value)| max_value.checked_sub(min_value))
        {
            Some(value_range) => (0..=self.max_filter_join_range).contains(&value_range),
            None => false,
        }
    }

    fn transform_hash_joins_to_filters(&self, node: &PlanNodeRef) -> PlanNodeRef {
        let (new_inputs, changed) =
            rewrite_inputs(node, |input| self.transform_hash_joins_to_filters(input));

        if let PhysicalOperator::HashJoin(join) = node.operator() {
            if self.is_transformable(node, join) {
                let (build, build_side_filter_predicate) = match join.build_predicate() {
                    Some(predicate) => (new_inputs[1].clone(), Some(predicate.clone())),
                    None => absorb_build_selection(&new_inputs[1], join.right_join_attributes()),
                };
                debug!("Transforming {}#{} into a FilterJoin", node.name(), node.id());
                return PlanNodeBuilder::new(PhysicalOperator::FilterJoin(FilterJoin::new(
                    join.left_join_attributes().to_vec(),
                    join.right_join_attributes().to_vec(),
                    join.project_expressions().to_vec(),
                    build_side_filter_predicate,
                    join.join_type() == JoinType::LeftAnti,
                )))
                .add_inputs([new_inputs[0].clone(), build])
                .with_physical_props(node.physical_props().clone())
                .build_ref();
            }
        }

        if changed {
            node.copy_with_new_children(new_inputs)
        } else {
            node.clone()
        }
    }

    fn push_down_filters(&self, node: &PlanNodeRef) -> PlanNodeRef {
        let (new_inputs, changed) = rewrite_inputs(node, |input| self.push_down_filters(input));

        if let PhysicalOperator::FilterJoin(join) = node.operator() {
            let pending = PendingFilterJoin {
                node,
                join,
                probe: &new_inputs[0],
                build: &new_inputs[1],
            };
            let output = self.push_down_filter(pending.probe, &pending);
            let expected = node.output_attributes();
            if output.output_attributes() == expected {
                return output;
            }
            // The operator the filter moved below may output more than the join did.
            return PlanNodeBuilder::new(PhysicalOperator::Selection(Selection::new(
                join.project_expressions().to_vec(),
                None,
            )))
            .add_inputs([output])
            .with_physical_props(PhysicalPropertySet::new(
                node.partition_scheme().cloned(),
                false,
            ))
            .build_ref();
        }

        if changed {
            node.copy_with_new_children(new_inputs)
        } else {
            node.clone()
        }
    }

    /// Places the pending FilterJoin above the deepest node under `probe_child` that still
    /// produces every probe attribute.
    fn push_down_filter(&self, probe_child: &PlanNodeRef, pending: &PendingFilterJoin) -> PlanNodeRef {
        if PUSH_DOWN_THROUGH.contains(probe_child.physical_type()) {
            let child = probe_child.input(0);
            if subset_of_expressions(pending.join.probe_attributes(), &child.output_attributes()) {
                let new_child = self.push_down_filter(child, pending);
                if !Rc::ptr_eq(&new_child, child) {
                    let mut new_inputs = probe_child.inputs().to_vec();
                    new_inputs[0] = new_child;
                    return probe_child.copy_with_new_children(new_inputs);
                }
            }
        }

        if Rc::ptr_eq(probe_child, pending.probe) {
            return if Rc::ptr_eq(pending.probe, pending.node.input(0))
                && Rc::ptr_eq(pending.build, pending.node.input(1))
            {
                pending.node.clone()
            } else {
                pending
                    .node
                    .copy_with_new_children(vec![pending.probe.clone(), pending.build.clone()])
            };
        }

        debug!(
            "Pushing FilterJoin#{} down to {}#{}",
            pending.node.id(),
            probe_child.name(),
            probe_child.id()
        );
        PlanNodeBuilder::new(PhysicalOperator::FilterJoin(FilterJoin::new(
            pending.join.probe_attributes().to_vec(),
            pending.join.build_attributes().to_vec(),
            to_named_expressions(&probe_child.output_attributes()),
            pending.join.build_side_filter_predicate().cloned(),
            pending.join.is_anti_join(),
        )))
        .add_inputs([probe_child.clone(), pending.build.clone()])
        .with_physical_props(pending.node.physical_props().clone())
        .build_ref()
    }

    /// Records a bit vector filter built by every FilterJoin and probed by its anchor.
    fn concretize_as_lip_filters(
        &self,
        node: &PlanNodeRef,
        anchor: Option<&PlanNodeRef>,
        configuration: &mut LipFilterConfiguration,
    ) {
        match node.operator() {
            PhysicalOperator::Aggregate(_) | PhysicalOperator::Selection(_) => {
                self.concretize_as_lip_filters(node.input(0), Some(node), configuration)
            }
            PhysicalOperator::FilterJoin(join) => {
                let build_attribute = &join.build_attributes()[0];
                let (min_value, max_value) = self
                    .exact_min_max(node, build_attribute)
                    .unwrap_or_else(|| {
                        panic!("FilterJoin#{} lost the bounds of its build attribute", node.id())
                    });
                let anchor =
                    anchor.unwrap_or_else(|| panic!("FilterJoin#{} has no anchor", node.id()));

                configuration.add_build_info(
                    node,
                    LipFilterBuildInfo::BitVectorExactFilter {
                        build_attribute: build_attribute.clone(),
                        min_value,
                        max_value,
                        is_anti_filter: join.is_anti_join(),
                    },
                );
                configuration.add_probe_info(
                    join.probe_attributes()[0].clone(),
                    anchor,
                    build_attribute.clone(),
                    node,
                );

                self.concretize_as_lip_filters(node.input(0), Some(anchor), configuration);
                self.concretize_as_lip_filters(node.input(1), Some(node), configuration);
            }
            _ => {
                for input in node.inputs() {
                    self.concretize_as_lip_filters(input, None, configuration);
                }
            }
        }
    }
}

/// Folds a filtering Selection on the build side into the FilterJoin when the Selection's
/// input still has the build attributes.
fn absorb_build_selection(
    build: &PlanNodeRef,
    build_attributes: &[AttributeReference],
) -> (PlanNodeRef, Option<Predicate>) {
    match build.operator() {
        PhysicalOperator::Selection(selection)
            if subset_of_expressions(build_attributes, &build.input(0).output_attributes()) =>
        {
            (
                build.input(0).clone(),
                selection.filter_predicate().cloned(),
            )
        }
        _ => (build.clone(), None),
    }
}

/// Makes sure every FilterJoin has an Aggregate, Selection or FilterJoin parent to attach its
/// filter to. HashJoins are not used as anchors: a HashJoin probing an attached filter is
/// slower than the two joins it replaces.
fn add_filter_anchors(node: &PlanNodeRef, ancestor_can_anchor_filter: bool) -> PlanNodeRef {
    let (new_inputs, changed) = match node.operator() {
        PhysicalOperator::Aggregate(_)
        | PhysicalOperator::Selection(_)
        | PhysicalOperator::FilterJoin(_) => {
            rewrite_inputs(node, |input| add_filter_anchors(input, true))
        }
        _ => rewrite_inputs(node, |input| add_filter_anchors(input, false)),
    };
    let output = if changed {
        node.copy_with_new_children(new_inputs)
    } else {
        node.clone()
    };

    match output.operator() {
        PhysicalOperator::FilterJoin(join) if !ancestor_can_anchor_filter => {
            PlanNodeBuilder::new(PhysicalOperator::Selection(Selection::new(
                join.project_expressions().to_vec(),
                None,
            )))
            .add_inputs([output.clone()])
            .with_physical_props(PhysicalPropertySet::new(
                output.partition_scheme().cloned(),
                false,
            ))
            .build_ref()
        }
        _ => output,
    }
}
