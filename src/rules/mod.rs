//! Whole plan rewrite passes.
//!
//! Every pass takes the [`TopLevelPlan`](crate::operator::TopLevelPlan) node of a plan and
//! returns the root of the rewritten plan, sharing every untouched subtree with its input. A
//! pass that finds nothing to do returns its input unchanged.

use enum_dispatch::enum_dispatch;

use crate::error::OptResult;
use crate::plan::PlanNodeRef;

mod attach_bloom_filters;
pub use attach_bloom_filters::*;
mod attach_lip_filters;
pub use attach_lip_filters::*;
mod fuse_aggregate_join;
pub use fuse_aggregate_join::*;
mod inject_join_filters;
pub use inject_join_filters::*;
mod join_order;
pub use join_order::*;
mod node_list;
pub use node_list::*;
mod partition;
pub use partition::*;
mod prune_columns;
pub use prune_columns::*;
mod push_down_disjunctive_predicate;
pub use push_down_disjunctive_predicate::*;
mod reduce_group_by_attributes;
pub use reduce_group_by_attributes::*;
mod reorder_columns;
pub use reorder_columns::*;
mod reuse_aggregate_expressions;
pub use reuse_aggregate_expressions::*;

#[enum_dispatch]
pub trait Rule {
    fn name(&self) -> &'static str;

    /// Rewrites the plan rooted at the top level plan node `input`.
    fn apply(&self, input: &PlanNodeRef) -> OptResult<PlanNodeRef>;
}

#[enum_dispatch(Rule)]
pub enum RuleImpl {
    PushDownLowCostDisjunctivePredicate,
    ReduceGroupByAttributes,
    ReuseAggregateExpressions,
    StarSchemaHashJoinOrderOptimization,
    ReorderColumns,
    FuseAggregateJoin,
    PruneColumns,
    Partition,
    InjectJoinFilters,
    AttachLipFilters,
    AttachBloomFilters,
}
