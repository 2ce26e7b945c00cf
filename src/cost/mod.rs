//! Cardinality and selectivity estimation.
//!
//! Estimates are deterministic functions of a (sub)plan's shape and the catalog statistics.
//! Missing statistics never fail an estimate; a heuristic default is used instead.

use crate::expr::ExprId;
use crate::plan::PlanNodeRef;

mod predicate;
pub use predicate::*;
mod star_schema;
pub use star_schema::*;

/// Divisor applied to an aggregate's input cardinality to bound its number of groups, since
/// multiplying per attribute distinct counts overestimates correlated data.
pub const AGGREGATE_GROUP_DAMPENING: usize = 10;
/// Distinct values assumed for an attribute with no path to a statistic.
pub const DEFAULT_NUM_DISTINCT_VALUES: usize = 16;
/// Distinct values assumed for a grouping expression that is not a plain attribute.
pub const NON_ATTRIBUTE_GROUPING_NUM_DISTINCT_VALUES: usize = 64;
/// Largest ratio of key range to estimated groups for which an aggregation may index a
/// vector directly by its grouping key.
pub const COLLISION_FREE_MAX_SPARSITY: usize = 256;

pub trait CostModel {
    /// Estimated number of output rows.
    ///
    /// # Panics
    ///
    /// On node kinds producing no rows (DDL and DML).
    fn estimate_cardinality(&self, node: &PlanNodeRef) -> usize;

    /// Estimated fraction of rows surviving the filters in `node`, in `(0, 1]`.
    fn estimate_selectivity(&self, node: &PlanNodeRef) -> f64;

    /// # Panics
    ///
    /// If `node` is not an Aggregate.
    fn estimate_num_groups_for_aggregate(&self, node: &PlanNodeRef) -> usize;

    /// Estimated number of distinct values of attribute `attr` in the output of `node`. Never
    /// zero.
    fn estimate_num_distinct_values(&self, attr: ExprId, node: &PlanNodeRef) -> usize;
}
