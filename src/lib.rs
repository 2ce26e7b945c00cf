//! ## Background
//!
//! The physical optimizer accepts a physical query plan produced from an optimized logical plan,
//! and rewrites it into a cheaper plan with the same result. Every rewrite is a whole plan pass:
//! it takes the plan root and returns the root of a new plan, sharing untouched subtrees with the
//! input. Passes run in a fixed order, see [`optimizer::PhysicalOptimizer`].
//!
//! Most passes are driven by a cost model tuned for star schema queries, where a large fact
//! table is joined with small, filtered dimension tables. The model estimates cardinalities and
//! selectivities from catalog statistics, and is memoized per pass.
//!
//! ## Design
//!
//! ### Plans
//!
//! A plan is an immutable tree of [`plan::PlanNode`]s, each holding a
//! [`operator::PhysicalOperator`], its inputs and its physical properties. Expressions are
//! identified by [`expr::ExprId`]s, and every operator reports the attributes it produces and
//! consumes, which is all column pruning needs.
//!
//! ### Heuristic Optimizer
//!
//! Local rewrites are [`heuristic::NodeRule`]s run by the [`heuristic::HepOptimizer`], which
//! applies a batch of rules top down or bottom up until a fix point or a maximum number of
//! iterations. Whole plan passes implementing [`rules::Rule`] use it where a node local rewrite
//! is enough, e.g. column pruning and partitioning.
//!
//! ### Passes
//!
//! 1. Disjunctive predicate push down to small stored relations.
//! 2. Group by reduction to a key of a stored relation.
//! 3. Aggregate function reuse, computing duplicate functions once and AVG from SUM and COUNT.
//! 4. Star schema join ordering, a greedy join order search over groups of inner hash joins.
//! 5. Column reordering along join chains.
//! 6. Aggregate join fusion, aggregating a left outer join by its dense left key in one
//!    operator.
//! 7. Column pruning.
//! 8. Partitioning, choosing hash repartitions for joins and aggregates.
//! 9. Filter join injection, turning joins with a dense integer key into bit vector filters.
//! 10. LIP or bloom filter attachment, probing selective join build sides early.
//!
//! ## Reference
//!
//! 1. Zhu, J., Potti, N., Saurabh, S., Patel, J. M. "Looking ahead makes query plans robust."
//! Proceedings of the VLDB Endowment 10.8 (2017): 889-900.

#[macro_use]
extern crate prettytable;

pub mod config;
pub mod cost;
pub mod error;
pub mod explain;
pub mod expr;
pub mod heuristic;
pub mod operator;
pub mod optimizer;
pub mod plan;
pub mod properties;
pub mod rules;
pub mod stat;
