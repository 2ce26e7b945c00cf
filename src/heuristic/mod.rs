//! Implementation of heuristic optimizer.
//!
//! Heuristic optimizer optimizes query plan by applying a batch of node local rewrite rules to
//! query plan until some condition is met, e.g. max number of iterations or reached fixed point.
//! The implementation is inspired by [apache calcite](https://github.com/apache/calcite)'s
//! HepPlanner, working directly on the immutable, shared plan tree.

mod optimizer;
pub use optimizer::*;
