//! Errors surfaced to the caller of the optimizer.
//!
//! Only conditions caused by the query itself (or by the caller's configuration) are reported
//! through [`OptResult`]. Broken internal invariants panic instead.

use thiserror::Error;

pub type OptResult<T> = anyhow::Result<T>;

/// User visible query errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OptError {
    #[error("self join is not supported: relation {0} appears on both sides of a join")]
    SelfJoinNotSupported(String),
    #[error("relation {relation} does not allow inserting tuples")]
    InsertNotAllowed { relation: String },
    #[error("invalid optimizer configuration: {0}")]
    InvalidConfig(String),
    #[error("invalid physical plan: {0}")]
    InvalidPlan(String),
}
