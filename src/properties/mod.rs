//! Physical properties attached to plan nodes.
//!
//! Partitioning is the only physical property the optimizer derives. Filter configurations are
//! annotations consumed by the execution plan generator.

use std::fmt::Debug;
use std::hash::Hash;

mod bloom_filter;
pub use bloom_filter::*;
mod lip_filter;
pub use lip_filter::*;
mod partition;
pub use partition::*;
mod physical;
pub use physical::*;

pub trait PhysicalProp: Debug + Hash {
    /// Tests whether satisfies self.
    fn satisfies(&self, other: &Self) -> bool;
}
