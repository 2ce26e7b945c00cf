//! Expressions as seen by the physical optimizer.
//!
//! The optimizer never evaluates expressions. It only inspects which attributes they depend on,
//! the shape of predicates (for selectivity estimation) and the typed value of literals.

use std::cell::Cell;

use derive_more::{Display, From, Into};

mod attribute;
pub use attribute::*;
mod named;
pub use named::*;
mod predicate;
pub use predicate::*;
mod scalar;
pub use scalar::*;
mod types;
pub use types::*;
mod util;
pub use util::*;

/// Globally unique id of a named expression.
///
/// Attribute equivalence across the whole plan is tracked by id only: two attribute references
/// with the same id denote the same column.
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Display, From, Into)]
#[display(fmt = "#{}", _0)]
pub struct ExprId(u64);

/// Hands out monotonically increasing expression ids.
#[derive(Debug, Default)]
pub struct ExprIdGen {
    next: Cell<u64>,
}

impl ExprIdGen {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts after `last`, so ids already used by an input plan are never handed out again.
    pub fn starting_after(last: ExprId) -> Self {
        Self {
            next: Cell::new(last.0 + 1),
        }
    }

    pub fn next(&self) -> ExprId {
        let id = self.next.get();
        self.next.set(id + 1);
        ExprId(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expr_id_gen_is_monotonic() {
        let gen = ExprIdGen::starting_after(ExprId::from(41));
        assert_eq!(ExprId::from(42), gen.next());
        assert_eq!(ExprId::from(43), gen.next());
        assert_eq!("#43", format!("{}", ExprId::from(43)));
    }
}
