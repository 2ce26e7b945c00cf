use std::collections::HashSet;

use crate::expr::{AttributeReference, ExprId, NamedExpression};

/// Whether every expression in `left` (by id) also appears in `right`.
pub fn subset_of_expressions<L, R>(left: &[L], right: &[R]) -> bool
where
    L: HasExprId,
    R: HasExprId,
{
    let ids: HashSet<ExprId> = right.iter().map(HasExprId::expr_id).collect();
    left.iter().all(|e| ids.contains(&e.expr_id()))
}

pub fn contains_expr_id<E: HasExprId>(exprs: &[E], id: ExprId) -> bool {
    exprs.iter().any(|e| e.expr_id() == id)
}

pub fn to_named_expressions(attrs: &[AttributeReference]) -> Vec<NamedExpression> {
    attrs.iter().cloned().map(NamedExpression::Attribute).collect()
}

pub fn to_refs(exprs: &[NamedExpression]) -> Vec<AttributeReference> {
    exprs.iter().map(NamedExpression::to_ref).collect()
}

pub fn expr_ids<E: HasExprId>(exprs: &[E]) -> HashSet<ExprId> {
    exprs.iter().map(HasExprId::expr_id).collect()
}

/// Deduplicates by id, keeping the first occurrence.
pub fn dedup_attributes(attrs: Vec<AttributeReference>) -> Vec<AttributeReference> {
    let mut seen = HashSet::new();
    attrs.into_iter().filter(|a| seen.insert(a.id())).collect()
}

pub trait HasExprId {
    fn expr_id(&self) -> ExprId;
}

impl HasExprId for AttributeReference {
    fn expr_id(&self) -> ExprId {
        self.id()
    }
}

impl HasExprId for NamedExpression {
    fn expr_id(&self) -> ExprId {
        self.id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{Alias, BinaryOp, DataType, Literal, Scalar};

    fn attr(id: u64, name: &str) -> AttributeReference {
        AttributeReference::new(ExprId::from(id), name, "t", DataType::Long)
    }

    #[test]
    fn test_subset_by_id() {
        let a = attr(1, "a");
        let b = attr(2, "b");
        let exprs = vec![
            NamedExpression::from(a.clone()),
            NamedExpression::from(Alias::new(
                ExprId::from(3),
                "c",
                "",
                Scalar::binary(BinaryOp::Add, b.clone().into(), Literal::Long(1).into()),
            )),
        ];
        assert!(subset_of_expressions(&[a.clone()], &exprs));
        assert!(!subset_of_expressions(&[b.clone()], &exprs));
        assert!(contains_expr_id(&exprs, ExprId::from(3)));
        assert_eq!(
            vec![ExprId::from(1), ExprId::from(3)],
            to_refs(&exprs).iter().map(|a| a.id()).collect::<Vec<_>>()
        );
        assert_eq!(vec![b.clone()], exprs[1].referenced_attributes());
    }

    #[test]
    fn test_dedup_keeps_first() {
        let attrs = vec![attr(1, "a"), attr(2, "b"), attr(1, "a")];
        assert_eq!(2, dedup_attributes(attrs).len());
    }
}
