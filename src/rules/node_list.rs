use std::rc::Rc;

use crate::plan::PlanNodeRef;

/// Persistent singly linked list of plan nodes, used to carry the path from the root down to
/// the node being visited. Pushing shares the tail, so every recursion level holds its own
/// path without copying.
#[derive(Clone, Debug, Default)]
pub struct NodeList {
    head: Option<Rc<Cell>>,
}

#[derive(Debug)]
struct Cell {
    node: PlanNodeRef,
    depth: usize,
    next: Option<Rc<Cell>>,
}

impl NodeList {
    pub fn new() -> Self {
        Self::default()
    }

    /// A list with `node` in front of this one.
    pub fn cons(&self, node: PlanNodeRef) -> Self {
        let depth = self.head.as_ref().map_or(0, |cell| cell.depth + 1);
        Self {
            head: Some(Rc::new(Cell {
                node,
                depth,
                next: self.head.clone(),
            })),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    pub fn head(&self) -> Option<&PlanNodeRef> {
        self.head.as_ref().map(|cell| &cell.node)
    }

    /// Depth of the head node, the root being at depth 0.
    pub fn depth(&self) -> usize {
        self.head.as_ref().map_or(0, |cell| cell.depth)
    }

    /// The list without its head.
    pub fn tail(&self) -> Self {
        Self {
            head: self.head.as_ref().and_then(|cell| cell.next.clone()),
        }
    }

    /// Nodes from the head towards the root.
    pub fn iter(&self) -> impl Iterator<Item = &PlanNodeRef> {
        std::iter::successors(self.head.as_deref(), |cell| cell.next.as_deref())
            .map(|cell| &cell.node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{AttributeReference, DataType, ExprId};
    use crate::plan::PhysicalPlanBuilder;
    use crate::stat::Relation;

    #[test]
    fn test_cons_shares_tail() {
        let a = AttributeReference::new(ExprId::from(1), "a", "r", DataType::Int);
        let relation = Rc::new(Relation::new("r", vec![("a".to_string(), DataType::Int)]));
        let scan = PhysicalPlanBuilder::scan(relation, "r", vec![a.clone()]);
        let root = scan.node();
        let child = PhysicalPlanBuilder::from_node(root.clone())
            .filter(crate::expr::Predicate::Literal(true))
            .node();

        let path = NodeList::new().cons(root.clone());
        let left = path.cons(child.clone());
        let right = path.cons(root.clone());

        assert_eq!(1, left.depth());
        assert_eq!(1, right.depth());
        assert_eq!(0, left.tail().depth());
        assert_eq!(child.id(), left.head().unwrap().id());
        assert_eq!(
            vec![child.id(), root.id()],
            left.iter().map(|n| n.id()).collect::<Vec<_>>()
        );
        assert_eq!(1, path.iter().count());
        assert!(NodeList::new().is_empty());
    }
}
