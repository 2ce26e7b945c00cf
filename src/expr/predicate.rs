use std::fmt::{Display, Formatter};

use itertools::Itertools;
use strum_macros::Display as StrumDisplay;

use crate::expr::{AttributeReference, Literal, Scalar};

#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, StrumDisplay)]
pub enum ComparisonOp {
    #[strum(serialize = "=")]
    Equal,
    #[strum(serialize = "<>")]
    NotEqual,
    #[strum(serialize = "<")]
    Less,
    #[strum(serialize = "<=")]
    LessOrEqual,
    #[strum(serialize = ">")]
    Greater,
    #[strum(serialize = ">=")]
    GreaterOrEqual,
}

impl ComparisonOp {
    pub fn is_equality(&self) -> bool {
        matches!(self, ComparisonOp::Equal)
    }

    /// Operator to use when the operands are swapped.
    pub fn flip(&self) -> ComparisonOp {
        match self {
            ComparisonOp::Less => ComparisonOp::Greater,
            ComparisonOp::LessOrEqual => ComparisonOp::GreaterOrEqual,
            ComparisonOp::Greater => ComparisonOp::Less,
            ComparisonOp::GreaterOrEqual => ComparisonOp::LessOrEqual,
            op => *op,
        }
    }
}

/// A boolean expression.
#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    Literal(bool),
    Comparison {
        op: ComparisonOp,
        left: Scalar,
        right: Scalar,
    },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    pub fn comparison<L: Into<Scalar>, R: Into<Scalar>>(op: ComparisonOp, left: L, right: R) -> Self {
        Predicate::Comparison {
            op,
            left: left.into(),
            right: right.into(),
        }
    }

    pub fn eq<L: Into<Scalar>, R: Into<Scalar>>(left: L, right: R) -> Self {
        Self::comparison(ComparisonOp::Equal, left, right)
    }

    /// Conjunction of `operands`, flattening nested conjunctions. A single operand is returned
    /// as is, and no operand at all is `TRUE`.
    pub fn and(operands: Vec<Predicate>) -> Self {
        let mut flattened = Vec::with_capacity(operands.len());
        for operand in operands {
            match operand {
                Predicate::And(inner) => flattened.extend(inner),
                Predicate::Literal(true) => {}
                other => flattened.push(other),
            }
        }
        match flattened.len() {
            0 => Predicate::Literal(true),
            1 => flattened.pop().unwrap_or(Predicate::Literal(true)),
            _ => Predicate::And(flattened),
        }
    }

    /// Disjunction of `operands`, flattening nested disjunctions.
    pub fn or(operands: Vec<Predicate>) -> Self {
        let mut flattened = Vec::with_capacity(operands.len());
        for operand in operands {
            match operand {
                Predicate::Or(inner) => flattened.extend(inner),
                other => flattened.push(other),
            }
        }
        match flattened.len() {
            0 => Predicate::Literal(false),
            1 => flattened.pop().unwrap_or(Predicate::Literal(false)),
            _ => Predicate::Or(flattened),
        }
    }

    pub fn is_true(&self) -> bool {
        matches!(self, Predicate::Literal(true))
    }

    /// If this is a comparison between an attribute and a literal, returns them with the
    /// operator normalized so that the attribute is on the left.
    pub fn as_attribute_literal_comparison(
        &self,
    ) -> Option<(ComparisonOp, &AttributeReference, &Literal)> {
        match self {
            Predicate::Comparison { op, left, right } => {
                match (left.as_attribute(), right.as_literal()) {
                    (Some(attr), Some(literal)) => Some((*op, attr, literal)),
                    _ => match (left.as_literal(), right.as_attribute()) {
                        (Some(literal), Some(attr)) => Some((op.flip(), attr, literal)),
                        _ => None,
                    },
                }
            }
            _ => None,
        }
    }

    /// If this is an equality between two attributes, returns both of them.
    pub fn as_attribute_equality(&self) -> Option<(&AttributeReference, &AttributeReference)> {
        match self {
            Predicate::Comparison {
                op: ComparisonOp::Equal,
                left,
                right,
            } => Some((left.as_attribute()?, right.as_attribute()?)),
            _ => None,
        }
    }

    /// Top level conjuncts; a non conjunctive predicate is its own single conjunct.
    pub fn conjuncts(&self) -> Vec<&Predicate> {
        match self {
            Predicate::And(operands) => operands.iter().collect(),
            other => vec![other],
        }
    }

    /// Top level disjuncts; a non disjunctive predicate is its own single disjunct.
    pub fn disjuncts(&self) -> Vec<&Predicate> {
        match self {
            Predicate::Or(operands) => operands.iter().collect(),
            other => vec![other],
        }
    }

    pub fn referenced_attributes(&self) -> Vec<AttributeReference> {
        let mut attributes = Vec::new();
        self.collect_referenced_attributes(&mut attributes);
        attributes
    }

    fn collect_referenced_attributes(&self, attributes: &mut Vec<AttributeReference>) {
        match self {
            Predicate::Literal(_) => {}
            Predicate::Comparison { left, right, .. } => {
                left.collect_referenced_attributes(attributes);
                right.collect_referenced_attributes(attributes);
            }
            Predicate::And(operands) | Predicate::Or(operands) => {
                for operand in operands {
                    operand.collect_referenced_attributes(attributes);
                }
            }
            Predicate::Not(operand) => operand.collect_referenced_attributes(attributes),
        }
    }
}

impl Display for Predicate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Predicate::Literal(v) => write!(f, "{}", v),
            Predicate::Comparison { op, left, right } => write!(f, "{} {} {}", left, op, right),
            Predicate::And(operands) => write!(f, "({})", operands.iter().join(" AND ")),
            Predicate::Or(operands) => write!(f, "({})", operands.iter().join(" OR ")),
            Predicate::Not(operand) => write!(f, "NOT {}", operand),
        }
    }
}
