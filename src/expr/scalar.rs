use std::fmt::{Display, Formatter};

use itertools::Itertools;
use strum_macros::Display as StrumDisplay;

use crate::expr::{AttributeReference, DataType, Literal};

#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, StrumDisplay)]
pub enum BinaryOp {
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Subtract,
    #[strum(serialize = "*")]
    Multiply,
    #[strum(serialize = "/")]
    Divide,
}

#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, StrumDisplay)]
pub enum AggregateKind {
    #[strum(serialize = "SUM")]
    Sum,
    #[strum(serialize = "COUNT")]
    Count,
    #[strum(serialize = "MIN")]
    Min,
    #[strum(serialize = "MAX")]
    Max,
    #[strum(serialize = "AVG")]
    Avg,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AggregateFunction {
    kind: AggregateKind,
    arguments: Vec<Scalar>,
    is_distinct: bool,
}

impl AggregateFunction {
    pub fn new(kind: AggregateKind, arguments: Vec<Scalar>, is_distinct: bool) -> Self {
        Self {
            kind,
            arguments,
            is_distinct,
        }
    }

    pub fn kind(&self) -> AggregateKind {
        self.kind
    }

    pub fn arguments(&self) -> &[Scalar] {
        &self.arguments
    }

    pub fn is_distinct(&self) -> bool {
        self.is_distinct
    }

    pub fn data_type(&self) -> DataType {
        let argument_type = self
            .arguments
            .first()
            .map(Scalar::data_type)
            .unwrap_or(DataType::Long);
        match self.kind {
            AggregateKind::Count => DataType::Long,
            AggregateKind::Avg => DataType::Double,
            AggregateKind::Sum => argument_type.promote(&DataType::Long),
            AggregateKind::Min | AggregateKind::Max => argument_type,
        }
    }
}

/// A scalar (value producing) expression.
#[derive(Clone, Debug, PartialEq)]
pub enum Scalar {
    Attribute(AttributeReference),
    Literal(Literal),
    Binary {
        op: BinaryOp,
        left: Box<Scalar>,
        right: Box<Scalar>,
    },
    Aggregate(AggregateFunction),
}

impl Scalar {
    pub fn binary(op: BinaryOp, left: Scalar, right: Scalar) -> Self {
        Scalar::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            Scalar::Attribute(attr) => attr.data_type(),
            Scalar::Literal(literal) => literal.data_type(),
            Scalar::Binary { op, left, right } => match op {
                BinaryOp::Divide => left.data_type().promote(&right.data_type()).promote(&DataType::Double),
                _ => left.data_type().promote(&right.data_type()),
            },
            Scalar::Aggregate(aggregate) => aggregate.data_type(),
        }
    }

    pub fn as_attribute(&self) -> Option<&AttributeReference> {
        match self {
            Scalar::Attribute(attr) => Some(attr),
            _ => None,
        }
    }

    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            Scalar::Literal(literal) => Some(literal),
            _ => None,
        }
    }

    pub fn referenced_attributes(&self) -> Vec<AttributeReference> {
        let mut attributes = Vec::new();
        self.collect_referenced_attributes(&mut attributes);
        attributes
    }

    pub(crate) fn collect_referenced_attributes(&self, attributes: &mut Vec<AttributeReference>) {
        match self {
            Scalar::Attribute(attr) => attributes.push(attr.clone()),
            Scalar::Literal(_) => {}
            Scalar::Binary { left, right, .. } => {
                left.collect_referenced_attributes(attributes);
                right.collect_referenced_attributes(attributes);
            }
            Scalar::Aggregate(aggregate) => {
                for argument in &aggregate.arguments {
                    argument.collect_referenced_attributes(attributes);
                }
            }
        }
    }
}

impl From<AttributeReference> for Scalar {
    fn from(attr: AttributeReference) -> Self {
        Scalar::Attribute(attr)
    }
}

impl From<Literal> for Scalar {
    fn from(literal: Literal) -> Self {
        Scalar::Literal(literal)
    }
}

impl Display for Scalar {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Scalar::Attribute(attr) => write!(f, "{}", attr),
            Scalar::Literal(literal) => write!(f, "{}", literal),
            Scalar::Binary { op, left, right } => write!(f, "({} {} {})", left, op, right),
            Scalar::Aggregate(aggregate) => write!(
                f,
                "{}({}{})",
                aggregate.kind,
                if aggregate.is_distinct { "DISTINCT " } else { "" },
                aggregate.arguments.iter().join(", ")
            ),
        }
    }
}
