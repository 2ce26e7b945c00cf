use std::fmt::{Display, Formatter};

use strum_macros::Display as StrumDisplay;

/// Value type of an attribute or scalar.
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, StrumDisplay)]
pub enum DataType {
    Int,
    Long,
    Float,
    Double,
    Char(usize),
    VarChar(usize),
    Date,
    Bool,
}

impl DataType {
    pub fn is_integer(&self) -> bool {
        matches!(self, DataType::Int | DataType::Long)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            DataType::Int | DataType::Long | DataType::Float | DataType::Double
        )
    }

    pub fn is_variable_length(&self) -> bool {
        matches!(self, DataType::VarChar(_))
    }

    pub fn maximum_byte_length(&self) -> usize {
        match self {
            DataType::Int | DataType::Float | DataType::Date => 4,
            DataType::Long | DataType::Double => 8,
            DataType::Char(len) | DataType::VarChar(len) => *len,
            DataType::Bool => 1,
        }
    }

    /// Result type of an arithmetic operation over `self` and `other`.
    pub fn promote(&self, other: &DataType) -> DataType {
        use DataType::*;
        match (self, other) {
            (Double, _) | (_, Double) => Double,
            (Float, Long) | (Long, Float) => Double,
            (Float, _) | (_, Float) => Float,
            (Long, _) | (_, Long) => Long,
            _ => *self,
        }
    }
}

/// A typed literal value.
#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    Null(DataType),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Char(String),
    Date(i32),
    Bool(bool),
}

impl Literal {
    pub fn data_type(&self) -> DataType {
        match self {
            Literal::Null(data_type) => *data_type,
            Literal::Int(_) => DataType::Int,
            Literal::Long(_) => DataType::Long,
            Literal::Float(_) => DataType::Float,
            Literal::Double(_) => DataType::Double,
            Literal::Char(s) => DataType::Char(s.len()),
            Literal::Date(_) => DataType::Date,
            Literal::Bool(_) => DataType::Bool,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Literal::Null(_))
    }

    /// The value widened to `i64`, for integer literals only.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Literal::Int(v) => Some(*v as i64),
            Literal::Long(v) => Some(*v),
            _ => None,
        }
    }
}

impl Display for Literal {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Literal::Null(_) => write!(f, "NULL"),
            Literal::Int(v) => write!(f, "{}", v),
            Literal::Long(v) => write!(f, "{}", v),
            Literal::Float(v) => write!(f, "{}", v),
            Literal::Double(v) => write!(f, "{}", v),
            Literal::Char(v) => write!(f, "'{}'", v),
            Literal::Date(v) => write!(f, "date({})", v),
            Literal::Bool(v) => write!(f, "{}", v),
        }
    }
}
