use std::fmt::{Display, Formatter};

use crate::expr::{AttributeReference, DataType, ExprId, Scalar};

/// A scalar bound to a new name and id.
#[derive(Clone, Debug, PartialEq)]
pub struct Alias {
    id: ExprId,
    name: String,
    relation: String,
    expr: Scalar,
}

impl Alias {
    pub fn new<S: Into<String>, R: Into<String>>(
        id: ExprId,
        name: S,
        relation: R,
        expr: Scalar,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            relation: relation.into(),
            expr,
        }
    }

    pub fn id(&self) -> ExprId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn relation(&self) -> &str {
        &self.relation
    }

    pub fn expr(&self) -> &Scalar {
        &self.expr
    }
}

/// An expression producing an output column.
#[derive(Clone, Debug, PartialEq)]
pub enum NamedExpression {
    Attribute(AttributeReference),
    Alias(Alias),
}

impl NamedExpression {
    pub fn id(&self) -> ExprId {
        match self {
            NamedExpression::Attribute(attr) => attr.id(),
            NamedExpression::Alias(alias) => alias.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            NamedExpression::Attribute(attr) => attr.alias(),
            NamedExpression::Alias(alias) => &alias.name,
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            NamedExpression::Attribute(attr) => attr.data_type(),
            NamedExpression::Alias(alias) => alias.expr.data_type(),
        }
    }

    pub fn as_attribute(&self) -> Option<&AttributeReference> {
        match self {
            NamedExpression::Attribute(attr) => Some(attr),
            NamedExpression::Alias(_) => None,
        }
    }

    pub fn as_alias(&self) -> Option<&Alias> {
        match self {
            NamedExpression::Alias(alias) => Some(alias),
            NamedExpression::Attribute(_) => None,
        }
    }

    /// The attribute a consumer of this expression's output refers to.
    pub fn to_ref(&self) -> AttributeReference {
        match self {
            NamedExpression::Attribute(attr) => attr.clone(),
            NamedExpression::Alias(alias) => AttributeReference::new(
                alias.id,
                alias.name.clone(),
                alias.relation.clone(),
                alias.expr.data_type(),
            ),
        }
    }

    /// Attributes this expression reads. An attribute reference reads itself.
    pub fn referenced_attributes(&self) -> Vec<AttributeReference> {
        match self {
            NamedExpression::Attribute(attr) => vec![attr.clone()],
            NamedExpression::Alias(alias) => alias.expr.referenced_attributes(),
        }
    }
}

impl From<AttributeReference> for NamedExpression {
    fn from(attr: AttributeReference) -> Self {
        NamedExpression::Attribute(attr)
    }
}

impl From<Alias> for NamedExpression {
    fn from(alias: Alias) -> Self {
        NamedExpression::Alias(alias)
    }
}

impl Display for NamedExpression {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            NamedExpression::Attribute(attr) => write!(f, "{}", attr),
            NamedExpression::Alias(alias) => write!(f, "{} AS {}{}", alias.expr, alias.name, alias.id),
        }
    }
}
