use std::fmt::{Display, Formatter};

use crate::expr::{DataType, ExprId};

/// A leaf named expression referring to a column produced by some node, identified by its
/// [`ExprId`].
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct AttributeReference {
    id: ExprId,
    name: String,
    alias: String,
    relation: String,
    data_type: DataType,
}

impl AttributeReference {
    pub fn new<S: Into<String>, R: Into<String>>(
        id: ExprId,
        name: S,
        relation: R,
        data_type: DataType,
    ) -> Self {
        let name = name.into();
        Self {
            id,
            alias: name.clone(),
            name,
            relation: relation.into(),
            data_type,
        }
    }

    pub fn with_alias<S: Into<String>>(mut self, alias: S) -> Self {
        self.alias = alias.into();
        self
    }

    pub fn id(&self) -> ExprId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn relation(&self) -> &str {
        &self.relation
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// A copy of this attribute under a new id, e.g. a second scan of the same column.
    pub fn with_new_id(&self, id: ExprId) -> Self {
        Self {
            id,
            ..self.clone()
        }
    }
}

impl Display for AttributeReference {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.relation.is_empty() {
            write!(f, "{}{}", self.alias, self.id)
        } else {
            write!(f, "{}.{}{}", self.relation, self.alias, self.id)
        }
    }
}
