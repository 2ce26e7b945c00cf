//! Catalog statistics consumed by the cost model.
//!
//! The optimizer only ever reads statistics. Every lookup is optional and the cost model falls
//! back to a heuristic whenever a statistic is unknown.

use std::collections::HashMap;
use std::rc::Rc;

use crate::expr::{DataType, Literal};

pub type RelationRef = Rc<Relation>;

/// A stored relation as known to the catalog.
#[derive(Clone, Debug, PartialEq)]
pub struct Relation {
    name: String,
    columns: Vec<(String, DataType)>,
    /// Structural estimate (e.g. derived from the number of blocks), used when no exact tuple
    /// count is available.
    estimated_num_tuples: usize,
    allows_ad_hoc_insert: bool,
}

impl Relation {
    pub fn new<S: Into<String>>(name: S, columns: Vec<(String, DataType)>) -> Self {
        Self {
            name: name.into(),
            columns,
            estimated_num_tuples: 0,
            allows_ad_hoc_insert: true,
        }
    }

    pub fn with_estimated_num_tuples(mut self, estimated_num_tuples: usize) -> Self {
        self.estimated_num_tuples = estimated_num_tuples;
        self
    }

    pub fn with_ad_hoc_insert(mut self, allows_ad_hoc_insert: bool) -> Self {
        self.allows_ad_hoc_insert = allows_ad_hoc_insert;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[(String, DataType)] {
        &self.columns
    }

    pub fn column_position(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|(name, _)| name == column)
    }

    pub fn estimated_num_tuples(&self) -> usize {
        self.estimated_num_tuples
    }

    pub fn allows_ad_hoc_insert(&self) -> bool {
        self.allows_ad_hoc_insert
    }
}

/// Bounds of the values of a column.
#[derive(Clone, Debug, PartialEq)]
pub struct ValueRange {
    /// Whether `low` and `high` are actual values of the column rather than loose bounds.
    pub exact: bool,
    pub low: Literal,
    pub high: Literal,
}

/// Read only access to per relation statistics.
pub trait StatisticsProvider {
    fn num_tuples(&self, relation: &str) -> Option<usize>;

    fn num_distinct_values(&self, relation: &str, column: &str) -> Option<usize>;

    fn min_max(&self, relation: &str, column: &str) -> Option<ValueRange>;
}

#[derive(Clone, Debug, Default, PartialEq)]
struct ColumnStatistics {
    num_distinct_values: Option<usize>,
    range: Option<ValueRange>,
}

#[derive(Clone, Debug, Default, PartialEq)]
struct RelationStatistics {
    num_tuples: Option<usize>,
    columns: HashMap<String, ColumnStatistics>,
}

/// In memory statistics provider.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Statistics {
    relations: HashMap<String, RelationStatistics>,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    fn column_mut(&mut self, relation: &str, column: &str) -> &mut ColumnStatistics {
        self.relations
            .entry(relation.to_string())
            .or_default()
            .columns
            .entry(column.to_string())
            .or_default()
    }

    pub fn with_num_tuples(mut self, relation: &str, num_tuples: usize) -> Self {
        self.relations
            .entry(relation.to_string())
            .or_default()
            .num_tuples = Some(num_tuples);
        self
    }

    pub fn with_num_distinct_values(
        mut self,
        relation: &str,
        column: &str,
        num_distinct_values: usize,
    ) -> Self {
        self.column_mut(relation, column).num_distinct_values = Some(num_distinct_values);
        self
    }

    pub fn with_min_max(
        mut self,
        relation: &str,
        column: &str,
        low: Literal,
        high: Literal,
        exact: bool,
    ) -> Self {
        self.column_mut(relation, column).range = Some(ValueRange { exact, low, high });
        self
    }

    fn column(&self, relation: &str, column: &str) -> Option<&ColumnStatistics> {
        self.relations.get(relation)?.columns.get(column)
    }
}

impl StatisticsProvider for Statistics {
    fn num_tuples(&self, relation: &str) -> Option<usize> {
        self.relations.get(relation)?.num_tuples
    }

    fn num_distinct_values(&self, relation: &str, column: &str) -> Option<usize> {
        self.column(relation, column)?.num_distinct_values
    }

    fn min_max(&self, relation: &str, column: &str) -> Option<ValueRange> {
        self.column(relation, column)?.range.clone()
    }
}
