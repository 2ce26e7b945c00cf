use std::collections::{BTreeSet, HashSet};
use std::fmt::{Display, Formatter};

use itertools::Itertools;
use strum_macros::Display as StrumDisplay;

use crate::expr::ExprId;
use crate::properties::PhysicalProp;

#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, StrumDisplay)]
pub enum PartitionType {
    Hash,
    Random,
    Range,
}

/// Ids of attributes that are known to hold equal values, any of which induces the same
/// partitioning.
pub type EquivalentPartitionExprIds = BTreeSet<ExprId>;

/// How the output of a node is partitioned.
///
/// An empty `partition_expr_ids` on a hash partitioned node means the node keeps the partition
/// id of its input without being partitioned on any attribute it outputs.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct PartitionSchemeHeader {
    partition_type: PartitionType,
    num_partitions: usize,
    partition_expr_ids: Vec<EquivalentPartitionExprIds>,
}

impl PartitionSchemeHeader {
    pub fn new(
        partition_type: PartitionType,
        num_partitions: usize,
        partition_expr_ids: Vec<EquivalentPartitionExprIds>,
    ) -> Self {
        assert!(num_partitions > 0, "partition scheme without partitions");
        Self {
            partition_type,
            num_partitions,
            partition_expr_ids,
        }
    }

    /// Hash partitioning on each of `ids`, one group per attribute.
    pub fn hash<I: IntoIterator<Item = ExprId>>(num_partitions: usize, ids: I) -> Self {
        Self::new(
            PartitionType::Hash,
            num_partitions,
            ids.into_iter().map(|id| BTreeSet::from([id])).collect(),
        )
    }

    pub fn random(num_partitions: usize) -> Self {
        Self::new(PartitionType::Random, num_partitions, vec![])
    }

    pub fn partition_type(&self) -> PartitionType {
        self.partition_type
    }

    pub fn num_partitions(&self) -> usize {
        self.num_partitions
    }

    pub fn partition_expr_ids(&self) -> &[EquivalentPartitionExprIds] {
        &self.partition_expr_ids
    }

    pub fn is_hash_partition(&self) -> bool {
        self.partition_type == PartitionType::Hash
    }

    /// Whether a consumer that needs its input hash partitioned on `expr_ids` can reuse this
    /// partitioning, i.e. every partition attribute group has a member in `expr_ids`.
    ///
    /// A header without groups is partitioned on no output attribute and is never reusable.
    pub fn reusable_partition_scheme(&self, expr_ids: &HashSet<ExprId>) -> bool {
        if self.partition_expr_ids.is_empty() || self.partition_expr_ids.len() > expr_ids.len() {
            return false;
        }

        self.partition_expr_ids
            .iter()
            .all(|group| group.iter().any(|id| expr_ids.contains(id)))
    }

    /// Whether this is a hash partitioning on exactly `expr_ids`, one group per attribute in the
    /// same order, so that a join side hashed on its join attributes is co-partitioned with it.
    pub fn is_hash_partitioned_on(&self, expr_ids: &[ExprId]) -> bool {
        self.is_hash_partition()
            && self.partition_expr_ids.len() == expr_ids.len()
            && !expr_ids.is_empty()
            && self
                .partition_expr_ids
                .iter()
                .zip(expr_ids)
                .all(|(group, id)| group.contains(id))
    }

    /// Keeps only the partition attributes in `projected`, dropping groups that become empty.
    pub fn project(&self, projected: &HashSet<ExprId>) -> Vec<EquivalentPartitionExprIds> {
        self.partition_expr_ids
            .iter()
            .map(|group| {
                group
                    .iter()
                    .filter(|id| projected.contains(id))
                    .copied()
                    .collect::<EquivalentPartitionExprIds>()
            })
            .filter(|group| !group.is_empty())
            .collect()
    }

    pub fn with_num_partitions(&self, num_partitions: usize) -> Self {
        Self::new(
            self.partition_type,
            num_partitions,
            self.partition_expr_ids.clone(),
        )
    }
}

impl PhysicalProp for PartitionSchemeHeader {
    fn satisfies(&self, required: &Self) -> bool {
        if !self.is_hash_partition() || !required.is_hash_partition() {
            return self == required;
        }
        let required_ids: Vec<ExprId> = required
            .partition_expr_ids
            .iter()
            .filter_map(|group| group.iter().next().copied())
            .collect();
        self.num_partitions == required.num_partitions
            && required_ids.len() == required.partition_expr_ids.len()
            && self.is_hash_partitioned_on(&required_ids)
    }
}

impl Display for PartitionSchemeHeader {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}[{}]({})",
            self.partition_type,
            self.num_partitions,
            self.partition_expr_ids
                .iter()
                .map(|group| format!("{{{}}}", group.iter().join(",")))
                .join(", ")
        )
    }
}
