use crate::properties::PartitionSchemeHeader;

/// Physical properties of a node's output.
#[derive(Clone, Debug, Default, Hash, Eq, PartialEq)]
pub struct PhysicalPropertySet {
    partition_scheme: Option<PartitionSchemeHeader>,
    /// Whether the node itself repartitions its output.
    has_repartition: bool,
}

impl PhysicalPropertySet {
    pub fn new(partition_scheme: Option<PartitionSchemeHeader>, has_repartition: bool) -> Self {
        Self {
            partition_scheme,
            has_repartition,
        }
    }

    pub fn partitioned(partition_scheme: PartitionSchemeHeader, has_repartition: bool) -> Self {
        Self::new(Some(partition_scheme), has_repartition)
    }

    pub fn partition_scheme(&self) -> Option<&PartitionSchemeHeader> {
        self.partition_scheme.as_ref()
    }

    pub fn has_repartition(&self) -> bool {
        self.has_repartition
    }
}
