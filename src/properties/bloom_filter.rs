use crate::expr::AttributeReference;
use crate::plan::PlanNodeId;

#[derive(Clone, Debug, PartialEq)]
pub struct BloomFilterProbeInfo {
    pub probe_attribute: AttributeReference,
    pub build_attribute: AttributeReference,
    /// Id of the node building the filter, valid in the plan the config is attached to.
    pub builder: PlanNodeId,
}

/// Bloom filters built and probed by a single node.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BloomFilterConfig {
    build_side: Vec<AttributeReference>,
    probe_side: Vec<BloomFilterProbeInfo>,
}

impl BloomFilterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_build_side_bloom_filter(&mut self, build_attribute: AttributeReference) {
        if !self.build_side.iter().any(|a| a.id() == build_attribute.id()) {
            self.build_side.push(build_attribute);
        }
    }

    pub fn add_probe_side_bloom_filter(
        &mut self,
        probe_attribute: AttributeReference,
        build_attribute: AttributeReference,
        builder: PlanNodeId,
    ) {
        self.probe_side.push(BloomFilterProbeInfo {
            probe_attribute,
            build_attribute,
            builder,
        });
    }

    pub fn build_side(&self) -> &[AttributeReference] {
        &self.build_side
    }

    pub fn probe_side(&self) -> &[BloomFilterProbeInfo] {
        &self.probe_side
    }

    pub fn is_empty(&self) -> bool {
        self.build_side.is_empty() && self.probe_side.is_empty()
    }
}
