use std::collections::BTreeMap;

use crate::expr::AttributeReference;
use crate::plan::{PlanNodeId, PlanNodeRef};

/// What to build a lookahead information passing (LIP) filter with.
#[derive(Clone, Debug, PartialEq)]
pub enum LipFilterBuildInfo {
    SingleIdentityHashFilter {
        build_attribute: AttributeReference,
        filter_cardinality: usize,
    },
    /// A dense bit vector over `[min_value, max_value]`.
    BitVectorExactFilter {
        build_attribute: AttributeReference,
        min_value: i64,
        max_value: i64,
        is_anti_filter: bool,
    },
}

impl LipFilterBuildInfo {
    pub fn build_attribute(&self) -> &AttributeReference {
        match self {
            LipFilterBuildInfo::SingleIdentityHashFilter {
                build_attribute, ..
            }
            | LipFilterBuildInfo::BitVectorExactFilter {
                build_attribute, ..
            } => build_attribute,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LipFilterProbeInfo {
    pub probe_attribute: AttributeReference,
    pub build_attribute: AttributeReference,
    /// The node the filter's builder is attached to.
    pub builder: PlanNodeRef,
}

/// Plan wide record of which nodes build and which probe LIP filters. Keyed by node id, each
/// entry also keeps the node itself.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LipFilterConfiguration {
    build_info: BTreeMap<PlanNodeId, (PlanNodeRef, Vec<LipFilterBuildInfo>)>,
    probe_info: BTreeMap<PlanNodeId, (PlanNodeRef, Vec<LipFilterProbeInfo>)>,
}

impl LipFilterConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_build_info(&mut self, builder: &PlanNodeRef, info: LipFilterBuildInfo) {
        self.build_info
            .entry(builder.id())
            .or_insert_with(|| (builder.clone(), vec![]))
            .1
            .push(info);
    }

    pub fn add_probe_info(
        &mut self,
        probe_attribute: AttributeReference,
        prober: &PlanNodeRef,
        build_attribute: AttributeReference,
        builder: &PlanNodeRef,
    ) {
        self.probe_info
            .entry(prober.id())
            .or_insert_with(|| (prober.clone(), vec![]))
            .1
            .push(LipFilterProbeInfo {
                probe_attribute,
                build_attribute,
                builder: builder.clone(),
            });
    }

    pub fn is_empty(&self) -> bool {
        self.build_info.is_empty() && self.probe_info.is_empty()
    }

    pub fn build_info(&self, node: PlanNodeId) -> &[LipFilterBuildInfo] {
        self.build_info
            .get(&node)
            .map(|(_, infos)| infos.as_slice())
            .unwrap_or(&[])
    }

    pub fn probe_info(&self, node: PlanNodeId) -> &[LipFilterProbeInfo] {
        self.probe_info
            .get(&node)
            .map(|(_, infos)| infos.as_slice())
            .unwrap_or(&[])
    }

    pub fn builders(&self) -> impl Iterator<Item = &PlanNodeRef> {
        self.build_info.values().map(|(node, _)| node)
    }

    pub fn probers(&self) -> impl Iterator<Item = &PlanNodeRef> {
        self.probe_info.values().map(|(node, _)| node)
    }

    pub fn num_filters(&self) -> usize {
        self.build_info.values().map(|(_, infos)| infos.len()).sum()
    }
}
