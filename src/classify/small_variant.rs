//! # Small-variant alignment classification
use crate::align::{AlignmentParams, GraphAlignment};
use crate::graph::NodeId;

use super::retention_threshold;

/// Sentinel node id marking an alignment that threads past the variant
/// without touching any of its nodes.
pub const BYPASS_NODE: NodeId = NodeId::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SmallVariantAlignmentKind {
    Spanning,
    UpstreamFlanking,
    DownstreamFlanking,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SmallVariantAlignment {
    pub node_id: NodeId,
    pub kind: SmallVariantAlignmentKind,
    pub score: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadSummaryForSmallVariant {
    read_length: u32,
    alignments: Vec<SmallVariantAlignment>,
}

impl ReadSummaryForSmallVariant {
    pub fn new(read_length: u32) -> Self {
        ReadSummaryForSmallVariant { read_length, alignments: Vec::new() }
    }

    pub fn read_length(&self) -> u32 {
        self.read_length
    }

    pub fn has_alignments(&self) -> bool {
        !self.alignments.is_empty()
    }

    pub fn alignments(&self) -> &[SmallVariantAlignment] {
        &self.alignments
    }

    pub fn add_alignment(&mut self, alignment: SmallVariantAlignment) {
        self.alignments.push(alignment);
    }

    pub fn top_alignment(&self) -> Option<&SmallVariantAlignment> {
        self.alignments
            .iter()
            .min_by_key(|alignment| (-alignment.score, alignment.kind, alignment.node_id))
    }
}

/// Projects alignments onto the node block of one small variant. The block
/// consists of the parallel alternative nodes; the label follows from where
/// the alignment enters and leaves relative to the block.
pub struct SmallVariantClassifier {
    variant_nodes: Vec<NodeId>,
    first_node: NodeId,
    last_node: NodeId,
}

impl SmallVariantClassifier {
    pub fn new(variant_nodes: Vec<NodeId>) -> Self {
        assert!(!variant_nodes.is_empty());
        let first_node = *variant_nodes.iter().min().unwrap();
        let last_node = *variant_nodes.iter().max().unwrap();
        SmallVariantClassifier { variant_nodes, first_node, last_node }
    }

    pub fn classify(
        &self,
        alignment: &GraphAlignment,
        params: &AlignmentParams,
    ) -> Option<SmallVariantAlignment> {
        let mut upstream_matches = 0;
        let mut downstream_matches = 0;
        let mut touched_node: Option<NodeId> = None;

        for node_alignment in &alignment.node_alignments {
            let node_id = node_alignment.node_id;
            if self.variant_nodes.contains(&node_id) {
                touched_node = Some(node_id);
            } else if node_id < self.first_node {
                upstream_matches += node_alignment.num_matched();
            } else if node_id > self.last_node {
                downstream_matches += node_alignment.num_matched();
            }
        }

        let score = alignment.score(params);
        match touched_node {
            None if upstream_matches > 0 && downstream_matches > 0 => Some(SmallVariantAlignment {
                node_id: BYPASS_NODE,
                kind: SmallVariantAlignmentKind::Spanning,
                score,
            }),
            None => None,
            Some(node_id) => {
                let kind = match (upstream_matches > 0, downstream_matches > 0) {
                    (true, true) => SmallVariantAlignmentKind::Spanning,
                    (true, false) => SmallVariantAlignmentKind::UpstreamFlanking,
                    (false, true) => SmallVariantAlignmentKind::DownstreamFlanking,
                    (false, false) => return None,
                };
                Some(SmallVariantAlignment { node_id, kind, score })
            }
        }
    }

    pub fn classify_read(
        &self,
        read_sequence: &[u8],
        alignments: &[GraphAlignment],
        params: &AlignmentParams,
    ) -> ReadSummaryForSmallVariant {
        let mut summary = ReadSummaryForSmallVariant::new(read_sequence.len() as u32);

        let mut classified: Vec<SmallVariantAlignment> = alignments
            .iter()
            .filter_map(|alignment| self.classify(alignment, params))
            .collect();
        if classified.is_empty() {
            return summary;
        }

        let best_score = classified.iter().map(|a| a.score).max().unwrap();
        let threshold = retention_threshold(best_score, params);
        classified.retain(|a| a.score >= threshold);

        classified.sort_by_key(|a| (a.node_id, a.kind, -a.score));
        classified.dedup_by_key(|a| (a.node_id, a.kind));

        for alignment in classified {
            summary.add_alignment(alignment);
        }
        summary
    }
}
