//! # STR alignment classification
use crate::align::{AlignmentParams, GraphAlignment};
use crate::graph::{Graph, NodeId};
use crate::purity;

use super::retention_threshold;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StrAlignmentKind {
    Spanning,
    Flanking,
    InRepeat,
}

/// One high-scoring alignment of a read to an STR. Different soft-clippings
/// of the same read count as different alignments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrAlignment {
    pub num_units: u32,
    pub kind: StrAlignmentKind,
    pub score: i32,
    pub clipped_read_length: u32,
}

impl StrAlignment {
    pub fn is_spanning(&self) -> bool {
        self.kind == StrAlignmentKind::Spanning
    }

    pub fn is_in_repeat(&self) -> bool {
        self.kind == StrAlignmentKind::InRepeat
    }
}

/// All retained alignments of one read to an STR.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadSummaryForStr {
    read_length: u32,
    alignments: Vec<StrAlignment>,
}

impl ReadSummaryForStr {
    pub fn new(read_length: u32) -> Self {
        ReadSummaryForStr { read_length, alignments: Vec::new() }
    }

    pub fn read_length(&self) -> u32 {
        self.read_length
    }

    pub fn has_alignments(&self) -> bool {
        !self.alignments.is_empty()
    }

    pub fn alignments(&self) -> &[StrAlignment] {
        &self.alignments
    }

    pub fn add_alignment(&mut self, alignment: StrAlignment) {
        self.alignments.push(alignment);
    }

    /// The retained alignment with the highest score, spanning outranking
    /// flanking outranking in-repeat on ties.
    pub fn top_alignment(&self) -> Option<&StrAlignment> {
        self.alignments
            .iter()
            .min_by_key(|alignment| (-alignment.score, alignment.kind, alignment.num_units))
    }
}

pub struct StrClassifier {
    repeat_node: NodeId,
    motif: Vec<u8>,
    purity_threshold: f64,
}

impl StrClassifier {
    pub fn new(graph: &Graph, repeat_node: NodeId) -> Self {
        StrClassifier {
            repeat_node,
            motif: graph.node_seq(repeat_node).to_vec(),
            purity_threshold: 0.90,
        }
    }

    pub fn with_purity_threshold(mut self, purity_threshold: f64) -> Self {
        self.purity_threshold = purity_threshold;
        self
    }

    pub fn motif(&self) -> &[u8] {
        &self.motif
    }

    /// Label one alignment with respect to this STR. Alignments that touch
    /// neither the repeat nor both flanks yield `None`.
    pub fn classify(
        &self,
        alignment: &GraphAlignment,
        params: &AlignmentParams,
    ) -> Option<StrAlignment> {
        let mut left_flank_matches = 0;
        let mut right_flank_matches = 0;
        let mut repeat_ref_len = 0;
        let mut visits_repeat = false;

        for node_alignment in &alignment.node_alignments {
            let node_id = node_alignment.node_id;
            if node_id < self.repeat_node {
                left_flank_matches += node_alignment.num_matched();
            } else if node_id == self.repeat_node {
                visits_repeat = true;
                repeat_ref_len += node_alignment.reference_length();
            } else {
                right_flank_matches += node_alignment.num_matched();
            }
        }

        let kind = match (left_flank_matches > 0, right_flank_matches > 0) {
            (true, true) => StrAlignmentKind::Spanning,
            (true, false) | (false, true) if visits_repeat => StrAlignmentKind::Flanking,
            _ if visits_repeat => StrAlignmentKind::InRepeat,
            _ => return None,
        };

        let num_units = repeat_ref_len / self.motif.len() as u32;
        Some(StrAlignment {
            num_units,
            kind,
            score: alignment.score(params),
            clipped_read_length: alignment.clipped_query_length(),
        })
    }

    /// Summarize all alignments of one read, dropping in-repeat labels whose
    /// sequence disagrees with the motif and keeping only alignments within
    /// one edit of the best score. Duplicate (units, kind) entries collapse
    /// to the higher score.
    pub fn classify_read(
        &self,
        read_sequence: &[u8],
        alignments: &[GraphAlignment],
        params: &AlignmentParams,
    ) -> ReadSummaryForStr {
        let mut summary = ReadSummaryForStr::new(read_sequence.len() as u32);

        let mut classified: Vec<StrAlignment> = alignments
            .iter()
            .filter_map(|alignment| self.classify(alignment, params))
            .filter(|str_alignment| {
                !str_alignment.is_in_repeat()
                    || purity::weighted_purity(read_sequence, &self.motif)
                        >= self.purity_threshold
            })
            .collect();
        if classified.is_empty() {
            return summary;
        }

        let best_score = classified.iter().map(|a| a.score).max().unwrap();
        let threshold = retention_threshold(best_score, params);
        classified.retain(|a| a.score >= threshold);

        classified.sort_by_key(|a| (a.kind, a.num_units, -a.score));
        classified.dedup_by_key(|a| (a.kind, a.num_units));

        for str_alignment in classified {
            summary.add_alignment(str_alignment);
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::decode_graph_alignment;
    use crate::graph::make_str_graph;

    fn classifier() -> StrClassifier {
        let graph = make_str_graph("AAAACC", "CCG", "ATTT");
        StrClassifier::new(&graph, 1)
    }

    #[test]
    fn spanning_alignments_are_classified() {
        let classifier = classifier();
        let params = AlignmentParams::default();

        // FFRRRRRRFF: CCCCGCCGAT
        let alignment = decode_graph_alignment(4, "0[2M]1[3M]1[3M]2[2M]").unwrap();
        let summary = classifier.classify(&alignment, &params).unwrap();
        assert_eq!(StrAlignmentKind::Spanning, summary.kind);
        assert_eq!(2, summary.num_units);
        assert_eq!(alignment.score(&params), summary.score);

        // bypass read CCAT spans with zero units
        let alignment = decode_graph_alignment(4, "0[2M]2[2M]").unwrap();
        let summary = classifier.classify(&alignment, &params).unwrap();
        assert_eq!(StrAlignmentKind::Spanning, summary.kind);
        assert_eq!(0, summary.num_units);
    }

    #[test]
    fn flanking_alignments_are_classified() {
        let classifier = classifier();
        let params = AlignmentParams::default();

        // AACCCCG
        let alignment = decode_graph_alignment(2, "0[4M]1[3M]").unwrap();
        let summary = classifier.classify(&alignment, &params).unwrap();
        assert_eq!(StrAlignmentKind::Flanking, summary.kind);
        assert_eq!(1, summary.num_units);

        // CCGATT
        let alignment = decode_graph_alignment(0, "1[3M]2[3M]").unwrap();
        let summary = classifier.classify(&alignment, &params).unwrap();
        assert_eq!(StrAlignmentKind::Flanking, summary.kind);
        assert_eq!(1, summary.num_units);
    }

    #[test]
    fn in_repeat_alignments_are_classified() {
        let classifier = classifier();
        let params = AlignmentParams::default();

        // CCGCCGCC
        let alignment = decode_graph_alignment(0, "1[3M]1[3M]1[2M]").unwrap();
        let summary = classifier.classify(&alignment, &params).unwrap();
        assert_eq!(StrAlignmentKind::InRepeat, summary.kind);
        assert_eq!(2, summary.num_units);
    }

    #[test]
    fn alignments_outside_the_repeat_are_not_classified() {
        let classifier = classifier();
        let params = AlignmentParams::default();

        // AAAAC: left flank only
        let alignment = decode_graph_alignment(0, "0[5M]").unwrap();
        assert!(classifier.classify(&alignment, &params).is_none());

        // TTT: right flank only
        let alignment = decode_graph_alignment(1, "2[3M]").unwrap();
        assert!(classifier.classify(&alignment, &params).is_none());
    }

    #[test]
    fn impure_in_repeat_reads_are_dropped() {
        let classifier = classifier();
        let params = AlignmentParams::default();

        let alignment = decode_graph_alignment(0, "1[3M]1[1M1X1M]1[2M]").unwrap();
        let summary = classifier.classify_read(b"CCGCTGCC", &[alignment], &params);
        assert!(!summary.has_alignments());
    }

    #[test]
    fn classify_read_keeps_only_near_best_alignments() {
        let classifier = classifier();
        let params = AlignmentParams::default();

        let strong = decode_graph_alignment(4, "0[2M]1[3M]1[3M]2[2M]").unwrap();
        let weak = decode_graph_alignment(0, "0[1M5X]1[3M]1[1M]").unwrap();
        let summary = classifier.classify_read(b"CCCCGCCGAT", &[strong, weak], &params);

        assert_eq!(1, summary.alignments().len());
        assert_eq!(StrAlignmentKind::Spanning, summary.alignments()[0].kind);
    }
}
