//! # Seeded gapped graph aligner
//!
//! Alignment proceeds in three steps: pick the most specific clean k-mer of
//! the query as a seed, anchor it at every graph position where the k-mer
//! occurs, and extend each anchor in both directions with a gapped dynamic
//! program that follows graph edges at node boundaries. Self-loop edges are
//! followed like any other, which is how repeat traversal counts are
//! enumerated. All distinct alignments tied for the best score are returned.
//!
//! Lowercase (quality-masked) query bases align to any reference base as
//! `MissingBases` columns with score zero, and they never seed.
use std::sync::Arc;

use crate::graph::{Graph, NodeId};

use super::alignment::{AlignmentParams, GraphAlignment, NodeAlignment};
use super::kmer_index::{GraphPosition, KmerIndex};
use super::operation::{Operation, OperationType};

/// Heuristics steering seeding and extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlignerConfig {
    pub kmer_len: usize,
    /// Extra reference bases considered beyond the remaining query length
    /// when extending into a node.
    pub padding_len: usize,
    /// Seeds starting within this many bases of either read end are avoided
    /// when a more central seed exists.
    pub seed_affix_trim: usize,
}

impl Default for AlignerConfig {
    fn default() -> Self {
        AlignerConfig { kmer_len: 14, padding_len: 10, seed_affix_trim: 14 }
    }
}

pub struct GraphAligner {
    graph: Arc<Graph>,
    index: KmerIndex,
    config: AlignerConfig,
    params: AlignmentParams,
}

#[derive(Debug, Clone)]
struct Extension {
    /// Node visits in traversal order with their operation runs.
    node_ops: Vec<(NodeId, Vec<Operation>)>,
    /// Reference bases consumed in the final visited node.
    last_node_ref_len: usize,
    score: i32,
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Right,
    Left,
}

impl GraphAligner {
    pub fn new(graph: Arc<Graph>, config: AlignerConfig, params: AlignmentParams) -> Self {
        let index = KmerIndex::new(&graph, config.kmer_len);
        GraphAligner { graph, index, config, params }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn kmer_index(&self) -> &KmerIndex {
        &self.index
    }

    pub fn params(&self) -> &AlignmentParams {
        &self.params
    }

    /// Align `query` to the graph and return all top-scoring alignments.
    /// Queries without a clean seed k-mer yield an empty list.
    pub fn align(&self, query: &[u8]) -> Vec<GraphAlignment> {
        let k = self.config.kmer_len;
        if query.len() < k {
            return Vec::new();
        }

        let Some((seed_start, seed_positions)) = self.select_seed(query) else {
            return Vec::new();
        };

        let mut alignments = Vec::new();
        for position in seed_positions {
            if let Some(alignment) = self.extend_anchor(query, seed_start, position) {
                alignments.push(alignment);
            }
        }
        if alignments.is_empty() {
            return Vec::new();
        }

        let best_score = alignments
            .iter()
            .map(|alignment| alignment.score(&self.params))
            .max()
            .unwrap();
        let mut best: Vec<GraphAlignment> = alignments
            .into_iter()
            .filter(|alignment| alignment.score(&self.params) == best_score)
            .collect();
        best.sort_by_key(|alignment| format!("{alignment}"));
        best.dedup();
        best
    }

    /// Pick the query k-mer with the fewest graph occurrences, preferring
    /// seeds away from the read affixes and close to the read midpoint.
    fn select_seed(&self, query: &[u8]) -> Option<(usize, Vec<GraphPosition>)> {
        let k = self.config.kmer_len;
        let trim = self.config.seed_affix_trim;
        let midpoint = query.len() / 2;

        let mut candidates: Vec<(usize, &[GraphPosition])> = query
            .windows(k)
            .enumerate()
            .filter_map(|(start, kmer)| {
                self.index.positions_of(kmer).map(|positions| (start, positions))
            })
            .collect();
        if candidates.is_empty() {
            return None;
        }

        let inner: Vec<(usize, &[GraphPosition])> = candidates
            .iter()
            .copied()
            .filter(|(start, _)| *start >= trim && start + k + trim <= query.len())
            .collect();
        if !inner.is_empty() {
            candidates = inner;
        }

        candidates
            .into_iter()
            .min_by_key(|(start, positions)| {
                (positions.len(), midpoint.abs_diff(start + k / 2))
            })
            .map(|(start, positions)| (start, positions.to_vec()))
    }

    fn extend_anchor(
        &self,
        query: &[u8],
        seed_start: usize,
        anchor: GraphPosition,
    ) -> Option<GraphAlignment> {
        let right = self.extend(anchor.node_id, anchor.offset as usize, &query[seed_start..], Direction::Right)?;

        let left_query: Vec<u8> = query[..seed_start].iter().rev().copied().collect();
        let left = self.extend(anchor.node_id, anchor.offset as usize, &left_query, Direction::Left)?;

        Some(self.merge_extensions(anchor, left, right))
    }

    /// Stitch the leftward and rightward extensions back together at the
    /// anchor node.
    fn merge_extensions(
        &self,
        anchor: GraphPosition,
        left: Extension,
        right: Extension,
    ) -> GraphAlignment {
        // Leftward results are in reversed space: reverse the node order and
        // each operation list to obtain the real layout.
        let mut node_ops: Vec<(NodeId, Vec<Operation>)> = left
            .node_ops
            .iter()
            .rev()
            .map(|(node_id, ops)| (*node_id, ops.iter().rev().copied().collect()))
            .collect();

        let first_node_offset = match node_ops.first() {
            Some(_) if node_ops.len() > 1 => {
                self.graph.node_len(node_ops[0].0) - left.last_node_ref_len
            }
            Some(_) => anchor.offset as usize - left.last_node_ref_len,
            None => anchor.offset as usize,
        };

        // The anchor node appears at the end of the reversed left part (or
        // not at all when the seed starts the read) and at the start of the
        // right part; fuse the two operation runs.
        let mut right_iter = right.node_ops.into_iter();
        let (right_anchor_node, right_anchor_ops) = right_iter.next().unwrap();
        debug_assert_eq!(right_anchor_node, anchor.node_id);
        match node_ops.last_mut() {
            Some((last_node, ops)) if *last_node == anchor.node_id => {
                ops.extend(right_anchor_ops);
                coalesce(ops);
            }
            _ => node_ops.push((anchor.node_id, right_anchor_ops)),
        }
        node_ops.extend(right_iter);

        let node_alignments = node_ops
            .into_iter()
            .filter(|(_, ops)| !ops.is_empty())
            .map(|(node_id, ops)| NodeAlignment::new(node_id, ops))
            .collect();
        GraphAlignment::new(first_node_offset as u32, node_alignments)
    }

    /// Extend from a graph position, consuming `query` while walking edges in
    /// the given direction. Returns the best-scoring extension.
    fn extend(
        &self,
        node_id: NodeId,
        offset: usize,
        query: &[u8],
        direction: Direction,
    ) -> Option<Extension> {
        if query.is_empty() {
            return Some(Extension {
                node_ops: vec![(node_id, Vec::new())],
                last_node_ref_len: 0,
                score: 0,
            });
        }
        let mut best: Option<Extension> = None;
        self.extend_into(node_id, offset, true, query, direction, &mut best);
        best
    }

    fn extend_into(
        &self,
        node_id: NodeId,
        offset: usize,
        is_entry_node: bool,
        query: &[u8],
        direction: Direction,
        best: &mut Option<Extension>,
    ) {
        let full_segment = self.node_segment(node_id, offset, is_entry_node, direction);
        let band = query.len() + self.config.padding_len;
        let is_truncated = full_segment.len() > band;
        let segment = &full_segment[..full_segment.len().min(band)];
        let dp = align_segment(query, segment, &self.params);

        // Terminate inside this node, soft-clipping whatever the dynamic
        // program chose not to align.
        if let Some(ended) = &dp.end_inside {
            let candidate = Extension {
                node_ops: vec![(node_id, ended.ops.clone())],
                last_node_ref_len: ended.ref_consumed,
                score: ended.score,
            };
            record_best(best, candidate);
        }

        // Traversal requires the whole node; a segment truncated by the band
        // cannot be crossed by the remaining query anyway. Pure-deletion
        // traversal is only allowed for the zero-length entry segment, which
        // rules out unbounded self-loop descent.
        if is_truncated {
            return;
        }
        let Some(traversed) = &dp.traverse else {
            return;
        };
        if traversed.query_consumed == 0 && !segment.is_empty() {
            return;
        }
        let rest = &query[traversed.query_consumed..];
        if rest.is_empty() {
            let candidate = Extension {
                node_ops: vec![(node_id, traversed.ops.clone())],
                last_node_ref_len: segment.len(),
                score: traversed.score,
            };
            record_best(best, candidate);
            return;
        }

        let neighbours: Vec<NodeId> = match direction {
            Direction::Right => self.graph.successors(node_id).collect(),
            Direction::Left => self.graph.predecessors(node_id).collect(),
        };
        if neighbours.is_empty() {
            // End of the graph: the remaining query hangs over as a clip.
            let mut ops = traversed.ops.clone();
            ops.push(Operation::new(OperationType::SoftClip, rest.len() as u32));
            coalesce(&mut ops);
            let candidate = Extension {
                node_ops: vec![(node_id, ops)],
                last_node_ref_len: segment.len(),
                score: traversed.score + self.params.clipped_base_score * rest.len() as i32,
            };
            record_best(best, candidate);
            return;
        }

        for neighbour in neighbours {
            let mut tail_best: Option<Extension> = None;
            self.extend_into(neighbour, 0, false, rest, direction, &mut tail_best);
            if let Some(tail) = tail_best {
                let mut node_ops = Vec::with_capacity(1 + tail.node_ops.len());
                node_ops.push((node_id, traversed.ops.clone()));
                node_ops.extend(tail.node_ops);
                let candidate = Extension {
                    node_ops,
                    last_node_ref_len: tail.last_node_ref_len,
                    score: traversed.score + tail.score,
                };
                record_best(best, candidate);
            }
        }
    }

    fn node_segment(
        &self,
        node_id: NodeId,
        offset: usize,
        is_entry_node: bool,
        direction: Direction,
    ) -> Vec<u8> {
        let seq = self.graph.node_seq(node_id);
        match direction {
            Direction::Right => {
                let start = if is_entry_node { offset } else { 0 };
                seq[start..].to_vec()
            }
            Direction::Left => {
                let end = if is_entry_node { offset } else { seq.len() };
                seq[..end].iter().rev().copied().collect()
            }
        }
    }
}

fn record_best(best: &mut Option<Extension>, candidate: Extension) {
    match best {
        Some(current) if current.score >= candidate.score => {}
        _ => *best = Some(candidate),
    }
}

fn coalesce(ops: &mut Vec<Operation>) {
    let mut merged: Vec<Operation> = Vec::with_capacity(ops.len());
    for &op in ops.iter() {
        match merged.last_mut() {
            Some(last) if last.op_type == op.op_type => last.length += op.length,
            _ => merged.push(op),
        }
    }
    *ops = merged;
}

#[derive(Debug, Clone)]
struct SegmentAlignment {
    ops: Vec<Operation>,
    query_consumed: usize,
    ref_consumed: usize,
    score: i32,
}

#[derive(Debug)]
struct SegmentAlignments {
    /// Best alignment ending anywhere inside the segment with the unaligned
    /// query suffix soft-clipped.
    end_inside: Option<SegmentAlignment>,
    /// Best alignment consuming the whole segment, leaving a query suffix
    /// for the next node.
    traverse: Option<SegmentAlignment>,
}

fn column_score(query_base: u8, ref_base: u8, params: &AlignmentParams) -> (i32, OperationType) {
    if query_base.is_ascii_lowercase() {
        (0, OperationType::MissingBases)
    } else if query_base == ref_base && matches!(query_base, b'A' | b'C' | b'G' | b'T') {
        (params.match_score, OperationType::Match)
    } else {
        (params.mismatch_score, OperationType::Mismatch)
    }
}

/// Gapped alignment of `query` against one node segment. A single dynamic
/// program serves both termination modes.
fn align_segment(query: &[u8], segment: &[u8], params: &AlignmentParams) -> SegmentAlignments {
    let n = query.len();
    let m = segment.len();
    let gap = params.gap_open_score;

    // dp[j][r]: best score aligning query[..j] to segment[..r].
    let mut dp = vec![vec![0i32; m + 1]; n + 1];
    // 0 = stop, 1 = diagonal, 2 = up (insertion), 3 = left (deletion)
    let mut moves = vec![vec![0u8; m + 1]; n + 1];
    for j in 1..=n {
        dp[j][0] = dp[j - 1][0] + gap;
        moves[j][0] = 2;
    }
    for r in 1..=m {
        dp[0][r] = dp[0][r - 1] + gap;
        moves[0][r] = 3;
    }
    for j in 1..=n {
        for r in 1..=m {
            let (score, _) = column_score(query[j - 1], segment[r - 1], params);
            let diagonal = dp[j - 1][r - 1] + score;
            let up = dp[j - 1][r] + gap;
            let left = dp[j][r - 1] + gap;
            if diagonal >= up && diagonal >= left {
                dp[j][r] = diagonal;
                moves[j][r] = 1;
            } else if up >= left {
                dp[j][r] = up;
                moves[j][r] = 2;
            } else {
                dp[j][r] = left;
                moves[j][r] = 3;
            }
        }
    }

    let traceback = |mut j: usize, mut r: usize| -> Vec<Operation> {
        let mut ops_reversed: Vec<Operation> = Vec::new();
        while j > 0 || r > 0 {
            let (op_type, next) = match moves[j][r] {
                1 => {
                    let (_, op_type) = column_score(query[j - 1], segment[r - 1], params);
                    (op_type, (j - 1, r - 1))
                }
                2 => (OperationType::Insertion, (j - 1, r)),
                _ => (OperationType::Deletion, (j, r - 1)),
            };
            ops_reversed.push(Operation::new(op_type, 1));
            (j, r) = next;
        }
        let mut ops: Vec<Operation> = ops_reversed.into_iter().rev().collect();
        coalesce(&mut ops);
        ops
    };

    // Best cell overall, with the remaining query suffix clipped.
    let mut end_inside: Option<SegmentAlignment> = None;
    for j in 0..=n {
        for r in 0..=m {
            let clip_len = n - j;
            let score = dp[j][r] + params.clipped_base_score * clip_len as i32;
            if end_inside.as_ref().map_or(true, |current| score > current.score) {
                let mut ops = traceback(j, r);
                if clip_len > 0 {
                    ops.push(Operation::new(OperationType::SoftClip, clip_len as u32));
                    coalesce(&mut ops);
                }
                end_inside =
                    Some(SegmentAlignment { ops, query_consumed: n, ref_consumed: r, score });
            }
        }
    }

    // Best cell of the last column: the segment is fully consumed.
    let mut traverse: Option<SegmentAlignment> = None;
    for j in 0..=n {
        let score = dp[j][m];
        if traverse.as_ref().map_or(true, |current| score > current.score) {
            traverse = Some(SegmentAlignment {
                ops: traceback(j, m),
                query_consumed: j,
                ref_consumed: m,
                score,
            });
        }
    }

    SegmentAlignments { end_inside, traverse }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::make_str_graph;

    fn test_aligner() -> GraphAligner {
        let graph = Arc::new(make_str_graph("AAAACC", "CCG", "ATTT"));
        let config = AlignerConfig { kmer_len: 4, padding_len: 10, seed_affix_trim: 4 };
        GraphAligner::new(graph, config, AlignmentParams::default())
    }

    #[test]
    fn spanning_read_aligns_across_the_repeat() {
        let aligner = test_aligner();
        let alignments = aligner.align(b"AAAACCCCGCCGATTT");
        assert!(!alignments.is_empty());

        let alignment = &alignments[0];
        assert_eq!(16, alignment.query_length());
        assert_eq!(16, alignment.num_matched());
        assert_eq!("0[6M]1[3M]1[3M]2[4M]", alignment.to_string());
        assert_eq!(0, alignment.first_node_offset);
    }

    #[test]
    fn flanking_read_stops_in_the_repeat() {
        let aligner = test_aligner();
        let alignments = aligner.align(b"AAAACCCCGCC");
        assert!(!alignments.is_empty());
        let alignment = &alignments[0];
        assert_eq!(11, alignment.num_matched());
        assert_eq!("0[6M]1[3M]1[2M]", alignment.to_string());
    }

    #[test]
    fn in_repeat_read_loops_through_the_motif() {
        let aligner = test_aligner();
        let alignments = aligner.align(b"CCGCCGCCG");
        assert!(!alignments.is_empty());
        for alignment in &alignments {
            assert_eq!(9, alignment.num_matched());
            assert!(alignment.node_ids().all(|node_id| node_id == 1));
        }
    }

    #[test]
    fn read_with_mismatch_still_aligns() {
        let aligner = test_aligner();
        //                                 v
        let alignments = aligner.align(b"AAAACCACGATTT");
        assert!(!alignments.is_empty());
        let alignment = &alignments[0];
        assert_eq!(13, alignment.query_length());
        assert_eq!(12, alignment.num_matched());
    }

    #[test]
    fn masked_bases_align_as_missing() {
        let aligner = test_aligner();
        let alignments = aligner.align(b"AAAACCccgATTT");
        assert!(!alignments.is_empty());
        let alignment = &alignments[0];
        assert_eq!(13, alignment.query_length());
        // the masked motif bases contribute no score but stay aligned
        assert_eq!(10 * 5, alignment.score(aligner.params()));
    }

    #[test]
    fn read_without_seed_is_dropped() {
        let aligner = test_aligner();
        assert!(aligner.align(b"GGGGGGGG").is_empty());
        assert!(aligner.align(b"AAA").is_empty());
    }

    #[test]
    fn alignment_lengths_add_up() {
        let aligner = test_aligner();
        for query in [&b"AAAACCCCGCCGATTT"[..], b"CCGCCGCC", b"ACCCCGAT", b"AAAACCATTT"] {
            for alignment in aligner.align(query) {
                assert_eq!(query.len() as u32, alignment.query_length());
            }
        }
    }
}
