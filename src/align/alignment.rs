//! # Graph alignments
//!
//! A [`GraphAlignment`] is a walk through the locus graph together with one
//! linear alignment per visited node. Alignments are encoded in a compact
//! text form for tests and debug output: `0[2M]1[3M]1[3M]2[2M]` lists the
//! visited nodes with their per-node operation runs; the offset of the first
//! aligned base inside the first node is carried separately.
use std::fmt;

use crate::error::{Error, Result};
use crate::graph::NodeId;

use super::operation::{Operation, OperationType};

/// Scores of the affine alignment model. Gap runs are priced per base at the
/// open score; clipped bases default to 0 but the penalty is tunable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlignmentParams {
    pub match_score: i32,
    pub mismatch_score: i32,
    pub gap_open_score: i32,
    pub clipped_base_score: i32,
}

impl Default for AlignmentParams {
    fn default() -> Self {
        AlignmentParams {
            match_score: 5,
            mismatch_score: -4,
            gap_open_score: -8,
            clipped_base_score: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeAlignment {
    pub node_id: NodeId,
    pub operations: Vec<Operation>,
}

impl NodeAlignment {
    pub fn new(node_id: NodeId, operations: Vec<Operation>) -> Self {
        NodeAlignment { node_id, operations }
    }

    pub fn query_length(&self) -> u32 {
        self.operations.iter().map(Operation::query_length).sum()
    }

    pub fn reference_length(&self) -> u32 {
        self.operations.iter().map(Operation::reference_length).sum()
    }

    pub fn num_matched(&self) -> u32 {
        self.operations
            .iter()
            .filter(|op| op.op_type == OperationType::Match)
            .map(|op| op.length)
            .sum()
    }

    pub fn num_clipped(&self) -> u32 {
        self.operations
            .iter()
            .filter(|op| op.op_type == OperationType::SoftClip)
            .map(|op| op.length)
            .sum()
    }

    pub fn score(&self, params: &AlignmentParams) -> i32 {
        let mut score = 0;
        for op in &self.operations {
            let length = op.length as i32;
            score += match op.op_type {
                OperationType::Match => params.match_score * length,
                OperationType::Mismatch => params.mismatch_score * length,
                OperationType::Insertion | OperationType::Deletion => {
                    params.gap_open_score * length
                }
                OperationType::SoftClip => params.clipped_base_score * length,
                OperationType::MissingBases => 0,
            };
        }
        score
    }
}

impl fmt::Display for NodeAlignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[", self.node_id)?;
        for op in &self.operations {
            write!(f, "{op}")?;
        }
        write!(f, "]")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GraphAlignment {
    /// Offset of the first aligned reference base inside the first node.
    pub first_node_offset: u32,
    pub node_alignments: Vec<NodeAlignment>,
}

impl GraphAlignment {
    pub fn new(first_node_offset: u32, node_alignments: Vec<NodeAlignment>) -> Self {
        GraphAlignment { first_node_offset, node_alignments }
    }

    pub fn num_nodes(&self) -> usize {
        self.node_alignments.len()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.node_alignments.iter().map(|aln| aln.node_id)
    }

    pub fn visits_node(&self, node_id: NodeId) -> bool {
        self.node_ids().any(|id| id == node_id)
    }

    /// Number of times `node_id` appears on the path; self-loop traversals
    /// of a repeat node count once each.
    pub fn num_node_visits(&self, node_id: NodeId) -> u32 {
        self.node_ids().filter(|&id| id == node_id).count() as u32
    }

    /// Total query bases consumed, soft-clips included.
    pub fn query_length(&self) -> u32 {
        self.node_alignments.iter().map(NodeAlignment::query_length).sum()
    }

    pub fn reference_length(&self) -> u32 {
        self.node_alignments.iter().map(NodeAlignment::reference_length).sum()
    }

    pub fn num_matched(&self) -> u32 {
        self.node_alignments.iter().map(NodeAlignment::num_matched).sum()
    }

    /// Length of the aligned portion of the query, i.e. the read length
    /// without soft-clipped bases.
    pub fn clipped_query_length(&self) -> u32 {
        let clipped: u32 = self.node_alignments.iter().map(NodeAlignment::num_clipped).sum();
        self.query_length() - clipped
    }

    pub fn score(&self, params: &AlignmentParams) -> i32 {
        self.node_alignments.iter().map(|aln| aln.score(params)).sum()
    }
}

impl fmt::Display for GraphAlignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for node_alignment in &self.node_alignments {
            write!(f, "{node_alignment}")?;
        }
        Ok(())
    }
}

/// Decode an alignment from its text form, e.g.
/// `decode_graph_alignment(4, "0[2M]1[3M]1[3M]2[2M]")`.
pub fn decode_graph_alignment(first_node_offset: u32, encoding: &str) -> Result<GraphAlignment> {
    let malformed = || Error::InputMalformed(format!("'{encoding}' is not a graph alignment"));

    let mut node_alignments = Vec::new();
    let mut rest = encoding;
    while !rest.is_empty() {
        let open = rest.find('[').ok_or_else(malformed)?;
        let close = rest.find(']').ok_or_else(malformed)?;
        if open == 0 || close < open {
            return Err(malformed());
        }
        let node_id: NodeId = rest[..open].parse().map_err(|_| malformed())?;

        let mut operations = Vec::new();
        let mut run_start = open + 1;
        for (index, symbol) in rest[open + 1..close].char_indices() {
            if symbol.is_ascii_alphabetic() {
                let run_end = open + 1 + index + 1;
                operations.push(Operation::decode(&rest[run_start..run_end])?);
                run_start = run_end;
            }
        }
        if operations.is_empty() || run_start != close {
            return Err(malformed());
        }

        node_alignments.push(NodeAlignment::new(node_id, operations));
        rest = &rest[close + 1..];
    }

    if node_alignments.is_empty() {
        return Err(malformed());
    }
    Ok(GraphAlignment::new(first_node_offset, node_alignments))
}
