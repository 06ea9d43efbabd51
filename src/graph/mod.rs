//! # Locus sequence graphs
//!
//! A locus is modelled as a directed graph of sequence-labelled nodes. Nodes
//! are stored in an arena (`Vec`) and referenced by dense [`NodeId`]s, which
//! keeps the graph `Send` and cheap to share. Self-loops encode repeats: a
//! repeat node with a bypass edge around it is skippable, one without is
//! crossed by every path between the flanks.
//!
//! Graphs are built from a locus structure string by [`blueprint`] and
//! [`build`].
use std::collections::BTreeSet;

use crate::error::{Error, Result};

pub mod blueprint;
pub mod build;

pub use blueprint::{decode_features, Feature, FeatureType, GraphBlueprint};
pub use build::build_graph;

pub type NodeId = u32;

#[derive(Debug, Clone)]
pub struct Graph {
    node_seqs: Vec<Vec<u8>>,
    successors: Vec<BTreeSet<NodeId>>,
    predecessors: Vec<BTreeSet<NodeId>>,
}

impl Graph {
    pub fn new(node_seqs: Vec<Vec<u8>>) -> Self {
        let num_nodes = node_seqs.len();
        Graph {
            node_seqs,
            successors: vec![BTreeSet::new(); num_nodes],
            predecessors: vec![BTreeSet::new(); num_nodes],
        }
    }

    pub fn num_nodes(&self) -> usize {
        self.node_seqs.len()
    }

    pub fn node_seq(&self, node_id: NodeId) -> &[u8] {
        &self.node_seqs[node_id as usize]
    }

    pub fn node_len(&self, node_id: NodeId) -> usize {
        self.node_seqs[node_id as usize].len()
    }

    pub fn add_edge(&mut self, from: NodeId, to: NodeId) -> Result<()> {
        let num_nodes = self.num_nodes() as u32;
        if from >= num_nodes || to >= num_nodes {
            return Err(Error::InputMalformed(format!(
                "edge ({from}, {to}) references a node outside the graph"
            )));
        }
        self.successors[from as usize].insert(to);
        self.predecessors[to as usize].insert(from);
        Ok(())
    }

    pub fn has_edge(&self, from: NodeId, to: NodeId) -> bool {
        self.successors
            .get(from as usize)
            .map_or(false, |set| set.contains(&to))
    }

    pub fn successors(&self, node_id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.successors[node_id as usize].iter().copied()
    }

    pub fn predecessors(&self, node_id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.predecessors[node_id as usize].iter().copied()
    }

    pub fn has_self_loop(&self, node_id: NodeId) -> bool {
        self.has_edge(node_id, node_id)
    }
}

/// Construct the canonical three-node STR graph: left flank, a skippable
/// repeat with a self-loop, and right flank.
pub fn make_str_graph(left_flank: &str, motif: &str, right_flank: &str) -> Graph {
    let mut graph = Graph::new(vec![
        left_flank.as_bytes().to_vec(),
        motif.as_bytes().to_vec(),
        right_flank.as_bytes().to_vec(),
    ]);
    graph.add_edge(0, 1).unwrap();
    graph.add_edge(1, 1).unwrap();
    graph.add_edge(1, 2).unwrap();
    graph.add_edge(0, 2).unwrap();
    graph
}
