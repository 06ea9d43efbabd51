//! # K-mer index of graph paths
//!
//! Seeds for the gapped aligner come from an exact k-mer index. Every
//! starting position in every node is extended along graph edges (self-loops
//! included) to enumerate the k-mers of all paths beginning there. Only clean
//! uppercase `ACGT` k-mers are indexed; flank `N`s and masked query bases
//! therefore never seed an alignment.
use std::collections::HashMap;

use crate::graph::{Graph, NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GraphPosition {
    pub node_id: NodeId,
    pub offset: u32,
}

#[derive(Debug)]
pub struct KmerIndex {
    kmer_len: usize,
    positions: HashMap<Vec<u8>, Vec<GraphPosition>>,
}

fn is_clean_kmer(kmer: &[u8]) -> bool {
    kmer.iter().all(|base| matches!(base, b'A' | b'C' | b'G' | b'T'))
}

impl KmerIndex {
    pub fn new(graph: &Graph, kmer_len: usize) -> Self {
        assert!(kmer_len > 0);
        let mut index = KmerIndex { kmer_len, positions: HashMap::new() };

        for node_id in 0..graph.num_nodes() as NodeId {
            for offset in 0..graph.node_len(node_id) {
                let position = GraphPosition { node_id, offset: offset as u32 };
                let mut kmers = Vec::new();
                collect_path_kmers(graph, node_id, offset, kmer_len, Vec::new(), &mut kmers);
                kmers.sort_unstable();
                kmers.dedup();
                for kmer in kmers {
                    if is_clean_kmer(&kmer) {
                        index.positions.entry(kmer).or_default().push(position);
                    }
                }
            }
        }

        index
    }

    pub fn kmer_len(&self) -> usize {
        self.kmer_len
    }

    pub fn contains(&self, kmer: &[u8]) -> bool {
        self.positions.contains_key(kmer)
    }

    pub fn positions_of(&self, kmer: &[u8]) -> Option<&[GraphPosition]> {
        self.positions.get(kmer).map(Vec::as_slice)
    }

    /// Number of query positions whose k-mer occurs somewhere in the graph.
    pub fn num_query_kmer_hits(&self, query: &[u8]) -> usize {
        if query.len() < self.kmer_len {
            return 0;
        }
        query
            .windows(self.kmer_len)
            .filter(|kmer| is_clean_kmer(kmer) && self.contains(kmer))
            .count()
    }
}

fn collect_path_kmers(
    graph: &Graph,
    node_id: NodeId,
    offset: usize,
    remaining: usize,
    mut prefix: Vec<u8>,
    kmers: &mut Vec<Vec<u8>>,
) {
    let node_seq = graph.node_seq(node_id);
    let available = node_seq.len() - offset;

    if available >= remaining {
        prefix.extend_from_slice(&node_seq[offset..offset + remaining]);
        kmers.push(prefix);
        return;
    }

    prefix.extend_from_slice(&node_seq[offset..]);
    for successor in graph.successors(node_id) {
        collect_path_kmers(graph, successor, 0, remaining - available, prefix.clone(), kmers);
    }
}
