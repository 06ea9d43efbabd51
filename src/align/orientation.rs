//! # Read orientation prediction
//!
//! Reads arrive in reference orientation, which may or may not be the
//! orientation in which they overlap the locus graph. Before running the
//! aligner, the orientation with seed support is chosen; reads seeding in
//! neither orientation are dropped for the locus.
use bio::alphabets::dna;

use super::kmer_index::KmerIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrientationPrediction {
    Forward,
    ReverseComplement,
}

/// Predict which orientation of `query` aligns to the indexed graph. Ties go
/// to the forward orientation; `None` means no seed in either orientation.
pub fn predict_orientation(index: &KmerIndex, query: &[u8]) -> Option<OrientationPrediction> {
    let forward_hits = index.num_query_kmer_hits(query);
    let reverse_hits = index.num_query_kmer_hits(&dna::revcomp(query));

    if forward_hits == 0 && reverse_hits == 0 {
        None
    } else if forward_hits >= reverse_hits {
        Some(OrientationPrediction::Forward)
    } else {
        Some(OrientationPrediction::ReverseComplement)
    }
}
