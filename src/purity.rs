//! # Repeat purity scoring
//!
//! Weighted agreement between a read and a repeat motif, used to vet
//! in-repeat classifications and to detect off-target in-repeat-read pairs.
//! High-quality bases weigh 1.0, quality-masked (lowercase) bases weigh 0.5;
//! mismatches subtract their weight. The score is maximised over all motif
//! rotations so that reads starting mid-unit are not penalised.
use bio::alphabets::dna;

fn rotations(motif: &[u8]) -> Vec<Vec<u8>> {
    (0..motif.len())
        .map(|shift| {
            let mut rotation = motif[shift..].to_vec();
            rotation.extend_from_slice(&motif[..shift]);
            rotation
        })
        .collect()
}

fn score_against_rotation(sequence: &[u8], rotation: &[u8]) -> f64 {
    let mut score = 0.0;
    for (index, &base) in sequence.iter().enumerate() {
        let weight = if base.is_ascii_lowercase() { 0.5 } else { 1.0 };
        let matches = base.to_ascii_uppercase() == rotation[index % rotation.len()];
        score += if matches { weight } else { -weight };
    }
    score
}

/// Weighted purity of `sequence` with respect to `motif`, in `[-1, 1]`.
pub fn weighted_purity(sequence: &[u8], motif: &[u8]) -> f64 {
    assert!(!motif.is_empty());
    if sequence.is_empty() {
        return 0.0;
    }
    let best = rotations(motif)
        .iter()
        .map(|rotation| score_against_rotation(sequence, rotation))
        .fold(f64::NEG_INFINITY, f64::max);
    best / sequence.len() as f64
}

/// Whether a read looks like it consists entirely of motif copies on either
/// strand.
pub fn is_in_repeat_read(sequence: &[u8], motif: &[u8], purity_threshold: f64) -> bool {
    if weighted_purity(sequence, motif) >= purity_threshold {
        return true;
    }
    weighted_purity(&dna::revcomp(sequence), motif) >= purity_threshold
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn perfect_repeat_has_purity_one() {
        assert_relative_eq!(1.0, weighted_purity(b"CCGCCGCCG", b"CCG"));
    }

    #[test]
    fn rotated_repeat_has_purity_one() {
        assert_relative_eq!(1.0, weighted_purity(b"GCCGCCGCC", b"CCG"));
    }

    #[test]
    fn mismatches_lower_the_purity() {
        // one mismatch in nine bases: (8 - 1) / 9
        assert_relative_eq!(7.0 / 9.0, weighted_purity(b"CCGCCTCCG", b"CCG"));
    }

    #[test]
    fn masked_bases_carry_half_weight() {
        // 6 clean matches + 3 masked matches: (6 + 1.5) / 9
        assert_relative_eq!(7.5 / 9.0, weighted_purity(b"CCGccgCCG", b"CCG"));
    }

    #[test]
    fn reverse_strand_repeats_are_recognized() {
        assert!(is_in_repeat_read(b"CGGCGGCGGCGG", b"CCG", 0.9));
        assert!(!is_in_repeat_read(b"ATATATATATAT", b"CCG", 0.9));
    }
}
