//! # Small-variant genotyping
//!
//! Allele presence is decided by a Poisson coverage model: under "present"
//! the supporting reads arrive at the per-haplotype depth, under "absent"
//! only at the sequencing-error rate. The log-likelihood ratio of the two is
//! thresholded to call the allele present, absent, or uncertain. Genotypes
//! follow from the presence statuses and the locus ploidy.
use std::fmt;

use statrs::distribution::{Discrete, Poisson};

use crate::genome::AlleleCount;

/// Lambda floor keeping the Poisson model defined at zero expected coverage.
const MIN_POISSON_RATE: f64 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllelePresence {
    Present,
    Absent,
    Uncertain,
}

impl fmt::Display for AllelePresence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllelePresence::Present => write!(f, "Present"),
            AllelePresence::Absent => write!(f, "Absent"),
            AllelePresence::Uncertain => write!(f, "Uncertain"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PresenceStatus {
    pub status: AllelePresence,
    pub log_likelihood_ratio: f64,
}

fn ln_poisson_pmf(rate: f64, count: u32) -> f64 {
    let distribution = Poisson::new(rate.max(MIN_POISSON_RATE)).expect("rate is positive");
    distribution.ln_pmf(u64::from(count))
}

/// Decides whether an allele is carried by the sample given the number of
/// reads supporting it.
#[derive(Debug, Clone, Copy)]
pub struct AllelePresenceChecker {
    error_rate: f64,
    ln_llr_threshold: f64,
}

impl AllelePresenceChecker {
    pub fn new(error_rate: f64, likelihood_ratio_threshold: f64) -> Self {
        assert!(error_rate > 0.0 && error_rate < 1.0);
        assert!(likelihood_ratio_threshold > 1.0);
        AllelePresenceChecker { error_rate, ln_llr_threshold: likelihood_ratio_threshold.ln() }
    }

    pub fn check(&self, haplotype_depth: f64, support_count: u32) -> PresenceStatus {
        let ln_l_present = ln_poisson_pmf(haplotype_depth, support_count);
        let ln_l_absent = ln_poisson_pmf(haplotype_depth * self.error_rate, support_count);
        let log_likelihood_ratio = ln_l_present - ln_l_absent;

        let status = if log_likelihood_ratio > self.ln_llr_threshold {
            AllelePresence::Present
        } else if -log_likelihood_ratio > self.ln_llr_threshold {
            AllelePresence::Absent
        } else {
            AllelePresence::Uncertain
        };
        PresenceStatus { status, log_likelihood_ratio }
    }
}

/// A genotype over the reference and alternative allele of one small
/// variant, encoded as the number of haplotypes carrying the alternative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SmallVariantGenotype {
    num_alt_alleles: u32,
    ploidy: AlleleCount,
}

impl SmallVariantGenotype {
    pub fn new(num_alt_alleles: u32, ploidy: AlleleCount) -> Self {
        assert!(num_alt_alleles <= ploidy as u32);
        SmallVariantGenotype { num_alt_alleles, ploidy }
    }

    pub fn num_alt_alleles(&self) -> u32 {
        self.num_alt_alleles
    }

    pub fn num_ref_alleles(&self) -> u32 {
        self.ploidy as u32 - self.num_alt_alleles
    }

    /// `0`, `1`, `0/0`, `0/1`, or `1/1`.
    pub fn encode(&self) -> String {
        let alleles: Vec<String> = (0..self.ploidy as u32)
            .map(|index| if index < self.num_ref_alleles() { "0" } else { "1" })
            .map(str::to_string)
            .collect();
        alleles.join("/")
    }
}

impl fmt::Display for SmallVariantGenotype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode())
    }
}

pub struct SmallVariantGenotyper {
    haplotype_depth: f64,
    ploidy: AlleleCount,
    error_rate: f64,
}

impl SmallVariantGenotyper {
    pub fn new(haplotype_depth: f64, ploidy: AlleleCount, error_rate: f64) -> Self {
        SmallVariantGenotyper { haplotype_depth, ploidy, error_rate }
    }

    /// Most likely genotype given ref- and alt-supporting read counts; `None`
    /// for nullosomic loci or absent coverage.
    pub fn genotype(&self, ref_support: u32, alt_support: u32) -> Option<SmallVariantGenotype> {
        let num_haplotypes = self.ploidy as u32;
        if num_haplotypes == 0 || self.haplotype_depth <= 0.0 {
            return None;
        }

        let expected_rate = |num_carrying: u32| {
            if num_carrying == 0 {
                self.haplotype_depth * self.error_rate
            } else {
                self.haplotype_depth * f64::from(num_carrying)
            }
        };

        (0..=num_haplotypes)
            .map(|num_alt| {
                let ln_l = ln_poisson_pmf(expected_rate(num_haplotypes - num_alt), ref_support)
                    + ln_poisson_pmf(expected_rate(num_alt), alt_support);
                (num_alt, ln_l)
            })
            .max_by(|a, b| a.1.partial_cmp(&b.1).expect("likelihoods must be finite"))
            .map(|(num_alt, _)| SmallVariantGenotype::new(num_alt, self.ploidy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_supported_allele_is_present() {
        let checker = AllelePresenceChecker::new(0.02, 10_000.0);
        let status = checker.check(15.0, 14);
        assert_eq!(AllelePresence::Present, status.status);
        assert!(status.log_likelihood_ratio > 0.0);
    }

    #[test]
    fn unsupported_allele_is_absent() {
        let checker = AllelePresenceChecker::new(0.02, 10_000.0);
        let status = checker.check(15.0, 0);
        assert_eq!(AllelePresence::Absent, status.status);
        assert!(status.log_likelihood_ratio < 0.0);
    }

    #[test]
    fn weak_support_is_uncertain() {
        let checker = AllelePresenceChecker::new(0.02, 10_000.0);
        let status = checker.check(15.0, 3);
        assert_eq!(AllelePresence::Uncertain, status.status);
    }

    #[test]
    fn heterozygous_genotype_is_recovered() {
        let genotyper = SmallVariantGenotyper::new(15.0, AlleleCount::Two, 0.02);
        let genotype = genotyper.genotype(14, 16).unwrap();
        assert_eq!("0/1", genotype.encode());
    }

    #[test]
    fn homozygous_genotypes_are_recovered() {
        let genotyper = SmallVariantGenotyper::new(15.0, AlleleCount::Two, 0.02);
        assert_eq!("0/0", genotyper.genotype(29, 0).unwrap().encode());
        assert_eq!("1/1", genotyper.genotype(0, 31).unwrap().encode());
    }

    #[test]
    fn haploid_genotype_is_single_allele() {
        let genotyper = SmallVariantGenotyper::new(15.0, AlleleCount::One, 0.02);
        assert_eq!("1", genotyper.genotype(0, 14).unwrap().encode());
        assert_eq!("0", genotyper.genotype(13, 1).unwrap().encode());
    }

    #[test]
    fn nullosomic_locus_has_no_genotype() {
        let genotyper = SmallVariantGenotyper::new(15.0, AlleleCount::Zero, 0.02);
        assert!(genotyper.genotype(3, 3).is_none());
    }
}
