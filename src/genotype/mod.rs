//! # Genotyping
//!
//! Probability conventions: all arithmetic stays in natural-log space.
//! Quantities named `ln_l` are log-likelihoods of observed data, `ln_prior`
//! values are data-independent, and `ln_posterior` values condition on data.
//! Nothing is exponentiated before normalisation; sums of linear-domain
//! probabilities go through the `log1p`-based [`log_sum_exp`].
use std::fmt;

pub mod repeat;
pub mod small;

pub use repeat::RepeatGenotyper;
pub use small::{
    AllelePresence, AllelePresenceChecker, PresenceStatus, SmallVariantGenotype,
    SmallVariantGenotyper,
};

/// `ln(exp(a) + exp(b))` computed without leaving log space.
pub fn log_sum_exp(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY {
        return b;
    }
    if b == f64::NEG_INFINITY {
        return a;
    }
    let (hi, lo) = if a >= b { (a, b) } else { (b, a) };
    hi + (lo - hi).exp().ln_1p()
}

/// An STR length call: one allele for haploid loci, two for diploid, with
/// optional per-allele credible intervals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepeatGenotype {
    unit_len: u32,
    allele_sizes: Vec<u32>,
    short_ci: Option<(u32, u32)>,
    long_ci: Option<(u32, u32)>,
}

impl RepeatGenotype {
    pub fn new(unit_len: u32, mut allele_sizes: Vec<u32>) -> Self {
        assert!(
            allele_sizes.len() == 1 || allele_sizes.len() == 2,
            "a genotype must have one or two alleles"
        );
        allele_sizes.sort_unstable();
        RepeatGenotype { unit_len, allele_sizes, short_ci: None, long_ci: None }
    }

    pub fn unit_len(&self) -> u32 {
        self.unit_len
    }

    pub fn num_alleles(&self) -> usize {
        self.allele_sizes.len()
    }

    pub fn is_diploid(&self) -> bool {
        self.allele_sizes.len() == 2
    }

    pub fn allele_sizes(&self) -> &[u32] {
        &self.allele_sizes
    }

    pub fn short_allele_size_in_units(&self) -> u32 {
        self.allele_sizes[0]
    }

    pub fn long_allele_size_in_units(&self) -> u32 {
        *self.allele_sizes.last().unwrap()
    }

    pub fn set_short_allele_ci(&mut self, lower: u32, upper: u32) {
        assert!(lower <= upper);
        self.short_ci = Some((lower, upper));
    }

    pub fn set_long_allele_ci(&mut self, lower: u32, upper: u32) {
        assert!(lower <= upper);
        self.long_ci = Some((lower, upper));
    }

    pub fn short_allele_ci(&self) -> Option<(u32, u32)> {
        self.short_ci
    }

    pub fn long_allele_ci(&self) -> Option<(u32, u32)> {
        self.long_ci
    }

    /// `s` for haploid calls, `s/l` for diploid ones.
    pub fn encode(&self) -> String {
        self.allele_sizes
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Credible intervals in the `lo-hi/lo-hi` form mirroring [`encode`].
    pub fn encode_ci(&self) -> String {
        let encode_one = |ci: Option<(u32, u32)>, allele: u32| match ci {
            Some((lower, upper)) => format!("{lower}-{upper}"),
            None => format!("{allele}-{allele}"),
        };
        let mut encoding = encode_one(self.short_ci, self.short_allele_size_in_units());
        if self.is_diploid() {
            encoding.push('/');
            encoding.push_str(&encode_one(self.long_ci, self.long_allele_size_in_units()));
        }
        encoding
    }
}

impl fmt::Display for RepeatGenotype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode())
    }
}

/// Scored genotypes accumulated during enumeration. Scores arrive in
/// arbitrary order, are sorted once, normalised once, and then queried.
#[derive(Debug, Default)]
pub struct GenotypeScoreSet {
    scored: Vec<(RepeatGenotype, f64)>,
    is_sorted: bool,
    is_normalized: bool,
}

impl GenotypeScoreSet {
    pub fn add(&mut self, genotype: RepeatGenotype, score: f64) {
        self.is_sorted = false;
        self.is_normalized = false;
        self.scored.push((genotype, score));
    }

    pub fn is_empty(&self) -> bool {
        self.scored.is_empty()
    }

    fn sort(&mut self) {
        if !self.is_sorted {
            self.scored
                .sort_by(|a, b| b.1.partial_cmp(&a.1).expect("genotype scores must be finite"));
            self.is_sorted = true;
        }
    }

    /// Turn scores into normalised log-posteriors.
    pub fn normalize(&mut self) {
        if self.scored.is_empty() || self.is_normalized {
            return;
        }
        self.sort();

        let ln_normalizer = self
            .scored
            .iter()
            .map(|(_, score)| *score)
            .reduce(log_sum_exp)
            .unwrap();
        for (_, score) in &mut self.scored {
            *score -= ln_normalizer;
        }
        self.is_normalized = true;
    }

    /// Attach credible intervals to the best genotype: the smallest set of
    /// top-ranked genotypes absorbing `credible_interval_size` posterior mass
    /// determines the per-allele bounds.
    pub fn construct_credible_interval(&mut self, credible_interval_size: f64) {
        if self.scored.is_empty() {
            return;
        }
        self.normalize();

        let best = &self.scored[0].0;
        let mut short_min = best.short_allele_size_in_units();
        let mut short_max = short_min;
        let mut long_min = best.long_allele_size_in_units();
        let mut long_max = long_min;

        let mut cumulative_prob = 0.0;
        for (genotype, ln_posterior) in &self.scored {
            let short_allele = genotype.short_allele_size_in_units();
            let long_allele = genotype.long_allele_size_in_units();
            short_min = short_min.min(short_allele);
            short_max = short_max.max(short_allele);
            long_min = long_min.min(long_allele);
            long_max = long_max.max(long_allele);

            cumulative_prob += ln_posterior.exp();
            if cumulative_prob >= credible_interval_size {
                break;
            }
        }

        let best = &mut self.scored[0].0;
        best.set_short_allele_ci(short_min, short_max);
        best.set_long_allele_ci(long_min, long_max);
    }

    pub fn best_genotype(&mut self) -> Option<RepeatGenotype> {
        self.sort();
        self.scored.first().map(|(genotype, _)| genotype.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn log_sum_exp_matches_linear_domain() {
        let a: f64 = 0.3;
        let b: f64 = 0.4;
        assert_relative_eq!((a + b).ln(), log_sum_exp(a.ln(), b.ln()), epsilon = 1e-12);
        assert_relative_eq!(0.5, log_sum_exp(0.5, f64::NEG_INFINITY));
    }

    #[test]
    fn log_sum_exp_survives_extreme_magnitudes() {
        let result = log_sum_exp(-1000.0, -1000.0);
        assert_relative_eq!(-1000.0 + 2.0f64.ln(), result, epsilon = 1e-12);
        assert_relative_eq!(0.0, log_sum_exp(0.0, -800.0), epsilon = 1e-12);
    }

    #[test]
    fn genotypes_keep_alleles_ordered() {
        let genotype = RepeatGenotype::new(3, vec![7, 2]);
        assert_eq!(2, genotype.short_allele_size_in_units());
        assert_eq!(7, genotype.long_allele_size_in_units());
        assert_eq!("2/7", genotype.encode());
    }

    #[test]
    fn haploid_genotypes_encode_single_allele() {
        let genotype = RepeatGenotype::new(3, vec![4]);
        assert_eq!("4", genotype.encode());
        assert_eq!(4, genotype.long_allele_size_in_units());
        assert_eq!("4-4", genotype.encode_ci());
    }

    #[test]
    fn score_set_normalizes_to_a_posterior() {
        let mut scores = GenotypeScoreSet::default();
        scores.add(RepeatGenotype::new(1, vec![1]), -1.0);
        scores.add(RepeatGenotype::new(1, vec![2]), -2.0);
        scores.normalize();

        let best = scores.best_genotype().unwrap();
        assert_eq!(1, best.short_allele_size_in_units());
    }

    #[test]
    fn credible_interval_contains_the_map_genotype() {
        let mut scores = GenotypeScoreSet::default();
        scores.add(RepeatGenotype::new(1, vec![2, 2]), -0.1);
        scores.add(RepeatGenotype::new(1, vec![1, 2]), -3.0);
        scores.add(RepeatGenotype::new(1, vec![2, 4]), -4.0);
        scores.construct_credible_interval(0.95);

        let best = scores.best_genotype().unwrap();
        let (short_lo, short_hi) = best.short_allele_ci().unwrap();
        let (long_lo, long_hi) = best.long_allele_ci().unwrap();
        assert!(short_lo <= 2 && 2 <= short_hi);
        assert!(long_lo <= 2 && 2 <= long_hi);
    }
}
