//! # Probabilistic STR length genotyping
//!
//! Every read is scored against every candidate allele size by combining its
//! retained alignments: the alignment score stands in for
//! `ln P(read | alignment, allele)`, the number of possible start positions
//! gives the alignment prior, stutter transitions connect an alignment's
//! primary allele to its neighbours, and in-repeat alignments gain start
//! positions on longer alleles. A mismap mixture absorbs reads that do not
//! belong to the locus at all. Genotype posteriors are then enumerated over
//! all haploid or diploid combinations up to the maximum allele size.
use ndarray::prelude::*;

use crate::classify::ReadSummaryForStr;
use crate::genome::AlleleCount;

use super::{log_sum_exp, GenotypeScoreSet, RepeatGenotype};

const LN_ONE_HALF: f64 = -std::f64::consts::LN_2;

pub struct RepeatGenotyper<'a> {
    ploidy: AlleleCount,
    repeat_unit_len: i32,
    /// Expected length of the region covered by the graph with the STR of
    /// interest excised.
    adjusted_region_size: i32,
    expected_read_length: i32,
    max_allele_size: i32,
    /// Normalised log-probability of a single repeat-unit stutter error;
    /// must be negative.
    stutter_log_prob: f64,
    /// Unnormalised log-probability per base of a mismapped read. Should
    /// match the per-clipped-base score of the alignment model.
    random_base_log_prob: f64,
    mismap_ln_prior: f64,
    correct_map_ln_prior: f64,
    read_summaries: &'a [ReadSummaryForStr],
}

impl<'a> RepeatGenotyper<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ploidy: AlleleCount,
        repeat_unit_len: i32,
        adjusted_region_size: i32,
        expected_read_length: i32,
        max_allele_size: i32,
        stutter_log_prob: f64,
        random_base_log_prob: f64,
        mismap_prob: f64,
        read_summaries: &'a [ReadSummaryForStr],
    ) -> Self {
        assert!(stutter_log_prob < 0.0, "stutter penalty must be a log-probability");
        assert!(repeat_unit_len > 0);
        assert!(max_allele_size >= 0);
        RepeatGenotyper {
            ploidy,
            repeat_unit_len,
            adjusted_region_size,
            expected_read_length,
            max_allele_size,
            stutter_log_prob,
            random_base_log_prob,
            mismap_ln_prior: mismap_prob.ln(),
            correct_map_ln_prior: (1.0 - mismap_prob).ln(),
            read_summaries,
        }
    }

    /// The MAP genotype with credible intervals at the given mass, or `None`
    /// when there is no read evidence to genotype from.
    pub fn genotype(&self, credible_interval_size: f64) -> Option<RepeatGenotype> {
        assert!(credible_interval_size > 0.0 && credible_interval_size < 1.0);
        if self.read_summaries.is_empty() {
            return None;
        }

        let read_allele_scores = self.score_reads_against_alleles();
        let mut genotype_scores = self.score_genotypes(&read_allele_scores);
        genotype_scores.construct_credible_interval(credible_interval_size);
        genotype_scores.best_genotype()
    }

    /// Per-read, per-allele log-likelihoods; rows are reads and columns are
    /// allele sizes `0..=max_allele_size`.
    fn score_reads_against_alleles(&self) -> Array2<f64> {
        let num_alleles = (self.max_allele_size + 1) as usize;
        let mut scores =
            Array2::from_elem((self.read_summaries.len(), num_alleles), f64::NEG_INFINITY);

        for (read_index, read) in self.read_summaries.iter().enumerate() {
            let mut allele_scores = scores.row_mut(read_index);
            for alignment in read.alignments() {
                let primary_allele = alignment.num_units as i32;
                if primary_allele > self.max_allele_size {
                    continue;
                }

                // ln P(read | alignment, allele) for the stutter-free allele.
                let read_ln_l_given_primary = f64::from(alignment.score);

                // ln P(alignment | allele): one start position out of all
                // positions that produce an overlapping read.
                let region_length =
                    self.adjusted_region_size + primary_allele * self.repeat_unit_len;
                let num_positions = alignment.clipped_read_length as i32 + region_length - 1;
                let alignment_ln_prob = -f64::from(num_positions.max(1)).ln();

                let joint = read_ln_l_given_primary + alignment_ln_prob;
                let slot = &mut allele_scores[primary_allele as usize];
                *slot = log_sum_exp(*slot, joint);

                // Walk out to the remaining alleles, accumulating stutter
                // penalties and adjusting the number of start positions.
                let mut read_ln_l_given_stutter = read_ln_l_given_primary;
                let mut num_short_positions = num_positions;
                let mut num_long_positions = num_positions;
                // The primary alignment is the shortest one consistent with
                // the read, so only longer alleles gain actual positions.
                let mut num_actual_long_positions = 1i32;

                let mut short_allele = primary_allele - 1;
                let mut long_allele = primary_allele + 1;
                while short_allele >= 0 || long_allele <= self.max_allele_size {
                    read_ln_l_given_stutter += self.stutter_log_prob;

                    if short_allele >= 0 {
                        num_short_positions -= self.repeat_unit_len;
                        let alignment_ln_prob = -f64::from(num_short_positions.max(1)).ln();
                        let slot = &mut allele_scores[short_allele as usize];
                        *slot = log_sum_exp(*slot, read_ln_l_given_stutter + alignment_ln_prob);
                    }

                    if long_allele <= self.max_allele_size {
                        // Non-spanning alignments are consistent with longer
                        // alleles without invoking stutter.
                        let read_ln_l = if alignment.is_spanning() {
                            read_ln_l_given_stutter
                        } else {
                            read_ln_l_given_primary
                        };
                        num_long_positions += self.repeat_unit_len;
                        let mut alignment_ln_prob = -f64::from(num_long_positions.max(1)).ln();
                        if alignment.is_in_repeat() {
                            num_actual_long_positions += 1;
                            alignment_ln_prob += f64::from(num_actual_long_positions).ln();
                        }
                        let slot = &mut allele_scores[long_allele as usize];
                        *slot = log_sum_exp(*slot, read_ln_l + alignment_ln_prob);
                    }

                    short_allele -= 1;
                    long_allele += 1;
                }
            }
        }

        scores
    }

    /// Probability of sampling an `allele_one` read from a diploid
    /// `(allele_one, allele_two)` mixture: longer alleles intercept more
    /// fragments.
    fn allele_bias(&self, allele_one: f64, allele_two: f64) -> f64 {
        let unit_len = f64::from(self.repeat_unit_len);
        let read_length = f64::from(self.expected_read_length);
        let one_opportunities = allele_one * unit_len + read_length - 1.0;
        let two_opportunities = allele_two * unit_len + read_length - 1.0;
        one_opportunities / (one_opportunities + two_opportunities)
    }

    fn ln_l_given_mismap(&self, read: &ReadSummaryForStr) -> f64 {
        f64::from(read.read_length()) * self.random_base_log_prob
    }

    fn score_genotypes(&self, read_allele_scores: &Array2<f64>) -> GenotypeScoreSet {
        let mut ln_posteriors = GenotypeScoreSet::default();
        let unit_len = self.repeat_unit_len as u32;

        match self.ploidy {
            AlleleCount::Zero => {}
            AlleleCount::One => {
                for allele in 0..=self.max_allele_size {
                    // Uniform prior over haploid genotypes.
                    let ln_prior = 0.0;
                    let mut ln_l = 0.0;
                    for (read_index, read) in self.read_summaries.iter().enumerate() {
                        ln_l += log_sum_exp(
                            self.ln_l_given_mismap(read) + self.mismap_ln_prior,
                            read_allele_scores[[read_index, allele as usize]]
                                + self.correct_map_ln_prior,
                        );
                    }
                    ln_posteriors.add(RepeatGenotype::new(unit_len, vec![allele as u32]), ln_prior + ln_l);
                }
            }
            AlleleCount::Two => {
                for allele_one in 0..=self.max_allele_size {
                    for allele_two in allele_one..=self.max_allele_size {
                        // Homozygotes are half as likely a priori; the prior
                        // is uniform in every other respect.
                        let ln_prior = if allele_one == allele_two { LN_ONE_HALF } else { 0.0 };
                        let allele_one_sample_prob =
                            self.allele_bias(f64::from(allele_one), f64::from(allele_two));
                        let mut ln_l = 0.0;
                        for (read_index, read) in self.read_summaries.iter().enumerate() {
                            let ln_l_given_correct_map = log_sum_exp(
                                read_allele_scores[[read_index, allele_one as usize]]
                                    + allele_one_sample_prob.ln(),
                                read_allele_scores[[read_index, allele_two as usize]]
                                    + (1.0 - allele_one_sample_prob).ln(),
                            );
                            ln_l += log_sum_exp(
                                self.ln_l_given_mismap(read) + self.mismap_ln_prior,
                                ln_l_given_correct_map + self.correct_map_ln_prior,
                            );
                        }
                        ln_posteriors.add(
                            RepeatGenotype::new(unit_len, vec![allele_one as u32, allele_two as u32]),
                            ln_prior + ln_l,
                        );
                    }
                }
            }
        }

        ln_posteriors
    }
}
