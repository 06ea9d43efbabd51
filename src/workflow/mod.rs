//! # Per-locus workflows
//!
//! A [`LocusWorkflow`] owns everything needed to analyze one locus: the
//! aligner over the locus graph, one analyzer per variant, and the counting
//! model for coverage statistics. The dispatch fabric guarantees that at most
//! one worker drives a given workflow at any instant, so the workflow itself
//! is lock-free mutable state.
use std::sync::Arc;

use log::debug;

use crate::align::{predict_orientation, AlignerConfig, AlignmentParams, GraphAligner,
    GraphAlignment, OrientationPrediction};
use crate::error::Result;
use crate::findings::{LocusFindings, VariantFindings};
use crate::genome::{AlleleCount, Sex};
use crate::locus::{LocusSpec, VariantKind};
use crate::reads::{MappedRead, Read};
use crate::stats::CountingModel;

pub mod small_variant_analyzer;
pub mod str_analyzer;

pub use small_variant_analyzer::SmallVariantAnalyzer;
pub use str_analyzer::StrAnalyzer;

/// Analysis-wide tuning knobs, built once at startup and passed by reference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeuristicParams {
    /// Length of reference flank added around each locus and its regions.
    pub region_extension_length: usize,
    /// Phred cutoff at or below which bases are quality-masked.
    pub quality_cutoff: u8,
    pub aligner: AlignerConfig,
    pub alignment_scores: AlignmentParams,
}

impl Default for HeuristicParams {
    fn default() -> Self {
        HeuristicParams {
            region_extension_length: 1000,
            quality_cutoff: 20,
            aligner: AlignerConfig::default(),
            alignment_scores: AlignmentParams::default(),
        }
    }
}

/// Which kind of locus region a read pair was routed through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    Target,
    Offtarget,
}

/// Which mates of a routed pair this locus should consume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    ReadOnly,
    MateOnly,
    Both,
}

pub struct LocusWorkflow {
    spec: Arc<LocusSpec>,
    aligner: GraphAligner,
    str_analyzers: Vec<StrAnalyzer>,
    small_variant_analyzers: Vec<SmallVariantAnalyzer>,
    counting_model: CountingModel,
    num_pairs_processed: u64,
}

impl LocusWorkflow {
    pub fn new(spec: Arc<LocusSpec>, heuristics: &HeuristicParams) -> Self {
        let aligner =
            GraphAligner::new(spec.graph.clone(), heuristics.aligner, heuristics.alignment_scores);

        let mut str_analyzers = Vec::new();
        let mut small_variant_analyzers = Vec::new();
        for variant in &spec.variants {
            match variant.kind {
                VariantKind::Repeat => str_analyzers.push(StrAnalyzer::new(&spec, variant)),
                VariantKind::SmallVariant => {
                    small_variant_analyzers.push(SmallVariantAnalyzer::new(variant));
                }
            }
        }

        let counting_model = CountingModel::new(spec.stats_regions.clone());
        LocusWorkflow {
            spec,
            aligner,
            str_analyzers,
            small_variant_analyzers,
            counting_model,
            num_pairs_processed: 0,
        }
    }

    pub fn locus_id(&self) -> &str {
        &self.spec.locus_id
    }

    pub fn spec(&self) -> &LocusSpec {
        &self.spec
    }

    pub fn num_pairs_processed(&self) -> u64 {
        self.num_pairs_processed
    }

    /// Feed one routed pair (or half-pair) into the locus. `mate` is absent
    /// when only one mate could be recovered.
    pub fn process(
        &mut self,
        read: MappedRead,
        mate: Option<MappedRead>,
        region_kind: RegionKind,
        input_mode: InputMode,
    ) {
        self.num_pairs_processed += 1;

        if region_kind == RegionKind::Offtarget {
            self.process_offtarget(&read, mate.as_ref());
            return;
        }

        self.counting_model.inspect(&read);
        if let Some(mate) = &mate {
            self.counting_model.inspect(mate);
        }

        let (read, mate) = match input_mode {
            InputMode::Both => (Some(read), mate),
            InputMode::ReadOnly => (Some(read), None),
            InputMode::MateOnly => (mate, None),
        };

        let mut aligned_read = read.map(|r| self.align_read(r.into_read()));
        let mut aligned_mate = mate.map(|m| self.align_read(m.into_read()));
        if !self.pair_is_informative(aligned_read.as_ref(), aligned_mate.as_ref()) {
            return;
        }

        let (read, read_alignments) =
            aligned_read.take().map_or((None, Vec::new()), |(r, a)| (Some(r), a));
        let (mate, mate_alignments) =
            aligned_mate.take().map_or((None, Vec::new()), |(m, a)| (Some(m), a));

        let params = *self.aligner.params();
        for analyzer in &mut self.str_analyzers {
            analyzer.process(
                read.as_ref().map(Read::sequence),
                &read_alignments,
                mate.as_ref().map(Read::sequence),
                &mate_alignments,
                &params,
            );
        }
        for analyzer in &mut self.small_variant_analyzers {
            analyzer.process(
                read.as_ref().map(Read::sequence),
                &read_alignments,
                mate.as_ref().map(Read::sequence),
                &mate_alignments,
                &params,
            );
        }
    }

    fn process_offtarget(&mut self, read: &MappedRead, mate: Option<&MappedRead>) {
        let Some(mate) = mate else {
            return;
        };
        let purity_threshold = self.spec.params.irr_purity_threshold;
        for analyzer in &mut self.str_analyzers {
            analyzer.process_offtarget(read.sequence(), mate.sequence(), purity_threshold);
        }
    }

    /// Orient and align one mate against the locus graph.
    fn align_read(&self, mut read: Read) -> (Read, Vec<GraphAlignment>) {
        match predict_orientation(self.aligner.kmer_index(), read.sequence()) {
            None => (read, Vec::new()),
            Some(OrientationPrediction::ReverseComplement) => {
                read.reverse_complement();
                let alignments = self.aligner.align(read.sequence());
                (read, alignments)
            }
            Some(OrientationPrediction::Forward) => {
                let alignments = self.aligner.align(read.sequence());
                (read, alignments)
            }
        }
    }

    /// Minimum alignment score for a read to count as evidence that the pair
    /// originates from this locus.
    fn min_informative_score(&self, read_length: usize) -> i32 {
        let num_matching_bases = (read_length as f64 / 7.5).ceil() as i32;
        num_matching_bases.max(10) * self.aligner.params().match_score
    }

    fn pair_is_informative(
        &self,
        read: Option<&(Read, Vec<GraphAlignment>)>,
        mate: Option<&(Read, Vec<GraphAlignment>)>,
    ) -> bool {
        let params = self.aligner.params();
        [read, mate].into_iter().flatten().any(|(read, alignments)| {
            let threshold = self.min_informative_score(read.length());
            alignments.iter().any(|alignment| alignment.score(params) >= threshold)
        })
    }

    /// Consume the accumulated evidence and produce the locus findings.
    /// Genotyping is skipped (counts are still reported) when coverage is
    /// below the per-locus minimum or the locus has no expected copies.
    pub fn finalize(&self, sex: Sex) -> Result<LocusFindings> {
        let allele_count = self.spec.copy_number.allele_count(sex);
        let stats = self.counting_model.stats(allele_count);
        debug!(
            "Locus {} processed {} read pairs (depth {:.2})",
            self.locus_id(),
            self.num_pairs_processed,
            stats.depth
        );

        let genotype_enabled = stats.depth >= self.spec.params.min_locus_coverage
            && allele_count != AlleleCount::Zero;

        let mut findings = LocusFindings { stats, findings: Default::default() };
        for analyzer in &self.str_analyzers {
            let variant_findings =
                analyzer.analyze(&stats, &self.spec.params, genotype_enabled);
            findings
                .findings
                .insert(analyzer.variant_id().to_string(), VariantFindings::Str(variant_findings));
        }
        for analyzer in &self.small_variant_analyzers {
            let variant_findings =
                analyzer.analyze(&stats, &self.spec.params, genotype_enabled)?;
            findings.findings.insert(
                analyzer.variant_id().to_string(),
                VariantFindings::SmallVariant(variant_findings),
            );
        }
        Ok(findings)
    }
}
