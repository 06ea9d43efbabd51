//! # STR variant analysis
use crate::align::{AlignmentParams, GraphAlignment};
use crate::classify::{ReadSummaryForStr, StrAlignment, StrAlignmentKind, StrClassifier};
use crate::findings::{CountTable, StrFindings};
use crate::genome::AlleleCount;
use crate::genotype::RepeatGenotyper;
use crate::graph::NodeId;
use crate::locus::{GenotyperParams, LocusSpec, VariantSpec, VariantSubtype};
use crate::purity;
use crate::stats::LocusStats;

pub struct StrAnalyzer {
    variant_id: String,
    subtype: VariantSubtype,
    repeat_node: NodeId,
    motif_len: u32,
    classifier: StrClassifier,
    /// Graph length with this repeat excised; sets the alignment-position
    /// prior of the genotyper.
    adjusted_region_size: u32,
    read_summaries: Vec<ReadSummaryForStr>,
    /// Off-target read pairs where both mates look like pure repeat.
    num_irr_pairs: u64,
}

impl StrAnalyzer {
    pub fn new(spec: &LocusSpec, variant: &VariantSpec) -> Self {
        let repeat_node = variant.nodes[0];
        StrAnalyzer {
            variant_id: variant.id.clone(),
            subtype: variant.subtype,
            repeat_node,
            motif_len: spec.graph.node_len(repeat_node) as u32,
            classifier: StrClassifier::new(&spec.graph, repeat_node),
            adjusted_region_size: spec.adjusted_region_size(repeat_node),
            read_summaries: Vec::new(),
            num_irr_pairs: 0,
        }
    }

    pub fn variant_id(&self) -> &str {
        &self.variant_id
    }

    pub fn repeat_node(&self) -> NodeId {
        self.repeat_node
    }

    pub fn motif(&self) -> &[u8] {
        self.classifier.motif()
    }

    pub fn process(
        &mut self,
        read_sequence: Option<&[u8]>,
        read_alignments: &[GraphAlignment],
        mate_sequence: Option<&[u8]>,
        mate_alignments: &[GraphAlignment],
        params: &AlignmentParams,
    ) {
        for (sequence, alignments) in
            [(read_sequence, read_alignments), (mate_sequence, mate_alignments)]
        {
            let Some(sequence) = sequence else {
                continue;
            };
            let summary = self.classifier.classify_read(sequence, alignments, params);
            if summary.has_alignments() {
                self.read_summaries.push(summary);
            }
        }
    }

    /// Count an off-target pair when both mates consist of motif copies;
    /// such pairs are evidence for alleles longer than the read length.
    pub fn process_offtarget(
        &mut self,
        read_sequence: &[u8],
        mate_sequence: &[u8],
        purity_threshold: f64,
    ) {
        if self.subtype != VariantSubtype::RareRepeat {
            return;
        }
        let motif = self.classifier.motif();
        if purity::is_in_repeat_read(read_sequence, motif, purity_threshold)
            && purity::is_in_repeat_read(mate_sequence, motif, purity_threshold)
        {
            self.num_irr_pairs += 1;
        }
    }

    /// In-repeat summary standing in for one mate of an off-target IRR pair.
    fn irr_summary(&self, read_length: u32) -> ReadSummaryForStr {
        let num_units = read_length / self.motif_len.max(1);
        let mut summary = ReadSummaryForStr::new(read_length);
        summary.add_alignment(StrAlignment {
            num_units,
            kind: StrAlignmentKind::InRepeat,
            score: 5 * read_length as i32,
            clipped_read_length: read_length,
        });
        summary
    }

    pub fn analyze(
        &self,
        stats: &LocusStats,
        params: &GenotyperParams,
        genotype_enabled: bool,
    ) -> StrFindings {
        let mut findings = StrFindings::empty();

        for summary in &self.read_summaries {
            let Some(top) = summary.top_alignment() else {
                continue;
            };
            let table = match top.kind {
                StrAlignmentKind::Spanning => &mut findings.counts_of_spanning_reads,
                StrAlignmentKind::Flanking => &mut findings.counts_of_flanking_reads,
                StrAlignmentKind::InRepeat => &mut findings.counts_of_inrepeat_reads,
            };
            table.increment(i64::from(top.num_units));
        }

        let mut summaries = self.read_summaries.clone();
        if self.num_irr_pairs > 0 && stats.mean_read_length > 0 {
            let units_per_read = stats.mean_read_length / self.motif_len.max(1);
            findings
                .counts_of_inrepeat_reads
                .increment_by(i64::from(units_per_read), 2 * self.num_irr_pairs);
            let irr_summary = self.irr_summary(stats.mean_read_length);
            for _ in 0..2 * self.num_irr_pairs {
                summaries.push(irr_summary.clone());
            }
        }

        if !genotype_enabled || summaries.is_empty() {
            return findings;
        }

        let ploidy = match stats.allele_count {
            AlleleCount::Zero => return findings,
            ploidy => ploidy,
        };

        let units_in_read = stats.mean_read_length / self.motif_len.max(1);
        let max_observed = summaries
            .iter()
            .flat_map(|summary| summary.alignments())
            .map(|alignment| alignment.num_units)
            .max()
            .unwrap_or(0);
        let max_allele_size = units_in_read.max(max_observed).min(params.max_allele_size_cap);

        let genotyper = RepeatGenotyper::new(
            ploidy,
            self.motif_len as i32,
            self.adjusted_region_size as i32,
            stats.mean_read_length as i32,
            max_allele_size as i32,
            params.stutter_log_prob(),
            0.0,
            params.mismap_prob,
            &summaries,
        );
        findings.genotype = genotyper.genotype(0.95);
        findings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::decode_graph_alignment;
    use crate::genome::GenomicRegion;
    use crate::graph::make_str_graph;
    use crate::locus::VariantKind;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn str_spec() -> LocusSpec {
        let graph = Arc::new(make_str_graph("AAAACC", "CCG", "ATTT"));
        let mut node_regions = BTreeMap::new();
        node_regions.insert(0, GenomicRegion::new(0, 94, 100));
        node_regions.insert(1, GenomicRegion::new(0, 100, 103));
        node_regions.insert(2, GenomicRegion::new(0, 115, 119));
        LocusSpec {
            locus_id: "STR1".to_string(),
            graph,
            node_regions,
            reference_region: GenomicRegion::new(0, 100, 115),
            target_regions: vec![GenomicRegion::new(0, 0, 1000)],
            offtarget_regions: Vec::new(),
            stats_regions: vec![
                GenomicRegion::new(0, 0, 100),
                GenomicRegion::new(0, 115, 215),
            ],
            copy_number: crate::genome::CopyNumberBySex::TwoInFemaleTwoInMale,
            params: GenotyperParams::default(),
            variants: vec![VariantSpec {
                id: "STR1".to_string(),
                kind: VariantKind::Repeat,
                subtype: VariantSubtype::CommonRepeat,
                reference_region: GenomicRegion::new(0, 100, 103),
                nodes: vec![1],
                reference_node: Some(1),
            }],
        }
    }

    fn stats() -> LocusStats {
        LocusStats { allele_count: AlleleCount::Two, mean_read_length: 18, depth: 30.0 }
    }

    #[test]
    fn spanning_reads_are_tallied_by_unit_count() {
        let spec = str_spec();
        let mut analyzer = StrAnalyzer::new(&spec, &spec.variants[0]);
        let params = AlignmentParams::default();

        let alignment = decode_graph_alignment(4, "0[2M]1[3M]1[3M]2[2M]").unwrap();
        analyzer.process(Some(b"CCCCGCCGAT"), &[alignment], None, &[], &params);

        let findings = analyzer.analyze(&stats(), &GenotyperParams::default(), false);
        assert_eq!("2:1", findings.counts_of_spanning_reads.to_string());
        assert!(findings.counts_of_flanking_reads.is_empty());
        assert!(findings.genotype.is_none());
    }

    #[test]
    fn offtarget_pairs_count_for_rare_repeats_only(){
        let spec = str_spec();
        let mut analyzer = StrAnalyzer::new(&spec, &spec.variants[0]);
        analyzer.process_offtarget(b"CCGCCGCCGCCGCCGCCG", b"CGGCGGCGGCGGCGGCGG", 0.9);
        let findings = analyzer.analyze(&stats(), &GenotyperParams::default(), false);
        assert!(findings.counts_of_inrepeat_reads.is_empty());

        let mut rare_variant = spec.variants[0].clone();
        rare_variant.subtype = VariantSubtype::RareRepeat;
        let mut analyzer = StrAnalyzer::new(&spec, &rare_variant);
        analyzer.process_offtarget(b"CCGCCGCCGCCGCCGCCG", b"CGGCGGCGGCGGCGGCGG", 0.9);
        let findings = analyzer.analyze(&stats(), &GenotyperParams::default(), false);
        // one pair contributes two in-repeat reads at 18/3 = 6 units
        assert_eq!("6:2", findings.counts_of_inrepeat_reads.to_string());
    }

    #[test]
    fn genotype_is_called_from_spanning_evidence() {
        let spec = str_spec();
        let mut analyzer = StrAnalyzer::new(&spec, &spec.variants[0]);
        let params = AlignmentParams::default();

        for _ in 0..4 {
            let alignment =
                decode_graph_alignment(3, "0[3M]1[3M]1[3M]1[3M]1[3M]1[3M]2[3M]").unwrap();
            analyzer.process(Some(b"ACCCCGCCGCCGCCGCCGATT"), &[alignment], None, &[], &params);
        }

        let findings = analyzer.analyze(&stats(), &GenotyperParams::default(), true);
        let genotype = findings.genotype.expect("genotype should be called");
        assert_eq!("5/5", genotype.encode());
    }
}
