//! # Small-variant analysis
use crate::align::{AlignmentParams, GraphAlignment};
use crate::classify::{SmallVariantAlignmentKind, SmallVariantClassifier, BYPASS_NODE};
use crate::error::{Error, Result};
use crate::findings::{CountTable, SmallVariantFindings};
use crate::genotype::{AllelePresenceChecker, SmallVariantGenotyper};
use crate::graph::NodeId;
use crate::locus::{GenotyperParams, VariantSpec, VariantSubtype};
use crate::stats::LocusStats;

pub struct SmallVariantAnalyzer {
    variant_id: String,
    subtype: VariantSubtype,
    nodes: Vec<NodeId>,
    reference_node: Option<NodeId>,
    classifier: SmallVariantClassifier,
    spanning_counts: CountTable,
    upstream_flanking_counts: CountTable,
    downstream_flanking_counts: CountTable,
    num_bypassing_reads: u64,
}

impl SmallVariantAnalyzer {
    pub fn new(variant: &VariantSpec) -> Self {
        SmallVariantAnalyzer {
            variant_id: variant.id.clone(),
            subtype: variant.subtype,
            nodes: variant.nodes.clone(),
            reference_node: variant.reference_node,
            classifier: SmallVariantClassifier::new(variant.nodes.clone()),
            spanning_counts: CountTable::new(),
            upstream_flanking_counts: CountTable::new(),
            downstream_flanking_counts: CountTable::new(),
            num_bypassing_reads: 0,
        }
    }

    pub fn variant_id(&self) -> &str {
        &self.variant_id
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
            let Some(top) = summary.top_alignment() else {
                continue;
            };
            match top.kind {
                SmallVariantAlignmentKind::Spanning if top.node_id == BYPASS_NODE => {
                    self.num_bypassing_reads += 1;
                }
                SmallVariantAlignmentKind::Spanning => {
                    self.spanning_counts.increment(i64::from(top.node_id));
                }
                SmallVariantAlignmentKind::UpstreamFlanking => {
                    self.upstream_flanking_counts.increment(i64::from(top.node_id));
                }
                SmallVariantAlignmentKind::DownstreamFlanking => {
                    self.downstream_flanking_counts.increment(i64::from(top.node_id));
                }
            }
        }
    }

    /// Reads backing a haplotype that runs through `node_id`; the bypass
    /// sentinel selects reads threading past the variant entirely.
    fn count_reads_supporting_node(&self, node_id: NodeId) -> u64 {
        if node_id == BYPASS_NODE {
            return self.num_bypassing_reads;
        }
        let key = i64::from(node_id);
        let spanning = self.spanning_counts.count_of(key);
        let upstream_support = self.upstream_flanking_counts.count_of(key) + spanning;
        let downstream_support = self.downstream_flanking_counts.count_of(key) + spanning;
        (upstream_support + downstream_support) / 2
    }

    /// Reference and alternative haplotype representatives for this variant.
    fn ref_and_alt_nodes(&self) -> Result<(NodeId, NodeId)> {
        let ref_node = self.reference_node.unwrap_or(BYPASS_NODE);
        let alt_node = match self.subtype {
            VariantSubtype::Insertion => self.nodes[0],
            VariantSubtype::Deletion => BYPASS_NODE,
            VariantSubtype::Swap => {
                if ref_node == self.nodes[0] {
                    *self.nodes.last().unwrap()
                } else {
                    self.nodes[0]
                }
            }
            VariantSubtype::Smn => {
                if ref_node != self.nodes[0] {
                    return Err(Error::InputMalformed(format!(
                        "variant {} is not a valid SMN specification",
                        self.variant_id
                    )));
                }
                *self.nodes.last().unwrap()
            }
            _ => {
                return Err(Error::InputMalformed(format!(
                    "variant {} has no small-variant subtype",
                    self.variant_id
                )))
            }
        };
        Ok((ref_node, alt_node))
    }

    pub fn analyze(
        &self,
        stats: &LocusStats,
        params: &GenotyperParams,
        genotype_enabled: bool,
    ) -> Result<SmallVariantFindings> {
        let (ref_node, alt_node) = self.ref_and_alt_nodes()?;
        let num_ref_reads = self.count_reads_supporting_node(ref_node);
        let num_alt_reads = self.count_reads_supporting_node(alt_node);

        let haplotype_depth = stats.haplotype_depth();
        let checker =
            AllelePresenceChecker::new(params.error_rate, params.likelihood_ratio_threshold);
        let ref_allele_status = checker.check(haplotype_depth, num_ref_reads as u32);
        let alt_allele_status = checker.check(haplotype_depth, num_alt_reads as u32);

        let genotype = if genotype_enabled {
            SmallVariantGenotyper::new(haplotype_depth, stats.allele_count, params.error_rate)
                .genotype(num_ref_reads as u32, num_alt_reads as u32)
        } else {
            None
        };

        Ok(SmallVariantFindings {
            num_ref_reads,
            num_alt_reads,
            ref_allele_status,
            alt_allele_status,
            genotype,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::decode_graph_alignment;
    use crate::genome::{AlleleCount, GenomicRegion};
    use crate::genotype::AllelePresence;
    use crate::locus::VariantKind;

    // Swap graph: 0:flank 1:GT 2:AT 3:flank
    fn swap_variant() -> VariantSpec {
        VariantSpec {
            id: "SWAP1".to_string(),
            kind: VariantKind::SmallVariant,
            subtype: VariantSubtype::Swap,
            reference_region: GenomicRegion::new(0, 100, 102),
            nodes: vec![1, 2],
            reference_node: Some(1),
        }
    }

    fn stats() -> LocusStats {
        LocusStats { allele_count: AlleleCount::Two, mean_read_length: 20, depth: 30.0 }
    }

    fn process_spanning(analyzer: &mut SmallVariantAnalyzer, node: u32, count: usize) {
        let params = AlignmentParams::default();
        let encoding = format!("0[8M]{node}[2M]3[8M]");
        for _ in 0..count {
            let alignment = decode_graph_alignment(0, &encoding).unwrap();
            analyzer.process(Some(b"AAAAAAAAGTAAAAAAAA"), &[alignment], None, &[], &params);
        }
    }

    #[test]
    fn heterozygous_swap_is_called() {
        let mut analyzer = SmallVariantAnalyzer::new(&swap_variant());
        process_spanning(&mut analyzer, 1, 14);
        process_spanning(&mut analyzer, 2, 16);

        let findings = analyzer.analyze(&stats(), &GenotyperParams::default(), true).unwrap();
        assert_eq!(14, findings.num_ref_reads);
        assert_eq!(16, findings.num_alt_reads);
        assert_eq!(AllelePresence::Present, findings.ref_allele_status.status);
        assert_eq!(AllelePresence::Present, findings.alt_allele_status.status);
        assert_eq!("0/1", findings.genotype.unwrap().encode());
    }

    #[test]
    fn missing_alt_allele_is_absent() {
        let mut analyzer = SmallVariantAnalyzer::new(&swap_variant());
        process_spanning(&mut analyzer, 1, 29);

        let findings = analyzer.analyze(&stats(), &GenotyperParams::default(), true).unwrap();
        assert_eq!(AllelePresence::Present, findings.ref_allele_status.status);
        assert_eq!(AllelePresence::Absent, findings.alt_allele_status.status);
        assert_eq!("0/0", findings.genotype.unwrap().encode());
    }

    #[test]
    fn low_coverage_suppresses_the_genotype() {
        let mut analyzer = SmallVariantAnalyzer::new(&swap_variant());
        process_spanning(&mut analyzer, 1, 2);
        process_spanning(&mut analyzer, 2, 1);

        let low_stats =
            LocusStats { allele_count: AlleleCount::Two, mean_read_length: 20, depth: 3.0 };
        let findings =
            analyzer.analyze(&low_stats, &GenotyperParams::default(), false).unwrap();
        assert_eq!(2, findings.num_ref_reads);
        assert_eq!(1, findings.num_alt_reads);
        assert!(findings.genotype.is_none());
    }

    #[test]
    fn deletion_uses_bypassing_reads_as_alt_support() {
        let variant = VariantSpec {
            id: "DEL1".to_string(),
            kind: VariantKind::SmallVariant,
            subtype: VariantSubtype::Deletion,
            reference_region: GenomicRegion::new(0, 100, 102),
            nodes: vec![1],
            reference_node: Some(1),
        };
        let mut analyzer = SmallVariantAnalyzer::new(&variant);
        let params = AlignmentParams::default();

        // bypassing read: flank to flank without the deleted segment
        for _ in 0..16 {
            let alignment = decode_graph_alignment(0, "0[8M]2[8M]").unwrap();
            analyzer.process(Some(b"AAAAAAAAAAAAAAAA"), &[alignment], None, &[], &params);
        }
        process_spanning(&mut analyzer, 1, 13);

        let findings = analyzer.analyze(&stats(), &GenotyperParams::default(), true).unwrap();
        assert_eq!(13, findings.num_ref_reads);
        assert_eq!(16, findings.num_alt_reads);
        assert_eq!("0/1", findings.genotype.unwrap().encode());
    }
}
