//! End-to-end tests: loci are decoded from catalog-style descriptions
//! against an in-memory reference, synthetic reads are pushed through the
//! full workflow (orientation, graph alignment, classification, genotyping),
//! and the materialised findings are checked.
use std::sync::Arc;

use graphstr::align::AlignerConfig;
use graphstr::findings::VariantFindings;
use graphstr::genome::{GenomicRegion, Sex};
use graphstr::locus::{decode_locus, LocusDescription, LocusSpec, VariantTypeFromUser};
use graphstr::reads::{MappedRead, MateNumber, Read, ReadId};
use graphstr::reference::{InMemoryReference, ReferenceSequence};
use graphstr::workflow::{HeuristicParams, InputMode, LocusWorkflow, RegionKind};

const LEFT_FLANK: &str = "TGACCTGCAATGCGGCTAGACGATCATTCGAGCTCGTTAAGCTTACCAGC";
const RIGHT_FLANK: &str = "GATCCGTAATCGGACTGCATTGCAATCCGGAAGCTTGACCTAGCATGCAT";

fn heuristics() -> HeuristicParams {
    HeuristicParams {
        region_extension_length: 50,
        aligner: AlignerConfig { kmer_len: 8, padding_len: 10, seed_affix_trim: 6 },
        ..HeuristicParams::default()
    }
}

fn build_workflow(
    reference: &InMemoryReference,
    structure: &str,
    variant_type: VariantTypeFromUser,
    region: GenomicRegion,
) -> LocusWorkflow {
    let description = LocusDescription {
        locus_id: "LOCUS1".to_string(),
        structure: structure.to_string(),
        variant_regions: vec![region],
        variant_types: vec![variant_type],
        variant_ids: vec!["LOCUS1".to_string()],
        locus_region: region,
        target_regions: Vec::new(),
        offtarget_regions: Vec::new(),
        error_rate: None,
        likelihood_ratio_threshold: None,
        min_locus_coverage: None,
    };
    let spec: LocusSpec =
        decode_locus(&description, reference.contig_info(), reference, &heuristics()).unwrap();
    LocusWorkflow::new(Arc::new(spec), &heuristics())
}

fn mapped_read(tag: &str, sequence: String, pos: i64) -> MappedRead {
    let id = ReadId::new(tag.to_string(), MateNumber::First);
    let read = Read::new(id, sequence.into_bytes(), false);
    MappedRead::new(read, 0, pos, 60, -1, -1, false, true, false)
}

/// Reads lying wholly inside the flank windows; they set the locus coverage
/// without contributing repeat evidence.
fn push_coverage_reads(workflow: &mut LocusWorkflow, count: usize) {
    for index in 0..count {
        let offset = (index * 3) % 20;
        let sequence = LEFT_FLANK[offset..offset + 30].to_string();
        let read = mapped_read(&format!("cov{index}"), sequence, offset as i64);
        workflow.process(read, None, RegionKind::Target, InputMode::ReadOnly);
    }
}

fn spanning_read(tag: &str, motif: &str, num_units: usize) -> MappedRead {
    let sequence =
        format!("{}{}{}", &LEFT_FLANK[44..], motif.repeat(num_units), &RIGHT_FLANK[..6]);
    mapped_read(tag, sequence, 44)
}

fn str_reference(num_reference_units: usize) -> InMemoryReference {
    let contig = format!("{LEFT_FLANK}{}{RIGHT_FLANK}", "CCG".repeat(num_reference_units));
    InMemoryReference::new(vec![("chr1".to_string(), contig)])
}

#[test]
fn homozygous_expansion_is_genotyped_from_spanning_reads() {
    let reference = str_reference(2);
    let mut workflow = build_workflow(
        &reference,
        "(CCG)*",
        VariantTypeFromUser::Repeat,
        GenomicRegion::new(0, 50, 56),
    );

    push_coverage_reads(&mut workflow, 20);
    for index in 0..4 {
        let read = spanning_read(&format!("span{index}"), "CCG", 5);
        workflow.process(read, None, RegionKind::Target, InputMode::ReadOnly);
    }

    let findings = workflow.finalize(Sex::Female).unwrap();
    assert!(findings.stats.depth >= 10.0, "coverage reads must clear the minimum");

    let VariantFindings::Str(str_findings) = &findings.findings["LOCUS1"] else {
        panic!("expected STR findings");
    };
    assert_eq!("5:4", str_findings.counts_of_spanning_reads.to_string());
    assert!(str_findings.counts_of_flanking_reads.is_empty());
    assert!(str_findings.counts_of_inrepeat_reads.is_empty());

    let genotype = str_findings.genotype.as_ref().expect("genotype should be called");
    assert_eq!("5/5", genotype.encode());
    let (short_lo, short_hi) = genotype.short_allele_ci().unwrap();
    let (long_lo, long_hi) = genotype.long_allele_ci().unwrap();
    assert!(short_lo <= 5 && 5 <= short_hi);
    assert!(long_lo <= 5 && 5 <= long_hi);
}

#[test]
fn heterozygous_repeat_is_genotyped() {
    let reference = str_reference(2);
    let mut workflow = build_workflow(
        &reference,
        "(CCG)*",
        VariantTypeFromUser::Repeat,
        GenomicRegion::new(0, 50, 56),
    );

    push_coverage_reads(&mut workflow, 20);
    for index in 0..2 {
        let read = spanning_read(&format!("short{index}"), "CCG", 2);
        workflow.process(read, None, RegionKind::Target, InputMode::ReadOnly);
    }
    for index in 0..2 {
        let read = spanning_read(&format!("long{index}"), "CCG", 3);
        workflow.process(read, None, RegionKind::Target, InputMode::ReadOnly);
    }

    let findings = workflow.finalize(Sex::Female).unwrap();
    let VariantFindings::Str(str_findings) = &findings.findings["LOCUS1"] else {
        panic!("expected STR findings");
    };
    assert_eq!("2:2,3:2", str_findings.counts_of_spanning_reads.to_string());

    let genotype = str_findings.genotype.as_ref().expect("genotype should be called");
    assert_eq!("2/3", genotype.encode());
    assert!(genotype.short_allele_size_in_units() <= genotype.long_allele_size_in_units());
    let (short_lo, short_hi) = genotype.short_allele_ci().unwrap();
    let (long_lo, long_hi) = genotype.long_allele_ci().unwrap();
    assert!(short_lo <= 2 && 2 <= short_hi);
    assert!(long_lo <= 3 && 3 <= long_hi);
}

#[test]
fn flanking_reads_are_tallied_separately() {
    let reference = str_reference(2);
    let mut workflow = build_workflow(
        &reference,
        "(CCG)*",
        VariantTypeFromUser::Repeat,
        GenomicRegion::new(0, 50, 56),
    );

    push_coverage_reads(&mut workflow, 20);
    // runs from the left flank into the repeat without reaching the right flank
    let sequence = format!("{}{}", &LEFT_FLANK[30..], "CCG".repeat(4));
    let read = mapped_read("flank0", sequence, 30);
    workflow.process(read, None, RegionKind::Target, InputMode::ReadOnly);

    let findings = workflow.finalize(Sex::Female).unwrap();
    let VariantFindings::Str(str_findings) = &findings.findings["LOCUS1"] else {
        panic!("expected STR findings");
    };
    assert!(str_findings.counts_of_spanning_reads.is_empty());
    assert_eq!("4:1", str_findings.counts_of_flanking_reads.to_string());
}

#[test]
fn reverse_complemented_reads_are_reoriented() {
    let reference = str_reference(2);
    let mut workflow = build_workflow(
        &reference,
        "(CCG)*",
        VariantTypeFromUser::Repeat,
        GenomicRegion::new(0, 50, 56),
    );

    push_coverage_reads(&mut workflow, 20);
    let forward =
        format!("{}{}{}", &LEFT_FLANK[44..], "CCG".repeat(5), &RIGHT_FLANK[..6]);
    let reversed: String = String::from_utf8(bio::alphabets::dna::revcomp(forward.as_bytes()))
        .unwrap();
    let read = mapped_read("rc0", reversed, 44);
    workflow.process(read, None, RegionKind::Target, InputMode::ReadOnly);

    let findings = workflow.finalize(Sex::Female).unwrap();
    let VariantFindings::Str(str_findings) = &findings.findings["LOCUS1"] else {
        panic!("expected STR findings");
    };
    assert_eq!("5:1", str_findings.counts_of_spanning_reads.to_string());
}

#[test]
fn low_coverage_swap_reports_counts_without_genotype() {
    let contig = format!("{LEFT_FLANK}GT{RIGHT_FLANK}");
    let reference = InMemoryReference::new(vec![("chr1".to_string(), contig)]);
    let mut workflow = build_workflow(
        &reference,
        "(GT|AT)",
        VariantTypeFromUser::SmallVariant,
        GenomicRegion::new(0, 50, 52),
    );

    // three coverage reads leave the locus far below the coverage minimum
    push_coverage_reads(&mut workflow, 3);
    for (index, haplotype) in ["GT", "GT", "AT"].iter().enumerate() {
        let sequence =
            format!("{}{haplotype}{}", &LEFT_FLANK[38..], &RIGHT_FLANK[..12]);
        let read = mapped_read(&format!("sv{index}"), sequence, 38);
        workflow.process(read, None, RegionKind::Target, InputMode::ReadOnly);
    }

    let findings = workflow.finalize(Sex::Female).unwrap();
    assert!(findings.stats.depth < 10.0);

    let VariantFindings::SmallVariant(sv_findings) = &findings.findings["LOCUS1"] else {
        panic!("expected small-variant findings");
    };
    assert_eq!(2, sv_findings.num_ref_reads);
    assert_eq!(1, sv_findings.num_alt_reads);
    assert!(sv_findings.genotype.is_none(), "low coverage must suppress the genotype");
}

#[test]
fn heterozygous_swap_is_genotyped_at_full_coverage() {
    let contig = format!("{LEFT_FLANK}GT{RIGHT_FLANK}");
    let reference = InMemoryReference::new(vec![("chr1".to_string(), contig)]);
    let mut workflow = build_workflow(
        &reference,
        "(GT|AT)",
        VariantTypeFromUser::SmallVariant,
        GenomicRegion::new(0, 50, 52),
    );

    push_coverage_reads(&mut workflow, 20);
    for index in 0..14 {
        let sequence = format!("{}GT{}", &LEFT_FLANK[38..], &RIGHT_FLANK[..12]);
        workflow.process(
            mapped_read(&format!("ref{index}"), sequence, 38),
            None,
            RegionKind::Target,
            InputMode::ReadOnly,
        );
    }
    for index in 0..15 {
        let sequence = format!("{}AT{}", &LEFT_FLANK[38..], &RIGHT_FLANK[..12]);
        workflow.process(
            mapped_read(&format!("alt{index}"), sequence, 38),
            None,
            RegionKind::Target,
            InputMode::ReadOnly,
        );
    }

    let findings = workflow.finalize(Sex::Female).unwrap();
    let VariantFindings::SmallVariant(sv_findings) = &findings.findings["LOCUS1"] else {
        panic!("expected small-variant findings");
    };
    assert_eq!(14, sv_findings.num_ref_reads);
    assert_eq!(15, sv_findings.num_alt_reads);
    assert_eq!("0/1", sv_findings.genotype.as_ref().unwrap().encode());
}

#[test]
fn uninformative_reads_contribute_to_stats_only() {
    let reference = str_reference(2);
    let mut workflow = build_workflow(
        &reference,
        "(CCG)*",
        VariantTypeFromUser::Repeat,
        GenomicRegion::new(0, 50, 56),
    );

    push_coverage_reads(&mut workflow, 20);
    // a read from nowhere near the locus: no seed, dropped after stats
    let read = mapped_read("junk0", "TTTTTTTTTTTTTTTTTTTTTTTTTTTTTT".to_string(), 2);
    workflow.process(read, None, RegionKind::Target, InputMode::ReadOnly);

    let findings = workflow.finalize(Sex::Female).unwrap();
    let VariantFindings::Str(str_findings) = &findings.findings["LOCUS1"] else {
        panic!("expected STR findings");
    };
    assert!(str_findings.counts_of_spanning_reads.is_empty());
    assert!(str_findings.counts_of_flanking_reads.is_empty());
}
