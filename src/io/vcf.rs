//! # VCF output
//!
//! Genotyped variants are written as VCF 4.x records through htslib. STR
//! alleles are symbolic `<STRn>` entries with the repeat length carried in
//! INFO; small variants get literal REF/ALT sequences, left-anchored on the
//! preceding reference base for insertions and deletions. Records are sorted
//! by the reference coordinate of their variant.
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use itertools::Itertools;
use rust_htslib::bcf::record::GenotypeAllele;
use rust_htslib::bcf::{Format, Header, Writer};

use crate::findings::{LocusFindings, SmallVariantFindings, StrFindings, VariantFindings};
use crate::genome::{ContigInfo, GenomicRegion};
use crate::locus::{LocusSpec, VariantSpec, VariantSubtype};
use crate::reference::ReferenceSequence;

/// The VCF info lines to be included in the header.
const VCF_INFO_LINES: &[&[u8]] = &[
    br#"##INFO=<ID=END,Number=1,Type=Integer,Description="End position of the variant">"#,
    br#"##INFO=<ID=REF,Number=1,Type=Integer,Description="Reference copy number">"#,
    br#"##INFO=<ID=RL,Number=1,Type=Integer,Description="Reference length in bp">"#,
    br#"##INFO=<ID=RU,Number=1,Type=String,Description="Repeat unit in the reference orientation">"#,
    br#"##INFO=<ID=REPID,Number=1,Type=String,Description="Repeat identifier as specified in the variant catalog">"#,
    br#"##INFO=<ID=VARID,Number=1,Type=String,Description="Variant identifier as specified in the variant catalog">"#,
];

/// The VCF format lines to be included in the header.
const VCF_FORMAT_LINES: &[&[u8]] = &[
    br#"##FORMAT=<ID=GT,Number=1,Type=String,Description="Genotype">"#,
    br#"##FORMAT=<ID=SO,Number=1,Type=String,Description="Type of reads that support the allele; can be SPANNING, FLANKING, or INREPEAT meaning that the reads span, flank, or are fully contained in the repeat">"#,
    br#"##FORMAT=<ID=REPCN,Number=1,Type=String,Description="Number of repeat units spanned by the allele">"#,
    br#"##FORMAT=<ID=REPCI,Number=1,Type=String,Description="Confidence interval for REPCN">"#,
    br#"##FORMAT=<ID=ADSP,Number=1,Type=String,Description="Number of spanning reads consistent with the allele">"#,
    br#"##FORMAT=<ID=ADFL,Number=1,Type=String,Description="Number of flanking reads consistent with the allele">"#,
    br#"##FORMAT=<ID=ADIR,Number=1,Type=String,Description="Number of in-repeat reads consistent with the allele">"#,
    br#"##FORMAT=<ID=LC,Number=1,Type=Float,Description="Locus coverage">"#,
];

fn make_vcf_header(contig_info: &ContigInfo, sample_id: &str) -> Result<Header> {
    let mut header = Header::new();
    for index in 0..contig_info.num_contigs() {
        let name = contig_info.name(index)?;
        let size = contig_info.size(index)?;
        header.push_record(format!(r#"##contig=<ID={name},length={size}>"#).as_bytes());
    }
    for line in VCF_INFO_LINES {
        header.push_record(line);
    }
    for line in VCF_FORMAT_LINES {
        header.push_record(line);
    }
    header.push_sample(sample_id.as_bytes());
    Ok(header)
}

/// Write all genotyped variants, sorted by reference coordinate.
pub fn write_vcf<P: AsRef<Path>>(
    path: P,
    sample_id: &str,
    contig_info: &ContigInfo,
    reference: &dyn ReferenceSequence,
    loci: &[Arc<LocusSpec>],
    sample_findings: &[LocusFindings],
) -> Result<()> {
    assert_eq!(loci.len(), sample_findings.len());
    let header = make_vcf_header(contig_info, sample_id)?;
    let mut writer = Writer::from_path(path.as_ref(), &header, true, Format::Vcf)
        .with_context(|| format!("Failed to create VCF {}", path.as_ref().display()))?;

    let mut entries: Vec<(GenomicRegion, usize, String)> = Vec::new();
    for (locus_index, locus_findings) in sample_findings.iter().enumerate() {
        for variant_id in locus_findings.findings.keys() {
            let variant = variant_spec(&loci[locus_index], variant_id)?;
            entries.push((variant.reference_region, locus_index, variant_id.clone()));
        }
    }
    entries.sort();

    for (_, locus_index, variant_id) in entries {
        let spec = &loci[locus_index];
        let variant = variant_spec(spec, &variant_id)?;
        let findings = &sample_findings[locus_index].findings[&variant_id];
        let depth = sample_findings[locus_index].stats.depth;

        match findings {
            VariantFindings::Str(findings) => write_str_record(
                &mut writer,
                contig_info,
                reference,
                spec,
                variant,
                findings,
                depth,
            )?,
            VariantFindings::SmallVariant(findings) => write_small_variant_record(
                &mut writer,
                contig_info,
                reference,
                spec,
                variant,
                findings,
                depth,
            )?,
        }
    }

    Ok(())
}

fn variant_spec<'a>(spec: &'a LocusSpec, variant_id: &str) -> Result<&'a VariantSpec> {
    spec.variants
        .iter()
        .find(|variant| variant.id == variant_id)
        .with_context(|| format!("Unknown variant id {variant_id}"))
}

fn fetch_sequence(
    reference: &dyn ReferenceSequence,
    contig_info: &ContigInfo,
    contig_index: usize,
    start: i64,
    end: i64,
) -> Result<String> {
    let contig_name = contig_info.name(contig_index)?;
    Ok(reference.get_sequence(contig_name, start, end)?)
}

/// Which read class supports an allele of the given size.
fn support_class(findings: &StrFindings, num_units: u32) -> &'static str {
    let key = i64::from(num_units);
    if findings.counts_of_spanning_reads.count_of(key) > 0 {
        "SPANNING"
    } else if findings.counts_of_flanking_reads.count_at_or_below(key) > 0 {
        "FLANKING"
    } else {
        "INREPEAT"
    }
}

#[allow(clippy::too_many_arguments)]
fn write_str_record(
    writer: &mut Writer,
    contig_info: &ContigInfo,
    reference: &dyn ReferenceSequence,
    spec: &LocusSpec,
    variant: &VariantSpec,
    findings: &StrFindings,
    depth: f64,
) -> Result<()> {
    let Some(genotype) = &findings.genotype else {
        return Ok(());
    };
    let region = variant.reference_region;
    let motif = spec.graph.node_seq(variant.nodes[0]).to_vec();
    let ref_units = (region.length() / motif.len() as i64) as u32;

    let mut record = writer.empty_record();
    let contig_name = contig_info.name(region.contig_index)?;
    let rid = writer.header().name2rid(contig_name.as_bytes())?;
    record.set_rid(Some(rid));
    record.set_pos(region.start);

    // REF is the leading base of the repeat; expanded alleles are symbolic.
    let ref_base = fetch_sequence(
        reference,
        contig_info,
        region.contig_index,
        region.start,
        region.start + 1,
    )?;
    let mut alleles: Vec<Vec<u8>> = vec![ref_base.into_bytes()];
    let mut genotype_indices: Vec<GenotypeAllele> = Vec::new();
    for &allele_size in genotype.allele_sizes() {
        if allele_size == ref_units {
            genotype_indices.push(GenotypeAllele::Unphased(0));
            continue;
        }
        let symbol = format!("<STR{allele_size}>").into_bytes();
        let allele_index = match alleles.iter().position(|allele| *allele == symbol) {
            Some(index) => index,
            None => {
                alleles.push(symbol);
                alleles.len() - 1
            }
        };
        genotype_indices.push(GenotypeAllele::Unphased(allele_index as i32));
    }

    let allele_refs: Vec<&[u8]> = alleles.iter().map(Vec::as_slice).collect();
    record.set_alleles(&allele_refs).context("Error setting STR alleles")?;

    record.push_info_integer(b"END", &[region.end as i32])?;
    record.push_info_integer(b"REF", &[ref_units as i32])?;
    record.push_info_integer(b"RL", &[region.length() as i32])?;
    record.push_info_string(b"RU", &[motif.as_slice()])?;
    record.push_info_string(b"REPID", &[variant.id.as_bytes()])?;
    record.push_info_string(b"VARID", &[variant.id.as_bytes()])?;

    record.push_genotypes(&genotype_indices)?;

    let per_allele = |format_one: &dyn Fn(u32) -> String| -> String {
        genotype.allele_sizes().iter().map(|&size| format_one(size)).join("/")
    };
    let so = per_allele(&|size| support_class(findings, size).to_string());
    let adsp =
        per_allele(&|size| findings.counts_of_spanning_reads.count_of(i64::from(size)).to_string());
    let adfl = per_allele(&|size| {
        findings.counts_of_flanking_reads.count_at_or_below(i64::from(size)).to_string()
    });
    let adir = per_allele(&|size| {
        findings.counts_of_inrepeat_reads.count_at_or_below(i64::from(size)).to_string()
    });
    record.push_format_string(b"SO", &[so.as_bytes()])?;
    record.push_format_string(b"REPCN", &[genotype.encode().as_bytes()])?;
    record.push_format_string(b"REPCI", &[genotype.encode_ci().as_bytes()])?;
    record.push_format_string(b"ADSP", &[adsp.as_bytes()])?;
    record.push_format_string(b"ADFL", &[adfl.as_bytes()])?;
    record.push_format_string(b"ADIR", &[adir.as_bytes()])?;
    record.push_format_float(b"LC", &[depth as f32])?;

    writer.write(&record).context("Error writing STR record")?;
    Ok(())
}

/// Sequence of the alternative haplotype of a small variant.
fn alt_node_seq<'a>(spec: &'a LocusSpec, variant: &VariantSpec) -> Result<&'a [u8]> {
    let alt_node = variant
        .nodes
        .iter()
        .copied()
        .find(|node| Some(*node) != variant.reference_node)
        .with_context(|| format!("Variant {} has no alternative node", variant.id))?;
    Ok(spec.graph.node_seq(alt_node))
}

#[allow(clippy::too_many_arguments)]
fn write_small_variant_record(
    writer: &mut Writer,
    contig_info: &ContigInfo,
    reference: &dyn ReferenceSequence,
    spec: &LocusSpec,
    variant: &VariantSpec,
    findings: &SmallVariantFindings,
    depth: f64,
) -> Result<()> {
    let Some(genotype) = &findings.genotype else {
        return Ok(());
    };
    let region = variant.reference_region;

    let (pos, ref_allele, alt_allele) = match variant.subtype {
        VariantSubtype::Insertion => {
            let anchor = fetch_sequence(
                reference,
                contig_info,
                region.contig_index,
                region.start - 1,
                region.start,
            )?;
            let inserted = String::from_utf8_lossy(alt_node_seq(spec, variant)?).to_string();
            (region.start - 1, anchor.clone(), format!("{anchor}{inserted}"))
        }
        VariantSubtype::Deletion => {
            let anchor = fetch_sequence(
                reference,
                contig_info,
                region.contig_index,
                region.start - 1,
                region.start,
            )?;
            let deleted = fetch_sequence(
                reference,
                contig_info,
                region.contig_index,
                region.start,
                region.end,
            )?;
            (region.start - 1, format!("{anchor}{deleted}"), anchor)
        }
        VariantSubtype::Swap | VariantSubtype::Smn => {
            let ref_seq = fetch_sequence(
                reference,
                contig_info,
                region.contig_index,
                region.start,
                region.end,
            )?;
            let alt_seq = String::from_utf8_lossy(alt_node_seq(spec, variant)?).to_string();
            (region.start, ref_seq, alt_seq)
        }
        _ => return Ok(()),
    };

    let mut record = writer.empty_record();
    let contig_name = contig_info.name(region.contig_index)?;
    let rid = writer.header().name2rid(contig_name.as_bytes())?;
    record.set_rid(Some(rid));
    record.set_pos(pos);
    record
        .set_alleles(&[ref_allele.as_bytes(), alt_allele.as_bytes()])
        .context("Error setting small-variant alleles")?;

    record.push_info_integer(b"END", &[region.end as i32])?;
    record.push_info_string(b"VARID", &[variant.id.as_bytes()])?;

    let genotype_indices: Vec<GenotypeAllele> = (0..genotype.num_ref_alleles())
        .map(|_| GenotypeAllele::Unphased(0))
        .chain((0..genotype.num_alt_alleles()).map(|_| GenotypeAllele::Unphased(1)))
        .collect();
    record.push_genotypes(&genotype_indices)?;
    record.push_format_float(b"LC", &[depth as f32])?;

    writer.write(&record).context("Error writing small-variant record")?;
    Ok(())
}
