//! # JSON findings document
use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::{json, Map, Value};

use crate::findings::{LocusFindings, StrFindings, VariantFindings};
use crate::genome::{encode_region, ContigInfo, Sex};
use crate::locus::{LocusSpec, VariantSpec};

fn str_record(
    contig_info: &ContigInfo,
    spec: &LocusSpec,
    variant: &VariantSpec,
    findings: &StrFindings,
) -> Result<Value> {
    let repeat_unit =
        String::from_utf8_lossy(spec.graph.node_seq(variant.nodes[0])).to_string();

    let mut record = json!({
        "VariantId": variant.id,
        "ReferenceRegion": encode_region(contig_info, &variant.reference_region)?,
        "VariantType": variant.kind.to_string(),
        "VariantSubtype": variant.subtype.to_string(),
        "RepeatUnit": repeat_unit,
        "CountsOfSpanningReads": findings.counts_of_spanning_reads.to_string(),
        "CountsOfFlankingReads": findings.counts_of_flanking_reads.to_string(),
        "CountsOfInrepeatReads": findings.counts_of_inrepeat_reads.to_string(),
    });
    if let Some(genotype) = &findings.genotype {
        record["Genotype"] = Value::from(genotype.encode());
        record["GenotypeConfidenceInterval"] = Value::from(genotype.encode_ci());
    }
    Ok(record)
}

fn small_variant_record(
    contig_info: &ContigInfo,
    variant: &VariantSpec,
    findings: &crate::findings::SmallVariantFindings,
) -> Result<Value> {
    let mut record = json!({
        "VariantId": variant.id,
        "ReferenceRegion": encode_region(contig_info, &variant.reference_region)?,
        "VariantType": variant.kind.to_string(),
        "VariantSubtype": variant.subtype.to_string(),
        "CountOfRefReads": findings.num_ref_reads,
        "CountOfAltReads": findings.num_alt_reads,
        "StatusOfRefAllele": findings.ref_allele_status.status.to_string(),
        "LogLikelihoodRefAllelePresent": format!("{:.4}", findings.ref_allele_status.log_likelihood_ratio),
        "StatusOfAltAllele": findings.alt_allele_status.status.to_string(),
        "LogLikelihoodAltAllelePresent": format!("{:.4}", findings.alt_allele_status.log_likelihood_ratio),
    });
    if let Some(genotype) = &findings.genotype {
        record["Genotype"] = Value::from(genotype.encode());
    }
    Ok(record)
}

/// Render all findings as the per-sample results document.
pub fn sample_findings_to_json(
    sample_id: &str,
    sex: Sex,
    contig_info: &ContigInfo,
    loci: &[Arc<LocusSpec>],
    sample_findings: &[LocusFindings],
) -> Result<Value> {
    assert_eq!(loci.len(), sample_findings.len());

    let mut locus_results = Map::new();
    for (spec, locus_findings) in loci.iter().zip(sample_findings) {
        let mut variant_records = Map::new();
        for (variant_id, findings) in &locus_findings.findings {
            let variant = spec
                .variants
                .iter()
                .find(|variant| variant.id == *variant_id)
                .with_context(|| format!("Unknown variant id {variant_id}"))?;
            let record = match findings {
                VariantFindings::Str(findings) => {
                    str_record(contig_info, spec, variant, findings)?
                }
                VariantFindings::SmallVariant(findings) => {
                    small_variant_record(contig_info, variant, findings)?
                }
            };
            variant_records.insert(variant_id.clone(), record);
        }

        let mut locus_record = Map::new();
        locus_record.insert("LocusId".to_string(), Value::from(spec.locus_id.clone()));
        locus_record
            .insert("AlleleCount".to_string(), Value::from(locus_findings.stats.allele_count as u8));
        locus_record.insert("Coverage".to_string(), Value::from(locus_findings.stats.depth));
        locus_record
            .insert("ReadLength".to_string(), Value::from(locus_findings.stats.mean_read_length));
        if !variant_records.is_empty() {
            locus_record.insert("Variants".to_string(), Value::Object(variant_records));
        }
        locus_results.insert(spec.locus_id.clone(), Value::Object(locus_record));
    }

    Ok(json!({
        "SampleParameters": {
            "SampleId": sample_id,
            "Sex": sex.to_string(),
        },
        "LocusResults": locus_results,
    }))
}

pub fn write_json<W: Write>(
    writer: &mut W,
    sample_id: &str,
    sex: Sex,
    contig_info: &ContigInfo,
    loci: &[Arc<LocusSpec>],
    sample_findings: &[LocusFindings],
) -> Result<()> {
    let document =
        sample_findings_to_json(sample_id, sex, contig_info, loci, sample_findings)?;
    serde_json::to_writer_pretty(writer, &document).context("Failed to write JSON results")?;
    Ok(())
}
