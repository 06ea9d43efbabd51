//! # Variant catalog loading
//!
//! The catalog is a JSON array of locus entries. Scalar fields may be given
//! as single values or arrays, matching the established catalog format:
//!
//! ```json
//! {
//!     "LocusId": "HTT",
//!     "LocusStructure": "(CAG)*CAACAG(CCG)*",
//!     "ReferenceRegion": ["chr4:3074876-3074933", "chr4:3074939-3074966"],
//!     "VariantType": ["Repeat", "Repeat"]
//! }
//! ```
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context, Result};
use log::{info, warn};
use serde::Deserialize;

use crate::error::Error;
use crate::genome::{decode_region, ContigInfo, GenomicRegion};
use crate::locus::{decode_locus, LocusDescription, LocusSpec, VariantTypeFromUser};
use crate::reference::ReferenceSequence;
use crate::workflow::HeuristicParams;

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(value) => vec![value],
            OneOrMany::Many(values) => values,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LocusEncoding {
    locus_id: String,
    locus_structure: String,
    reference_region: OneOrMany<String>,
    variant_type: OneOrMany<String>,
    #[serde(default)]
    variant_id: Option<OneOrMany<String>>,
    #[serde(default)]
    target_region: Option<OneOrMany<String>>,
    #[serde(default)]
    offtarget_regions: Option<Vec<String>>,
    #[serde(default)]
    error_rate: Option<f64>,
    #[serde(default)]
    likelihood_ratio_threshold: Option<f64>,
    #[serde(default)]
    minimal_locus_coverage: Option<f64>,
}

fn derive_variant_ids(locus_id: &str, num_variants: usize) -> Vec<String> {
    if num_variants == 1 {
        return vec![locus_id.to_string()];
    }
    (0..num_variants).map(|index| format!("{locus_id}_{index}")).collect()
}

fn merge_regions(regions: &[GenomicRegion]) -> Result<GenomicRegion, Error> {
    let first = regions
        .first()
        .ok_or_else(|| Error::InputMalformed("a locus needs a reference region".to_string()))?;
    let mut merged = *first;
    for region in &regions[1..] {
        if region.contig_index != merged.contig_index || region.start < merged.end {
            return Err(Error::InputMalformed(
                "reference regions must be ordered and on one contig".to_string(),
            ));
        }
        merged.end = region.end;
    }
    Ok(merged)
}

fn decode_description(
    encoding: LocusEncoding,
    contig_info: &ContigInfo,
) -> Result<LocusDescription, Error> {

    let variant_regions: Vec<GenomicRegion> = encoding
        .reference_region
        .into_vec()
        .iter()
        .map(|region| decode_region(contig_info, region))
        .collect::<Result<_, _>>()?;

    let variant_types: Vec<VariantTypeFromUser> = encoding
        .variant_type
        .into_vec()
        .iter()
        .map(|encoding| VariantTypeFromUser::decode(encoding))
        .collect::<Result<_, _>>()?;

    if variant_regions.len() != variant_types.len() {
        return Err(Error::InputMalformed(format!(
            "locus {} must provide one reference region per variant type",
            encoding.locus_id
        )));
    }

    let variant_ids = match encoding.variant_id {
        Some(ids) => {
            let ids = ids.into_vec();
            if ids.len() != variant_types.len() {
                return Err(Error::InputMalformed(format!(
                    "locus {} must provide one variant id per variant type",
                    encoding.locus_id
                )));
            }
            ids
        }
        None => derive_variant_ids(&encoding.locus_id, variant_types.len()),
    };

    let target_regions = encoding
        .target_region
        .map(OneOrMany::into_vec)
        .unwrap_or_default()
        .iter()
        .map(|region| decode_region(contig_info, region))
        .collect::<Result<_, _>>()?;

    let offtarget_regions = encoding
        .offtarget_regions
        .unwrap_or_default()
        .iter()
        .map(|region| decode_region(contig_info, region))
        .collect::<Result<_, _>>()?;

    let locus_region = merge_regions(&variant_regions)?;

    Ok(LocusDescription {
        locus_id: encoding.locus_id,
        structure: encoding.locus_structure,
        variant_regions,
        variant_types,
        variant_ids,
        locus_region,
        target_regions,
        offtarget_regions,
        error_rate: encoding.error_rate,
        likelihood_ratio_threshold: encoding.likelihood_ratio_threshold,
        min_locus_coverage: encoding.minimal_locus_coverage,
    })
}

/// Load and decode the variant catalog. With `permissive` set, loci whose
/// reference sequence cannot be retrieved are skipped with a warning instead
/// of failing the run.
pub fn load_catalog<P: AsRef<Path>>(
    path: P,
    contig_info: &ContigInfo,
    reference: &dyn ReferenceSequence,
    heuristics: &HeuristicParams,
    permissive: bool,
) -> Result<Vec<LocusSpec>> {
    let path = path.as_ref();
    let file = File::open(path)
        .with_context(|| format!("Could not read variant catalog {}", path.display()))?;
    let encodings: Vec<LocusEncoding> = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Could not parse variant catalog {}", path.display()))?;

    let mut loci = Vec::with_capacity(encodings.len());
    for encoding in encodings {
        let locus_id = encoding.locus_id.clone();
        let spec = decode_description(encoding, contig_info)
            .and_then(|description| decode_locus(&description, contig_info, reference, heuristics));
        match spec {
            Ok(spec) => loci.push(spec),
            Err(error @ Error::RegionUnavailable(_)) if permissive => {
                warn!("Skipping locus {locus_id}: {error}");
            }
            Err(error) => {
                return Err(error).with_context(|| format!("Error loading locus {locus_id}"));
            }
        }
    }

    info!("Loaded {} loci from {}", loci.len(), path.display());
    Ok(loci)
}
