//! # Locus specifications
//!
//! A [`LocusSpec`] is the immutable per-locus record driving analysis: the
//! sequence graph with its reference-coordinate mapping, the read extraction
//! and stats regions, the copy-number rule, genotyper parameters, and the
//! variant sub-specifications. Specs are decoded once at startup from the
//! catalog descriptions and shared read-only by all workers.
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::genome::{ContigInfo, CopyNumberBySex, GenomicRegion};
use crate::graph::{build_graph, decode_features, FeatureType, Graph, NodeId};
use crate::reference::ReferenceSequence;
use crate::workflow::HeuristicParams;

const MAX_NS_ALLOWED_IN_FLANKS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariantKind {
    Repeat,
    SmallVariant,
}

impl fmt::Display for VariantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariantKind::Repeat => write!(f, "Repeat"),
            VariantKind::SmallVariant => write!(f, "SmallVariant"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariantSubtype {
    CommonRepeat,
    RareRepeat,
    Insertion,
    Deletion,
    Swap,
    Smn,
}

impl fmt::Display for VariantSubtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariantSubtype::CommonRepeat => write!(f, "Repeat"),
            VariantSubtype::RareRepeat => write!(f, "RareRepeat"),
            VariantSubtype::Insertion => write!(f, "Insertion"),
            VariantSubtype::Deletion => write!(f, "Deletion"),
            VariantSubtype::Swap => write!(f, "Swap"),
            VariantSubtype::Smn => write!(f, "SMN"),
        }
    }
}

/// Variant type as written in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariantTypeFromUser {
    Repeat,
    RareRepeat,
    SmallVariant,
    Smn,
}

impl VariantTypeFromUser {
    pub fn decode(encoding: &str) -> Result<Self> {
        match encoding {
            "Repeat" => Ok(VariantTypeFromUser::Repeat),
            "RareRepeat" => Ok(VariantTypeFromUser::RareRepeat),
            "SmallVariant" => Ok(VariantTypeFromUser::SmallVariant),
            "SMN" => Ok(VariantTypeFromUser::Smn),
            _ => Err(Error::InputMalformed(format!("invalid variant type: {encoding}"))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct VariantSpec {
    pub id: String,
    pub kind: VariantKind,
    pub subtype: VariantSubtype,
    pub reference_region: GenomicRegion,
    pub nodes: Vec<NodeId>,
    pub reference_node: Option<NodeId>,
}

impl VariantSpec {
    /// Consistency rules tying the variant shape to its node set.
    pub fn validate(&self) -> Result<()> {
        let inconsistent = |reason: &str| {
            Err(Error::InputMalformed(format!("inconsistent variant {}: {reason}", self.id)))
        };
        match (self.kind, self.subtype) {
            (VariantKind::Repeat, VariantSubtype::CommonRepeat | VariantSubtype::RareRepeat) => {
                if self.nodes.len() != 1 {
                    return inconsistent("repeats must reference exactly one node");
                }
            }
            (VariantKind::SmallVariant, VariantSubtype::Insertion) => {
                if self.nodes.is_empty() || self.reference_node.is_some() {
                    return inconsistent("insertions name only the alternative node");
                }
            }
            (
                VariantKind::SmallVariant,
                VariantSubtype::Deletion | VariantSubtype::Swap | VariantSubtype::Smn,
            ) => {
                if self.reference_node.is_none() {
                    return inconsistent("a reference node is required");
                }
                if self.nodes.is_empty() {
                    return inconsistent("at least one node is required");
                }
            }
            _ => return inconsistent("variant kind and subtype do not agree"),
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenotyperParams {
    pub error_rate: f64,
    pub likelihood_ratio_threshold: f64,
    pub min_locus_coverage: f64,
    /// Prior probability that a routed read does not belong to the locus.
    pub mismap_prob: f64,
    /// Weighted-purity cutoff for off-target in-repeat-read pairs.
    pub irr_purity_threshold: f64,
    /// Hard cap on the allele sizes enumerated by the genotyper.
    pub max_allele_size_cap: u32,
}

impl Default for GenotyperParams {
    fn default() -> Self {
        GenotyperParams {
            error_rate: 0.02,
            likelihood_ratio_threshold: 10_000.0,
            min_locus_coverage: 10.0,
            mismap_prob: 0.01,
            irr_purity_threshold: 0.90,
            max_allele_size_cap: 500,
        }
    }
}

impl GenotyperParams {
    /// Per-repeat-unit stutter log-probability used by the STR genotyper.
    pub fn stutter_log_prob(&self) -> f64 {
        self.error_rate.ln()
    }
}

/// Decoded description of one catalog entry; produced by the catalog loader.
#[derive(Debug, Clone)]
pub struct LocusDescription {
    pub locus_id: String,
    pub structure: String,
    pub variant_regions: Vec<GenomicRegion>,
    pub variant_types: Vec<VariantTypeFromUser>,
    pub variant_ids: Vec<String>,
    /// Merged span of all variant regions.
    pub locus_region: GenomicRegion,
    pub target_regions: Vec<GenomicRegion>,
    pub offtarget_regions: Vec<GenomicRegion>,
    pub error_rate: Option<f64>,
    pub likelihood_ratio_threshold: Option<f64>,
    pub min_locus_coverage: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct LocusSpec {
    pub locus_id: String,
    pub graph: Arc<Graph>,
    pub node_regions: BTreeMap<NodeId, GenomicRegion>,
    pub reference_region: GenomicRegion,
    pub target_regions: Vec<GenomicRegion>,
    pub offtarget_regions: Vec<GenomicRegion>,
    pub stats_regions: Vec<GenomicRegion>,
    pub copy_number: CopyNumberBySex,
    pub params: GenotyperParams,
    pub variants: Vec<VariantSpec>,
}

impl LocusSpec {
    /// Combined length of the graph with the given repeat node excised;
    /// parallel small-variant branches contribute their mean length.
    pub fn adjusted_region_size(&self, repeat_node: NodeId) -> u32 {
        let mut total = 0.0;
        let mut feature_nodes: BTreeMap<GenomicRegion, Vec<NodeId>> = BTreeMap::new();
        for (&node_id, &region) in &self.node_regions {
            if node_id != repeat_node {
                feature_nodes.entry(region).or_default().push(node_id);
            }
        }
        for nodes in feature_nodes.values() {
            let mean: f64 = nodes.iter().map(|&n| self.graph.node_len(n) as f64).sum::<f64>()
                / nodes.len() as f64;
            total += mean;
        }
        total.round() as u32
    }
}

fn count_flank_ns(flank: &str) -> usize {
    flank.chars().filter(|&symbol| symbol == 'N').count()
}

/// Interleave interruption regions into the per-variant reference regions so
/// that every blueprint feature has one region.
fn complete_reference_regions(
    blueprint_types: &[FeatureType],
    regions_with_flanks: &[GenomicRegion],
) -> Result<Vec<GenomicRegion>> {
    let mut completed = Vec::with_capacity(blueprint_types.len());
    let mut region_index = 0;
    for feature_type in blueprint_types {
        if *feature_type == FeatureType::Interruption {
            if region_index == 0 || region_index >= regions_with_flanks.len() {
                return Err(Error::InputMalformed(
                    "locus structure and reference regions do not agree".to_string(),
                ));
            }
            let left = &regions_with_flanks[region_index - 1];
            let right = &regions_with_flanks[region_index];
            completed.push(GenomicRegion::new(left.contig_index, left.end, right.start));
        } else {
            let region = regions_with_flanks.get(region_index).ok_or_else(|| {
                Error::InputMalformed(
                    "locus structure defines more features than reference regions".to_string(),
                )
            })?;
            completed.push(*region);
            region_index += 1;
        }
    }
    if region_index != regions_with_flanks.len() {
        return Err(Error::InputMalformed(
            "locus structure defines fewer features than reference regions".to_string(),
        ));
    }
    Ok(completed)
}

fn determine_kind_and_subtype(
    feature_type: FeatureType,
    user_type: VariantTypeFromUser,
    reference_region: &GenomicRegion,
) -> Result<(VariantKind, VariantSubtype)> {
    match feature_type {
        FeatureType::SkippableRepeat | FeatureType::UnskippableRepeat => match user_type {
            VariantTypeFromUser::Repeat => Ok((VariantKind::Repeat, VariantSubtype::CommonRepeat)),
            VariantTypeFromUser::RareRepeat => {
                Ok((VariantKind::Repeat, VariantSubtype::RareRepeat))
            }
            _ => Err(Error::InputMalformed(
                "repeat features require a repeat variant type".to_string(),
            )),
        },
        FeatureType::InsertionOrDeletion => {
            let subtype = if reference_region.length() == 0 {
                VariantSubtype::Insertion
            } else {
                VariantSubtype::Deletion
            };
            Ok((VariantKind::SmallVariant, subtype))
        }
        FeatureType::Swap => {
            let subtype = if user_type == VariantTypeFromUser::Smn {
                VariantSubtype::Smn
            } else {
                VariantSubtype::Swap
            };
            Ok((VariantKind::SmallVariant, subtype))
        }
        _ => Err(Error::InputMalformed(format!(
            "feature {feature_type:?} does not define a variant"
        ))),
    }
}

/// Decode a catalog description into a full locus specification. Coordinates
/// in `description` are expressed against `contig_info`, the canonical contig
/// table shared with the alignment archive.
pub fn decode_locus(
    description: &LocusDescription,
    contig_info: &ContigInfo,
    reference: &dyn ReferenceSequence,
    heuristics: &HeuristicParams,
) -> Result<LocusSpec> {
    let extension = heuristics.region_extension_length as i64;
    let fetch_region = |region: &GenomicRegion| -> Result<String> {
        let contig_name = contig_info.name(region.contig_index)?;
        reference.get_sequence(contig_name, region.start, region.end)
    };

    let first_region = description.variant_regions.first().ok_or_else(|| {
        Error::InputMalformed(format!("locus {} has no reference regions", description.locus_id))
    })?;
    let last_region = description.variant_regions.last().unwrap();
    let contig_index = first_region.contig_index;

    let left_flank_region =
        GenomicRegion::new(contig_index, (first_region.start - extension).max(0), first_region.start);
    let right_flank_region =
        GenomicRegion::new(contig_index, last_region.end, last_region.end + extension);

    let left_flank = fetch_region(&left_flank_region)?;
    let right_flank = fetch_region(&right_flank_region)?;
    let num_ns = count_flank_ns(&left_flank) + count_flank_ns(&right_flank);
    if num_ns > MAX_NS_ALLOWED_IN_FLANKS {
        return Err(Error::FlankTooAmbiguous { found: num_ns, limit: MAX_NS_ALLOWED_IN_FLANKS });
    }

    let full_structure = format!("{left_flank}{}{right_flank}", description.structure);
    let mut blueprint = decode_features(&full_structure)?;
    let graph = Arc::new(build_graph(&mut blueprint)?);

    let mut regions_with_flanks = vec![left_flank_region];
    regions_with_flanks.extend(description.variant_regions.iter().copied());
    regions_with_flanks.push(right_flank_region);

    let blueprint_types: Vec<FeatureType> =
        blueprint.iter().map(|feature| feature.feature_type).collect();
    let feature_regions = complete_reference_regions(&blueprint_types, &regions_with_flanks)?;

    let mut node_regions = BTreeMap::new();
    for (feature, region) in blueprint.iter().zip(&feature_regions) {
        for &node_id in &feature.node_ids {
            let node_len = graph.node_len(node_id) as i64;
            node_regions.insert(
                node_id,
                GenomicRegion::new(region.contig_index, region.start, region.start + node_len),
            );
        }
    }

    let mut target_regions: Vec<GenomicRegion> =
        description.target_regions.iter().map(|region| region.extend(extension)).collect();
    if target_regions.is_empty() {
        target_regions.push(description.locus_region.extend(extension));
    }

    let locus_region = description.locus_region;
    let stats_regions = vec![
        GenomicRegion::new(
            locus_region.contig_index,
            (locus_region.start - extension).max(0),
            locus_region.start,
        ),
        GenomicRegion::new(locus_region.contig_index, locus_region.end, locus_region.end + extension),
    ];

    let contig_name = contig_info.name(contig_index)?;
    let copy_number = CopyNumberBySex::from_contig(contig_name);

    let mut params = GenotyperParams::default();
    if let Some(error_rate) = description.error_rate {
        params.error_rate = error_rate;
    }
    if let Some(threshold) = description.likelihood_ratio_threshold {
        params.likelihood_ratio_threshold = threshold;
    }
    if let Some(coverage) = description.min_locus_coverage {
        params.min_locus_coverage = coverage;
    }

    let mut variants = Vec::new();
    let mut variant_index = 0;
    for (feature, region) in blueprint.iter().zip(&feature_regions) {
        if !feature.feature_type.defines_variant() {
            continue;
        }
        if variant_index >= description.variant_types.len() {
            return Err(Error::InputMalformed(format!(
                "locus {} defines more variants than the catalog entry lists",
                description.locus_id
            )));
        }

        let user_type = description.variant_types[variant_index];
        let (kind, subtype) = determine_kind_and_subtype(feature.feature_type, user_type, region)?;

        let reference_node = if feature.feature_type.is_repeat() {
            Some(feature.node_ids[0])
        } else {
            let reference_seq = fetch_region(region)?;
            feature
                .sequences
                .iter()
                .position(|sequence| *sequence == reference_seq)
                .map(|index| feature.node_ids[index])
        };
        // Insertions keep only the alternative node.
        let reference_node =
            if subtype == VariantSubtype::Insertion { None } else { reference_node };

        let variant = VariantSpec {
            id: description.variant_ids[variant_index].clone(),
            kind,
            subtype,
            reference_region: *region,
            nodes: feature.node_ids.clone(),
            reference_node,
        };
        variant.validate()?;
        variants.push(variant);
        variant_index += 1;
    }
    if variant_index != description.variant_types.len() {
        return Err(Error::InputMalformed(format!(
            "locus {} lists more variants than its structure defines",
            description.locus_id
        )));
    }

    Ok(LocusSpec {
        locus_id: description.locus_id.clone(),
        graph,
        node_regions,
        reference_region: locus_region,
        target_regions,
        offtarget_regions: description.offtarget_regions.clone(),
        stats_regions,
        copy_number,
        params,
        variants,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::InMemoryReference;

    fn reference() -> InMemoryReference {
        // 30 bp flank | CCG CCG | 30 bp flank
        let contig = format!("{}{}{}", "A".repeat(30), "CCGCCG", "T".repeat(30));
        InMemoryReference::new(vec![("chr1".to_string(), contig)])
    }

    fn heuristics() -> HeuristicParams {
        HeuristicParams { region_extension_length: 10, ..HeuristicParams::default() }
    }

    fn str_description() -> LocusDescription {
        LocusDescription {
            locus_id: "STR1".to_string(),
            structure: "(CCG)*".to_string(),
            variant_regions: vec![GenomicRegion::new(0, 30, 36)],
            variant_types: vec![VariantTypeFromUser::Repeat],
            variant_ids: vec!["STR1".to_string()],
            locus_region: GenomicRegion::new(0, 30, 36),
            target_regions: Vec::new(),
            offtarget_regions: Vec::new(),
            error_rate: None,
            likelihood_ratio_threshold: None,
            min_locus_coverage: Some(5.0),
        }
    }

    #[test]
    fn str_locus_is_decoded() {
        let reference = reference();
        let spec =
            decode_locus(&str_description(), reference.contig_info(), &reference, &heuristics())
                .unwrap();

        assert_eq!(3, spec.graph.num_nodes());
        assert!(spec.graph.has_self_loop(1));
        assert_eq!(1, spec.variants.len());

        let variant = &spec.variants[0];
        assert_eq!(VariantKind::Repeat, variant.kind);
        assert_eq!(VariantSubtype::CommonRepeat, variant.subtype);
        assert_eq!(vec![1], variant.nodes);
        assert_eq!(Some(1), variant.reference_node);

        assert_eq!(5.0, spec.params.min_locus_coverage);
        assert_eq!(vec![GenomicRegion::new(0, 20, 46)], spec.target_regions);
        assert_eq!(
            vec![GenomicRegion::new(0, 20, 30), GenomicRegion::new(0, 36, 46)],
            spec.stats_regions
        );
    }

    #[test]
    fn node_regions_follow_the_blueprint() {
        let reference = reference();
        let spec =
            decode_locus(&str_description(), reference.contig_info(), &reference, &heuristics())
                .unwrap();
        assert_eq!(GenomicRegion::new(0, 20, 30), spec.node_regions[&0]);
        assert_eq!(GenomicRegion::new(0, 30, 33), spec.node_regions[&1]);
        assert_eq!(GenomicRegion::new(0, 36, 46), spec.node_regions[&2]);
    }

    #[test]
    fn adjusted_region_size_excises_the_repeat() {
        let reference = reference();
        let spec =
            decode_locus(&str_description(), reference.contig_info(), &reference, &heuristics())
                .unwrap();
        assert_eq!(20, spec.adjusted_region_size(1));
    }

    #[test]
    fn ambiguous_flanks_are_rejected() {
        let contig = format!("{}{}{}", "N".repeat(30), "CCGCCG", "T".repeat(30));
        let reference = InMemoryReference::new(vec![("chr1".to_string(), contig)]);
        assert!(matches!(
            decode_locus(&str_description(), reference.contig_info(), &reference, &heuristics()),
            Err(Error::FlankTooAmbiguous { .. })
        ));
    }

    #[test]
    fn swap_reference_node_matches_reference_sequence() {
        // flank | swap region GT | flank
        let contig = format!("{}GT{}", "A".repeat(20), "C".repeat(20));
        let reference = InMemoryReference::new(vec![("chr1".to_string(), contig)]);
        let description = LocusDescription {
            locus_id: "SWAP1".to_string(),
            structure: "(GT|AT)".to_string(),
            variant_regions: vec![GenomicRegion::new(0, 20, 22)],
            variant_types: vec![VariantTypeFromUser::SmallVariant],
            variant_ids: vec!["SWAP1".to_string()],
            locus_region: GenomicRegion::new(0, 20, 22),
            target_regions: Vec::new(),
            offtarget_regions: Vec::new(),
            error_rate: None,
            likelihood_ratio_threshold: None,
            min_locus_coverage: None,
        };
        let heuristics = HeuristicParams { region_extension_length: 10, ..Default::default() };

        let spec =
            decode_locus(&description, reference.contig_info(), &reference, &heuristics).unwrap();
        let variant = &spec.variants[0];
        assert_eq!(VariantSubtype::Swap, variant.subtype);
        // node 1 carries GT, the reference haplotype
        assert_eq!(Some(1), variant.reference_node);
        assert_eq!(vec![1, 2], variant.nodes);
    }

    #[test]
    fn mismatched_variant_counts_are_rejected() {
        let mut description = str_description();
        description.variant_types.push(VariantTypeFromUser::SmallVariant);
        description.variant_ids.push("extra".to_string());
        let reference = reference();
        assert!(decode_locus(&description, reference.contig_info(), &reference, &heuristics())
            .is_err());
    }
}
