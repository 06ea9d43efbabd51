//! # Alignment classification
//!
//! Graph alignments carry no meaning on their own; each variant of a locus
//! interprets them through its own classifier. STR variants label alignments
//! as spanning, flanking, or in-repeat; small variants as upstream-flanking,
//! spanning (of a specific node or of the bypass path), or
//! downstream-flanking. The per-read summaries produced here are the sole
//! input of the genotypers.
pub mod small_variant;
pub mod str_variant;

pub use small_variant::{
    ReadSummaryForSmallVariant, SmallVariantAlignment, SmallVariantAlignmentKind,
    SmallVariantClassifier, BYPASS_NODE,
};
pub use str_variant::{ReadSummaryForStr, StrAlignment, StrAlignmentKind, StrClassifier};

use crate::align::AlignmentParams;

/// Retain only the alignments whose score is within one base edit of the
/// best, per the summary-retention rule.
pub(crate) fn retention_threshold(best_score: i32, params: &AlignmentParams) -> i32 {
    best_score - (params.match_score - params.mismatch_score)
}
