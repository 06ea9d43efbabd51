//! # Locus lookup and pair routing
//!
//! Per-contig interval trees over the target and off-target regions of every
//! locus answer "which workflows want this read". Pair routing mirrors the
//! read-dispatch contract: pairs with a region in common go to it whole,
//! nearby half-matching pairs contribute only the matching mate, and distant
//! pairs fan out whole to every workflow either mate hit.
use std::collections::HashMap;
use std::sync::Arc;

use bio::data_structures::interval_tree::IntervalTree;

use crate::locus::LocusSpec;
use crate::workflow::{InputMode, RegionKind};

/// Distance under which two mates on one contig count as nearby.
const MAX_MATE_DISTANCE: i64 = 1000;

/// One routing decision: which locus, through which region kind, and which
/// mates it should consume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkflowBundle {
    pub locus_index: usize,
    pub region_kind: RegionKind,
    pub input_mode: InputMode,
}

pub struct WorkflowFinder {
    trees: HashMap<usize, IntervalTree<i64, (usize, RegionKind)>>,
}

impl WorkflowFinder {
    pub fn new(loci: &[Arc<LocusSpec>]) -> Self {
        let mut intervals: HashMap<usize, Vec<(i64, i64, (usize, RegionKind))>> = HashMap::new();
        for (locus_index, locus) in loci.iter().enumerate() {
            for region in &locus.target_regions {
                intervals.entry(region.contig_index).or_default().push((
                    region.start,
                    region.end,
                    (locus_index, RegionKind::Target),
                ));
            }
            for region in &locus.offtarget_regions {
                intervals.entry(region.contig_index).or_default().push((
                    region.start,
                    region.end,
                    (locus_index, RegionKind::Offtarget),
                ));
            }
        }

        let mut trees = HashMap::new();
        for (contig_index, contig_intervals) in intervals {
            let mut tree = IntervalTree::new();
            for (start, end, data) in contig_intervals {
                tree.insert(start..end, data);
            }
            trees.insert(contig_index, tree);
        }
        WorkflowFinder { trees }
    }

    /// Workflows whose regions fully contain the read interval.
    pub fn query(&self, contig_index: i32, start: i64, end: i64) -> Vec<WorkflowBundle> {
        if contig_index < 0 {
            return Vec::new();
        }
        let Some(tree) = self.trees.get(&(contig_index as usize)) else {
            return Vec::new();
        };

        let mut bundles: Vec<WorkflowBundle> = tree
            .find(start..end.max(start + 1))
            .filter(|entry| {
                entry.interval().start <= start && end <= entry.interval().end
            })
            .map(|entry| {
                let &(locus_index, region_kind) = entry.data();
                WorkflowBundle { locus_index, region_kind, input_mode: InputMode::Both }
            })
            .collect();
        bundles.sort_by_key(|bundle| bundle.locus_index);
        bundles
    }

    /// Route a whole pair given both mates' coordinates.
    #[allow(clippy::too_many_arguments)]
    pub fn query_pair(
        &self,
        read_contig: i32,
        read_start: i64,
        read_end: i64,
        mate_contig: i32,
        mate_start: i64,
        mate_end: i64,
    ) -> Vec<WorkflowBundle> {
        let read_bundles = self.query(read_contig, read_start, read_end);
        let mate_bundles = self.query(mate_contig, mate_start, mate_end);

        let common = coalesce_common_bundles(&read_bundles, &mate_bundles);
        if !common.is_empty() {
            common
        } else if are_mates_nearby(read_contig, read_start, mate_contig, mate_start) {
            coalesce_bundles_for_nearby_mates(&read_bundles, &mate_bundles)
        } else {
            coalesce_bundles_for_faraway_mates(&read_bundles, &mate_bundles)
        }
    }
}

fn are_mates_nearby(read_contig: i32, read_start: i64, mate_contig: i32, mate_start: i64) -> bool {
    read_contig == mate_contig && (read_start - mate_start).abs() < MAX_MATE_DISTANCE
}

/// Both mates landed in the same region: send the pair whole.
fn coalesce_common_bundles(
    read_bundles: &[WorkflowBundle],
    mate_bundles: &[WorkflowBundle],
) -> Vec<WorkflowBundle> {
    let mut common = Vec::new();
    for read_bundle in read_bundles {
        for mate_bundle in mate_bundles {
            if read_bundle.locus_index == mate_bundle.locus_index
                && read_bundle.region_kind == mate_bundle.region_kind
            {
                common.push(*read_bundle);
            }
        }
    }
    // A locus with several regions of one kind must still see the pair once.
    common.sort_by_key(|bundle| bundle.locus_index);
    common.dedup();
    common
}

/// Nearby mates with no common region: each target region takes just the
/// mate that landed in it. Half-in off-target pairs are ignored.
fn coalesce_bundles_for_nearby_mates(
    read_bundles: &[WorkflowBundle],
    mate_bundles: &[WorkflowBundle],
) -> Vec<WorkflowBundle> {
    let mut bundles = Vec::new();
    for bundle in read_bundles {
        if bundle.region_kind == RegionKind::Target {
            bundles.push(WorkflowBundle { input_mode: InputMode::ReadOnly, ..*bundle });
        }
    }
    for bundle in mate_bundles {
        if bundle.region_kind == RegionKind::Target {
            bundles.push(WorkflowBundle { input_mode: InputMode::MateOnly, ..*bundle });
        }
    }
    bundles
}

/// Distant mates: the whole pair goes to every workflow either mate hit.
fn coalesce_bundles_for_faraway_mates(
    read_bundles: &[WorkflowBundle],
    mate_bundles: &[WorkflowBundle],
) -> Vec<WorkflowBundle> {
    let mut bundles = Vec::new();
    bundles.extend(read_bundles.iter().copied());
    bundles.extend(mate_bundles.iter().copied());
    for bundle in &mut bundles {
        bundle.input_mode = InputMode::Both;
    }
    bundles
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genome::{CopyNumberBySex, GenomicRegion};
    use crate::graph::make_str_graph;
    use crate::locus::GenotyperParams;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn locus_with_regions(
        id: &str,
        target: GenomicRegion,
        offtarget: Vec<GenomicRegion>,
    ) -> Arc<LocusSpec> {
        Arc::new(LocusSpec {
            locus_id: id.to_string(),
            graph: Arc::new(make_str_graph("AAAACC", "CCG", "ATTT")),
            node_regions: BTreeMap::new(),
            reference_region: target,
            target_regions: vec![target],
            offtarget_regions: offtarget,
            stats_regions: Vec::new(),
            copy_number: CopyNumberBySex::TwoInFemaleTwoInMale,
            params: GenotyperParams::default(),
            variants: Vec::new(),
        })
    }

    fn finder() -> WorkflowFinder {
        let loci = vec![locus_with_regions(
            "L0",
            GenomicRegion::new(2, 1000, 3000),
            vec![GenomicRegion::new(3, 5000, 6000)],
        )];
        WorkflowFinder::new(&loci)
    }

    #[test]
    fn contained_reads_find_their_workflow() {
        let finder = finder();
        let bundles = finder.query(2, 1500, 1600);
        assert_eq!(1, bundles.len());
        assert_eq!(RegionKind::Target, bundles[0].region_kind);

        // straddling the region boundary does not count
        assert!(finder.query(2, 2950, 3050).is_empty());
        assert!(finder.query(0, 1500, 1600).is_empty());
    }

    #[test]
    fn pair_inside_one_region_is_sent_whole() {
        let finder = finder();
        let bundles = finder.query_pair(2, 2000, 2100, 2, 2300, 2400);
        assert_eq!(1, bundles.len());
        assert_eq!(InputMode::Both, bundles[0].input_mode);
        assert_eq!(RegionKind::Target, bundles[0].region_kind);
    }

    #[test]
    fn nearby_half_matching_pair_contributes_one_mate() {
        let finder = finder();
        // read at 500 is outside, mate at 2300 inside, distance < 1000
        let bundles = finder.query_pair(2, 500, 600, 2, 2300, 2400);
        assert_eq!(1, bundles.len());
        assert_eq!(InputMode::MateOnly, bundles[0].input_mode);
    }

    #[test]
    fn faraway_pair_goes_nowhere_without_hits() {
        let finder = finder();
        let bundles = finder.query_pair(2, 500, 600, 5, 2300, 2400);
        assert!(bundles.is_empty());
    }

    #[test]
    fn faraway_pair_is_sent_whole_to_either_side() {
        let finder = finder();
        // mate landed in the off-target region on another contig
        let bundles = finder.query_pair(2, 2000, 2100, 3, 5500, 5600);
        assert_eq!(2, bundles.len());
        assert!(bundles.iter().all(|bundle| bundle.input_mode == InputMode::Both));
        assert!(bundles.iter().any(|bundle| bundle.region_kind == RegionKind::Offtarget));
    }
}
