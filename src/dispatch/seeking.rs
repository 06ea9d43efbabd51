//! # Seeking analysis
//!
//! Loci are analyzed independently: workers claim slices of the locus list,
//! each opening its own archive handle, and fetch the target and off-target
//! regions of every locus through the index. Pairs broken by the region
//! boundaries are completed with a targeted seek to the recorded mate
//! coordinate; unrecoverable mates are logged and processed as half-pairs.
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use log::{info, warn};
use rayon::prelude::*;

use crate::findings::LocusFindings;
use crate::genome::{ContigInfo, GenomicRegion, Sex};
use crate::hts::HtsSeeker;
use crate::locus::LocusSpec;
use crate::reads::{MappedRead, MateNumber};
use crate::workflow::{HeuristicParams, InputMode, LocusWorkflow, RegionKind};

/// Run the whole-sample analysis in seeking mode.
pub fn run_seeking(
    archive: &Path,
    reference_path: Option<&Path>,
    contig_info: &ContigInfo,
    loci: &[Arc<LocusSpec>],
    heuristics: &HeuristicParams,
    sex: Sex,
    threads: usize,
) -> Result<Vec<LocusFindings>> {
    assert!(threads >= 1);
    let pool = rayon::ThreadPoolBuilder::new().num_threads(threads).build()?;

    info!("Initializing {} locus workflows", loci.len());
    let mut workflows: Vec<LocusWorkflow> = pool.install(|| {
        loci.par_iter().map(|spec| LocusWorkflow::new(Arc::clone(spec), heuristics)).collect()
    });

    info!("Analyzing loci with {} thread(s)", threads);
    let archive: PathBuf = archive.to_path_buf();
    let reference_path = reference_path.map(Path::to_path_buf);
    let chunk_size = workflows.len() / threads + 1;
    pool.install(|| {
        workflows.par_chunks_mut(chunk_size).try_for_each(|chunk| -> Result<()> {
            // One archive handle per worker.
            let mut seeker = HtsSeeker::new(
                &archive,
                reference_path.as_deref(),
                contig_info,
                heuristics.quality_cutoff,
            )?;
            for workflow in chunk {
                analyze_locus(&mut seeker, contig_info, workflow).with_context(|| {
                    format!("Error analyzing locus {}", workflow.locus_id())
                })?;
            }
            Ok(())
        })
    })?;

    info!("Collecting findings");
    let findings: Result<Vec<LocusFindings>, crate::error::Error> =
        pool.install(|| workflows.par_iter().map(|workflow| workflow.finalize(sex)).collect());
    Ok(findings?)
}

fn analyze_locus(
    seeker: &mut HtsSeeker,
    contig_info: &ContigInfo,
    workflow: &mut LocusWorkflow,
) -> Result<()> {
    let target_regions = workflow.spec().target_regions.clone();
    let offtarget_regions = workflow.spec().offtarget_regions.clone();
    process_regions(seeker, contig_info, workflow, &target_regions, RegionKind::Target)?;
    process_regions(seeker, contig_info, workflow, &offtarget_regions, RegionKind::Offtarget)
}

fn process_regions(
    seeker: &mut HtsSeeker,
    contig_info: &ContigInfo,
    workflow: &mut LocusWorkflow,
    regions: &[GenomicRegion],
    region_kind: RegionKind,
) -> Result<()> {
    // Collate records from all regions so that a pair split across two
    // regions of the same kind is still seen whole.
    let mut pairs: HashMap<String, (Option<MappedRead>, Option<MappedRead>)> = HashMap::new();
    for region in regions {
        let contig_name = contig_info.name(region.contig_index)?;
        for read in seeker.fetch(contig_name, region.start, region.end)? {
            let slot = pairs.entry(read.fragment_id().to_string()).or_default();
            match read.read().id().mate_number() {
                MateNumber::First => slot.0 = Some(read),
                MateNumber::Second => slot.1 = Some(read),
            }
        }
    }

    for (_, pair) in pairs {
        match pair {
            (Some(read), Some(mate)) => {
                workflow.process(read, Some(mate), region_kind, InputMode::Both);
            }
            (Some(read), None) | (None, Some(read)) => {
                if !read.is_paired() {
                    workflow.process(read, None, region_kind, InputMode::ReadOnly);
                    continue;
                }
                match seeker.extract_mate(&read, contig_info)? {
                    Some(mate) => {
                        workflow.process(read, Some(mate), region_kind, InputMode::Both);
                    }
                    None => {
                        warn!(
                            "Could not recover the mate of {} for locus {}",
                            read.fragment_id(),
                            workflow.locus_id()
                        );
                        workflow.process(read, None, region_kind, InputMode::ReadOnly);
                    }
                }
            }
            (None, None) => {}
        }
    }

    Ok(())
}
