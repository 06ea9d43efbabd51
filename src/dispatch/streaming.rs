//! # Streaming analysis
//!
//! One producer walks the archive once, reassembles mate pairs by fragment
//! id, screens them against the genome mask, and routes them into per-locus
//! queues. Drain tasks run on a bounded worker pool; a task is spawned
//! whenever a queue flips from inactive to active and exits once it has
//! drained the queue, which keeps at most one worker on any locus. Worker
//! failures set a shared flag that stops the producer, and the first
//! captured failure is reported after the pool settles.
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use anyhow::{bail, Result};
use log::info;
use rayon::prelude::*;

use crate::findings::LocusFindings;
use crate::genome::{ContigInfo, Sex};
use crate::hts::HtsStreamer;
use crate::locus::LocusSpec;
use crate::reads::MappedRead;
use crate::workflow::{HeuristicParams, LocusWorkflow};

use super::finder::WorkflowFinder;
use super::mask::GenomeMask;
use super::queue::{PairJob, ReadPairQueue};

#[derive(Debug, Clone, Copy)]
pub struct StreamingParams {
    pub threads: usize,
    /// Active queues allowed beyond the worker count.
    pub queue_headroom: usize,
}

impl Default for StreamingParams {
    fn default() -> Self {
        StreamingParams { threads: 1, queue_headroom: 5 }
    }
}

/// Counts in-flight drain tasks so the producer can wait for the pool to
/// settle before finalising.
#[derive(Default)]
struct TaskLatch {
    in_flight: Mutex<usize>,
    all_done: Condvar,
}

impl TaskLatch {
    fn task_started(&self) {
        *self.in_flight.lock().unwrap() += 1;
    }

    fn task_finished(&self) {
        let mut in_flight = self.in_flight.lock().unwrap();
        *in_flight -= 1;
        if *in_flight == 0 {
            self.all_done.notify_all();
        }
    }

    fn wait_until_settled(&self) {
        let mut in_flight = self.in_flight.lock().unwrap();
        while *in_flight > 0 {
            in_flight = self.all_done.wait(in_flight).unwrap();
        }
    }
}

struct StreamingShared {
    queue: ReadPairQueue,
    workflows: Vec<Mutex<LocusWorkflow>>,
    latch: TaskLatch,
    is_worker_failure: AtomicBool,
    first_failure: Mutex<Option<String>>,
}

impl StreamingShared {
    fn record_failure(&self, message: String) {
        self.is_worker_failure.store(true, Ordering::SeqCst);
        let mut first = self.first_failure.lock().unwrap();
        if first.is_none() {
            *first = Some(message);
        }
    }
}

/// Drain the queue of one locus to exhaustion on the current worker.
fn drain_locus_queue(shared: &StreamingShared, locus_index: usize) {
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        while let Some(job) = shared.queue.pop(locus_index) {
            if shared.is_worker_failure.load(Ordering::SeqCst) {
                continue;
            }
            let mut workflow = shared.workflows[locus_index].lock().unwrap();
            workflow.process(job.read, job.mate, job.region_kind, job.input_mode);
        }
    }));
    if let Err(panic) = outcome {
        let message = panic
            .downcast_ref::<String>()
            .cloned()
            .or_else(|| panic.downcast_ref::<&str>().map(|s| s.to_string()))
            .unwrap_or_else(|| "unknown panic".to_string());
        shared.record_failure(format!(
            "worker failed while processing locus index {locus_index}: {message}"
        ));
    }
    shared.latch.task_finished();
}

/// Run the whole-sample analysis in streaming mode.
pub fn run_streaming(
    archive: &Path,
    reference_path: Option<&Path>,
    contig_info: &ContigInfo,
    loci: &[Arc<LocusSpec>],
    heuristics: &HeuristicParams,
    sex: Sex,
    params: &StreamingParams,
) -> Result<Vec<LocusFindings>> {
    let pool = rayon::ThreadPoolBuilder::new().num_threads(params.threads).build()?;

    info!("Initializing {} locus workflows", loci.len());
    let workflows: Vec<Mutex<LocusWorkflow>> = pool.install(|| {
        loci.par_iter()
            .map(|spec| Mutex::new(LocusWorkflow::new(Arc::clone(spec), heuristics)))
            .collect()
    });

    let mut mask = GenomeMask::new();
    for locus in loci.iter() {
        for region in locus.target_regions.iter().chain(&locus.offtarget_regions) {
            mask.add_region(region.contig_index, region.start, region.end);
        }
    }
    let finder = WorkflowFinder::new(loci);

    let max_active_queues = params.threads + params.queue_headroom;
    let shared = Arc::new(StreamingShared {
        queue: ReadPairQueue::new(max_active_queues, loci.len()),
        workflows,
        latch: TaskLatch::default(),
        is_worker_failure: AtomicBool::new(false),
        first_failure: Mutex::new(None),
    });

    info!("Streaming reads from {}", archive.display());
    let mut streamer =
        HtsStreamer::new(archive, reference_path, contig_info, heuristics.quality_cutoff)?;
    let mut unpaired_reads: HashMap<String, MappedRead> = HashMap::new();

    while let Some(read) = streamer.next_primary()? {
        if shared.is_worker_failure.load(Ordering::SeqCst) {
            break;
        }

        let is_read_near_target = mask.query(read.contig_index(), read.pos());
        let is_mate_near_target = mask.query(read.mate_contig_index(), read.mate_pos());
        if !is_read_near_target && !is_mate_near_target {
            continue;
        }
        if !read.is_paired() {
            continue;
        }

        let Some(mate) = unpaired_reads.remove(read.fragment_id()) else {
            unpaired_reads.insert(read.fragment_id().to_string(), read);
            continue;
        };

        let bundles = finder.query_pair(
            read.contig_index(),
            read.pos(),
            read.approximate_end(),
            mate.contig_index(),
            mate.pos(),
            mate.approximate_end(),
        );
        for bundle in bundles {
            let job = PairJob {
                region_kind: bundle.region_kind,
                input_mode: bundle.input_mode,
                read: read.clone(),
                mate: Some(mate.clone()),
            };
            if shared.queue.insert(bundle.locus_index, job) {
                shared.latch.task_started();
                let shared = Arc::clone(&shared);
                pool.spawn(move || drain_locus_queue(&shared, bundle.locus_index));
            }
        }
    }

    shared.latch.wait_until_settled();
    if shared.is_worker_failure.load(Ordering::SeqCst) {
        let message = shared.first_failure.lock().unwrap().take();
        bail!(crate::error::Error::WorkerFailure(
            message.unwrap_or_else(|| "unknown worker failure".to_string())
        ));
    }

    info!("Analyzing read evidence");
    let findings: Result<Vec<LocusFindings>, crate::error::Error> = pool.install(|| {
        shared
            .workflows
            .par_iter()
            .map(|workflow| workflow.lock().unwrap().finalize(sex))
            .collect()
    });
    Ok(findings?)
}
