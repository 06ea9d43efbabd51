//! # Per-locus read-pair queues
//!
//! Streaming mode serialises work per locus: each locus has a FIFO of pair
//! jobs and an active flag. A queue that goes from empty to non-empty is
//! "activated" and a drain task is spawned for it; the task pops jobs until
//! the queue runs dry, then deactivates it. A global cap on the number of
//! active queues backpressures the producer through a condition variable.
//! Because a queue is only ever drained by the task that activated it, at
//! most one worker touches a given locus at any instant.
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

use crate::reads::MappedRead;
use crate::workflow::{InputMode, RegionKind};

pub struct PairJob {
    pub region_kind: RegionKind,
    pub input_mode: InputMode,
    pub read: MappedRead,
    pub mate: Option<MappedRead>,
}

#[derive(Default)]
struct LocusQueue {
    jobs: VecDeque<PairJob>,
    /// True while a drain task is scheduled or running for this locus.
    is_active: bool,
}

pub struct ReadPairQueue {
    max_active_queues: usize,
    active_queues: Mutex<usize>,
    queue_released: Condvar,
    queues: Vec<Mutex<LocusQueue>>,
}

impl ReadPairQueue {
    pub fn new(max_active_queues: usize, locus_count: usize) -> Self {
        assert!(max_active_queues > 0);
        ReadPairQueue {
            max_active_queues,
            active_queues: Mutex::new(0),
            queue_released: Condvar::new(),
            queues: (0..locus_count).map(|_| Mutex::new(LocusQueue::default())).collect(),
        }
    }

    /// Enqueue a job for a locus, blocking while the active-queue cap is
    /// reached. Returns true when the queue was inactive, i.e. the caller
    /// must spawn a drain task for it.
    pub fn insert(&self, locus_index: usize, job: PairJob) -> bool {
        let mut locus_queue = self.queues[locus_index].lock().unwrap();
        let was_inactive = !locus_queue.is_active;
        if was_inactive {
            let mut active = self.active_queues.lock().unwrap();
            while *active >= self.max_active_queues {
                active = self.queue_released.wait(active).unwrap();
            }
            *active += 1;
            drop(active);
            locus_queue.is_active = true;
        }
        locus_queue.jobs.push_back(job);
        was_inactive
    }

    /// Pop the next job for a locus. An empty queue is deactivated and the
    /// producer woken; the caller must then stop draining this locus.
    pub fn pop(&self, locus_index: usize) -> Option<PairJob> {
        let mut locus_queue = self.queues[locus_index].lock().unwrap();
        match locus_queue.jobs.pop_front() {
            Some(job) => Some(job),
            None => {
                {
                    let mut active = self.active_queues.lock().unwrap();
                    *active -= 1;
                }
                locus_queue.is_active = false;
                drop(locus_queue);
                self.queue_released.notify_one();
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reads::{MateNumber, Read, ReadId};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn job(tag: &str) -> PairJob {
        let id = ReadId::new(tag.to_string(), MateNumber::First);
        let read = Read::new(id, b"ACGT".to_vec(), false);
        PairJob {
            region_kind: RegionKind::Target,
            input_mode: InputMode::Both,
            read: MappedRead::new(read, 0, 100, 60, 0, 300, true, true, true),
            mate: None,
        }
    }

    #[test]
    fn first_insert_activates_a_queue() {
        let queue = ReadPairQueue::new(4, 2);
        assert!(queue.insert(0, job("a")));
        assert!(!queue.insert(0, job("b")));
        assert!(queue.insert(1, job("c")));
    }

    #[test]
    fn jobs_pop_in_fifo_order_and_drain_deactivates() {
        let queue = ReadPairQueue::new(4, 1);
        queue.insert(0, job("a"));
        queue.insert(0, job("b"));

        assert_eq!("a", queue.pop(0).unwrap().read.fragment_id());
        assert_eq!("b", queue.pop(0).unwrap().read.fragment_id());
        assert!(queue.pop(0).is_none());

        // drained queue must be re-activated by the next insert
        assert!(queue.insert(0, job("c")));
    }

    #[test]
    fn at_most_one_worker_drains_a_locus() {
        use std::sync::atomic::AtomicBool;

        let num_loci = 4;
        let queue = Arc::new(ReadPairQueue::new(num_loci + 2, num_loci));
        // One in-use sentinel per locus; a drain task trips the assertion if
        // another task is already inside the same locus.
        let in_use: Arc<Vec<AtomicBool>> =
            Arc::new((0..num_loci).map(|_| AtomicBool::new(false)).collect());
        let processed = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        let mut enqueued = 0;
        for round in 0..50 {
            for locus_index in 0..num_loci {
                let was_inactive =
                    queue.insert(locus_index, job(&format!("r{round}l{locus_index}")));
                enqueued += 1;
                if was_inactive {
                    let queue = Arc::clone(&queue);
                    let in_use = Arc::clone(&in_use);
                    let processed = Arc::clone(&processed);
                    handles.push(std::thread::spawn(move || {
                        while let Some(_job) = queue.pop(locus_index) {
                            let was_busy = in_use[locus_index].swap(true, Ordering::SeqCst);
                            assert!(!was_busy, "two workers entered locus {locus_index}");
                            std::thread::yield_now();
                            in_use[locus_index].store(false, Ordering::SeqCst);
                            processed.fetch_add(1, Ordering::SeqCst);
                        }
                    }));
                }
            }
        }

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(enqueued, processed.load(Ordering::SeqCst));
    }

    #[test]
    fn active_queue_cap_blocks_the_producer_until_a_drain() {
        let queue = Arc::new(ReadPairQueue::new(1, 2));
        queue.insert(0, job("a"));

        let blocked = Arc::new(AtomicUsize::new(0));
        let producer = {
            let queue = Arc::clone(&queue);
            let blocked = Arc::clone(&blocked);
            std::thread::spawn(move || {
                blocked.store(1, Ordering::SeqCst);
                // blocks until queue 0 is drained
                queue.insert(1, job("b"));
                blocked.store(2, Ordering::SeqCst);
            })
        };

        while blocked.load(Ordering::SeqCst) == 0 {
            std::thread::yield_now();
        }
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert_eq!(1, blocked.load(Ordering::SeqCst), "producer should be blocked on the cap");

        queue.pop(0);
        queue.pop(0);
        producer.join().unwrap();
        assert_eq!(2, blocked.load(Ordering::SeqCst));
        assert_eq!("b", queue.pop(1).unwrap().read.fragment_id());
    }
}
