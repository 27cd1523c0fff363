//! Job queue and checkpoint progress tracking
//!
//! This module handles:
//! - The shared FIFO of jobs the workers pull from
//! - Tracking settled job indices as they complete out of order
//! - Advancing the checkpoint to the highest contiguous completed index

use crate::checkpoint::{CheckpointMeta, CheckpointStore};
use crate::model::CrawlJob;
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

/// A job together with its position in the batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedJob {
    pub index: usize,
    pub job: CrawlJob,
}

/// Shared FIFO queue of jobs
#[derive(Debug, Default)]
pub struct JobQueue {
    jobs: Mutex<VecDeque<QueuedJob>>,
}

impl JobQueue {
    /// Enqueues `jobs[start..]`, keeping their batch indices
    pub fn from_batch(jobs: &[CrawlJob], start: usize) -> Self {
        let queued = jobs
            .iter()
            .enumerate()
            .skip(start)
            .map(|(index, job)| QueuedJob {
                index,
                job: job.clone(),
            })
            .collect();

        Self {
            jobs: Mutex::new(queued),
        }
    }

    /// Takes the next job, or `None` once the queue is drained
    pub async fn pop(&self) -> Option<QueuedJob> {
        self.jobs.lock().await.pop_front()
    }

    pub async fn len(&self) -> usize {
        self.jobs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.lock().await.is_empty()
    }
}

/// Tracks which jobs have committed and persists the contiguous prefix
///
/// Jobs complete in any order. The checkpoint only ever points at an index
/// whose every predecessor has committed, so resuming skips nothing. A
/// failed job is never settled and holds the checkpoint behind it.
pub struct ProgressTracker {
    batch_id: String,
    checkpoints: Arc<dyn CheckpointStore>,
    next_expected: usize,
    completed: BTreeSet<usize>,
    settled: usize,
    scheduled: usize,
    started: Instant,
}

impl ProgressTracker {
    /// Creates a tracker for a batch resuming at `start`
    pub fn new(
        batch_id: impl Into<String>,
        start: usize,
        scheduled: usize,
        checkpoints: Arc<dyn CheckpointStore>,
    ) -> Self {
        Self {
            batch_id: batch_id.into(),
            checkpoints,
            next_expected: start,
            completed: BTreeSet::new(),
            settled: 0,
            scheduled,
            started: Instant::now(),
        }
    }

    /// Records a committed job
    ///
    /// # Returns
    ///
    /// The new checkpoint index when the contiguous prefix grew
    pub fn complete(&mut self, index: usize, meta: CheckpointMeta) -> Option<usize> {
        self.completed.insert(index);
        self.record_settled();

        let mut advanced = None;
        while self.completed.remove(&self.next_expected) {
            advanced = Some(self.next_expected);
            self.next_expected += 1;
        }

        let index = advanced?;
        if let Err(e) = self.checkpoints.save(&self.batch_id, index, meta) {
            tracing::warn!("Failed to save checkpoint at index {}: {}", index, e);
        }
        Some(index)
    }

    /// Records a job that failed; it stays unsettled for the checkpoint
    pub fn fail(&mut self, index: usize) {
        tracing::debug!("Job {} failed, checkpoint held at {:?}", index, self.checkpoint_index());
        self.record_settled();
    }

    /// Last index covered by the checkpoint, if any job has advanced it
    pub fn checkpoint_index(&self) -> Option<usize> {
        self.next_expected.checked_sub(1)
    }

    /// Index the next run would resume from
    pub fn resume_index(&self) -> usize {
        self.next_expected
    }

    fn record_settled(&mut self) {
        self.settled += 1;

        // Progress reporting every 10 settled jobs
        if self.settled % 10 == 0 {
            let elapsed = self.started.elapsed();
            let rate = self.settled as f64 / elapsed.as_secs_f64().max(f64::EPSILON);
            tracing::info!(
                "Progress: {} / {} jobs settled, {:.2} jobs/sec",
                self.settled,
                self.scheduled,
                rate
            );
        }
    }
}
