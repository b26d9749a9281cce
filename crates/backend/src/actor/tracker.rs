//! Indexing job tracker.
//!
//! Collects the job handles of one rebuild cycle and polls the search service
//! until every job is terminal. A job that has been seen terminal is never
//! polled again; a job whose status query fails stays pending for the next tick.

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use futures::{StreamExt, stream};
use serde::{Deserialize, Serialize};
use tokio::time::{MissedTickBehavior, interval, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::search::{JobHandle, JobStatus, SearchBackend};

/// Concurrent status queries per tick.
const POLL_CONCURRENCY: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
  #[error("Indexing wait cancelled")]
  Cancelled,
  #[error("Timed out with {pending} indexing jobs still pending")]
  TimedOut { pending: usize },
}

/// Outcome of waiting on every tracked job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerReport {
  pub succeeded: usize,
  pub failed: usize,
  /// Poll ticks it took to see every job terminal
  pub ticks: u32,
}

pub struct JobTracker {
  backend: Arc<dyn SearchBackend>,
  jobs: BTreeMap<JobHandle, JobStatus>,
  poll_interval: Duration,
  timeout: Duration,
}

impl JobTracker {
  pub fn new(backend: Arc<dyn SearchBackend>, poll_interval: Duration, timeout: Duration) -> Self {
    Self {
      backend,
      jobs: BTreeMap::new(),
      poll_interval,
      timeout,
    }
  }

  /// Start tracking jobs. Already tracked jobs keep their observed status.
  pub fn track(&mut self, jobs: impl IntoIterator<Item = JobHandle>) {
    for job in jobs {
      self.jobs.entry(job).or_insert(JobStatus::Pending);
    }
  }

  pub fn len(&self) -> usize {
    self.jobs.len()
  }

  pub fn is_empty(&self) -> bool {
    self.jobs.is_empty()
  }

  pub fn pending(&self) -> usize {
    self.jobs.values().filter(|s| !s.is_terminal()).count()
  }

  /// True iff every tracked job is terminal. Vacuously true with no jobs.
  pub fn all_done(&self) -> bool {
    self.pending() == 0
  }

  pub fn status(&self, job: JobHandle) -> Option<&JobStatus> {
    self.jobs.get(&job)
  }

  /// Query every non-terminal job once. Returns how many became terminal.
  pub async fn poll_once(&mut self) -> usize {
    let pending: Vec<JobHandle> = self
      .jobs
      .iter()
      .filter(|(_, s)| !s.is_terminal())
      .map(|(job, _)| *job)
      .collect();

    let backend = &self.backend;
    let results: Vec<_> = stream::iter(pending)
      .map(|job| async move { (job, backend.job_status(job).await) })
      .buffer_unordered(POLL_CONCURRENCY)
      .collect()
      .await;

    let mut finished = 0;
    for (job, result) in results {
      match result {
        Ok(JobStatus::Pending) => {}
        Ok(status) => {
          if let JobStatus::Failed { reason } = &status {
            warn!(job = job.0, reason = %reason, "Indexing job failed");
          }
          self.jobs.insert(job, status);
          finished += 1;
        }
        Err(e) => {
          debug!(job = job.0, err = %e, "Job status query failed, will retry next tick");
        }
      }
    }
    finished
  }

  /// Poll until every job is terminal, the timeout expires, or `cancel` fires.
  ///
  /// With nothing pending this returns at once without polling.
  pub async fn wait(&mut self, cancel: &CancellationToken) -> Result<TrackerReport, TrackerError> {
    let mut ticks = 0u32;
    if self.all_done() {
      return Ok(self.report(ticks));
    }

    let deadline = sleep(self.timeout);
    tokio::pin!(deadline);

    let mut timer = interval(self.poll_interval);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // Skip the immediate tick
    timer.tick().await;

    loop {
      tokio::select! {
        biased;

        _ = cancel.cancelled() => {
          debug!(pending = self.pending(), "Job tracker cancelled");
          return Err(TrackerError::Cancelled);
        }

        _ = &mut deadline => {
          let pending = self.pending();
          warn!(pending, timeout_secs = self.timeout.as_secs(), "Indexing jobs timed out");
          return Err(TrackerError::TimedOut { pending });
        }

        _ = timer.tick() => {
          ticks += 1;
          let finished = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TrackerError::Cancelled),
            finished = self.poll_once() => finished,
          };
          trace!(tick = ticks, finished, pending = self.pending(), "Job tracker tick");

          if self.all_done() {
            break;
          }
        }
      }
    }

    let report = self.report(ticks);
    debug!(
      succeeded = report.succeeded,
      failed = report.failed,
      ticks,
      "All indexing jobs terminal"
    );
    Ok(report)
  }

  fn report(&self, ticks: u32) -> TrackerReport {
    let failed = self
      .jobs
      .values()
      .filter(|s| matches!(s, JobStatus::Failed { .. }))
      .count();
    TrackerReport {
      succeeded: self.jobs.len() - failed - self.pending(),
      failed,
      ticks,
    }
  }
}
