//! Generation swap coordinator.
//!
//! Runs rebuild cycles one at a time:
//!
//! ```text
//! Idle → Rebuilding → Swapping → CleaningUp → Idle
//! ```
//!
//! Rebuilding writes the staging generation of the store and the search
//! indices and waits for every indexing job. Swapping promotes the store, then
//! search. CleaningUp empties the generation that just stopped serving.
//! Cancellation is honored before Swapping and during CleaningUp, never in
//! between.

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use futures::{StreamExt, stream};
use tokio::{
  sync::{mpsc, watch},
  task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
  handle::CoordinatorHandle,
  message::{CoordinatorPhase, CoordinatorStatus, CycleOutcome, CycleReport, TriggerReason},
  tracker::{JobTracker, TrackerError},
};
use crate::{
  config::SearchConfig,
  domain::{content::ContentKind, generation::Generation},
  ingest::{IngestionError, RecordSource},
  search::{IndexKey, SearchManager, plan_documents},
  store::{CatalogStore, StoreError},
};

#[derive(Debug, thiserror::Error)]
pub enum RebuildError {
  #[error("Ingestion failed: {0}")]
  Ingestion(#[from] IngestionError),
  #[error("Store write failed: {0}")]
  Store(#[from] StoreError),
  #[error(transparent)]
  Tracker(#[from] TrackerError),
  #[error("Rebuild cancelled")]
  Cancelled,
}

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
  /// Indices populated concurrently
  pub index_concurrency: usize,
  pub poll_interval: Duration,
  pub index_timeout: Duration,
}

impl CoordinatorConfig {
  pub fn from_search_config(config: &SearchConfig) -> Self {
    Self {
      index_concurrency: config.index_concurrency.max(1),
      poll_interval: config.task_poll_interval(),
      index_timeout: config.index_timeout(),
    }
  }
}

pub struct Coordinator {
  store: CatalogStore,
  search: Arc<SearchManager>,
  source: Arc<dyn RecordSource>,
  config: CoordinatorConfig,
  status_tx: watch::Sender<CoordinatorStatus>,
}

impl Coordinator {
  /// Start the coordinator task. It stops when `cancel` fires or every
  /// handle is dropped.
  pub fn spawn(
    store: CatalogStore,
    search: Arc<SearchManager>,
    source: Arc<dyn RecordSource>,
    config: CoordinatorConfig,
    cancel: CancellationToken,
  ) -> (CoordinatorHandle, JoinHandle<()>) {
    // One slot: a second trigger while one is pending is coalesced
    let (trigger_tx, trigger_rx) = mpsc::channel(1);
    let (status_tx, status_rx) = watch::channel(CoordinatorStatus {
      phase: CoordinatorPhase::Idle,
      store_generation: store.current_generation(),
      search_generation: search.current_generation(),
      cycles_completed: 0,
      active: None,
      last_cycle: None,
    });

    let coordinator = Self {
      store,
      search,
      source,
      config,
      status_tx,
    };
    let task = tokio::spawn(coordinator.run(trigger_rx, cancel));

    (CoordinatorHandle::new(trigger_tx, status_rx), task)
  }

  async fn run(self, mut trigger_rx: mpsc::Receiver<TriggerReason>, cancel: CancellationToken) {
    info!(source = self.source.name(), "Coordinator started");

    loop {
      let reason = tokio::select! {
        biased;

        _ = cancel.cancelled() => {
          info!("Coordinator shutting down (cancelled)");
          break;
        }

        reason = trigger_rx.recv() => match reason {
          Some(reason) => reason,
          None => {
            debug!("All coordinator handles dropped");
            break;
          }
        },
      };

      let report = self.run_cycle(reason, &cancel).await;

      self.status_tx.send_modify(|status| {
        status.phase = CoordinatorPhase::Idle;
        status.cycles_completed += 1;
        status.active = None;
        status.last_cycle = Some(report);
      });
    }

    info!("Coordinator stopped");
  }

  /// Run one full cycle. Never fails: errors become an aborted report and
  /// the current generation keeps serving.
  pub(crate) async fn run_cycle(&self, reason: TriggerReason, cancel: &CancellationToken) -> CycleReport {
    let mut report = CycleReport::begin(reason);
    info!(cycle = %report.id, reason = reason.as_str(), "Rebuild cycle started");

    match self.rebuild_and_swap(&mut report, cancel).await {
      Ok(outcome) => report.outcome = outcome,
      Err(e) => {
        warn!(cycle = %report.id, err = %e, "Rebuild cycle aborted, current generation keeps serving");
        report.outcome = CycleOutcome::Aborted { reason: e.to_string() };
      }
    }

    report.finished_at = Some(Utc::now());
    info!(
      cycle = %report.id,
      outcome = ?report.outcome,
      records = report.records,
      documents = report.documents,
      jobs = report.jobs_submitted,
      failed_jobs = report.jobs_failed,
      elapsed_ms = report.elapsed_ms().unwrap_or_default(),
      "Rebuild cycle finished"
    );
    report
  }

  async fn rebuild_and_swap(
    &self,
    report: &mut CycleReport,
    cancel: &CancellationToken,
  ) -> Result<CycleOutcome, RebuildError> {
    self.status_tx.send_modify(|status| {
      status.phase = CoordinatorPhase::Rebuilding;
      status.active = Some(report.active());
    });

    // ------------------------------------------------------------------------
    // Rebuilding
    // ------------------------------------------------------------------------

    let batch = tokio::select! {
      biased;
      _ = cancel.cancelled() => return Err(RebuildError::Cancelled),
      batch = self.source.fetch() => batch?,
    };
    report.records = batch.len();

    // Store staging: truncate and reload in one transaction
    let store_target = {
      let mut tx = self.store.begin_write().await;
      let target = tx.staging_generation();
      for kind in ContentKind::ALL {
        tx.delete_all(target, kind)?;
      }
      for (kind, record) in batch.table_rows() {
        tx.insert(target, kind, record)?;
      }
      tx.commit();
      target
    };
    debug!(generation = %store_target, records = report.records, "Store staging generation loaded");

    // Search staging: drop whatever the last cycle left, then repopulate
    let search_target = self.search.staging_generation();
    let mut plan = plan_documents(&batch);
    drop(batch);
    report.documents = plan.values().map(Vec::len).sum();

    let failed_resets = tokio::select! {
      biased;
      _ = cancel.cancelled() => return Err(RebuildError::Cancelled),
      failed = self.reset_indices(search_target) => failed,
    };
    if !failed_resets.is_empty() {
      // A staging index that could not be reset may hold stale documents
      report.failed_indices.extend(failed_resets.iter().map(IndexKey::uid));
      plan.retain(|(kind, language), _| !failed_resets.contains(&IndexKey::new(search_target, *kind, *language)));
    }

    let population = stream::iter(plan)
      .map(|((kind, language), documents)| {
        let key = IndexKey::new(search_target, kind, language);
        async move { (key, self.search.populate(key, &documents).await) }
      })
      .buffer_unordered(self.config.index_concurrency)
      .collect::<Vec<_>>();

    let populated = tokio::select! {
      biased;
      _ = cancel.cancelled() => return Err(RebuildError::Cancelled),
      populated = population => populated,
    };

    let mut tracker = JobTracker::new(
      self.search.backend().clone(),
      self.config.poll_interval,
      self.config.index_timeout,
    );
    for (key, result) in populated {
      match result {
        Ok(jobs) => {
          report.jobs_submitted += jobs.len();
          tracker.track(jobs);
        }
        Err(e) => {
          warn!(index = %key, err = %e, "Index population failed");
          report.failed_indices.push(key.uid());
        }
      }
    }
    report.failed_indices.sort();

    let tracked = tracker.wait(cancel).await?;
    report.jobs_failed = tracked.failed;
    report.tracker_ticks = tracked.ticks;

    // ------------------------------------------------------------------------
    // Swapping (not cancellable)
    // ------------------------------------------------------------------------

    self.set_phase(CoordinatorPhase::Swapping);
    let degraded = !report.failed_indices.is_empty();

    let stale_store = self.store.promote(store_target).await;
    report.store_generation = Some(store_target);

    let stale_search = if degraded {
      warn!(
        failed = report.failed_indices.len(),
        serving = %self.search.current_generation(),
        "Search not promoted, previous generation keeps serving"
      );
      None
    } else {
      let previous = self.search.promote(search_target);
      report.search_generation = Some(search_target);
      Some(previous)
    };

    self.status_tx.send_modify(|status| {
      status.store_generation = self.store.current_generation();
      status.search_generation = self.search.current_generation();
    });

    // ------------------------------------------------------------------------
    // CleaningUp
    // ------------------------------------------------------------------------

    self.set_phase(CoordinatorPhase::CleaningUp);
    report.cleanup_failures = self.clean_up(stale_store, stale_search, cancel).await;

    Ok(if degraded { CycleOutcome::Degraded } else { CycleOutcome::Completed })
  }

  /// Delete every index of `generation`. Returns the indices that could not
  /// be deleted.
  async fn reset_indices(&self, generation: Generation) -> Vec<IndexKey> {
    let results: Vec<_> = stream::iter(IndexKey::all_in(generation))
      .map(|key| async move { (key, self.search.delete_index(key).await) })
      .buffer_unordered(self.config.index_concurrency)
      .collect()
      .await;

    results
      .into_iter()
      .filter_map(|(key, result)| match result {
        Ok(()) => None,
        Err(e) => {
          warn!(index = %key, err = %e, "Failed to reset staging index");
          Some(key)
        }
      })
      .collect()
  }

  /// Reclaim the generation that stopped serving. Returns how many steps
  /// failed. Cancellation abandons whatever is left.
  async fn clean_up(
    &self,
    stale_store: Generation,
    stale_search: Option<Generation>,
    cancel: &CancellationToken,
  ) -> usize {
    let mut failures = 0;

    if cancel.is_cancelled() {
      warn!("Cleanup abandoned before it started");
      return failures;
    }

    {
      let mut tx = self.store.begin_write().await;
      for kind in ContentKind::ALL {
        if let Err(e) = tx.delete_all(stale_store, kind) {
          warn!(generation = %stale_store, kind = %kind, err = %e, "Failed to truncate stale table");
          failures += 1;
        }
      }
      tx.commit();
    }

    let Some(stale_search) = stale_search else {
      debug!("Search cleanup skipped");
      return failures;
    };

    for key in IndexKey::all_in(stale_search) {
      if cancel.is_cancelled() {
        warn!(generation = %stale_search, "Cleanup abandoned, stale indices left behind");
        break;
      }
      if let Err(e) = self.search.delete_index(key).await {
        warn!(index = %key, err = %e, "Failed to delete stale index");
        failures += 1;
      }
    }

    debug!(store = %stale_store, search = %stale_search, failures, "Stale generation reclaimed");
    failures
  }

  fn set_phase(&self, phase: CoordinatorPhase) {
    self.status_tx.send_modify(|status| status.phase = phase);
  }
}
