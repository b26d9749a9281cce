use std::{
  path::PathBuf,
  time::{Duration, SystemTime},
};

use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::{
  handle::CoordinatorHandle,
  message::{TriggerOutcome, TriggerReason},
};
use crate::domain::config::{DaemonConfig, RebuildConfig};

/// Prefix of the daemon's rolling log files.
pub const LOG_FILE_PREFIX: &str = "encyclo.log";

/// Scheduler configuration.
///
/// References the rebuild and daemon config sections directly instead of
/// duplicating values.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
  /// Scheduled rebuild settings
  pub rebuild: RebuildConfig,
  /// Daemon lifecycle settings (log retention)
  pub daemon: DaemonConfig,
  /// Directory holding rolling log files
  pub log_dir: PathBuf,
}

/// Background task scheduler for daemon operations.
///
/// Handles:
/// - Scheduled rebuild triggers (`rebuild.interval_secs`, 0 disables)
/// - Log file retention
pub struct Scheduler {
  coordinator: CoordinatorHandle,
  config: SchedulerConfig,
}

impl Scheduler {
  pub fn new(coordinator: CoordinatorHandle, config: SchedulerConfig) -> Self {
    Self { coordinator, config }
  }

  /// Run the scheduler until cancelled.
  pub async fn run(self, cancel: CancellationToken) {
    let rebuild_enabled = self.config.rebuild.interval_secs > 0;
    let rebuild_interval = Duration::from_secs(self.config.rebuild.interval_secs.max(1));
    let log_cleanup_interval = Duration::from_secs(24 * 3600); // Once per day

    let mut rebuild_timer = interval(rebuild_interval);
    let mut log_cleanup_timer = interval(log_cleanup_interval);
    rebuild_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // Skip the immediate ticks
    rebuild_timer.tick().await;
    log_cleanup_timer.tick().await;

    // Run log cleanup once at startup if retention is enabled
    if self.config.daemon.log_retention_days > 0 {
      let deleted = self.cleanup_old_logs();
      if deleted > 0 {
        info!("Cleaned up {} old log files at startup", deleted);
      }
    }

    info!(
      rebuild_interval_secs = ?rebuild_enabled.then_some(rebuild_interval.as_secs()),
      "Scheduler started"
    );

    loop {
      tokio::select! {
          biased;

          _ = cancel.cancelled() => {
              info!("Scheduler shutting down (cancelled)");
              break;
          }

          _ = rebuild_timer.tick(), if rebuild_enabled => {
              self.trigger_rebuild();
          }

          _ = log_cleanup_timer.tick() => {
              if self.config.daemon.log_retention_days > 0 {
                  let deleted = self.cleanup_old_logs();
                  if deleted > 0 {
                      info!("Cleaned up {} old log files", deleted);
                  }
              }
          }
      }
    }

    info!("Scheduler stopped");
  }

  fn trigger_rebuild(&self) {
    match self.coordinator.trigger(TriggerReason::Scheduled) {
      TriggerOutcome::Queued => info!("Scheduled rebuild queued"),
      TriggerOutcome::Coalesced => debug!("Scheduled rebuild coalesced with a pending trigger"),
      TriggerOutcome::Stopped => warn!("Scheduled rebuild dropped, coordinator stopped"),
    }
  }

  /// Delete log files older than the retention period.
  fn cleanup_old_logs(&self) -> usize {
    let retention_secs = self.config.daemon.log_retention_days * 24 * 3600;
    let now = SystemTime::now();
    let log_dir = &self.config.log_dir;
    let mut deleted = 0;

    let entries = match std::fs::read_dir(log_dir) {
      Ok(e) => e,
      Err(e) => {
        trace!("Log directory {:?} not readable: {}", log_dir, e);
        return 0;
      }
    };

    for entry in entries.flatten() {
      let path = entry.path();
      if path.is_dir() {
        continue;
      }

      let is_log = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| name.starts_with(LOG_FILE_PREFIX));
      if !is_log {
        continue;
      }

      let age = entry
        .metadata()
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| now.duration_since(modified).ok());
      let Some(age) = age else {
        continue;
      };

      if age.as_secs() > retention_secs {
        if let Err(e) = std::fs::remove_file(&path) {
          warn!("Failed to delete old log file {:?}: {}", path, e);
        } else {
          debug!("Deleted old log file: {:?}", path);
          deleted += 1;
        }
      }
    }

    deleted
  }
}

#[cfg(test)]
mod tests {
  use std::{fs::File, sync::Arc};

  use tempfile::TempDir;

  use super::*;
  use crate::{
    actor::{Coordinator, CoordinatorConfig},
    ingest::StaticSource,
    search::{MemorySearchBackend, SearchManager},
    store::CatalogStore,
  };

  fn idle_coordinator(cancel: &CancellationToken) -> CoordinatorHandle {
    let search = Arc::new(SearchManager::new(Arc::new(MemorySearchBackend::new()), 250));
    let (handle, _) = Coordinator::spawn(
      CatalogStore::new(),
      search,
      Arc::new(StaticSource::default()),
      CoordinatorConfig {
        index_concurrency: 2,
        poll_interval: Duration::from_millis(10),
        index_timeout: Duration::from_secs(5),
      },
      cancel.clone(),
    );
    handle
  }

  #[tokio::test]
  async fn test_cleanup_old_logs_respects_retention() {
    let dir = TempDir::new().unwrap();
    let old = dir.path().join("encyclo.log.2020-01-01");
    let fresh = dir.path().join("encyclo.log.2099-01-01");
    let other = dir.path().join("notes.txt");
    for path in [&old, &fresh, &other] {
      std::fs::write(path, "x").unwrap();
    }
    let ten_days_ago = SystemTime::now() - Duration::from_secs(10 * 24 * 3600);
    for path in [&old, &other] {
      File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(ten_days_ago)
        .unwrap();
    }

    let cancel = CancellationToken::new();
    let scheduler = Scheduler::new(
      idle_coordinator(&cancel),
      SchedulerConfig {
        rebuild: RebuildConfig::default(),
        daemon: DaemonConfig::default(),
        log_dir: dir.path().to_path_buf(),
      },
    );

    assert_eq!(scheduler.cleanup_old_logs(), 1);
    assert!(!old.exists());
    assert!(fresh.exists());
    assert!(other.exists());
    cancel.cancel();
  }

  #[tokio::test]
  async fn test_scheduled_trigger_runs_cycles() {
    let cancel = CancellationToken::new();
    let handle = idle_coordinator(&cancel);
    let scheduler = Scheduler::new(
      handle.clone(),
      SchedulerConfig {
        rebuild: RebuildConfig {
          on_startup: false,
          interval_secs: 1,
        },
        daemon: DaemonConfig {
          log_retention_days: 0,
          ..Default::default()
        },
        log_dir: PathBuf::from("/nonexistent"),
      },
    );
    let task = tokio::spawn(scheduler.run(cancel.clone()));

    let status = tokio::time::timeout(Duration::from_secs(5), handle.wait_for_cycles(1))
      .await
      .unwrap();
    assert_eq!(status.last_cycle.unwrap().reason, TriggerReason::Scheduled);

    cancel.cancel();
    task.await.unwrap();
  }
}
