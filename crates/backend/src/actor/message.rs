//! Message and status types exchanged with the coordinator.
//!
//! Triggers flow in through a single-slot channel; status flows out through a
//! `watch` channel so readers always see the latest value without queuing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::generation::Generation;

// ============================================================================
// Triggers
// ============================================================================

/// Why a rebuild cycle was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerReason {
  /// Process startup
  Startup,
  /// Periodic schedule
  Scheduled,
  /// Release hook or operator request over IPC
  Operator,
}

impl TriggerReason {
  pub fn as_str(self) -> &'static str {
    match self {
      TriggerReason::Startup => "startup",
      TriggerReason::Scheduled => "scheduled",
      TriggerReason::Operator => "operator",
    }
  }
}

/// What happened to a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerOutcome {
  /// Stored in the empty slot; a cycle will run for it
  Queued,
  /// A trigger was already pending; this one was folded into it
  Coalesced,
  /// The coordinator is no longer running
  Stopped,
}

// ============================================================================
// Status
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinatorPhase {
  Idle,
  Rebuilding,
  Swapping,
  CleaningUp,
}

/// The cycle currently in progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveCycle {
  pub id: Uuid,
  pub reason: TriggerReason,
  pub started_at: DateTime<Utc>,
}

#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorStatus {
  pub phase: CoordinatorPhase,
  pub store_generation: Generation,
  pub search_generation: Generation,
  pub cycles_completed: u64,
  pub active: Option<ActiveCycle>,
  pub last_cycle: Option<CycleReport>,
}

// ============================================================================
// Cycle reports
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CycleOutcome {
  /// Both subsystems promoted and the stale generation reclaimed
  Completed,
  /// Store promoted; search kept serving its previous generation
  Degraded,
  /// Nothing promoted; the current generation keeps serving
  Aborted { reason: String },
}

/// Summary of one rebuild cycle.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReport {
  pub id: Uuid,
  pub reason: TriggerReason,
  pub started_at: DateTime<Utc>,
  pub finished_at: Option<DateTime<Utc>>,
  /// Records in the ingested batch
  pub records: usize,
  /// Search documents across every language
  pub documents: usize,
  /// Generation the store was promoted to, if it was
  pub store_generation: Option<Generation>,
  /// Generation search was promoted to, if it was
  pub search_generation: Option<Generation>,
  pub failed_indices: Vec<String>,
  pub jobs_submitted: usize,
  pub jobs_failed: usize,
  pub tracker_ticks: u32,
  pub cleanup_failures: usize,
  pub outcome: CycleOutcome,
}

impl CycleReport {
  pub fn begin(reason: TriggerReason) -> Self {
    Self {
      id: Uuid::now_v7(),
      reason,
      started_at: Utc::now(),
      finished_at: None,
      records: 0,
      documents: 0,
      store_generation: None,
      search_generation: None,
      failed_indices: Vec::new(),
      jobs_submitted: 0,
      jobs_failed: 0,
      tracker_ticks: 0,
      cleanup_failures: 0,
      outcome: CycleOutcome::Aborted {
        reason: "cycle did not finish".to_string(),
      },
    }
  }

  pub fn active(&self) -> ActiveCycle {
    ActiveCycle {
      id: self.id,
      reason: self.reason,
      started_at: self.started_at,
    }
  }

  pub fn elapsed_ms(&self) -> Option<i64> {
    self
      .finished_at
      .map(|end| (end - self.started_at).num_milliseconds())
  }
}
