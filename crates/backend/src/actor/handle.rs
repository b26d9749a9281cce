//! Handle for talking to the coordinator task.
//!
//! The handle is cheap to clone. Triggers go through a channel with a single
//! slot, so any number of triggers received while a cycle is running collapse
//! into one follow-up cycle.

use tokio::sync::{mpsc, watch};

use super::message::{CoordinatorPhase, CoordinatorStatus, TriggerOutcome, TriggerReason};

#[derive(Clone, Debug)]
pub struct CoordinatorHandle {
  trigger_tx: mpsc::Sender<TriggerReason>,
  status_rx: watch::Receiver<CoordinatorStatus>,
}

impl CoordinatorHandle {
  pub(super) fn new(trigger_tx: mpsc::Sender<TriggerReason>, status_rx: watch::Receiver<CoordinatorStatus>) -> Self {
    Self { trigger_tx, status_rx }
  }

  /// Request a rebuild cycle. Never waits.
  pub fn trigger(&self, reason: TriggerReason) -> TriggerOutcome {
    match self.trigger_tx.try_send(reason) {
      Ok(()) => TriggerOutcome::Queued,
      Err(mpsc::error::TrySendError::Full(_)) => TriggerOutcome::Coalesced,
      Err(mpsc::error::TrySendError::Closed(_)) => TriggerOutcome::Stopped,
    }
  }

  /// Latest coordinator status.
  pub fn status(&self) -> CoordinatorStatus {
    self.status_rx.borrow().clone()
  }

  /// Wait until at least `count` cycles have finished (in any outcome).
  pub async fn wait_for_cycles(&self, count: u64) -> CoordinatorStatus {
    self.wait_until(|s| s.cycles_completed >= count).await
  }

  /// Wait until the coordinator enters `phase`.
  pub async fn wait_for_phase(&self, phase: CoordinatorPhase) -> CoordinatorStatus {
    self.wait_until(|s| s.phase == phase).await
  }

  async fn wait_until(&self, predicate: impl FnMut(&CoordinatorStatus) -> bool) -> CoordinatorStatus {
    let mut rx = self.status_rx.clone();
    if let Ok(status) = rx.wait_for(predicate).await {
      return status.clone();
    }
    // Coordinator gone; report the last status it published
    rx.borrow().clone()
  }
}
