//! Trigger coalescing tests.

use std::{sync::Arc, time::Duration};

use tokio_util::sync::CancellationToken;

use super::helpers::*;
use crate::{
  actor::{
    Coordinator,
    message::{CoordinatorPhase, CycleOutcome, TriggerOutcome, TriggerReason},
  },
  ingest::StaticSource,
  search::{MemorySearchBackend, SearchManager},
  store::CatalogStore,
};

#[tokio::test]
async fn test_triggers_during_rebuild_coalesce_into_one_cycle() {
  let ctx = CatalogTestContext::start(
    ScriptedSource::gated(equipment_batch(&[(1, "Sword")])),
    FaultyBackend::new(),
    250,
    test_config(),
  );

  assert_eq!(ctx.handle.trigger(TriggerReason::Startup), TriggerOutcome::Queued);
  let status = tokio::time::timeout(TEST_TIMEOUT, ctx.handle.wait_for_phase(CoordinatorPhase::Rebuilding))
    .await
    .unwrap();
  assert_eq!(status.active.unwrap().reason, TriggerReason::Startup);
  while ctx.source.fetches() == 0 {
    tokio::time::sleep(Duration::from_millis(5)).await;
  }

  // First cycle is blocked in ingestion; the slot takes one follow-up
  assert_eq!(ctx.handle.trigger(TriggerReason::Operator), TriggerOutcome::Queued);
  assert_eq!(ctx.handle.trigger(TriggerReason::Scheduled), TriggerOutcome::Coalesced);
  assert_eq!(ctx.handle.trigger(TriggerReason::Operator), TriggerOutcome::Coalesced);

  ctx.source.release(2);
  let second = ctx.wait_for_cycles(2).await;
  assert_eq!(second.reason, TriggerReason::Operator);
  assert_eq!(second.outcome, CycleOutcome::Completed);

  // No third cycle follows
  tokio::time::sleep(Duration::from_millis(100)).await;
  let status = ctx.handle.status();
  assert_eq!(status.cycles_completed, 2);
  assert_eq!(status.phase, CoordinatorPhase::Idle);
  assert!(status.active.is_none());
  assert_eq!(ctx.source.fetches(), 2);
}

#[tokio::test]
async fn test_trigger_after_shutdown_reports_stopped() {
  let cancel = CancellationToken::new();
  let (handle, task) = Coordinator::spawn(
    CatalogStore::new(),
    Arc::new(SearchManager::new(Arc::new(MemorySearchBackend::new()), 250)),
    Arc::new(StaticSource::default()),
    test_config(),
    cancel.clone(),
  );

  cancel.cancel();
  task.await.unwrap();

  assert_eq!(handle.trigger(TriggerReason::Operator), TriggerOutcome::Stopped);
  assert_eq!(handle.status().cycles_completed, 0);
}

#[tokio::test]
async fn test_cycle_reports_are_published() {
  let ctx = CatalogTestContext::new(equipment_batch(&[(1, "Sword"), (2, "Shield")]));

  let report = ctx.rebuild().await;
  assert_eq!(report.reason, TriggerReason::Operator);
  assert_eq!(report.records, 2);
  assert_eq!(report.documents, 4);
  assert!(report.finished_at.is_some());
  assert!(report.elapsed_ms().unwrap() >= 0);

  let status = ctx.handle.status();
  assert_eq!(status.cycles_completed, 1);
  assert_eq!(status.last_cycle.unwrap().id, report.id);
}
