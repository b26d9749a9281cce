//! Search population and job tracking tests.

use std::{sync::Arc, time::Duration};

use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

use super::helpers::*;
use crate::{
  actor::{CoordinatorConfig, JobTracker, TrackerError, message::CycleOutcome},
  domain::{
    content::{ContentKind, Language},
    generation::Generation,
    record::{ItemCategory, RecordBatch},
  },
  search::{IndexKey, SearchBackend, SearchDocument, SearchQuery},
};

fn doc(id: i64) -> SearchDocument {
  SearchDocument {
    id,
    name: format!("Doc {}", id),
    description: None,
    super_type: None,
    type_name: None,
    level: None,
    family_name: None,
    image_url: None,
  }
}

// ============================================================================
// Population
// ============================================================================

#[tokio::test]
async fn test_missing_language_creates_no_index() {
  let batch = RecordBatch {
    items: vec![
      item(
        1,
        ItemCategory::QuestItem,
        &[(Language::En, "Almanax Offering"), (Language::Fr, "Offrande Almanax")],
      ),
      item(2, ItemCategory::QuestItem, &[(Language::Es, "Ofrenda")]),
    ],
    ..Default::default()
  };
  let ctx = CatalogTestContext::new(batch);

  let report = ctx.rebuild().await;
  assert_eq!(report.outcome, CycleOutcome::Completed);
  assert!(report.failed_indices.is_empty());

  let uids = ctx.backend.index_uids();
  for language in [Language::En, Language::Fr, Language::Es] {
    assert!(uids.contains(&format!("a-quest_items-{}", language)));
  }
  assert!(!uids.contains(&"a-quest_items-pt".to_string()));

  let hits = ctx
    .search
    .search(ContentKind::QuestItems, Language::Pt, &SearchQuery::text("almanax"))
    .await
    .unwrap();
  assert!(hits.is_empty());
}

#[tokio::test]
async fn test_documents_submitted_in_fixed_batches() {
  let items = (1..=10_000)
    .map(|id| {
      item(
        id,
        ItemCategory::Resource,
        &[(Language::En, "Ore"), (Language::Fr, "Minerai")],
      )
    })
    .collect();
  let ctx = CatalogTestContext::new(RecordBatch {
    items,
    ..Default::default()
  });

  let report = ctx.rebuild().await;
  assert_eq!(report.outcome, CycleOutcome::Completed);

  for uid in ["a-resources-en", "a-resources-fr", "a-all_items-en", "a-all_items-fr"] {
    assert_eq!(ctx.backend.add_calls(uid), 40, "{}", uid);
    assert_eq!(ctx.backend.document_count(uid), 10_000, "{}", uid);
  }
  assert_eq!(ctx.backend.total_add_calls(), 160);
  assert_eq!(report.jobs_submitted, 160);
  assert_eq!(report.documents, 40_000);
}

#[tokio::test]
async fn test_empty_batch_completes_without_polling() {
  let ctx = CatalogTestContext::new(RecordBatch::default());

  let report = ctx.rebuild().await;
  assert_eq!(report.outcome, CycleOutcome::Completed);
  assert_eq!(report.jobs_submitted, 0);
  assert_eq!(report.tracker_ticks, 0);
  assert_eq!(ctx.backend.status_calls(), 0);
  assert!(ctx.backend.index_uids().is_empty());
  assert_eq!(ctx.store.current_generation(), Generation::A);
}

#[tokio::test]
async fn test_tracker_waits_for_pending_jobs() {
  let ctx = CatalogTestContext::start(
    ScriptedSource::new(equipment_batch(&[(1, "Sword"), (2, "Shield")])),
    FaultyBackend::new().with_pending_polls(2),
    250,
    test_config(),
  );

  let report = ctx.rebuild().await;
  assert_eq!(report.outcome, CycleOutcome::Completed);
  // equipment-en and all_items-en, one batch each
  assert_eq!(report.jobs_submitted, 2);
  assert_eq!(report.tracker_ticks, 3);
  assert_eq!(ctx.backend.status_calls(), 6);
}

#[tokio::test]
async fn test_failed_jobs_are_counted_not_fatal() {
  let ctx = CatalogTestContext::start(
    ScriptedSource::new(equipment_batch(&[(1, "Sword")])),
    FaultyBackend::new().with_failing_jobs(),
    250,
    test_config(),
  );

  let report = ctx.rebuild().await;
  assert_eq!(report.outcome, CycleOutcome::Completed);
  assert_eq!(report.jobs_failed, report.jobs_submitted);
  assert_eq!(report.jobs_failed, 2);
  assert_eq!(ctx.search.current_generation(), Generation::A);
}

// ============================================================================
// Degraded and aborted cycles
// ============================================================================

#[tokio::test]
async fn test_failed_index_keeps_search_on_previous_generation() {
  let batch = RecordBatch {
    items: vec![item(
      1,
      ItemCategory::Equipment,
      &[(Language::En, "Sword"), (Language::Fr, "Épée")],
    )],
    ..Default::default()
  };
  let ctx = CatalogTestContext::new(batch);
  assert_eq!(ctx.rebuild().await.outcome, CycleOutcome::Completed);

  ctx.backend.fail_create_for("b-equipment-fr");
  ctx.source.set_batch(RecordBatch {
    items: vec![item(
      1,
      ItemCategory::Equipment,
      &[(Language::En, "Great Sword"), (Language::Fr, "Grande Épée")],
    )],
    ..Default::default()
  });
  let report = ctx.rebuild().await;

  assert_eq!(report.outcome, CycleOutcome::Degraded);
  assert_eq!(report.failed_indices, vec!["b-equipment-fr".to_string()]);
  assert_eq!(report.store_generation, Some(Generation::B));
  assert_eq!(report.search_generation, None);

  // Store moved on, search keeps serving the complete previous generation
  assert_eq!(ctx.store.current_generation(), Generation::B);
  assert_eq!(ctx.search.current_generation(), Generation::A);
  let status = ctx.handle.status();
  assert_eq!(status.store_generation, Generation::B);
  assert_eq!(status.search_generation, Generation::A);

  let hits = ctx
    .search
    .search(ContentKind::Equipment, Language::Fr, &SearchQuery::text("épée"))
    .await
    .unwrap();
  assert_eq!(hits.len(), 1);
  assert_eq!(hits[0].name, "Épée");
  assert!(ctx.backend.index_uids().contains(&"a-equipment-fr".to_string()));
}

#[tokio::test]
async fn test_index_timeout_aborts_cycle() {
  let ctx = CatalogTestContext::start(
    ScriptedSource::new(equipment_batch(&[(1, "Sword")])),
    FaultyBackend::new().with_pending_polls(usize::MAX),
    250,
    CoordinatorConfig {
      index_timeout: Duration::from_millis(100),
      ..test_config()
    },
  );

  let report = ctx.rebuild().await;
  assert_eq!(
    report.outcome,
    CycleOutcome::Aborted {
      reason: "Timed out with 2 indexing jobs still pending".to_string()
    }
  );
  assert_eq!(report.store_generation, None);
  assert_eq!(ctx.store.current_generation(), Generation::B);
  assert_eq!(ctx.search.current_generation(), Generation::B);
  assert!(ctx.served_items().is_empty());
}

#[tokio::test]
async fn test_cancel_during_ingestion_aborts_cycle() {
  let ctx = CatalogTestContext::start(
    ScriptedSource::gated(equipment_batch(&[(1, "Sword")])),
    FaultyBackend::new(),
    250,
    test_config(),
  );

  ctx.handle.trigger(crate::actor::message::TriggerReason::Operator);
  while ctx.source.fetches() == 0 {
    tokio::time::sleep(Duration::from_millis(5)).await;
  }
  ctx.cancel.cancel();

  let report = ctx.wait_for_cycles(1).await;
  assert_eq!(
    report.outcome,
    CycleOutcome::Aborted {
      reason: "Rebuild cancelled".to_string()
    }
  );
  assert_eq!(ctx.store.current_generation(), Generation::B);
  assert!(ctx.backend.index_uids().is_empty());
}

#[tokio::test]
async fn test_cancel_during_index_wait_aborts_without_swap() {
  let ctx = CatalogTestContext::start(
    ScriptedSource::new(equipment_batch(&[(1, "Sword")])),
    FaultyBackend::new().with_pending_polls(usize::MAX),
    250,
    test_config(),
  );

  ctx.handle.trigger(crate::actor::message::TriggerReason::Operator);
  tokio::time::timeout(TEST_TIMEOUT, async {
    while ctx.backend.status_calls() == 0 {
      tokio::time::sleep(Duration::from_millis(5)).await;
    }
  })
  .await
  .expect("tracker should start polling");
  ctx.cancel.cancel();

  let report = ctx.wait_for_cycles(1).await;
  assert_eq!(
    report.outcome,
    CycleOutcome::Aborted {
      reason: "Indexing wait cancelled".to_string()
    }
  );
  assert_eq!(report.store_generation, None);
  assert_eq!(report.search_generation, None);
  assert_eq!(ctx.store.current_generation(), Generation::B);
  assert_eq!(ctx.search.current_generation(), Generation::B);
  assert!(ctx.served_items().is_empty());
}

// ============================================================================
// Job tracker
// ============================================================================

async fn submitted(backend: &Arc<FaultyBackend>, count: i64) -> Vec<crate::search::JobHandle> {
  let key = IndexKey::new(Generation::A, ContentKind::Sets, Language::En);
  backend.create_index(&key.uid()).await.unwrap();
  let mut jobs = Vec::new();
  for id in 1..=count {
    jobs.push(backend.add_documents(&key.uid(), &[doc(id)]).await.unwrap());
  }
  jobs
}

#[tokio::test]
async fn test_tracker_terminal_jobs_not_polled_again() {
  let backend = Arc::new(FaultyBackend::new());
  let jobs = submitted(&backend, 3).await;

  let mut tracker = JobTracker::new(backend.clone(), Duration::from_millis(10), Duration::from_secs(5));
  tracker.track(jobs.clone());
  assert_eq!(tracker.pending(), 3);

  assert_eq!(tracker.poll_once().await, 3);
  assert!(tracker.all_done());
  assert_eq!(tracker.poll_once().await, 0);
  assert_eq!(backend.status_calls(), 3);

  // Re-tracking a known job keeps its status
  tracker.track([jobs[0]]);
  assert!(tracker.status(jobs[0]).unwrap().is_terminal());
}

#[tokio::test]
async fn test_tracker_times_out() {
  let backend = Arc::new(FaultyBackend::new().with_pending_polls(usize::MAX));
  let jobs = submitted(&backend, 2).await;

  let mut tracker = JobTracker::new(backend, Duration::from_millis(10), Duration::from_millis(50));
  tracker.track(jobs);

  let err = tracker.wait(&CancellationToken::new()).await.unwrap_err();
  assert!(matches!(err, TrackerError::TimedOut { pending: 2 }));
}

#[tokio::test]
async fn test_tracker_cancelled() {
  let backend = Arc::new(FaultyBackend::new().with_pending_polls(usize::MAX));
  let jobs = submitted(&backend, 1).await;

  let mut tracker = JobTracker::new(backend, Duration::from_millis(10), Duration::from_secs(5));
  tracker.track(jobs);

  let cancel = CancellationToken::new();
  let trigger = cancel.clone();
  tokio::spawn(async move {
    tokio::time::sleep(Duration::from_millis(30)).await;
    trigger.cancel();
  });

  let err = tracker.wait(&cancel).await.unwrap_err();
  assert!(matches!(err, TrackerError::Cancelled));
}

#[tokio::test]
async fn test_tracker_empty_returns_immediately() {
  let backend = Arc::new(FaultyBackend::new());
  let mut tracker = JobTracker::new(backend.clone(), Duration::from_secs(60), Duration::from_secs(60));

  let report = tracker.wait(&CancellationToken::new()).await.unwrap();
  assert_eq!(report.ticks, 0);
  assert_eq!(report.succeeded, 0);
  assert_eq!(backend.status_calls(), 0);
}
