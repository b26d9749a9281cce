//! Store swap tests.
//!
//! Cover promotion of the staging generation, isolation of read handles that
//! began before a swap, and reclamation of the stale generation.

use std::{
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
  time::Duration,
};

use pretty_assertions::assert_eq;

use super::helpers::*;
use crate::{
  actor::message::{CoordinatorPhase, CycleOutcome},
  domain::{
    content::{ContentKind, Language},
    generation::Generation,
    record::{EntityId, ItemCategory, RecordBatch},
  },
  search::{IndexKey, SearchQuery},
  store::StoreError,
};

fn named(items: &[(EntityId, &str)]) -> Vec<(EntityId, String)> {
  items.iter().map(|(id, n)| (*id, n.to_string())).collect()
}

#[tokio::test]
async fn test_rebuild_swaps_to_new_generation() {
  let ctx = CatalogTestContext::new(equipment_batch(&[(1, "Sword"), (2, "Shield")]));

  let seeded = ctx.rebuild().await;
  assert_eq!(seeded.outcome, CycleOutcome::Completed);
  assert_eq!(seeded.store_generation, Some(Generation::A));
  assert_eq!(ctx.served_items(), named(&[(1, "Sword"), (2, "Shield")]));

  ctx
    .source
    .set_batch(equipment_batch(&[(1, "Sword"), (2, "Shield"), (3, "Bow")]));
  let report = ctx.rebuild().await;

  assert_eq!(report.outcome, CycleOutcome::Completed);
  assert_eq!(report.store_generation, Some(Generation::B));
  assert_eq!(report.search_generation, Some(Generation::B));
  assert_eq!(ctx.store.current_generation(), Generation::B);
  assert_eq!(ctx.served_items(), named(&[(1, "Sword"), (2, "Shield"), (3, "Bow")]));

  let read = ctx.store.begin_read();
  assert_eq!(read.generation(), Generation::B);
  assert_eq!(read.get(ContentKind::Equipment, 3).unwrap().name(Language::En), Some("Bow"));
  assert_eq!(read.table_len(Generation::A, ContentKind::Equipment), 0);
  assert_eq!(read.table_len(Generation::A, ContentKind::AllItems), 0);
}

#[tokio::test]
async fn test_read_handle_keeps_pre_swap_view() {
  let ctx = CatalogTestContext::new(equipment_batch(&[(1, "Sword"), (2, "Shield")]));
  ctx.rebuild().await;

  let stale = ctx.store.begin_read();

  ctx
    .source
    .set_batch(equipment_batch(&[(1, "Sword"), (2, "Shield"), (3, "Bow")]));
  ctx.rebuild().await;

  assert_eq!(stale.generation(), Generation::A);
  let ids: Vec<_> = stale.scan(ContentKind::Equipment).map(|r| r.id()).collect();
  assert_eq!(ids, vec![1, 2]);
  assert!(matches!(
    stale.get(ContentKind::Equipment, 3),
    Err(StoreError::NotFound { id: 3, .. })
  ));

  // A fresh handle sees the swap
  assert_eq!(ctx.store.begin_read().len(ContentKind::Equipment), 3);
}

#[tokio::test]
async fn test_each_subsystem_has_one_current_generation() {
  let ctx = CatalogTestContext::new(equipment_batch(&[(1, "Sword")]));

  for expected in [Generation::A, Generation::B, Generation::A] {
    let report = ctx.rebuild().await;
    assert_eq!(report.outcome, CycleOutcome::Completed);

    let status = ctx.handle.status();
    assert_eq!(status.store_generation, expected);
    assert_eq!(status.search_generation, expected);
    assert_eq!(ctx.store.current_generation(), expected);
    assert_eq!(ctx.search.current_generation(), expected);
    assert_eq!(ctx.store.staging_generation(), expected.other());
  }
}

#[tokio::test]
async fn test_same_batch_twice_serves_same_content() {
  let batch = RecordBatch {
    items: vec![
      item(1, ItemCategory::Equipment, &[(Language::En, "Sword"), (Language::Fr, "Épée")]),
      item(2, ItemCategory::Resource, &[(Language::En, "Wheat")]),
    ],
    ..Default::default()
  };
  let ctx = CatalogTestContext::new(batch);
  let query = SearchQuery::default();

  ctx.rebuild().await;
  let first_rows = ctx.served_items();
  let first_hits = ctx
    .search
    .search(ContentKind::AllItems, Language::Fr, &query)
    .await
    .unwrap();

  ctx.rebuild().await;
  assert_eq!(ctx.served_items(), first_rows);
  assert_eq!(
    ctx
      .search
      .search(ContentKind::AllItems, Language::Fr, &query)
      .await
      .unwrap(),
    first_hits
  );
  assert_eq!(first_hits.len(), 1);
}

#[tokio::test]
async fn test_stale_generation_is_reclaimed() {
  let batch = RecordBatch {
    items: vec![
      item(1, ItemCategory::Equipment, &[(Language::En, "Sword"), (Language::De, "Schwert")]),
      item(2, ItemCategory::Consumable, &[(Language::En, "Bread")]),
    ],
    ..Default::default()
  };
  let ctx = CatalogTestContext::new(batch);

  ctx.rebuild().await;
  let mut seeded = ctx.backend.index_uids();
  seeded.sort();
  assert!(seeded.iter().all(|uid| uid.starts_with("a-")));
  assert!(seeded.contains(&"a-equipment-de".to_string()));

  let report = ctx.rebuild().await;
  assert_eq!(report.cleanup_failures, 0);

  let read = ctx.store.begin_read();
  for kind in ContentKind::ALL {
    assert_eq!(read.table_len(Generation::A, kind), 0, "stale {} table", kind);
  }
  for key in IndexKey::all_in(Generation::A) {
    assert!(!ctx.backend.index_uids().contains(&key.uid()), "stale index {}", key);
  }
  assert_eq!(ctx.backend.document_count("b-equipment-de"), 1);
}

#[tokio::test]
async fn test_cleanup_failure_does_not_block_idle() {
  let ctx = CatalogTestContext::new(equipment_batch(&[(1, "Sword")]));
  ctx.rebuild().await;

  ctx.backend.fail_delete_for("a-equipment-en");
  let report = ctx.rebuild().await;

  assert_eq!(report.outcome, CycleOutcome::Completed);
  assert_eq!(report.cleanup_failures, 1);
  assert_eq!(ctx.handle.status().phase, CoordinatorPhase::Idle);
  assert_eq!(ctx.store.current_generation(), Generation::B);
  assert_eq!(ctx.search.current_generation(), Generation::B);
  assert!(ctx.backend.index_uids().contains(&"a-equipment-en".to_string()));

  // The stale index cannot be reset either, so the next cycle degrades
  let next = ctx.rebuild().await;
  assert_eq!(next.outcome, CycleOutcome::Degraded);
  assert_eq!(next.failed_indices, vec!["a-equipment-en".to_string()]);
  assert_eq!(ctx.store.current_generation(), Generation::A);
  assert_eq!(ctx.search.current_generation(), Generation::B);
}

#[tokio::test]
async fn test_cancel_during_cleanup_keeps_swap() {
  let batch = RecordBatch {
    items: vec![item(
      1,
      ItemCategory::Equipment,
      &[(Language::En, "Sword"), (Language::De, "Schwert")],
    )],
    ..Default::default()
  };
  let ctx = CatalogTestContext::new(batch);
  ctx.rebuild().await;

  ctx.backend.cancel_on_delete("a-equipment-en", ctx.cancel.clone());
  let report = ctx.rebuild().await;

  assert_eq!(report.outcome, CycleOutcome::Completed);
  assert_eq!(report.cleanup_failures, 0);
  assert_eq!(ctx.store.current_generation(), Generation::B);
  assert_eq!(ctx.search.current_generation(), Generation::B);

  // Store cleanup ran before the cancel; the rest of the stale indices stay
  let read = ctx.store.begin_read();
  assert_eq!(read.table_len(Generation::A, ContentKind::Equipment), 0);
  let uids = ctx.backend.index_uids();
  assert!(!uids.contains(&"a-equipment-en".to_string()));
  assert!(uids.contains(&"a-equipment-de".to_string()));
  assert_eq!(ctx.backend.document_count("b-equipment-de"), 1);
}

#[tokio::test]
async fn test_duplicate_id_aborts_and_keeps_current() {
  let ctx = CatalogTestContext::new(equipment_batch(&[(1, "Sword"), (2, "Shield")]));
  ctx.rebuild().await;

  ctx
    .source
    .set_batch(equipment_batch(&[(5, "Axe"), (5, "Another Axe")]));
  let report = ctx.rebuild().await;

  match &report.outcome {
    CycleOutcome::Aborted { reason } => {
      assert_eq!(reason, "Store write failed: Duplicate key 5 in table b-equipment")
    }
    other => panic!("expected abort, got {:?}", other),
  }
  assert_eq!(report.store_generation, None);
  assert_eq!(ctx.store.current_generation(), Generation::A);
  assert_eq!(ctx.served_items(), named(&[(1, "Sword"), (2, "Shield")]));

  // Nothing from the failed transaction is visible in staging
  let read = ctx.store.begin_read();
  assert_eq!(read.table_len(Generation::B, ContentKind::Equipment), 0);
}

#[tokio::test]
async fn test_ingestion_failure_aborts_cycle() {
  let ctx = CatalogTestContext::new(equipment_batch(&[(1, "Sword")]));
  ctx.rebuild().await;

  ctx.source.set_failure("release server unreachable");
  let report = ctx.rebuild().await;

  assert!(matches!(report.outcome, CycleOutcome::Aborted { .. }));
  assert_eq!(ctx.store.current_generation(), Generation::A);
  assert_eq!(ctx.search.current_generation(), Generation::A);
  assert_eq!(ctx.served_items(), named(&[(1, "Sword")]));
}

#[tokio::test]
async fn test_readers_never_see_mixed_generations() {
  let version = |v: usize| {
    let items: Vec<(EntityId, String)> = (1..=50).map(|id| (id, format!("v{} item {}", v, id))).collect();
    let refs: Vec<(EntityId, &str)> = items.iter().map(|(id, n)| (*id, n.as_str())).collect();
    equipment_batch(&refs)
  };

  let ctx = CatalogTestContext::new(version(0));
  ctx.rebuild().await;

  let done = Arc::new(AtomicBool::new(false));
  let readers: Vec<_> = (0..4)
    .map(|_| {
      let store = ctx.store.clone();
      let done = done.clone();
      tokio::spawn(async move {
        let mut reads = 0usize;
        while !done.load(Ordering::SeqCst) {
          let read = store.begin_read();
          let prefixes: Vec<String> = read
            .scan(ContentKind::AllItems)
            .chain(read.scan(ContentKind::Equipment))
            .filter_map(|r| r.name(Language::En))
            .map(|n| n.split(' ').next().unwrap_or_default().to_string())
            .collect();
          assert_eq!(prefixes.len(), 100, "both tables fully populated");
          assert!(
            prefixes.iter().all(|p| p == &prefixes[0]),
            "mixed versions in one read: {:?}",
            prefixes
          );
          reads += 1;
          tokio::time::sleep(Duration::from_millis(1)).await;
        }
        reads
      })
    })
    .collect();

  for v in 1..=3 {
    ctx.source.set_batch(version(v));
    assert_eq!(ctx.rebuild().await.outcome, CycleOutcome::Completed);
  }
  done.store(true, Ordering::SeqCst);

  for reader in readers {
    assert!(reader.await.unwrap() > 0);
  }
  assert_eq!(
    ctx.store.begin_read().get(ContentKind::AllItems, 7).unwrap().name(Language::En),
    Some("v3 item 7")
  );
}
