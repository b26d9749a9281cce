//! Test helpers for coordinator integration tests.
//!
//! Provides `CatalogTestContext`, which wires a store, an instrumented search
//! backend and a scripted record source to a running coordinator.

use std::{
  sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
  },
  time::Duration,
};

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::{
  actor::{
    Coordinator, CoordinatorConfig, CoordinatorHandle,
    message::{CycleReport, TriggerOutcome, TriggerReason},
  },
  domain::{
    content::{Language, Translations},
    generation::Generation,
    record::{EntityId, Item, ItemCategory, RecordBatch},
  },
  ingest::{IngestionError, RecordSource},
  search::{JobHandle, JobStatus, MemorySearchBackend, SearchBackend, SearchDocument, SearchError, SearchManager, SearchQuery},
  store::CatalogStore,
};

pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// Instrumented search backend
// ============================================================================

/// Memory backend with call counters and failure knobs.
#[derive(Default)]
pub struct FaultyBackend {
  inner: MemorySearchBackend,
  add_calls: DashMap<String, usize>,
  status_calls: AtomicUsize,
  /// Polls each job answers `Pending` before reporting its real status
  pending_polls: usize,
  job_polls: DashMap<JobHandle, usize>,
  fail_create: DashSet<String>,
  fail_delete: DashSet<String>,
  /// Cancelled when the named index is deleted
  cancel_on_delete: Mutex<Option<(String, CancellationToken)>>,
  fail_jobs: bool,
}

impl FaultyBackend {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_pending_polls(mut self, polls: usize) -> Self {
    self.pending_polls = polls;
    self
  }

  /// Every job reports `Failed` once terminal.
  pub fn with_failing_jobs(mut self) -> Self {
    self.fail_jobs = true;
    self
  }

  pub fn fail_create_for(&self, uid: &str) {
    self.fail_create.insert(uid.to_string());
  }

  pub fn fail_delete_for(&self, uid: &str) {
    self.fail_delete.insert(uid.to_string());
  }

  pub fn cancel_on_delete(&self, uid: &str, cancel: CancellationToken) {
    *self.cancel_on_delete.lock().unwrap() = Some((uid.to_string(), cancel));
  }

  pub fn add_calls(&self, uid: &str) -> usize {
    self.add_calls.get(uid).map_or(0, |c| *c)
  }

  pub fn total_add_calls(&self) -> usize {
    self.add_calls.iter().map(|e| *e.value()).sum()
  }

  pub fn status_calls(&self) -> usize {
    self.status_calls.load(Ordering::SeqCst)
  }

  pub fn index_uids(&self) -> Vec<String> {
    self.inner.index_uids()
  }

  pub fn document_count(&self, uid: &str) -> usize {
    self.inner.document_count(uid)
  }
}

#[async_trait]
impl SearchBackend for FaultyBackend {
  fn name(&self) -> &str {
    "faulty"
  }

  async fn index_exists(&self, uid: &str) -> Result<bool, SearchError> {
    self.inner.index_exists(uid).await
  }

  async fn create_index(&self, uid: &str) -> Result<(), SearchError> {
    if self.fail_create.contains(uid) {
      return Err(SearchError::Service {
        status: 400,
        message: format!("cannot create {}", uid),
      });
    }
    self.inner.create_index(uid).await
  }

  async fn set_filterable_attributes(&self, uid: &str, attributes: &[&str]) -> Result<(), SearchError> {
    self.inner.set_filterable_attributes(uid, attributes).await
  }

  async fn add_documents(&self, uid: &str, documents: &[SearchDocument]) -> Result<JobHandle, SearchError> {
    *self.add_calls.entry(uid.to_string()).or_default() += 1;
    self.inner.add_documents(uid, documents).await
  }

  async fn job_status(&self, job: JobHandle) -> Result<JobStatus, SearchError> {
    self.status_calls.fetch_add(1, Ordering::SeqCst);
    let polls = {
      let mut polls = self.job_polls.entry(job).or_default();
      *polls += 1;
      *polls
    };
    if polls <= self.pending_polls {
      return Ok(JobStatus::Pending);
    }
    if self.fail_jobs {
      return Ok(JobStatus::Failed {
        reason: "document rejected".to_string(),
      });
    }
    self.inner.job_status(job).await
  }

  async fn delete_index(&self, uid: &str) -> Result<(), SearchError> {
    let cancel = self
      .cancel_on_delete
      .lock()
      .unwrap()
      .as_ref()
      .filter(|(target, _)| target == uid)
      .map(|(_, cancel)| cancel.clone());
    if let Some(cancel) = cancel {
      cancel.cancel();
    }
    if self.fail_delete.contains(uid) {
      return Err(SearchError::Service {
        status: 500,
        message: format!("cannot delete {}", uid),
      });
    }
    self.inner.delete_index(uid).await
  }

  async fn search(&self, uid: &str, query: &SearchQuery) -> Result<Vec<SearchDocument>, SearchError> {
    self.inner.search(uid, query).await
  }
}

// ============================================================================
// Scripted record source
// ============================================================================

/// Serves a replaceable batch, optionally holding each fetch until released.
pub struct ScriptedSource {
  batch: Mutex<Result<RecordBatch, String>>,
  gate: Option<Arc<Semaphore>>,
  fetches: AtomicUsize,
}

impl ScriptedSource {
  pub fn new(batch: RecordBatch) -> Self {
    Self {
      batch: Mutex::new(Ok(batch)),
      gate: None,
      fetches: AtomicUsize::new(0),
    }
  }

  /// Each fetch waits for one permit from [`ScriptedSource::release`].
  pub fn gated(batch: RecordBatch) -> Self {
    Self {
      gate: Some(Arc::new(Semaphore::new(0))),
      ..Self::new(batch)
    }
  }

  pub fn set_batch(&self, batch: RecordBatch) {
    *self.batch.lock().unwrap() = Ok(batch);
  }

  pub fn set_failure(&self, message: &str) {
    *self.batch.lock().unwrap() = Err(message.to_string());
  }

  pub fn release(&self, fetches: usize) {
    if let Some(gate) = &self.gate {
      gate.add_permits(fetches);
    }
  }

  pub fn fetches(&self) -> usize {
    self.fetches.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl RecordSource for ScriptedSource {
  fn name(&self) -> &str {
    "scripted"
  }

  async fn fetch(&self) -> Result<RecordBatch, IngestionError> {
    self.fetches.fetch_add(1, Ordering::SeqCst);
    if let Some(gate) = &self.gate {
      gate
        .acquire()
        .await
        .map_err(|_| IngestionError::Unavailable("gate closed".to_string()))?
        .forget();
    }
    self
      .batch
      .lock()
      .unwrap()
      .clone()
      .map_err(IngestionError::Unavailable)
  }
}

// ============================================================================
// Context
// ============================================================================

/// Fast polling, generous timeout.
pub fn test_config() -> CoordinatorConfig {
  CoordinatorConfig {
    index_concurrency: 4,
    poll_interval: Duration::from_millis(10),
    index_timeout: Duration::from_secs(5),
  }
}

/// A running coordinator over an in-memory catalog.
///
/// Both subsystems start with generation B current, so the first cycle
/// builds generation A.
pub struct CatalogTestContext {
  pub store: CatalogStore,
  pub backend: Arc<FaultyBackend>,
  pub search: Arc<SearchManager>,
  pub source: Arc<ScriptedSource>,
  pub handle: CoordinatorHandle,
  pub cancel: CancellationToken,
}

impl CatalogTestContext {
  pub fn new(batch: RecordBatch) -> Self {
    Self::start(ScriptedSource::new(batch), FaultyBackend::new(), 250, test_config())
  }

  pub fn start(source: ScriptedSource, backend: FaultyBackend, batch_size: usize, config: CoordinatorConfig) -> Self {
    let store = CatalogStore::with_current(Generation::B);
    let backend = Arc::new(backend);
    let search = Arc::new(SearchManager::with_current(backend.clone(), batch_size, Generation::B));
    let source = Arc::new(source);
    let cancel = CancellationToken::new();

    let (handle, _task) = Coordinator::spawn(
      store.clone(),
      search.clone(),
      source.clone(),
      config,
      cancel.clone(),
    );

    Self {
      store,
      backend,
      search,
      source,
      handle,
      cancel,
    }
  }

  /// Trigger one cycle and wait for its report.
  pub async fn rebuild(&self) -> CycleReport {
    let done = self.handle.status().cycles_completed;
    assert_eq!(self.handle.trigger(TriggerReason::Operator), TriggerOutcome::Queued);
    self.wait_for_cycles(done + 1).await
  }

  pub async fn wait_for_cycles(&self, count: u64) -> CycleReport {
    let status = tokio::time::timeout(TEST_TIMEOUT, self.handle.wait_for_cycles(count))
      .await
      .expect("cycle should finish");
    status.last_cycle.expect("finished cycle has a report")
  }

  /// Names of every item currently served, in id order.
  pub fn served_items(&self) -> Vec<(EntityId, String)> {
    let read = self.store.begin_read();
    read
      .scan(crate::domain::content::ContentKind::AllItems)
      .map(|r| (r.id(), r.name(Language::En).unwrap_or_default().to_string()))
      .collect()
  }
}

impl Drop for CatalogTestContext {
  fn drop(&mut self) {
    self.cancel.cancel();
  }
}

// ============================================================================
// Batches
// ============================================================================

pub fn item(id: EntityId, category: ItemCategory, names: &[(Language, &str)]) -> Item {
  Item {
    id,
    category,
    name: names.iter().map(|(l, n)| (*l, *n)).collect(),
    description: Translations::new(),
    type_name: Translations::new(),
    level: (id as u32 % 200) + 1,
    image_url: None,
    recipe_id: None,
  }
}

/// Equipment with English names only.
pub fn equipment_batch(items: &[(EntityId, &str)]) -> RecordBatch {
  RecordBatch {
    items: items
      .iter()
      .map(|(id, name)| item(*id, ItemCategory::Equipment, &[(Language::En, *name)]))
      .collect(),
    ..Default::default()
  }
}
