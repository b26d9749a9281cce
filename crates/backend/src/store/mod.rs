//! In-memory indexed catalog store.
//!
//! The store keeps every content kind in two generations of id-keyed tables.
//! The whole store, including which generation is current, lives in one
//! immutable [`StoreSnapshot`] published through an [`ArcSwap`]:
//!
//! - Readers take a snapshot with [`CatalogStore::begin_read`]. This never
//!   blocks and the snapshot never changes underneath them.
//! - One writer at a time holds a [`WriteHandle`]. It edits a private copy of
//!   the snapshot (tables are shared until touched) and publishes it on
//!   [`WriteHandle::commit`]. Dropping the handle discards the edits.
//! - [`CatalogStore::promote`] flips the current tag under the same writer lock.

mod handle;

use std::{collections::BTreeMap, fmt, sync::Arc};

use arc_swap::ArcSwap;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

pub use handle::{ReadHandle, WriteHandle};

use crate::domain::{
  content::ContentKind,
  generation::{Generation, PerGeneration},
  record::{EntityId, Record},
};

/// One table: records ordered by id.
pub type Table = BTreeMap<EntityId, Record>;

#[derive(Debug, Error)]
pub enum StoreError {
  #[error("Duplicate key {id} in table {table}")]
  DuplicateKey { table: TableKey, id: EntityId },
  #[error("Record {id} not found in {kind}")]
  NotFound { kind: ContentKind, id: EntityId },
  #[error("Generation {0} is current; only the staging generation can be written")]
  CurrentGeneration(Generation),
}

/// Addresses one physical table. Displays as `<generation>-<kind>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TableKey {
  pub generation: Generation,
  pub kind: ContentKind,
}

impl fmt::Display for TableKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}-{}", self.generation, self.kind)
  }
}

// ============================================================================
// Snapshot
// ============================================================================

/// Immutable view of the whole store.
#[derive(Debug, Clone)]
pub struct StoreSnapshot {
  current: Generation,
  tables: PerGeneration<BTreeMap<ContentKind, Arc<Table>>>,
}

impl StoreSnapshot {
  fn empty(current: Generation) -> Self {
    Self {
      current,
      tables: PerGeneration::default(),
    }
  }

  pub fn current(&self) -> Generation {
    self.current
  }

  pub fn table(&self, generation: Generation, kind: ContentKind) -> Option<&Table> {
    self.tables[generation].get(&kind).map(Arc::as_ref)
  }
}

// ============================================================================
// Store
// ============================================================================

struct StoreInner {
  snapshot: ArcSwap<StoreSnapshot>,
  writer: Arc<Mutex<()>>,
}

/// Shared handle to the catalog store. Cloning is cheap.
#[derive(Clone)]
pub struct CatalogStore {
  inner: Arc<StoreInner>,
}

impl Default for CatalogStore {
  fn default() -> Self {
    Self::new()
  }
}

impl CatalogStore {
  /// An empty store whose current generation is A.
  pub fn new() -> Self {
    Self::with_current(Generation::A)
  }

  /// An empty store with the given generation current.
  pub fn with_current(current: Generation) -> Self {
    Self {
      inner: Arc::new(StoreInner {
        snapshot: ArcSwap::from_pointee(StoreSnapshot::empty(current)),
        writer: Arc::new(Mutex::new(())),
      }),
    }
  }

  /// Lock-free snapshot read. The handle keeps observing the generation and
  /// table contents that were current at this call.
  pub fn begin_read(&self) -> ReadHandle {
    ReadHandle::new(self.inner.snapshot.load_full())
  }

  pub fn current_generation(&self) -> Generation {
    self.inner.snapshot.load().current
  }

  pub fn staging_generation(&self) -> Generation {
    self.current_generation().other()
  }

  /// Exclusive write transaction. Waits for any other writer to finish.
  pub async fn begin_write(&self) -> WriteHandle {
    let guard = self.inner.writer.clone().lock_owned().await;
    let base = StoreSnapshot::clone(&self.inner.snapshot.load());
    debug!(current = %base.current, "Store write transaction started");
    WriteHandle::new(self.clone(), base, guard)
  }

  /// Make `generation` current. Returns the previously current generation.
  pub async fn promote(&self, generation: Generation) -> Generation {
    let _guard = self.inner.writer.lock().await;
    let mut next = StoreSnapshot::clone(&self.inner.snapshot.load());
    let previous = next.current;
    next.current = generation;
    self.inner.snapshot.store(Arc::new(next));
    info!(from = %previous, to = %generation, "Store generation promoted");
    previous
  }

  fn publish(&self, snapshot: StoreSnapshot) {
    self.inner.snapshot.store(Arc::new(snapshot));
  }
}
