use std::sync::Arc;

use tokio::sync::OwnedMutexGuard;
use tracing::debug;

use super::{CatalogStore, StoreError, StoreSnapshot, Table, TableKey};
use crate::domain::{
  content::ContentKind,
  generation::Generation,
  record::{EntityId, Record},
};

// ============================================================================
// Read
// ============================================================================

/// A point-in-time view of the store.
#[derive(Debug, Clone)]
pub struct ReadHandle {
  snapshot: Arc<StoreSnapshot>,
}

impl ReadHandle {
  pub(super) fn new(snapshot: Arc<StoreSnapshot>) -> Self {
    Self { snapshot }
  }

  /// The generation that was current when this handle was opened.
  pub fn generation(&self) -> Generation {
    self.snapshot.current
  }

  pub fn get(&self, kind: ContentKind, id: EntityId) -> Result<Record, StoreError> {
    self
      .current_table(kind)
      .and_then(|t| t.get(&id))
      .cloned()
      .ok_or(StoreError::NotFound { kind, id })
  }

  /// Records of `kind` in ascending id order.
  pub fn scan(&self, kind: ContentKind) -> impl Iterator<Item = &Record> + '_ {
    self.current_table(kind).into_iter().flat_map(|t| t.values())
  }

  pub fn len(&self, kind: ContentKind) -> usize {
    self.table_len(self.snapshot.current, kind)
  }

  /// Row count of one physical table, current or not.
  pub fn table_len(&self, generation: Generation, kind: ContentKind) -> usize {
    self.snapshot.table(generation, kind).map_or(0, |t| t.len())
  }

  fn current_table(&self, kind: ContentKind) -> Option<&Table> {
    self.snapshot.table(self.snapshot.current, kind)
  }
}

// ============================================================================
// Write
// ============================================================================

/// Exclusive write transaction over the staging generation.
///
/// Holds the store's writer lock until committed or dropped.
pub struct WriteHandle {
  store: CatalogStore,
  working: StoreSnapshot,
  changed: usize,
  _guard: OwnedMutexGuard<()>,
}

impl WriteHandle {
  pub(super) fn new(store: CatalogStore, working: StoreSnapshot, guard: OwnedMutexGuard<()>) -> Self {
    Self {
      store,
      working,
      changed: 0,
      _guard: guard,
    }
  }

  /// The generation writes are allowed to target.
  pub fn staging_generation(&self) -> Generation {
    self.working.current.other()
  }

  pub fn insert(&mut self, generation: Generation, kind: ContentKind, record: Record) -> Result<(), StoreError> {
    let table = self.table_mut(generation, kind)?;
    let id = record.id();
    if table.contains_key(&id) {
      return Err(StoreError::DuplicateKey {
        table: TableKey { generation, kind },
        id,
      });
    }
    table.insert(id, record);
    self.changed += 1;
    Ok(())
  }

  /// Remove every row of one table. Returns how many rows were removed.
  pub fn delete_all(&mut self, generation: Generation, kind: ContentKind) -> Result<usize, StoreError> {
    self.check_writable(generation)?;
    let removed = self.working.tables[generation]
      .remove(&kind)
      .map_or(0, |t| t.len());
    self.changed += removed;
    Ok(removed)
  }

  /// Publish every change made through this handle in one step.
  pub fn commit(self) {
    debug!(changes = self.changed, "Store write transaction committed");
    let Self { store, working, .. } = self;
    store.publish(working);
  }

  fn check_writable(&self, generation: Generation) -> Result<(), StoreError> {
    if generation == self.working.current {
      return Err(StoreError::CurrentGeneration(generation));
    }
    Ok(())
  }

  fn table_mut(&mut self, generation: Generation, kind: ContentKind) -> Result<&mut Table, StoreError> {
    self.check_writable(generation)?;
    let shared = self.working.tables[generation].entry(kind).or_default();
    Ok(Arc::make_mut(shared))
  }
}
