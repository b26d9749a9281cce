use std::{fmt, sync::Arc};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, trace};

use super::{JobHandle, SearchBackend, SearchDocument, SearchError, SearchQuery};
use crate::{
  config::SearchConfig,
  domain::{
    content::{ContentKind, Language},
    generation::{Generation, GenerationCell},
  },
};

/// Addresses one physical search index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IndexKey {
  pub generation: Generation,
  pub kind: ContentKind,
  pub language: Language,
}

impl IndexKey {
  pub fn new(generation: Generation, kind: ContentKind, language: Language) -> Self {
    Self {
      generation,
      kind,
      language,
    }
  }

  /// Physical index name, `<generation>-<kind>-<language>`.
  pub fn uid(&self) -> String {
    self.to_string()
  }

  /// Every index a generation can hold.
  pub fn all_in(generation: Generation) -> impl Iterator<Item = IndexKey> {
    ContentKind::searchable().flat_map(move |kind| {
      Language::ALL
        .into_iter()
        .map(move |language| IndexKey::new(generation, kind, language))
    })
  }
}

impl fmt::Display for IndexKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}-{}-{}", self.generation, self.kind, self.language)
  }
}

/// Owns the dual-generation index set in the search service.
///
/// Searches always go to the generation current at call time. Index creation,
/// configuration and population are serialized per index; different indices
/// proceed concurrently.
pub struct SearchManager {
  backend: Arc<dyn SearchBackend>,
  current: GenerationCell,
  locks: DashMap<IndexKey, Arc<Mutex<()>>>,
  batch_size: usize,
}

impl SearchManager {
  pub fn new(backend: Arc<dyn SearchBackend>, batch_size: usize) -> Self {
    Self::with_current(backend, batch_size, Generation::A)
  }

  pub fn with_current(backend: Arc<dyn SearchBackend>, batch_size: usize, current: Generation) -> Self {
    Self {
      backend,
      current: GenerationCell::new(current),
      locks: DashMap::new(),
      batch_size: batch_size.max(1),
    }
  }

  pub fn from_config(config: &SearchConfig) -> Result<Self, SearchError> {
    let backend = <dyn SearchBackend>::from_config(config)?;
    Ok(Self::new(backend, config.document_batch_size))
  }

  pub fn backend(&self) -> &Arc<dyn SearchBackend> {
    &self.backend
  }

  pub fn current_generation(&self) -> Generation {
    self.current.load()
  }

  pub fn staging_generation(&self) -> Generation {
    self.current_generation().other()
  }

  /// Make `generation` current for every subsequent search. Returns the
  /// previously current generation.
  pub fn promote(&self, generation: Generation) -> Generation {
    let previous = self.current.swap(generation);
    info!(from = %previous, to = %generation, "Search generation promoted");
    previous
  }

  /// Create the index if missing, then configure its filterable attributes.
  pub async fn ensure_index(&self, key: IndexKey, filterable: &[&str]) -> Result<(), SearchError> {
    let uid = key.uid();
    if !self.backend.index_exists(&uid).await? {
      self.backend.create_index(&uid).await?;
      debug!(index = %uid, "Index created");
    }
    if !filterable.is_empty() {
      self.backend.set_filterable_attributes(&uid, filterable).await?;
    }
    Ok(())
  }

  /// Submit documents in batches, one indexing job per batch.
  pub async fn submit_documents(
    &self,
    key: IndexKey,
    documents: &[SearchDocument],
  ) -> Result<Vec<JobHandle>, SearchError> {
    let uid = key.uid();
    let mut jobs = Vec::with_capacity(documents.len().div_ceil(self.batch_size));
    for chunk in documents.chunks(self.batch_size) {
      let job = self.backend.add_documents(&uid, chunk).await?;
      trace!(index = %uid, job = job.0, batch_size = chunk.len(), "Document batch submitted");
      jobs.push(job);
    }
    debug!(index = %uid, documents = documents.len(), jobs = jobs.len(), "Documents submitted");
    Ok(jobs)
  }

  /// Ensure and populate one index while holding its lock.
  pub async fn populate(&self, key: IndexKey, documents: &[SearchDocument]) -> Result<Vec<JobHandle>, SearchError> {
    let lock = self.index_lock(key);
    let _guard = lock.lock().await;

    self.ensure_index(key, key.kind.filterable_attributes()).await?;
    self.submit_documents(key, documents).await
  }

  /// Delete an index. An index that does not exist counts as deleted.
  pub async fn delete_index(&self, key: IndexKey) -> Result<(), SearchError> {
    let lock = self.index_lock(key);
    let _guard = lock.lock().await;

    match self.backend.delete_index(&key.uid()).await {
      Ok(()) => {
        debug!(index = %key, "Index deleted");
        Ok(())
      }
      Err(SearchError::IndexNotFound(_)) => Ok(()),
      Err(e) => Err(e),
    }
  }

  /// Search the current generation's index for `kind` in `language`.
  ///
  /// Kinds without indices and indices that were never created yield no hits.
  pub async fn search(
    &self,
    kind: ContentKind,
    language: Language,
    query: &SearchQuery,
  ) -> Result<Vec<SearchDocument>, SearchError> {
    if !kind.is_searchable() {
      return Ok(Vec::new());
    }

    let key = IndexKey::new(self.current_generation(), kind, language);
    match self.backend.search(&key.uid(), query).await {
      Ok(hits) => Ok(hits),
      Err(SearchError::IndexNotFound(_)) => {
        trace!(index = %key, "Search on missing index");
        Ok(Vec::new())
      }
      Err(e) => Err(e),
    }
  }

  fn index_lock(&self, key: IndexKey) -> Arc<Mutex<()>> {
    self.locks.entry(key).or_default().clone()
  }
}
