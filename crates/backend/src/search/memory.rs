//! In-process search backend.
//!
//! Keeps every index in memory and completes indexing jobs synchronously.
//! Ranking is a plain name match: exact, then prefix, then substring, then a
//! description match, ties broken by id.

use std::{
  collections::BTreeMap,
  sync::atomic::{AtomicU64, Ordering},
};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::trace;

use super::{Filter, FilterValue, JobHandle, JobStatus, SearchBackend, SearchDocument, SearchError, SearchQuery};
use crate::domain::record::EntityId;

#[derive(Debug, Default)]
struct MemoryIndex {
  filterable: Vec<String>,
  documents: BTreeMap<EntityId, SearchDocument>,
}

#[derive(Debug, Default)]
pub struct MemorySearchBackend {
  indices: DashMap<String, MemoryIndex>,
  /// Job status with the index it wrote to; dropped with the index
  jobs: DashMap<JobHandle, (String, JobStatus)>,
  next_job: AtomicU64,
}

impl MemorySearchBackend {
  pub fn new() -> Self {
    Self::default()
  }

  /// Uids of every existing index, sorted.
  pub fn index_uids(&self) -> Vec<String> {
    let mut uids: Vec<_> = self.indices.iter().map(|e| e.key().clone()).collect();
    uids.sort();
    uids
  }

  pub fn document_count(&self, uid: &str) -> usize {
    self.indices.get(uid).map_or(0, |i| i.documents.len())
  }

  /// Jobs still known to the backend.
  pub fn job_count(&self) -> usize {
    self.jobs.len()
  }

  fn record_job(&self, uid: &str, status: JobStatus) -> JobHandle {
    let job = JobHandle(self.next_job.fetch_add(1, Ordering::Relaxed));
    self.jobs.insert(job, (uid.to_string(), status));
    job
  }
}

fn rank(doc: &SearchDocument, needle: &str) -> Option<u8> {
  if needle.is_empty() {
    return Some(0);
  }
  let name = doc.name.to_lowercase();
  if name == needle {
    Some(0)
  } else if name.starts_with(needle) {
    Some(1)
  } else if name.contains(needle) {
    Some(2)
  } else if doc
    .description
    .as_ref()
    .is_some_and(|d| d.to_lowercase().contains(needle))
  {
    Some(3)
  } else {
    None
  }
}

fn matches_filter(doc: &SearchDocument, filter: &Filter) -> bool {
  match filter {
    Filter::Eq { attribute, value } => match (doc.attribute(attribute), value) {
      (Some(FilterValue::Text(actual)), FilterValue::Text(expected)) => actual.eq_ignore_ascii_case(expected),
      (Some(actual), expected) => &actual == expected,
      (None, _) => false,
    },
    Filter::Range { attribute, min, max } => match doc.attribute(attribute) {
      Some(FilterValue::Number(n)) => min.is_none_or(|m| n >= m) && max.is_none_or(|m| n <= m),
      _ => false,
    },
  }
}

#[async_trait]
impl SearchBackend for MemorySearchBackend {
  fn name(&self) -> &str {
    "memory"
  }

  async fn index_exists(&self, uid: &str) -> Result<bool, SearchError> {
    Ok(self.indices.contains_key(uid))
  }

  async fn create_index(&self, uid: &str) -> Result<(), SearchError> {
    self.indices.entry(uid.to_string()).or_default();
    Ok(())
  }

  async fn set_filterable_attributes(&self, uid: &str, attributes: &[&str]) -> Result<(), SearchError> {
    let mut index = self
      .indices
      .get_mut(uid)
      .ok_or_else(|| SearchError::IndexNotFound(uid.to_string()))?;
    index.filterable = attributes.iter().map(|a| a.to_string()).collect();
    Ok(())
  }

  async fn add_documents(&self, uid: &str, documents: &[SearchDocument]) -> Result<JobHandle, SearchError> {
    {
      let mut index = self
        .indices
        .get_mut(uid)
        .ok_or_else(|| SearchError::IndexNotFound(uid.to_string()))?;
      for doc in documents {
        index.documents.insert(doc.id, doc.clone());
      }
    }
    trace!(uid, count = documents.len(), "Documents added to memory index");
    Ok(self.record_job(uid, JobStatus::Succeeded))
  }

  async fn job_status(&self, job: JobHandle) -> Result<JobStatus, SearchError> {
    self
      .jobs
      .get(&job)
      .map(|entry| entry.value().1.clone())
      .ok_or_else(|| SearchError::Service {
        status: 404,
        message: format!("Unknown task {}", job.0),
      })
  }

  async fn delete_index(&self, uid: &str) -> Result<(), SearchError> {
    self
      .indices
      .remove(uid)
      .ok_or_else(|| SearchError::IndexNotFound(uid.to_string()))?;
    self.jobs.retain(|_, (index, _)| index.as_str() != uid);
    Ok(())
  }

  async fn search(&self, uid: &str, query: &SearchQuery) -> Result<Vec<SearchDocument>, SearchError> {
    let index = self
      .indices
      .get(uid)
      .ok_or_else(|| SearchError::IndexNotFound(uid.to_string()))?;

    if let Some(filter) = query
      .filters
      .iter()
      .find(|f| !index.filterable.iter().any(|a| a == f.attribute()))
    {
      return Err(SearchError::Service {
        status: 400,
        message: format!("Attribute `{}` is not filterable in index {}", filter.attribute(), uid),
      });
    }

    let needle = query.query.trim().to_lowercase();
    let mut hits: Vec<(u8, &SearchDocument)> = index
      .documents
      .values()
      .filter(|doc| query.filters.iter().all(|f| matches_filter(doc, f)))
      .filter_map(|doc| rank(doc, &needle).map(|r| (r, doc)))
      .collect();
    hits.sort_by_key(|(r, doc)| (*r, doc.id));

    Ok(hits.into_iter().take(query.limit).map(|(_, d)| d.clone()).collect())
  }
}
