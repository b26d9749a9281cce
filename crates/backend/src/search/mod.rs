//! Full-text search over the catalog.
//!
//! [`SearchManager`] owns the per-generation, per-language index lifecycle and
//! talks to the search service through the [`SearchBackend`] trait.

mod document;
mod manager;
mod meilisearch;
mod memory;
mod resilient;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use document::{DocumentPlan, SearchDocument, plan_documents};
pub use manager::{IndexKey, SearchManager};
pub use meilisearch::MeilisearchBackend;
pub use memory::MemorySearchBackend;
pub use resilient::{ResilientBackend, RetryConfig};

use crate::domain::config::{SearchConfig, SearchProvider};

/// Default number of hits when a query does not set a limit.
pub const DEFAULT_LIMIT: usize = 20;

// ============================================================================
// Jobs
// ============================================================================

/// Opaque handle to one asynchronous bulk document load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobHandle(pub u64);

/// Progress of an indexing job. `Succeeded` and `Failed` are terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobStatus {
  Pending,
  Succeeded,
  Failed { reason: String },
}

impl JobStatus {
  pub fn is_terminal(&self) -> bool {
    !matches!(self, JobStatus::Pending)
  }
}

// ============================================================================
// Queries
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
  Number(i64),
  Text(String),
}

impl FilterValue {
  /// Parse a command-line style value: integers become numbers.
  pub fn parse(raw: &str) -> Self {
    raw
      .parse::<i64>()
      .map(FilterValue::Number)
      .unwrap_or_else(|_| FilterValue::Text(raw.to_string()))
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Filter {
  Eq {
    attribute: String,
    value: FilterValue,
  },
  /// Inclusive numeric range; an open bound is unconstrained.
  Range {
    attribute: String,
    min: Option<i64>,
    max: Option<i64>,
  },
}

impl Filter {
  pub fn attribute(&self) -> &str {
    match self {
      Filter::Eq { attribute, .. } | Filter::Range { attribute, .. } => attribute,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchQuery {
  pub query: String,
  pub filters: Vec<Filter>,
  pub limit: usize,
}

impl Default for SearchQuery {
  fn default() -> Self {
    Self {
      query: String::new(),
      filters: Vec::new(),
      limit: DEFAULT_LIMIT,
    }
  }
}

impl SearchQuery {
  pub fn text(query: impl Into<String>) -> Self {
    Self {
      query: query.into(),
      ..Default::default()
    }
  }

  pub fn filter(mut self, filter: Filter) -> Self {
    self.filters.push(filter);
    self
  }

  pub fn limit(mut self, limit: usize) -> Self {
    self.limit = limit;
    self
  }
}

// ============================================================================
// Backend
// ============================================================================

/// Minimal contract with the external search service.
///
/// Indices are addressed by their physical uid (see [`IndexKey::uid`]).
#[async_trait::async_trait]
pub trait SearchBackend: Send + Sync {
  fn name(&self) -> &str;

  async fn index_exists(&self, uid: &str) -> Result<bool, SearchError>;
  async fn create_index(&self, uid: &str) -> Result<(), SearchError>;
  async fn set_filterable_attributes(&self, uid: &str, attributes: &[&str]) -> Result<(), SearchError>;

  /// Submit one batch of documents. The load runs asynchronously on the
  /// service; poll the returned handle with [`SearchBackend::job_status`].
  async fn add_documents(&self, uid: &str, documents: &[SearchDocument]) -> Result<JobHandle, SearchError>;
  async fn job_status(&self, job: JobHandle) -> Result<JobStatus, SearchError>;

  /// Fails with [`SearchError::IndexNotFound`] when the index does not exist.
  async fn delete_index(&self, uid: &str) -> Result<(), SearchError>;
  async fn search(&self, uid: &str, query: &SearchQuery) -> Result<Vec<SearchDocument>, SearchError>;
}

impl dyn SearchBackend {
  pub fn from_config(config: &SearchConfig) -> Result<Arc<dyn SearchBackend>, SearchError> {
    match config.provider {
      SearchProvider::Meilisearch => {
        let backend = MeilisearchBackend::new(config)?;

        // Transient service failures (429s, gateway errors, timeouts) are retried
        let resilient = ResilientBackend::with_config(backend, RetryConfig::from_search_config(config));
        Ok(Arc::new(resilient))
      }
      SearchProvider::Memory => Ok(Arc::new(MemorySearchBackend::new())),
    }
  }
}

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
  #[error("Index {0} not found")]
  IndexNotFound(String),
  #[error("Request failed: {0}")]
  Request(#[from] reqwest::Error),
  #[error("Search service returned {status}: {message}")]
  Service { status: u16, message: String },
  #[error("Network error: {0}")]
  Network(String),
  #[error("Request timed out")]
  Timeout,
  #[error("Service task {task} failed: {reason}")]
  TaskFailed { task: u64, reason: String },
}
