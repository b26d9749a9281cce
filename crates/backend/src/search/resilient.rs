// Retrying wrapper around a search backend
//
// - Exponential backoff with jitter
// - Retry on 429, 502, 503, 504 status codes
// - Network errors and timeouts are retried
// - Missing indices and failed service tasks are not

use std::{future::Future, time::Duration};

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::{JobHandle, JobStatus, SearchBackend, SearchDocument, SearchError, SearchQuery};
use crate::config::SearchConfig;

/// Configuration for retried search service calls
#[derive(Debug, Clone)]
pub struct RetryConfig {
  /// Maximum number of retry attempts
  pub max_retries: u32,
  /// Initial backoff duration
  pub initial_backoff: Duration,
  /// Maximum backoff duration
  pub max_backoff: Duration,
  /// Backoff multiplier (exponential factor)
  pub backoff_multiplier: f64,
  /// Whether to add jitter to backoff
  pub add_jitter: bool,
  /// Per-attempt timeout
  pub request_timeout: Duration,
}

impl Default for RetryConfig {
  fn default() -> Self {
    Self {
      max_retries: 3,
      initial_backoff: Duration::from_millis(500),
      max_backoff: Duration::from_secs(30),
      backoff_multiplier: 2.0,
      add_jitter: true,
      request_timeout: Duration::from_secs(30),
    }
  }
}

impl RetryConfig {
  pub fn from_search_config(config: &SearchConfig) -> Self {
    Self {
      max_retries: config.max_retries,
      // Index-level calls also wait for their service task to settle
      request_timeout: config.request_timeout() * 4,
      ..Default::default()
    }
  }

  /// Calculate backoff duration for a given attempt
  pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
    let base = self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
    let mut backoff = Duration::from_secs_f64(base.min(self.max_backoff.as_secs_f64()));

    if self.add_jitter {
      // Add up to 25% jitter
      let jitter_factor = 1.0 + (rand_f64() * 0.25);
      backoff = Duration::from_secs_f64(backoff.as_secs_f64() * jitter_factor);
    }

    backoff.min(self.max_backoff)
  }
}

/// Cheap jitter source from the clock's sub-second nanos.
fn rand_f64() -> f64 {
  use std::time::{SystemTime, UNIX_EPOCH};

  let nanos = SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .unwrap_or_default()
    .subsec_nanos();

  (nanos as f64 / u32::MAX as f64).fract()
}

/// Check if an error is worth retrying
pub fn is_retryable_error(error: &SearchError) -> bool {
  match error {
    SearchError::Network(_) | SearchError::Timeout => true,
    SearchError::Service { status, .. } => matches!(
      status,
      429 // Rate limited
        | 502 // Bad gateway
        | 503 // Service unavailable
        | 504 // Gateway timeout
    ),
    SearchError::Request(e) => e.is_timeout() || e.is_connect(),
    SearchError::IndexNotFound(_) | SearchError::TaskFailed { .. } => false,
  }
}

/// A search backend that retries transient failures of the wrapped backend
pub struct ResilientBackend<B: SearchBackend> {
  inner: B,
  config: RetryConfig,
}

impl<B: SearchBackend> ResilientBackend<B> {
  pub fn with_config(backend: B, config: RetryConfig) -> Self {
    Self { inner: backend, config }
  }

  async fn retry<'a, T, F, Fut>(&'a self, operation: &'static str, mut call: F) -> Result<T, SearchError>
  where
    F: FnMut(&'a B) -> Fut,
    Fut: Future<Output = Result<T, SearchError>>,
  {
    let max_retries = self.config.max_retries;
    let mut attempt = 0;

    loop {
      if attempt > 0 {
        let backoff = self.config.backoff_for_attempt(attempt - 1);
        debug!(
          operation,
          attempt,
          max_retries,
          backoff_ms = backoff.as_millis(),
          "Retrying search call after backoff"
        );
        sleep(backoff).await;
      }

      let error = match tokio::time::timeout(self.config.request_timeout, call(&self.inner)).await {
        Ok(Ok(value)) => {
          if attempt > 0 {
            info!(operation, attempt, "Search call succeeded after retry");
          }
          return Ok(value);
        }
        Ok(Err(e)) => e,
        Err(_) => {
          warn!(
            operation,
            attempt = attempt + 1,
            timeout_ms = self.config.request_timeout.as_millis(),
            "Search call timed out"
          );
          SearchError::Timeout
        }
      };

      if !is_retryable_error(&error) {
        return Err(error);
      }
      if attempt >= max_retries {
        warn!(operation, max_retries, err = %error, "All retries exhausted");
        return Err(error);
      }

      warn!(
        operation,
        attempt = attempt + 1,
        max_retries,
        err = %error,
        "Retryable search error, will retry"
      );
      attempt += 1;
    }
  }
}

#[async_trait]
impl<B: SearchBackend> SearchBackend for ResilientBackend<B> {
  fn name(&self) -> &str {
    self.inner.name()
  }

  async fn index_exists(&self, uid: &str) -> Result<bool, SearchError> {
    self.retry("index_exists", |b| b.index_exists(uid)).await
  }

  async fn create_index(&self, uid: &str) -> Result<(), SearchError> {
    self.retry("create_index", |b| b.create_index(uid)).await
  }

  async fn set_filterable_attributes(&self, uid: &str, attributes: &[&str]) -> Result<(), SearchError> {
    self
      .retry("set_filterable_attributes", |b| b.set_filterable_attributes(uid, attributes))
      .await
  }

  async fn add_documents(&self, uid: &str, documents: &[SearchDocument]) -> Result<JobHandle, SearchError> {
    self.retry("add_documents", |b| b.add_documents(uid, documents)).await
  }

  async fn job_status(&self, job: JobHandle) -> Result<JobStatus, SearchError> {
    self.retry("job_status", |b| b.job_status(job)).await
  }

  async fn delete_index(&self, uid: &str) -> Result<(), SearchError> {
    self.retry("delete_index", |b| b.delete_index(uid)).await
  }

  async fn search(&self, uid: &str, query: &SearchQuery) -> Result<Vec<SearchDocument>, SearchError> {
    self.retry("search", |b| b.search(uid, query)).await
  }
}
