use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, trace, warn};

use super::{Filter, FilterValue, JobHandle, JobStatus, SearchBackend, SearchDocument, SearchError, SearchQuery};
use crate::config::SearchConfig;

/// Upper bound on waiting for an index-level task (create, configure, delete).
const SETTLE_TIMEOUT: Duration = Duration::from_secs(120);
const SETTLE_POLL_MIN: Duration = Duration::from_millis(50);
const SETTLE_POLL_MAX: Duration = Duration::from_secs(1);

/// REST client for a Meilisearch-compatible search service.
#[derive(Debug, Clone)]
pub struct MeilisearchBackend {
  client: reqwest::Client,
  base_url: String,
  api_key: Option<String>,
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateIndexRequest<'a> {
  uid: &'a str,
  primary_key: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnqueuedTask {
  task_uid: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
enum TaskState {
  Enqueued,
  Processing,
  Succeeded,
  Failed,
  Canceled,
}

#[derive(Debug, Deserialize)]
struct TaskView {
  status: TaskState,
  #[serde(default)]
  error: Option<ServiceErrorBody>,
}

#[derive(Debug, Default, Deserialize)]
struct ServiceErrorBody {
  #[serde(default)]
  message: String,
  #[serde(default)]
  code: String,
}

#[serde_with::skip_serializing_none]
#[derive(Serialize)]
struct SearchRequest<'a> {
  q: &'a str,
  filter: Option<String>,
  limit: usize,
}

#[derive(Deserialize)]
struct SearchResponse {
  hits: Vec<SearchDocument>,
}

impl TaskView {
  fn job_status(&self) -> JobStatus {
    match self.status {
      TaskState::Enqueued | TaskState::Processing => JobStatus::Pending,
      TaskState::Succeeded => JobStatus::Succeeded,
      TaskState::Failed => JobStatus::Failed {
        reason: self
          .error
          .as_ref()
          .map(|e| e.message.clone())
          .unwrap_or_else(|| "task failed".to_string()),
      },
      TaskState::Canceled => JobStatus::Failed {
        reason: "task canceled".to_string(),
      },
    }
  }

  fn error_code(&self) -> Option<&str> {
    self.error.as_ref().map(|e| e.code.as_str())
  }
}

// ============================================================================
// Filter rendering
// ============================================================================

fn render_value(value: &FilterValue) -> String {
  match value {
    FilterValue::Number(n) => n.to_string(),
    FilterValue::Text(s) => format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
  }
}

/// Render filters to the service's expression syntax, joined with `AND`.
pub(crate) fn render_filters(filters: &[Filter]) -> Option<String> {
  let clauses: Vec<String> = filters
    .iter()
    .flat_map(|filter| match filter {
      Filter::Eq { attribute, value } => vec![format!("{} = {}", attribute, render_value(value))],
      Filter::Range { attribute, min, max } => min
        .map(|m| format!("{} >= {}", attribute, m))
        .into_iter()
        .chain(max.map(|m| format!("{} <= {}", attribute, m)))
        .collect(),
    })
    .collect();

  if clauses.is_empty() { None } else { Some(clauses.join(" AND ")) }
}

// ============================================================================
// Client
// ============================================================================

impl MeilisearchBackend {
  pub fn new(config: &SearchConfig) -> Result<Self, SearchError> {
    let client = reqwest::Client::builder()
      .timeout(config.request_timeout())
      .build()?;
    let api_key = config.resolved_api_key();

    info!(
      url = %config.url,
      has_api_key = api_key.is_some(),
      "Meilisearch backend initialized"
    );

    Ok(Self {
      client,
      base_url: config.url.trim_end_matches('/').to_string(),
      api_key,
    })
  }

  fn url(&self, path: &str) -> String {
    format!("{}{}", self.base_url, path)
  }

  /// Send a request, mapping transport and non-2xx failures to [`SearchError`].
  ///
  /// `index` names the index the request targets, used to report a missing index.
  async fn send(&self, request: reqwest::RequestBuilder, index: Option<&str>) -> Result<reqwest::Response, SearchError> {
    let request = match &self.api_key {
      Some(key) => request.bearer_auth(key),
      None => request,
    };

    let response = match request.send().await {
      Ok(resp) => resp,
      Err(e) => {
        warn!(err = %e, "Network error talking to search service");
        if e.is_timeout() {
          return Err(SearchError::Timeout);
        }
        return Err(SearchError::Network(e.to_string()));
      }
    };

    let status = response.status();
    if status.is_success() {
      return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let parsed: ServiceErrorBody = serde_json::from_str(&body).unwrap_or_default();

    if let Some(uid) = index
      && parsed.code == "index_not_found"
    {
      return Err(SearchError::IndexNotFound(uid.to_string()));
    }

    if status.as_u16() == 401 || status.as_u16() == 403 {
      error!(status = %status, "Search service authentication failed");
    } else {
      warn!(status = %status, code = %parsed.code, "Search service request failed");
    }

    Err(SearchError::Service {
      status: status.as_u16(),
      message: body,
    })
  }

  async fn task(&self, task_uid: u64) -> Result<TaskView, SearchError> {
    let response = self
      .send(self.client.get(self.url(&format!("/tasks/{}", task_uid))), None)
      .await?;
    Ok(response.json().await?)
  }

  /// Wait for an index-level task to finish. Fails if it failed.
  async fn wait_for_task(&self, task_uid: u64, index: &str) -> Result<(), SearchError> {
    let start = Instant::now();
    let mut delay = SETTLE_POLL_MIN;

    loop {
      let task = self.task(task_uid).await?;
      match task.job_status() {
        JobStatus::Succeeded => {
          trace!(task_uid, elapsed_ms = start.elapsed().as_millis(), "Service task settled");
          return Ok(());
        }
        JobStatus::Failed { reason } => {
          if task.error_code() == Some("index_not_found") {
            return Err(SearchError::IndexNotFound(index.to_string()));
          }
          return Err(SearchError::TaskFailed { task: task_uid, reason });
        }
        JobStatus::Pending => {}
      }

      if start.elapsed() >= SETTLE_TIMEOUT {
        warn!(task_uid, index, "Gave up waiting for service task");
        return Err(SearchError::Timeout);
      }
      tokio::time::sleep(delay).await;
      delay = (delay * 2).min(SETTLE_POLL_MAX);
    }
  }

  async fn enqueue(&self, request: reqwest::RequestBuilder, index: &str) -> Result<u64, SearchError> {
    let response = self.send(request, Some(index)).await?;
    let task: EnqueuedTask = response.json().await?;
    Ok(task.task_uid)
  }
}

#[async_trait]
impl SearchBackend for MeilisearchBackend {
  fn name(&self) -> &str {
    "meilisearch"
  }

  async fn index_exists(&self, uid: &str) -> Result<bool, SearchError> {
    let request = self.client.get(self.url(&format!("/indexes/{}", uid)));
    match self.send(request, Some(uid)).await {
      Ok(_) => Ok(true),
      Err(SearchError::IndexNotFound(_)) => Ok(false),
      Err(e) => Err(e),
    }
  }

  async fn create_index(&self, uid: &str) -> Result<(), SearchError> {
    let request = self.client.post(self.url("/indexes")).json(&CreateIndexRequest {
      uid,
      primary_key: "id",
    });
    let task = self.enqueue(request, uid).await?;
    debug!(uid, task, "Index creation enqueued");
    self.wait_for_task(task, uid).await
  }

  async fn set_filterable_attributes(&self, uid: &str, attributes: &[&str]) -> Result<(), SearchError> {
    let request = self
      .client
      .put(self.url(&format!("/indexes/{}/settings/filterable-attributes", uid)))
      .json(attributes);
    let task = self.enqueue(request, uid).await?;
    self.wait_for_task(task, uid).await
  }

  async fn add_documents(&self, uid: &str, documents: &[SearchDocument]) -> Result<JobHandle, SearchError> {
    let request = self
      .client
      .post(self.url(&format!("/indexes/{}/documents?primaryKey=id", uid)))
      .json(documents);
    let task = self.enqueue(request, uid).await?;
    trace!(uid, task, count = documents.len(), "Document batch enqueued");
    Ok(JobHandle(task))
  }

  async fn job_status(&self, job: JobHandle) -> Result<JobStatus, SearchError> {
    Ok(self.task(job.0).await?.job_status())
  }

  async fn delete_index(&self, uid: &str) -> Result<(), SearchError> {
    let request = self.client.delete(self.url(&format!("/indexes/{}", uid)));
    let task = self.enqueue(request, uid).await?;
    self.wait_for_task(task, uid).await
  }

  async fn search(&self, uid: &str, query: &SearchQuery) -> Result<Vec<SearchDocument>, SearchError> {
    let request = self
      .client
      .post(self.url(&format!("/indexes/{}/search", uid)))
      .json(&SearchRequest {
        q: &query.query,
        filter: render_filters(&query.filters),
        limit: query.limit,
      });
    let response: SearchResponse = self.send(request, Some(uid)).await?.json().await?;
    Ok(response.hits)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_render_filters() {
    let filters = vec![
      Filter::Eq {
        attribute: "type_name".to_string(),
        value: FilterValue::Text("Hat \"deluxe\"".to_string()),
      },
      Filter::Range {
        attribute: "level".to_string(),
        min: Some(10),
        max: Some(60),
      },
      Filter::Range {
        attribute: "level".to_string(),
        min: None,
        max: None,
      },
    ];
    assert_eq!(
      render_filters(&filters).as_deref(),
      Some(r#"type_name = "Hat \"deluxe\"" AND level >= 10 AND level <= 60"#)
    );
    assert_eq!(render_filters(&[]), None);
  }

  #[test]
  fn test_task_view_status_mapping() {
    let task: TaskView = serde_json::from_str(r#"{"uid":4,"status":"processing"}"#).unwrap();
    assert_eq!(task.job_status(), JobStatus::Pending);

    let task: TaskView = serde_json::from_str(
      r#"{"uid":5,"status":"failed","error":{"message":"Index `a-sets-en` not found.","code":"index_not_found"}}"#,
    )
    .unwrap();
    assert_eq!(task.error_code(), Some("index_not_found"));
    assert!(matches!(task.job_status(), JobStatus::Failed { reason } if reason.contains("not found")));

    let task: TaskView = serde_json::from_str(r#"{"uid":6,"status":"canceled"}"#).unwrap();
    assert!(task.job_status().is_terminal());
  }

  #[test]
  fn test_base_url_trailing_slash_trimmed() {
    let config = SearchConfig {
      url: "http://search:7700/".to_string(),
      api_key: Some("key".to_string()),
      ..Default::default()
    };
    let backend = MeilisearchBackend::new(&config).unwrap();
    assert_eq!(backend.url("/tasks/1"), "http://search:7700/tasks/1");
  }
}
