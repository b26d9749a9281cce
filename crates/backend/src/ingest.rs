//! Record batch sources.
//!
//! Downloading and unpacking game releases happens elsewhere. A rebuild cycle
//! only asks a [`RecordSource`] for the finished, typed batch.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::{config::IngestConfig, domain::record::RecordBatch};

#[derive(Debug, thiserror::Error)]
pub enum IngestionError {
  #[error("Failed to read {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("Invalid record batch in {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },
  #[error("Record source unavailable: {0}")]
  Unavailable(String),
}

/// Yields the record batch for one rebuild cycle.
#[async_trait]
pub trait RecordSource: Send + Sync {
  fn name(&self) -> &str;

  async fn fetch(&self) -> Result<RecordBatch, IngestionError>;
}

impl dyn RecordSource {
  pub fn from_config(config: &IngestConfig, data_dir: &Path) -> Arc<dyn RecordSource> {
    Arc::new(FileSource::new(config.batch_path_or_default(data_dir)))
  }
}

// ============================================================================
// File source
// ============================================================================

/// Reads a prepared JSON batch from disk on every fetch.
#[derive(Debug, Clone)]
pub struct FileSource {
  path: PathBuf,
}

impl FileSource {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }
}

#[async_trait]
impl RecordSource for FileSource {
  fn name(&self) -> &str {
    "file"
  }

  async fn fetch(&self) -> Result<RecordBatch, IngestionError> {
    debug!(path = %self.path.display(), "Reading record batch");
    let bytes = tokio::fs::read(&self.path).await.map_err(|source| IngestionError::Io {
      path: self.path.clone(),
      source,
    })?;

    let batch: RecordBatch = serde_json::from_slice(&bytes).map_err(|source| IngestionError::Parse {
      path: self.path.clone(),
      source,
    })?;

    info!(
      path = %self.path.display(),
      items = batch.items.len(),
      sets = batch.sets.len(),
      mounts = batch.mounts.len(),
      recipes = batch.recipes.len(),
      "Record batch loaded"
    );
    Ok(batch)
  }
}

// ============================================================================
// Static source
// ============================================================================

/// Serves the same batch on every fetch.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
  batch: RecordBatch,
}

impl StaticSource {
  pub fn new(batch: RecordBatch) -> Self {
    Self { batch }
  }
}

#[async_trait]
impl RecordSource for StaticSource {
  fn name(&self) -> &str {
    "static"
  }

  async fn fetch(&self) -> Result<RecordBatch, IngestionError> {
    Ok(self.batch.clone())
  }
}
