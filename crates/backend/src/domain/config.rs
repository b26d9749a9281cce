//! Configuration system for encyclo.
//!
//! Config priority: explicit path > user (~/.config/encyclo/config.toml) > defaults.
//! Every section is `#[serde(default)]`, so a partial file only overrides what it names.

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

// ============================================================================
// Search Configuration
// ============================================================================

/// Search backend options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SearchProvider {
  /// External Meilisearch-compatible service
  #[default]
  Meilisearch,
  /// In-process index (single node, no persistence)
  Memory,
}

/// Full-text search service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
  /// Which search backend to use
  pub provider: SearchProvider,

  /// Base URL of the search service (only used when provider = meilisearch)
  pub url: String,

  /// API key for the search service.
  /// If not set, reads from MEILI_MASTER_KEY env var
  #[serde(skip_serializing_if = "Option::is_none")]
  pub api_key: Option<String>,

  /// Documents per bulk submission; each submission yields one indexing job (default: 250)
  pub document_batch_size: usize,

  /// Number of (content kind, language) indices populated concurrently (default: 8)
  pub index_concurrency: usize,

  /// Indexing job poll interval in milliseconds (default: 3000)
  pub task_poll_interval_ms: u64,

  /// Maximum time to wait for all indexing jobs of a cycle (default: 1800)
  pub index_timeout_secs: u64,

  /// Per-request HTTP timeout in seconds (default: 30)
  pub request_timeout_secs: u64,

  /// Retries for transient search service failures (default: 3)
  pub max_retries: u32,
}

impl Default for SearchConfig {
  fn default() -> Self {
    Self {
      provider: SearchProvider::Meilisearch,
      url: "http://localhost:7700".to_string(),
      api_key: None,
      document_batch_size: 250,
      index_concurrency: 8,
      task_poll_interval_ms: 3000,
      index_timeout_secs: 1800,
      request_timeout_secs: 30,
      max_retries: 3,
    }
  }
}

impl SearchConfig {
  pub fn task_poll_interval(&self) -> Duration {
    Duration::from_millis(self.task_poll_interval_ms.max(1))
  }

  pub fn index_timeout(&self) -> Duration {
    Duration::from_secs(self.index_timeout_secs)
  }

  pub fn request_timeout(&self) -> Duration {
    Duration::from_secs(self.request_timeout_secs.max(1))
  }

  /// Configured API key, falling back to the environment.
  pub fn resolved_api_key(&self) -> Option<String> {
    if let Some(key) = &self.api_key {
      return Some(key.clone());
    }
    match std::env::var("MEILI_MASTER_KEY") {
      Ok(key) if !key.is_empty() => {
        debug!("MEILI_MASTER_KEY found in environment");
        Some(key)
      }
      _ => None,
    }
  }
}

// ============================================================================
// Ingestion Configuration
// ============================================================================

/// Where finished record batches are picked up from
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
  /// Path of the JSON record batch produced by the release unpacker.
  /// Default: <data_dir>/release/batch.json
  #[serde(skip_serializing_if = "Option::is_none")]
  pub batch_path: Option<PathBuf>,
}

impl IngestConfig {
  pub fn batch_path_or_default(&self, data_dir: &Path) -> PathBuf {
    self
      .batch_path
      .clone()
      .unwrap_or_else(|| data_dir.join("release").join("batch.json"))
  }
}

// ============================================================================
// Rebuild Configuration
// ============================================================================

/// When rebuild cycles are triggered
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RebuildConfig {
  /// Run a rebuild as soon as the daemon starts (default: true)
  pub on_startup: bool,

  /// Scheduled rebuild interval in seconds; 0 disables scheduled rebuilds (default: 0)
  pub interval_secs: u64,
}

impl Default for RebuildConfig {
  fn default() -> Self {
    Self {
      on_startup: true,
      interval_secs: 0,
    }
  }
}

// ============================================================================
// Daemon Configuration
// ============================================================================

/// Daemon lifecycle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
  /// Log level: "off", "error", "warn", "info", "debug", "trace"
  /// Default: "info"
  pub log_level: String,

  /// Log file rotation: "daily", "hourly", "never"
  /// Default: "daily"
  pub log_rotation: String,

  /// Maximum log file age in days (0 = keep forever)
  /// Default: 7
  pub log_retention_days: u64,

  /// Seconds to wait for in-flight requests on shutdown
  /// Default: 10
  pub shutdown_drain_secs: u64,
}

impl Default for DaemonConfig {
  fn default() -> Self {
    Self {
      log_level: "info".to_string(),
      log_rotation: "daily".to_string(),
      log_retention_days: 7,
      shutdown_drain_secs: 10,
    }
  }
}

// ============================================================================
// Main Configuration
// ============================================================================

/// encyclo configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Search service settings
  pub search: SearchConfig,

  /// Record batch source settings
  pub ingest: IngestConfig,

  /// Rebuild trigger settings
  pub rebuild: RebuildConfig,

  /// Daemon lifecycle settings
  pub daemon: DaemonConfig,
}

impl Config {
  /// Load the user config, falling back to defaults.
  pub async fn load_global() -> Self {
    match Self::user_config_path() {
      Some(path) => Self::load_from(&path).await.unwrap_or_default(),
      None => Self::default(),
    }
  }

  /// Load config from a specific file.
  ///
  /// Returns `None` if the file is missing or invalid; invalid files are logged.
  pub async fn load_from(path: &Path) -> Option<Self> {
    let content = tokio::fs::read_to_string(path).await.ok()?;
    match toml::from_str(&content) {
      Ok(config) => Some(config),
      Err(e) => {
        warn!(path = %path.display(), err = %e, "Ignoring invalid config file");
        None
      }
    }
  }

  /// Get the user-level config path
  pub fn user_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("CONFIG_DIR") {
      return Some(PathBuf::from(path).join("config.toml"));
    }

    if let Ok(path) = std::env::var("XDG_CONFIG_HOME") {
      return Some(PathBuf::from(path).join("encyclo").join("config.toml"));
    }

    dirs::config_dir().map(|p: PathBuf| p.join("encyclo").join("config.toml"))
  }

  /// Generate a default config file as a string
  pub fn generate_template() -> String {
    let defaults = Self::default();
    format!(
      r#"# encyclo configuration
# Place in ~/.config/encyclo/config.toml

# ============================================================================
# Search Service
# ============================================================================

[search]
# Backend: "meilisearch" (external service) or "memory" (in-process)
provider = "meilisearch"
url = "{url}"
# api_key = "..."          # falls back to MEILI_MASTER_KEY

# Documents per bulk submission (one indexing job each)
document_batch_size = {batch}
# Indices populated concurrently during a rebuild
index_concurrency = {concurrency}
# How often outstanding indexing jobs are polled
task_poll_interval_ms = {poll}
# Abort a rebuild if indexing jobs take longer than this
index_timeout_secs = {timeout}
request_timeout_secs = {request_timeout}
max_retries = {retries}

# ============================================================================
# Ingestion
# ============================================================================

[ingest]
# batch_path = "/var/lib/encyclo/release/batch.json"

# ============================================================================
# Rebuilds
# ============================================================================

[rebuild]
on_startup = {on_startup}
# 0 disables scheduled rebuilds
interval_secs = {interval}

# ============================================================================
# Daemon
# ============================================================================

[daemon]
log_level = "{log_level}"
# daily, hourly, never
log_rotation = "{log_rotation}"
log_retention_days = {retention}
shutdown_drain_secs = {drain}
"#,
      url = defaults.search.url,
      batch = defaults.search.document_batch_size,
      concurrency = defaults.search.index_concurrency,
      poll = defaults.search.task_poll_interval_ms,
      timeout = defaults.search.index_timeout_secs,
      request_timeout = defaults.search.request_timeout_secs,
      retries = defaults.search.max_retries,
      on_startup = defaults.rebuild.on_startup,
      interval = defaults.rebuild.interval_secs,
      log_level = defaults.daemon.log_level,
      log_rotation = defaults.daemon.log_rotation,
      retention = defaults.daemon.log_retention_days,
      drain = defaults.daemon.shutdown_drain_secs,
    )
  }
}
