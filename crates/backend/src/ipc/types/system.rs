//! System IPC types - daemon status, health and shutdown
use serde::{Deserialize, Serialize};

use crate::{actor::message::CoordinatorStatus, domain::generation::Generation};

// ============================================================================
// Request/Response enums
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "action", content = "params")]
pub enum SystemRequest {
  Ping(PingParams),
  Status(StatusParams),
  Shutdown(ShutdownParams),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "action", content = "data")]
pub enum SystemResponse {
  Ping(String),
  Status(Box<StatusResult>),
  Shutdown { message: String },
}

// ============================================================================
// Request param types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PingParams;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StatusParams;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ShutdownParams;

// ============================================================================
// Status result
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResult {
  pub status: String,
  pub version: String,
  pub uptime_seconds: u64,
  pub requests_total: u64,
  pub foreground: bool,
  /// Name of the search backend in use
  pub search_backend: String,
  pub store_generation: Generation,
  pub search_generation: Generation,
  pub coordinator: CoordinatorStatus,
}

// ============================================================================
// IpcRequest implementations
// ============================================================================

use crate::{
  impl_ipc_request,
  ipc::{RequestData, ResponseData},
};

impl_ipc_request!(
  PingParams => String,
  ResponseData::System(SystemResponse::Ping(v)) => v,
  v => RequestData::System(SystemRequest::Ping(v)),
  v => ResponseData::System(SystemResponse::Ping(v))
);
impl_ipc_request!(
  StatusParams => Box<StatusResult>,
  ResponseData::System(SystemResponse::Status(v)) => v,
  v => RequestData::System(SystemRequest::Status(v)),
  v => ResponseData::System(SystemResponse::Status(v))
);
impl_ipc_request!(
  ShutdownParams => String,
  ResponseData::System(SystemResponse::Shutdown { message }) => message,
  v => RequestData::System(SystemRequest::Shutdown(v))
);
