//! IPC module - client/server communication and type definitions
use serde::{Deserialize, Serialize};

pub mod types;

pub mod client;

pub use client::{Client, IpcRequest};
pub use types::*;

/// Request line could not be parsed.
pub const PARSE_ERROR: i32 = -32700;
/// Parameters were well-formed but refer to something invalid.
pub const INVALID_PARAMS: i32 = -32602;
/// The requested record does not exist.
pub const NOT_FOUND: i32 = -32004;
/// The daemon failed while serving the request.
pub const INTERNAL_ERROR: i32 = -32000;

#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize)]
pub enum IpcError {
  #[error("Ser/de error: {0}")]
  Serde(String),
  #[error("RPC error {code}: {message}")]
  Rpc { code: i32, message: String },
  #[error("No result in response")]
  NoResult,
  #[error("IO error: {0}")]
  Io(String),
  #[error("Server shutdown")]
  Shutdown,
  #[error("Connection error: {0}")]
  Connection(String),
  #[error("Codec error: {0}")]
  Codec(String),
}

impl From<serde_json::Error> for IpcError {
  fn from(err: serde_json::Error) -> Self {
    IpcError::Serde(err.to_string())
  }
}

impl From<std::io::Error> for IpcError {
  fn from(err: std::io::Error) -> Self {
    IpcError::Io(err.to_string())
  }
}

impl From<tokio_util::codec::LinesCodecError> for IpcError {
  fn from(err: tokio_util::codec::LinesCodecError) -> Self {
    IpcError::Codec(err.to_string())
  }
}

// ============================================================================
// Request/Response envelopes (top-level IPC protocol)
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
  pub id: String,
  #[serde(flatten)]
  pub data: RequestData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "method", content = "params")]
pub enum RequestData {
  System(system::SystemRequest),
  Rebuild(rebuild::RebuildRequest),
  Catalog(catalog::CatalogRequest),
}

impl RequestData {
  /// Method and action, for logging.
  pub fn name(&self) -> &'static str {
    match self {
      RequestData::System(r) => match r {
        system::SystemRequest::Ping(_) => "system.ping",
        system::SystemRequest::Status(_) => "system.status",
        system::SystemRequest::Shutdown(_) => "system.shutdown",
      },
      RequestData::Rebuild(r) => match r {
        rebuild::RebuildRequest::Trigger(_) => "rebuild.trigger",
        rebuild::RebuildRequest::Status(_) => "rebuild.status",
      },
      RequestData::Catalog(r) => match r {
        catalog::CatalogRequest::Get(_) => "catalog.get",
        catalog::CatalogRequest::Scan(_) => "catalog.scan",
        catalog::CatalogRequest::Search(_) => "catalog.search",
      },
    }
  }
}

// ============================================================================
// Response envelope
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
  pub id: String,
  #[serde(flatten)]
  pub scenario: ResponseScenario,
}

impl Response {
  pub fn is_ok(&self) -> bool {
    !self.is_error()
  }

  pub fn is_error(&self) -> bool {
    matches!(self.scenario, ResponseScenario::Error { .. })
  }

  pub fn get_data(&self) -> Option<&ResponseData> {
    match &self.scenario {
      ResponseScenario::Result { result } => Some(result),
      _ => None,
    }
  }

  pub fn get_error(&self) -> Option<&IpcError> {
    match &self.scenario {
      ResponseScenario::Error { error } => Some(error),
      _ => None,
    }
  }

  /// Create a success response with typed data
  pub fn success(id: impl Into<String>, result: ResponseData) -> Self {
    Self {
      id: id.into(),
      scenario: ResponseScenario::Result { result },
    }
  }

  /// Create an error response
  pub fn error(id: impl Into<String>, error: IpcError) -> Self {
    Self {
      id: id.into(),
      scenario: ResponseScenario::Error { error },
    }
  }

  /// Create an RPC error response with code and message
  pub fn rpc_error(id: impl Into<String>, code: i32, message: impl Into<String>) -> Self {
    Self::error(
      id,
      IpcError::Rpc {
        code,
        message: message.into(),
      },
    )
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseScenario {
  Error { error: IpcError },
  Result { result: ResponseData },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "method", content = "data")]
pub enum ResponseData {
  System(system::SystemResponse),
  Rebuild(rebuild::RebuildResponse),
  Catalog(catalog::CatalogResponse),
}
