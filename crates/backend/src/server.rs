//! IPC server for the catalog daemon.
//!
//! The server accepts connections on a Unix socket and answers requests
//! directly from the store, the search manager and the coordinator handle.
//! Every connection runs in its own task on a `TaskTracker`, so shutdown can
//! wait for in-flight requests before the daemon exits.

use std::{
  path::PathBuf,
  sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
  },
  time::{Duration, Instant},
};

use futures::{SinkExt, StreamExt};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::{
  codec::{Framed, LinesCodec},
  sync::CancellationToken,
  task::TaskTracker,
};
use tracing::{debug, error, info, trace, warn};

use crate::{
  actor::{CoordinatorHandle, message::TriggerReason},
  ipc::{
    INTERNAL_ERROR, INVALID_PARAMS, IpcError, NOT_FOUND, PARSE_ERROR, Request, RequestData, Response, ResponseData,
    catalog::{CatalogRequest, CatalogResponse, GetResult, ScanResult, SearchParams, SearchResult},
    rebuild::{RebuildRequest, RebuildResponse, RebuildTriggerResult},
    system::{StatusResult, SystemRequest, SystemResponse},
  },
  search::{SearchError, SearchManager},
  store::{CatalogStore, StoreError},
};

// ============================================================================
// Server Configuration
// ============================================================================

/// Shared state every connection reads from.
pub struct ServerState {
  pub store: CatalogStore,
  pub search: Arc<SearchManager>,
  pub coordinator: CoordinatorHandle,
  /// Cancelled by `system shutdown`
  pub shutdown: CancellationToken,
  pub foreground: bool,
  started_at: Instant,
  request_count: AtomicU64,
}

impl ServerState {
  pub fn new(
    store: CatalogStore,
    search: Arc<SearchManager>,
    coordinator: CoordinatorHandle,
    shutdown: CancellationToken,
    foreground: bool,
  ) -> Self {
    Self {
      store,
      search,
      coordinator,
      shutdown,
      foreground,
      started_at: Instant::now(),
      request_count: AtomicU64::new(0),
    }
  }

  pub fn uptime(&self) -> Duration {
    self.started_at.elapsed()
  }

  pub fn requests_total(&self) -> u64 {
    self.request_count.load(Ordering::Relaxed)
  }
}

/// Configuration for the IPC server.
pub struct ServerConfig {
  /// Path to the Unix socket for IPC
  pub socket_path: PathBuf,
  pub state: Arc<ServerState>,
  /// How long shutdown waits for in-flight requests
  pub drain_timeout: Duration,
}

// ============================================================================
// Server
// ============================================================================

pub struct Server {
  config: ServerConfig,
  connections: TaskTracker,
}

impl Server {
  pub fn new(config: ServerConfig) -> Self {
    Self {
      config,
      connections: TaskTracker::new(),
    }
  }

  /// Run the server until the cancellation token is triggered.
  ///
  /// A stale socket file is removed before binding and the socket is removed
  /// again on exit.
  pub async fn run(&self, cancel: CancellationToken) -> Result<(), IpcError> {
    // Remove stale socket file
    if self.config.socket_path.exists() {
      tokio::fs::remove_file(&self.config.socket_path).await?;
    }

    // Create parent directory if needed
    if let Some(parent) = self.config.socket_path.parent() {
      tokio::fs::create_dir_all(parent).await?;
    }

    let listener = UnixListener::bind(&self.config.socket_path)?;
    info!("Server listening on {:?}", self.config.socket_path);

    loop {
      tokio::select! {
        biased;

        _ = cancel.cancelled() => {
            info!("Server shutting down (cancelled)");
            break;
        }

        result = listener.accept() => {
          match result {
            Ok((stream, _)) => {
              let state = Arc::clone(&self.config.state);
              let cancel = cancel.child_token();
              self.connections.spawn(async move {
                if let Err(e) = handle_connection(stream, state, cancel).await {
                  debug!(err = %e, "Connection closed with error");
                }
              });
            }
            Err(e) => {
              error!("Accept error: {}", e);
            }
          }
        }
      }
    }

    drop(listener);
    self.drain().await;

    // Cleanup socket file
    if self.config.socket_path.exists() {
      tokio::fs::remove_file(&self.config.socket_path).await?;
    }

    Ok(())
  }

  async fn drain(&self) {
    self.connections.close();
    if self.connections.is_empty() {
      return;
    }

    debug!(connections = self.connections.len(), "Draining in-flight requests");
    if tokio::time::timeout(self.config.drain_timeout, self.connections.wait())
      .await
      .is_err()
    {
      warn!(
        connections = self.connections.len(),
        timeout_secs = self.config.drain_timeout.as_secs(),
        "Drain timed out, dropping connections"
      );
    }
  }
}

// ============================================================================
// Connection Handler
// ============================================================================

/// Handle a single client connection.
///
/// Requests are newline-delimited JSON objects answered one at a time, in
/// order. Parse errors get an error response and keep the connection open.
/// Cancellation is observed between requests, so a request that has started
/// is always answered.
async fn handle_connection(
  stream: UnixStream,
  state: Arc<ServerState>,
  cancel: CancellationToken,
) -> Result<(), IpcError> {
  debug!("Client connected");
  let framed = Framed::new(stream, LinesCodec::new());
  let (mut sink, mut stream) = framed.split();
  let mut handled = 0u64;

  loop {
    let result = tokio::select! {
      biased;
      _ = cancel.cancelled() => break,
      next = stream.next() => match next {
        Some(result) => result,
        None => break,
      },
    };

    let line = match result {
      Ok(l) => l,
      Err(e) => {
        warn!(error = %e, "Error reading from client");
        break;
      }
    };

    let trimmed = line.trim();
    if trimmed.is_empty() {
      continue;
    }

    state.request_count.fetch_add(1, Ordering::Relaxed);
    handled += 1;

    let request: Request = match serde_json::from_str(trimmed) {
      Ok(r) => r,
      Err(e) => {
        warn!("Invalid request JSON: {}", e);
        let response = Response::rpc_error("unknown", PARSE_ERROR, format!("Parse error: {}", e));
        sink.send(serde_json::to_string(&response)?).await?;
        continue;
      }
    };

    let start = Instant::now();
    let method = request.data.name();
    trace!(method, id = %request.id, "Processing request");

    let response = match dispatch(&state, request.data).await {
      Ok(data) => Response::success(&request.id, data),
      Err(error) => Response::error(&request.id, error),
    };
    sink.send(serde_json::to_string(&response)?).await?;

    debug!(
      id = %request.id,
      method,
      ok = response.is_ok(),
      elapsed_ms = start.elapsed().as_millis() as u64,
      "Request completed"
    );
  }

  debug!(requests_handled = handled, "Client disconnected");
  Ok(())
}

// ============================================================================
// Dispatch
// ============================================================================

async fn dispatch(state: &ServerState, data: RequestData) -> Result<ResponseData, IpcError> {
  match data {
    RequestData::System(request) => Ok(ResponseData::System(handle_system(state, request))),
    RequestData::Rebuild(request) => Ok(ResponseData::Rebuild(handle_rebuild(state, request))),
    RequestData::Catalog(request) => handle_catalog(state, request).await.map(ResponseData::Catalog),
  }
}

fn handle_system(state: &ServerState, request: SystemRequest) -> SystemResponse {
  match request {
    SystemRequest::Ping(_) => SystemResponse::Ping("pong".to_string()),
    SystemRequest::Status(_) => SystemResponse::Status(Box::new(StatusResult {
      status: "running".to_string(),
      version: env!("CARGO_PKG_VERSION").to_string(),
      uptime_seconds: state.uptime().as_secs(),
      requests_total: state.requests_total(),
      foreground: state.foreground,
      search_backend: state.search.backend().name().to_string(),
      store_generation: state.store.current_generation(),
      search_generation: state.search.current_generation(),
      coordinator: state.coordinator.status(),
    })),
    SystemRequest::Shutdown(_) => {
      info!("Shutdown requested over IPC");
      state.shutdown.cancel();
      SystemResponse::Shutdown {
        message: "Daemon shutting down".to_string(),
      }
    }
  }
}

fn handle_rebuild(state: &ServerState, request: RebuildRequest) -> RebuildResponse {
  match request {
    RebuildRequest::Trigger(_) => {
      let outcome = state.coordinator.trigger(TriggerReason::Operator);
      info!(outcome = ?outcome, "Operator rebuild requested");
      RebuildResponse::Trigger(RebuildTriggerResult { outcome })
    }
    RebuildRequest::Status(_) => RebuildResponse::Status(Box::new(state.coordinator.status())),
  }
}

async fn handle_catalog(state: &ServerState, request: CatalogRequest) -> Result<CatalogResponse, IpcError> {
  match request {
    CatalogRequest::Get(params) => {
      let read = state.store.begin_read();
      let record = read.get(params.kind, params.id).map_err(store_error)?;
      Ok(CatalogResponse::Get(GetResult {
        generation: read.generation(),
        record,
      }))
    }
    CatalogRequest::Scan(params) => {
      let read = state.store.begin_read();
      let records = read
        .scan(params.kind)
        .skip(params.offset)
        .take(params.limit)
        .cloned()
        .collect();
      Ok(CatalogResponse::Scan(ScanResult {
        generation: read.generation(),
        total: read.len(params.kind),
        offset: params.offset,
        records,
      }))
    }
    CatalogRequest::Search(params) => search(state, params).await.map(CatalogResponse::Search),
  }
}

async fn search(state: &ServerState, params: SearchParams) -> Result<SearchResult, IpcError> {
  if !params.kind.is_searchable() {
    return Err(IpcError::Rpc {
      code: INVALID_PARAMS,
      message: format!("{} is not searchable", params.kind),
    });
  }
  let filterable = params.kind.filterable_attributes();
  if let Some(filter) = params.filters.iter().find(|f| !filterable.contains(&f.attribute())) {
    return Err(IpcError::Rpc {
      code: INVALID_PARAMS,
      message: format!(
        "{} cannot be filtered on {}; filterable: {}",
        params.kind,
        filter.attribute(),
        filterable.join(", ")
      ),
    });
  }

  let generation = state.search.current_generation();
  let hits = state
    .search
    .search(params.kind, params.language, &params.to_query())
    .await
    .map_err(search_error)?;
  Ok(SearchResult { generation, hits })
}

fn store_error(err: StoreError) -> IpcError {
  let code = match err {
    StoreError::NotFound { .. } => NOT_FOUND,
    _ => INTERNAL_ERROR,
  };
  IpcError::Rpc {
    code,
    message: err.to_string(),
  }
}

fn search_error(err: SearchError) -> IpcError {
  warn!(err = %err, "Search failed");
  IpcError::Rpc {
    code: INTERNAL_ERROR,
    message: err.to_string(),
  }
}

// ============================================================================
// Tests
// ============================================================================
