//! Daemon lifecycle management.
//!
//! The daemon owns the catalog for the lifetime of the process: the store, the
//! search manager, the coordinator that rebuilds them and the IPC server that
//! reads from them.
//!
//! # Architecture
//!
//! ```text
//! Daemon (Supervisor)
//!   ├── Server (IPC listener, one task per connection)
//!   ├── Scheduler (scheduled rebuilds, log retention)
//!   └── Coordinator (rebuild cycles, generation swap)
//!         └── JobTracker (per cycle)
//! ```
//!
//! # Lifecycle
//!
//! 1. Create master `CancellationToken`
//! 2. Create the search backend from config
//! 3. Spawn the `Coordinator` with a child token
//! 4. Spawn the `Scheduler`, queue the startup rebuild
//! 5. Run server until cancelled (signal or `system shutdown`)
//! 6. Graceful shutdown: drain connections, cancel children, wait for tasks

use std::{path::PathBuf, sync::Arc, time::Duration};

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
  actor::{Coordinator, CoordinatorConfig, Scheduler, SchedulerConfig, message::TriggerReason},
  dirs,
  domain::config::Config,
  ingest::RecordSource,
  ipc::{Client, IpcError},
  search::{SearchError, SearchManager},
  server::{Server, ServerConfig, ServerState},
  store::CatalogStore,
};

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
  #[error("Failed to create search backend: {0}")]
  Search(#[from] SearchError),
  #[error("IPC server failed: {0}")]
  Ipc(#[from] IpcError),
}

// ============================================================================
// Configuration
// ============================================================================

/// Daemon runtime configuration.
///
/// Constructed from the global config file with optional overrides.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
  /// Path to the Unix socket for IPC
  pub socket_path: PathBuf,
  /// Base directory for release batches and logs
  pub data_dir: PathBuf,
  /// Run in foreground mode (console logging)
  pub foreground: bool,
  pub config: Config,
}

impl RuntimeConfig {
  pub async fn load() -> Self {
    // Auto-create user config on first run if it doesn't exist
    Self::ensure_user_config().await;

    let config = Config::load_global().await;

    Self {
      socket_path: dirs::default_socket_path(),
      data_dir: dirs::default_data_dir(),
      foreground: false,
      config,
    }
  }

  /// Ensure user config file exists, creating it with defaults if not.
  async fn ensure_user_config() {
    let Some(user_config_path) = Config::user_config_path() else {
      return;
    };

    if user_config_path.exists() {
      return;
    }

    if let Some(parent) = user_config_path.parent()
      && let Err(e) = tokio::fs::create_dir_all(parent).await
    {
      warn!("Failed to create config directory: {}", e);
      return;
    }

    match tokio::fs::write(&user_config_path, Config::generate_template()).await {
      Ok(()) => info!("Created user config: {:?}", user_config_path),
      Err(e) => warn!("Failed to create user config: {}", e),
    }
  }
}

/// The encyclo daemon - manages the entire application lifecycle.
pub struct Daemon {
  runtime_config: RuntimeConfig,
}

impl Daemon {
  pub fn new(runtime_config: RuntimeConfig) -> Self {
    Self { runtime_config }
  }

  /// Connect to an existing daemon, starting one if necessary.
  ///
  /// Spawns a background daemon when none answers, then polls the socket for
  /// up to five seconds.
  pub async fn connect_or_start() -> Result<Client, IpcError> {
    if dirs::is_daemon_running() {
      debug!("Daemon is already running, connecting...");
      return Client::connect().await;
    }

    info!("Daemon is not running, starting in background...");
    let pid = Self::spawn_background().await?;
    debug!("Spawned daemon with PID {}", pid);

    let delay = Duration::from_millis(500);
    tokio::time::sleep(delay).await;

    let socket_path = dirs::default_socket_path();
    let max_attempts = 10;

    for attempt in 1..=max_attempts {
      if let Ok(client) = Client::connect_to(&socket_path).await {
        info!("Successfully connected to daemon");
        return Ok(client);
      }

      debug!("Waiting for daemon to start... (attempt {}/{})", attempt, max_attempts);
      tokio::time::sleep(delay).await;
    }

    Err(IpcError::Connection("Failed to connect to daemon after startup".into()))
  }

  /// Spawn a detached daemon process using the current executable.
  ///
  /// Re-executes the current binary with `daemon --background`, so the child
  /// gets its own Tokio runtime.
  pub async fn spawn_background() -> std::io::Result<i32> {
    use std::process::{Command, Stdio};

    let exe = std::env::current_exe()?;

    let child = Command::new(&exe)
      .arg("daemon")
      .arg("--background")
      .stdin(Stdio::null())
      .stdout(Stdio::null())
      .stderr(Stdio::null())
      .spawn()?;

    let pid = child.id() as i32;
    info!("Spawned daemon process with PID {}", pid);

    Ok(pid)
  }

  /// Run the daemon until a signal or a `system shutdown` request.
  pub async fn run(self) -> Result<(), DaemonError> {
    let RuntimeConfig {
      socket_path,
      data_dir,
      foreground,
      config,
    } = self.runtime_config;

    info!("Starting encyclo daemon");
    info!("Socket: {:?}", socket_path);
    info!("Data dir: {:?}", data_dir);

    // Master cancellation token - propagates to all children
    let cancel = CancellationToken::new();

    let search = Arc::new(SearchManager::from_config(&config.search)?);
    info!(
      backend = search.backend().name(),
      url = %config.search.url,
      batch_size = config.search.document_batch_size,
      "Search backend ready"
    );

    let store = CatalogStore::new();
    let source = <dyn RecordSource>::from_config(&config.ingest, &data_dir);
    info!(source = source.name(), "Record source ready");

    let (coordinator, coordinator_task) = Coordinator::spawn(
      store.clone(),
      Arc::clone(&search),
      source,
      CoordinatorConfig::from_search_config(&config.search),
      cancel.child_token(),
    );

    let scheduler_task = {
      let scheduler = Scheduler::new(
        coordinator.clone(),
        SchedulerConfig {
          rebuild: config.rebuild.clone(),
          daemon: config.daemon.clone(),
          log_dir: data_dir.join("logs"),
        },
      );
      tokio::spawn(scheduler.run(cancel.child_token()))
    };
    info!(
      "Started background scheduler (log retention: {} days)",
      config.daemon.log_retention_days
    );

    if config.rebuild.on_startup {
      let outcome = coordinator.trigger(TriggerReason::Startup);
      info!(outcome = ?outcome, "Startup rebuild requested");
    }

    spawn_signal_handler(cancel.clone());

    let server = Server::new(ServerConfig {
      socket_path,
      state: Arc::new(ServerState::new(
        store,
        search,
        coordinator,
        cancel.clone(),
        foreground,
      )),
      drain_timeout: Duration::from_secs(config.daemon.shutdown_drain_secs),
    });

    let served = server.run(cancel.child_token()).await;
    if let Err(e) = &served {
      warn!("Server error: {}", e);
    }

    info!("Shutting down...");
    cancel.cancel();

    let _ = scheduler_task.await;
    // A cycle that is swapping finishes its flips before the task ends
    let _ = coordinator_task.await;

    info!("Daemon shutdown complete");
    served.map_err(DaemonError::from)
  }
}

/// Cancel on ctrl-c or SIGTERM.
fn spawn_signal_handler(cancel: CancellationToken) {
  tokio::spawn(async move {
    let terminate = async {
      match signal::unix::signal(signal::unix::SignalKind::terminate()) {
        Ok(mut sigterm) => {
          sigterm.recv().await;
        }
        Err(e) => {
          warn!("Failed to listen for SIGTERM: {}", e);
          std::future::pending::<()>().await;
        }
      }
    };

    tokio::select! {
      _ = cancel.cancelled() => return,
      result = signal::ctrl_c() => {
        if let Err(e) = result {
          warn!("Failed to listen for ctrl-c: {}", e);
          return;
        }
        info!("Received ctrl-c, shutting down...");
      }
      _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
    cancel.cancel();
  });
}
