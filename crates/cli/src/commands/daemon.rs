//! Daemon command

use anyhow::{Context, Result};
use encyclo::{Daemon, RuntimeConfig, dirs};
use tracing::info;

use crate::logging::init_daemon_logging;

/// Start the daemon.
///
/// Without flags a detached background process is spawned and this command
/// returns once it has been started.
pub async fn cmd_daemon(foreground: bool, background: bool) -> Result<()> {
  if dirs::is_daemon_running() {
    println!("Daemon already running on {:?}", dirs::default_socket_path());
    return Ok(());
  }

  if !foreground && !background {
    let pid = Daemon::spawn_background()
      .await
      .context("Failed to spawn daemon process")?;
    println!("Started daemon (PID {})", pid);
    return Ok(());
  }

  let runtime = RuntimeConfig {
    foreground,
    ..RuntimeConfig::load().await
  };
  let _guard = init_daemon_logging(&runtime.config.daemon, &runtime.data_dir.join("logs"), foreground);

  info!(foreground, "Starting encyclo daemon");
  Daemon::new(runtime).run().await.context("Daemon failed")?;

  Ok(())
}
