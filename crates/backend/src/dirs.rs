use std::path::PathBuf;

/// Get the default socket path
pub fn default_socket_path() -> PathBuf {
  // Try XDG_RUNTIME_DIR first, fallback to /tmp
  if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
    PathBuf::from(runtime_dir).join("encyclo.sock")
  } else {
    let uid = unsafe { libc::getuid() };
    PathBuf::from(format!("/tmp/encyclo-{}.sock", uid))
  }
}

/// Check if a daemon is accepting connections at the default socket path.
pub fn is_daemon_running() -> bool {
  std::os::unix::net::UnixStream::connect(default_socket_path()).is_ok()
}

/// Get the default base path for encyclo data (release batches, logs)
///
/// Respects the following environment variables (in order of precedence):
/// 1. DATA_DIR - explicit data directory override
/// 2. XDG_DATA_HOME - standard XDG data home directory
/// 3. dirs::data_local_dir() - platform default
pub fn default_data_dir() -> PathBuf {
  if let Ok(dir) = std::env::var("DATA_DIR") {
    return PathBuf::from(dir);
  }

  if let Ok(xdg_data) = std::env::var("XDG_DATA_HOME") {
    return PathBuf::from(xdg_data).join("encyclo");
  }

  dirs::data_local_dir()
    .unwrap_or_else(|| PathBuf::from("."))
    .join("encyclo")
}

/// Get the default config directory
///
/// Same precedence as [`crate::config::Config::user_config_path`]:
/// CONFIG_DIR, then XDG_CONFIG_HOME, then dirs::config_dir().
pub fn default_config_dir() -> PathBuf {
  if let Ok(dir) = std::env::var("CONFIG_DIR") {
    return PathBuf::from(dir);
  }

  if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
    return PathBuf::from(xdg_config).join("encyclo");
  }

  dirs::config_dir()
    .unwrap_or_else(|| PathBuf::from("."))
    .join("encyclo")
}

/// Directory the daemon writes rolling log files into.
pub fn default_log_dir() -> PathBuf {
  default_data_dir().join("logs")
}
