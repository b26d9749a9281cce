pub mod actor;
pub mod ingest;
pub mod search;
pub mod store;
mod server;

pub mod domain;
pub use domain::config;

pub mod dirs;
pub mod ipc;

mod daemon;
pub use daemon::{Daemon, DaemonError, RuntimeConfig};
