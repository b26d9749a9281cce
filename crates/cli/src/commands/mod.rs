//! CLI command implementations

mod catalog;
mod config;
mod daemon;
mod rebuild;

pub use catalog::{cmd_get, cmd_scan, cmd_search};
pub use config::{cmd_config_init, cmd_config_show};
pub use daemon::cmd_daemon;
pub use rebuild::{cmd_rebuild, cmd_status};
