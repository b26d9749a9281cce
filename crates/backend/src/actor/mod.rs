//! Long-lived tasks of the daemon
//!
//! # Tasks
//!
//! - [`Coordinator`]: owns rebuild cycles and the generation swap
//! - [`Scheduler`]: periodic rebuild triggers and log retention
//! - [`JobTracker`]: lives inside a cycle, polling indexing jobs to completion
//!
//! Components communicate through channels: triggers go in through a
//! [`CoordinatorHandle`], status comes out through a `watch` channel. Shutdown
//! is driven by a `CancellationToken` passed to every task.
//!
//! ```text
//! trigger ─▶ Coordinator ─▶ RecordSource ─▶ CatalogStore (staging)
//!                        └─▶ SearchManager (staging) ─▶ JobTracker ─▶ swap ─▶ cleanup
//! ```

mod coordinator;
pub mod handle;
pub mod message;
mod scheduler;
mod tracker;

#[cfg(test)]
mod __tests__;

pub use coordinator::{Coordinator, CoordinatorConfig, RebuildError};
pub use handle::CoordinatorHandle;
pub use scheduler::{LOG_FILE_PREFIX, Scheduler, SchedulerConfig};
pub use tracker::{JobTracker, TrackerError, TrackerReport};
