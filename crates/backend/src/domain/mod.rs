//! Domain types - core catalog entities
//!
//! Generation tags, content kinds, typed records and configuration. These types
//! are shared by the store, the search layer and the IPC surface, and carry no
//! persistence concerns of their own.

pub mod config;
pub mod content;
pub mod generation;
pub mod record;
