//! IPC types - unified request/response types with conversions
//!
//! Each method has its own module containing:
//! - Request types (input parameters)
//! - Response types (output data)
//! - `IpcRequest` implementations tying the two together

pub mod catalog;
pub mod rebuild;
pub mod system;
