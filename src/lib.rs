//! toolgate - Tool dispatch and path security core
//!
//! The trust boundary between a language model's tool calls and the host:
//! a registry of schema-described tools, structural argument validation, a
//! path guard that confines filesystem access to a project root, and an
//! executor that isolates each call behind a timeout.
//!
//! # Architecture
//!
//! - **tools::schema / registry**: Tool definitions and the shared registry
//! - **tools::security**: Path guard
//! - **tools::executor**: Parse, validate, enrich, dispatch
//! - **tools::runtime**: Built-in filesystem tools wired to one project root

pub mod cli;
pub mod config;
pub mod errors;
pub mod tools;

// Re-export commonly used types
pub use errors::{GateError, Result};
