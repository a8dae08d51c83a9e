//! Core shared library for the logtail client.
//!
//! This crate exposes the primitives the engine and the command line
//! depend on: common errors, configuration loading, target validation,
//! the live WebSocket feed and logging setup.

pub mod config;
pub mod errors;
pub mod logging;
pub mod target;
pub mod websocket;

pub use errors::{Result as CoreResult, TailError};
pub use target::Target;
