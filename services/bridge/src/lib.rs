//! Avatar Bridge Service Library Crate
//!
//! This library holds the process-level pieces of the bridge: startup
//! configuration, the WebSocket client for the avatar gateway, the
//! line-protocol engine that serves stdin/stdout, and the interactive console
//! that drives a bridge child process. The binaries in `bin/` are thin
//! wrappers around it.

pub mod config;
pub mod console;
pub mod engine;
pub mod remote;
