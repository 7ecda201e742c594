//! Avatar Bridge Core
//!
//! The transport-agnostic half of the bridge: command parsing, the actor
//! contract with its simulated implementation, movement target resolution,
//! and the dispatcher that ties them together. The `avatar-bridge` service
//! adds the remote actor, the line engine and the binaries.

pub mod actor;
pub mod command;
pub mod direction;
pub mod dispatcher;
pub mod pose;
pub mod record;
pub mod simulated;
