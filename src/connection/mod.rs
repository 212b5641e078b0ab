//! Connections
//!
//! A connection is one transmit or receive media flow. It owns a buffer pool,
//! an ordered in-flight queue, a deadline per payload and a callback
//! dispatcher. Connections are addressed through a generation-checked arena.

mod config;
mod registry;
mod state;

pub use config::*;
pub(crate) use registry::Registry;
pub(crate) use state::Connection;
pub use state::{ConnectionPhase, ConnectionStats};
