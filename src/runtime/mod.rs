//! Event loop adapter
//!
//! Selects between polled mode (the caller drains events with
//! `poll_events`) and threaded mode (an internal worker pool drains them),
//! once, at engine initialization.

mod config;
mod workers;

pub use config::*;
pub(crate) use workers::WorkerPool;
