//! Transport boundary error types.

use std::io;

use thiserror::Error;

use crate::core::ConnectionHandle;

/// Errors reported by a transport collaborator.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The engine side of the link has gone away.
    #[error("connection closed")]
    Closed,

    /// The payload has already been acknowledged, failed or timed out.
    #[error("payload {0} is not in flight")]
    NotInFlight(u64),

    /// Transport has no endpoint for this connection.
    #[error("unknown connection: {0}")]
    UnknownConnection(ConnectionHandle),

    /// Transport refused the payload at hand-off.
    #[error("payload rejected: {0}")]
    Rejected(String),

    /// Transport cannot serve this configuration.
    #[error("unsupported configuration: {0}")]
    Unsupported(String),

    /// I/O error from the underlying link.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}
