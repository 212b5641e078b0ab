//! Error types and status codes for the transport engine.

use thiserror::Error;

use super::handle::{BufferHandle, ConnectionHandle};
use crate::pool::BufferState;
use crate::transport::TransportError;

/// Status codes surfaced by every API operation and every completion event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Status {
    /// Operation succeeded.
    Ok = 0,
    /// Payload deadline elapsed before the transport acknowledged it.
    TimeoutExpired = 1,
    /// Malformed configuration, wrong ownership, bad handle or timeout.
    InvalidParameter = 2,
    /// Output buffer too small for the returned configuration text.
    BufferTooSmall = 3,
    /// Generic transport or internal failure.
    Error = 4,
}

impl Status {
    /// Numeric code as used on the wire/ABI.
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Whether this status reports success.
    pub fn is_ok(self) -> bool {
        self == Status::Ok
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Status::Ok => "ok",
            Status::TimeoutExpired => "timeout expired",
            Status::InvalidParameter => "invalid parameter",
            Status::BufferTooSmall => "buffer too small",
            Status::Error => "error",
        };
        f.write_str(name)
    }
}

/// Errors returned synchronously by engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A parameter or configuration value was rejected.
    #[error("invalid parameter: {parameter} - {message}")]
    InvalidParameter {
        /// Name of the offending parameter.
        parameter: &'static str,
        /// Why it was rejected.
        message: String,
    },

    /// The connection handle is unknown, stale, or already destroyed.
    #[error("unknown connection: {0}")]
    UnknownConnection(ConnectionHandle),

    /// Operation requires a different connection role.
    #[error("connection {handle} is a {actual} connection, operation requires {expected}")]
    WrongRole {
        /// Connection the operation targeted.
        handle: ConnectionHandle,
        /// Role the operation requires.
        expected: crate::connection::Role,
        /// Role of the connection.
        actual: crate::connection::Role,
    },

    /// Connection is draining or destroyed and no longer accepts work.
    #[error("connection {handle} is not active ({phase:?})")]
    NotActive {
        /// Connection the operation targeted.
        handle: ConnectionHandle,
        /// Current lifecycle phase.
        phase: crate::connection::ConnectionPhase,
    },

    /// Buffer handle generation no longer matches its slot.
    #[error("stale buffer handle: {0}")]
    StaleBuffer(BufferHandle),

    /// Buffer belongs to a different connection than the one targeted.
    #[error("buffer {buffer} is not owned by connection {connection}")]
    ForeignBuffer {
        /// Buffer handle presented.
        buffer: BufferHandle,
        /// Connection the operation targeted.
        connection: ConnectionHandle,
    },

    /// Buffer is not in the state the operation requires.
    #[error("buffer {handle} is {found:?}, expected {expected:?}")]
    BufferState {
        /// Buffer handle presented.
        handle: BufferHandle,
        /// Required state.
        expected: BufferState,
        /// Actual state.
        found: BufferState,
    },

    /// Output buffer cannot hold the returned configuration text.
    #[error("buffer too small: requested {required}, available {available}")]
    BufferTooSmall {
        /// Bytes required.
        required: usize,
        /// Bytes available.
        available: usize,
    },

    /// Engine has been shut down.
    #[error("engine shut down")]
    ShutDown,

    /// Transport collaborator failure.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Worker pool could not be started.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Create an invalid parameter error.
    pub fn invalid_parameter(parameter: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            parameter,
            message: message.into(),
        }
    }

    /// Map this error to its API status code.
    pub fn status(&self) -> Status {
        match self {
            EngineError::InvalidParameter { .. }
            | EngineError::UnknownConnection(_)
            | EngineError::WrongRole { .. }
            | EngineError::NotActive { .. }
            | EngineError::StaleBuffer(_)
            | EngineError::ForeignBuffer { .. }
            | EngineError::BufferState { .. } => Status::InvalidParameter,
            EngineError::BufferTooSmall { .. } => Status::BufferTooSmall,
            EngineError::ShutDown
            | EngineError::Transport(_)
            | EngineError::Io(_) => Status::Error,
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
