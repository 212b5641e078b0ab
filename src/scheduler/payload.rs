//! Outbound payloads and their in-flight records.

use std::time::Instant;

use thiserror::Error;

use crate::core::{BufferHandle, ConnectionHandle, EngineError, Status};
use crate::pool::{SegmentSet, TxBuffer};

/// One transmissible unit of media data.
#[derive(Debug)]
pub enum Payload {
    /// A single contiguous buffer.
    Buffer(TxBuffer),
    /// One buffer per configured media element, in configuration order.
    Elements(Vec<TxBuffer>),
    /// One frame split into eight segments.
    Segments(SegmentSet),
}

impl Payload {
    /// Connection owning the first buffer of the payload.
    pub fn connection(&self) -> Option<ConnectionHandle> {
        match self {
            Payload::Buffer(buf) => Some(buf.connection()),
            Payload::Elements(bufs) => bufs.first().map(TxBuffer::connection),
            Payload::Segments(set) => set.connection(),
        }
    }

    /// Buffers in transmission order.
    pub fn buffers(&self) -> Vec<&TxBuffer> {
        match self {
            Payload::Buffer(buf) => vec![buf],
            Payload::Elements(bufs) => bufs.iter().collect(),
            Payload::Segments(set) => set.iter().collect(),
        }
    }

    /// Total payload bytes across every buffer.
    pub fn len(&self) -> usize {
        self.buffers().iter().map(|b| b.len()).sum()
    }

    /// Whether the payload carries no bytes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn into_buffers(self) -> Vec<TxBuffer> {
        match self {
            Payload::Buffer(buf) => vec![buf],
            Payload::Elements(bufs) => bufs,
            Payload::Segments(set) => set.into_buffers(),
        }
    }
}

impl From<TxBuffer> for Payload {
    fn from(buf: TxBuffer) -> Self {
        Payload::Buffer(buf)
    }
}

impl From<Vec<TxBuffer>> for Payload {
    fn from(buffers: Vec<TxBuffer>) -> Self {
        Payload::Elements(buffers)
    }
}

impl From<SegmentSet> for Payload {
    fn from(set: SegmentSet) -> Self {
        Payload::Segments(set)
    }
}

/// A rejected submission. The payload is handed back unchanged.
#[derive(Debug, Error)]
#[error("payload rejected: {error}")]
pub struct SubmitError {
    /// Why the payload was rejected.
    #[source]
    pub error: EngineError,
    /// The rejected payload, still leased to the caller.
    pub payload: Payload,
}

impl SubmitError {
    pub(crate) fn new(error: EngineError, payload: Payload) -> Self {
        Self { error, payload }
    }

    /// Status code of the rejection.
    pub fn status(&self) -> Status {
        self.error.status()
    }

    /// Recover the payload for another attempt.
    pub fn into_payload(self) -> Payload {
        self.payload
    }
}

/// Lifecycle of a submitted payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadState {
    /// Accepted, not yet handed to the transport.
    Submitted,
    /// Owned by the transport.
    InFlight,
    /// Acknowledged by the transport.
    Completed,
    /// Deadline elapsed before acknowledgement.
    TimedOut,
    /// Transport reported failure.
    Failed,
}

impl PayloadState {
    /// Whether the payload has reached a final state.
    pub fn is_resolved(self) -> bool {
        matches!(
            self,
            PayloadState::Completed | PayloadState::TimedOut | PayloadState::Failed
        )
    }

    /// Status reported in the completion event.
    pub fn status(self) -> Status {
        match self {
            PayloadState::Completed => Status::Ok,
            PayloadState::TimedOut => Status::TimeoutExpired,
            PayloadState::Submitted | PayloadState::InFlight | PayloadState::Failed => {
                Status::Error
            }
        }
    }
}

/// Scheduler record of an accepted payload.
#[derive(Debug, Clone)]
pub struct PendingPayload {
    /// Per-connection sequence number.
    pub sequence: u64,
    /// Buffers checked in for this payload.
    pub buffers: Vec<BufferHandle>,
    /// Submission instant.
    pub submitted_at: Instant,
    /// Absolute deadline.
    pub deadline: Instant,
    /// Caller-supplied opaque parameter.
    pub user_param: u64,
    /// Current state.
    pub state: PayloadState,
}
