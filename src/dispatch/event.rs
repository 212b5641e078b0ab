//! Completion and reception events.

use crate::core::{ConnectionHandle, Status};
use crate::pool::RxBuffer;

/// Outcome of one submitted payload, delivered to the transmit callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxCompletion {
    /// `Ok`, `TimeoutExpired` or `Error`.
    pub status: Status,
    /// Connection the payload was submitted on.
    pub connection: ConnectionHandle,
    /// Sequence number returned by `submit_payload`.
    pub sequence: u64,
    /// Opaque parameter given at submission.
    pub user_param: u64,
}

/// One received payload, delivered to the receive callback.
///
/// The buffer stays owned by the connection's pool until it is handed back
/// with `free_received_buffer` (or dropped).
#[derive(Debug)]
pub struct RxDelivery {
    /// `Ok`, or `Error` when the payload could not be stored.
    pub status: Status,
    /// Receiving connection.
    pub connection: ConnectionHandle,
    /// Reception order, starting at 1.
    pub sequence: u64,
    /// Received payload. `None` unless `status` is `Ok`.
    pub buffer: Option<RxBuffer>,
    /// Payload description text received with the bytes.
    pub payload_json: Option<String>,
    /// Opaque parameter given at connection creation.
    pub user_param: u64,
}

impl RxDelivery {
    /// Take the received buffer out of the event.
    pub fn take_buffer(&mut self) -> Option<RxBuffer> {
        self.buffer.take()
    }
}

/// Transmit completion callback.
pub type TxCallback = Box<dyn FnMut(TxCompletion) + Send + 'static>;

/// Receive callback.
pub type RxCallback = Box<dyn FnMut(RxDelivery) + Send + 'static>;

#[derive(Debug)]
pub(crate) enum Event {
    Tx(TxCompletion),
    Rx(RxDelivery),
}
