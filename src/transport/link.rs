//! Transport to engine signalling.
//!
//! A transport never calls back into the engine directly. Acknowledgements,
//! failures and received payloads travel over a per-connection channel that
//! the engine drains when the connection is polled (polled mode) or when its
//! driver task wakes (threaded mode).
//!
//! The regions of a transmitted payload stay in the connection's pool until
//! the payload resolves. A transport that sends asynchronously reads them
//! through [`TransportLink::with_regions`] instead of copying at hand-off.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::sync::mpsc::UnboundedSender;

use super::error::TransportError;
use crate::core::{ConnectionHandle, PtpTimestamp};
use crate::pool::BufferPool;

/// One region of an outbound payload, borrowed from the connection's pool.
#[derive(Debug, Clone, Copy)]
pub struct OutboundRegion<'a> {
    /// Payload bytes.
    pub bytes: &'a [u8],
    /// Segment index when the region is part of a segmented frame.
    pub segment: Option<u8>,
    /// Origination timestamp set on the buffer.
    pub origination: PtpTimestamp,
}

/// Payload handed to the transport.
#[derive(Debug, Clone)]
pub struct OutboundPayload<'a> {
    /// Sequence number to acknowledge through [`TransportLink::complete`].
    pub sequence: u64,
    /// Regions in transmission order.
    pub regions: Vec<OutboundRegion<'a>>,
    /// Payload description text supplied at submission.
    pub payload_json: Option<&'a str>,
}

impl OutboundPayload<'_> {
    /// Total bytes across every region.
    pub fn len(&self) -> usize {
        self.regions.iter().map(|r| r.bytes.len()).sum()
    }

    /// Whether the payload carries no bytes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Payload received by the transport for a receive connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboundPayload {
    /// Received bytes.
    pub bytes: Vec<u8>,
    /// Payload description text received with the bytes.
    pub payload_json: Option<String>,
}

impl InboundPayload {
    /// Payload without description.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            payload_json: None,
        }
    }

    /// Attach a payload description.
    pub fn with_json(mut self, json: impl Into<String>) -> Self {
        self.payload_json = Some(json.into());
        self
    }
}

/// Signal sent from the transport to one connection.
#[derive(Debug)]
pub(crate) enum TransportSignal {
    Completed(u64),
    Failed(u64),
    Delivered(InboundPayload),
}

/// Per-connection handle a transport uses to report progress.
#[derive(Debug, Clone)]
pub struct TransportLink {
    connection: ConnectionHandle,
    tx: UnboundedSender<TransportSignal>,
    notify: Arc<Notify>,
    pool: Weak<Mutex<BufferPool>>,
}

impl TransportLink {
    pub(crate) fn new(
        connection: ConnectionHandle,
        tx: UnboundedSender<TransportSignal>,
        notify: Arc<Notify>,
        pool: Weak<Mutex<BufferPool>>,
    ) -> Self {
        Self {
            connection,
            tx,
            notify,
            pool,
        }
    }

    /// Connection this link reports to.
    pub fn connection(&self) -> ConnectionHandle {
        self.connection
    }

    /// Report that the payload with `sequence` was transmitted.
    pub fn complete(&self, sequence: u64) -> Result<(), TransportError> {
        self.send(TransportSignal::Completed(sequence))
    }

    /// Report that the payload with `sequence` could not be transmitted.
    pub fn fail(&self, sequence: u64) -> Result<(), TransportError> {
        self.send(TransportSignal::Failed(sequence))
    }

    /// Hand a received payload to a receive connection.
    pub fn deliver(&self, payload: InboundPayload) -> Result<(), TransportError> {
        self.send(TransportSignal::Delivered(payload))
    }

    /// Run `f` over the regions of the unresolved payload `sequence`.
    ///
    /// The regions remain readable until the payload is acknowledged, failed
    /// or times out. The connection's pool is locked while `f` runs, so it
    /// must be short, and this must not be called from inside
    /// [`MediaTransport::transmit`](super::MediaTransport::transmit).
    pub fn with_regions<R>(
        &self,
        sequence: u64,
        f: impl FnOnce(&[OutboundRegion<'_>]) -> R,
    ) -> Result<R, TransportError> {
        let pool = self.pool.upgrade().ok_or(TransportError::Closed)?;
        let pool = pool.lock();
        let regions: Vec<OutboundRegion<'_>> = pool
            .in_flight(sequence)
            .into_iter()
            .map(|view| OutboundRegion {
                bytes: view.bytes,
                segment: view.segment,
                origination: view.origination,
            })
            .collect();
        if regions.is_empty() {
            return Err(TransportError::NotInFlight(sequence));
        }
        Ok(f(&regions))
    }

    /// Whether the engine side has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn send(&self, signal: TransportSignal) -> Result<(), TransportError> {
        self.tx.send(signal).map_err(|_| TransportError::Closed)?;
        self.notify.notify_one();
        Ok(())
    }
}
