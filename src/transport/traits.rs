//! Transport collaborator trait.

use super::error::TransportError;
use super::link::{OutboundPayload, TransportLink};
use crate::connection::{ConnectionConfig, Role};
use crate::core::ConnectionHandle;

/// The network side of the engine.
///
/// Moves payload bytes between hosts. The engine calls `open` once per
/// connection, `transmit` once per accepted payload and `close` after the
/// connection has drained.
///
/// Implementations report outcomes only through the [`TransportLink`] given
/// to `open`. `transmit` runs while the connection is locked, so it must not
/// call engine operations and should return quickly.
pub trait MediaTransport: Send + Sync {
    /// Prepare the link for a new connection.
    fn open(
        &self,
        connection: ConnectionHandle,
        role: Role,
        config: &ConnectionConfig,
        link: TransportLink,
    ) -> Result<(), TransportError>;

    /// Start sending a payload. The borrowed regions are only valid during
    /// the call; to send later, keep the sequence and read the same regions
    /// through [`TransportLink::with_regions`] until acknowledging it.
    ///
    /// An error resolves the payload as failed; the engine still emits its
    /// completion in order.
    fn transmit(
        &self,
        connection: ConnectionHandle,
        payload: &OutboundPayload<'_>,
    ) -> Result<(), TransportError>;

    /// Release everything held for a destroyed connection.
    fn close(&self, connection: ConnectionHandle);
}
