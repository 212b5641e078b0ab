//! Returned connection info.
//!
//! Echoes the latency bounds a connection was created with and the payload
//! size of each element, serialized into a caller-supplied buffer.

use serde::{Deserialize, Serialize};

use super::model::ConnectionDescriptor;
use crate::connection::Role;
use crate::core::{ConnectionHandle, EngineError, Result};

/// Per-element sizing echoed back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementInfo {
    /// Element identifier.
    pub id: String,
    /// `video`, `audio` or `ancillary`.
    pub kind: String,
    /// Bytes one payload of this element occupies.
    pub payload_size: usize,
}

/// Connection info returned by descriptor-based creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    /// Packed connection handle.
    pub handle: u64,
    /// `transmit` or `receive`.
    pub role: String,
    /// PTP grandmaster clock identity.
    pub grandmaster_id: String,
    /// Lower latency bound in microseconds.
    pub min_latency_us: u64,
    /// Upper latency bound in microseconds.
    pub max_latency_us: u64,
    /// Arrival minus origination, when both references are known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_latency_us: Option<i64>,
    /// Elements in payload order.
    pub media: Vec<ElementInfo>,
}

impl ConnectionInfo {
    /// Compute the info for a connection created from `descriptor`. The
    /// handle is filled in with [`ConnectionInfo::with_handle`] once the
    /// connection exists.
    pub fn new(role: Role, descriptor: &ConnectionDescriptor) -> Result<Self> {
        let timing = &descriptor.timing;
        let observed_latency_us = match (&timing.origination, &timing.arrival) {
            (Some(origination), Some(arrival)) => {
                i64::try_from(arrival.nanos_since(origination) / 1_000).ok()
            }
            _ => None,
        };
        let media = descriptor
            .media
            .iter()
            .map(|m| {
                Ok(ElementInfo {
                    id: m.id().to_string(),
                    kind: m.kind().to_string(),
                    payload_size: m.payload_size()?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            handle: 0,
            role: role.to_string(),
            grandmaster_id: timing.grandmaster_id.clone(),
            min_latency_us: timing.min_latency_us,
            max_latency_us: timing.max_latency_us,
            observed_latency_us,
            media,
        })
    }

    /// Attach the handle of the created connection.
    pub fn with_handle(mut self, handle: ConnectionHandle) -> Self {
        self.handle = handle.to_u64();
        self
    }

    /// Serialized form.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| EngineError::invalid_parameter("connection_info", e.to_string()))
    }

    /// Write the serialized form into `out`, returning the bytes written.
    ///
    /// Fails with `BufferTooSmall` and leaves `out` untouched when it cannot
    /// hold the whole document.
    pub fn write_json(&self, out: &mut [u8]) -> Result<usize> {
        let json = self.to_json()?;
        let bytes = json.as_bytes();
        if bytes.len() > out.len() {
            return Err(EngineError::BufferTooSmall {
                required: bytes.len(),
                available: out.len(),
            });
        }
        out[..bytes.len()].copy_from_slice(bytes);
        Ok(bytes.len())
    }
}
