//! In-process transport.
//!
//! Records every transmitted payload, acknowledges it immediately or on
//! request, and can forward transmissions from a transmit connection to a
//! paired receive connection. Useful for tests and for running the engine
//! without a network.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use super::error::TransportError;
use super::link::{InboundPayload, OutboundPayload, TransportLink};
use super::traits::MediaTransport;
use crate::connection::{ConnectionConfig, Role};
use crate::core::{ConnectionHandle, PtpTimestamp};

/// When the loopback acknowledges a transmitted payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AckPolicy {
    /// Acknowledge during `transmit`.
    #[default]
    Immediate,
    /// Wait for [`LoopbackTransport::ack`] or [`LoopbackTransport::fail`].
    Manual,
    /// Never acknowledge; every payload runs into its deadline.
    Never,
}

/// Copy of a payload as the loopback saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransmitRecord {
    /// Sequence number assigned by the engine.
    pub sequence: u64,
    /// Concatenated region bytes.
    pub bytes: Vec<u8>,
    /// Per-region segment index.
    pub segments: Vec<Option<u8>>,
    /// Per-region origination timestamp.
    pub origination: Vec<PtpTimestamp>,
    /// Payload description supplied at submission.
    pub payload_json: Option<String>,
}

#[derive(Debug)]
struct Endpoint {
    role: Role,
    link: TransportLink,
    peer: Option<ConnectionHandle>,
    transmitted: Vec<TransmitRecord>,
    unacked: Vec<u64>,
}

/// Transport that never leaves the process.
#[derive(Debug, Default)]
pub struct LoopbackTransport {
    policy: AckPolicy,
    endpoints: Mutex<HashMap<ConnectionHandle, Endpoint>>,
    reject_transmit: AtomicBool,
}

impl LoopbackTransport {
    /// Create a loopback with the given acknowledgement policy.
    pub fn new(policy: AckPolicy) -> Self {
        Self {
            policy,
            ..Default::default()
        }
    }

    /// Loopback acknowledging every payload at hand-off.
    pub fn immediate() -> Self {
        Self::new(AckPolicy::Immediate)
    }

    /// Loopback that only acknowledges on request.
    pub fn manual() -> Self {
        Self::new(AckPolicy::Manual)
    }

    /// Loopback that never acknowledges.
    pub fn never() -> Self {
        Self::new(AckPolicy::Never)
    }

    /// Acknowledgement policy.
    pub fn policy(&self) -> AckPolicy {
        self.policy
    }

    /// Forward every payload transmitted on `tx` to the receive connection `rx`.
    pub fn pair(&self, tx: ConnectionHandle, rx: ConnectionHandle) -> Result<(), TransportError> {
        let mut endpoints = self.endpoints.lock();
        match endpoints.get(&rx) {
            Some(ep) if ep.role == Role::Receiver => {}
            Some(_) => {
                return Err(TransportError::Unsupported(format!(
                    "{rx} is not a receive connection"
                )));
            }
            None => return Err(TransportError::UnknownConnection(rx)),
        }
        let ep = endpoints
            .get_mut(&tx)
            .ok_or(TransportError::UnknownConnection(tx))?;
        if ep.role != Role::Transmitter {
            return Err(TransportError::Unsupported(format!(
                "{tx} is not a transmit connection"
            )));
        }
        ep.peer = Some(rx);
        Ok(())
    }

    /// Acknowledge a payload.
    pub fn ack(&self, connection: ConnectionHandle, sequence: u64) -> Result<(), TransportError> {
        self.take_link(connection, sequence)?.complete(sequence)
    }

    /// Report a payload as failed.
    pub fn fail(&self, connection: ConnectionHandle, sequence: u64) -> Result<(), TransportError> {
        self.take_link(connection, sequence)?.fail(sequence)
    }

    /// Acknowledge every outstanding payload, oldest first. Returns how many.
    pub fn ack_all(&self, connection: ConnectionHandle) -> Result<usize, TransportError> {
        let (link, pending) = {
            let mut endpoints = self.endpoints.lock();
            let ep = endpoints
                .get_mut(&connection)
                .ok_or(TransportError::UnknownConnection(connection))?;
            (ep.link.clone(), std::mem::take(&mut ep.unacked))
        };
        for sequence in &pending {
            link.complete(*sequence)?;
        }
        Ok(pending.len())
    }

    /// Sequences transmitted but not yet acknowledged through this loopback.
    pub fn unacked(&self, connection: ConnectionHandle) -> Vec<u64> {
        self.endpoints
            .lock()
            .get(&connection)
            .map(|ep| ep.unacked.clone())
            .unwrap_or_default()
    }

    /// Bytes of a payload that has not been acknowledged yet, read from the
    /// engine's buffers rather than from the hand-off copy.
    pub fn read_in_flight(
        &self,
        connection: ConnectionHandle,
        sequence: u64,
    ) -> Result<Vec<u8>, TransportError> {
        let link = self
            .endpoints
            .lock()
            .get(&connection)
            .map(|ep| ep.link.clone())
            .ok_or(TransportError::UnknownConnection(connection))?;
        link.with_regions(sequence, |regions| {
            regions.iter().flat_map(|r| r.bytes.iter().copied()).collect()
        })
    }

    /// Push a payload into a receive connection as if it arrived from the network.
    pub fn inject(
        &self,
        connection: ConnectionHandle,
        payload: InboundPayload,
    ) -> Result<(), TransportError> {
        let link = self
            .endpoints
            .lock()
            .get(&connection)
            .map(|ep| ep.link.clone())
            .ok_or(TransportError::UnknownConnection(connection))?;
        link.deliver(payload)
    }

    /// Payloads transmitted on `connection`, in hand-off order.
    pub fn transmitted(&self, connection: ConnectionHandle) -> Vec<TransmitRecord> {
        self.endpoints
            .lock()
            .get(&connection)
            .map(|ep| ep.transmitted.clone())
            .unwrap_or_default()
    }

    /// Make every following `transmit` fail at hand-off.
    pub fn set_reject_transmit(&self, reject: bool) {
        self.reject_transmit.store(reject, Ordering::Release);
    }

    /// Whether `connection` is open on this transport.
    pub fn is_open(&self, connection: ConnectionHandle) -> bool {
        self.endpoints.lock().contains_key(&connection)
    }

    fn take_link(
        &self,
        connection: ConnectionHandle,
        sequence: u64,
    ) -> Result<TransportLink, TransportError> {
        let mut endpoints = self.endpoints.lock();
        let ep = endpoints
            .get_mut(&connection)
            .ok_or(TransportError::UnknownConnection(connection))?;
        ep.unacked.retain(|s| *s != sequence);
        Ok(ep.link.clone())
    }
}

impl MediaTransport for LoopbackTransport {
    fn open(
        &self,
        connection: ConnectionHandle,
        role: Role,
        _config: &ConnectionConfig,
        link: TransportLink,
    ) -> Result<(), TransportError> {
        self.endpoints.lock().insert(
            connection,
            Endpoint {
                role,
                link,
                peer: None,
                transmitted: Vec::new(),
                unacked: Vec::new(),
            },
        );
        Ok(())
    }

    fn transmit(
        &self,
        connection: ConnectionHandle,
        payload: &OutboundPayload<'_>,
    ) -> Result<(), TransportError> {
        if self.reject_transmit.load(Ordering::Acquire) {
            return Err(TransportError::Rejected("loopback rejecting transmissions".into()));
        }

        let record = TransmitRecord {
            sequence: payload.sequence,
            bytes: payload.regions.iter().flat_map(|r| r.bytes.iter().copied()).collect(),
            segments: payload.regions.iter().map(|r| r.segment).collect(),
            origination: payload.regions.iter().map(|r| r.origination).collect(),
            payload_json: payload.payload_json.map(str::to_owned),
        };

        let mut endpoints = self.endpoints.lock();
        let ep = endpoints
            .get_mut(&connection)
            .ok_or(TransportError::UnknownConnection(connection))?;
        let link = ep.link.clone();
        let peer = ep.peer;
        let inbound = InboundPayload {
            bytes: record.bytes.clone(),
            payload_json: record.payload_json.clone(),
        };
        ep.transmitted.push(record);
        if self.policy == AckPolicy::Manual {
            ep.unacked.push(payload.sequence);
        }

        if let Some(peer) = peer.and_then(|p| endpoints.get(&p)) {
            if let Err(e) = peer.link.deliver(inbound) {
                tracing::warn!(%connection, error = %e, "loopback peer unavailable");
            }
        }
        drop(endpoints);

        if self.policy == AckPolicy::Immediate {
            link.complete(payload.sequence)?;
        }
        Ok(())
    }

    fn close(&self, connection: ConnectionHandle) {
        let mut endpoints = self.endpoints.lock();
        endpoints.remove(&connection);
        for ep in endpoints.values_mut() {
            if ep.peer == Some(connection) {
                ep.peer = None;
            }
        }
    }
}
