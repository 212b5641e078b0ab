//! Per-connection state.
//!
//! Lock order: `state` before `pool` before the dispatcher's queue. The
//! callback itself runs with none of them held, so it may call back into the
//! engine.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tokio::sync::Notify;
use tokio::sync::futures::Notified;
use tokio::sync::mpsc::{self, UnboundedReceiver};

use super::config::{ConnectionConfig, Role};
use crate::core::{ConnectionHandle, EngineError, Result, Status};
use crate::dispatch::{Dispatcher, Event, Handler, RxDelivery, TxCompletion};
use crate::pool::{BufferPool, BufferPoolStats, RxBuffer, SegmentSet, SharedPool, TxBuffer};
use crate::scheduler::{
    Payload, PayloadScheduler, PayloadState, ResolveError, SubmitError, TimeoutManager,
};
use crate::transport::{
    InboundPayload, MediaTransport, OutboundPayload, OutboundRegion, TransportLink, TransportSignal,
};

/// Connection lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionPhase {
    /// Configuration accepted, transport not yet opened.
    Created,
    /// Accepting requests and submissions.
    Active,
    /// Destroy in progress; outstanding payloads are finishing or timing out.
    Draining,
    /// Buffers released; the handle is no longer valid.
    Destroyed,
}

/// Snapshot of a connection's counters.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionStats {
    /// Connection direction.
    pub role: Role,
    /// Lifecycle phase at the time of the snapshot.
    pub phase: ConnectionPhase,
    /// Buffer pool counters.
    pub pool: BufferPoolStats,
    /// Payloads accepted and not yet emitted.
    pub in_flight: usize,
    /// Events queued for the callback.
    pub pending_events: usize,
    /// Events handed to the callback.
    pub delivered_events: u64,
    /// Payloads accepted by `submit_payload`.
    pub submitted: u64,
    /// Payloads acknowledged by the transport.
    pub completed: u64,
    /// Payloads whose deadline elapsed.
    pub timed_out: u64,
    /// Payloads the transport failed.
    pub failed: u64,
    /// Payloads received and stored.
    pub received: u64,
    /// Payloads received but not stored (pool exhausted or oversized).
    pub dropped: u64,
    /// Acknowledgements for unknown or already resolved sequences.
    pub stray_signals: u64,
}

#[derive(Debug, Default, Clone)]
struct Counters {
    submitted: u64,
    completed: u64,
    timed_out: u64,
    failed: u64,
    received: u64,
    dropped: u64,
    stray_signals: u64,
}

#[derive(Debug)]
struct ConnectionState {
    phase: ConnectionPhase,
    scheduler: PayloadScheduler,
    timeouts: TimeoutManager,
    rx_sequence: u64,
    counters: Counters,
}

/// A transmit or receive connection.
#[derive(Debug)]
pub(crate) struct Connection {
    handle: ConnectionHandle,
    role: Role,
    config: ConnectionConfig,
    user_param: u64,
    state: Mutex<ConnectionState>,
    pool: SharedPool,
    inbox: Mutex<UnboundedReceiver<TransportSignal>>,
    notify: Arc<Notify>,
    dispatcher: Dispatcher,
    progress_lock: Mutex<()>,
    progress: Condvar,
}

impl Connection {
    /// Allocate the pool and delivery channel. Returns the link for the transport.
    pub fn new(
        handle: ConnectionHandle,
        role: Role,
        config: ConnectionConfig,
        buffer_size: usize,
        buffer_count: u32,
        user_param: u64,
        handler: Handler,
    ) -> Result<(Self, TransportLink)> {
        config.validate()?;
        let pool = BufferPool::new(handle, buffer_size, buffer_count)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let notify = Arc::new(Notify::new());
        let pool = Arc::new(Mutex::new(pool));
        let link = TransportLink::new(handle, tx, notify.clone(), Arc::downgrade(&pool));

        let connection = Self {
            handle,
            role,
            config,
            user_param,
            state: Mutex::new(ConnectionState {
                phase: ConnectionPhase::Created,
                scheduler: PayloadScheduler::new(),
                timeouts: TimeoutManager::new(),
                rx_sequence: 0,
                counters: Counters::default(),
            }),
            pool,
            inbox: Mutex::new(rx),
            notify,
            dispatcher: Dispatcher::new(handler),
            progress_lock: Mutex::new(()),
            progress: Condvar::new(),
        };
        Ok((connection, link))
    }

    pub fn handle(&self) -> ConnectionHandle {
        self.handle
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.state.lock().phase
    }

    /// `Created -> Active` once the transport has opened the link.
    pub fn activate(&self) {
        let mut state = self.state.lock();
        if state.phase == ConnectionPhase::Created {
            state.phase = ConnectionPhase::Active;
        }
    }

    /// Lease one transmit buffer.
    pub fn request_buffer(&self) -> Result<Option<TxBuffer>> {
        self.ensure_role(Role::Transmitter)?;
        self.ensure_active()?;
        let lease = self.pool.lock().acquire();
        Ok(lease.map(|lease| TxBuffer::from_lease(lease, &self.pool)))
    }

    /// Lease eight transmit buffers as one segmented frame.
    pub fn request_segment_set(&self) -> Result<Option<SegmentSet>> {
        self.ensure_role(Role::Transmitter)?;
        self.ensure_active()?;
        let leases = self.pool.lock().acquire_segments()?;
        match leases {
            Some(leases) => {
                let buffers = leases
                    .into_iter()
                    .map(|lease| TxBuffer::from_lease(lease, &self.pool))
                    .collect();
                SegmentSet::new(buffers).map(Some)
            }
            None => Ok(None),
        }
    }

    /// Validate, sequence and hand a payload to the transport.
    pub fn submit(
        &self,
        payload: Payload,
        payload_json: Option<String>,
        user_param: u64,
        timeout: Duration,
        transport: &dyn MediaTransport,
    ) -> std::result::Result<u64, SubmitError> {
        let mut state = self.state.lock();
        let mut pool = self.pool.lock();

        let (submitted_at, deadline) =
            match self.validate_submission(&state, &pool, &payload, timeout) {
                Ok(times) => times,
                Err(error) => return Err(SubmitError::new(error, payload)),
            };

        let mut handles = Vec::new();
        for buffer in payload.into_buffers() {
            let sub = buffer.into_submission();
            if let Err(e) = pool.check_in(sub.handle, sub.region, sub.len, sub.origination) {
                tracing::error!(buffer = %sub.handle, error = %e, "validated buffer failed check-in");
            }
            handles.push(sub.handle);
        }

        let sequence = state
            .scheduler
            .enqueue(handles.clone(), submitted_at, deadline, user_param);
        state.timeouts.arm(sequence, deadline);
        state.counters.submitted += 1;
        pool.assign(&handles, sequence);

        let handed_off = {
            let regions = pool
                .in_flight(sequence)
                .into_iter()
                .map(|view| OutboundRegion {
                    bytes: view.bytes,
                    segment: view.segment,
                    origination: view.origination,
                })
                .collect();
            let outbound = OutboundPayload {
                sequence,
                regions,
                payload_json: payload_json.as_deref(),
            };
            tracing::trace!(
                connection = %self.handle,
                sequence,
                bytes = outbound.len(),
                regions = outbound.regions.len(),
                "payload submitted"
            );
            transport.transmit(self.handle, &outbound)
        };
        drop(pool);

        if let Err(e) = handed_off {
            tracing::warn!(connection = %self.handle, sequence, error = %e, "transport rejected payload");
            self.resolve(&mut state, sequence, PayloadState::Failed);
        }
        drop(state);

        self.notify.notify_one();
        Ok(sequence)
    }

    /// Apply transport signals and expired deadlines, then queue every event
    /// that is ready in order. Returns the number of events queued.
    pub fn pump(&self, now: Instant) -> usize {
        let mut state = self.state.lock();
        if state.phase == ConnectionPhase::Destroyed {
            return 0;
        }

        let signals: Vec<TransportSignal> = {
            let mut inbox = self.inbox.lock();
            std::iter::from_fn(|| inbox.try_recv().ok()).collect()
        };

        let mut queued = 0;
        for signal in signals {
            match signal {
                TransportSignal::Completed(sequence) => {
                    self.resolve(&mut state, sequence, PayloadState::Completed)
                }
                TransportSignal::Failed(sequence) => {
                    self.resolve(&mut state, sequence, PayloadState::Failed)
                }
                TransportSignal::Delivered(inbound) if self.role == Role::Receiver => {
                    self.receive(&mut state, inbound);
                    queued += 1;
                }
                TransportSignal::Delivered(inbound) => {
                    state.counters.stray_signals += 1;
                    tracing::warn!(
                        connection = %self.handle,
                        bytes = inbound.bytes.len(),
                        "delivery on a transmit connection ignored"
                    );
                }
            }
        }

        for sequence in state.timeouts.expire(now) {
            tracing::trace!(connection = %self.handle, sequence, "payload deadline elapsed");
            self.resolve(&mut state, sequence, PayloadState::TimedOut);
        }

        while let Some(done) = state.scheduler.pop_ready() {
            {
                let mut pool = self.pool.lock();
                for handle in &done.buffers {
                    if let Err(e) = pool.recycle(*handle) {
                        tracing::debug!(buffer = %handle, error = %e, "buffer not recycled");
                    }
                }
            }
            match done.state {
                PayloadState::Completed => state.counters.completed += 1,
                PayloadState::TimedOut => state.counters.timed_out += 1,
                _ => state.counters.failed += 1,
            }
            self.dispatcher.push(Event::Tx(TxCompletion {
                status: done.state.status(),
                connection: self.handle,
                sequence: done.sequence,
                user_param: done.user_param,
            }));
            queued += 1;
        }
        queued
    }

    /// Deliver queued events to the callback.
    pub fn dispatch(&self) -> usize {
        let delivered = self.dispatcher.dispatch();
        if delivered > 0 {
            tracing::trace!(connection = %self.handle, delivered, "events dispatched");
        }
        delivered
    }

    /// Pump then dispatch.
    pub fn poll(&self, now: Instant) -> usize {
        self.pump(now);
        self.dispatch()
    }

    /// `Active -> Draining`. Fails if a destroy is already under way.
    pub fn begin_drain(&self) -> Result<()> {
        let mut state = self.state.lock();
        match state.phase {
            ConnectionPhase::Created | ConnectionPhase::Active => {
                state.phase = ConnectionPhase::Draining;
                Ok(())
            }
            ConnectionPhase::Draining | ConnectionPhase::Destroyed => {
                Err(EngineError::invalid_parameter(
                    "handle",
                    format!("{} is already being destroyed", self.handle),
                ))
            }
        }
    }

    /// Every accepted payload has been emitted and delivered.
    pub fn is_drained(&self) -> bool {
        let empty = self.state.lock().scheduler.is_empty();
        empty && self.dispatcher.is_idle()
    }

    /// Whether the calling thread is running this connection's callback.
    pub fn in_own_callback(&self) -> bool {
        self.dispatcher.is_dispatching_on_current_thread()
    }

    /// Earliest armed payload deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.state.lock().timeouts.next_deadline()
    }

    /// Release the pool and mark the connection destroyed. Signals still
    /// queued from the transport are discarded; lost deliveries are counted.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.phase = ConnectionPhase::Destroyed;
        let discarded = {
            let mut inbox = self.inbox.lock();
            inbox.close();
            std::iter::from_fn(|| inbox.try_recv().ok())
                .filter(|signal| matches!(signal, TransportSignal::Delivered(_)))
                .count()
        };
        if discarded > 0 {
            state.counters.dropped += discarded as u64;
            tracing::warn!(
                connection = %self.handle,
                discarded,
                "deliveries arrived after the final drain and were discarded"
            );
        }
        drop(state);
        self.pool.lock().close();
        self.notify.notify_one();
        self.signal_progress();
    }

    /// Wake the driver task.
    pub fn wake(&self) {
        self.notify.notify_one();
    }

    /// Future resolved when the transport signals or a submission arrives.
    pub fn notified(&self) -> Notified<'_> {
        self.notify.notified()
    }

    /// Wake anyone blocked in [`Connection::wait_progress`].
    pub fn signal_progress(&self) {
        let _guard = self.progress_lock.lock();
        self.progress.notify_all();
    }

    /// Block until progress is signalled or `timeout` elapses.
    pub fn wait_progress(&self, timeout: Duration) {
        let mut guard = self.progress_lock.lock();
        self.progress.wait_for(&mut guard, timeout);
    }

    pub fn stats(&self) -> ConnectionStats {
        let state = self.state.lock();
        let pool = self.pool.lock().stats();
        ConnectionStats {
            role: self.role,
            phase: state.phase,
            pool,
            in_flight: state.scheduler.len(),
            pending_events: self.dispatcher.pending(),
            delivered_events: self.dispatcher.delivered(),
            submitted: state.counters.submitted,
            completed: state.counters.completed,
            timed_out: state.counters.timed_out,
            failed: state.counters.failed,
            received: state.counters.received,
            dropped: state.counters.dropped,
            stray_signals: state.counters.stray_signals,
        }
    }

    fn validate_submission(
        &self,
        state: &ConnectionState,
        pool: &BufferPool,
        payload: &Payload,
        timeout: Duration,
    ) -> Result<(Instant, Instant)> {
        if timeout.is_zero() {
            return Err(EngineError::invalid_parameter(
                "timeout",
                "timeout must be greater than zero",
            ));
        }
        self.ensure_role(Role::Transmitter)?;
        if state.phase != ConnectionPhase::Active {
            return Err(EngineError::NotActive {
                handle: self.handle,
                phase: state.phase,
            });
        }

        match payload {
            Payload::Elements(buffers) if buffers.len() != self.config.element_count() => {
                return Err(EngineError::invalid_parameter(
                    "payload",
                    format!(
                        "expected {} element buffers, got {}",
                        self.config.element_count(),
                        buffers.len()
                    ),
                ));
            }
            Payload::Segments(set) if !set.is_complete() => {
                return Err(EngineError::invalid_parameter(
                    "payload",
                    format!("segment set only partially filled ({} filled)", set.filled()),
                ));
            }
            Payload::Segments(set) => set.check_layout()?,
            _ => {}
        }

        let segmented = matches!(payload, Payload::Segments(_));
        for buffer in payload.buffers() {
            if buffer.connection() != self.handle {
                return Err(EngineError::ForeignBuffer {
                    buffer: buffer.handle(),
                    connection: self.handle,
                });
            }
            pool.check_allocated(buffer.handle())?;
            if buffer.is_segment() != segmented {
                return Err(EngineError::invalid_parameter(
                    "payload",
                    "segment buffers must be submitted as a complete segment set",
                ));
            }
            if buffer.is_empty() {
                return Err(EngineError::invalid_parameter(
                    "payload",
                    format!("buffer {} carries no bytes", buffer.handle()),
                ));
            }
        }

        let submitted_at = Instant::now();
        let deadline = submitted_at.checked_add(timeout).ok_or_else(|| {
            EngineError::invalid_parameter("timeout", "deadline out of range")
        })?;
        Ok((submitted_at, deadline))
    }

    fn resolve(&self, state: &mut ConnectionState, sequence: u64, outcome: PayloadState) {
        if self.role != Role::Transmitter {
            state.counters.stray_signals += 1;
            tracing::warn!(connection = %self.handle, sequence, "acknowledgement on a receive connection ignored");
            return;
        }
        match state.scheduler.resolve(sequence, outcome) {
            Ok(buffers) => {
                state.timeouts.disarm(sequence);
                let mut pool = self.pool.lock();
                for handle in buffers {
                    if let Err(e) = pool.mark_pending_free(*handle) {
                        tracing::debug!(buffer = %handle, error = %e, "buffer not marked pending free");
                    }
                }
                tracing::trace!(connection = %self.handle, sequence, ?outcome, "payload resolved");
            }
            Err(ResolveError::AlreadyResolved(previous)) => {
                state.counters.stray_signals += 1;
                tracing::warn!(
                    connection = %self.handle,
                    sequence,
                    ?previous,
                    ?outcome,
                    "late transport signal ignored"
                );
            }
            Err(ResolveError::Unknown) => {
                state.counters.stray_signals += 1;
                tracing::warn!(connection = %self.handle, sequence, "signal for unknown sequence ignored");
            }
        }
    }

    fn receive(&self, state: &mut ConnectionState, inbound: InboundPayload) {
        state.rx_sequence += 1;
        let sequence = state.rx_sequence;

        let lease = self.pool.lock().fill(&inbound.bytes);
        let (status, buffer, payload_json) = match lease {
            Some(lease) => {
                state.counters.received += 1;
                (
                    Status::Ok,
                    Some(RxBuffer::from_lease(lease, &self.pool)),
                    inbound.payload_json,
                )
            }
            None => {
                state.counters.dropped += 1;
                tracing::warn!(
                    connection = %self.handle,
                    sequence,
                    bytes = inbound.bytes.len(),
                    "received payload could not be stored"
                );
                (Status::Error, None, None)
            }
        };

        self.dispatcher.push(Event::Rx(RxDelivery {
            status,
            connection: self.handle,
            sequence,
            buffer,
            payload_json,
            user_param: self.user_param,
        }));
    }

    fn ensure_role(&self, expected: Role) -> Result<()> {
        if self.role != expected {
            return Err(EngineError::WrongRole {
                handle: self.handle,
                expected,
                actual: self.role,
            });
        }
        Ok(())
    }

    fn ensure_active(&self) -> Result<()> {
        let phase = self.phase();
        if phase != ConnectionPhase::Active {
            return Err(EngineError::NotActive {
                handle: self.handle,
                phase,
            });
        }
        Ok(())
    }
}
