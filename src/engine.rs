//! The transport engine.
//!
//! [`Engine`] is the process-scoped object behind every API operation. It is
//! created once by [`Engine::initialize`], shared by cloning, and torn down
//! with [`Engine::shutdown`] after every connection has been destroyed.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::connection::{
    Connection, ConnectionConfig, ConnectionPhase, ConnectionStats, Registry, Role,
};
use crate::core::{ConnectionHandle, EngineError, Result};
#[cfg(feature = "descriptor")]
use crate::descriptor::{ConnectionDescriptor, ConnectionInfo};
use crate::dispatch::{Handler, RxDelivery, TxCompletion};
use crate::pool::{RxBuffer, SegmentSet, TxBuffer};
use crate::runtime::{EngineConfig, ThreadingMode, WorkerPool};
use crate::scheduler::{Payload, SubmitError};
use crate::transport::MediaTransport;

struct Shared {
    config: EngineConfig,
    mode: ThreadingMode,
    registry: Registry,
    transport: Arc<dyn MediaTransport>,
    workers: Mutex<Option<WorkerPool>>,
    shut_down: AtomicBool,
}

/// Handle to an initialized transport engine.
///
/// Cheap to clone; every clone refers to the same engine state. All
/// operations are thread-safe.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// use gccg_transport::{
///     ConnectionConfig, Engine, EngineConfig, LoopbackTransport, MediaElement, Status,
/// };
///
/// let transport = Arc::new(LoopbackTransport::immediate());
/// let engine = Engine::initialize(EngineConfig::polled(), transport).unwrap();
///
/// let config = ConnectionConfig::builder()
///     .element(MediaElement::video("v0"))
///     .build()
///     .unwrap();
/// let tx = engine
///     .create_transmit_connection(config, 1024, 4, |done| assert_eq!(done.status, Status::Ok))
///     .unwrap();
///
/// let mut buffer = engine.request_buffer(tx).unwrap().unwrap();
/// buffer.write(b"pgroups").unwrap();
/// engine
///     .submit_payload(tx, buffer, 7, Duration::from_millis(50))
///     .unwrap();
///
/// assert_eq!(engine.poll_events(tx).unwrap(), 1);
/// engine.destroy_connection(tx).unwrap();
/// engine.shutdown().unwrap();
/// ```
#[derive(Clone)]
pub struct Engine {
    shared: Arc<Shared>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("mode", &self.shared.mode)
            .field("connections", &self.shared.registry.len())
            .field("shut_down", &self.shared.shut_down.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Initialize the engine.
    ///
    /// `config.max_threads` selects the threading mode for the lifetime of the
    /// engine: `0` for polled mode, `-1` or a positive count for an internal
    /// worker pool.
    pub fn initialize(config: EngineConfig, transport: Arc<dyn MediaTransport>) -> Result<Self> {
        config.validate()?;
        let mode = config.threading_mode();

        let workers = match mode {
            ThreadingMode::Polled => None,
            ThreadingMode::Threaded { workers } => {
                Some(WorkerPool::start(workers, &config.thread_name)?)
            }
        };

        tracing::info!(
            mode = mode.name(),
            workers = workers.as_ref().map_or(0, WorkerPool::workers),
            max_priority = config.max_priority,
            "transport engine initialized"
        );

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                mode,
                registry: Registry::new(),
                transport,
                workers: Mutex::new(workers),
                shut_down: AtomicBool::new(false),
            }),
        })
    }

    /// Configuration the engine was initialized with.
    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    /// Threading mode selected at initialization.
    pub fn threading_mode(&self) -> ThreadingMode {
        self.shared.mode
    }

    /// Create a transmit connection with `buffer_count` buffers of
    /// `buffer_size` bytes. `on_complete` receives one event per submitted
    /// payload, in submission order.
    pub fn create_transmit_connection<F>(
        &self,
        config: ConnectionConfig,
        buffer_size: usize,
        buffer_count: u32,
        on_complete: F,
    ) -> Result<ConnectionHandle>
    where
        F: FnMut(TxCompletion) + Send + 'static,
    {
        self.create(
            Role::Transmitter,
            config,
            buffer_size,
            buffer_count,
            0,
            Handler::Tx(Box::new(on_complete)),
        )
    }

    /// Create a receive connection whose buffers hold `buffer_size` bytes.
    /// `user_param` is echoed in every reception event.
    pub fn create_receive_connection<F>(
        &self,
        config: ConnectionConfig,
        buffer_size: usize,
        user_param: u64,
        on_receive: F,
    ) -> Result<ConnectionHandle>
    where
        F: FnMut(RxDelivery) + Send + 'static,
    {
        self.create(
            Role::Receiver,
            config,
            buffer_size,
            self.shared.config.rx_buffer_count,
            user_param,
            Handler::Rx(Box::new(on_receive)),
        )
    }

    fn create(
        &self,
        role: Role,
        config: ConnectionConfig,
        buffer_size: usize,
        buffer_count: u32,
        user_param: u64,
        handler: Handler,
    ) -> Result<ConnectionHandle> {
        self.ensure_running()?;

        let (connection, link) = self.shared.registry.insert_with(|handle| {
            let (connection, link) = Connection::new(
                handle,
                role,
                config,
                buffer_size,
                buffer_count,
                user_param,
                handler,
            )?;
            Ok((Arc::new(connection), link))
        })?;
        let handle = connection.handle();

        if let Err(e) = self
            .shared
            .transport
            .open(handle, role, connection.config(), link)
        {
            self.shared.registry.remove(handle);
            return Err(e.into());
        }
        connection.activate();

        if let Some(workers) = self.shared.workers.lock().as_ref() {
            workers.spawn_driver(connection.clone());
        }

        tracing::debug!(
            connection = %handle,
            %role,
            buffer_size,
            buffer_count,
            elements = connection.config().element_count(),
            "connection created"
        );
        Ok(handle)
    }

    /// Destroy a connection.
    ///
    /// New submissions are rejected immediately. The call then blocks until
    /// every outstanding payload has completed or timed out and its event has
    /// been delivered, so it is bounded by the longest outstanding timeout.
    /// Destroying an unknown or already destroyed handle fails with
    /// `InvalidParameter`, as does destroying a connection from its own
    /// callback.
    pub fn destroy_connection(&self, handle: ConnectionHandle) -> Result<()> {
        self.ensure_running()?;
        let connection = self.shared.registry.get(handle)?;
        if connection.in_own_callback() {
            return Err(EngineError::invalid_parameter(
                "handle",
                "a connection cannot be destroyed from its own callback",
            ));
        }
        connection.begin_drain()?;
        tracing::debug!(connection = %handle, "draining connection");

        // Drive the drain on this thread unless a worker is free to do it.
        let inline = self.shared.mode == ThreadingMode::Polled
            || tokio::runtime::Handle::try_current().is_ok();
        let interval = self.shared.config.drain_poll_interval;

        loop {
            let now = Instant::now();
            if inline {
                connection.poll(now);
            } else {
                connection.wake();
            }
            if connection.is_drained() {
                break;
            }
            let wait = connection
                .next_deadline()
                .map_or(interval, |d| d.saturating_duration_since(now).min(interval));
            connection.wait_progress(wait);
        }

        connection.close();
        self.shared.transport.close(handle);
        self.shared.registry.remove(handle);
        tracing::debug!(connection = %handle, "connection destroyed");
        Ok(())
    }

    /// Lease a free transmit buffer, or `None` if all are in use.
    pub fn request_buffer(&self, handle: ConnectionHandle) -> Result<Option<TxBuffer>> {
        self.ensure_running()?;
        self.shared.registry.get(handle)?.request_buffer()
    }

    /// Lease eight transmit buffers as one segmented frame, or `None` if fewer
    /// than eight are free. Fails if the connection was created with fewer
    /// than eight buffers.
    pub fn request_segment_set(&self, handle: ConnectionHandle) -> Result<Option<SegmentSet>> {
        self.ensure_running()?;
        self.shared.registry.get(handle)?.request_segment_set()
    }

    /// Submit a payload for transmission.
    ///
    /// Returns the payload's sequence number. The outcome arrives later as a
    /// [`TxCompletion`] carrying `user_param`: `Ok` when the transport
    /// acknowledges it, `TimeoutExpired` if `timeout` elapses first, `Error`
    /// if the transport fails it. A rejected payload is returned inside the
    /// error, untouched.
    pub fn submit_payload(
        &self,
        handle: ConnectionHandle,
        payload: impl Into<Payload>,
        user_param: u64,
        timeout: Duration,
    ) -> std::result::Result<u64, SubmitError> {
        self.submit(handle, payload.into(), None, user_param, timeout)
    }

    /// Submit a payload together with its payload description text, which the
    /// transport forwards to the receiver.
    pub fn submit_payload_with_json(
        &self,
        handle: ConnectionHandle,
        payload: impl Into<Payload>,
        payload_json: impl Into<String>,
        user_param: u64,
        timeout: Duration,
    ) -> std::result::Result<u64, SubmitError> {
        self.submit(
            handle,
            payload.into(),
            Some(payload_json.into()),
            user_param,
            timeout,
        )
    }

    fn submit(
        &self,
        handle: ConnectionHandle,
        payload: Payload,
        payload_json: Option<String>,
        user_param: u64,
        timeout: Duration,
    ) -> std::result::Result<u64, SubmitError> {
        if let Err(error) = self.ensure_running() {
            return Err(SubmitError::new(error, payload));
        }
        let connection = match self.shared.registry.get(handle) {
            Ok(connection) => connection,
            Err(error) => return Err(SubmitError::new(error, payload)),
        };
        connection.submit(
            payload,
            payload_json,
            user_param,
            timeout,
            self.shared.transport.as_ref(),
        )
    }

    /// Return a received buffer to its connection's pool.
    pub fn free_received_buffer(&self, buffer: RxBuffer) -> Result<()> {
        self.shared.registry.get(buffer.connection())?;
        buffer.release()
    }

    /// Deliver every ready event of one connection (polled mode). Returns the
    /// number of callbacks invoked; in threaded mode this is a no-op.
    pub fn poll_events(&self, handle: ConnectionHandle) -> Result<usize> {
        self.ensure_running()?;
        let connection = self.shared.registry.get(handle)?;
        match self.shared.mode {
            ThreadingMode::Polled => Ok(connection.poll(Instant::now())),
            ThreadingMode::Threaded { .. } => Ok(0),
        }
    }

    /// [`Engine::poll_events`] for every connection.
    pub fn poll_all(&self) -> Result<usize> {
        self.ensure_running()?;
        if self.shared.mode != ThreadingMode::Polled {
            return Ok(0);
        }
        let now = Instant::now();
        Ok(self
            .shared
            .registry
            .connections()
            .iter()
            .map(|c| c.poll(now))
            .sum())
    }

    /// Lifecycle phase of a connection.
    pub fn connection_phase(&self, handle: ConnectionHandle) -> Result<ConnectionPhase> {
        Ok(self.shared.registry.get(handle)?.phase())
    }

    /// Configuration a connection was created with.
    pub fn connection_config(&self, handle: ConnectionHandle) -> Result<ConnectionConfig> {
        Ok(self.shared.registry.get(handle)?.config().clone())
    }

    /// Counters for a connection.
    pub fn stats(&self, handle: ConnectionHandle) -> Result<ConnectionStats> {
        Ok(self.shared.registry.get(handle)?.stats())
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.shared.registry.len()
    }

    /// Stop the engine. Every connection must have been destroyed first.
    pub fn shutdown(&self) -> Result<()> {
        let open = self.shared.registry.len();
        if open > 0 {
            return Err(EngineError::invalid_parameter(
                "engine",
                format!("{open} connections still open"),
            ));
        }
        if self.shared.shut_down.swap(true, Ordering::AcqRel) {
            return Err(EngineError::ShutDown);
        }
        if let Some(workers) = self.shared.workers.lock().take() {
            workers.shutdown();
        }
        tracing::info!("transport engine shut down");
        Ok(())
    }

    /// Whether [`Engine::shutdown`] has completed.
    pub fn is_shut_down(&self) -> bool {
        self.shared.shut_down.load(Ordering::Acquire)
    }

    fn ensure_running(&self) -> Result<()> {
        if self.is_shut_down() {
            return Err(EngineError::ShutDown);
        }
        Ok(())
    }
}

#[cfg(feature = "descriptor")]
#[cfg_attr(docsrs, doc(cfg(feature = "descriptor")))]
impl Engine {
    /// Create a transmit connection from a JSON connection descriptor.
    ///
    /// Returns the handle and the connection info to echo to the caller.
    pub fn create_transmit_connection_from_json<F>(
        &self,
        connection_json: &str,
        buffer_size: usize,
        buffer_count: u32,
        on_complete: F,
    ) -> Result<(ConnectionHandle, ConnectionInfo)>
    where
        F: FnMut(TxCompletion) + Send + 'static,
    {
        let descriptor = ConnectionDescriptor::from_json(connection_json)?;
        let info = ConnectionInfo::new(Role::Transmitter, &descriptor)?;
        let handle = self.create_transmit_connection(
            descriptor.to_config()?,
            buffer_size,
            buffer_count,
            on_complete,
        )?;
        Ok((handle, info.with_handle(handle)))
    }

    /// Create a receive connection from a JSON connection descriptor.
    pub fn create_receive_connection_from_json<F>(
        &self,
        connection_json: &str,
        buffer_size: usize,
        user_param: u64,
        on_receive: F,
    ) -> Result<(ConnectionHandle, ConnectionInfo)>
    where
        F: FnMut(RxDelivery) + Send + 'static,
    {
        let descriptor = ConnectionDescriptor::from_json(connection_json)?;
        let info = ConnectionInfo::new(Role::Receiver, &descriptor)?;
        let handle = self.create_receive_connection(
            descriptor.to_config()?,
            buffer_size,
            user_param,
            on_receive,
        )?;
        Ok((handle, info.with_handle(handle)))
    }
}
