//! # GCCG Transport
//!
//! Moves real-time media payloads (video, audio, ancillary data) between a
//! sender and a receiver whose processing latency may vary. The engine owns
//! the memory and the ordering; the bytes on the wire belong to a pluggable
//! [`MediaTransport`]. It provides:
//!
//! - **Buffer pools**: fixed per-connection pools, leased one at a time or
//!   eight at a time as a segmented frame, never more than configured
//! - **Ordering**: one completion or reception event per payload, strictly in
//!   submission order, even when the transport acknowledges out of order
//! - **Deadlines**: a payload the transport never acknowledges completes with
//!   `TimeoutExpired`, and its buffers become requestable again
//! - **Threading**: polled mode (the caller drives dispatch) or an internal
//!   worker pool, chosen once at initialization
//!
//! ## Feature Flags
//!
//! - `descriptor` (default): JSON connection descriptors, media payload
//!   sizing and the returned connection info
//!
//! ## Modules
//!
//! - [`core`]: status codes, errors, constants, handles and timestamps
//! - [`pool`]: buffer pools and buffer leases
//! - [`connection`]: connection configuration and lifecycle
//! - [`scheduler`]: payloads, sequencing and deadlines
//! - [`dispatch`]: completion and reception events
//! - [`runtime`]: engine configuration and threading mode
//! - [`transport`]: the transport boundary and an in-process loopback
//! - [`descriptor`]: JSON descriptors (requires `descriptor` feature)
//!
//! ## Example Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use gccg_transport::prelude::*;
//!
//! let transport = Arc::new(LoopbackTransport::never());
//! let engine = Engine::initialize(EngineConfig::polled(), transport).unwrap();
//!
//! let config = ConnectionConfig::builder()
//!     .element(MediaElement::video("v0"))
//!     .build()
//!     .unwrap();
//! let tx = engine
//!     .create_transmit_connection(config, 4096, 4, |done: TxCompletion| {
//!         assert_eq!(done.status, Status::TimeoutExpired);
//!     })
//!     .unwrap();
//!
//! let mut frame = engine.request_buffer(tx).unwrap().unwrap();
//! frame.write(&[0u8; 100]).unwrap();
//! engine
//!     .submit_payload(tx, frame, 1, Duration::from_millis(5))
//!     .unwrap();
//!
//! // Blocks until the unacknowledged payload has timed out and been reported.
//! engine.destroy_connection(tx).unwrap();
//! engine.shutdown().unwrap();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod connection;
pub mod core;
pub mod dispatch;
pub mod pool;
pub mod runtime;
pub mod scheduler;
pub mod transport;

mod engine;

// Connection descriptors (feature-gated)
#[cfg(feature = "descriptor")]
#[cfg_attr(docsrs, doc(cfg(feature = "descriptor")))]
pub mod descriptor;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::connection::{
        ConnectionConfig, ConnectionPhase, ConnectionStats, MediaElement, MediaKind, Role,
    };
    pub use crate::core::{ConnectionHandle, EngineError, PtpTimestamp, Status};
    pub use crate::dispatch::{RxDelivery, TxCompletion};
    pub use crate::engine::Engine;
    pub use crate::pool::{RxBuffer, SegmentSet, TxBuffer};
    pub use crate::runtime::{EngineConfig, ThreadingMode};
    pub use crate::scheduler::{Payload, SubmitError};
    pub use crate::transport::{LoopbackTransport, MediaTransport, TransportError};

    #[cfg(feature = "descriptor")]
    pub use crate::descriptor::{ConnectionDescriptor, ConnectionInfo};
}

// Re-export commonly used items at crate root
pub use crate::connection::{ConnectionConfig, ConnectionPhase, MediaElement, MediaKind, Role};
pub use crate::core::{ConnectionHandle, EngineError, PtpTimestamp, Result, Status};
pub use crate::dispatch::{RxDelivery, TxCompletion};
pub use crate::engine::Engine;
pub use crate::pool::{RxBuffer, SegmentSet, TxBuffer};
pub use crate::runtime::{EngineConfig, ThreadingMode};
pub use crate::scheduler::{Payload, SubmitError};
pub use crate::transport::{LoopbackTransport, MediaTransport};
