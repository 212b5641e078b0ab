//! Transport boundary
//!
//! The engine does not move bytes across the network itself. A
//! [`MediaTransport`] collaborator receives every accepted payload and reports
//! back through a per-connection [`TransportLink`].
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │   Engine (pool, scheduler, dispatch)    │
//! ├──────────── transmit ───────▲───────────┤
//! │                             │ link      │
//! │      MediaTransport  ───────┘           │  ← This module
//! ├─────────────────────────────────────────┤
//! │   RTP / raw sockets / loopback          │
//! └─────────────────────────────────────────┘
//! ```

mod error;
mod link;
mod loopback;
mod traits;

pub use error::*;
pub(crate) use link::TransportSignal;
pub use link::{InboundPayload, OutboundPayload, OutboundRegion, TransportLink};
pub use loopback::{AckPolicy, LoopbackTransport, TransmitRecord};
pub use traits::MediaTransport;
