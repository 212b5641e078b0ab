//! Engine constants.
//!
//! Values fixed by the transport API contract are grouped first; tunable
//! defaults follow.

use std::time::Duration;

// =============================================================================
// API CONTRACT
// =============================================================================

/// Number of segments in a segmented frame.
pub const SEGMENT_COUNT: usize = 8;

/// `max_threads` / `max_priority` value that places no restriction on the engine.
pub const UNRESTRICTED: i32 = -1;

/// `max_threads` value selecting polled mode.
pub const POLLED_MODE_THREADS: i32 = 0;

/// Highest thread priority accepted by `initialize`.
pub const MAX_THREAD_PRIORITY: i32 = 99;

/// Nanoseconds per second; PTP nanosecond fields are always below this.
pub const NANOS_PER_SECOND: u32 = 1_000_000_000;

// =============================================================================
// DEFAULTS
// =============================================================================

/// Default number of receive buffers per receive connection.
pub const DEFAULT_RX_BUFFER_COUNT: u32 = 8;

/// How often a polled-mode destroy re-checks the transport while draining.
pub const DEFAULT_DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Worker count used for `max_threads = -1` when parallelism is unknown.
pub const FALLBACK_WORKER_COUNT: usize = 4;

/// Default worker thread name prefix in threaded mode.
pub const DEFAULT_THREAD_NAME: &str = "gccg-worker";

/// First sequence number assigned on every connection.
pub const FIRST_SEQUENCE: u64 = 1;
