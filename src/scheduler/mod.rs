//! Payload scheduling
//!
//! Assigns per-connection sequence numbers, keeps the in-flight queue in
//! submission order and tracks each payload's deadline.

mod payload;
mod queue;
mod timeout;

pub use payload::*;
pub use queue::*;
pub use timeout::*;
