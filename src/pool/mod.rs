//! Buffer management
//!
//! Each connection owns one [`BufferPool`] of fixed-size regions allocated at
//! creation. The application borrows regions as [`TxBuffer`] / [`RxBuffer`]
//! leases; segmented frames are leased as a [`SegmentSet`] of eight buffers.

mod buffer;
#[allow(clippy::module_inception)]
mod pool;
mod stats;

pub use buffer::{RxBuffer, SegmentSet, TxBuffer};
pub use pool::{BufferPool, BufferState};
pub(crate) use pool::SharedPool;
pub use stats::BufferPoolStats;
