//! Core types shared by every engine layer.
//!
//! Status codes, the error enum, constants, handles and timestamps. Nothing
//! in here performs I/O or locking.

pub mod constants;
mod error;
mod handle;
mod timestamp;

pub use error::*;
pub use handle::*;
pub use timestamp::*;
