//! JSON connection descriptors
//!
//! Parses the connection document both ends are created from, sizes media
//! payloads from their packing conventions, and produces the connection info
//! echoed back at creation.

mod info;
mod model;
mod sizing;

pub use info::*;
pub use model::*;
pub use sizing::*;
