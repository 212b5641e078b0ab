//! Generation-checked handles.
//!
//! Connections and buffers are referenced through an arena index paired with
//! a generation counter. The generation is bumped every time a slot is
//! reused, so a handle kept past destruction (or past a buffer returning to
//! `Free`) no longer matches and is rejected instead of aliasing new state.

use std::fmt;

/// Opaque handle to a transmit or receive connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionHandle {
    index: u32,
    generation: u32,
}

impl ConnectionHandle {
    /// Create a handle from its arena index and generation.
    pub fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Arena index.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Slot generation this handle was issued for.
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Pack into a single `u64` (generation in the high half).
    pub fn to_u64(&self) -> u64 {
        (u64::from(self.generation) << 32) | u64::from(self.index)
    }

    /// Unpack a value produced by [`ConnectionHandle::to_u64`].
    pub fn from_u64(raw: u64) -> Self {
        Self {
            index: raw as u32,
            generation: (raw >> 32) as u32,
        }
    }
}

impl fmt::Display for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}.{}", self.index, self.generation)
    }
}

/// Handle of a buffer managed by a connection's pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle {
    connection: ConnectionHandle,
    index: u32,
    generation: u32,
}

impl BufferHandle {
    pub(crate) fn new(connection: ConnectionHandle, index: u32, generation: u32) -> Self {
        Self {
            connection,
            index,
            generation,
        }
    }

    /// Connection that owns the buffer. Never changes.
    pub fn connection(&self) -> ConnectionHandle {
        self.connection
    }

    /// Slot index inside the owning pool.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Slot generation this handle was issued for.
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for BufferHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/buf#{}.{}", self.connection, self.index, self.generation)
    }
}
