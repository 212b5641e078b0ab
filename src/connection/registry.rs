//! Connection registry.
//!
//! An arena of connection records addressed by generation-checked handles.
//! A slot's generation is bumped every time it is occupied, so a handle kept
//! past `destroy_connection` no longer resolves.

use std::sync::Arc;

use parking_lot::RwLock;

use super::state::Connection;
use crate::core::{ConnectionHandle, EngineError, Result};

#[derive(Debug, Default)]
struct RegistrySlot {
    generation: u32,
    entry: Option<Arc<Connection>>,
}

/// Arena mapping handles to live connections.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    slots: RwLock<Vec<RegistrySlot>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a slot and build the connection for its handle.
    ///
    /// Nothing is registered if `build` fails.
    pub fn insert_with<F, T>(&self, build: F) -> Result<(Arc<Connection>, T)>
    where
        F: FnOnce(ConnectionHandle) -> Result<(Arc<Connection>, T)>,
    {
        let mut slots = self.slots.write();
        let index = match slots.iter().position(|s| s.entry.is_none()) {
            Some(index) => index,
            None => {
                slots.push(RegistrySlot::default());
                slots.len() - 1
            }
        };
        let index_u32 = u32::try_from(index)
            .map_err(|_| EngineError::invalid_parameter("handle", "connection arena exhausted"))?;

        let slot = &mut slots[index];
        let generation = slot.generation.wrapping_add(1).max(1);
        let (connection, extra) = build(ConnectionHandle::new(index_u32, generation))?;
        slot.generation = generation;
        slot.entry = Some(connection.clone());
        Ok((connection, extra))
    }

    /// Resolve a handle to its connection.
    pub fn get(&self, handle: ConnectionHandle) -> Result<Arc<Connection>> {
        let slots = self.slots.read();
        match slots.get(handle.index() as usize) {
            Some(RegistrySlot {
                generation,
                entry: Some(connection),
            }) if *generation == handle.generation() => Ok(connection.clone()),
            _ => Err(EngineError::UnknownConnection(handle)),
        }
    }

    /// Unregister a connection.
    pub fn remove(&self, handle: ConnectionHandle) -> Option<Arc<Connection>> {
        let mut slots = self.slots.write();
        let slot = slots.get_mut(handle.index() as usize)?;
        if slot.generation != handle.generation() {
            return None;
        }
        slot.entry.take()
    }

    /// Every registered connection.
    pub fn connections(&self) -> Vec<Arc<Connection>> {
        self.slots
            .read()
            .iter()
            .filter_map(|s| s.entry.clone())
            .collect()
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.slots.read().iter().filter(|s| s.entry.is_some()).count()
    }
}
