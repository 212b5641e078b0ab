//! Ordered in-flight queue.
//!
//! Sequence numbers are assigned contiguously, so the queue holds exactly the
//! range `front_sequence..next_sequence` and a payload is found by offset.
//! Resolution may happen in any order; entries leave only from the front, so
//! a resolved payload waits until every lower sequence has resolved too.

use std::collections::VecDeque;
use std::time::Instant;

use super::payload::{PayloadState, PendingPayload};
use crate::core::BufferHandle;
use crate::core::constants::FIRST_SEQUENCE;

/// Why a resolution was not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveError {
    /// Sequence was never assigned or has already been emitted.
    Unknown,
    /// Sequence already reached a final state (e.g. an ack after timeout).
    AlreadyResolved(PayloadState),
}

/// Per-connection payload scheduler.
#[derive(Debug)]
pub struct PayloadScheduler {
    next_sequence: u64,
    front_sequence: u64,
    queue: VecDeque<PendingPayload>,
}

impl Default for PayloadScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl PayloadScheduler {
    /// Create an empty scheduler.
    pub fn new() -> Self {
        Self {
            next_sequence: FIRST_SEQUENCE,
            front_sequence: FIRST_SEQUENCE,
            queue: VecDeque::new(),
        }
    }

    /// Sequence number the next payload will receive.
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Payloads not yet emitted, resolved or not.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether every accepted payload has been emitted.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Payloads still waiting on the transport.
    pub fn unresolved(&self) -> usize {
        self.queue.iter().filter(|p| !p.state.is_resolved()).count()
    }

    /// Append a payload and assign its sequence number.
    pub fn enqueue(
        &mut self,
        buffers: Vec<BufferHandle>,
        submitted_at: Instant,
        deadline: Instant,
        user_param: u64,
    ) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.queue.push_back(PendingPayload {
            sequence,
            buffers,
            submitted_at,
            deadline,
            user_param,
            state: PayloadState::InFlight,
        });
        sequence
    }

    /// Look up an unemitted payload.
    pub fn get(&self, sequence: u64) -> Option<&PendingPayload> {
        let offset = sequence.checked_sub(self.front_sequence)?;
        self.queue.get(usize::try_from(offset).ok()?)
    }

    /// Move a payload to a final state. Returns the buffers it holds.
    pub fn resolve(
        &mut self,
        sequence: u64,
        outcome: PayloadState,
    ) -> Result<&[BufferHandle], ResolveError> {
        let offset = sequence
            .checked_sub(self.front_sequence)
            .and_then(|o| usize::try_from(o).ok())
            .ok_or(ResolveError::Unknown)?;
        let entry = self.queue.get_mut(offset).ok_or(ResolveError::Unknown)?;
        if entry.state.is_resolved() {
            return Err(ResolveError::AlreadyResolved(entry.state));
        }
        entry.state = outcome;
        Ok(&entry.buffers)
    }

    /// Pop the front payload if it has resolved.
    pub fn pop_ready(&mut self) -> Option<PendingPayload> {
        if !self.queue.front()?.state.is_resolved() {
            return None;
        }
        let payload = self.queue.pop_front()?;
        self.front_sequence = payload.sequence + 1;
        Some(payload)
    }
}
