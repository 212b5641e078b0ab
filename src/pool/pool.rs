//! Fixed-size buffer pool owned by one connection.
//!
//! All regions are allocated once when the connection is created. A request
//! scans for a `Free` slot, never blocks and never grows the pool. While a
//! buffer is leased to the caller its region is moved out of the slot, so the
//! caller holds the only reference to the bytes; the region moves back when
//! the buffer is submitted or freed.

use std::sync::Arc;

use parking_lot::Mutex;

use super::stats::BufferPoolStats;
use crate::core::constants::SEGMENT_COUNT;
use crate::core::{BufferHandle, ConnectionHandle, EngineError, PtpTimestamp, Result};

/// Pool shared between a connection and the leases it hands out.
pub(crate) type SharedPool = Arc<Mutex<BufferPool>>;

/// Lifecycle state of a pooled buffer.
///
/// `Free -> Allocated -> InFlight -> PendingFree -> Free` on the transmit
/// side; receive buffers go `Free -> InFlight -> Free`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferState {
    /// Available for a request.
    Free,
    /// Leased to the caller for filling.
    Allocated,
    /// Owned by the transport (Tx) or held by the application (Rx).
    InFlight,
    /// Payload resolved, waiting for its ordered completion to be emitted.
    PendingFree,
}

#[derive(Debug)]
struct Slot {
    state: BufferState,
    generation: u32,
    /// `None` while the region is leased out.
    region: Option<Box<[u8]>>,
    segment: Option<u8>,
    len: usize,
    origination: PtpTimestamp,
    /// Payload sequence and region position while in flight.
    payload: Option<(u64, usize)>,
}

impl Slot {
    fn new(buffer_size: usize) -> Self {
        Self {
            state: BufferState::Free,
            generation: 0,
            region: Some(vec![0u8; buffer_size].into_boxed_slice()),
            segment: None,
            len: 0,
            origination: PtpTimestamp::ZERO,
            payload: None,
        }
    }
}

/// A region moved out of the pool together with its handle.
#[derive(Debug)]
pub(crate) struct Lease {
    pub handle: BufferHandle,
    pub region: Box<[u8]>,
    pub len: usize,
    pub segment: Option<u8>,
    /// Segmented frame the lease was reserved for; `0` for single buffers.
    pub frame: u64,
}

/// Borrowed view of an in-flight region.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RegionView<'a> {
    pub bytes: &'a [u8],
    pub segment: Option<u8>,
    pub origination: PtpTimestamp,
}

/// A bounded pool of equally sized buffers.
#[derive(Debug)]
pub struct BufferPool {
    connection: ConnectionHandle,
    buffer_size: usize,
    slots: Vec<Slot>,
    stats: BufferPoolStats,
    next_frame: u64,
    closed: bool,
}

impl BufferPool {
    /// Allocate `buffer_count` regions of `buffer_size` bytes.
    pub fn new(connection: ConnectionHandle, buffer_size: usize, buffer_count: u32) -> Result<Self> {
        if buffer_size == 0 {
            return Err(EngineError::invalid_parameter(
                "buffer_size",
                "buffer size must be greater than zero",
            ));
        }
        if buffer_count == 0 {
            return Err(EngineError::invalid_parameter(
                "buffer_count",
                "buffer count must be greater than zero",
            ));
        }

        let slots = (0..buffer_count).map(|_| Slot::new(buffer_size)).collect();

        Ok(Self {
            connection,
            buffer_size,
            slots,
            stats: BufferPoolStats::with_capacity(buffer_count as usize),
            next_frame: 0,
            closed: false,
        })
    }

    /// Connection owning every buffer in this pool.
    pub fn connection(&self) -> ConnectionHandle {
        self.connection
    }

    /// Size of each region in bytes.
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Configured number of buffers.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of buffers currently `Free`.
    pub fn free_count(&self) -> usize {
        self.count(BufferState::Free)
    }

    /// Number of buffers in the given state.
    pub fn count(&self, state: BufferState) -> usize {
        self.slots.iter().filter(|s| s.state == state).count()
    }

    /// State of the slot at `index`.
    pub fn state(&self, index: u32) -> Option<BufferState> {
        self.slots.get(index as usize).map(|s| s.state)
    }

    /// Snapshot of the pool counters.
    pub fn stats(&self) -> BufferPoolStats {
        self.stats.clone()
    }

    /// Whether the owning connection has been destroyed.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Lease one free buffer, or `None` if every buffer is in use.
    pub(crate) fn acquire(&mut self) -> Option<Lease> {
        if self.closed {
            return None;
        }
        let Some(index) = self.slots.iter().position(|s| s.state == BufferState::Free) else {
            self.stats.record_failure();
            return None;
        };
        let lease = self.lease_slot(index, BufferState::Allocated, None);
        if lease.is_some() {
            self.stats.record_allocation();
        }
        lease
    }

    /// Lease exactly [`SEGMENT_COUNT`] free buffers as one segmented frame.
    ///
    /// Either every segment is reserved or none is. A pool that can never hold
    /// a full set is a configuration error; a pool that merely has too few free
    /// buffers right now yields `None`.
    pub(crate) fn acquire_segments(&mut self) -> Result<Option<Vec<Lease>>> {
        if self.slots.len() < SEGMENT_COUNT {
            return Err(EngineError::invalid_parameter(
                "buffer_count",
                format!(
                    "segmented frames need {} buffers, pool holds {}",
                    SEGMENT_COUNT,
                    self.slots.len()
                ),
            ));
        }
        if self.closed {
            return Ok(None);
        }

        let free: Vec<usize> = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.state == BufferState::Free)
            .map(|(i, _)| i)
            .take(SEGMENT_COUNT)
            .collect();

        if free.len() < SEGMENT_COUNT {
            self.stats.record_failure();
            return Ok(None);
        }

        self.next_frame += 1;
        let frame = self.next_frame;
        let mut leases = Vec::with_capacity(SEGMENT_COUNT);
        for (segment, index) in free.into_iter().enumerate() {
            if let Some(mut lease) =
                self.lease_slot(index, BufferState::Allocated, Some(segment as u8))
            {
                lease.frame = frame;
                self.stats.record_allocation();
                leases.push(lease);
            }
        }
        Ok(Some(leases))
    }

    /// Copy received bytes into a free buffer and lease it to the application.
    pub(crate) fn fill(&mut self, bytes: &[u8]) -> Option<Lease> {
        if self.closed || bytes.len() > self.buffer_size {
            return None;
        }
        let Some(index) = self.slots.iter().position(|s| s.state == BufferState::Free) else {
            self.stats.record_failure();
            return None;
        };
        let mut lease = self.lease_slot(index, BufferState::InFlight, None)?;
        lease.region[..bytes.len()].copy_from_slice(bytes);
        lease.len = bytes.len();
        self.stats.record_allocation();
        Some(lease)
    }

    /// Validate that `handle` refers to a buffer currently leased for filling.
    pub(crate) fn check_allocated(&self, handle: BufferHandle) -> Result<()> {
        let slot = self.slot(handle)?;
        if slot.state != BufferState::Allocated {
            return Err(EngineError::BufferState {
                handle,
                expected: BufferState::Allocated,
                found: slot.state,
            });
        }
        Ok(())
    }

    /// Return a filled region to the pool and hand it to the transport.
    pub(crate) fn check_in(
        &mut self,
        handle: BufferHandle,
        region: Box<[u8]>,
        len: usize,
        origination: PtpTimestamp,
    ) -> Result<()> {
        self.check_allocated(handle)?;
        let slot = self.slot_mut(handle)?;
        slot.region = Some(region);
        slot.len = len;
        slot.origination = origination;
        slot.state = BufferState::InFlight;
        Ok(())
    }

    /// Tag checked-in buffers with the payload they were submitted as.
    pub(crate) fn assign(&mut self, handles: &[BufferHandle], sequence: u64) {
        for (position, handle) in handles.iter().enumerate() {
            if let Ok(slot) = self.slot_mut(*handle) {
                slot.payload = Some((sequence, position));
            }
        }
    }

    /// Regions of an unresolved payload in submission order. Empty once the
    /// payload has been acknowledged, failed or timed out.
    pub(crate) fn in_flight(&self, sequence: u64) -> Vec<RegionView<'_>> {
        let mut regions: Vec<(usize, RegionView<'_>)> = self
            .slots
            .iter()
            .filter(|s| s.state == BufferState::InFlight)
            .filter_map(|s| match (s.payload, s.region.as_deref()) {
                (Some((seq, position)), Some(region)) if seq == sequence => Some((
                    position,
                    RegionView {
                        bytes: &region[..s.len],
                        segment: s.segment,
                        origination: s.origination,
                    },
                )),
                _ => None,
            })
            .collect();
        regions.sort_by_key(|(position, _)| *position);
        regions.into_iter().map(|(_, view)| view).collect()
    }

    /// Mark an in-flight buffer as resolved but not yet released.
    pub(crate) fn mark_pending_free(&mut self, handle: BufferHandle) -> Result<()> {
        let slot = self.slot_mut(handle)?;
        if slot.state != BufferState::InFlight {
            return Err(EngineError::BufferState {
                handle,
                expected: BufferState::InFlight,
                found: slot.state,
            });
        }
        slot.state = BufferState::PendingFree;
        Ok(())
    }

    /// Return a transmitted buffer to `Free`.
    pub(crate) fn recycle(&mut self, handle: BufferHandle) -> Result<()> {
        let slot = self.slot_mut(handle)?;
        match slot.state {
            BufferState::InFlight | BufferState::PendingFree => {
                slot.state = BufferState::Free;
                slot.segment = None;
                slot.payload = None;
                slot.len = 0;
                self.stats.record_deallocation();
                Ok(())
            }
            found => Err(EngineError::BufferState {
                handle,
                expected: BufferState::PendingFree,
                found,
            }),
        }
    }

    /// Take back a region whose lease was dropped before submission.
    pub(crate) fn release(&mut self, handle: BufferHandle, region: Box<[u8]>) -> Result<()> {
        self.check_allocated(handle)?;
        let slot = self.slot_mut(handle)?;
        slot.region = Some(region);
        slot.state = BufferState::Free;
        slot.segment = None;
        slot.len = 0;
        self.stats.record_deallocation();
        Ok(())
    }

    /// Take back a received region the application has finished with.
    pub(crate) fn reclaim(&mut self, handle: BufferHandle, region: Box<[u8]>) -> Result<()> {
        let slot = self.slot_mut(handle)?;
        if slot.state != BufferState::InFlight || slot.region.is_some() {
            return Err(EngineError::BufferState {
                handle,
                expected: BufferState::InFlight,
                found: slot.state,
            });
        }
        slot.region = Some(region);
        slot.state = BufferState::Free;
        slot.len = 0;
        self.stats.record_deallocation();
        Ok(())
    }

    /// Release every region. Handles issued earlier become stale.
    pub(crate) fn close(&mut self) {
        self.closed = true;
        self.slots.clear();
    }

    fn lease_slot(
        &mut self,
        index: usize,
        state: BufferState,
        segment: Option<u8>,
    ) -> Option<Lease> {
        let connection = self.connection;
        let slot = self.slots.get_mut(index)?;
        let region = slot.region.take()?;
        slot.state = state;
        slot.generation = slot.generation.wrapping_add(1);
        slot.segment = segment;
        slot.len = 0;
        slot.origination = PtpTimestamp::ZERO;
        slot.payload = None;
        Some(Lease {
            handle: BufferHandle::new(connection, index as u32, slot.generation),
            region,
            len: 0,
            segment,
            frame: 0,
        })
    }

    fn slot(&self, handle: BufferHandle) -> Result<&Slot> {
        if handle.connection() != self.connection {
            return Err(EngineError::ForeignBuffer {
                buffer: handle,
                connection: self.connection,
            });
        }
        match self.slots.get(handle.index() as usize) {
            Some(slot) if slot.generation == handle.generation() => Ok(slot),
            _ => Err(EngineError::StaleBuffer(handle)),
        }
    }

    fn slot_mut(&mut self, handle: BufferHandle) -> Result<&mut Slot> {
        if handle.connection() != self.connection {
            return Err(EngineError::ForeignBuffer {
                buffer: handle,
                connection: self.connection,
            });
        }
        match self.slots.get_mut(handle.index() as usize) {
            Some(slot) if slot.generation == handle.generation() => Ok(slot),
            _ => Err(EngineError::StaleBuffer(handle)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(count: u32) -> BufferPool {
        BufferPool::new(ConnectionHandle::new(0, 1), 64, count).unwrap()
    }

    #[test]
    fn test_rejects_empty_configuration() {
        let conn = ConnectionHandle::new(0, 1);
        assert!(BufferPool::new(conn, 0, 4).is_err());
        assert!(BufferPool::new(conn, 64, 0).is_err());
    }

    #[test]
    fn test_acquire_until_exhausted() {
        let mut pool = pool(4);
        let leases: Vec<_> = (0..4).map(|_| pool.acquire().unwrap()).collect();
        assert_eq!(leases.len(), 4);
        assert!(pool.acquire().is_none());
        assert_eq!(pool.count(BufferState::Allocated), 4);
        assert_eq!(pool.stats().allocation_failures, 1);
    }

    #[test]
    fn test_tx_lifecycle() {
        let mut pool = pool(2);
        let lease = pool.acquire().unwrap();
        let handle = lease.handle;

        pool.check_in(handle, lease.region, 10, PtpTimestamp::ZERO).unwrap();
        pool.assign(&[handle], 1);
        assert_eq!(pool.state(handle.index()), Some(BufferState::InFlight));
        assert_eq!(pool.in_flight(1)[0].bytes.len(), 10);

        pool.mark_pending_free(handle).unwrap();
        assert_eq!(pool.state(handle.index()), Some(BufferState::PendingFree));
        assert!(pool.in_flight(1).is_empty());

        pool.recycle(handle).unwrap();
        assert_eq!(pool.state(handle.index()), Some(BufferState::Free));
        assert_eq!(pool.free_count(), 2);
    }

    #[test]
    fn test_in_flight_regions_in_submission_order() {
        let mut pool = pool(3);
        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        let (ha, hb) = (a.handle, b.handle);
        let mut ra = a.region;
        ra[0] = 0xA;
        let mut rb = b.region;
        rb[0] = 0xB;

        pool.check_in(hb, rb, 1, PtpTimestamp::ZERO).unwrap();
        pool.check_in(ha, ra, 1, PtpTimestamp::ZERO).unwrap();
        pool.assign(&[hb, ha], 7);

        let bytes: Vec<u8> = pool.in_flight(7).iter().map(|v| v.bytes[0]).collect();
        assert_eq!(bytes, vec![0xB, 0xA]);
        assert!(pool.in_flight(8).is_empty());
    }

    #[test]
    fn test_stale_handle_after_reuse() {
        let mut pool = pool(1);
        let lease = pool.acquire().unwrap();
        let old = lease.handle;
        pool.release(old, lease.region).unwrap();

        let lease = pool.acquire().unwrap();
        assert_eq!(lease.handle.index(), old.index());
        assert_ne!(lease.handle.generation(), old.generation());
        assert!(matches!(pool.check_allocated(old), Err(EngineError::StaleBuffer(_))));
    }

    #[test]
    fn test_double_check_in_rejected() {
        let mut pool = pool(1);
        let lease = pool.acquire().unwrap();
        let handle = lease.handle;
        pool.check_in(handle, lease.region, 1, PtpTimestamp::ZERO).unwrap();

        let err = pool
            .check_in(handle, vec![0u8; 64].into_boxed_slice(), 1, PtpTimestamp::ZERO)
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::BufferState {
                found: BufferState::InFlight,
                ..
            }
        ));
    }

    #[test]
    fn test_foreign_buffer_rejected() {
        let mut a = pool(1);
        let b = BufferPool::new(ConnectionHandle::new(1, 1), 64, 1).unwrap();
        let lease = a.acquire().unwrap();
        assert!(matches!(
            b.check_allocated(lease.handle),
            Err(EngineError::ForeignBuffer { .. })
        ));
    }

    #[test]
    fn test_segments_all_or_nothing() {
        let mut pool = pool(9);
        let _held = pool.acquire().unwrap();
        let _held2 = pool.acquire().unwrap();

        // 7 free: no partial reservation.
        assert!(pool.acquire_segments().unwrap().is_none());
        assert_eq!(pool.free_count(), 7);
    }

    #[test]
    fn test_segments_indexed() {
        let mut pool = pool(8);
        let leases = pool.acquire_segments().unwrap().unwrap();
        let indexes: Vec<_> = leases.iter().map(|l| l.segment).collect();
        assert_eq!(indexes, (0..8).map(Some).collect::<Vec<_>>());
        assert!(leases.iter().all(|l| l.frame == leases[0].frame && l.frame != 0));
        assert_eq!(pool.free_count(), 0);
    }

    #[test]
    fn test_each_segment_set_is_a_new_frame() {
        let mut pool = pool(17);
        let first = pool.acquire_segments().unwrap().unwrap();
        let second = pool.acquire_segments().unwrap().unwrap();
        assert_ne!(first[0].frame, second[0].frame);
        assert_eq!(pool.acquire().map(|l| l.frame), Some(0));
    }

    #[test]
    fn test_segments_need_eight_buffers() {
        let mut pool = pool(4);
        assert!(matches!(
            pool.acquire_segments(),
            Err(EngineError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_rx_fill_and_reclaim() {
        let mut pool = pool(1);
        let lease = pool.fill(b"hello").unwrap();
        assert_eq!(&lease.region[..lease.len], b"hello");
        assert!(pool.fill(b"x").is_none());

        pool.reclaim(lease.handle, lease.region).unwrap();
        assert_eq!(pool.free_count(), 1);
    }

    #[test]
    fn test_rx_oversized_payload() {
        let mut pool = pool(1);
        assert!(pool.fill(&[0u8; 65]).is_none());
        assert_eq!(pool.free_count(), 1);
    }

    #[test]
    fn test_close_invalidates_handles() {
        let mut pool = pool(2);
        let lease = pool.fill(b"data").unwrap();
        pool.close();
        assert!(pool.is_closed());
        assert!(pool.acquire().is_none());
        assert!(matches!(
            pool.reclaim(lease.handle, lease.region),
            Err(EngineError::StaleBuffer(_))
        ));
    }
}
