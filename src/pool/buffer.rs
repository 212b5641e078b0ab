//! Buffer leases handed to the application.
//!
//! A lease owns its region outright: nothing else can observe the bytes until
//! the lease is submitted (transmit) or freed (receive). Dropping a lease that
//! was never submitted or freed returns it to its pool.

use std::sync::Weak;

use parking_lot::Mutex;

use super::pool::{BufferPool, Lease, SharedPool};
use crate::core::constants::SEGMENT_COUNT;
use crate::core::{BufferHandle, ConnectionHandle, EngineError, PtpTimestamp, Result};

/// A transmit buffer leased from a connection's pool.
#[derive(Debug)]
pub struct TxBuffer {
    handle: BufferHandle,
    region: Box<[u8]>,
    len: usize,
    segment: Option<u8>,
    frame: u64,
    origination: PtpTimestamp,
    pool: Weak<Mutex<BufferPool>>,
    armed: bool,
}

/// Parts of a transmit buffer moved into the pool at submission.
#[derive(Debug)]
pub(crate) struct Submission {
    pub handle: BufferHandle,
    pub region: Box<[u8]>,
    pub len: usize,
    pub origination: PtpTimestamp,
}

impl TxBuffer {
    pub(crate) fn from_lease(lease: Lease, pool: &SharedPool) -> Self {
        Self {
            handle: lease.handle,
            region: lease.region,
            len: lease.len,
            segment: lease.segment,
            frame: lease.frame,
            origination: PtpTimestamp::ZERO,
            pool: std::sync::Arc::downgrade(pool),
            armed: true,
        }
    }

    /// Handle of this buffer.
    pub fn handle(&self) -> BufferHandle {
        self.handle
    }

    /// Connection that owns this buffer.
    pub fn connection(&self) -> ConnectionHandle {
        self.handle.connection()
    }

    /// Size of the underlying region.
    pub fn capacity(&self) -> usize {
        self.region.len()
    }

    /// Number of payload bytes that will be transmitted.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether no payload bytes have been set.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Set the payload length after filling the region in place.
    pub fn set_len(&mut self, len: usize) -> Result<()> {
        if len > self.region.len() {
            return Err(EngineError::invalid_parameter(
                "len",
                format!("{} exceeds buffer capacity {}", len, self.region.len()),
            ));
        }
        self.len = len;
        Ok(())
    }

    /// Copy `data` to the start of the region and set the payload length.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        self.set_len(data.len())?;
        self.region[..data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Payload bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.region[..self.len]
    }

    /// The whole region, for filling in place. Follow with [`TxBuffer::set_len`].
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.region
    }

    /// Whether this buffer is one segment of a segmented frame.
    pub fn is_segment(&self) -> bool {
        self.segment.is_some()
    }

    /// Index (0-7) of this segment within its frame.
    pub fn segment_index(&self) -> Option<u8> {
        self.segment
    }

    /// Origination timestamp forwarded to the transport.
    pub fn origination_timestamp(&self) -> PtpTimestamp {
        self.origination
    }

    /// Set the origination timestamp forwarded to the transport.
    pub fn set_origination_timestamp(&mut self, timestamp: PtpTimestamp) -> Result<()> {
        timestamp.validate()?;
        self.origination = timestamp;
        Ok(())
    }

    /// Disarm the lease and move its region out for submission.
    pub(crate) fn into_submission(mut self) -> Submission {
        self.armed = false;
        Submission {
            handle: self.handle,
            region: std::mem::take(&mut self.region),
            len: self.len,
            origination: self.origination,
        }
    }
}

impl Drop for TxBuffer {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Some(pool) = self.pool.upgrade() {
            let region = std::mem::take(&mut self.region);
            if let Err(e) = pool.lock().release(self.handle, region) {
                tracing::debug!(buffer = %self.handle, error = %e, "unsubmitted buffer not returned");
            }
        }
    }
}

/// A received payload held by the application until freed.
#[derive(Debug)]
pub struct RxBuffer {
    handle: BufferHandle,
    region: Box<[u8]>,
    len: usize,
    pool: Weak<Mutex<BufferPool>>,
    armed: bool,
}

impl RxBuffer {
    pub(crate) fn from_lease(lease: Lease, pool: &SharedPool) -> Self {
        Self {
            handle: lease.handle,
            region: lease.region,
            len: lease.len,
            pool: std::sync::Arc::downgrade(pool),
            armed: true,
        }
    }

    /// Handle of this buffer.
    pub fn handle(&self) -> BufferHandle {
        self.handle
    }

    /// Connection that received this payload.
    pub fn connection(&self) -> ConnectionHandle {
        self.handle.connection()
    }

    /// Received payload bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.region[..self.len]
    }

    /// Length of the received payload.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Return the region to its pool.
    pub(crate) fn release(mut self) -> Result<()> {
        self.armed = false;
        let region = std::mem::take(&mut self.region);
        match self.pool.upgrade() {
            Some(pool) => pool.lock().reclaim(self.handle, region),
            None => Err(EngineError::StaleBuffer(self.handle)),
        }
    }
}

impl AsRef<[u8]> for RxBuffer {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl Drop for RxBuffer {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Some(pool) = self.pool.upgrade() {
            let region = std::mem::take(&mut self.region);
            let _ = pool.lock().reclaim(self.handle, region);
        }
    }
}

/// Eight buffers holding one frame split into independently fillable segments.
#[derive(Debug)]
pub struct SegmentSet {
    segments: Vec<TxBuffer>,
}

impl SegmentSet {
    pub(crate) fn new(segments: Vec<TxBuffer>) -> Result<Self> {
        if segments.len() != SEGMENT_COUNT {
            return Err(EngineError::invalid_parameter(
                "segments",
                format!("expected {} segments, got {}", SEGMENT_COUNT, segments.len()),
            ));
        }
        Ok(Self { segments })
    }

    /// Connection owning every segment.
    pub fn connection(&self) -> Option<ConnectionHandle> {
        self.segments.first().map(TxBuffer::connection)
    }

    /// Segment at `index`.
    pub fn segment(&self, index: usize) -> Option<&TxBuffer> {
        self.segments.get(index)
    }

    /// Mutable segment at `index`.
    pub fn segment_mut(&mut self, index: usize) -> Option<&mut TxBuffer> {
        self.segments.get_mut(index)
    }

    /// Segments in index order.
    pub fn iter(&self) -> impl Iterator<Item = &TxBuffer> {
        self.segments.iter()
    }

    /// Mutable segments in index order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut TxBuffer> {
        self.segments.iter_mut()
    }

    /// Number of segments holding payload bytes.
    pub fn filled(&self) -> usize {
        self.segments.iter().filter(|s| !s.is_empty()).count()
    }

    /// A set may only be transmitted when every segment is filled.
    pub fn is_complete(&self) -> bool {
        self.filled() == SEGMENT_COUNT
    }

    /// Every position holds the segment with that index, and all segments
    /// were leased together as one frame.
    pub(crate) fn check_layout(&self) -> Result<()> {
        let frame = self.segments.first().map(|s| s.frame);
        for (index, segment) in self.segments.iter().enumerate() {
            if segment.segment != Some(index as u8) || Some(segment.frame) != frame {
                return Err(EngineError::invalid_parameter(
                    "payload",
                    format!(
                        "position {} holds buffer {} which is not segment {} of this frame",
                        index, segment.handle, index
                    ),
                ));
            }
        }
        Ok(())
    }

    pub(crate) fn into_buffers(self) -> Vec<TxBuffer> {
        self.segments
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::pool::BufferState;

    fn shared(count: u32) -> SharedPool {
        Arc::new(Mutex::new(
            BufferPool::new(ConnectionHandle::new(0, 1), 16, count).unwrap(),
        ))
    }

    #[test]
    fn test_write_and_len() {
        let pool = shared(1);
        let lease = pool.lock().acquire().unwrap();
        let mut buf = TxBuffer::from_lease(lease, &pool);

        buf.write(b"pgroup").unwrap();
        assert_eq!(buf.as_slice(), b"pgroup");
        assert!(buf.set_len(17).is_err());
        assert_eq!(buf.capacity(), 16);
    }

    #[test]
    fn test_drop_returns_unsubmitted_buffer() {
        let pool = shared(1);
        let lease = pool.lock().acquire().unwrap();
        let buf = TxBuffer::from_lease(lease, &pool);
        assert_eq!(pool.lock().free_count(), 0);

        drop(buf);
        assert_eq!(pool.lock().free_count(), 1);
    }

    #[test]
    fn test_submission_disarms_drop() {
        let pool = shared(1);
        let lease = pool.lock().acquire().unwrap();
        let buf = TxBuffer::from_lease(lease, &pool);
        let handle = buf.handle();

        let sub = buf.into_submission();
        assert_eq!(pool.lock().state(handle.index()), Some(BufferState::Allocated));
        pool.lock()
            .check_in(sub.handle, sub.region, sub.len, sub.origination)
            .unwrap();
        assert_eq!(pool.lock().state(handle.index()), Some(BufferState::InFlight));
    }

    #[test]
    fn test_rx_release_and_stale_release() {
        let pool = shared(1);
        let lease = pool.lock().fill(b"anc").unwrap();
        let buf = RxBuffer::from_lease(lease, &pool);
        assert_eq!(buf.as_slice(), b"anc");
        buf.release().unwrap();
        assert_eq!(pool.lock().free_count(), 1);

        let lease = pool.lock().fill(b"anc").unwrap();
        let buf = RxBuffer::from_lease(lease, &pool);
        drop(pool);
        assert!(matches!(buf.release(), Err(EngineError::StaleBuffer(_))));
    }

    #[test]
    fn test_segment_set_completeness() {
        let pool = shared(8);
        let leases = pool.lock().acquire_segments().unwrap().unwrap();
        let buffers = leases
            .into_iter()
            .map(|l| TxBuffer::from_lease(l, &pool))
            .collect();
        let mut set = SegmentSet::new(buffers).unwrap();
        assert!(!set.is_complete());

        for (i, seg) in set.iter_mut().enumerate() {
            assert_eq!(seg.segment_index(), Some(i as u8));
            seg.write(&[i as u8; 4]).unwrap();
        }
        assert!(set.is_complete());
        set.check_layout().unwrap();
    }

    fn segment_set(pool: &SharedPool) -> SegmentSet {
        let leases = pool.lock().acquire_segments().unwrap().unwrap();
        let buffers = leases
            .into_iter()
            .map(|l| TxBuffer::from_lease(l, pool))
            .collect();
        SegmentSet::new(buffers).unwrap()
    }

    #[test]
    fn test_swapped_segments_break_layout() {
        let pool = shared(16);
        let mut a = segment_set(&pool);
        let mut b = segment_set(&pool);

        // Same index, other frame.
        std::mem::swap(a.segment_mut(3).unwrap(), b.segment_mut(3).unwrap());
        assert!(a.check_layout().is_err());
        assert!(b.check_layout().is_err());
        std::mem::swap(a.segment_mut(3).unwrap(), b.segment_mut(3).unwrap());
        a.check_layout().unwrap();

        // Same frame, reordered.
        a.segments.swap(0, 1);
        assert!(a.check_layout().is_err());
    }
}
