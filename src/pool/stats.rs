//! Buffer pool statistics

/// Counters describing how a connection's buffer pool has been used.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BufferPoolStats {
    /// Configured number of buffers
    pub capacity: usize,
    /// Buffers currently not `Free`
    pub currently_in_use: usize,
    /// Peak number of buffers in use simultaneously
    pub peak_usage: usize,
    /// Successful buffer requests
    pub total_allocations: u64,
    /// Buffers returned to `Free`
    pub total_deallocations: u64,
    /// Requests that found no free buffer
    pub allocation_failures: u64,
}

impl BufferPoolStats {
    /// Create statistics for a pool of `capacity` buffers
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            ..Default::default()
        }
    }

    /// Fraction of the pool currently in use (0.0 to 1.0)
    pub fn utilization(&self) -> f64 {
        if self.capacity == 0 {
            return 0.0;
        }
        self.currently_in_use as f64 / self.capacity as f64
    }

    /// Fraction of requests that were served (0.0 to 1.0)
    pub fn success_rate(&self) -> f64 {
        let requests = self.total_allocations + self.allocation_failures;
        if requests == 0 {
            return 1.0;
        }
        self.total_allocations as f64 / requests as f64
    }

    pub(crate) fn record_allocation(&mut self) {
        self.total_allocations += 1;
        self.currently_in_use += 1;
        self.peak_usage = self.peak_usage.max(self.currently_in_use);
    }

    pub(crate) fn record_deallocation(&mut self) {
        self.total_deallocations += 1;
        self.currently_in_use = self.currently_in_use.saturating_sub(1);
    }

    pub(crate) fn record_failure(&mut self) {
        self.allocation_failures += 1;
    }
}
