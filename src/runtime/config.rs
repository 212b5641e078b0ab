//! Engine configuration.

use std::time::Duration;

use crate::core::constants::{
    DEFAULT_DRAIN_POLL_INTERVAL, DEFAULT_RX_BUFFER_COUNT, DEFAULT_THREAD_NAME,
    FALLBACK_WORKER_COUNT, MAX_THREAD_PRIORITY, POLLED_MODE_THREADS, UNRESTRICTED,
};
use crate::core::{EngineError, Result};

/// How events reach the callbacks. Fixed for the lifetime of an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadingMode {
    /// No internal threads; the caller drives dispatch with `poll_events`.
    Polled,
    /// An internal pool of `workers` threads drives dispatch.
    Threaded {
        /// Worker thread count.
        workers: usize,
    },
}

impl ThreadingMode {
    /// Name used in logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            ThreadingMode::Polled => "polled",
            ThreadingMode::Threaded { .. } => "threaded",
        }
    }
}

/// Process-scoped engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// `0` selects polled mode, `-1` an unrestricted worker pool, `n > 0` at
    /// most `n` workers.
    pub max_threads: i32,

    /// Highest worker priority, `0..=99`, or `-1` for no restriction.
    pub max_priority: i32,

    /// Buffers allocated per receive connection.
    pub rx_buffer_count: u32,

    /// Longest a destroy waits between drain checks.
    pub drain_poll_interval: Duration,

    /// Worker thread name.
    pub thread_name: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_threads: POLLED_MODE_THREADS,
            max_priority: UNRESTRICTED,
            rx_buffer_count: DEFAULT_RX_BUFFER_COUNT,
            drain_poll_interval: DEFAULT_DRAIN_POLL_INTERVAL,
            thread_name: DEFAULT_THREAD_NAME.to_string(),
        }
    }
}

impl EngineConfig {
    /// Polled-mode configuration.
    pub fn polled() -> Self {
        Self::default()
    }

    /// Threaded configuration with at most `max_threads` workers (`-1` for no limit).
    pub fn threaded(max_threads: i32) -> Self {
        Self {
            max_threads,
            ..Self::default()
        }
    }

    /// Start building a configuration.
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::new()
    }

    /// Check thread count, priority and pool sizing.
    pub fn validate(&self) -> Result<()> {
        if self.max_threads < UNRESTRICTED {
            return Err(EngineError::invalid_parameter(
                "max_threads",
                format!("{} is below -1", self.max_threads),
            ));
        }
        if self.max_priority != UNRESTRICTED
            && !(0..=MAX_THREAD_PRIORITY).contains(&self.max_priority)
        {
            return Err(EngineError::invalid_parameter(
                "max_priority",
                format!("{} is outside 0..=99 and not -1", self.max_priority),
            ));
        }
        if self.rx_buffer_count == 0 {
            return Err(EngineError::invalid_parameter(
                "rx_buffer_count",
                "receive connections need at least one buffer",
            ));
        }
        if self.drain_poll_interval.is_zero() {
            return Err(EngineError::invalid_parameter(
                "drain_poll_interval",
                "must be greater than zero",
            ));
        }
        Ok(())
    }

    /// Threading mode selected by `max_threads`.
    pub fn threading_mode(&self) -> ThreadingMode {
        match self.max_threads {
            POLLED_MODE_THREADS => ThreadingMode::Polled,
            UNRESTRICTED => ThreadingMode::Threaded {
                workers: std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(FALLBACK_WORKER_COUNT),
            },
            n => ThreadingMode::Threaded {
                workers: n.max(1) as usize,
            },
        }
    }
}

/// Builder for [`EngineConfig`].
#[derive(Debug, Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    /// Create a builder with polled-mode defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum worker thread count.
    pub fn max_threads(mut self, max_threads: i32) -> Self {
        self.config.max_threads = max_threads;
        self
    }

    /// Set the maximum worker priority.
    pub fn max_priority(mut self, max_priority: i32) -> Self {
        self.config.max_priority = max_priority;
        self
    }

    /// Set the number of buffers per receive connection.
    pub fn rx_buffer_count(mut self, count: u32) -> Self {
        self.config.rx_buffer_count = count;
        self
    }

    /// Set the drain check interval used by destroy.
    pub fn drain_poll_interval(mut self, interval: Duration) -> Self {
        self.config.drain_poll_interval = interval;
        self
    }

    /// Set the worker thread name.
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.config.thread_name = name.into();
        self
    }

    /// Validate and build the configuration.
    pub fn build(self) -> Result<EngineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
