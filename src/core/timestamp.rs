//! PTP timestamps.
//!
//! Timestamps are acquired outside the engine; it only validates and carries
//! them alongside buffers.

use std::time::Duration;

use super::constants::NANOS_PER_SECOND;
use super::error::{EngineError, Result};

/// Seconds/nanoseconds timestamp aligned to the PTP (SMPTE) epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "descriptor", derive(serde::Serialize, serde::Deserialize))]
pub struct PtpTimestamp {
    /// Seconds since 1970-01-01T00:00:00.
    pub seconds: u32,
    /// Fractional seconds in nanoseconds, always below 10^9.
    pub nanoseconds: u32,
}

impl PtpTimestamp {
    /// The epoch itself.
    pub const ZERO: PtpTimestamp = PtpTimestamp {
        seconds: 0,
        nanoseconds: 0,
    };

    /// Create a timestamp, rejecting an out-of-range nanosecond field.
    pub fn new(seconds: u32, nanoseconds: u32) -> Result<Self> {
        let ts = Self {
            seconds,
            nanoseconds,
        };
        ts.validate()?;
        Ok(ts)
    }

    /// Check the nanosecond field invariant.
    pub fn validate(&self) -> Result<()> {
        if self.nanoseconds >= NANOS_PER_SECOND {
            return Err(EngineError::invalid_parameter(
                "nanoseconds",
                format!("{} is not below 10^9", self.nanoseconds),
            ));
        }
        Ok(())
    }

    /// Time since the epoch.
    pub fn as_duration(&self) -> Duration {
        Duration::new(u64::from(self.seconds), self.nanoseconds)
    }

    /// Signed difference `self - earlier` in nanoseconds.
    pub fn nanos_since(&self, earlier: &PtpTimestamp) -> i128 {
        self.as_duration().as_nanos() as i128 - earlier.as_duration().as_nanos() as i128
    }
}
