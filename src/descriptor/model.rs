//! Connection descriptor document.
//!
//! ```json
//! {
//!   "timing": {
//!     "grandmaster_id": "08-00-11-ff-fe-21-e1-b0",
//!     "origination": { "seconds": 1700000000, "nanoseconds": 0 },
//!     "min_latency_us": 500,
//!     "max_latency_us": 4000
//!   },
//!   "media": [
//!     { "type": "video", "id": "v0", "width": 1920, "height": 1080,
//!       "sampling": "YCbCr-4:2:2", "depth": 10 },
//!     { "type": "audio", "id": "a0", "channels": 2, "samples": 48, "format": "pcm24" },
//!     { "type": "ancillary", "id": "anc0", "max_bytes": 1024 }
//!   ],
//!   "transport": { "kind": "rtp" }
//! }
//! ```
//!
//! Both ends of a connection are created from the same document. The
//! `transport` object is kept as-is for the transport implementation.

use serde::{Deserialize, Serialize};

use super::sizing::{SampleFormat, Sampling, audio_payload_size, video_frame_size};
use crate::connection::{ConnectionConfig, MediaElement, MediaKind};
use crate::core::{EngineError, PtpTimestamp, Result};

/// Timing fields shared by both ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingDescriptor {
    /// PTP grandmaster clock identity.
    pub grandmaster_id: String,
    /// Origination time reference.
    #[serde(default)]
    pub origination: Option<PtpTimestamp>,
    /// Arrival time reference, when the receiver has observed one.
    #[serde(default)]
    pub arrival: Option<PtpTimestamp>,
    /// Lower latency bound in microseconds.
    #[serde(default)]
    pub min_latency_us: u64,
    /// Upper latency bound in microseconds.
    pub max_latency_us: u64,
}

/// One media element with its type-specific attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MediaDescriptor {
    /// Uncompressed video.
    Video {
        /// Element identifier.
        id: String,
        /// Active width in pixels.
        width: u32,
        /// Active height in lines.
        height: u32,
        /// Chroma sampling.
        sampling: Sampling,
        /// Bits per component.
        depth: u8,
    },
    /// Interleaved audio.
    Audio {
        /// Element identifier.
        id: String,
        /// Channel count.
        channels: u32,
        /// Samples per channel per payload.
        samples: u32,
        /// Sample encoding.
        format: SampleFormat,
    },
    /// Ancillary data packets.
    Ancillary {
        /// Element identifier.
        id: String,
        /// Largest packet set per payload, in bytes.
        max_bytes: u32,
    },
}

impl MediaDescriptor {
    /// Element identifier.
    pub fn id(&self) -> &str {
        match self {
            MediaDescriptor::Video { id, .. }
            | MediaDescriptor::Audio { id, .. }
            | MediaDescriptor::Ancillary { id, .. } => id,
        }
    }

    /// Media kind.
    pub fn kind(&self) -> MediaKind {
        match self {
            MediaDescriptor::Video { .. } => MediaKind::Video,
            MediaDescriptor::Audio { .. } => MediaKind::Audio,
            MediaDescriptor::Ancillary { .. } => MediaKind::Ancillary,
        }
    }

    /// Bytes one payload of this element occupies.
    pub fn payload_size(&self) -> Result<usize> {
        match self {
            MediaDescriptor::Video {
                width,
                height,
                sampling,
                depth,
                ..
            } => video_frame_size(*width, *height, *sampling, *depth),
            MediaDescriptor::Audio {
                channels,
                samples,
                format,
                ..
            } => audio_payload_size(*channels, *samples, *format),
            MediaDescriptor::Ancillary { max_bytes, .. } => {
                if *max_bytes == 0 {
                    return Err(EngineError::invalid_parameter(
                        "max_bytes",
                        "ancillary payload size must be greater than zero",
                    ));
                }
                Ok(*max_bytes as usize)
            }
        }
    }
}

/// Parsed connection descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionDescriptor {
    /// Timing fields.
    pub timing: TimingDescriptor,
    /// Media elements in payload order.
    pub media: Vec<MediaDescriptor>,
    /// Transport parameters, opaque to the engine.
    #[serde(default)]
    pub transport: serde_json::Value,
}

impl ConnectionDescriptor {
    /// Parse and validate a descriptor.
    pub fn from_json(json: &str) -> Result<Self> {
        let descriptor: Self = serde_json::from_str(json)
            .map_err(|e| EngineError::invalid_parameter("connection_json", e.to_string()))?;
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// Check timing bounds, timestamps and element sizing.
    pub fn validate(&self) -> Result<()> {
        let timing = &self.timing;
        if timing.grandmaster_id.is_empty() {
            return Err(EngineError::invalid_parameter(
                "grandmaster_id",
                "grandmaster clock identity must not be empty",
            ));
        }
        if timing.min_latency_us > timing.max_latency_us {
            return Err(EngineError::invalid_parameter(
                "latency",
                format!(
                    "min latency {}us exceeds max latency {}us",
                    timing.min_latency_us, timing.max_latency_us
                ),
            ));
        }
        for ts in [&timing.origination, &timing.arrival].into_iter().flatten() {
            ts.validate()?;
        }
        for media in &self.media {
            media.payload_size()?;
        }
        self.to_config().map(|_| ())
    }

    /// Engine configuration: element ids and kinds in order.
    pub fn to_config(&self) -> Result<ConnectionConfig> {
        ConnectionConfig::builder()
            .elements(
                self.media
                    .iter()
                    .map(|m| MediaElement::new(m.id(), m.kind())),
            )
            .build()
    }

    /// Largest per-element payload; a buffer of this size fits any element.
    pub fn max_payload_size(&self) -> Result<usize> {
        self.media
            .iter()
            .map(MediaDescriptor::payload_size)
            .try_fold(0, |max, size| size.map(|s| max.max(s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESCRIPTOR: &str = r#"{
        "timing": {
            "grandmaster_id": "08-00-11-ff-fe-21-e1-b0",
            "origination": { "seconds": 1700000000, "nanoseconds": 500 },
            "min_latency_us": 500,
            "max_latency_us": 4000
        },
        "media": [
            { "type": "video", "id": "v0", "width": 1280, "height": 720,
              "sampling": "YCbCr-4:2:2", "depth": 10 },
            { "type": "audio", "id": "a0", "channels": 2, "samples": 48, "format": "pcm24" },
            { "type": "ancillary", "id": "anc0", "max_bytes": 1024 }
        ],
        "transport": { "kind": "rtp", "port": 5004 }
    }"#;

    #[test]
    fn test_parse_descriptor() {
        let d = ConnectionDescriptor::from_json(DESCRIPTOR).unwrap();
        assert_eq!(d.media.len(), 3);
        assert_eq!(d.timing.max_latency_us, 4000);
        assert_eq!(d.transport["port"], 5004);

        let config = d.to_config().unwrap();
        assert_eq!(config.element_count(), 3);
        assert_eq!(config.element_index("a0"), Some(1));
        assert_eq!(config.elements()[2].kind, MediaKind::Ancillary);
    }

    #[test]
    fn test_payload_sizes() {
        let d = ConnectionDescriptor::from_json(DESCRIPTOR).unwrap();
        assert_eq!(d.media[0].payload_size().unwrap(), 1280 * 720 / 2 * 5);
        assert_eq!(d.media[1].payload_size().unwrap(), 288);
        assert_eq!(d.media[2].payload_size().unwrap(), 1024);
        assert_eq!(d.max_payload_size().unwrap(), 1280 * 720 / 2 * 5);
    }

    #[test]
    fn test_rejects_inverted_latency() {
        let json = DESCRIPTOR.replace("\"min_latency_us\": 500", "\"min_latency_us\": 5000");
        let err = ConnectionDescriptor::from_json(&json).unwrap_err();
        assert!(err.to_string().contains("latency"));
    }

    #[test]
    fn test_rejects_duplicate_ids() {
        let json = DESCRIPTOR.replace("\"id\": \"anc0\"", "\"id\": \"v0\"");
        assert!(ConnectionDescriptor::from_json(&json).is_err());
    }

    #[test]
    fn test_rejects_malformed_json() {
        let err = ConnectionDescriptor::from_json("{ \"timing\": ").unwrap_err();
        assert_eq!(err.status(), crate::core::Status::InvalidParameter);
    }

    #[test]
    fn test_rejects_bad_nanoseconds() {
        let json = DESCRIPTOR.replace("\"nanoseconds\": 500", "\"nanoseconds\": 1000000000");
        assert!(ConnectionDescriptor::from_json(&json).is_err());
    }

    #[test]
    fn test_rejects_unknown_media_type() {
        let json = DESCRIPTOR.replace("\"type\": \"ancillary\"", "\"type\": \"haptic\"");
        assert!(ConnectionDescriptor::from_json(&json).is_err());
    }
}
