//! Media payload sizing.
//!
//! Byte counts follow the packing conventions of each media type: ST 2110-20
//! pgroups for uncompressed video, interleaved samples for audio, and a
//! declared maximum for ancillary packets. The engine never looks inside the
//! bytes; these sizes only help a caller choose `buffer_size`.

use serde::{Deserialize, Serialize};

use crate::core::{EngineError, Result};

/// Video chroma sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sampling {
    /// 4:2:2 luma/chroma.
    #[serde(rename = "YCbCr-4:2:2")]
    YCbCr422,
    /// 4:4:4 luma/chroma.
    #[serde(rename = "YCbCr-4:4:4")]
    YCbCr444,
    /// RGB.
    #[serde(rename = "RGB")]
    Rgb,
}

/// Size of one pgroup and how many pixels it covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pgroup {
    /// Octets per pgroup.
    pub octets: u32,
    /// Pixels per pgroup.
    pub pixels: u32,
}

impl Pgroup {
    /// Pgroup for `sampling` at `depth` bits per component.
    pub fn for_format(sampling: Sampling, depth: u8) -> Result<Self> {
        let (octets, pixels) = match (sampling, depth) {
            (Sampling::YCbCr422, 8) => (4, 2),
            (Sampling::YCbCr422, 10) => (5, 2),
            (Sampling::YCbCr422, 12) => (6, 2),
            (Sampling::YCbCr444 | Sampling::Rgb, 8) => (3, 1),
            (Sampling::YCbCr444 | Sampling::Rgb, 10) => (15, 4),
            (Sampling::YCbCr444 | Sampling::Rgb, 12) => (9, 2),
            _ => {
                return Err(EngineError::invalid_parameter(
                    "depth",
                    format!("{depth}-bit components are not supported"),
                ));
            }
        };
        Ok(Self { octets, pixels })
    }

    /// Bytes needed for `pixels` pixels, rounded up to whole pgroups.
    pub fn bytes_for(&self, pixels: u64) -> Option<u64> {
        pixels
            .div_ceil(u64::from(self.pixels))
            .checked_mul(u64::from(self.octets))
    }
}

/// Audio sample encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    /// 16-bit linear PCM.
    Pcm16,
    /// 24-bit linear PCM.
    Pcm24,
    /// 32-bit IEEE float.
    F32,
}

impl SampleFormat {
    /// Bytes per sample.
    pub fn bytes(&self) -> u64 {
        match self {
            SampleFormat::Pcm16 => 2,
            SampleFormat::Pcm24 => 3,
            SampleFormat::F32 => 4,
        }
    }
}

/// Bytes of one uncompressed video frame.
pub fn video_frame_size(width: u32, height: u32, sampling: Sampling, depth: u8) -> Result<usize> {
    if width == 0 || height == 0 {
        return Err(EngineError::invalid_parameter(
            "video",
            "width and height must be greater than zero",
        ));
    }
    if sampling == Sampling::YCbCr422 && width % 2 != 0 {
        return Err(EngineError::invalid_parameter(
            "width",
            format!("4:2:2 needs an even width, got {width}"),
        ));
    }
    let pgroup = Pgroup::for_format(sampling, depth)?;
    let bytes = pgroup
        .bytes_for(u64::from(width) * u64::from(height))
        .ok_or_else(|| EngineError::invalid_parameter("video", "frame size overflows"))?;
    to_usize(bytes)
}

/// Bytes of `samples` interleaved samples across `channels` channels.
pub fn audio_payload_size(channels: u32, samples: u32, format: SampleFormat) -> Result<usize> {
    if channels == 0 || samples == 0 {
        return Err(EngineError::invalid_parameter(
            "audio",
            "channels and samples must be greater than zero",
        ));
    }
    let bytes = u64::from(channels) * u64::from(samples) * format.bytes();
    to_usize(bytes)
}

fn to_usize(bytes: u64) -> Result<usize> {
    usize::try_from(bytes)
        .map_err(|_| EngineError::invalid_parameter("media", "payload size exceeds address space"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pgroup_table() {
        let p = Pgroup::for_format(Sampling::YCbCr422, 10).unwrap();
        assert_eq!(p, Pgroup { octets: 5, pixels: 2 });
        let p = Pgroup::for_format(Sampling::Rgb, 10).unwrap();
        assert_eq!(p, Pgroup { octets: 15, pixels: 4 });
        assert!(Pgroup::for_format(Sampling::YCbCr444, 16).is_err());
    }

    #[test]
    fn test_hd_422_10bit_frame() {
        // 1920x1080 pixels, two pixels per 5-octet pgroup.
        let size = video_frame_size(1920, 1080, Sampling::YCbCr422, 10).unwrap();
        assert_eq!(size, 1920 * 1080 / 2 * 5);
    }

    #[test]
    fn test_partial_pgroup_rounds_up() {
        let p = Pgroup::for_format(Sampling::Rgb, 10).unwrap();
        assert_eq!(p.bytes_for(5), Some(30));
    }

    #[test]
    fn test_odd_width_422_rejected() {
        assert!(video_frame_size(1919, 1080, Sampling::YCbCr422, 8).is_err());
        assert!(video_frame_size(1919, 1080, Sampling::Rgb, 8).is_ok());
    }

    #[test]
    fn test_audio_interleaved() {
        assert_eq!(audio_payload_size(2, 48, SampleFormat::Pcm24).unwrap(), 288);
        assert_eq!(audio_payload_size(8, 6, SampleFormat::F32).unwrap(), 192);
        assert!(audio_payload_size(0, 48, SampleFormat::Pcm16).is_err());
    }
}
