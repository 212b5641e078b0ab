//! Connection configuration.

use std::collections::HashSet;
use std::fmt;

use crate::core::{EngineError, Result};

/// Direction of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Sends payloads; created by `create_transmit_connection`.
    Transmitter,
    /// Receives payloads; created by `create_receive_connection`.
    Receiver,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Transmitter => f.write_str("transmit"),
            Role::Receiver => f.write_str("receive"),
        }
    }
}

/// Kind of media carried by an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    /// Uncompressed video.
    Video,
    /// PCM or floating point audio.
    Audio,
    /// Ancillary data packets.
    Ancillary,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Video => f.write_str("video"),
            MediaKind::Audio => f.write_str("audio"),
            MediaKind::Ancillary => f.write_str("ancillary"),
        }
    }
}

/// One media element of a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaElement {
    /// Stable element identifier.
    pub id: String,
    /// Media kind.
    pub kind: MediaKind,
}

impl MediaElement {
    /// Create an element.
    pub fn new(id: impl Into<String>, kind: MediaKind) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }

    /// Video element.
    pub fn video(id: impl Into<String>) -> Self {
        Self::new(id, MediaKind::Video)
    }

    /// Audio element.
    pub fn audio(id: impl Into<String>) -> Self {
        Self::new(id, MediaKind::Audio)
    }

    /// Ancillary data element.
    pub fn ancillary(id: impl Into<String>) -> Self {
        Self::new(id, MediaKind::Ancillary)
    }
}

/// Validated, immutable configuration captured at connection creation.
///
/// The number and order of media elements defines how many buffers an
/// [`Elements`](crate::scheduler::Payload::Elements) payload carries and in
/// which order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    elements: Vec<MediaElement>,
}

impl ConnectionConfig {
    /// Start building a configuration.
    pub fn builder() -> ConnectionConfigBuilder {
        ConnectionConfigBuilder::new()
    }

    /// Media elements in configuration order.
    pub fn elements(&self) -> &[MediaElement] {
        &self.elements
    }

    /// Number of media elements.
    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    /// Position of the element with `id`.
    pub fn element_index(&self, id: &str) -> Option<usize> {
        self.elements.iter().position(|e| e.id == id)
    }

    /// Check element count and identifiers.
    pub fn validate(&self) -> Result<()> {
        if self.elements.is_empty() {
            return Err(EngineError::invalid_parameter(
                "elements",
                "at least one media element is required",
            ));
        }
        let mut seen = HashSet::new();
        for element in &self.elements {
            if element.id.is_empty() {
                return Err(EngineError::invalid_parameter(
                    "elements",
                    "media element id must not be empty",
                ));
            }
            if !seen.insert(element.id.as_str()) {
                return Err(EngineError::invalid_parameter(
                    "elements",
                    format!("duplicate media element id '{}'", element.id),
                ));
            }
        }
        Ok(())
    }
}

/// Builder for [`ConnectionConfig`].
#[derive(Debug, Default)]
pub struct ConnectionConfigBuilder {
    elements: Vec<MediaElement>,
}

impl ConnectionConfigBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a media element.
    pub fn element(mut self, element: MediaElement) -> Self {
        self.elements.push(element);
        self
    }

    /// Append several media elements.
    pub fn elements(mut self, elements: impl IntoIterator<Item = MediaElement>) -> Self {
        self.elements.extend(elements);
        self
    }

    /// Validate and build the configuration.
    pub fn build(self) -> Result<ConnectionConfig> {
        let config = ConnectionConfig {
            elements: self.elements,
        };
        config.validate()?;
        Ok(config)
    }
}
