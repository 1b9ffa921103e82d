//! Volume Metadata
//!
//! Every volume starts with a self-describing header. The header is written
//! exactly once, at volume creation, and is immutable afterwards: re-opening
//! the same medium must reconstruct a field-for-field identical
//! `VolumeMetadata`.
//!
//! The metadata names the compression and encryption schemes by string; the
//! storage layer resolves those names through an explicit `SchemeRegistry` at
//! open time. `None` means uncompressed / plaintext.
//!
//! `app_config` is a free-form JSON sub-tree for application-specific header
//! data. The engine never interprets it, it only round-trips it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Self-describing volume header, written once at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeMetadata {
    /// Unique volume identity.
    pub id: Uuid,

    /// Short human-readable label.
    pub label: String,

    /// Free-text description.
    pub description: String,

    /// (major, minor) content version pair.
    pub version: (u16, u16),

    /// Channel tag (which producer/stream this volume belongs to).
    pub channel: String,

    /// Content-type tag (what the entry payloads encode).
    pub content_type: String,

    /// Compression scheme name; `None` means uncompressed.
    pub compression: Option<String>,

    /// Encryption scheme name; `None` means plaintext.
    pub encryption: Option<String>,

    /// Application-specific configuration sub-tree.
    pub app_config: Value,
}

impl VolumeMetadata {
    /// Create metadata with a fresh id and the given label and content type.
    /// Everything else defaults to empty / identity.
    pub fn new(label: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            label: label.into(),
            description: String::new(),
            version: (1, 0),
            channel: String::new(),
            content_type: content_type.into(),
            compression: None,
            encryption: None,
            app_config: Value::Null,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_version(mut self, major: u16, minor: u16) -> Self {
        self.version = (major, minor);
        self
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    pub fn with_compression(mut self, scheme: impl Into<String>) -> Self {
        self.compression = Some(scheme.into());
        self
    }

    pub fn with_encryption(mut self, scheme: impl Into<String>) -> Self {
        self.encryption = Some(scheme.into());
        self
    }

    pub fn with_app_config(mut self, config: Value) -> Self {
        self.app_config = config;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_defaults() {
        let meta = VolumeMetadata::new("audit", "log/binary");
        assert_eq!(meta.label, "audit");
        assert_eq!(meta.content_type, "log/binary");
        assert_eq!(meta.version, (1, 0));
        assert!(meta.compression.is_none());
        assert!(meta.encryption.is_none());
        assert_eq!(meta.app_config, Value::Null);
    }

    #[test]
    fn test_builder_chain() {
        let meta = VolumeMetadata::new("audit", "log/binary")
            .with_description("nightly audit archive")
            .with_version(2, 3)
            .with_channel("audit-eu")
            .with_compression("lz4")
            .with_encryption("none")
            .with_app_config(json!({"retention_days": 90}));

        assert_eq!(meta.description, "nightly audit archive");
        assert_eq!(meta.version, (2, 3));
        assert_eq!(meta.channel, "audit-eu");
        assert_eq!(meta.compression.as_deref(), Some("lz4"));
        assert_eq!(meta.encryption.as_deref(), Some("none"));
        assert_eq!(meta.app_config["retention_days"], 90);
    }

    #[test]
    fn test_json_roundtrip_preserves_all_fields() {
        let meta = VolumeMetadata::new("events", "fact/typed")
            .with_description("structured facts")
            .with_version(1, 4)
            .with_channel("facts")
            .with_compression("lz4")
            .with_app_config(json!({"shard": 7, "tags": ["a", "b"]}));

        let bytes = serde_json::to_vec(&meta).unwrap();
        let back: VolumeMetadata = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(meta, back);
    }

    #[test]
    fn test_ids_are_unique() {
        let a = VolumeMetadata::new("a", "x");
        let b = VolumeMetadata::new("b", "x");
        assert_ne!(a.id, b.id);
    }
}
