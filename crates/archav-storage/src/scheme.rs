//! Named Compression and Encryption Schemes
//!
//! Volume metadata names its schemes by string (`"lz4"`, `"none"`, ...).
//! The `SchemeRegistry` resolves those names to codec instances at volume
//! construction time. The registry is an explicit object passed into
//! `Volume::create` / `Volume::open`; there is no process-wide static
//! lookup, so tests and embedders control exactly which schemes exist.
//!
//! A `None` scheme name in metadata means the identity transform and is
//! handled by the volume without consulting the registry. The registered
//! `"none"` scheme is also the identity, for metadata that spells it out.
//!
//! Built-in compression: `lz4` via `lz4_flex` (size-prepended block format).
//! Encryption implementations are deliberately not bundled beyond `"none"`;
//! callers register their own transforms by name.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result};

/// A named, pluggable compression transform over a byte buffer.
pub trait CompressionScheme: Send + Sync {
    fn name(&self) -> &str;
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// A named, pluggable encryption transform over a byte buffer.
pub trait EncryptionScheme: Send + Sync {
    fn name(&self) -> &str;
    fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>>;
    fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// LZ4 block compression with a length prefix.
#[derive(Debug, Default)]
pub struct Lz4Scheme;

impl CompressionScheme for Lz4Scheme {
    fn name(&self) -> &str {
        "lz4"
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(lz4_flex::compress_prepend_size(data))
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        lz4_flex::decompress_size_prepended(data).map_err(|e| Error::Decompression(e.to_string()))
    }
}

/// Identity compression, for metadata that names "none" explicitly.
#[derive(Debug, Default)]
pub struct NullCompression;

impl CompressionScheme for NullCompression {
    fn name(&self) -> &str {
        "none"
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }
}

/// Identity encryption.
#[derive(Debug, Default)]
pub struct NullEncryption;

impl EncryptionScheme for NullEncryption {
    fn name(&self) -> &str {
        "none"
    }

    fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }
}

/// Resolves scheme names from volume metadata to codec instances.
pub struct SchemeRegistry {
    compression: HashMap<String, Arc<dyn CompressionScheme>>,
    encryption: HashMap<String, Arc<dyn EncryptionScheme>>,
}

impl Default for SchemeRegistry {
    fn default() -> Self {
        let mut registry = Self {
            compression: HashMap::new(),
            encryption: HashMap::new(),
        };
        registry.register_compression(Arc::new(NullCompression));
        registry.register_compression(Arc::new(Lz4Scheme));
        registry.register_encryption(Arc::new(NullEncryption));
        registry
    }
}

impl SchemeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_compression(&mut self, scheme: Arc<dyn CompressionScheme>) {
        self.compression.insert(scheme.name().to_string(), scheme);
    }

    pub fn register_encryption(&mut self, scheme: Arc<dyn EncryptionScheme>) {
        self.encryption.insert(scheme.name().to_string(), scheme);
    }

    /// Resolve a compression scheme name. Fails with `UnknownScheme` if no
    /// scheme was registered under that name.
    pub fn compression(&self, name: &str) -> Result<Arc<dyn CompressionScheme>> {
        self.compression
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownScheme(name.to_string()))
    }

    /// Resolve an encryption scheme name.
    pub fn encryption(&self, name: &str) -> Result<Arc<dyn EncryptionScheme>> {
        self.encryption
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownScheme(name.to_string()))
    }
}
