//! Typed Record Codecs
//!
//! The engine stores opaque byte entries; `RecordCodec` is the seam where a
//! domain type becomes bytes and back. Codecs are strategy objects passed
//! into `Appender`/`Reader` construction rather than trait objects baked into
//! a subclass hierarchy: one generic appender/reader pair serves every record
//! type.
//!
//! Stock codecs:
//! - `BytesCodec`: raw `bytes::Bytes` payloads, no transformation
//! - `StringCodec`: UTF-8 strings
//! - `BincodeCodec<T>`: any serde type, compact binary encoding
//! - `IndexCodec<K>`: `(key, bookmark)` index records
//!
//! The engine is agnostic to what `T` is; domain-specific codecs (log
//! messages, structured facts, typed rows) are thin plug-ins implemented by
//! callers over the same trait.

use std::marker::PhantomData;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::bookmark::Bookmark;
use crate::error::{Error, Result};

/// Serializer/deserializer pair for one record type.
pub trait RecordCodec<T> {
    fn encode(&self, value: &T) -> Result<Vec<u8>>;
    fn decode(&self, bytes: &[u8]) -> Result<T>;
}

/// Identity codec for raw byte payloads.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesCodec;

impl RecordCodec<Bytes> for BytesCodec {
    fn encode(&self, value: &Bytes) -> Result<Vec<u8>> {
        Ok(value.to_vec())
    }

    fn decode(&self, bytes: &[u8]) -> Result<Bytes> {
        Ok(Bytes::copy_from_slice(bytes))
    }
}

/// UTF-8 string codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringCodec;

impl RecordCodec<String> for StringCodec {
    fn encode(&self, value: &String) -> Result<Vec<u8>> {
        Ok(value.as_bytes().to_vec())
    }

    fn decode(&self, bytes: &[u8]) -> Result<String> {
        String::from_utf8(bytes.to_vec()).map_err(|e| Error::Codec(e.to_string()))
    }
}

/// Compact binary codec for any serde type.
#[derive(Debug, Clone, Copy)]
pub struct BincodeCodec<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> Default for BincodeCodec<T> {
    fn default() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> BincodeCodec<T> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<T: Serialize + DeserializeOwned> RecordCodec<T> for BincodeCodec<T> {
    fn encode(&self, value: &T) -> Result<Vec<u8>> {
        bincode::serialize(value).map_err(|e| Error::Codec(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<T> {
        bincode::deserialize(bytes).map_err(|e| Error::Codec(e.to_string()))
    }
}

/// One record of a primitive index: a key value plus the bookmark of the data
/// record it refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry<K> {
    pub key: K,
    pub bookmark: Bookmark,
}

impl<K> IndexEntry<K> {
    pub fn new(key: K, bookmark: Bookmark) -> Self {
        Self { key, bookmark }
    }
}

/// Codec for `(key, bookmark)` index records.
pub type IndexCodec<K> = BincodeCodec<IndexEntry<K>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_codec_identity() {
        let codec = BytesCodec;
        let payload = Bytes::from_static(b"\x00\x01\xffbinary");
        let encoded = codec.encode(&payload).unwrap();
        assert_eq!(encoded, payload.to_vec());
        assert_eq!(codec.decode(&encoded).unwrap(), payload);
    }

    #[test]
    fn test_string_codec_rejects_invalid_utf8() {
        let codec = StringCodec;
        assert!(codec.decode(&[0xff, 0xfe]).is_err());
        assert_eq!(codec.decode(b"hello").unwrap(), "hello");
    }

    #[test]
    fn test_bincode_codec_roundtrip() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Fact {
            subject: String,
            weight: i64,
        }

        let codec = BincodeCodec::<Fact>::new();
        let fact = Fact {
            subject: "disk".into(),
            weight: -3,
        };
        let bytes = codec.encode(&fact).unwrap();
        assert_eq!(codec.decode(&bytes).unwrap(), fact);
    }

    #[test]
    fn test_index_codec_roundtrip() {
        let codec = IndexCodec::<u64>::new();
        let entry = IndexEntry::new(42u64, Bookmark::new(4096, 24));
        let bytes = codec.encode(&entry).unwrap();
        assert_eq!(codec.decode(&bytes).unwrap(), entry);
    }

    #[test]
    fn test_index_codec_string_keys() {
        let codec = IndexCodec::<String>::new();
        let entry = IndexEntry::new("user-7".to_string(), Bookmark::new(128, 0));
        let bytes = codec.encode(&entry).unwrap();
        assert_eq!(codec.decode(&bytes).unwrap(), entry);
    }
}
