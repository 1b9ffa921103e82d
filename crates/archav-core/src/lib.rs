//! Archav Core Types
//!
//! This crate defines the types shared by every layer of the archav archive
//! volume engine. It contains no I/O:
//!
//! - `Error` / `Result`: the core error taxonomy
//! - `Bookmark`: a resumable cursor into a volume (page id + entry address)
//! - `VolumeMetadata`: the self-describing, write-once volume header
//! - `RecordCodec`: the typed value <-> bytes seam, plus stock codecs
//! - `IndexEntry`: the `(key, bookmark)` record shape used by primitive indexes
//!
//! The storage engine itself (pages, volumes, appenders, readers) lives in
//! `archav-storage`.

pub mod bookmark;
pub mod codec;
pub mod error;
pub mod metadata;

pub use bookmark::Bookmark;
pub use codec::{BincodeCodec, BytesCodec, IndexCodec, IndexEntry, RecordCodec, StringCodec};
pub use error::{Error, Result};
pub use metadata::VolumeMetadata;

/// Current version of archav-core
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
