//! Archive volume storage engine.
//!
//! Durable, append-only archival of typed records in self-describing
//! volumes on any seekable medium:
//!
//! - [`Volume`]: a write-once metadata header followed by page records,
//!   each page compressed then encrypted as one unit
//! - [`Page`]: the framing layer; length/checksum envelopes around
//!   entries, with per-frame corruption isolation
//! - [`Appender`] / [`Reader`]: typed producer and consumer protocols
//!   over a volume, with size-based page rollover, bookmark resume,
//!   tolerant reads and parallel batch scans
//! - [`IndexWriter`] / [`IndexReader`]: secondary indexes stored as
//!   ordinary volumes of `(key, bookmark)` records
//! - [`SchemeRegistry`]: explicit name-to-codec resolution for the
//!   compression and encryption schemes volume metadata declares
//! - [`PageCache`]: optional shared cache of decoded page bodies
//!
//! Record types, bookmarks and codecs live in `archav-core`; this crate
//! adds the media formats and the I/O.

pub mod appender;
pub mod cache;
pub mod config;
pub mod error;
pub mod index;
pub mod page;
pub mod reader;
pub mod scheme;
pub mod volume;

pub use appender::{Appender, RecordHook};
pub use cache::{CacheStats, LruPageCache, PageCache};
pub use config::{AppenderConfig, ScanOptions};
pub use error::{Error, Result};
pub use index::{index_metadata, IndexReader, IndexWriter, INDEX_CONTENT_TYPE};
pub use page::{Entry, EntryStatus, Page, PageState};
pub use reader::{scan_volumes, Reader, Records, ScanSummary};
pub use scheme::{
    CompressionScheme, EncryptionScheme, Lz4Scheme, NullCompression, NullEncryption,
    SchemeRegistry,
};
pub use volume::{Medium, PageId, PageIter, Volume, DEFAULT_PAGE_SIZE};

pub use archav_core::{
    BincodeCodec, Bookmark, BytesCodec, IndexCodec, IndexEntry, RecordCodec, StringCodec,
    VolumeMetadata,
};
