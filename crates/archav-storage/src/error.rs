//! Storage Error Types
//!
//! The error taxonomy of the engine:
//!
//! - **Frame corruption** is NOT an error: a single entry whose checksum or
//!   length disagrees with its content is reported as the `BadHeader` entry
//!   status during enumeration and never raised.
//! - **Page corruption** (`PageCorrupt`, `PageBodyCorrupt`, `Decompression`,
//!   `Decryption`) is fatal in strict reads and skipped in tolerant page
//!   iteration.
//! - **Scheme resolution failure** (`UnknownScheme`) is fatal at volume open
//!   time: no valid interpretation of the page bytes is possible.
//! - **Writer misuse** (`PageState`) is a programming error and raised
//!   immediately.
//! - **I/O failures** propagate uninterpreted via `Io`.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("core error: {0}")]
    Core(#[from] archav_core::Error),

    #[error("Invalid magic bytes")]
    InvalidMagic,

    #[error("Unsupported volume format version: {0}")]
    UnsupportedVersion(u16),

    #[error("Metadata corrupt: {0}")]
    MetadataCorrupt(String),

    #[error("Unknown scheme: {0}")]
    UnknownScheme(String),

    #[error("Medium is not empty; refusing to write a volume header over it")]
    MediumNotEmpty,

    #[error("No page at id {0}")]
    PageNotFound(u64),

    #[error("Encoded page of {0} bytes exceeds the envelope limit")]
    PageTooLarge(usize),

    #[error("Page corrupt at id {page_id}")]
    PageCorrupt { page_id: u64 },

    #[error("Page body corrupt: {0}")]
    PageBodyCorrupt(String),

    #[error("Page is {actual}, operation requires {expected}")]
    PageState {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Entry of {0} bytes exceeds the frame size limit")]
    EntryTooLarge(usize),

    #[error("Page tag of {0} bytes exceeds the header limit")]
    TagTooLong(usize),

    #[error("Compression error: {0}")]
    Compression(String),

    #[error("Decompression error: {0}")]
    Decompression(String),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Decryption error: {0}")]
    Decryption(String),
}

impl Error {
    /// Whether a tolerant page scan may skip past this error and probe for
    /// the next page boundary. Anything else (I/O, misuse, codec) halts the
    /// scan even in tolerant mode.
    pub(crate) fn is_page_recoverable(&self) -> bool {
        matches!(
            self,
            Error::PageCorrupt { .. }
                | Error::PageBodyCorrupt(_)
                | Error::Decompression(_)
                | Error::Decryption(_)
        )
    }
}
