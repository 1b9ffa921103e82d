//! Core Error Types
//!
//! Errors that can occur without touching a medium: codec failures and
//! malformed metadata. Storage-level errors (I/O, corruption, scheme
//! resolution) live in `archav-storage` and wrap this enum with `#[from]`.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("codec error: {0}")]
    Codec(String),

    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),
}
