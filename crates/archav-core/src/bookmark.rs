//! Bookmark - Resumable Volume Cursor
//!
//! A `Bookmark` pins one entry inside one page of a volume:
//!
//! - **page_id**: the page's byte offset on the medium (assigned at commit)
//! - **entry_address**: the entry's byte offset inside the page's entry region
//!
//! Bookmarks are handed out while scanning and can later be used to resume a
//! scan or to dereference a single record without walking from the start.
//! They are stable across re-opens of the same medium as long as the medium
//! bytes are unmodified, which is what makes them usable as the pointer half
//! of a persistent `(key, bookmark)` index record.
//!
//! `Bookmark::default()` denotes the start of the volume.

use serde::{Deserialize, Serialize};

/// Position of one entry inside a volume.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Bookmark {
    /// Page id (byte offset of the page record on the medium).
    pub page_id: u64,

    /// Entry address within the page's entry region (first entry is 0).
    pub entry_address: u64,
}

impl Bookmark {
    pub fn new(page_id: u64, entry_address: u64) -> Self {
        Self {
            page_id,
            entry_address,
        }
    }

    /// True for the default bookmark, meaning "start of volume".
    pub fn is_start(&self) -> bool {
        self.page_id == 0 && self.entry_address == 0
    }
}

impl std::fmt::Display for Bookmark {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.page_id, self.entry_address)
    }
}
