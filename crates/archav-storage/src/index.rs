//! Primitive Secondary Indexes
//!
//! An index is not a tree or a hash table: it is just another volume
//! whose records are `(key, bookmark)` pairs pointing into a data
//! volume. Building one is appending; querying one is scanning. That
//! keeps every durability, corruption-isolation and tolerant-read
//! property of volumes without a second storage format.
//!
//! The intended wiring is the appender hook: register an
//! [`IndexWriter`]'s `append` as the data appender's record hook and the
//! index gets built in lockstep with ingest. Because index entries are
//! appended in data order, the last entry for a key is the most recent,
//! and [`IndexReader::lookup`] resolves duplicates that way.

use serde::de::DeserializeOwned;
use serde::Serialize;

use archav_core::{Bookmark, IndexCodec, IndexEntry, VolumeMetadata};

use crate::appender::Appender;
use crate::config::AppenderConfig;
use crate::error::Result;
use crate::reader::Reader;
use crate::volume::{Medium, Volume};

/// Content-type tag stamped into the metadata of index volumes.
pub const INDEX_CONTENT_TYPE: &str = "archav/index";

/// Metadata for a new index volume over the data volume labelled `label`.
pub fn index_metadata(label: impl Into<String>) -> VolumeMetadata {
    VolumeMetadata::new(label, INDEX_CONTENT_TYPE)
}

/// Appender of `(key, bookmark)` records to an index volume.
pub struct IndexWriter<'h, M: Medium, K: Serialize + DeserializeOwned> {
    inner: Appender<'h, M, IndexEntry<K>, IndexCodec<K>>,
}

impl<M: Medium, K: Serialize + DeserializeOwned> IndexWriter<'_, M, K> {
    pub fn new(volume: Volume<M>, config: AppenderConfig) -> Self {
        Self {
            inner: Appender::new(volume, IndexCodec::new(), config),
        }
    }

    /// Record that the data record identified by `key` lives at `bookmark`.
    pub fn append(&mut self, key: K, bookmark: Bookmark) -> Result<Bookmark> {
        self.inner.append(&IndexEntry::new(key, bookmark))
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()
    }

    pub fn finish(self) -> Result<Volume<M>> {
        self.inner.finish()
    }
}

/// Reader of `(key, bookmark)` records from an index volume.
pub struct IndexReader<M: Medium, K: Serialize + DeserializeOwned> {
    inner: Reader<M, IndexEntry<K>, IndexCodec<K>>,
}

impl<M: Medium, K: Serialize + DeserializeOwned> IndexReader<M, K> {
    pub fn new(volume: Volume<M>) -> Self {
        Self {
            inner: Reader::new(volume, IndexCodec::new()),
        }
    }

    /// Skip unreadable index pages instead of failing.
    pub fn with_tolerant(mut self, tolerant: bool) -> Self {
        self.inner = self.inner.with_tolerant(tolerant);
        self
    }

    /// Enumerate every index entry in append order.
    pub fn all(&mut self) -> impl Iterator<Item = Result<IndexEntry<K>>> + '_ {
        self.inner.all().map(|r| r.map(|(_, entry)| entry))
    }

    /// Bookmark of the most recent index entry for `key`, if any.
    pub fn lookup(&mut self, key: &K) -> Result<Option<Bookmark>>
    where
        K: PartialEq,
    {
        let mut found = None;
        for entry in self.inner.all() {
            let (_, entry) = entry?;
            if entry.key == *key {
                found = Some(entry.bookmark);
            }
        }
        Ok(found)
    }

    /// Bookmarks of every index entry for `key`, in append order.
    pub fn lookup_all(&mut self, key: &K) -> Result<Vec<Bookmark>>
    where
        K: PartialEq,
    {
        let mut found = Vec::new();
        for entry in self.inner.all() {
            let (_, entry) = entry?;
            if entry.key == *key {
                found.push(entry.bookmark);
            }
        }
        Ok(found)
    }

    pub fn into_volume(self) -> Volume<M> {
        self.inner.into_volume()
    }
}
