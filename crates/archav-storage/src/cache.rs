//! Page Cache
//!
//! An optional cache that sits in front of the decrypt/decompress pipeline.
//! The volume checks it before paying the decode cost of a page and
//! populates it after decoding; eviction policy belongs entirely to the
//! implementation behind the trait, not to the engine.
//!
//! Keys are `(volume id, page id)`, so one cache instance can safely serve
//! any number of volumes. Cached values are decoded page bodies: the
//! plaintext, uncompressed blob a `Reading` page is populated from. Pages
//! borrow those bytes (`bytes::Bytes` clones are reference-counted), they
//! never own the cache's buffers.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use lru::LruCache;
use parking_lot::Mutex;
use uuid::Uuid;

/// Cache of decoded page bodies keyed by `(volume id, page id)`.
pub trait PageCache: Send + Sync {
    fn get(&self, volume_id: Uuid, page_id: u64) -> Option<Bytes>;
    fn put(&self, volume_id: Uuid, page_id: u64, body: Bytes);
}

/// Bounded in-memory LRU page cache.
pub struct LruPageCache {
    /// Maximum total size of cached bodies in bytes.
    max_bytes: u64,

    /// LRU tracker over decoded bodies.
    inner: Mutex<Inner>,

    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

struct Inner {
    lru: LruCache<(Uuid, u64), Bytes>,
    current_bytes: u64,
}

impl LruPageCache {
    /// Create a cache bounded to `max_bytes` of decoded page bodies.
    pub fn new(max_bytes: u64) -> Self {
        // Entry-count bound is generous; the byte budget is what evicts.
        let capacity = NonZeroUsize::new(65_536).expect("nonzero");
        Self {
            max_bytes,
            inner: Mutex::new(Inner {
                lru: LruCache::new(capacity),
                current_bytes: 0,
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            current_bytes: inner.current_bytes,
            max_bytes: self.max_bytes,
            entry_count: inner.lru.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

impl PageCache for LruPageCache {
    fn get(&self, volume_id: Uuid, page_id: u64) -> Option<Bytes> {
        let mut inner = self.inner.lock();
        match inner.lru.get(&(volume_id, page_id)) {
            Some(body) => {
                let body = body.clone();
                self.hits.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(%volume_id, page_id, size = body.len(), "page cache hit");
                Some(body)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    fn put(&self, volume_id: Uuid, page_id: u64, body: Bytes) {
        let size = body.len() as u64;
        if size > self.max_bytes {
            tracing::warn!(
                size,
                max_bytes = self.max_bytes,
                "page larger than cache budget, not caching"
            );
            return;
        }

        let mut inner = self.inner.lock();
        if let Some(old) = inner.lru.put((volume_id, page_id), body) {
            inner.current_bytes = inner.current_bytes.saturating_sub(old.len() as u64);
        }
        inner.current_bytes += size;

        while inner.current_bytes > self.max_bytes {
            match inner.lru.pop_lru() {
                Some((_, evicted)) => {
                    inner.current_bytes =
                        inner.current_bytes.saturating_sub(evicted.len() as u64);
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                }
                None => break,
            }
        }
    }
}

/// Point-in-time cache counters.
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub current_bytes: u64,
    pub max_bytes: u64,
    pub entry_count: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}
