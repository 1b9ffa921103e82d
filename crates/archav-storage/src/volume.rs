//! Volume: Durable Paged Container
//!
//! A volume is a write-once metadata header followed by a sequence of page
//! records on a seekable medium. Each page record is a small envelope
//! (magic, body length, body CRC) around the page body after it has been
//! run through the volume's compression-then-encryption pipeline.
//!
//! ## Medium Layout
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │ Volume header                                 │
//! │ - Magic "AVOL" (4 bytes)                      │
//! │ - Format version (2 bytes, LE) + reserved (2) │
//! │ - Metadata length (4 bytes, LE)               │
//! │ - Metadata CRC32 (4 bytes, LE)                │
//! │ - Metadata (JSON)                             │
//! ├───────────────────────────────────────────────┤
//! │ Page record                                   │
//! │ - Magic "APGE" (4 bytes)                      │
//! │ - Body length (4 bytes, LE)                   │
//! │ - Body CRC32 (4 bytes, LE)                    │
//! │ - Body = encrypt(compress(page body))         │
//! ├───────────────────────────────────────────────┤
//! │ Page record ...                               │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! A page's id is the byte offset of its record on the medium. That makes
//! ids stable across reopen, lets a sequential walk compute the next id
//! from the envelope alone, and lets a tolerant reader probe forward for
//! the next record boundary after hitting a damaged region.

use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use bytes::Bytes;

use archav_core::VolumeMetadata;

use crate::cache::PageCache;
use crate::error::{Error, Result};
use crate::page::Page;
use crate::scheme::{CompressionScheme, EncryptionScheme, SchemeRegistry};

/// Byte offset of a page record on its medium.
pub type PageId = u64;

const VOLUME_MAGIC: &[u8; 4] = b"AVOL";
const PAGE_MAGIC: &[u8; 4] = b"APGE";
const VOLUME_FORMAT_VERSION: u16 = 1;

/// Fixed-size prefix of the volume header, before the metadata bytes.
const VOLUME_HEADER_FIXED: usize = 16;

/// Size of the per-page record envelope: magic + body length + body CRC.
pub const PAGE_ENVELOPE: usize = 12;

/// Default target size for a page's entry region.
pub const DEFAULT_PAGE_SIZE: usize = 64 * 1024;

/// Window size for the forward magic scan in [`Volume::probe_page`].
const PROBE_CHUNK: usize = 8 * 1024;

/// Backing storage for a volume. Anything seekable works; files get real
/// durability via `sync`, in-memory buffers make it a no-op.
pub trait Medium: Read + Write + Seek + Send {
    /// Flush buffered writes all the way to the underlying device.
    fn sync(&mut self) -> Result<()>;
}

impl Medium for std::fs::File {
    fn sync(&mut self) -> Result<()> {
        self.sync_all()?;
        Ok(())
    }
}

impl Medium for Cursor<Vec<u8>> {
    fn sync(&mut self) -> Result<()> {
        Ok(())
    }
}

/// An open volume: resolved schemes, parsed metadata and an exclusive
/// handle on the medium.
pub struct Volume<M: Medium> {
    medium: M,
    metadata: VolumeMetadata,
    compression: Option<Arc<dyn CompressionScheme>>,
    encryption: Option<Arc<dyn EncryptionScheme>>,
    cache: Option<Arc<dyn PageCache>>,
    /// Offset of the first page record (end of the volume header).
    first_page: u64,
    /// Offset one past the last page record.
    end: u64,
    /// Rollover target for appenders; the volume stores whatever page it
    /// is handed regardless of size.
    page_size: usize,
}

impl<M: Medium> Volume<M> {
    /// Write a volume header onto an empty medium and return the open
    /// volume. Scheme names in `metadata` are resolved against `registry`
    /// up front; an unknown name fails here, before anything is written.
    pub fn create(registry: &SchemeRegistry, metadata: VolumeMetadata, mut medium: M) -> Result<Self> {
        let (compression, encryption) = resolve_schemes(registry, &metadata)?;

        if medium.seek(SeekFrom::End(0))? != 0 {
            return Err(Error::MediumNotEmpty);
        }

        let meta_bytes = serde_json::to_vec(&metadata)
            .map_err(|e| Error::MetadataCorrupt(e.to_string()))?;

        let mut header = Vec::with_capacity(VOLUME_HEADER_FIXED + meta_bytes.len());
        header.extend_from_slice(VOLUME_MAGIC);
        header.extend_from_slice(&VOLUME_FORMAT_VERSION.to_le_bytes());
        header.extend_from_slice(&0u16.to_le_bytes());
        header.extend_from_slice(&(meta_bytes.len() as u32).to_le_bytes());
        header.extend_from_slice(&crc32fast::hash(&meta_bytes).to_le_bytes());
        header.extend_from_slice(&meta_bytes);

        medium.seek(SeekFrom::Start(0))?;
        medium.write_all(&header)?;
        medium.flush()?;

        let first_page = header.len() as u64;
        tracing::debug!(volume_id = %metadata.id, first_page, "volume created");

        Ok(Self {
            medium,
            metadata,
            compression,
            encryption,
            cache: None,
            first_page,
            end: first_page,
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    /// Open an existing volume, validating the header and resolving the
    /// schemes its metadata names. An unresolvable scheme is fatal here:
    /// no page of this volume could be interpreted without it.
    pub fn open(registry: &SchemeRegistry, mut medium: M) -> Result<Self> {
        let total = medium.seek(SeekFrom::End(0))?;
        if total < VOLUME_HEADER_FIXED as u64 {
            return Err(Error::InvalidMagic);
        }

        medium.seek(SeekFrom::Start(0))?;
        let mut fixed = [0u8; VOLUME_HEADER_FIXED];
        medium.read_exact(&mut fixed)?;

        if &fixed[0..4] != VOLUME_MAGIC {
            return Err(Error::InvalidMagic);
        }
        let version = u16::from_le_bytes([fixed[4], fixed[5]]);
        if version != VOLUME_FORMAT_VERSION {
            return Err(Error::UnsupportedVersion(version));
        }
        let meta_len = u32::from_le_bytes(fixed[8..12].try_into().expect("4 bytes")) as u64;
        let meta_crc = u32::from_le_bytes(fixed[12..16].try_into().expect("4 bytes"));

        if VOLUME_HEADER_FIXED as u64 + meta_len > total {
            return Err(Error::MetadataCorrupt("truncated metadata".to_string()));
        }
        let mut meta_bytes = vec![0u8; meta_len as usize];
        medium.read_exact(&mut meta_bytes)?;
        if crc32fast::hash(&meta_bytes) != meta_crc {
            return Err(Error::MetadataCorrupt(
                "metadata checksum mismatch".to_string(),
            ));
        }
        let metadata: VolumeMetadata = serde_json::from_slice(&meta_bytes)
            .map_err(|e| Error::MetadataCorrupt(e.to_string()))?;

        let (compression, encryption) = resolve_schemes(registry, &metadata)?;

        let first_page = VOLUME_HEADER_FIXED as u64 + meta_len;
        tracing::debug!(volume_id = %metadata.id, first_page, end = total, "volume opened");

        Ok(Self {
            medium,
            metadata,
            compression,
            encryption,
            cache: None,
            first_page,
            end: total,
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    pub fn metadata(&self) -> &VolumeMetadata {
        &self.metadata
    }

    /// Id of the first page record, whether or not one has been written.
    pub fn first_page_id(&self) -> PageId {
        self.first_page
    }

    /// Offset one past the last page record; the id the next append gets.
    pub fn end(&self) -> u64 {
        self.end
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.first_page
    }

    /// Target size of a page's entry region; appenders roll a page over
    /// before it would exceed this.
    pub fn page_size_bytes(&self) -> usize {
        self.page_size
    }

    pub fn set_page_size_bytes(&mut self, bytes: usize) {
        self.page_size = bytes;
    }

    pub fn with_cache(mut self, cache: Arc<dyn PageCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn set_cache(&mut self, cache: Arc<dyn PageCache>) {
        self.cache = Some(cache);
    }

    /// Tear down the volume and hand back the medium.
    pub fn into_medium(self) -> M {
        self.medium
    }

    /// Flush the medium to durable storage.
    pub fn sync(&mut self) -> Result<()> {
        self.medium.sync()
    }

    /// Serialize a `Written` page through the pipeline and append its
    /// record at the end of the medium. Returns the new page's id.
    pub fn append_page(&mut self, page: &Page) -> Result<PageId> {
        let body = page.serialize_body()?;
        let encoded = self.encode_body(&body)?;
        if encoded.len() > u32::MAX as usize {
            return Err(Error::PageTooLarge(encoded.len()));
        }

        let page_id = self.end;
        self.medium.seek(SeekFrom::Start(page_id))?;
        self.medium.write_all(PAGE_MAGIC)?;
        self.medium.write_all(&(encoded.len() as u32).to_le_bytes())?;
        self.medium.write_all(&crc32fast::hash(&encoded).to_le_bytes())?;
        self.medium.write_all(&encoded)?;
        self.medium.flush()?;
        self.end = page_id + PAGE_ENVELOPE as u64 + encoded.len() as u64;

        tracing::debug!(
            volume_id = %self.metadata.id,
            page_id,
            entries = page.appended(),
            raw = body.len(),
            stored = encoded.len(),
            "page appended"
        );
        Ok(page_id)
    }

    /// Read and decode the page at `page_id` with strict validation.
    pub fn read_page(&mut self, page_id: PageId) -> Result<Page> {
        self.read_page_at(page_id).map(|(page, _)| page)
    }

    /// Read the page at `page_id`, also returning the id immediately after
    /// its record. The sequential-walk primitive behind [`Volume::pages`].
    pub(crate) fn read_page_at(&mut self, page_id: PageId) -> Result<(Page, PageId)> {
        if page_id < self.first_page || page_id + PAGE_ENVELOPE as u64 > self.end {
            return Err(Error::PageNotFound(page_id));
        }

        self.medium.seek(SeekFrom::Start(page_id))?;
        let mut envelope = [0u8; PAGE_ENVELOPE];
        self.medium.read_exact(&mut envelope)?;
        if &envelope[0..4] != PAGE_MAGIC {
            return Err(Error::PageCorrupt { page_id });
        }
        let body_len = u32::from_le_bytes(envelope[4..8].try_into().expect("4 bytes")) as u64;
        let body_crc = u32::from_le_bytes(envelope[8..12].try_into().expect("4 bytes"));
        let next = page_id + PAGE_ENVELOPE as u64 + body_len;
        if next > self.end {
            return Err(Error::PageCorrupt { page_id });
        }

        let cached = self
            .cache
            .as_ref()
            .and_then(|c| c.get(self.metadata.id, page_id));
        let body = match cached {
            Some(body) => body,
            None => {
                let mut raw = vec![0u8; body_len as usize];
                self.medium.read_exact(&mut raw)?;
                if crc32fast::hash(&raw) != body_crc {
                    return Err(Error::PageCorrupt { page_id });
                }
                let body = Bytes::from(self.decode_body(raw)?);
                if let Some(cache) = &self.cache {
                    cache.put(self.metadata.id, page_id, body.clone());
                }
                body
            }
        };

        Ok((Page::from_body(body)?, next))
    }

    /// Scan forward from `from` for the next offset that holds a fully
    /// valid page record: magic, an envelope that fits the medium and a
    /// body whose checksum agrees. Returns `None` when no further page
    /// exists. Magic bytes occurring inside page bodies are rejected by
    /// the full validation, not by luck.
    pub fn probe_page(&mut self, from: PageId) -> Result<Option<PageId>> {
        let mut pos = from.max(self.first_page);
        // Overlap window reads by 3 bytes so a magic split across two
        // windows is still seen.
        while pos + PAGE_ENVELOPE as u64 <= self.end {
            let window = (self.end - pos).min(PROBE_CHUNK as u64) as usize;
            self.medium.seek(SeekFrom::Start(pos))?;
            let mut buf = vec![0u8; window];
            self.medium.read_exact(&mut buf)?;

            for i in 0..window.saturating_sub(3) {
                if &buf[i..i + 4] != PAGE_MAGIC {
                    continue;
                }
                let candidate = pos + i as u64;
                if self.record_valid_at(candidate)? {
                    return Ok(Some(candidate));
                }
            }

            if window <= 3 {
                break;
            }
            pos += (window - 3) as u64;
        }
        Ok(None)
    }

    /// Full envelope + body checksum validation of a probe candidate.
    fn record_valid_at(&mut self, page_id: PageId) -> Result<bool> {
        self.medium.seek(SeekFrom::Start(page_id))?;
        let mut envelope = [0u8; PAGE_ENVELOPE];
        self.medium.read_exact(&mut envelope)?;
        if &envelope[0..4] != PAGE_MAGIC {
            return Ok(false);
        }
        let body_len = u32::from_le_bytes(envelope[4..8].try_into().expect("4 bytes")) as u64;
        let body_crc = u32::from_le_bytes(envelope[8..12].try_into().expect("4 bytes"));
        if page_id + PAGE_ENVELOPE as u64 + body_len > self.end {
            return Ok(false);
        }
        let mut raw = vec![0u8; body_len as usize];
        self.medium.read_exact(&mut raw)?;
        Ok(crc32fast::hash(&raw) == body_crc)
    }

    /// Walk the volume's pages in medium order starting at `start` (or the
    /// first page). In tolerant mode, pages that fail validation or decode
    /// are skipped by probing forward for the next record boundary; in
    /// strict mode the first such failure ends the walk with an error.
    pub fn pages(&mut self, start: Option<PageId>, tolerant: bool) -> PageIter<'_, M> {
        let first = self.first_page;
        PageIter {
            volume: self,
            next: Some(start.unwrap_or(first).max(first)),
            tolerant,
            skipped: 0,
        }
    }

    fn encode_body(&self, body: &[u8]) -> Result<Vec<u8>> {
        let compressed = match &self.compression {
            Some(scheme) => scheme.compress(body)?,
            None => body.to_vec(),
        };
        match &self.encryption {
            Some(scheme) => scheme.encrypt(&compressed),
            None => Ok(compressed),
        }
    }

    fn decode_body(&self, stored: Vec<u8>) -> Result<Vec<u8>> {
        let compressed = match &self.encryption {
            Some(scheme) => scheme.decrypt(&stored)?,
            None => stored,
        };
        match &self.compression {
            Some(scheme) => scheme.decompress(&compressed),
            None => Ok(compressed),
        }
    }
}

fn resolve_schemes(
    registry: &SchemeRegistry,
    metadata: &VolumeMetadata,
) -> Result<(
    Option<Arc<dyn CompressionScheme>>,
    Option<Arc<dyn EncryptionScheme>>,
)> {
    let compression = metadata
        .compression
        .as_deref()
        .map(|name| registry.compression(name))
        .transpose()?;
    let encryption = metadata
        .encryption
        .as_deref()
        .map(|name| registry.encryption(name))
        .transpose()?;
    Ok((compression, encryption))
}

/// Sequential page walk; see [`Volume::pages`].
pub struct PageIter<'v, M: Medium> {
    volume: &'v mut Volume<M>,
    next: Option<PageId>,
    tolerant: bool,
    skipped: u64,
}

impl<M: Medium> PageIter<'_, M> {
    /// Number of damaged pages stepped over so far (tolerant mode only).
    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}

impl<M: Medium> Iterator for PageIter<'_, M> {
    type Item = Result<(PageId, Page)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let id = self.next?;
            if id + PAGE_ENVELOPE as u64 > self.volume.end() {
                self.next = None;
                return None;
            }
            match self.volume.read_page_at(id) {
                Ok((page, next)) => {
                    self.next = Some(next);
                    return Some(Ok((id, page)));
                }
                Err(e) if self.tolerant && e.is_page_recoverable() => {
                    tracing::warn!(page_id = id, error = %e, "skipping unreadable page");
                    self.skipped += 1;
                    match self.volume.probe_page(id + 1) {
                        Ok(Some(found)) => self.next = Some(found),
                        Ok(None) => {
                            self.next = None;
                            return None;
                        }
                        Err(io) => {
                            self.next = None;
                            return Some(Err(io));
                        }
                    }
                }
                Err(e) => {
                    self.next = None;
                    return Some(Err(e));
                }
            }
        }
    }
}
