//! Page and Entry Framing
//!
//! A page is the unit the volume compresses, encrypts and writes as one
//! blob. In memory it is a mutable buffer holding a header plus a sequence
//! of length/checksum-framed entries terminated by an EOF sentinel.
//!
//! ## Page Body Layout (pre-pipeline)
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ Page header                                  │
//! │ - Creation timestamp, UTC millis (8 bytes)   │
//! │ - App tag length (2 bytes) + app tag         │
//! │ - Host tag length (2 bytes) + host tag       │
//! ├──────────────────────────────────────────────┤
//! │ Entry frame 1                                │
//! │ - Payload length (4 bytes, LE)               │
//! │ - Header CRC32 over the length field (4)     │
//! │ - Payload CRC32 (4 bytes)                    │
//! │ - Payload bytes                              │
//! ├──────────────────────────────────────────────┤
//! │ Entry frame 2 ...                            │
//! ├──────────────────────────────────────────────┤
//! │ EOF sentinel (length = 0xFFFFFFFF)           │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! Entry addresses are byte offsets into the entry region; the first entry
//! is always at address 0 and addresses are strictly increasing.
//!
//! ## Why two CRCs per frame?
//!
//! The header CRC covers only the length field. When a payload is corrupted
//! the length is still trustworthy, so enumeration reports that one frame as
//! `BadHeader` and steps cleanly over it to the next frame. When the header
//! itself is corrupted, enumeration resynchronizes by scanning forward for
//! the next offset that parses as a plausible frame. Either way, corruption
//! of one frame never crashes enumeration and never changes how intact
//! neighbors classify.
//!
//! ## State Machine
//!
//! ```text
//! Unset ──begin_writing──▶ Writing ──end_writing──▶ Written   (producer)
//! Unset ────from_body────▶ Reading                            (consumer)
//! ```
//!
//! `append` outside `Writing` and enumeration outside `Written`/`Reading`
//! are programming errors and raised immediately.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};

/// Size of the per-entry frame envelope: length + header CRC + payload CRC.
pub const ENTRY_ENVELOPE: usize = 12;

/// Reserved length value marking the end-of-page sentinel frame.
const EOF_LEN: u32 = u32::MAX;

/// Minimum serialized page header size (timestamp + two empty tags).
const PAGE_HEADER_MIN: usize = 12;

/// Lifecycle state of a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    Unset,
    Writing,
    Written,
    Reading,
}

impl PageState {
    fn name(self) -> &'static str {
        match self {
            PageState::Unset => "Unset",
            PageState::Writing => "Writing",
            PageState::Written => "Written",
            PageState::Reading => "Reading",
        }
    }
}

/// Classification of one frame inside a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    /// Frame and payload checksums agree.
    Valid,
    /// Length or payload checksum mismatch; payload is not trustworthy.
    BadHeader,
    /// End-of-page sentinel.
    Eof,
}

/// One framed record inside a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Byte offset of the frame within the page's entry region.
    pub address: u64,

    /// Payload bytes; empty unless `status` is `Valid`.
    pub payload: Bytes,

    pub status: EntryStatus,
}

impl Entry {
    fn bad(address: usize) -> Self {
        Self {
            address: address as u64,
            payload: Bytes::new(),
            status: EntryStatus::BadHeader,
        }
    }
}

/// In-memory page buffer with a producer/consumer state machine.
#[derive(Debug)]
pub struct Page {
    state: PageState,
    created_utc_ms: u64,
    app: String,
    host: String,
    /// Entry region while writing (sentinel included after `end_writing`).
    buf: BytesMut,
    /// Entry region when populated from a resolved page body.
    frozen: Bytes,
    /// Entries appended on the producer path.
    appended: u32,
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}

impl Page {
    pub fn new() -> Self {
        Self {
            state: PageState::Unset,
            created_utc_ms: 0,
            app: String::new(),
            host: String::new(),
            buf: BytesMut::new(),
            frozen: Bytes::new(),
            appended: 0,
        }
    }

    pub fn state(&self) -> PageState {
        self.state
    }

    pub fn created_utc_ms(&self) -> u64 {
        self.created_utc_ms
    }

    pub fn app(&self) -> &str {
        &self.app
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Number of entries appended on the producer path.
    pub fn appended(&self) -> u32 {
        self.appended
    }

    /// True while the producer-side entry region is empty.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty() && self.frozen.is_empty()
    }

    /// Current size of the entry region in bytes.
    pub fn entry_bytes_len(&self) -> usize {
        self.entry_bytes().len()
    }

    /// Serialized size of a frame carrying `payload_len` payload bytes.
    pub fn frame_size(payload_len: usize) -> usize {
        ENTRY_ENVELOPE + payload_len
    }

    fn require_state(&self, expected: PageState) -> Result<()> {
        if self.state != expected {
            return Err(Error::PageState {
                expected: expected.name(),
                actual: self.state.name(),
            });
        }
        Ok(())
    }

    /// Transition `Unset -> Writing`, stamping the page header fields.
    pub fn begin_writing(&mut self, created_utc_ms: u64, app: &str, host: &str) -> Result<()> {
        self.require_state(PageState::Unset)?;
        if app.len() > u16::MAX as usize {
            return Err(Error::TagTooLong(app.len()));
        }
        if host.len() > u16::MAX as usize {
            return Err(Error::TagTooLong(host.len()));
        }
        self.created_utc_ms = created_utc_ms;
        self.app = app.to_string();
        self.host = host.to_string();
        self.state = PageState::Writing;
        Ok(())
    }

    /// Frame `payload` and append it, returning the entry's byte address.
    /// The first call returns address 0.
    pub fn append(&mut self, payload: &[u8]) -> Result<u64> {
        self.require_state(PageState::Writing)?;
        if payload.len() >= EOF_LEN as usize {
            return Err(Error::EntryTooLarge(payload.len()));
        }

        let address = self.buf.len() as u64;
        let len = payload.len() as u32;
        self.buf.reserve(ENTRY_ENVELOPE + payload.len());
        self.buf.put_u32_le(len);
        self.buf.put_u32_le(crc32fast::hash(&len.to_le_bytes()));
        self.buf.put_u32_le(crc32fast::hash(payload));
        self.buf.put_slice(payload);
        self.appended += 1;
        Ok(address)
    }

    /// Append the EOF sentinel and transition `Writing -> Written`.
    pub fn end_writing(&mut self) -> Result<()> {
        self.require_state(PageState::Writing)?;
        self.buf.put_u32_le(EOF_LEN);
        self.buf
            .put_u32_le(crc32fast::hash(&EOF_LEN.to_le_bytes()));
        self.buf.put_u32_le(0);
        self.state = PageState::Written;
        Ok(())
    }

    fn entry_bytes(&self) -> &[u8] {
        match self.state {
            PageState::Reading => &self.frozen,
            _ => &self.buf,
        }
    }

    fn require_enumerable(&self) -> Result<()> {
        match self.state {
            PageState::Written | PageState::Reading => Ok(()),
            other => Err(Error::PageState {
                expected: "Written or Reading",
                actual: other.name(),
            }),
        }
    }

    /// Lazy, finite, restartable walk over every frame in the page.
    pub fn entries(&self) -> Result<EntryIter<'_>> {
        self.entries_from(0)
    }

    /// Walk frames starting at a known entry address.
    pub fn entries_from(&self, address: u64) -> Result<EntryIter<'_>> {
        self.require_enumerable()?;
        Ok(EntryIter {
            buf: self.entry_bytes(),
            next: Some(address as usize),
            done: false,
        })
    }

    /// Validate and return the single frame at a known address.
    pub fn entry_at(&self, address: u64) -> Result<Entry> {
        self.require_enumerable()?;
        let (entry, _) = classify(self.entry_bytes(), address as usize);
        Ok(entry)
    }

    /// Serialize header + entry region into the body blob handed to the
    /// volume's compression/encryption pipeline.
    pub(crate) fn serialize_body(&self) -> Result<Vec<u8>> {
        self.require_state(PageState::Written)?;
        let mut out =
            BytesMut::with_capacity(PAGE_HEADER_MIN + self.app.len() + self.host.len() + self.buf.len());
        out.put_u64_le(self.created_utc_ms);
        out.put_u16_le(self.app.len() as u16);
        out.put_slice(self.app.as_bytes());
        out.put_u16_le(self.host.len() as u16);
        out.put_slice(self.host.as_bytes());
        out.put_slice(&self.buf);
        Ok(out.to_vec())
    }

    /// Populate a `Reading`-state page from a decoded body blob.
    pub(crate) fn from_body(body: Bytes) -> Result<Self> {
        if body.len() < PAGE_HEADER_MIN {
            return Err(Error::PageBodyCorrupt("truncated page header".to_string()));
        }

        let created_utc_ms = u64::from_le_bytes(body[0..8].try_into().expect("8 bytes"));
        let app_len = u16::from_le_bytes([body[8], body[9]]) as usize;
        let mut pos = 10;
        if pos + app_len + 2 > body.len() {
            return Err(Error::PageBodyCorrupt("truncated app tag".to_string()));
        }
        let app = String::from_utf8(body[pos..pos + app_len].to_vec())
            .map_err(|_| Error::PageBodyCorrupt("app tag is not UTF-8".to_string()))?;
        pos += app_len;

        let host_len = u16::from_le_bytes([body[pos], body[pos + 1]]) as usize;
        pos += 2;
        if pos + host_len > body.len() {
            return Err(Error::PageBodyCorrupt("truncated host tag".to_string()));
        }
        let host = String::from_utf8(body[pos..pos + host_len].to_vec())
            .map_err(|_| Error::PageBodyCorrupt("host tag is not UTF-8".to_string()))?;
        pos += host_len;

        Ok(Self {
            state: PageState::Reading,
            created_utc_ms,
            app,
            host,
            buf: BytesMut::new(),
            frozen: body.slice(pos..),
            appended: 0,
        })
    }
}

/// Iterator over the frames of a page's entry region.
///
/// Yields every frame in address order, classifying each as `Valid`,
/// `BadHeader` or `Eof`, then stops after the sentinel (or when no further
/// frame can be located).
pub struct EntryIter<'a> {
    buf: &'a [u8],
    next: Option<usize>,
    done: bool,
}

impl Iterator for EntryIter<'_> {
    type Item = Entry;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let address = self.next?;
        if address >= self.buf.len() {
            self.done = true;
            return None;
        }
        let (entry, next) = classify(self.buf, address);
        self.next = next;
        if next.is_none() || entry.status == EntryStatus::Eof {
            self.done = true;
        }
        Some(entry)
    }
}

/// Classify the frame at `address` and locate the next frame, if any.
fn classify(buf: &[u8], address: usize) -> (Entry, Option<usize>) {
    if address + ENTRY_ENVELOPE > buf.len() {
        // Truncated envelope; nothing to resync against.
        return (Entry::bad(address), None);
    }

    let len = u32::from_le_bytes(buf[address..address + 4].try_into().expect("4 bytes"));
    let head_crc =
        u32::from_le_bytes(buf[address + 4..address + 8].try_into().expect("4 bytes"));
    let payload_crc =
        u32::from_le_bytes(buf[address + 8..address + 12].try_into().expect("4 bytes"));

    if crc32fast::hash(&len.to_le_bytes()) != head_crc {
        // The length field itself is untrustworthy; scan for the next frame.
        return (Entry::bad(address), resync(buf, address + 1));
    }

    if len == EOF_LEN {
        return (
            Entry {
                address: address as u64,
                payload: Bytes::new(),
                status: EntryStatus::Eof,
            },
            None,
        );
    }

    let len = len as usize;
    let payload_start = address + ENTRY_ENVELOPE;
    if payload_start + len > buf.len() {
        return (Entry::bad(address), resync(buf, address + 1));
    }

    let payload = &buf[payload_start..payload_start + len];
    let next = Some(payload_start + len);
    if crc32fast::hash(payload) != payload_crc {
        // Length is trusted (header CRC passed), payload is not.
        return (Entry::bad(address), next);
    }

    (
        Entry {
            address: address as u64,
            payload: Bytes::copy_from_slice(payload),
            status: EntryStatus::Valid,
        },
        next,
    )
}

/// Scan forward for the next offset that parses as a plausible frame
/// header: a length field whose CRC matches and that either marks EOF or
/// fits within the remaining buffer.
fn resync(buf: &[u8], from: usize) -> Option<usize> {
    let mut pos = from;
    while pos + ENTRY_ENVELOPE <= buf.len() {
        let len = u32::from_le_bytes(buf[pos..pos + 4].try_into().expect("4 bytes"));
        let head_crc = u32::from_le_bytes(buf[pos + 4..pos + 8].try_into().expect("4 bytes"));
        if crc32fast::hash(&len.to_le_bytes()) == head_crc
            && (len == EOF_LEN || pos + ENTRY_ENVELOPE + len as usize <= buf.len())
        {
            return Some(pos);
        }
        pos += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn writing_page() -> Page {
        let mut page = Page::new();
        page.begin_writing(1_700_000_000_000, "archav-test", "host-a")
            .unwrap();
        page
    }

    fn written_with(payloads: &[&[u8]]) -> (Page, Vec<u64>) {
        let mut page = writing_page();
        let mut addrs = Vec::new();
        for p in payloads {
            addrs.push(page.append(p).unwrap());
        }
        page.end_writing().unwrap();
        (page, addrs)
    }

    #[test]
    fn test_first_address_is_zero_and_increasing() {
        let (_, addrs) = written_with(&[b"one", b"two", b"three"]);
        assert_eq!(addrs[0], 0);
        assert!(addrs.windows(2).all(|w| w[0] < w[1]));
        // Each address advances by envelope + previous payload length.
        assert_eq!(addrs[1], (ENTRY_ENVELOPE + 3) as u64);
    }

    #[test]
    fn test_entries_yield_n_valid_then_eof() {
        let payloads: Vec<Vec<u8>> = (0..10).map(|i| vec![i as u8; i + 1]).collect();
        let refs: Vec<&[u8]> = payloads.iter().map(|p| p.as_slice()).collect();
        let (page, _) = written_with(&refs);

        let entries: Vec<Entry> = page.entries().unwrap().collect();
        assert_eq!(entries.len(), 11);
        for (i, entry) in entries[..10].iter().enumerate() {
            assert_eq!(entry.status, EntryStatus::Valid);
            assert_eq!(entry.payload.as_ref(), payloads[i].as_slice());
        }
        assert_eq!(entries[10].status, EntryStatus::Eof);
    }

    #[test]
    fn test_entries_are_restartable() {
        let (page, _) = written_with(&[b"a", b"b"]);
        let first: Vec<Entry> = page.entries().unwrap().collect();
        let second: Vec<Entry> = page.entries().unwrap().collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_page_yields_only_eof() {
        let (page, _) = written_with(&[]);
        let entries: Vec<Entry> = page.entries().unwrap().collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, EntryStatus::Eof);
        assert_eq!(entries[0].address, 0);
    }

    #[test]
    fn test_entry_at_known_address() {
        let (page, addrs) = written_with(&[b"alpha", b"beta", b"gamma"]);
        let entry = page.entry_at(addrs[1]).unwrap();
        assert_eq!(entry.status, EntryStatus::Valid);
        assert_eq!(entry.payload.as_ref(), b"beta");

        // A misaligned address classifies as BadHeader, it does not panic.
        let off = page.entry_at(addrs[1] + 1).unwrap();
        assert_eq!(off.status, EntryStatus::BadHeader);
    }

    #[test]
    fn test_append_requires_writing_state() {
        let mut page = Page::new();
        assert!(matches!(
            page.append(b"x"),
            Err(Error::PageState { .. })
        ));

        let (mut page, _) = written_with(&[b"x"]);
        assert!(matches!(
            page.append(b"y"),
            Err(Error::PageState { .. })
        ));
    }

    #[test]
    fn test_enumeration_requires_written_or_reading() {
        let page = writing_page();
        assert!(matches!(page.entries(), Err(Error::PageState { .. })));
        assert!(matches!(page.entry_at(0), Err(Error::PageState { .. })));
    }

    #[test]
    fn test_double_begin_writing_fails() {
        let mut page = writing_page();
        assert!(matches!(
            page.begin_writing(0, "a", "h"),
            Err(Error::PageState { .. })
        ));
    }

    #[test]
    fn test_body_roundtrip_preserves_header_and_entries() {
        let (page, _) = written_with(&[b"hello", b"world"]);
        let body = page.serialize_body().unwrap();

        let read = Page::from_body(Bytes::from(body)).unwrap();
        assert_eq!(read.state(), PageState::Reading);
        assert_eq!(read.created_utc_ms(), 1_700_000_000_000);
        assert_eq!(read.app(), "archav-test");
        assert_eq!(read.host(), "host-a");

        let entries: Vec<Entry> = read.entries().unwrap().collect();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].payload.as_ref(), b"hello");
        assert_eq!(entries[1].payload.as_ref(), b"world");
        assert_eq!(entries[2].status, EntryStatus::Eof);
    }

    #[test]
    fn test_truncated_body_rejected() {
        assert!(matches!(
            Page::from_body(Bytes::from_static(&[0u8; 4])),
            Err(Error::PageBodyCorrupt(_))
        ));
    }

    // -----------------------------------------------------------------
    // Corruption isolation
    // -----------------------------------------------------------------

    /// Byte offset of the entry region inside a serialized body.
    fn entry_region_offset(page: &Page) -> usize {
        12 + page.app().len() + page.host().len()
    }

    #[test]
    fn test_payload_corruption_isolated_to_one_entry() {
        let (page, addrs) = written_with(&[b"first", b"second", b"third"]);
        let region = entry_region_offset(&page);
        let mut body = page.serialize_body().unwrap();

        // Flip a payload byte of the middle entry.
        let victim = region + addrs[1] as usize + ENTRY_ENVELOPE;
        body[victim] ^= 0xFF;

        let read = Page::from_body(Bytes::from(body)).unwrap();
        let entries: Vec<Entry> = read.entries().unwrap().collect();
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0].status, EntryStatus::Valid);
        assert_eq!(entries[0].payload.as_ref(), b"first");
        assert_eq!(entries[1].status, EntryStatus::BadHeader);
        assert_eq!(entries[2].status, EntryStatus::Valid);
        assert_eq!(entries[2].payload.as_ref(), b"third");
        assert_eq!(entries[3].status, EntryStatus::Eof);
    }

    #[test]
    fn test_header_corruption_isolated_to_one_entry() {
        let (page, addrs) = written_with(&[b"first", b"second", b"third"]);
        let region = entry_region_offset(&page);
        let mut body = page.serialize_body().unwrap();

        // Corrupt the length field of the middle entry's envelope.
        let victim = region + addrs[1] as usize;
        body[victim] ^= 0xFF;
        body[victim + 1] ^= 0xFF;

        let read = Page::from_body(Bytes::from(body)).unwrap();
        let entries: Vec<Entry> = read.entries().unwrap().collect();

        // Exactly one BadHeader; neighbors classify unchanged.
        let bad: Vec<&Entry> = entries
            .iter()
            .filter(|e| e.status == EntryStatus::BadHeader)
            .collect();
        assert_eq!(bad.len(), 1);
        assert_eq!(bad[0].address, addrs[1]);

        let valid: Vec<&Entry> = entries
            .iter()
            .filter(|e| e.status == EntryStatus::Valid)
            .collect();
        assert_eq!(valid.len(), 2);
        assert_eq!(valid[0].payload.as_ref(), b"first");
        assert_eq!(valid[1].payload.as_ref(), b"third");
        assert_eq!(entries.last().unwrap().status, EntryStatus::Eof);
    }

    #[test]
    fn test_corrupt_last_entry_still_finds_eof() {
        let (page, addrs) = written_with(&[b"only", b"last"]);
        let region = entry_region_offset(&page);
        let mut body = page.serialize_body().unwrap();

        let victim = region + addrs[1] as usize + 4; // header CRC bytes
        body[victim] ^= 0x55;

        let read = Page::from_body(Bytes::from(body)).unwrap();
        let entries: Vec<Entry> = read.entries().unwrap().collect();
        assert_eq!(entries[0].status, EntryStatus::Valid);
        assert_eq!(entries[1].status, EntryStatus::BadHeader);
        assert_eq!(entries.last().unwrap().status, EntryStatus::Eof);
    }

    #[test]
    fn test_missing_sentinel_ends_enumeration_without_panic() {
        let (page, _) = written_with(&[b"data"]);
        let body = page.serialize_body().unwrap();

        // Drop the sentinel frame entirely.
        let truncated = body[..body.len() - ENTRY_ENVELOPE].to_vec();
        let read = Page::from_body(Bytes::from(truncated)).unwrap();
        let entries: Vec<Entry> = read.entries().unwrap().collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, EntryStatus::Valid);
    }

    #[test]
    fn test_oversized_tag_rejected() {
        let mut page = Page::new();
        let long = "x".repeat(u16::MAX as usize + 1);
        assert!(matches!(
            page.begin_writing(0, &long, "h"),
            Err(Error::TagTooLong(_))
        ));
    }
}
