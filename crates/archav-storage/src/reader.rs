//! Typed Record Reader
//!
//! A `Reader` owns an open volume and a codec and exposes its entries as
//! typed records, each paired with the `Bookmark` it can be re-read at.
//!
//! Three read shapes:
//! - [`Reader::all`] / [`Reader::records_from`]: lazy sequential
//!   enumeration, resumable at any bookmark. Entries that fail frame
//!   validation are logged and skipped; they never abort enumeration.
//! - [`Reader::scan_batches`]: a full-volume scan that reads pages on the
//!   calling thread and fans decode + handling out to a worker pool in
//!   batches of pages. Batch order across workers is not defined.
//! - [`scan_volumes`]: the same batched scan over several volumes at
//!   once, one thread per volume.
//!
//! Cancellation is polled at batch granularity: an in-flight batch always
//! completes, no batch starts after the predicate turns true.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use bytes::Bytes;
use uuid::Uuid;

use archav_core::{Bookmark, RecordCodec};

use crate::config::ScanOptions;
use crate::error::{Error, Result};
use crate::page::{EntryStatus, Page};
use crate::volume::{Medium, PageId, PageIter, Volume};

/// Typed sequential and batched reads over one volume.
pub struct Reader<M: Medium, T, C: RecordCodec<T>> {
    volume: Volume<M>,
    codec: C,
    tolerant: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<M: Medium, T, C: RecordCodec<T>> Reader<M, T, C> {
    pub fn new(volume: Volume<M>, codec: C) -> Self {
        Self {
            volume,
            codec,
            tolerant: false,
            _marker: PhantomData,
        }
    }

    /// Skip unreadable pages instead of failing enumeration.
    pub fn with_tolerant(mut self, tolerant: bool) -> Self {
        self.tolerant = tolerant;
        self
    }

    pub fn volume(&self) -> &Volume<M> {
        &self.volume
    }

    pub fn volume_mut(&mut self) -> &mut Volume<M> {
        &mut self.volume
    }

    pub fn into_volume(self) -> Volume<M> {
        self.volume
    }

    /// Page-granularity enumeration from `start` (or the first page),
    /// honoring the reader's tolerance setting.
    pub fn pages(&mut self, start: Option<PageId>) -> PageIter<'_, M> {
        let tolerant = self.tolerant;
        self.volume.pages(start, tolerant)
    }

    /// Enumerate every record from the start of the volume.
    pub fn all(&mut self) -> Records<'_, M, T, C> {
        self.records_from(Bookmark::default())
    }

    /// Enumerate records starting at `bookmark`, inclusive. The default
    /// bookmark means the start of the volume.
    pub fn records_from(&mut self, bookmark: Bookmark) -> Records<'_, M, T, C> {
        let tolerant = self.tolerant;
        let Reader { volume, codec, .. } = self;
        let start = if bookmark.is_start() {
            None
        } else {
            Some(bookmark)
        };
        Records {
            pages: volume.pages(start.map(|b| b.page_id), tolerant),
            codec,
            start,
            current: Vec::new().into_iter(),
            done: false,
            _marker: PhantomData,
        }
    }

    /// Scan the whole volume in page batches on a worker pool. Pages are
    /// read sequentially on the calling thread; decoding and the handler
    /// run on `options.workers` threads, one batch at a time. The handler
    /// must tolerate batches arriving out of order.
    pub fn scan_batches<F, P>(
        &mut self,
        options: &ScanOptions,
        handler: F,
        cancel: P,
    ) -> Result<ScanSummary>
    where
        C: Sync,
        F: Fn(&[(Bookmark, T)]) -> Result<()> + Sync,
        P: Fn() -> bool,
    {
        let Reader { volume, codec, .. } = self;
        let workers = options.workers.max(1);
        let batch_pages = options.batch_pages.max(1);

        let mut pages_scanned: u64 = 0;
        let mut cancelled = false;
        let records = AtomicU64::new(0);
        let batches = AtomicU64::new(0);

        let (tx, rx) = crossbeam::channel::bounded::<Vec<(PageId, Page)>>(workers * 2);

        let mut driver_err: Option<Error> = None;
        let mut worker_err: Option<Error> = None;

        std::thread::scope(|scope| {
            let mut handles = Vec::with_capacity(workers);
            for _ in 0..workers {
                let rx = rx.clone();
                let codec = &*codec;
                let handler = &handler;
                let records = &records;
                let batches = &batches;
                handles.push(scope.spawn(move || -> Result<()> {
                    while let Ok(batch) = rx.recv() {
                        let mut out = Vec::new();
                        for (page_id, page) in &batch {
                            decode_page_into(codec, *page_id, page, &mut out)?;
                        }
                        records.fetch_add(out.len() as u64, Ordering::Relaxed);
                        batches.fetch_add(1, Ordering::Relaxed);
                        handler(&out)?;
                    }
                    Ok(())
                }));
            }
            drop(rx);

            let mut iter = volume.pages(None, options.tolerant);
            let mut pending = Vec::with_capacity(batch_pages);
            loop {
                if cancel() {
                    cancelled = true;
                    break;
                }
                let mut ended = false;
                while pending.len() < batch_pages {
                    match iter.next() {
                        Some(Ok((id, page))) => {
                            pages_scanned += 1;
                            pending.push((id, page));
                        }
                        Some(Err(e)) => {
                            driver_err = Some(e);
                            ended = true;
                            break;
                        }
                        None => {
                            ended = true;
                            break;
                        }
                    }
                }
                if driver_err.is_none()
                    && !pending.is_empty()
                    && tx.send(std::mem::take(&mut pending)).is_err()
                {
                    // All workers exited early; their error surfaces below.
                    break;
                }
                if ended {
                    break;
                }
            }
            drop(tx);

            for handle in handles {
                match handle.join() {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        worker_err.get_or_insert(e);
                    }
                    Err(panic) => std::panic::resume_unwind(panic),
                }
            }
        });

        if let Some(e) = driver_err {
            return Err(e);
        }
        if let Some(e) = worker_err {
            return Err(e);
        }
        Ok(ScanSummary {
            pages: pages_scanned,
            records: records.into_inner(),
            batches: batches.into_inner(),
            cancelled,
        })
    }
}

/// Totals reported by a batched scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Pages read from the medium.
    pub pages: u64,

    /// Valid records handed to the handler.
    pub records: u64,

    /// Batches the handler was invoked with.
    pub batches: u64,

    /// True when the cancel predicate stopped the scan early.
    pub cancelled: bool,
}

/// Batched scan over several volumes at once, one thread per volume. The
/// handler receives each batch tagged with the id of the volume it came
/// from and must tolerate interleaving across volumes.
pub fn scan_volumes<M, T, C, F, P>(
    readers: &mut [Reader<M, T, C>],
    options: &ScanOptions,
    handler: F,
    cancel: P,
) -> Result<ScanSummary>
where
    M: Medium,
    C: RecordCodec<T> + Send + Sync,
    F: Fn(Uuid, &[(Bookmark, T)]) -> Result<()> + Sync,
    P: Fn() -> bool + Sync,
{
    let batch_pages = options.batch_pages.max(1);
    let tolerant = options.tolerant;

    let pages = AtomicU64::new(0);
    let records = AtomicU64::new(0);
    let batches = AtomicU64::new(0);
    let cancelled = AtomicBool::new(false);

    let mut first_err: Option<Error> = None;

    std::thread::scope(|scope| {
        let mut handles = Vec::with_capacity(readers.len());
        for reader in readers.iter_mut() {
            let handler = &handler;
            let cancel = &cancel;
            let pages = &pages;
            let records = &records;
            let batches = &batches;
            let cancelled = &cancelled;
            handles.push(scope.spawn(move || -> Result<()> {
                let Reader { volume, codec, .. } = reader;
                let volume_id = volume.metadata().id;
                let mut iter = volume.pages(None, tolerant);
                loop {
                    if cancel() {
                        cancelled.store(true, Ordering::Relaxed);
                        return Ok(());
                    }
                    let mut out = Vec::new();
                    let mut batched = 0usize;
                    while batched < batch_pages {
                        match iter.next() {
                            Some(item) => {
                                let (id, page) = item?;
                                decode_page_into(&*codec, id, &page, &mut out)?;
                                batched += 1;
                            }
                            None => break,
                        }
                    }
                    if batched == 0 {
                        return Ok(());
                    }
                    pages.fetch_add(batched as u64, Ordering::Relaxed);
                    records.fetch_add(out.len() as u64, Ordering::Relaxed);
                    batches.fetch_add(1, Ordering::Relaxed);
                    handler(volume_id, &out)?;
                    if batched < batch_pages {
                        return Ok(());
                    }
                }
            }));
        }

        for handle in handles {
            match handle.join() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    first_err.get_or_insert(e);
                }
                Err(panic) => std::panic::resume_unwind(panic),
            }
        }
    });

    if let Some(e) = first_err {
        return Err(e);
    }
    Ok(ScanSummary {
        pages: pages.into_inner(),
        records: records.into_inner(),
        batches: batches.into_inner(),
        cancelled: cancelled.into_inner(),
    })
}

/// Decode every valid entry of one page, skipping frames that failed
/// validation.
fn decode_page_into<T, C: RecordCodec<T>>(
    codec: &C,
    page_id: PageId,
    page: &Page,
    out: &mut Vec<(Bookmark, T)>,
) -> Result<()> {
    for entry in page.entries()? {
        match entry.status {
            EntryStatus::Valid => {
                let record = codec.decode(&entry.payload)?;
                out.push((Bookmark::new(page_id, entry.address), record));
            }
            EntryStatus::BadHeader => {
                tracing::warn!(page_id, address = entry.address, "skipping corrupt entry");
            }
            EntryStatus::Eof => break,
        }
    }
    Ok(())
}

/// Lazy record enumeration; see [`Reader::records_from`].
pub struct Records<'r, M: Medium, T, C: RecordCodec<T>> {
    pages: PageIter<'r, M>,
    codec: &'r C,
    /// Resume point, applied to the first page only.
    start: Option<Bookmark>,
    /// Validated payloads of the page currently being drained.
    current: std::vec::IntoIter<(Bookmark, Bytes)>,
    done: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<M: Medium, T, C: RecordCodec<T>> Iterator for Records<'_, M, T, C> {
    type Item = Result<(Bookmark, T)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }
            if let Some((bookmark, payload)) = self.current.next() {
                return Some(
                    self.codec
                        .decode(&payload)
                        .map(|record| (bookmark, record))
                        .map_err(Error::from),
                );
            }
            match self.pages.next() {
                None => {
                    self.done = true;
                    return None;
                }
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
                Some(Ok((page_id, page))) => {
                    let from = match self.start.take() {
                        Some(b) if b.page_id == page_id => b.entry_address,
                        _ => 0,
                    };
                    let iter = match page.entries_from(from) {
                        Ok(iter) => iter,
                        Err(e) => {
                            self.done = true;
                            return Some(Err(e));
                        }
                    };
                    let mut validated = Vec::new();
                    for entry in iter {
                        match entry.status {
                            EntryStatus::Valid => validated
                                .push((Bookmark::new(page_id, entry.address), entry.payload)),
                            EntryStatus::BadHeader => {
                                tracing::warn!(
                                    page_id,
                                    address = entry.address,
                                    "skipping corrupt entry"
                                );
                            }
                            EntryStatus::Eof => break,
                        }
                    }
                    self.current = validated.into_iter();
                }
            }
        }
    }
}
