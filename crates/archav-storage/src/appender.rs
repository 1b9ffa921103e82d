//! Typed Record Appender
//!
//! An `Appender` owns an open volume and a codec and turns a stream of
//! typed records into framed entries across pages. Pages roll over by
//! size: a record that would push the open page past the configured
//! target commits that page to the volume and opens a fresh one. Each
//! successful append reports the record's `Bookmark`, and an optional
//! hook observes `(record, bookmark)` pairs as they are assigned, which
//! is how indexes get built alongside ingest without a second pass.
//!
//! Page ids are assigned at commit, but records only ever land at the
//! end of the medium, so the open page's eventual id is already known at
//! append time and the reported bookmarks are final.

use std::time::{SystemTime, UNIX_EPOCH};

use archav_core::{Bookmark, RecordCodec};

use crate::config::AppenderConfig;
use crate::error::Result;
use crate::page::{Page, PageState};
use crate::volume::{Medium, PageId, Volume};

/// Observer invoked with each appended record and its final bookmark.
pub type RecordHook<'h, T> = Box<dyn FnMut(&T, Bookmark) + 'h>;

/// Size-rolled typed writer over one volume.
pub struct Appender<'h, M: Medium, T, C: RecordCodec<T>> {
    volume: Option<Volume<M>>,
    codec: C,
    config: AppenderConfig,
    page: Page,
    hook: Option<RecordHook<'h, T>>,
    finished: bool,
}

impl<'h, M: Medium, T, C: RecordCodec<T>> Appender<'h, M, T, C> {
    pub fn new(volume: Volume<M>, codec: C, config: AppenderConfig) -> Self {
        Self {
            volume: Some(volume),
            codec,
            config,
            page: Page::new(),
            hook: None,
            finished: false,
        }
    }

    pub fn with_hook(mut self, hook: RecordHook<'h, T>) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn set_hook(&mut self, hook: RecordHook<'h, T>) {
        self.hook = Some(hook);
    }

    pub fn volume(&self) -> &Volume<M> {
        self.volume.as_ref().expect("volume present until finish")
    }

    fn volume_mut(&mut self) -> &mut Volume<M> {
        self.volume.as_mut().expect("volume present until finish")
    }

    /// Encode and append one record, rolling the page over first if the
    /// framed record would not fit. Returns the record's bookmark.
    pub fn append(&mut self, record: &T) -> Result<Bookmark> {
        let payload = self.codec.encode(record)?;
        let frame = Page::frame_size(payload.len());

        if self.page.state() == PageState::Writing
            && !self.page.is_empty()
            && self.page.entry_bytes_len() + frame > self.volume().page_size_bytes()
        {
            self.commit_page()?;
        }
        if self.page.state() == PageState::Unset {
            self.page
                .begin_writing(now_utc_ms(), &self.config.app, &self.config.host)?;
        }

        let address = self.page.append(&payload)?;
        let bookmark = Bookmark::new(self.volume().end(), address);
        if let Some(hook) = &mut self.hook {
            hook(record, bookmark);
        }
        Ok(bookmark)
    }

    /// Seal the open page and write it to the volume. No-op when no
    /// records are pending.
    fn commit_page(&mut self) -> Result<Option<PageId>> {
        if self.page.state() != PageState::Writing {
            return Ok(None);
        }
        let mut page = std::mem::take(&mut self.page);
        page.end_writing()?;
        let id = self.volume_mut().append_page(&page)?;
        Ok(Some(id))
    }

    /// Commit any open page and sync the medium.
    pub fn flush(&mut self) -> Result<()> {
        self.commit_page()?;
        self.volume_mut().sync()
    }

    /// Flush everything and hand the volume back.
    pub fn finish(mut self) -> Result<Volume<M>> {
        self.flush()?;
        self.finished = true;
        Ok(self.volume.take().expect("volume present until finish"))
    }
}

impl<M: Medium, T, C: RecordCodec<T>> Drop for Appender<'_, M, T, C> {
    fn drop(&mut self) {
        if self.finished || self.volume.is_none() {
            return;
        }
        if let Err(e) = self.flush() {
            tracing::error!(error = %e, "failed to flush appender on drop");
        }
    }
}

fn now_utc_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::io::Cursor;
    use std::rc::Rc;

    use archav_core::{StringCodec, VolumeMetadata};

    use super::*;
    use crate::page::EntryStatus;
    use crate::scheme::SchemeRegistry;

    fn memory_volume() -> Volume<Cursor<Vec<u8>>> {
        let meta = VolumeMetadata::new("appender-test", "text/plain");
        Volume::create(&SchemeRegistry::new(), meta, Cursor::new(Vec::new())).unwrap()
    }

    fn appender(
        page_size: usize,
    ) -> Appender<'static, Cursor<Vec<u8>>, String, StringCodec> {
        let mut volume = memory_volume();
        volume.set_page_size_bytes(page_size);
        Appender::new(volume, StringCodec, AppenderConfig::new("tester", "host-a"))
    }

    #[test]
    fn test_bookmarks_within_page_share_id_and_increase() {
        let mut app = appender(64 * 1024);
        let a = app.append(&"first".to_string()).unwrap();
        let b = app.append(&"second".to_string()).unwrap();

        assert_eq!(a.page_id, b.page_id);
        assert!(a.entry_address < b.entry_address);
        assert_eq!(a.entry_address, 0);
    }

    #[test]
    fn test_rollover_by_size_budget() {
        // Two ~40-byte frames fit; the third rolls over.
        let mut app = appender(100);
        let a = app.append(&"x".repeat(28)).unwrap();
        let b = app.append(&"y".repeat(28)).unwrap();
        let c = app.append(&"z".repeat(28)).unwrap();

        assert_eq!(a.page_id, b.page_id);
        assert_ne!(b.page_id, c.page_id);
        assert_eq!(c.entry_address, 0);

        let mut volume = app.finish().unwrap();
        let pages: Vec<_> = volume.pages(None, false).map(|r| r.unwrap()).collect();
        assert_eq!(pages.len(), 2);
    }

    #[test]
    fn test_oversized_record_gets_its_own_page() {
        let mut app = appender(100);
        app.append(&"small".to_string()).unwrap();
        let big = app.append(&"B".repeat(500)).unwrap();
        assert_eq!(big.entry_address, 0);

        let mut volume = app.finish().unwrap();
        let pages: Vec<_> = volume.pages(None, false).map(|r| r.unwrap()).collect();
        assert_eq!(pages.len(), 2);
        let entries: Vec<_> = pages[1].1.entries().unwrap().collect();
        assert_eq!(entries[0].payload.len(), 500);
    }

    #[test]
    fn test_page_split_is_deterministic() {
        let records: Vec<String> = (0..50).map(|i| format!("record-{i:04}")).collect();

        let run = || {
            let mut app = appender(128);
            records
                .iter()
                .map(|r| app.append(r).unwrap())
                .collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_bookmarks_dereference_after_finish() {
        let mut app = appender(128);
        let records: Vec<String> = (0..20).map(|i| format!("payload {i}")).collect();
        let bookmarks: Vec<Bookmark> =
            records.iter().map(|r| app.append(r).unwrap()).collect();

        let mut volume = app.finish().unwrap();
        for (record, bookmark) in records.iter().zip(&bookmarks) {
            let page = volume.read_page(bookmark.page_id).unwrap();
            let entry = page.entry_at(bookmark.entry_address).unwrap();
            assert_eq!(entry.status, EntryStatus::Valid);
            assert_eq!(entry.payload.as_ref(), record.as_bytes());
        }
    }

    #[test]
    fn test_hook_sees_every_record_with_final_bookmark() {
        let seen: Rc<RefCell<Vec<(String, Bookmark)>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();

        let mut app = appender(128).with_hook(Box::new(move |record: &String, bookmark| {
            sink.borrow_mut().push((record.clone(), bookmark));
        }));

        let mut returned = Vec::new();
        for i in 0..10 {
            let record = format!("row-{i}");
            returned.push((record.clone(), app.append(&record).unwrap()));
        }
        drop(app);

        assert_eq!(*seen.borrow(), returned);
    }

    #[test]
    fn test_drop_commits_open_page() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dropped.avol");
        let registry = SchemeRegistry::new();

        {
            let file = std::fs::OpenOptions::new()
                .create_new(true)
                .read(true)
                .write(true)
                .open(&path)
                .unwrap();
            let meta = VolumeMetadata::new("drop-test", "text/plain");
            let volume = Volume::create(&registry, meta, file).unwrap();
            let mut app =
                Appender::new(volume, StringCodec, AppenderConfig::new("tester", "host-a"));
            app.append(&"survives drop".to_string()).unwrap();
            // No finish(); Drop commits.
        }

        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .unwrap();
        let mut volume = Volume::open(&registry, file).unwrap();
        let (_, page) = volume.pages(None, false).next().unwrap().unwrap();
        let entries: Vec<_> = page.entries().unwrap().collect();
        assert_eq!(entries[0].payload.as_ref(), b"survives drop");
    }

    #[test]
    fn test_finish_with_no_records_writes_no_pages() {
        let app = appender(128);
        let volume = app.finish().unwrap();
        assert!(volume.is_empty());
    }
}
