use std::path::Path;
use std::sync::{Arc, Mutex};

use tempfile::tempdir;

use crate::xtc_pipeline::common::DevicePreset;
use crate::xtc_pipeline::common::error::{Result, XtcError};
use crate::xtc_pipeline::container::{ChapterEntry, MetadataRecord, XtcReader};
use crate::xtc_pipeline::frame::RasterFrame;
use crate::xtc_pipeline::page::{EncodedPage, PageEncoder, PageFormat, XtPageEncoder};
use crate::xtc_pipeline::quantize::QuantizedRaster;
use crate::xtc_pipeline::session::{
    CatalogueEntry, CatalogueSink, ConversionConfig, ConversionSession, SessionRegistry,
    SessionState,
};

const PRESET: DevicePreset = DevicePreset::Custom { width: 16, height: 8 };

fn config(format: PageFormat) -> ConversionConfig {
    ConversionConfig::builder()
        .preset(PRESET)
        .format(format)
        .dither_strength(50)
        .build()
}

fn frame(value: u8) -> RasterFrame {
    RasterFrame::filled(16, 8, value)
}

/// Encoder that counts calls and can be told to drop the last payload byte.
struct MockEncoder {
    truncate: bool,
    calls: Arc<Mutex<usize>>,
}

impl PageEncoder for MockEncoder {
    fn encode(&self, raster: &QuantizedRaster, format: PageFormat) -> Result<EncodedPage> {
        *self.calls.lock().unwrap() += 1;
        let mut page = XtPageEncoder.encode(raster, format)?;
        if self.truncate {
            page.payload.pop();
        }
        Ok(page)
    }

    fn decode(&self, page: &EncodedPage) -> Result<QuantizedRaster> {
        XtPageEncoder.decode(page)
    }
}

#[derive(Default)]
struct RecordingSink {
    entries: Mutex<Vec<CatalogueEntry>>,
    should_fail: bool,
}

impl CatalogueSink for RecordingSink {
    fn record(&self, entry: &CatalogueEntry) -> Result<()> {
        if self.should_fail {
            return Err(XtcError::InvalidOption("Mock catalogue error".to_string()));
        }
        self.entries.lock().unwrap().push(entry.clone());
        Ok(())
    }
}

fn dir_is_empty(dir: &Path) -> bool {
    std::fs::read_dir(dir).unwrap().next().is_none()
}

#[test]
fn test_config_builder() {
    let config = ConversionConfig::builder()
        .preset(DevicePreset::X3)
        .format(PageFormat::Gray4)
        .dither_strength(0)
        .invert(true)
        .expected_pages(Some(12))
        .build();

    assert_eq!(config.preset, DevicePreset::X3);
    assert_eq!(config.format, PageFormat::Gray4);
    assert_eq!(config.dither_strength, 0);
    assert!(config.invert);
    assert_eq!(config.expected_pages, Some(12));

    let default = ConversionConfig::builder().build();
    assert_eq!(default.preset, DevicePreset::X4);
    assert_eq!(default.dither_strength, 50);
}

#[test]
fn test_rejects_invalid_dither_strength() {
    let dir = tempdir().unwrap();
    let config = ConversionConfig::builder().dither_strength(101).build();
    let result = ConversionSession::new(config, dir.path().join("book.xtc"));
    assert!(matches!(result, Err(XtcError::InvalidOption(_))));
}

#[test]
fn test_out_of_order_page_on_empty_session() {
    let dir = tempdir().unwrap();
    let mut session = ConversionSession::new(config(PageFormat::Mono), dir.path().join("book.xtc")).unwrap();
    assert_eq!(session.state(), SessionState::Open);

    let err = session.push(2, frame(255)).unwrap_err();

    assert!(matches!(err, XtcError::OutOfOrderPage { expected: 0, got: 2 }));
    assert_eq!(session.state(), SessionState::Receiving);
    assert_eq!(session.stats().pages_received, 0);
    assert_eq!(session.stats().bytes_written, 0);
}

#[test]
fn test_input_errors_leave_session_usable() {
    let dir = tempdir().unwrap();
    let mut session = ConversionSession::new(config(PageFormat::Mono), dir.path().join("book.xtc")).unwrap();

    let err = session.push(0, RasterFrame::filled(8, 8, 0)).unwrap_err();
    assert!(matches!(err, XtcError::DimensionMismatch { .. }));
    assert_eq!(session.stats().pages_received, 0);

    session.push(0, frame(0)).unwrap();
    session.push(1, frame(255)).unwrap();
    assert!(matches!(session.push(1, frame(255)), Err(XtcError::OutOfOrderPage { expected: 2, got: 1 })));

    let summary = session.finish().unwrap();
    assert_eq!(summary.page_count, 2);
    assert_eq!(session.state(), SessionState::Closed);
}

#[test]
fn test_chapter_past_last_page_aborts_on_finish() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("book.xtc");
    let mut session = ConversionSession::new(config(PageFormat::Mono), &path).unwrap();

    session.push(0, frame(255)).unwrap();
    session.push(1, frame(0)).unwrap();
    session
        .set_chapters(vec![ChapterEntry::new("One", 0), ChapterEntry::new("Two", 2)])
        .unwrap();

    let err = session.finish().unwrap_err();

    assert!(matches!(err, XtcError::InvalidChapterTable(_)));
    assert_eq!(session.state(), SessionState::Aborted);
    assert!(!path.exists());
    assert!(dir_is_empty(dir.path()));
}

#[test]
fn test_unsorted_chapters_rejected_immediately() {
    let dir = tempdir().unwrap();
    let mut session = ConversionSession::new(config(PageFormat::Mono), dir.path().join("book.xtc")).unwrap();

    let err = session
        .set_chapters(vec![ChapterEntry::new("B", 3), ChapterEntry::new("A", 1)])
        .unwrap_err();

    assert!(matches!(err, XtcError::InvalidChapterTable(_)));
    assert_eq!(session.state(), SessionState::Open);
}

#[test]
fn test_stats_follow_streamed_pages() {
    let dir = tempdir().unwrap();
    let mut session = ConversionSession::new(config(PageFormat::Gray4), dir.path().join("book.xtc")).unwrap();

    for i in 0..200 {
        session.push(i, frame((i * 7 % 256) as u8)).unwrap();
    }

    // 22-byte header plus two 16-byte planes per page
    let stats = session.stats();
    assert_eq!(stats.pages_received, 200);
    assert_eq!(stats.bytes_written, 200 * 54);

    let summary = session.finish().unwrap();
    assert_eq!(summary.page_count, 200);
    assert_eq!(session.stats().bytes_written, 200 * 54);
}

#[test]
fn test_storage_failure_on_finish_aborts() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("out");
    std::fs::create_dir(&out).unwrap();
    let path = out.join("book.xtc");
    let mut session = ConversionSession::new(config(PageFormat::Mono), &path).unwrap();
    session.push(0, frame(255)).unwrap();

    // The output directory disappears before the container can be assembled
    std::fs::remove_dir_all(&out).unwrap();
    let err = session.finish().unwrap_err();

    assert!(matches!(err, XtcError::IoError(_)));
    assert!(err.is_fatal());
    assert_eq!(session.state(), SessionState::Aborted);
    assert!(matches!(session.push(1, frame(0)), Err(XtcError::SessionClosed)));
    assert!(!path.exists());
}

#[test]
fn test_payload_mismatch_is_fatal() {
    let dir = tempdir().unwrap();
    let calls = Arc::new(Mutex::new(0));
    let encoder = MockEncoder { truncate: true, calls: calls.clone() };
    let mut session =
        ConversionSession::with_encoder(config(PageFormat::Mono), dir.path().join("book.xtc"), encoder).unwrap();

    let err = session.push(0, frame(255)).unwrap_err();

    assert!(matches!(err, XtcError::PayloadSizeMismatch { .. }));
    assert_eq!(session.state(), SessionState::Aborted);
    assert_eq!(*calls.lock().unwrap(), 1);

    assert!(matches!(session.push(0, frame(255)), Err(XtcError::SessionClosed)));
    assert!(matches!(session.finish(), Err(XtcError::SessionClosed)));
    assert_eq!(*calls.lock().unwrap(), 1);
    assert!(dir_is_empty(dir.path()));
}

#[test]
fn test_custom_encoder_is_used() {
    let dir = tempdir().unwrap();
    let calls = Arc::new(Mutex::new(0));
    let encoder = MockEncoder { truncate: false, calls: calls.clone() };
    let mut session =
        ConversionSession::with_encoder(config(PageFormat::Mono), dir.path().join("book.xtc"), encoder).unwrap();

    session.push(0, frame(10)).unwrap();
    session.push(1, frame(240)).unwrap();
    session.finish().unwrap();

    assert_eq!(*calls.lock().unwrap(), 2);
}

#[test]
fn test_cancel_between_pushes() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("book.xtc");
    let mut session = ConversionSession::new(config(PageFormat::Mono), &path).unwrap();
    let token = session.cancel_token();

    session.push(0, frame(255)).unwrap();
    std::thread::spawn(move || token.cancel()).join().unwrap();

    assert!(matches!(session.push(1, frame(255)), Err(XtcError::SessionClosed)));
    assert_eq!(session.state(), SessionState::Aborted);
    assert_eq!(session.stats().pages_received, 1);
    assert!(!path.exists());
    assert!(dir_is_empty(dir.path()));
}

#[test]
fn test_abort_rejects_later_operations() {
    let dir = tempdir().unwrap();
    let mut session = ConversionSession::new(config(PageFormat::Mono), dir.path().join("book.xtc")).unwrap();
    session.push(0, frame(0)).unwrap();

    session.abort();
    session.abort();

    assert_eq!(session.state(), SessionState::Aborted);
    assert!(matches!(session.set_metadata(MetadataRecord::new("T")), Err(XtcError::SessionClosed)));
    assert!(matches!(session.finish(), Err(XtcError::SessionClosed)));
    assert!(dir_is_empty(dir.path()));
}

#[test]
fn test_finish_twice_reports_closed() {
    let dir = tempdir().unwrap();
    let mut session = ConversionSession::new(config(PageFormat::Mono), dir.path().join("book.xtc")).unwrap();
    session.push(0, frame(0)).unwrap();
    session.finish().unwrap();

    assert!(matches!(session.finish(), Err(XtcError::SessionClosed)));
    assert!(matches!(session.push(1, frame(0)), Err(XtcError::SessionClosed)));
    assert_eq!(session.state(), SessionState::Closed);
}

#[test]
fn test_empty_book_aborts() {
    let dir = tempdir().unwrap();
    let mut session = ConversionSession::new(config(PageFormat::Mono), dir.path().join("book.xtc")).unwrap();

    assert!(matches!(session.finish(), Err(XtcError::EmptyContainer)));
    assert_eq!(session.state(), SessionState::Aborted);
    assert!(dir_is_empty(dir.path()));
}

#[test]
fn test_catalogue_told_about_finished_book() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("book.xtc");
    let sink = Arc::new(RecordingSink::default());
    let mut session = ConversionSession::new(config(PageFormat::Gray4), &path)
        .unwrap()
        .with_catalogue(sink.clone());

    for i in 0..3 {
        session.push(i, frame(128)).unwrap();
    }
    let summary = session.finish().unwrap();

    let entries = sink.entries.lock().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].session_id, session.id());
    assert_eq!(entries[0].page_count, 3);
    assert_eq!(entries[0].total_bytes, summary.total_bytes);
    assert_eq!(std::fs::metadata(&path).unwrap().len(), summary.total_bytes);
}

#[test]
fn test_catalogue_failure_keeps_container() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("book.xtc");
    let sink = Arc::new(RecordingSink { should_fail: true, ..Default::default() });
    let mut session = ConversionSession::new(config(PageFormat::Mono), &path)
        .unwrap()
        .with_catalogue(sink);

    session.push(0, frame(255)).unwrap();
    assert!(session.finish().is_ok());
    assert_eq!(session.state(), SessionState::Closed);
    assert!(path.exists());
}

#[test]
fn test_thumbnail_frame_and_metadata_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("book.xtc");
    let mut session = ConversionSession::new(config(PageFormat::Mono), &path).unwrap();

    session.push(0, frame(255)).unwrap();
    session.set_metadata(MetadataRecord::new("Thumbs").with_author("A")).unwrap();
    session.set_thumbnail_frame(&RasterFrame::filled(5, 3, 0)).unwrap();
    session.finish().unwrap();

    let mut reader = XtcReader::open(&path).unwrap();
    assert!(reader.validate().unwrap().is_empty());
    let metadata = reader.metadata().unwrap().unwrap();
    assert_eq!(metadata.title, "Thumbs");
    assert_eq!(metadata.author, "A");
    let thumb = reader.thumbnail().unwrap().unwrap();
    assert_eq!((thumb.header.width, thumb.header.height), (5, 3));
    assert!(XtPageEncoder.decode(&thumb).unwrap().data.iter().all(|&l| l == 0));
}

#[test]
fn test_malformed_thumbnail_frame_rejected() {
    let dir = tempdir().unwrap();
    let mut session = ConversionSession::new(config(PageFormat::Mono), dir.path().join("book.xtc")).unwrap();

    let bad = RasterFrame::new(4, 4, vec![0; 3]);
    assert!(matches!(session.set_thumbnail_frame(&bad), Err(XtcError::InvalidOption(_))));
    assert_eq!(session.state(), SessionState::Open);
}

#[test]
fn test_registry_busy_session() {
    let dir = tempdir().unwrap();
    let registry = SessionRegistry::new();
    let id = registry.create(config(PageFormat::Mono), dir.path().join("book.xtc")).unwrap();

    let handle = registry.handle(id).unwrap();
    let guard = handle.lock();
    assert!(matches!(registry.push(id, 0, frame(0)), Err(XtcError::SessionBusy)));
    drop(guard);

    registry.push(id, 0, frame(0)).unwrap();
    assert_eq!(registry.state(id).unwrap(), SessionState::Receiving);
}

#[test]
fn test_registry_forgets_finished_and_aborted_sessions() {
    let dir = tempdir().unwrap();
    let sink = Arc::new(RecordingSink::default());
    let registry = SessionRegistry::with_catalogue(sink.clone());

    let done = registry.create(config(PageFormat::Mono), dir.path().join("done.xtc")).unwrap();
    let dropped = registry.create(config(PageFormat::Mono), dir.path().join("dropped.xtc")).unwrap();
    assert_ne!(done, dropped);
    assert_eq!(registry.len(), 2);

    registry.push(done, 0, frame(255)).unwrap();
    registry.set_metadata(done, MetadataRecord::new("Done")).unwrap();
    registry.set_chapters(done, vec![ChapterEntry::new("Only", 0)]).unwrap();
    registry.finish(done).unwrap();
    registry.push(dropped, 0, frame(255)).unwrap();
    registry.abort(dropped).unwrap();

    assert!(registry.is_empty());
    assert!(matches!(registry.push(done, 1, frame(0)), Err(XtcError::SessionClosed)));
    assert!(matches!(registry.abort(dropped), Err(XtcError::SessionClosed)));
    assert!(dir.path().join("done.xtc").exists());
    assert!(!dir.path().join("dropped.xtc").exists());
    assert_eq!(sink.entries.lock().unwrap()[0].session_id, done);
}

#[test]
fn test_registry_drops_session_after_fatal_finish() {
    let dir = tempdir().unwrap();
    let registry = SessionRegistry::new();
    let id = registry.create(config(PageFormat::Mono), dir.path().join("book.xtc")).unwrap();

    assert!(matches!(registry.finish(id), Err(XtcError::EmptyContainer)));
    assert!(!registry.contains(id));
}

#[test]
fn test_registry_runs_books_concurrently() {
    let dir = tempdir().unwrap();
    let registry = Arc::new(SessionRegistry::new());

    let workers: Vec<_> = (0..4)
        .map(|book| {
            let registry = registry.clone();
            let path = dir.path().join(format!("book{}.xtc", book));
            std::thread::spawn(move || {
                let id = registry.create(config(PageFormat::Gray4), &path).unwrap();
                for page in 0..10 {
                    registry.push(id, page, frame((book * 40 + page) as u8)).unwrap();
                }
                registry.finish(id).unwrap()
            })
        })
        .collect();

    for worker in workers {
        let summary = worker.join().unwrap();
        assert_eq!(summary.page_count, 10);
        let mut reader = XtcReader::open(&summary.path).unwrap();
        assert!(reader.validate().unwrap().is_empty());
    }
    assert!(registry.is_empty());
}
