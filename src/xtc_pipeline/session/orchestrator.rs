use std::path::Path;
use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::xtc_pipeline::common::error::{Result, XtcError};
use crate::xtc_pipeline::container::{ChapterEntry, ContainerBuilder, ContainerSummary, MetadataRecord};
use crate::xtc_pipeline::frame::{FrameValidator, RasterFrame};
use crate::xtc_pipeline::page::{EncodedPage, PageEncoder, PageFormat, XtPageEncoder};
use crate::xtc_pipeline::quantize::{Levels, Quantizer};
use crate::xtc_pipeline::session::catalogue::{CatalogueEntry, CatalogueSink};
use crate::xtc_pipeline::session::types::{
    CancelToken, ConversionConfig, SessionId, SessionState, SessionStats,
};

/// Converts one book: frames go in one at a time, a finished container comes
/// out. Every accepted page is on storage before `push` returns.
pub struct ConversionSession<E: PageEncoder = XtPageEncoder> {
    id: SessionId,
    config: ConversionConfig,
    validator: FrameValidator,
    quantizer: Quantizer,
    encoder: E,
    builder: Option<ContainerBuilder>,
    state: SessionState,
    cancel: CancelToken,
    catalogue: Option<Arc<dyn CatalogueSink>>,
    stats: SessionStats,
}

impl ConversionSession<XtPageEncoder> {
    pub fn new<P: AsRef<Path>>(config: ConversionConfig, destination: P) -> Result<Self> {
        Self::with_encoder(config, destination, XtPageEncoder)
    }
}

impl<E: PageEncoder> ConversionSession<E> {
    pub fn with_encoder<P: AsRef<Path>>(
        config: ConversionConfig,
        destination: P,
        encoder: E,
    ) -> Result<Self> {
        config.validate()?;
        let destination = destination.as_ref();
        let quantizer = Quantizer::new(config.format.levels(), config.dither_strength, config.invert)?;
        let builder = ContainerBuilder::begin(
            destination,
            config.format,
            config.preset,
            config.read_direction,
        )?;

        let id = SessionId::next();
        info!(
            session = %id,
            destination = %destination.display(),
            preset = ?config.preset,
            format = ?config.format,
            dither = config.dither_strength,
            "Conversion session opened"
        );

        Ok(Self {
            id,
            validator: FrameValidator::new(config.preset),
            config,
            quantizer,
            encoder,
            builder: Some(builder),
            state: SessionState::Open,
            cancel: CancelToken::new(),
            catalogue: None,
            stats: SessionStats::default(),
        })
    }

    /// Reports every finished container to `sink`.
    pub fn with_catalogue(mut self, sink: Arc<dyn CatalogueSink>) -> Self {
        self.catalogue = Some(sink);
        self
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &ConversionConfig {
        &self.config
    }

    pub fn stats(&self) -> SessionStats {
        let mut stats = self.stats;
        if let Some(builder) = &self.builder {
            stats.bytes_written = builder.data_len();
        }
        stats
    }

    /// Token another thread can use to cancel this session.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Fails with `SessionClosed` in a terminal state, aborting first if a
    /// cancellation was requested.
    fn ensure_active(&mut self) -> Result<()> {
        if self.state.is_terminal() {
            return Err(XtcError::SessionClosed);
        }
        if self.cancel.is_cancelled() {
            info!(session = %self.id, "Cancellation requested");
            self.abort();
            return Err(XtcError::SessionClosed);
        }
        Ok(())
    }

    /// Aborts on fatal errors and hands the error back.
    fn fail(&mut self, err: XtcError) -> XtcError {
        if err.is_fatal() {
            warn!(session = %self.id, error = %err, "Fatal error, aborting session");
            self.abort();
        }
        err
    }

    #[instrument(skip(self, frame), fields(session = %self.id, page = page_index))]
    pub fn push(&mut self, page_index: usize, frame: RasterFrame) -> Result<()> {
        self.ensure_active()?;
        if self.state == SessionState::Open {
            self.state = SessionState::Receiving;
        }

        let expected = self.stats.pages_received;
        self.validator.validate(expected, page_index, &frame)?;

        match self.process(frame) {
            Ok(()) => {
                self.stats.pages_received += 1;
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    fn process(&mut self, frame: RasterFrame) -> Result<()> {
        let raster = {
            let _span = tracing::info_span!("quantize").entered();
            self.quantizer.quantize(&frame)
        };
        drop(frame);

        let page = {
            let _span = tracing::info_span!("encode_page").entered();
            self.encoder.encode(&raster, self.config.format)?
        };
        if page.payload.len() != page.header.payload_size as usize {
            return Err(XtcError::PayloadSizeMismatch {
                declared: page.header.payload_size as usize,
                actual: page.payload.len(),
            });
        }

        let _span = tracing::info_span!("write_page").entered();
        self.builder_mut()?.push_page(page)
    }

    fn builder_mut(&mut self) -> Result<&mut ContainerBuilder> {
        self.builder.as_mut().ok_or(XtcError::SessionClosed)
    }

    pub fn set_metadata(&mut self, metadata: MetadataRecord) -> Result<()> {
        self.ensure_active()?;
        let result = self.builder_mut()?.set_metadata(metadata);
        result.map_err(|e| self.fail(e))
    }

    pub fn set_chapters(&mut self, chapters: Vec<ChapterEntry>) -> Result<()> {
        self.ensure_active()?;
        let result = self.builder_mut()?.set_chapters(chapters);
        result.map_err(|e| self.fail(e))
    }

    /// Sets an already encoded monochrome thumbnail, or clears it.
    pub fn set_thumbnail(&mut self, thumbnail: Option<EncodedPage>) -> Result<()> {
        self.ensure_active()?;
        let result = self.builder_mut()?.set_thumbnail(thumbnail);
        result.map_err(|e| self.fail(e))
    }

    /// Quantizes `frame` to two levels with the session's dither settings and
    /// stores it as the thumbnail. Any size is accepted.
    pub fn set_thumbnail_frame(&mut self, frame: &RasterFrame) -> Result<()> {
        self.ensure_active()?;
        if !frame.is_well_formed() {
            return Err(XtcError::InvalidOption(format!(
                "thumbnail frame {}x{} has {} bytes",
                frame.width,
                frame.height,
                frame.data.len()
            )));
        }
        let quantizer = Quantizer::new(Levels::Two, self.config.dither_strength, self.config.invert)?;
        let raster = quantizer.quantize(frame);
        let page = self
            .encoder
            .encode(&raster, PageFormat::Mono)
            .map_err(|e| self.fail(e))?;
        self.set_thumbnail(Some(page))
    }

    /// Writes the container. The session is `Closed` on success and
    /// `Aborted` otherwise, with nothing left at the destination.
    #[instrument(skip(self), fields(session = %self.id))]
    pub fn finish(&mut self) -> Result<ContainerSummary> {
        self.ensure_active()?;
        self.state = SessionState::Finalizing;

        let mut builder = self.builder.take().ok_or(XtcError::SessionClosed)?;
        let stats_bytes = builder.data_len();

        let summary = match builder.finish() {
            Ok(summary) => summary,
            Err(e) => {
                warn!(error = %e, "Finalize failed, aborting session");
                drop(builder);
                self.state = SessionState::Aborted;
                return Err(e);
            }
        };

        self.stats.bytes_written = stats_bytes;
        self.state = SessionState::Closed;

        if let Some(expected) = self.config.expected_pages {
            if expected != summary.page_count {
                warn!(
                    expected,
                    received = summary.page_count,
                    "Book finished with a different page count than announced"
                );
            }
        }

        if let Some(sink) = &self.catalogue {
            let entry = CatalogueEntry {
                session_id: self.id,
                path: summary.path.clone(),
                total_bytes: summary.total_bytes,
                page_count: summary.page_count,
            };
            if let Err(e) = sink.record(&entry) {
                warn!(error = %e, "Catalogue update failed; container is kept");
            }
        }

        info!(
            pages = summary.page_count,
            bytes = summary.total_bytes,
            "Conversion session closed"
        );
        Ok(summary)
    }

    /// Discards everything written so far. Safe to call in any state.
    pub fn abort(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        if let Some(builder) = self.builder.take() {
            self.stats.bytes_written = builder.data_len();
        }
        self.state = SessionState::Aborted;
        info!(session = %self.id, pages = self.stats.pages_received, "Conversion session aborted");
    }
}
