//! Streaming XTC container writer.
//!
//! Pages are appended to an anonymous scratch file as they arrive, so the
//! builder only ever holds the page being written plus one 16-byte index
//! entry per page. The final file can only be laid out once the page count is
//! known, so `finish` assembles it in a named temporary file beside the
//! destination: header, metadata and index first, then a streamed copy of the
//! scratch data, then the optional thumbnail and chapter table. The temporary
//! file is renamed over the destination only after it has been synced, and
//! both temporary files are deleted if the builder is dropped early.

use std::fs::File;
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::xtc_pipeline::common::DevicePreset;
use crate::xtc_pipeline::common::error::{Result, XtcError};
use crate::xtc_pipeline::container::types::{
    ABSENT_OFFSET, CHAPTER_ENTRY_SIZE, CONTAINER_HEADER_SIZE, ChapterEntry, ContainerHeader,
    FORMAT_VERSION, INDEX_ENTRY_SIZE, MAX_PAGES, METADATA_SIZE, MetadataRecord, PageIndexEntry,
    ReadDirection, check_chapter_bounds, check_chapter_order, encode_chapters,
};
use crate::xtc_pipeline::page::{EncodedPage, PageFormat};

/// What a finished container looks like on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSummary {
    pub path: PathBuf,
    pub format: PageFormat,
    pub page_count: usize,
    pub total_bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BuilderState {
    Building,
    Finished,
    Failed,
}

/// `S` is the scratch store for page data. It is an anonymous temporary file
/// unless the caller supplies another via [`ContainerBuilder::with_scratch`].
pub struct ContainerBuilder<S: Read + Write + Seek = File> {
    destination: PathBuf,
    format: PageFormat,
    preset: DevicePreset,
    read_direction: ReadDirection,
    scratch: Option<BufWriter<S>>,
    /// Page offsets relative to the start of the page data section
    index: Vec<PageIndexEntry>,
    data_len: u64,
    metadata: MetadataRecord,
    chapters: Vec<ChapterEntry>,
    thumbnail: Option<EncodedPage>,
    state: BuilderState,
}

impl ContainerBuilder<File> {
    pub fn begin<P: AsRef<Path>>(
        destination: P,
        format: PageFormat,
        preset: DevicePreset,
        read_direction: ReadDirection,
    ) -> Result<Self> {
        let destination = destination.as_ref();
        let scratch = tempfile::tempfile_in(working_dir(destination))?;
        Self::with_scratch(destination, format, preset, read_direction, scratch)
    }
}

impl<S: Read + Write + Seek> ContainerBuilder<S> {
    /// Starts a builder that streams page data into `scratch`, which must be
    /// empty.
    pub fn with_scratch<P: AsRef<Path>>(
        destination: P,
        format: PageFormat,
        preset: DevicePreset,
        read_direction: ReadDirection,
        scratch: S,
    ) -> Result<Self> {
        preset.check()?;
        let destination = destination.as_ref().to_path_buf();

        debug!(
            destination = %destination.display(),
            format = ?format,
            "Container builder started"
        );

        Ok(Self {
            destination,
            format,
            preset,
            read_direction,
            scratch: Some(BufWriter::new(scratch)),
            index: Vec::new(),
            data_len: 0,
            metadata: MetadataRecord::default(),
            chapters: Vec::new(),
            thumbnail: None,
            state: BuilderState::Building,
        })
    }

    pub fn format(&self) -> PageFormat {
        self.format
    }

    pub fn page_count(&self) -> usize {
        self.index.len()
    }

    /// Bytes of page data written so far.
    pub fn data_len(&self) -> u64 {
        self.data_len
    }

    fn ensure_building(&self) -> Result<()> {
        match self.state {
            BuilderState::Building => Ok(()),
            BuilderState::Finished => Err(XtcError::AlreadyFinalized),
            BuilderState::Failed => Err(XtcError::IoError(io::Error::other(
                "container builder failed on an earlier write",
            ))),
        }
    }

    pub fn push_page(&mut self, page: EncodedPage) -> Result<()> {
        self.ensure_building()?;

        if page.format() != self.format {
            return Err(XtcError::UnsupportedFormat(format!(
                "{:?} page pushed into a {:?} container",
                page.format(),
                self.format
            )));
        }
        let (width, height) = self.preset.dimensions();
        if page.header.width as usize != width || page.header.height as usize != height {
            return Err(XtcError::DimensionMismatch {
                expected_width: width,
                expected_height: height,
                actual_width: page.header.width as usize,
                actual_height: page.header.height as usize,
            });
        }
        if page.payload.len() != page.header.payload_size as usize {
            return Err(XtcError::PayloadSizeMismatch {
                declared: page.header.payload_size as usize,
                actual: page.payload.len(),
            });
        }
        if self.index.len() >= MAX_PAGES {
            return Err(XtcError::TooManyPages(MAX_PAGES));
        }

        self.write_page(&page)?;

        let entry = PageIndexEntry {
            offset: self.data_len,
            size: page.len() as u32,
            width: page.header.width,
            height: page.header.height,
        };
        self.data_len += page.len() as u64;
        self.index.push(entry);

        debug!(page = self.index.len() - 1, bytes = page.len(), "Page streamed to scratch");
        Ok(())
    }

    fn write_page(&mut self, page: &EncodedPage) -> Result<()> {
        let scratch = self
            .scratch
            .as_mut()
            .ok_or(XtcError::AlreadyFinalized)?;
        if let Err(e) = page.write_to(scratch) {
            self.state = BuilderState::Failed;
            return Err(e);
        }
        Ok(())
    }

    pub fn set_metadata(&mut self, metadata: MetadataRecord) -> Result<()> {
        self.ensure_building()?;
        self.metadata = metadata;
        Ok(())
    }

    /// Replaces the chapter list. Order is checked here; page bounds can only
    /// be checked by `finish`.
    pub fn set_chapters(&mut self, chapters: Vec<ChapterEntry>) -> Result<()> {
        self.ensure_building()?;
        check_chapter_order(&chapters)?;
        self.chapters = chapters;
        Ok(())
    }

    /// Thumbnails are always monochrome XTG pages of any size.
    pub fn set_thumbnail(&mut self, thumbnail: Option<EncodedPage>) -> Result<()> {
        self.ensure_building()?;
        if let Some(page) = &thumbnail {
            if page.format() != PageFormat::Mono {
                return Err(XtcError::UnsupportedFormat(
                    "thumbnails must be XTG pages".to_string(),
                ));
            }
            if page.payload.len() != page.header.payload_size as usize {
                return Err(XtcError::PayloadSizeMismatch {
                    declared: page.header.payload_size as usize,
                    actual: page.payload.len(),
                });
            }
        }
        self.thumbnail = thumbnail;
        Ok(())
    }

    /// Writes the complete container to the destination. May be called once;
    /// the builder is spent afterwards whether or not it succeeded.
    pub fn finish(&mut self) -> Result<ContainerSummary> {
        self.ensure_building()?;
        self.state = BuilderState::Finished;

        let page_count = self.index.len();
        if page_count == 0 {
            return Err(XtcError::EmptyContainer);
        }
        check_chapter_bounds(&self.chapters, page_count)?;
        if let Some(cover) = self.metadata.cover_page {
            if cover as usize >= page_count {
                return Err(XtcError::InvalidOption(format!(
                    "cover page {} is past the last page {}",
                    cover,
                    page_count - 1
                )));
            }
        }

        let mut scratch = self
            .scratch
            .take()
            .ok_or(XtcError::AlreadyFinalized)?
            .into_inner()
            .map_err(|e| XtcError::IoError(e.into_error()))?;

        let metadata_offset = CONTAINER_HEADER_SIZE as u64;
        let index_offset = metadata_offset + METADATA_SIZE as u64;
        let data_offset = index_offset + (page_count * INDEX_ENTRY_SIZE) as u64;
        let mut cursor = data_offset + self.data_len;

        let thumbnail_offset = match &self.thumbnail {
            Some(thumb) => {
                let at = cursor;
                cursor += thumb.len() as u64;
                at
            }
            None => ABSENT_OFFSET,
        };
        let chapter_offset = if self.chapters.is_empty() {
            ABSENT_OFFSET
        } else {
            let at = cursor;
            cursor += (self.chapters.len() * CHAPTER_ENTRY_SIZE) as u64;
            at
        };
        let total_bytes = cursor;

        let header = ContainerHeader {
            format: self.format,
            version: FORMAT_VERSION,
            page_count: page_count as u16,
            read_direction: self.read_direction,
            has_metadata: true,
            has_thumbnail: self.thumbnail.is_some(),
            has_chapters: !self.chapters.is_empty(),
            current_page: 0,
            metadata_offset,
            index_offset,
            data_offset,
            thumbnail_offset,
            chapter_offset,
        };

        let output = NamedTempFile::new_in(working_dir(&self.destination))?;
        let mut writer = BufWriter::new(output);

        {
            let _span = tracing::info_span!("write_tables", pages = page_count).entered();
            writer.write_all(&header.to_bytes())?;
            writer.write_all(&self.metadata.to_bytes(self.chapters.len() as u16))?;
            for entry in &self.index {
                let absolute = PageIndexEntry {
                    offset: data_offset + entry.offset,
                    ..*entry
                };
                writer.write_all(&absolute.to_bytes())?;
            }
        }

        {
            let _span = tracing::info_span!("copy_page_data", bytes = self.data_len).entered();
            scratch.seek(SeekFrom::Start(0))?;
            let copied = io::copy(&mut scratch, &mut writer)?;
            if copied != self.data_len {
                return Err(XtcError::IoError(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("scratch held {} bytes, expected {}", copied, self.data_len),
                )));
            }
        }

        if let Some(thumb) = &self.thumbnail {
            thumb.write_to(&mut writer)?;
        }
        if !self.chapters.is_empty() {
            writer.write_all(&encode_chapters(&self.chapters, page_count))?;
        }

        let output = writer
            .into_inner()
            .map_err(|e| XtcError::IoError(e.into_error()))?;
        output.as_file().sync_all()?;
        output
            .persist(&self.destination)
            .map_err(|e| XtcError::IoError(e.error))?;

        info!(
            path = %self.destination.display(),
            pages = page_count,
            bytes = total_bytes,
            "Container written"
        );

        Ok(ContainerSummary {
            path: self.destination.clone(),
            format: self.format,
            page_count,
            total_bytes,
        })
    }
}

/// Directory that holds the destination, used for temporary files so the
/// final rename never crosses file systems.
fn working_dir(destination: &Path) -> PathBuf {
    match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
