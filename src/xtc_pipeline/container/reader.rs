//! XTC container reader and structural validator.
//!
//! Opening a container only parses the 56-byte header; everything else is
//! read on demand. `validate` walks every section and reports each defect it
//! finds as a [`Finding`] instead of stopping at the first one. Checks that
//! depend on a section that cannot be located are skipped, so one corrupted
//! offset produces one finding rather than a cascade.

use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use tracing::debug;

use crate::xtc_pipeline::common::error::{Result, XtcError};
use crate::xtc_pipeline::container::types::{
    CHAPTER_ENTRY_SIZE, CONTAINER_HEADER_SIZE, ChapterEntry, ContainerHeader, INDEX_ENTRY_SIZE,
    METADATA_SIZE, MetadataRecord, PageIndexEntry, parse_chapter,
};
use crate::xtc_pipeline::page::{
    EncodedPage, PAGE_HEADER_SIZE, PageEncoder, PageFormat, PageHeader, XtPageEncoder,
    payload_checksum,
};
use crate::xtc_pipeline::quantize::QuantizedRaster;

/// Logical sections addressed by the container header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Metadata,
    PageIndex,
    PageData,
    Thumbnail,
    Chapters,
}

/// A single structural defect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finding {
    SectionOutOfBounds {
        section: Section,
        offset: u64,
        length: u64,
        file_len: u64,
    },
    SectionOverlap {
        first: Section,
        second: Section,
    },
    /// Presence flag and offset disagree for an optional section.
    FlagMismatch {
        section: Section,
        flag: bool,
        offset: u64,
    },
    PageOutOfBounds {
        page: usize,
        offset: u64,
        size: u64,
    },
    PageOverlap {
        page: usize,
        previous: usize,
    },
    PageHeaderInvalid {
        page: usize,
        reason: String,
    },
    PageIndexMismatch {
        page: usize,
        reason: String,
    },
    PayloadSizeMismatch {
        page: usize,
        declared: u64,
        expected: u64,
    },
    ChecksumMismatch {
        page: usize,
    },
    ChapterOutOfRange {
        chapter: usize,
        start_page: usize,
        page_count: usize,
    },
    ChapterOrder {
        chapter: usize,
    },
    ThumbnailInvalid {
        reason: String,
    },
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Finding::SectionOutOfBounds { section, offset, length, file_len } => write!(
                f,
                "{:?} section [{}, +{}) lies outside the {}-byte file",
                section, offset, length, file_len
            ),
            Finding::SectionOverlap { first, second } => {
                write!(f, "{:?} and {:?} sections overlap", first, second)
            }
            Finding::FlagMismatch { section, flag, offset } => write!(
                f,
                "{:?} flag is {} but its offset is {}",
                section, flag, offset
            ),
            Finding::PageOutOfBounds { page, offset, size } => {
                write!(f, "page {} at [{}, +{}) is out of bounds", page, offset, size)
            }
            Finding::PageOverlap { page, previous } => {
                write!(f, "page {} overlaps page {}", page, previous)
            }
            Finding::PageHeaderInvalid { page, reason } => {
                write!(f, "page {} header is invalid: {}", page, reason)
            }
            Finding::PageIndexMismatch { page, reason } => {
                write!(f, "page {} disagrees with its index entry: {}", page, reason)
            }
            Finding::PayloadSizeMismatch { page, declared, expected } => write!(
                f,
                "page {} declares {} payload bytes, its dimensions need {}",
                page, declared, expected
            ),
            Finding::ChecksumMismatch { page } => write!(f, "page {} checksum mismatch", page),
            Finding::ChapterOutOfRange { chapter, start_page, page_count } => write!(
                f,
                "chapter {} starts at page {} of a {}-page book",
                chapter, start_page, page_count
            ),
            Finding::ChapterOrder { chapter } => {
                write!(f, "chapter {} starts before the previous chapter", chapter)
            }
            Finding::ThumbnailInvalid { reason } => write!(f, "thumbnail is invalid: {}", reason),
        }
    }
}

pub struct XtcReader<R: Read + Seek> {
    inner: R,
    file_len: u64,
    header: ContainerHeader,
}

impl XtcReader<BufReader<File>> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            XtcError::InputReadError(format!("{}: {}", path.display(), e))
        })?;
        Self::from_reader(BufReader::new(file))
    }
}

impl<R: Read + Seek> XtcReader<R> {
    pub fn from_reader(mut inner: R) -> Result<Self> {
        let file_len = inner.seek(SeekFrom::End(0))?;
        if file_len < CONTAINER_HEADER_SIZE as u64 {
            return Err(XtcError::CorruptHeader(format!(
                "file is {} bytes, shorter than the {}-byte header",
                file_len, CONTAINER_HEADER_SIZE
            )));
        }

        let mut bytes = [0u8; CONTAINER_HEADER_SIZE];
        inner.seek(SeekFrom::Start(0))?;
        inner.read_exact(&mut bytes)?;
        let header = ContainerHeader::parse(&bytes)?;

        debug!(
            pages = header.page_count,
            format = ?header.format,
            bytes = file_len,
            "Opened container"
        );

        Ok(Self {
            inner,
            file_len,
            header,
        })
    }

    pub fn header(&self) -> &ContainerHeader {
        &self.header
    }

    pub fn format(&self) -> PageFormat {
        self.header.format
    }

    pub fn page_count(&self) -> usize {
        self.header.page_count as usize
    }

    pub fn file_len(&self) -> u64 {
        self.file_len
    }

    fn in_bounds(&self, offset: u64, length: u64) -> bool {
        offset
            .checked_add(length)
            .is_some_and(|end| end <= self.file_len)
    }

    fn read_at(&mut self, offset: u64, length: usize) -> Result<Vec<u8>> {
        if !self.in_bounds(offset, length as u64) {
            return Err(XtcError::CorruptContainer(format!(
                "read of {} bytes at {} runs past the end of the {}-byte file",
                length, offset, self.file_len
            )));
        }
        let mut buffer = vec![0u8; length];
        self.inner.seek(SeekFrom::Start(offset))?;
        self.inner.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    fn metadata_block(&mut self) -> Result<Option<(MetadataRecord, u16)>> {
        if !self.header.has_metadata {
            return Ok(None);
        }
        let bytes = self.read_at(self.header.metadata_offset, METADATA_SIZE)?;
        MetadataRecord::parse(&bytes).map(Some)
    }

    pub fn metadata(&mut self) -> Result<Option<MetadataRecord>> {
        Ok(self.metadata_block()?.map(|(record, _)| record))
    }

    pub fn page_entry(&mut self, index: usize) -> Result<PageIndexEntry> {
        if index >= self.page_count() {
            return Err(XtcError::InvalidOption(format!(
                "page {} requested from a {}-page container",
                index,
                self.page_count()
            )));
        }
        let offset = self
            .header
            .index_offset
            .saturating_add((index * INDEX_ENTRY_SIZE) as u64);
        let bytes = self.read_at(offset, INDEX_ENTRY_SIZE)?;
        Ok(PageIndexEntry::parse(&bytes))
    }

    fn read_encoded_at(&mut self, offset: u64) -> Result<EncodedPage> {
        let head = self.read_at(offset, PAGE_HEADER_SIZE)?;
        let header = PageHeader::parse(&head)?;
        let payload = self.read_at(offset + PAGE_HEADER_SIZE as u64, header.payload_size as usize)?;
        Ok(EncodedPage { header, payload })
    }

    /// Reads page `index` as stored, header included.
    pub fn read_page(&mut self, index: usize) -> Result<EncodedPage> {
        let entry = self.page_entry(index)?;
        let page = self.read_encoded_at(entry.offset)?;
        if page.format() != self.header.format {
            return Err(XtcError::CorruptContainer(format!(
                "page {} is {:?} inside a {:?} container",
                index,
                page.format(),
                self.header.format
            )));
        }
        Ok(page)
    }

    /// Decodes page `index` back to quantized levels.
    pub fn decode_page(&mut self, index: usize) -> Result<QuantizedRaster> {
        let page = self.read_page(index)?;
        XtPageEncoder.decode(&page)
    }

    pub fn thumbnail(&mut self) -> Result<Option<EncodedPage>> {
        if !self.header.has_thumbnail {
            return Ok(None);
        }
        self.read_encoded_at(self.header.thumbnail_offset).map(Some)
    }

    /// Chapters with their inclusive end pages.
    pub fn chapters(&mut self) -> Result<Vec<(ChapterEntry, usize)>> {
        if !self.header.has_chapters {
            return Ok(Vec::new());
        }
        let count = self.metadata_block()?.map(|(_, count)| count).unwrap_or(0) as usize;
        let bytes = self.read_at(self.header.chapter_offset, count * CHAPTER_ENTRY_SIZE)?;
        Ok(bytes.chunks_exact(CHAPTER_ENTRY_SIZE).map(parse_chapter).collect())
    }

    /// Checks the container's structure. Never modifies anything; I/O errors
    /// from the underlying reader are returned as errors, defects as findings.
    pub fn validate(&mut self) -> Result<Vec<Finding>> {
        let mut findings = Vec::new();
        let header = self.header;
        let page_count = self.page_count();
        let mut extents: Vec<(Section, u64, u64)> = Vec::new();

        let mut chapter_count = None;
        let metadata_len = METADATA_SIZE as u64;
        if let Some(offset) = self.locate(
            Section::Metadata,
            header.has_metadata,
            header.metadata_offset,
            metadata_len,
            &mut findings,
        ) {
            let bytes = self.read_at(offset, METADATA_SIZE)?;
            if let Ok((_, count)) = MetadataRecord::parse(&bytes) {
                chapter_count = Some(count as usize);
            }
            extents.push((Section::Metadata, offset, metadata_len));
        }

        let index_len = (page_count * INDEX_ENTRY_SIZE) as u64;
        let entries = match self.locate(
            Section::PageIndex,
            true,
            header.index_offset,
            index_len,
            &mut findings,
        ) {
            Some(offset) => {
                extents.push((Section::PageIndex, offset, index_len));
                let bytes = self.read_at(offset, index_len as usize)?;
                Some(
                    bytes
                        .chunks_exact(INDEX_ENTRY_SIZE)
                        .map(PageIndexEntry::parse)
                        .collect::<Vec<_>>(),
                )
            }
            None => None,
        };

        let data_in_bounds = header.data_offset <= self.file_len;
        if !data_in_bounds {
            findings.push(Finding::SectionOutOfBounds {
                section: Section::PageData,
                offset: header.data_offset,
                length: 0,
                file_len: self.file_len,
            });
        }

        if let Some(entries) = &entries {
            let data_len: u64 = entries.iter().map(|e| e.size as u64).sum();
            let data_section = if data_in_bounds {
                extents.push((Section::PageData, header.data_offset, data_len));
                Some((header.data_offset, header.data_offset.saturating_add(data_len)))
            } else {
                None
            };
            self.validate_pages(entries, data_section, &mut findings)?;
        }

        if let Some(offset) = self.locate(
            Section::Thumbnail,
            header.has_thumbnail,
            header.thumbnail_offset,
            PAGE_HEADER_SIZE as u64,
            &mut findings,
        ) {
            let head = self.read_at(offset, PAGE_HEADER_SIZE)?;
            match PageHeader::parse(&head) {
                Ok(thumb) if thumb.format != PageFormat::Mono => {
                    findings.push(Finding::ThumbnailInvalid {
                        reason: "thumbnail is not an XTG page".to_string(),
                    });
                }
                Ok(thumb) => {
                    let length = PAGE_HEADER_SIZE as u64 + thumb.payload_size as u64;
                    if self.in_bounds(offset, length) {
                        extents.push((Section::Thumbnail, offset, length));
                        if let Some(reason) = self.check_thumbnail(offset, &thumb)? {
                            findings.push(Finding::ThumbnailInvalid { reason });
                        }
                    } else {
                        findings.push(Finding::SectionOutOfBounds {
                            section: Section::Thumbnail,
                            offset,
                            length,
                            file_len: self.file_len,
                        });
                    }
                }
                Err(e) => findings.push(Finding::ThumbnailInvalid { reason: e.to_string() }),
            }
        }

        match chapter_count {
            Some(0) if header.has_chapters => {
                findings.push(Finding::FlagMismatch {
                    section: Section::Chapters,
                    flag: true,
                    offset: header.chapter_offset,
                });
            }
            Some(count) => {
                let length = (count * CHAPTER_ENTRY_SIZE) as u64;
                if let Some(offset) = self.locate(
                    Section::Chapters,
                    header.has_chapters,
                    header.chapter_offset,
                    length,
                    &mut findings,
                ) {
                    extents.push((Section::Chapters, offset, length));
                    let bytes = self.read_at(offset, length as usize)?;
                    let mut previous = 0;
                    for (chapter, record) in bytes.chunks_exact(CHAPTER_ENTRY_SIZE).enumerate() {
                        let (entry, _) = parse_chapter(record);
                        if entry.start_page >= page_count {
                            findings.push(Finding::ChapterOutOfRange {
                                chapter,
                                start_page: entry.start_page,
                                page_count,
                            });
                        } else if entry.start_page < previous {
                            findings.push(Finding::ChapterOrder { chapter });
                        }
                        previous = previous.max(entry.start_page);
                    }
                }
            }
            // Without a metadata block the chapter count is unknown; the
            // table must still hold at least one record.
            None => {
                self.locate(
                    Section::Chapters,
                    header.has_chapters,
                    header.chapter_offset,
                    CHAPTER_ENTRY_SIZE as u64,
                    &mut findings,
                );
            }
        }

        for (i, &(first, start, len)) in extents.iter().enumerate() {
            for &(second, other_start, other_len) in &extents[i + 1..] {
                let disjoint = start + len <= other_start || other_start + other_len <= start;
                if len > 0 && other_len > 0 && !disjoint {
                    findings.push(Finding::SectionOverlap { first, second });
                }
            }
        }

        debug!(findings = findings.len(), "Container validated");
        Ok(findings)
    }

    /// Resolves a section's offset, recording a finding when the flag and
    /// offset disagree or the section does not fit in the file.
    fn locate(
        &self,
        section: Section,
        present: bool,
        offset: u64,
        length: u64,
        findings: &mut Vec<Finding>,
    ) -> Option<u64> {
        if !present {
            if offset != 0 {
                findings.push(Finding::FlagMismatch {
                    section,
                    flag: false,
                    offset,
                });
            }
            return None;
        }
        if offset == 0 {
            findings.push(Finding::FlagMismatch {
                section,
                flag: true,
                offset,
            });
            return None;
        }
        if !self.in_bounds(offset, length) {
            findings.push(Finding::SectionOutOfBounds {
                section,
                offset,
                length,
                file_len: self.file_len,
            });
            return None;
        }
        Some(offset)
    }

    /// Size and checksum checks for a thumbnail whose header parsed and whose
    /// bytes lie inside the file.
    fn check_thumbnail(&mut self, offset: u64, thumb: &PageHeader) -> Result<Option<String>> {
        let expected = thumb.expected_payload_size();
        if thumb.payload_size as usize != expected {
            return Ok(Some(format!(
                "{}x{} thumbnail declares {} payload bytes, its dimensions need {}",
                thumb.width, thumb.height, thumb.payload_size, expected
            )));
        }
        let payload = self.read_at(offset + PAGE_HEADER_SIZE as u64, expected)?;
        if payload_checksum(&payload) != thumb.checksum {
            return Ok(Some("thumbnail checksum mismatch".to_string()));
        }
        Ok(None)
    }

    /// `data_section` is the `[start, end)` range the index entries must fall
    /// in, when the data offset itself is usable.
    fn validate_pages(
        &mut self,
        entries: &[PageIndexEntry],
        data_section: Option<(u64, u64)>,
        findings: &mut Vec<Finding>,
    ) -> Result<()> {
        let mut located: Vec<(usize, u64, u64)> = Vec::with_capacity(entries.len());

        for (page, entry) in entries.iter().enumerate() {
            let size = entry.size as u64;
            let outside_data = data_section
                .is_some_and(|(start, end)| entry.offset < start || entry.end() > end);
            if outside_data || !self.in_bounds(entry.offset, size) || size < PAGE_HEADER_SIZE as u64 {
                findings.push(Finding::PageOutOfBounds {
                    page,
                    offset: entry.offset,
                    size,
                });
                continue;
            }
            located.push((page, entry.offset, entry.end()));

            let head = self.read_at(entry.offset, PAGE_HEADER_SIZE)?;
            let header = match PageHeader::parse(&head) {
                Ok(header) => header,
                Err(e) => {
                    findings.push(Finding::PageHeaderInvalid {
                        page,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            if header.format != self.header.format {
                findings.push(Finding::PageHeaderInvalid {
                    page,
                    reason: format!("{:?} page in a {:?} container", header.format, self.header.format),
                });
                continue;
            }
            if header.width != entry.width || header.height != entry.height {
                findings.push(Finding::PageIndexMismatch {
                    page,
                    reason: format!(
                        "header says {}x{}, index says {}x{}",
                        header.width, header.height, entry.width, entry.height
                    ),
                });
            }
            let expected = header.expected_payload_size() as u64;
            if header.payload_size as u64 != expected {
                findings.push(Finding::PayloadSizeMismatch {
                    page,
                    declared: header.payload_size as u64,
                    expected,
                });
                continue;
            }
            if PAGE_HEADER_SIZE as u64 + expected != size {
                findings.push(Finding::PageIndexMismatch {
                    page,
                    reason: format!(
                        "index size {} but page occupies {}",
                        size,
                        PAGE_HEADER_SIZE as u64 + expected
                    ),
                });
                continue;
            }

            let payload = self.read_at(entry.offset + PAGE_HEADER_SIZE as u64, expected as usize)?;
            if payload_checksum(&payload) != header.checksum {
                findings.push(Finding::ChecksumMismatch { page });
            }
        }

        located.sort_by_key(|&(_, start, _)| start);
        for pair in located.windows(2) {
            let (previous, _, previous_end) = pair[0];
            let (page, start, _) = pair[1];
            if start < previous_end {
                findings.push(Finding::PageOverlap { page, previous });
            }
        }

        Ok(())
    }
}
