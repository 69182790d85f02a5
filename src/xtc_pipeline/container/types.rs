//! XTC container layout: header, metadata block, page index and chapter
//! records. All multi-byte fields are little-endian.

use serde::{Deserialize, Serialize};

use crate::xtc_pipeline::common::error::{Result, XtcError};
use crate::xtc_pipeline::page::PageFormat;

pub const CONTAINER_HEADER_SIZE: usize = 56;
pub const METADATA_SIZE: usize = 256;
pub const INDEX_ENTRY_SIZE: usize = 16;
pub const CHAPTER_ENTRY_SIZE: usize = 96;

/// `XTC\0`, container of XTG pages.
pub const XTC_MAGIC: u32 = 0x0043_5458;
/// `XTCH`, container of XTH pages.
pub const XTCH_MAGIC: u32 = 0x4843_5458;

pub const FORMAT_VERSION: u16 = 0x0100;

/// Page count is stored as u16.
pub const MAX_PAGES: usize = u16::MAX as usize;

/// Offset written for an omitted optional section.
pub const ABSENT_OFFSET: u64 = 0;

/// Metadata cover page value meaning "no cover".
const NO_COVER: u16 = u16::MAX;

const TITLE_LEN: usize = 128;
const AUTHOR_LEN: usize = 64;
const PUBLISHER_LEN: usize = 32;
const LANGUAGE_LEN: usize = 16;
const CHAPTER_NAME_LEN: usize = 80;

/// Page turn direction advertised to the reader firmware.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReadDirection {
    #[default]
    LeftToRight,
    RightToLeft,
    TopToBottom,
}

impl ReadDirection {
    pub fn to_byte(self) -> u8 {
        match self {
            ReadDirection::LeftToRight => 0,
            ReadDirection::RightToLeft => 1,
            ReadDirection::TopToBottom => 2,
        }
    }

    pub fn from_byte(value: u8) -> Option<Self> {
        match value {
            0 => Some(ReadDirection::LeftToRight),
            1 => Some(ReadDirection::RightToLeft),
            2 => Some(ReadDirection::TopToBottom),
            _ => None,
        }
    }
}

pub fn container_magic(format: PageFormat) -> u32 {
    match format {
        PageFormat::Mono => XTC_MAGIC,
        PageFormat::Gray4 => XTCH_MAGIC,
    }
}

/// The 56-byte leading header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerHeader {
    pub format: PageFormat,
    pub version: u16,
    pub page_count: u16,
    pub read_direction: ReadDirection,
    pub has_metadata: bool,
    pub has_thumbnail: bool,
    pub has_chapters: bool,
    pub current_page: u32,
    pub metadata_offset: u64,
    pub index_offset: u64,
    pub data_offset: u64,
    pub thumbnail_offset: u64,
    pub chapter_offset: u64,
}

impl ContainerHeader {
    pub fn to_bytes(&self) -> [u8; CONTAINER_HEADER_SIZE] {
        let mut out = [0u8; CONTAINER_HEADER_SIZE];
        out[0..4].copy_from_slice(&container_magic(self.format).to_le_bytes());
        out[4..6].copy_from_slice(&self.version.to_le_bytes());
        out[6..8].copy_from_slice(&self.page_count.to_le_bytes());
        out[8] = self.read_direction.to_byte();
        out[9] = self.has_metadata as u8;
        out[10] = self.has_thumbnail as u8;
        out[11] = self.has_chapters as u8;
        out[12..16].copy_from_slice(&self.current_page.to_le_bytes());
        out[16..24].copy_from_slice(&self.metadata_offset.to_le_bytes());
        out[24..32].copy_from_slice(&self.index_offset.to_le_bytes());
        out[32..40].copy_from_slice(&self.data_offset.to_le_bytes());
        out[40..48].copy_from_slice(&self.thumbnail_offset.to_le_bytes());
        out[48..56].copy_from_slice(&self.chapter_offset.to_le_bytes());
        out
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < CONTAINER_HEADER_SIZE {
            return Err(XtcError::CorruptHeader(format!(
                "need {} bytes, got {}",
                CONTAINER_HEADER_SIZE,
                data.len()
            )));
        }

        let format = match read_u32(data, 0) {
            XTC_MAGIC => PageFormat::Mono,
            XTCH_MAGIC => PageFormat::Gray4,
            other => {
                return Err(XtcError::CorruptHeader(format!("bad magic {:#010x}", other)));
            }
        };

        let version = read_u16(data, 4);
        if version != FORMAT_VERSION {
            return Err(XtcError::CorruptHeader(format!(
                "unsupported version {:#06x}",
                version
            )));
        }

        let read_direction = ReadDirection::from_byte(data[8]).ok_or_else(|| {
            XtcError::CorruptHeader(format!("unknown read direction {}", data[8]))
        })?;

        Ok(Self {
            format,
            version,
            page_count: read_u16(data, 6),
            read_direction,
            has_metadata: data[9] != 0,
            has_thumbnail: data[10] != 0,
            has_chapters: data[11] != 0,
            current_page: read_u32(data, 12),
            metadata_offset: read_u64(data, 16),
            index_offset: read_u64(data, 24),
            data_offset: read_u64(data, 32),
            thumbnail_offset: read_u64(data, 40),
            chapter_offset: read_u64(data, 48),
        })
    }
}

/// Book attributes stored once per container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataRecord {
    pub title: String,
    pub author: String,
    pub publisher: String,
    pub language: String,
    /// Seconds since the Unix epoch. Left at 0 unless the caller sets it so
    /// that identical input produces identical files.
    pub created_at: u32,
    pub cover_page: Option<u16>,
}

impl MetadataRecord {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn to_bytes(&self, chapter_count: u16) -> [u8; METADATA_SIZE] {
        let mut out = [0u8; METADATA_SIZE];
        let mut at = 0;
        for (text, len) in [
            (&self.title, TITLE_LEN),
            (&self.author, AUTHOR_LEN),
            (&self.publisher, PUBLISHER_LEN),
            (&self.language, LANGUAGE_LEN),
        ] {
            write_fixed_str(&mut out[at..at + len], text);
            at += len;
        }
        out[240..244].copy_from_slice(&self.created_at.to_le_bytes());
        out[244..246].copy_from_slice(&self.cover_page.unwrap_or(NO_COVER).to_le_bytes());
        out[246..248].copy_from_slice(&chapter_count.to_le_bytes());
        out
    }

    /// Returns the record and the chapter count stored alongside it.
    pub fn parse(data: &[u8]) -> Result<(Self, u16)> {
        if data.len() < METADATA_SIZE {
            return Err(XtcError::CorruptContainer(format!(
                "metadata block needs {} bytes, got {}",
                METADATA_SIZE,
                data.len()
            )));
        }

        let cover = read_u16(data, 244);
        let record = Self {
            title: read_fixed_str(&data[0..128]),
            author: read_fixed_str(&data[128..192]),
            publisher: read_fixed_str(&data[192..224]),
            language: read_fixed_str(&data[224..240]),
            created_at: read_u32(data, 240),
            cover_page: (cover != NO_COVER).then_some(cover),
        };
        Ok((record, read_u16(data, 246)))
    }
}

/// One entry of the page index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageIndexEntry {
    /// Absolute file offset of the page header
    pub offset: u64,
    /// Header plus payload bytes
    pub size: u32,
    pub width: u16,
    pub height: u16,
}

impl PageIndexEntry {
    pub fn to_bytes(&self) -> [u8; INDEX_ENTRY_SIZE] {
        let mut out = [0u8; INDEX_ENTRY_SIZE];
        out[0..8].copy_from_slice(&self.offset.to_le_bytes());
        out[8..12].copy_from_slice(&self.size.to_le_bytes());
        out[12..14].copy_from_slice(&self.width.to_le_bytes());
        out[14..16].copy_from_slice(&self.height.to_le_bytes());
        out
    }

    pub fn parse(data: &[u8]) -> Self {
        Self {
            offset: read_u64(data, 0),
            size: read_u32(data, 8),
            width: read_u16(data, 12),
            height: read_u16(data, 14),
        }
    }

    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.size as u64)
    }
}

/// A chapter mark: title and zero-based first page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterEntry {
    pub title: String,
    pub start_page: usize,
}

impl ChapterEntry {
    pub fn new(title: impl Into<String>, start_page: usize) -> Self {
        Self {
            title: title.into(),
            start_page,
        }
    }
}

/// Chapters must be sorted by start page; equal starts are allowed.
pub fn check_chapter_order(chapters: &[ChapterEntry]) -> Result<()> {
    for (i, pair) in chapters.windows(2).enumerate() {
        if pair[1].start_page < pair[0].start_page {
            return Err(XtcError::InvalidChapterTable(format!(
                "chapter {} ('{}') starts at page {} before chapter {} at page {}",
                i + 1,
                pair[1].title,
                pair[1].start_page,
                i,
                pair[0].start_page
            )));
        }
    }
    if chapters.len() > MAX_PAGES {
        return Err(XtcError::InvalidChapterTable(format!(
            "{} chapters exceed the table limit",
            chapters.len()
        )));
    }
    Ok(())
}

pub fn check_chapter_bounds(chapters: &[ChapterEntry], page_count: usize) -> Result<()> {
    if let Some(bad) = chapters.iter().find(|c| c.start_page >= page_count) {
        return Err(XtcError::InvalidChapterTable(format!(
            "chapter '{}' starts at page {} but the book has {} pages",
            bad.title, bad.start_page, page_count
        )));
    }
    Ok(())
}

/// Serializes the chapter table. End pages are inclusive and derived from the
/// next chapter's start; the last chapter runs to the final page.
pub fn encode_chapters(chapters: &[ChapterEntry], page_count: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(chapters.len() * CHAPTER_ENTRY_SIZE);
    for (i, chapter) in chapters.iter().enumerate() {
        let end = chapters
            .get(i + 1)
            .map(|next| next.start_page.saturating_sub(1))
            .unwrap_or(page_count.saturating_sub(1))
            .max(chapter.start_page);

        let mut record = [0u8; CHAPTER_ENTRY_SIZE];
        write_fixed_str(&mut record[0..CHAPTER_NAME_LEN], &chapter.title);
        record[80..82].copy_from_slice(&(chapter.start_page as u16).to_le_bytes());
        record[82..84].copy_from_slice(&(end as u16).to_le_bytes());
        out.extend_from_slice(&record);
    }
    out
}

/// Parses one chapter record into the entry and its inclusive end page.
pub fn parse_chapter(data: &[u8]) -> (ChapterEntry, usize) {
    let entry = ChapterEntry {
        title: read_fixed_str(&data[0..CHAPTER_NAME_LEN]),
        start_page: read_u16(data, 80) as usize,
    };
    (entry, read_u16(data, 82) as usize)
}

/// Copies UTF-8 into a NUL-padded field, cutting on a char boundary so at
/// least one terminating NUL remains.
fn write_fixed_str(field: &mut [u8], text: &str) {
    let mut len = text.len().min(field.len() - 1);
    while !text.is_char_boundary(len) {
        len -= 1;
    }
    field[..len].copy_from_slice(&text.as_bytes()[..len]);
}

fn read_fixed_str(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

fn read_u16(data: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([data[at], data[at + 1]])
}

fn read_u32(data: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

fn read_u64(data: &[u8], at: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&data[at..at + 8]);
    u64::from_le_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_magic_spells_names() {
        assert_eq!(&XTC_MAGIC.to_le_bytes(), b"XTC\0");
        assert_eq!(&XTCH_MAGIC.to_le_bytes(), b"XTCH");
    }

    #[test]
    fn test_header_roundtrip_and_offsets() {
        let header = ContainerHeader {
            format: PageFormat::Gray4,
            version: FORMAT_VERSION,
            page_count: 3,
            read_direction: ReadDirection::RightToLeft,
            has_metadata: true,
            has_thumbnail: false,
            has_chapters: true,
            current_page: 0,
            metadata_offset: 56,
            index_offset: 312,
            data_offset: 360,
            thumbnail_offset: ABSENT_OFFSET,
            chapter_offset: 0x0102_0304,
        };
        let bytes = header.to_bytes();
        assert_eq!(&bytes[0..4], b"XTCH");
        assert_eq!(&bytes[4..8], &[0x00, 0x01, 0x03, 0x00]);
        assert_eq!(&bytes[8..12], &[1, 1, 0, 1]);
        assert_eq!(&bytes[24..32], &312u64.to_le_bytes());
        assert_eq!(&bytes[48..52], &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(ContainerHeader::parse(&bytes).unwrap(), header);
    }

    #[test]
    fn test_header_rejects_bad_magic_and_version() {
        let mut bytes = [0u8; CONTAINER_HEADER_SIZE];
        assert!(matches!(
            ContainerHeader::parse(&bytes),
            Err(XtcError::CorruptHeader(_))
        ));

        bytes[0..4].copy_from_slice(b"XTC\0");
        bytes[4..6].copy_from_slice(&0x0200u16.to_le_bytes());
        assert!(matches!(
            ContainerHeader::parse(&bytes),
            Err(XtcError::CorruptHeader(_))
        ));

        assert!(matches!(
            ContainerHeader::parse(&bytes[..20]),
            Err(XtcError::CorruptHeader(_))
        ));
    }

    #[test]
    fn test_metadata_layout() {
        let mut record = MetadataRecord::new("T").with_author("A").with_language("en");
        record.created_at = 0x11223344;
        record.cover_page = Some(2);

        let bytes = record.to_bytes(5);
        assert_eq!(bytes[0], b'T');
        assert_eq!(bytes[1], 0);
        assert_eq!(bytes[128], b'A');
        assert_eq!(&bytes[224..226], b"en");
        assert_eq!(&bytes[240..244], &[0x44, 0x33, 0x22, 0x11]);
        assert_eq!(&bytes[244..248], &[2, 0, 5, 0]);
        assert!(bytes[248..].iter().all(|&b| b == 0));

        let (parsed, chapters) = MetadataRecord::parse(&bytes).unwrap();
        assert_eq!(parsed, record);
        assert_eq!(chapters, 5);
    }

    #[test]
    fn test_missing_cover_is_sentinel() {
        let bytes = MetadataRecord::new("x").to_bytes(0);
        assert_eq!(&bytes[244..246], &[0xFF, 0xFF]);
        assert_eq!(MetadataRecord::parse(&bytes).unwrap().0.cover_page, None);
    }

    #[test]
    fn test_long_title_is_cut_on_char_boundary() {
        // 'é' is two bytes; 127 bytes of room leaves the last one out
        let title = "é".repeat(100);
        let bytes = MetadataRecord::new(title).to_bytes(0);
        assert_eq!(bytes[125], 0xA9);
        assert_eq!(bytes[126], 0);
        let (parsed, _) = MetadataRecord::parse(&bytes).unwrap();
        assert_eq!(parsed.title, "é".repeat(63));
    }

    #[test]
    fn test_chapter_order_check() {
        let sorted = vec![ChapterEntry::new("a", 0), ChapterEntry::new("b", 0), ChapterEntry::new("c", 4)];
        assert!(check_chapter_order(&sorted).is_ok());

        let unsorted = vec![ChapterEntry::new("a", 3), ChapterEntry::new("b", 1)];
        assert!(matches!(
            check_chapter_order(&unsorted),
            Err(XtcError::InvalidChapterTable(_))
        ));
    }

    #[test]
    fn test_chapter_bounds_check() {
        let chapters = vec![ChapterEntry::new("a", 0), ChapterEntry::new("b", 3)];
        assert!(check_chapter_bounds(&chapters, 4).is_ok());
        assert!(matches!(
            check_chapter_bounds(&chapters, 3),
            Err(XtcError::InvalidChapterTable(_))
        ));
    }

    #[test]
    fn test_chapter_records_carry_inclusive_end_pages() {
        let chapters = vec![ChapterEntry::new("One", 0), ChapterEntry::new("Two", 4)];
        let bytes = encode_chapters(&chapters, 10);
        assert_eq!(bytes.len(), 2 * CHAPTER_ENTRY_SIZE);

        let (first, first_end) = parse_chapter(&bytes[..CHAPTER_ENTRY_SIZE]);
        assert_eq!(first, chapters[0]);
        assert_eq!(first_end, 3);

        let (second, second_end) = parse_chapter(&bytes[CHAPTER_ENTRY_SIZE..]);
        assert_eq!(second, chapters[1]);
        assert_eq!(second_end, 9);
    }

    #[test]
    fn test_index_entry_layout() {
        let entry = PageIndexEntry {
            offset: 360,
            size: 48_022,
            width: 480,
            height: 800,
        };
        let bytes = entry.to_bytes();
        assert_eq!(&bytes[0..8], &360u64.to_le_bytes());
        assert_eq!(&bytes[8..12], &48_022u32.to_le_bytes());
        assert_eq!(&bytes[12..16], &[0xE0, 0x01, 0x20, 0x03]);
        assert_eq!(PageIndexEntry::parse(&bytes), entry);
        assert_eq!(entry.end(), 48_382);
    }
}
