//! XTC container module
//!
//! The on-disk layout, a streaming builder that writes whole books without
//! buffering their pages, and a reader that validates and decodes finished
//! containers.

mod builder;
mod reader;
pub mod types;

pub use builder::{ContainerBuilder, ContainerSummary};
pub use reader::{Finding, Section, XtcReader};
pub use types::{
    ABSENT_OFFSET, CHAPTER_ENTRY_SIZE, CONTAINER_HEADER_SIZE, ChapterEntry, ContainerHeader,
    FORMAT_VERSION, INDEX_ENTRY_SIZE, MAX_PAGES, METADATA_SIZE, MetadataRecord, PageIndexEntry,
    ReadDirection, XTC_MAGIC, XTCH_MAGIC,
};
