use std::path::PathBuf;

use crate::xtc_pipeline::common::error::Result;
use crate::xtc_pipeline::session::types::SessionId;

/// What the library catalogue learns about a finished book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogueEntry {
    pub session_id: SessionId,
    pub path: PathBuf,
    pub total_bytes: u64,
    pub page_count: usize,
}

/// External keyed store told about every container a session finishes.
pub trait CatalogueSink: Send + Sync {
    fn record(&self, entry: &CatalogueEntry) -> Result<()>;
}
