//! Conversion sessions
//!
//! A session takes one book from validated frames to a finished container,
//! one page at a time. The registry hosts sessions for several books at once.

mod catalogue;
mod manifest;
mod orchestrator;
mod registry;
pub mod types;

#[cfg(test)]
mod tests;

pub use catalogue::{CatalogueEntry, CatalogueSink};
pub use manifest::BookManifest;
pub use orchestrator::ConversionSession;
pub use registry::SessionRegistry;
pub use types::{
    CancelToken, ConversionConfig, ConversionConfigBuilder, SessionId, SessionState, SessionStats,
};
