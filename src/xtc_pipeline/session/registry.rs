//! Hosts conversion sessions for several books at once.
//!
//! Each session sits behind its own lock so books progress independently.
//! Pushes never wait on a session lock: a second caller arriving while a page
//! is being written gets `SessionBusy` instead of interleaving with it.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::xtc_pipeline::common::error::{Result, XtcError};
use crate::xtc_pipeline::container::{ChapterEntry, ContainerSummary, MetadataRecord};
use crate::xtc_pipeline::frame::RasterFrame;
use crate::xtc_pipeline::page::EncodedPage;
use crate::xtc_pipeline::session::catalogue::CatalogueSink;
use crate::xtc_pipeline::session::orchestrator::ConversionSession;
use crate::xtc_pipeline::session::types::{CancelToken, ConversionConfig, SessionId, SessionState};

struct Entry {
    session: Arc<Mutex<ConversionSession>>,
    cancel: CancelToken,
}

#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<SessionId, Entry>>,
    catalogue: Option<Arc<dyn CatalogueSink>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_catalogue(sink: Arc<dyn CatalogueSink>) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            catalogue: Some(sink),
        }
    }

    pub fn create<P: AsRef<Path>>(&self, config: ConversionConfig, destination: P) -> Result<SessionId> {
        let mut session = ConversionSession::new(config, destination)?;
        if let Some(sink) = &self.catalogue {
            session = session.with_catalogue(Arc::clone(sink));
        }
        let id = session.id();
        let entry = Entry {
            cancel: session.cancel_token(),
            session: Arc::new(Mutex::new(session)),
        };
        self.sessions.lock().insert(id, entry);
        debug!(session = %id, "Session registered");
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.lock().contains_key(&id)
    }

    pub fn state(&self, id: SessionId) -> Result<SessionState> {
        let session = self.handle(id)?;
        let state = session.lock().state();
        Ok(state)
    }

    /// Shared handle to a live session, for callers that drive it directly.
    pub fn handle(&self, id: SessionId) -> Result<Arc<Mutex<ConversionSession>>> {
        self.sessions
            .lock()
            .get(&id)
            .map(|entry| Arc::clone(&entry.session))
            .ok_or(XtcError::SessionClosed)
    }

    fn forget_if_terminal(&self, id: SessionId, state: SessionState) {
        if state.is_terminal() {
            self.sessions.lock().remove(&id);
            debug!(session = %id, state = ?state, "Session removed");
        }
    }

    /// Runs `op` against the session, waiting for the session lock.
    fn with_session<T>(
        &self,
        id: SessionId,
        op: impl FnOnce(&mut ConversionSession) -> Result<T>,
    ) -> Result<T> {
        let session = self.handle(id)?;
        let mut guard = session.lock();
        let result = op(&mut guard);
        let state = guard.state();
        drop(guard);
        self.forget_if_terminal(id, state);
        result
    }

    pub fn push(&self, id: SessionId, page_index: usize, frame: RasterFrame) -> Result<()> {
        let session = self.handle(id)?;
        let mut guard = session.try_lock().ok_or(XtcError::SessionBusy)?;
        let result = guard.push(page_index, frame);
        let state = guard.state();
        drop(guard);
        self.forget_if_terminal(id, state);
        result
    }

    pub fn set_metadata(&self, id: SessionId, metadata: MetadataRecord) -> Result<()> {
        self.with_session(id, |s| s.set_metadata(metadata))
    }

    pub fn set_chapters(&self, id: SessionId, chapters: Vec<ChapterEntry>) -> Result<()> {
        self.with_session(id, |s| s.set_chapters(chapters))
    }

    pub fn set_thumbnail(&self, id: SessionId, thumbnail: Option<EncodedPage>) -> Result<()> {
        self.with_session(id, |s| s.set_thumbnail(thumbnail))
    }

    pub fn finish(&self, id: SessionId) -> Result<ContainerSummary> {
        self.with_session(id, |s| s.finish())
    }

    /// Requests cancellation without waiting for an in-flight push, then
    /// aborts as soon as the session lock is free.
    pub fn abort(&self, id: SessionId) -> Result<()> {
        let session = {
            let sessions = self.sessions.lock();
            let entry = sessions.get(&id).ok_or(XtcError::SessionClosed)?;
            entry.cancel.cancel();
            Arc::clone(&entry.session)
        };
        session.lock().abort();
        self.sessions.lock().remove(&id);
        debug!(session = %id, "Session removed");
        Ok(())
    }
}
