use crate::lifecycle::IndexHandle;
use crate::models::{SourceDocument, Turn};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexState {
    Empty,
    Live { generation: u64 },
}

/// One isolated conversation: its documents, its index and its transcript.
///
/// Only the registry and the index lifecycle mutate a session; everything
/// outside the crate sees it read-only.
#[derive(Debug)]
pub struct Session {
    id: Uuid,
    name: String,
    created_at: DateTime<Utc>,
    documents: Vec<SourceDocument>,
    index: Option<IndexHandle>,
    transcript: Vec<Turn>,
    storage_location: PathBuf,
    generation: u64,
}

impl Session {
    pub(crate) fn new(name: impl Into<String>, storage_location: PathBuf) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            created_at: Utc::now(),
            documents: Vec::new(),
            index: None,
            transcript: Vec::new(),
            storage_location,
            generation: 0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn documents(&self) -> &[SourceDocument] {
        &self.documents
    }

    pub fn index(&self) -> Option<&IndexHandle> {
        self.index.as_ref()
    }

    pub fn index_state(&self) -> IndexState {
        match &self.index {
            Some(handle) => IndexState::Live {
                generation: handle.generation(),
            },
            None => IndexState::Empty,
        }
    }

    pub fn transcript(&self) -> &[Turn] {
        &self.transcript
    }

    pub fn storage_location(&self) -> &Path {
        &self.storage_location
    }

    pub(crate) fn documents_mut(&mut self) -> &mut Vec<SourceDocument> {
        &mut self.documents
    }

    pub(crate) fn push_turn(&mut self, turn: Turn) {
        self.transcript.push(turn);
    }

    pub(crate) fn take_index(&mut self) -> Option<IndexHandle> {
        self.index.take()
    }

    pub(crate) fn set_index(&mut self, handle: IndexHandle) {
        self.index = Some(handle);
    }

    pub(crate) fn next_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    /// Moves the session to a fresh storage location after its old one could
    /// be neither removed nor quarantined.
    pub(crate) fn move_storage(&mut self, location: PathBuf) {
        self.storage_location = location;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_is_empty() {
        let session = Session::new("A", PathBuf::from("/tmp/index_a"));
        assert_eq!(session.name(), "A");
        assert!(session.documents().is_empty());
        assert!(session.transcript().is_empty());
        assert_eq!(session.index_state(), IndexState::Empty);
        assert_eq!(session.storage_location(), Path::new("/tmp/index_a"));
    }

    #[test]
    fn generations_increase_monotonically() {
        let mut session = Session::new("A", PathBuf::from("/tmp/index_a"));
        assert_eq!(session.next_generation(), 1);
        assert_eq!(session.next_generation(), 2);
    }
}
