use crate::error::{Result, SessionError};
use crate::lifecycle::{allocate_location, IndexLifecycle, LifecycleWarning, RebuildReport};
use crate::models::SourceDocument;
use crate::session::Session;
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::{info, warn};

/// Owns every session, the current-session pointer and the set of storage
/// locations ever handed out.
///
/// Storage locations come from a fresh random token, never from the session
/// name, and a location is never handed out twice, even after its session
/// was deleted.
pub struct SessionRegistry {
    sessions: Vec<Session>,
    current: Option<String>,
    issued_locations: HashSet<PathBuf>,
    lifecycle: IndexLifecycle,
}

impl SessionRegistry {
    pub fn new(lifecycle: IndexLifecycle) -> Self {
        Self {
            sessions: Vec::new(),
            current: None,
            issued_locations: HashSet::new(),
            lifecycle,
        }
    }

    pub fn lifecycle(&self) -> &IndexLifecycle {
        &self.lifecycle
    }

    /// Creates an empty session and makes it current.
    pub fn create(&mut self, name: &str) -> Result<&Session> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SessionError::InvalidName);
        }
        if self.position(name).is_some() {
            return Err(SessionError::DuplicateName(name.to_string()));
        }

        let location = self.fresh_location();
        info!(session = name, location = %location.display(), "session created");
        self.sessions.push(Session::new(name, location));
        self.current = Some(name.to_string());
        Ok(&self.sessions[self.sessions.len() - 1])
    }

    pub fn select(&mut self, name: &str) -> Result<&Session> {
        let position = self
            .position(name)
            .ok_or_else(|| SessionError::NotFound(name.to_string()))?;
        self.current = Some(self.sessions[position].name().to_string());
        Ok(&self.sessions[position])
    }

    pub fn current(&self) -> Option<&Session> {
        self.current.as_deref().and_then(|name| self.get(name).ok())
    }

    pub fn current_name(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn get(&self, name: &str) -> Result<&Session> {
        self.position(name)
            .map(|position| &self.sessions[position])
            .ok_or_else(|| SessionError::NotFound(name.to_string()))
    }

    pub fn get_mut(&mut self, name: &str) -> Result<&mut Session> {
        let position = self
            .position(name)
            .ok_or_else(|| SessionError::NotFound(name.to_string()))?;
        Ok(&mut self.sessions[position])
    }

    pub fn current_mut(&mut self) -> Result<&mut Session> {
        let name = self.current.clone().ok_or(SessionError::NoSelection)?;
        self.get_mut(&name)
    }

    pub fn sessions(&self) -> impl Iterator<Item = &Session> {
        self.sessions.iter()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Tears down the session's index, then removes the session. Storage that
    /// could not be reclaimed is reported, never fatal.
    pub async fn delete(&mut self, name: &str) -> Result<Vec<LifecycleWarning>> {
        let position = self
            .position(name)
            .ok_or_else(|| SessionError::NotFound(name.to_string()))?;

        let warnings = self.lifecycle.destroy(&mut self.sessions[position]).await;
        let session = self.sessions.remove(position);
        if self.current.as_deref() == Some(session.name()) {
            self.current = None;
        }

        for warning in &warnings {
            warn!(session = session.name(), %warning, "session deleted with storage warning");
        }
        info!(session = session.name(), "session deleted");
        Ok(warnings)
    }

    /// Appends documents and rebuilds the index. If the rebuild fails the
    /// appended documents are dropped again and the index is restored over the
    /// previous documents.
    pub async fn add_documents(
        &mut self,
        name: &str,
        documents: Vec<SourceDocument>,
    ) -> Result<RebuildReport> {
        let position = self
            .position(name)
            .ok_or_else(|| SessionError::NotFound(name.to_string()))?;
        let session = &mut self.sessions[position];

        let previous_len = session.documents().len();
        session.documents_mut().extend(documents);

        match self.lifecycle.rebuild(session).await {
            Ok(report) => {
                self.record_relocations(&report);
                Ok(report)
            }
            Err(error) => {
                self.sessions[position].documents_mut().truncate(previous_len);
                self.restore_index(position).await;
                Err(error.into())
            }
        }
    }

    /// Removes the document at `index` and rebuilds, which clears the index
    /// when no documents remain. If the rebuild fails the document is restored.
    pub async fn remove_document(&mut self, name: &str, index: usize) -> Result<RebuildReport> {
        let position = self
            .position(name)
            .ok_or_else(|| SessionError::NotFound(name.to_string()))?;
        let session = &mut self.sessions[position];

        let len = session.documents().len();
        if index >= len {
            return Err(SessionError::IndexOutOfRange { index, len });
        }
        let removed = session.documents_mut().remove(index);

        match self.lifecycle.rebuild(session).await {
            Ok(report) => {
                info!(
                    session = name,
                    source = %removed.source_name,
                    "document removed"
                );
                self.record_relocations(&report);
                Ok(report)
            }
            Err(error) => {
                self.sessions[position]
                    .documents_mut()
                    .insert(index, removed);
                self.restore_index(position).await;
                Err(error.into())
            }
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        let name = name.trim();
        self.sessions
            .iter()
            .position(|session| session.name() == name)
    }

    fn fresh_location(&mut self) -> PathBuf {
        loop {
            let location = allocate_location(self.lifecycle.storage_root());
            if self.issued_locations.insert(location.clone()) {
                return location;
            }
        }
    }

    /// A rebuild that failed while writing the new generation has already
    /// torn the old one down. Rebuilds over the restored documents so the
    /// session is left indexed or empty, never with documents and no index.
    async fn restore_index(&mut self, position: usize) {
        let session = &mut self.sessions[position];
        if session.index().is_some() || session.documents().is_empty() {
            return;
        }

        match self.lifecycle.rebuild(session).await {
            Ok(report) => {
                info!(
                    session = session.name(),
                    generation = ?report.generation,
                    "index restored after failed rebuild"
                );
                self.record_relocations(&report);
            }
            Err(error) => {
                warn!(session = session.name(), %error, "index could not be restored");
            }
        }
    }

    fn record_relocations(&mut self, report: &RebuildReport) {
        for warning in &report.warnings {
            if let LifecycleWarning::Relocated { from, to, .. } = warning {
                self.issued_locations.insert(from.clone());
                self.issued_locations.insert(to.clone());
            }
        }
    }
}
