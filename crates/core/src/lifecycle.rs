//! Index lifecycle: building, replacing and tearing down a session's index.
//!
//! A session's index is never updated in place. Every document change embeds
//! the full chunk set first, then releases the previous generation's storage
//! and persists the new generation at the session's location.
//!
//! Storage release is the fragile step. A location may stay locked for a
//! while after its handle is closed, so removal is retried after a reclaim
//! pass with a growing pause, a bounded number of times. If the location is
//! still locked it is moved aside to a quarantine path and the caller gets a
//! [`LifecycleWarning`] instead of an error.

use crate::chunking::{chunk_documents, ChunkingConfig};
use crate::embeddings::Embedder;
use crate::error::{IndexError, IngestError};
use crate::models::{Chunk, RagConfig};
use crate::session::Session;
use crate::store::{IndexedChunk, StoredIndex};
use crate::traits::IndexStorage;
use chrono::{DateTime, Utc};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// An immutable reference to one built index generation.
#[derive(Debug)]
pub struct IndexHandle {
    generation: u64,
    location: PathBuf,
    chunk_count: usize,
    dimensions: usize,
    built_at: DateTime<Utc>,
}

impl IndexHandle {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    /// Releases the resources the storage keeps open for this generation.
    pub async fn close(self, storage: &dyn IndexStorage) {
        storage.release(&self.location).await;
        debug!(
            location = %self.location.display(),
            generation = self.generation,
            "closed index handle"
        );
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleWarning {
    /// Stale storage could not be removed and was moved aside.
    Quarantined {
        location: PathBuf,
        quarantine: PathBuf,
        cause: String,
    },
    /// Stale storage could be neither removed nor moved; the session now uses
    /// a fresh location and the old one is left behind.
    Relocated {
        from: PathBuf,
        to: PathBuf,
        cause: String,
    },
    /// Storage of a deleted session could not be reclaimed.
    StorageLeaked { location: PathBuf, cause: String },
}

impl fmt::Display for LifecycleWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleWarning::Quarantined {
                location,
                quarantine,
                cause,
            } => write!(
                f,
                "old index at {} was locked ({cause}); moved to {}",
                location.display(),
                quarantine.display()
            ),
            LifecycleWarning::Relocated { from, to, cause } => write!(
                f,
                "old index at {} could not be released ({cause}); session now uses {}",
                from.display(),
                to.display()
            ),
            LifecycleWarning::StorageLeaked { location, cause } => write!(
                f,
                "index storage at {} was left behind: {cause}",
                location.display()
            ),
        }
    }
}

#[derive(Debug, Default)]
pub struct RebuildReport {
    /// Generation of the new live index, `None` when the session ended up without one.
    pub generation: Option<u64>,
    pub chunk_count: usize,
    pub warnings: Vec<LifecycleWarning>,
}

pub fn allocate_location(storage_root: &Path) -> PathBuf {
    storage_root.join(format!("index_{}", Uuid::new_v4().simple()))
}

fn quarantine_path(location: &Path) -> PathBuf {
    let token = Uuid::new_v4().simple().to_string();
    let name = location
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "index".to_string());
    location.with_file_name(format!("{name}.quarantine-{}", &token[..8]))
}

/// Stateless service over whichever session it is handed.
pub struct IndexLifecycle {
    embedder: Arc<dyn Embedder>,
    storage: Arc<dyn IndexStorage>,
    chunking: ChunkingConfig,
    release_retries: u32,
    release_backoff: Duration,
    storage_root: PathBuf,
}

impl IndexLifecycle {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        storage: Arc<dyn IndexStorage>,
        config: &RagConfig,
    ) -> Result<Self, IngestError> {
        config.validate()?;
        Ok(Self {
            embedder,
            storage,
            chunking: ChunkingConfig::from(config),
            release_retries: config.release_retries,
            release_backoff: config.release_backoff,
            storage_root: config.storage_root.clone(),
        })
    }

    pub fn storage(&self) -> &Arc<dyn IndexStorage> {
        &self.storage
    }

    pub fn storage_root(&self) -> &Path {
        &self.storage_root
    }

    /// Embeds every chunk and persists the result at `location`.
    ///
    /// Nothing is written unless every chunk embeds successfully.
    pub async fn build(
        &self,
        chunks: &[Chunk],
        location: &Path,
        generation: u64,
    ) -> Result<IndexHandle, IndexError> {
        let entries = self.embed_chunks(chunks).await?;
        self.persist(entries, location, generation).await
    }

    pub async fn rebuild(&self, session: &mut Session) -> Result<RebuildReport, IndexError> {
        let chunks = chunk_documents(session.documents(), self.chunking)?;

        if chunks.is_empty() {
            let warnings = self.teardown(session).await;
            info!(session = session.name(), "documents cleared; session has no index");
            return Ok(RebuildReport {
                generation: None,
                chunk_count: 0,
                warnings,
            });
        }

        // Embedding is the step that can fail on the collaborator's side, so it
        // runs before the live index is touched.
        let entries = self.embed_chunks(&chunks).await?;

        let warnings = self.teardown(session).await;
        let generation = session.next_generation();
        let handle = self
            .persist(entries, session.storage_location(), generation)
            .await?;

        info!(
            session = session.name(),
            generation,
            chunk_count = handle.chunk_count(),
            location = %handle.location().display(),
            "index rebuilt"
        );

        let report = RebuildReport {
            generation: Some(generation),
            chunk_count: handle.chunk_count(),
            warnings,
        };
        session.set_index(handle);
        Ok(report)
    }

    /// Releases the session's index and storage. Never fails; anything left
    /// behind is reported as a warning.
    pub async fn destroy(&self, session: &mut Session) -> Vec<LifecycleWarning> {
        if let Some(handle) = session.take_index() {
            handle.close(self.storage.as_ref()).await;
        }

        let location = session.storage_location().to_path_buf();
        match self.release_storage(&location).await {
            Ok(warning) => warning.into_iter().collect(),
            Err(cause) => {
                warn!(
                    session = session.name(),
                    location = %location.display(),
                    %cause,
                    "index storage leaked on delete"
                );
                vec![LifecycleWarning::StorageLeaked { location, cause }]
            }
        }
    }

    async fn embed_chunks(&self, chunks: &[Chunk]) -> Result<Vec<IndexedChunk>, IndexError> {
        let dimensions = self.embedder.dimensions();
        let mut entries = Vec::with_capacity(chunks.len());

        for chunk in chunks {
            let vector = self
                .embedder
                .embed(&chunk.content)
                .await
                .map_err(|error| IndexError::Embedding {
                    source_name: chunk.source_name.clone(),
                    details: error.to_string(),
                })?;

            if vector.len() != dimensions {
                return Err(IndexError::DimensionMismatch {
                    expected: dimensions,
                    found: vector.len(),
                });
            }

            entries.push(IndexedChunk {
                chunk: chunk.clone(),
                vector,
            });
        }

        Ok(entries)
    }

    async fn persist(
        &self,
        entries: Vec<IndexedChunk>,
        location: &Path,
        generation: u64,
    ) -> Result<IndexHandle, IndexError> {
        let index = StoredIndex::new(generation, self.embedder.dimensions(), entries);
        self.storage.build_from(location, &index).await?;

        Ok(IndexHandle {
            generation,
            location: location.to_path_buf(),
            chunk_count: index.entries.len(),
            dimensions: index.dimensions,
            built_at: index.built_at,
        })
    }

    /// Closes the live handle and clears the session's storage location so a
    /// new generation can be written there.
    async fn teardown(&self, session: &mut Session) -> Vec<LifecycleWarning> {
        if let Some(handle) = session.take_index() {
            handle.close(self.storage.as_ref()).await;
        }

        let location = session.storage_location().to_path_buf();
        match self.release_storage(&location).await {
            Ok(warning) => warning.into_iter().collect(),
            Err(cause) => {
                let fresh = allocate_location(&self.storage_root);
                warn!(
                    session = session.name(),
                    from = %location.display(),
                    to = %fresh.display(),
                    %cause,
                    "index storage could not be released; moving session"
                );
                session.move_storage(fresh.clone());
                vec![LifecycleWarning::Relocated {
                    from: location,
                    to: fresh,
                    cause,
                }]
            }
        }
    }

    /// Removes `location`, retrying after reclaim passes and finally moving it
    /// to a quarantine path. `Err` carries the cause when even that failed.
    async fn release_storage(&self, location: &Path) -> Result<Option<LifecycleWarning>, String> {
        if !self.storage.exists(location).await {
            return Ok(None);
        }

        let mut last_error = match self.storage.remove(location).await {
            Ok(()) => return Ok(None),
            Err(error) => error,
        };

        for attempt in 1..=self.release_retries {
            debug!(
                location = %location.display(),
                attempt,
                error = %last_error,
                "index storage still locked; reclaiming"
            );
            self.storage.reclaim(location).await;
            tokio::time::sleep(self.release_backoff * attempt).await;

            match self.storage.remove(location).await {
                Ok(()) => return Ok(None),
                Err(error) => last_error = error,
            }
        }

        let quarantine = quarantine_path(location);
        match self.storage.relocate(location, &quarantine).await {
            Ok(()) => {
                warn!(
                    location = %location.display(),
                    quarantine = %quarantine.display(),
                    error = %last_error,
                    "index storage quarantined"
                );
                Ok(Some(LifecycleWarning::Quarantined {
                    location: location.to_path_buf(),
                    quarantine,
                    cause: last_error.to_string(),
                }))
            }
            Err(error) => Err(format!("{last_error}; quarantine failed: {error}")),
        }
    }
}
