//! Collaborator fakes shared by the unit tests.

use crate::embeddings::{CharacterNgramEmbedder, Embedder};
use crate::error::{IndexError, ServiceError};
use crate::generation::{ChatMessage, Generator};
use crate::models::{RagConfig, RetrievedChunk};
use crate::store::StoredIndex;
use crate::stores::DiskIndexStore;
use crate::traits::IndexStorage;
use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub const TEST_DIMENSIONS: usize = 16;

pub fn test_config(storage_root: &Path) -> RagConfig {
    RagConfig {
        chunk_size: 10,
        chunk_overlap: 2,
        top_k: 2,
        release_retries: 3,
        release_backoff: Duration::from_millis(1),
        storage_root: storage_root.to_path_buf(),
        history_window: None,
    }
}

/// Trigram embedder that fails for any text containing `poison`, when set.
#[derive(Default)]
pub struct FlakyEmbedder {
    poison: Option<String>,
    calls: AtomicUsize,
}

impl FlakyEmbedder {
    pub fn failing_on(poison: &str) -> Self {
        Self {
            poison: Some(poison.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for FlakyEmbedder {
    fn dimensions(&self) -> usize {
        TEST_DIMENSIONS
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(poison) = &self.poison {
            if text.contains(poison.as_str()) {
                return Err(ServiceError::Request("quota exceeded".to_string()));
            }
        }
        Ok(CharacterNgramEmbedder {
            dimensions: TEST_DIMENSIONS,
        }
        .embed_sync(text))
    }
}

/// Disk store whose removals can be made to fail, simulating storage that
/// stays locked after release. Index writes can be made to fail as well.
#[derive(Default)]
pub struct LockingStore {
    inner: DiskIndexStore,
    locked_removals: AtomicU32,
    refuse_relocation: AtomicBool,
    failed_builds: AtomicU32,
    reclaims: AtomicU32,
    searches: AtomicU32,
    builds: AtomicU32,
}

impl LockingStore {
    /// The next `attempts` removals fail with a lock error.
    pub fn lock_for(&self, attempts: u32) {
        self.locked_removals.store(attempts, Ordering::SeqCst);
    }

    /// The next `attempts` index writes fail as if the disk were full.
    pub fn fail_builds(&self, attempts: u32) {
        self.failed_builds.store(attempts, Ordering::SeqCst);
    }

    pub fn refuse_relocation(&self) {
        self.refuse_relocation.store(true, Ordering::SeqCst);
    }

    pub fn reclaims(&self) -> u32 {
        self.reclaims.load(Ordering::SeqCst)
    }

    pub fn searches(&self) -> u32 {
        self.searches.load(Ordering::SeqCst)
    }

    pub fn builds(&self) -> u32 {
        self.builds.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IndexStorage for LockingStore {
    async fn build_from(&self, location: &Path, index: &StoredIndex) -> Result<(), IndexError> {
        let failing = self
            .failed_builds
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(IndexError::Storage("disk full".to_string()));
        }
        self.builds.fetch_add(1, Ordering::SeqCst);
        self.inner.build_from(location, index).await
    }

    async fn similarity_search(
        &self,
        location: &Path,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, IndexError> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        self.inner
            .similarity_search(location, query_vector, top_k)
            .await
    }

    async fn release(&self, location: &Path) {
        self.inner.release(location).await;
    }

    async fn reclaim(&self, location: &Path) {
        self.reclaims.fetch_add(1, Ordering::SeqCst);
        self.inner.reclaim(location).await;
    }

    async fn remove(&self, location: &Path) -> Result<(), IndexError> {
        let locked = self
            .locked_removals
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if locked {
            return Err(IndexError::StorageLock {
                location: location.to_path_buf(),
                details: "finalizer has not run yet".to_string(),
            });
        }
        self.inner.remove(location).await
    }

    async fn relocate(&self, from: &Path, to: &Path) -> Result<(), IndexError> {
        if self.refuse_relocation.load(Ordering::SeqCst) {
            return Err(IndexError::Storage("rename refused".to_string()));
        }
        self.inner.relocate(from, to).await
    }

    async fn exists(&self, location: &Path) -> bool {
        self.inner.exists(location).await
    }
}

/// Generator that records every request and replies with a fixed text.
#[derive(Default)]
pub struct RecordingGenerator {
    fail: bool,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl RecordingGenerator {
    pub fn failing() -> Self {
        Self {
            fail: true,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().map(|guard| guard.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Generator for RecordingGenerator {
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String, ServiceError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(messages.to_vec());
        }
        if self.fail {
            return Err(ServiceError::BackendResponse {
                backend: "fake".to_string(),
                details: "503 Service Unavailable".to_string(),
            });
        }
        Ok("generated answer".to_string())
    }
}
