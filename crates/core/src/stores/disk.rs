use crate::error::IndexError;
use crate::models::RetrievedChunk;
use crate::store::{StoredIndex, INDEX_FILE_NAME};
use crate::traits::IndexStorage;
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Stores each index as `<location>/index.json`.
///
/// Loaded indexes are kept open in memory until released. A location whose
/// open index is still shared with a reader cannot be removed.
#[derive(Debug, Default)]
pub struct DiskIndexStore {
    open: Mutex<HashMap<PathBuf, Arc<StoredIndex>>>,
}

impl DiskIndexStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn open_indexes(&self) -> MutexGuard<'_, HashMap<PathBuf, Arc<StoredIndex>>> {
        self.open
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns the index at `location`, loading it from disk on first use.
    /// The returned reference keeps the location locked until dropped.
    pub async fn open(&self, location: &Path) -> Result<Arc<StoredIndex>, IndexError> {
        if let Some(index) = self.open_indexes().get(location) {
            return Ok(Arc::clone(index));
        }

        let bytes = tokio::fs::read(location.join(INDEX_FILE_NAME)).await?;
        let index = Arc::new(serde_json::from_slice::<StoredIndex>(&bytes)?);
        debug!(
            location = %location.display(),
            generation = index.generation,
            entries = index.entries.len(),
            "opened index"
        );

        let mut open = self.open_indexes();
        let entry = open
            .entry(location.to_path_buf())
            .or_insert_with(|| Arc::clone(&index));
        Ok(Arc::clone(entry))
    }
}

#[async_trait]
impl IndexStorage for DiskIndexStore {
    async fn build_from(&self, location: &Path, index: &StoredIndex) -> Result<(), IndexError> {
        let target = location.join(INDEX_FILE_NAME);
        if tokio::fs::try_exists(&target).await.unwrap_or(false) {
            return Err(IndexError::Storage(format!(
                "location already holds an index: {}",
                location.display()
            )));
        }

        tokio::fs::create_dir_all(location).await?;
        let staging = location.join(format!("{INDEX_FILE_NAME}.tmp"));
        tokio::fs::write(&staging, serde_json::to_vec(index)?).await?;
        tokio::fs::rename(&staging, &target).await?;
        Ok(())
    }

    async fn similarity_search(
        &self,
        location: &Path,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, IndexError> {
        let index = self.open(location).await?;
        if query_vector.len() != index.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: index.dimensions,
                found: query_vector.len(),
            });
        }
        Ok(index.search(query_vector, top_k))
    }

    async fn release(&self, location: &Path) {
        if self.open_indexes().remove(location).is_some() {
            debug!(location = %location.display(), "released index");
        }
    }

    async fn remove(&self, location: &Path) -> Result<(), IndexError> {
        {
            let mut open = self.open_indexes();
            if let Some(index) = open.get(location) {
                if Arc::strong_count(index) > 1 {
                    return Err(IndexError::StorageLock {
                        location: location.to_path_buf(),
                        details: "index is still held open by a reader".to_string(),
                    });
                }
            }
            open.remove(location);
        }

        match tokio::fs::remove_dir_all(location).await {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            Err(error) => Err(IndexError::StorageLock {
                location: location.to_path_buf(),
                details: error.to_string(),
            }),
        }
    }

    async fn relocate(&self, from: &Path, to: &Path) -> Result<(), IndexError> {
        self.open_indexes().remove(from);
        tokio::fs::rename(from, to).await.map_err(|error| {
            IndexError::Storage(format!(
                "cannot move {} to {}: {error}",
                from.display(),
                to.display()
            ))
        })
    }

    async fn exists(&self, location: &Path) -> bool {
        tokio::fs::try_exists(location).await.unwrap_or(false)
    }
}
