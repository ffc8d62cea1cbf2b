use crate::error::IndexError;
use crate::models::RetrievedChunk;
use crate::store::StoredIndex;
use async_trait::async_trait;
use std::path::Path;

/// Path-addressed persistent index storage. One location holds one index.
///
/// Releasing a location is not synchronous with the resources behind it: a
/// reader may still hold the index open, in which case `remove` fails with
/// [`IndexError::StorageLock`] until that reader is gone.
#[async_trait]
pub trait IndexStorage: Send + Sync {
    async fn build_from(&self, location: &Path, index: &StoredIndex) -> Result<(), IndexError>;

    async fn similarity_search(
        &self,
        location: &Path,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, IndexError>;

    /// Drops any resources this store keeps open for `location`.
    async fn release(&self, location: &Path);

    /// Forced finalization pass before a retried removal.
    async fn reclaim(&self, location: &Path) {
        self.release(location).await;
        tokio::task::yield_now().await;
    }

    async fn remove(&self, location: &Path) -> Result<(), IndexError>;

    async fn relocate(&self, from: &Path, to: &Path) -> Result<(), IndexError>;

    async fn exists(&self, location: &Path) -> bool;
}
