use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("unsupported document type: {0}")]
    UnsupportedDocument(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),
}

/// Failures reported by the external embedding and generation services.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("request failed: {0}")]
    Request(String),

    #[error("{0} returned an empty response")]
    EmptyResponse(String),
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error(transparent)]
    Chunking(#[from] IngestError),

    #[error("embedding failed for {source_name}: {details}")]
    Embedding { source_name: String, details: String },

    #[error("embedding dimension {found} does not match {expected}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("storage at {} is still locked: {details}", .location.display())]
    StorageLock { location: PathBuf, details: String },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session name must not be blank")]
    InvalidName,

    #[error("session already exists: {0}")]
    DuplicateName(String),

    #[error("session not found: {0}")]
    NotFound(String),

    #[error("no session is selected")]
    NoSelection,

    #[error("document index {index} is out of range for {len} document(s)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Answer failures. These are rendered into the answer text rather than
/// returned to the caller.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("Retrieval error: {0}")]
    Retrieval(String),

    #[error("Generation error: {0}")]
    Generation(String),
}

pub type Result<T, E = SessionError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_lock_names_the_location() {
        let error = IndexError::StorageLock {
            location: PathBuf::from("/tmp/ragify_index/index_abc"),
            details: "reader still open".to_string(),
        };
        let rendered = error.to_string();
        assert!(rendered.contains("/tmp/ragify_index/index_abc"));
        assert!(rendered.contains("reader still open"));
    }

    #[test]
    fn chunking_errors_pass_through_index_errors() {
        let error: IndexError = IngestError::InvalidChunkConfig("overlap 10 >= size 10".into()).into();
        assert_eq!(error.to_string(), "invalid chunking config: overlap 10 >= size 10");

        let wrapped: SessionError = error.into();
        assert!(wrapped.to_string().contains("overlap 10"));
    }
}
