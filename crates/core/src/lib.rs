pub mod chunking;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod generation;
pub mod ingest;
pub mod lifecycle;
pub mod models;
pub mod query;
pub mod registry;
pub mod services;
pub mod session;
pub mod store;
pub mod stores;
pub mod traits;

#[cfg(test)]
mod testing;

pub use chunking::{chunk_document, chunk_documents, normalize_whitespace, split, ChunkingConfig};
pub use embeddings::{CharacterNgramEmbedder, Embedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{IndexError, IngestError, QueryError, ServiceError, SessionError};
pub use extractor::{extract_document_text, DocumentKind, LopdfExtractor, PageText, PdfExtractor};
pub use generation::{ChatMessage, ChatRole, EchoGenerator, Generator};
pub use ingest::{discover_documents, load_document, load_documents, LoadReport, SkippedDocument};
pub use lifecycle::{IndexHandle, IndexLifecycle, LifecycleWarning, RebuildReport};
pub use models::{Chunk, RagConfig, RetrievedChunk, SourceDocument, Speaker, Turn};
pub use query::{Answer, AnswerRoute, QueryExecutor};
pub use registry::SessionRegistry;
pub use services::{GeminiConfig, GeminiEmbedder, GeminiGenerator};
pub use session::{IndexState, Session};
pub use store::{IndexedChunk, StoredIndex};
pub use stores::DiskIndexStore;
pub use traits::IndexStorage;
