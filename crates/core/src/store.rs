use crate::embeddings::cosine_similarity;
use crate::models::{Chunk, RetrievedChunk};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const INDEX_FILE_NAME: &str = "index.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedChunk {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// The persisted form of one index generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredIndex {
    pub generation: u64,
    pub dimensions: usize,
    pub built_at: DateTime<Utc>,
    pub entries: Vec<IndexedChunk>,
}

impl StoredIndex {
    pub fn new(generation: u64, dimensions: usize, entries: Vec<IndexedChunk>) -> Self {
        Self {
            generation,
            dimensions,
            built_at: Utc::now(),
            entries,
        }
    }

    pub fn search(&self, query_vector: &[f32], top_k: usize) -> Vec<RetrievedChunk> {
        let mut scored = self
            .entries
            .iter()
            .map(|entry| RetrievedChunk {
                chunk: entry.chunk.clone(),
                score: cosine_similarity(query_vector, &entry.vector),
            })
            .collect::<Vec<_>>();

        // Stable sort keeps insertion order between equal scores.
        scored.sort_by(|left, right| right.score.total_cmp(&left.score));
        scored.truncate(top_k);
        scored
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, vector: Vec<f32>) -> IndexedChunk {
        IndexedChunk {
            chunk: Chunk {
                chunk_id: name.to_string(),
                source_name: format!("{name}.txt"),
                ordinal: 0,
                content: name.to_string(),
            },
            vector,
        }
    }

    #[test]
    fn search_ranks_by_cosine_and_truncates() {
        let index = StoredIndex::new(
            1,
            2,
            vec![
                entry("east", vec![1.0, 0.0]),
                entry("north", vec![0.0, 1.0]),
                entry("northeast", vec![1.0, 1.0]),
            ],
        );

        let hits = index.search(&[0.0, 1.0], 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.chunk_id, "north");
        assert_eq!(hits[1].chunk.chunk_id, "northeast");
    }

    #[test]
    fn search_on_empty_index_is_empty() {
        let index = StoredIndex::new(1, 2, Vec::new());
        assert!(index.search(&[1.0, 0.0], 4).is_empty());
    }
}
