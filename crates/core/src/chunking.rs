use crate::error::IngestError;
use crate::models::{Chunk, RagConfig, SourceDocument};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
}

impl From<&RagConfig> for ChunkingConfig {
    fn from(value: &RagConfig) -> Self {
        Self {
            max_chars: value.chunk_size,
            overlap_chars: value.chunk_overlap,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.max_chars == 0 || self.overlap_chars >= self.max_chars {
            return Err(IngestError::InvalidChunkConfig(format!(
                "require 0 <= overlap ({}) < chunk size ({})",
                self.overlap_chars, self.max_chars
            )));
        }
        Ok(())
    }
}

pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('\u{a0}', " ")
}

/// Lazy iterator over fixed-size character windows of a text.
///
/// Windows are `max_chars` characters long and start `max_chars - overlap_chars`
/// characters apart. Only the last window may be shorter.
#[derive(Debug, Clone)]
pub struct TextWindows<'a> {
    text: &'a str,
    boundaries: Vec<usize>,
    start: usize,
    size: usize,
    step: usize,
    finished: bool,
}

impl<'a> Iterator for TextWindows<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        let char_count = self.boundaries.len() - 1;
        if self.finished || self.start >= char_count {
            return None;
        }

        let end = (self.start + self.size).min(char_count);
        let piece = &self.text[self.boundaries[self.start]..self.boundaries[end]];
        if end == char_count {
            self.finished = true;
        } else {
            self.start += self.step;
        }
        Some(piece)
    }
}

pub fn split(text: &str, chunk_size: usize, overlap: usize) -> Result<TextWindows<'_>, IngestError> {
    ChunkingConfig {
        max_chars: chunk_size,
        overlap_chars: overlap,
    }
    .validate()?;

    let boundaries = text
        .char_indices()
        .map(|(offset, _)| offset)
        .chain(std::iter::once(text.len()))
        .collect();

    Ok(TextWindows {
        text,
        boundaries,
        start: 0,
        size: chunk_size,
        step: chunk_size - overlap,
        finished: false,
    })
}

pub fn chunk_document(
    document: &SourceDocument,
    config: ChunkingConfig,
) -> Result<impl Iterator<Item = Chunk> + '_, IngestError> {
    let windows = split(&document.text, config.max_chars, config.overlap_chars)?;
    Ok(windows.enumerate().map(move |(ordinal, piece)| Chunk {
        chunk_id: make_chunk_id(&document.source_name, ordinal as u64, piece),
        source_name: document.source_name.clone(),
        ordinal: ordinal as u64,
        content: piece.to_string(),
    }))
}

/// Chunks every document in order, preserving document insertion order.
pub fn chunk_documents(
    documents: &[SourceDocument],
    config: ChunkingConfig,
) -> Result<Vec<Chunk>, IngestError> {
    let mut chunks = Vec::new();
    for document in documents {
        chunks.extend(chunk_document(document, config)?);
    }
    Ok(chunks)
}

fn make_chunk_id(source_name: &str, ordinal: u64, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_name.as_bytes());
    hasher.update(ordinal.to_le_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
