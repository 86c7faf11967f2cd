
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::RagError;
use crate::document::Document;

/// Represents a chunk of a document ready for embedding
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// The chunk text
    pub text: String,
    /// Ordinal index of this chunk within its document
    pub chunk_index: usize,
    /// Total number of chunks produced for the document
    pub chunk_count: usize,
    /// Source path of the document
    pub source_path: String,
    /// Character offset of the chunk start within the document
    pub start_offset: usize,
    /// When the chunk was produced
    pub created_at: DateTime<Utc>,
}

/// A window of text with its character offsets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextWindow {
    pub text: String,
    /// Inclusive start, in characters
    pub start: usize,
    /// Exclusive end, in characters
    pub end: usize,
}

/// Configuration for fixed-size windowing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Window size in characters
    pub chunk_size: usize,
    /// Characters shared between adjacent windows
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
        }
    }
}

/// Split `text` into windows of `chunk_size` characters where each window
/// starts `chunk_size - overlap` characters after the previous one.
///
/// Windowing stops at the first window that reaches the end of the text, so
/// every adjacent pair shares exactly `overlap` characters. Text no longer
/// than `chunk_size` yields a single window; empty text yields none.
#[inline]
pub fn split_windows(
    text: &str,
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<TextWindow>, RagError> {
    if chunk_size == 0 {
        return Err(RagError::Config(
            "chunk size must be greater than zero".to_string(),
        ));
    }
    if overlap >= chunk_size {
        return Err(RagError::Config(format!(
            "chunk overlap ({}) must be smaller than chunk size ({})",
            overlap, chunk_size
        )));
    }

    // Byte offset of every character start, plus the end of the text
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(offset, _)| offset)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_count = boundaries.len() - 1;

    let mut windows = Vec::new();
    if char_count == 0 {
        return Ok(windows);
    }

    let stride = chunk_size - overlap;
    let mut start: usize = 0;
    loop {
        let end = start.saturating_add(chunk_size).min(char_count);
        let window_text = text
            .get(boundaries[start]..boundaries[end])
            .ok_or_else(|| RagError::Config("window fell outside the text".to_string()))?;

        windows.push(TextWindow {
            text: window_text.to_string(),
            start,
            end,
        });

        if end == char_count {
            break;
        }
        start += stride;
    }

    Ok(windows)
}

/// Chunk a document into overlapping fixed-size windows
#[inline]
pub fn chunk_document(document: &Document, config: &ChunkingConfig) -> Result<Vec<Chunk>, RagError> {
    let windows = split_windows(&document.text, config.chunk_size, config.chunk_overlap)?;
    let chunk_count = windows.len();
    let source_path = document.source_path();
    let created_at = Utc::now();

    let chunks: Vec<Chunk> = windows
        .into_iter()
        .enumerate()
        .map(|(chunk_index, window)| Chunk {
            text: window.text,
            chunk_index,
            chunk_count,
            source_path: source_path.clone(),
            start_offset: window.start,
            created_at,
        })
        .collect();

    debug!(
        "Chunked '{}' into {} chunks (size {}, overlap {})",
        source_path,
        chunks.len(),
        config.chunk_size,
        config.chunk_overlap
    );

    Ok(chunks)
}
