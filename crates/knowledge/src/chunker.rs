//! Text chunking with configurable size and overlap.

use crate::types::ChunkCandidate;

/// Chunk text into overlapping segments.
///
/// Sizes are in bytes, adjusted to the nearest UTF-8 character boundary.
/// Chunks that are blank after trimming are dropped.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<ChunkCandidate> {
    if text.trim().is_empty() || chunk_size == 0 {
        return vec![];
    }

    let step = if chunk_size > overlap {
        chunk_size - overlap
    } else {
        chunk_size
    };

    let mut chunks = Vec::new();
    let mut position = 0u32;
    let mut start = 0;

    while start < text.len() {
        // Find valid UTF-8 boundary for end position
        let mut end = (start + chunk_size).min(text.len());
        while end > start && !text.is_char_boundary(end) {
            end -= 1;
        }
        if end == start {
            // A single character wider than chunk_size
            end = start + 1;
            while end < text.len() && !text.is_char_boundary(end) {
                end += 1;
            }
        }

        let chunk = text[start..end].trim();
        if !chunk.is_empty() {
            chunks.push(ChunkCandidate {
                position,
                text: chunk.to_string(),
                start,
                end,
            });
            position += 1;
        }

        if end == text.len() {
            break;
        }

        // Find valid UTF-8 boundary for next start position
        let mut next_start = start + step;
        while next_start < text.len() && !text.is_char_boundary(next_start) {
            next_start += 1;
        }
        start = next_start;
    }

    tracing::debug!(
        "Chunked text into {} chunks (size: {}, overlap: {})",
        chunks.len(),
        chunk_size,
        overlap
    );

    chunks
}
