//! Overlapping text chunking.

/// Window searched backwards for a sentence end before cutting a chunk.
const SENTENCE_LOOKBACK: usize = 200;

/// Split `text` into windows of at most `chunk_size` characters, each
/// starting `overlap` characters before the previous one ended.
///
/// When a window does not reach the end of the text it is cut after the
/// last `.` in its final 200 characters, if there is one far enough past
/// the window start for the next window to advance. Chunks are
/// whitespace-trimmed and empty ones dropped.
pub fn split_into_chunks(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    let chunk_size = chunk_size.max(1);
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < len {
        let mut end = (start + chunk_size).min(len);

        if end < len {
            let floor = (start + chunk_size).saturating_sub(SENTENCE_LOOKBACK).max(start);
            if let Some(dot) = (floor..end).rev().find(|&i| chars[i] == '.') {
                // The cut must leave the next window starting past this one.
                if dot > start && dot + 1 > start + overlap {
                    end = dot + 1;
                }
            }
        }

        let chunk: String = chars[start..end].iter().collect();
        let chunk = chunk.trim();
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }

        if end >= len {
            break;
        }
        // Always advance, even when the overlap would reach back past `start`.
        start = end.saturating_sub(overlap).max(start + 1);
    }

    chunks
}
