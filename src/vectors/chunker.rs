//! Token-bounded transcript chunking.
//!
//! Chunks are contiguous substrings of the source text, so concatenating
//! them in index order reproduces the transcript byte-for-byte. Break points
//! prefer paragraph boundaries, then sentence boundaries, then word
//! boundaries; only an unbroken run longer than the budget is cut mid-word.
//! The same input always yields the same chunks.

use regex::Regex;

/// Rough token estimate: one token per four characters, rounded up. The
/// embedding API tokenizes server-side; this only has to bound chunk size,
/// not match the model's tokenizer exactly.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    pub index: usize,
    pub text: String,
    pub token_count: usize,
}

/// Split a transcript into chunks of at most `max_tokens` estimated tokens.
///
/// A trailing run of whitespace folds into the final chunk rather than
/// becoming a chunk of its own, so the final chunk may run slightly over
/// budget.
pub fn chunk_transcript(text: &str, max_tokens: usize) -> Vec<TextChunk> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    let max_tokens = max_tokens.max(1);
    let max_chars = max_tokens * 4;

    let paragraph_re = Regex::new(r"\n\s*\n").unwrap();
    let sentence_re = Regex::new(r#"[.!?]["')\]]*\s+"#).unwrap();
    let word_re = Regex::new(r"\s+").unwrap();

    let paragraph_breaks: Vec<usize> = paragraph_re.find_iter(text).map(|m| m.end()).collect();
    let sentence_breaks: Vec<usize> = sentence_re.find_iter(text).map(|m| m.end()).collect();
    let word_breaks: Vec<usize> = word_re.find_iter(text).map(|m| m.end()).collect();
    let char_offsets: Vec<usize> = text.char_indices().map(|(offset, _)| offset).collect();

    let mut chunks: Vec<TextChunk> = Vec::new();
    let mut start = 0usize;

    while start < text.len() {
        let rest = &text[start..];
        let mut end = if estimate_tokens(rest) <= max_tokens {
            text.len()
        } else {
            let start_pos = char_offsets.partition_point(|&offset| offset < start);
            let limit = char_offsets
                .get(start_pos + max_chars)
                .copied()
                .unwrap_or(text.len());
            pick_break(&paragraph_breaks, start, limit)
                .or_else(|| pick_break(&sentence_breaks, start, limit))
                .or_else(|| pick_break(&word_breaks, start, limit))
                .unwrap_or(limit)
        };

        if text[end..].trim().is_empty() {
            end = text.len();
        }

        let chunk_text = &text[start..end];
        chunks.push(TextChunk {
            index: chunks.len(),
            text: chunk_text.to_string(),
            token_count: estimate_tokens(chunk_text),
        });
        start = end;
    }

    chunks
}

/// Last candidate break strictly after `start` and at most `limit`.
fn pick_break(candidates: &[usize], start: usize, limit: usize) -> Option<usize> {
    let idx = candidates.partition_point(|&offset| offset <= limit);
    if idx == 0 {
        return None;
    }
    let offset = candidates[idx - 1];
    (offset > start).then_some(offset)
}
