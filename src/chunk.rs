//! Recursive character text splitter.
//!
//! Splits document content into overlapping [`Chunk`]s no longer than
//! `chunk_size` characters. Separators are tried in priority order
//! (paragraph, line, sentence, word, character); the first separator found
//! in the text is used, and only pieces that are still too long are split
//! again with the remaining separators.
//!
//! # Algorithm
//!
//! 1. Pick the first separator present in the text (`""` always matches).
//! 2. Split on it, keeping each separator attached to the start of the
//!    following piece so no characters are lost.
//! 3. Greedily merge consecutive short pieces into chunks of at most
//!    `chunk_size` characters. When a chunk is flushed, trailing pieces
//!    totalling at most `chunk_overlap` characters are carried over into
//!    the next one.
//! 4. Pieces of `chunk_size` characters or more are split recursively with
//!    the lower-priority separators.
//! 5. Chunks are whitespace-trimmed; empty chunks are dropped.
//!
//! Lengths and offsets are counted in characters, not bytes.
//!
//! # Example
//!
//! ```rust
//! use knowledge_index::chunk::TextSplitter;
//!
//! let splitter = TextSplitter::new(1000, 200);
//! let chunks = splitter.split_text("Hello world.\n\nSecond paragraph.");
//! assert_eq!(chunks, vec!["Hello world.\n\nSecond paragraph.".to_string()]);
//! ```

use std::collections::VecDeque;
use uuid::Uuid;

use crate::config::ChunkingConfig;
use crate::models::{Chunk, Document};

/// Default separator priority: paragraph, line, sentence, word, character.
pub const DEFAULT_SEPARATORS: [&str; 5] = ["\n\n", "\n", ". ", " ", ""];

#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn from_config(config: &ChunkingConfig) -> Self {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    pub fn with_separators(mut self, separators: Vec<String>) -> Self {
        self.separators = separators;
        self
    }

    /// Split raw text into chunk strings, in document order.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &self.separators)
    }

    /// Split a document into [`Chunk`]s carrying its metadata and the
    /// character offset at which each chunk starts.
    pub fn split_document(&self, doc: &Document) -> Vec<Chunk> {
        let text = &doc.content;
        let mut chunks = Vec::new();
        let mut index: i64 = 0;
        let mut previous_len: i64 = 0;

        for (i, piece) in self.split_text(text).into_iter().enumerate() {
            let from = (index + previous_len - self.chunk_overlap as i64).max(0) as usize;
            let start = find_chars(text, &piece, from)
                .or_else(|| find_chars(text, &piece, 0))
                .unwrap_or(from);
            index = start as i64;
            previous_len = char_len(&piece) as i64;

            chunks.push(Chunk {
                id: chunk_id(&doc.metadata.source, i),
                index: i,
                text: piece,
                start_index: start,
                metadata: doc.metadata.clone(),
            });
        }

        chunks
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        let mut final_chunks = Vec::new();

        let mut separator = separators.last().map(String::as_str).unwrap_or("");
        let mut remaining: &[String] = &[];
        for (i, sep) in separators.iter().enumerate() {
            if sep.is_empty() {
                separator = "";
                break;
            }
            if text.contains(sep.as_str()) {
                separator = sep;
                remaining = &separators[i + 1..];
                break;
            }
        }

        let mut good_splits: Vec<&str> = Vec::new();
        for piece in split_keeping_separator(text, separator) {
            if char_len(piece) < self.chunk_size {
                good_splits.push(piece);
                continue;
            }
            if !good_splits.is_empty() {
                final_chunks.extend(self.merge_splits(&good_splits));
                good_splits.clear();
            }
            if remaining.is_empty() {
                final_chunks.push(piece.to_string());
            } else {
                final_chunks.extend(self.split_recursive(piece, remaining));
            }
        }

        if !good_splits.is_empty() {
            final_chunks.extend(self.merge_splits(&good_splits));
        }

        final_chunks
    }

    /// Merge short pieces into chunks, carrying up to `chunk_overlap`
    /// characters of trailing pieces into the next chunk.
    fn merge_splits(&self, splits: &[&str]) -> Vec<String> {
        let mut docs = Vec::new();
        let mut current: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for &piece in splits {
            let len = char_len(piece);

            if total + len > self.chunk_size && !current.is_empty() {
                if let Some(doc) = join_pieces(&current) {
                    docs.push(doc);
                }
                while total > self.chunk_overlap || (total + len > self.chunk_size && total > 0) {
                    match current.pop_front() {
                        Some(front) => total -= char_len(front),
                        None => break,
                    }
                }
            }

            current.push_back(piece);
            total += len;
        }

        if let Some(doc) = join_pieces(&current) {
            docs.push(doc);
        }

        docs
    }
}

impl Default for TextSplitter {
    fn default() -> Self {
        Self::new(1000, 200)
    }
}

/// Deterministic record ID for the `index`-th chunk of `source`.
pub fn chunk_id(source: &str, index: usize) -> String {
    Uuid::new_v5(
        &Uuid::NAMESPACE_OID,
        format!("{}#{}", source, index).as_bytes(),
    )
    .to_string()
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Split `text` on `separator`, attaching each separator occurrence to the
/// start of the piece that follows it. An empty separator yields one piece
/// per character. Empty pieces are dropped.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }

    let mut pieces = Vec::new();
    let mut last = 0;
    for (pos, _) in text.match_indices(separator) {
        pieces.push(&text[last..pos]);
        last = pos;
    }
    pieces.push(&text[last..]);
    pieces.retain(|p| !p.is_empty());
    pieces
}

fn join_pieces(pieces: &VecDeque<&str>) -> Option<String> {
    let joined: String = pieces.iter().copied().collect();
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Character offset of `needle` in `haystack`, searching from character
/// offset `from`.
fn find_chars(haystack: &str, needle: &str, from: usize) -> Option<usize> {
    let byte_from = haystack
        .char_indices()
        .nth(from)
        .map(|(b, _)| b)
        .unwrap_or(haystack.len());
    haystack[byte_from..]
        .find(needle)
        .map(|b| from + char_len(&haystack[byte_from..byte_from + b]))
}
