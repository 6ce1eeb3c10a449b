#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::{RagError, Result};

/// Maximum characters per token for the offset-preserving tokenizer.
///
/// Approximates the original deployment's `1 token ~= 4 characters`
/// heuristic while keeping exact byte offsets, so CJK text without
/// whitespace still splits into reasonably sized chunks.
const MAX_TOKEN_CHARS: usize = 4;

/// Sentence-ending characters for multilingual text.
const SENTENCE_ENDINGS: [char; 6] = ['.', '!', '?', '\u{3002}', '\u{FF01}', '\u{FF1F}'];

/// A chunk of document text ready for embedding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// The chunk text, a verbatim slice of the source document
    pub text: String,
    /// Start byte offset into the source text
    pub start_index: usize,
    /// End byte offset into the source text (exclusive)
    pub end_index: usize,
    /// 0-based position of this chunk within the document
    pub chunk_index: usize,
    /// Token count of the chunk text
    pub token_count: usize,
}

/// Strategy used to split a document into chunks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChunkingMethod {
    #[default]
    Sentence,
    Token,
    Paragraph,
}

impl fmt::Display for ChunkingMethod {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ChunkingMethod::Sentence => write!(f, "sentence"),
            ChunkingMethod::Token => write!(f, "token"),
            ChunkingMethod::Paragraph => write!(f, "paragraph"),
        }
    }
}

impl FromStr for ChunkingMethod {
    type Err = RagError;

    #[inline]
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sentence" => Ok(ChunkingMethod::Sentence),
            "token" => Ok(ChunkingMethod::Token),
            "paragraph" => Ok(ChunkingMethod::Paragraph),
            other => Err(RagError::InvalidInput(format!(
                "Unknown chunking method '{}' (expected 'sentence', 'token', or 'paragraph')",
                other
            ))),
        }
    }
}

/// Configuration for document chunking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Strategy selector
    pub method: ChunkingMethod,
    /// Token budget per chunk
    pub chunk_size: usize,
    /// Tokens shared between consecutive chunks
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            method: ChunkingMethod::Sentence,
            chunk_size: 512,
            chunk_overlap: 50,
        }
    }
}

impl ChunkingConfig {
    /// Reject invalid parameters before any chunking work begins.
    #[inline]
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RagError::Configuration(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::Configuration(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

/// Byte range into the source text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    start: usize,
    end: usize,
}

/// A token with its byte offsets in the source text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Token {
    start: usize,
    end: usize,
}

/// Split text into offset-preserving tokens.
///
/// A token is a maximal run of non-whitespace characters, further split
/// into pieces of at most `MAX_TOKEN_CHARS` characters.
fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut start: Option<usize> = None;
    let mut chars_in_token = 0;

    for (i, ch) in text.char_indices() {
        if ch.is_whitespace() {
            if let Some(s) = start.take() {
                tokens.push(Token { start: s, end: i });
                chars_in_token = 0;
            }
        } else {
            if start.is_none() {
                start = Some(i);
            }
            chars_in_token += 1;
            if chars_in_token == MAX_TOKEN_CHARS {
                let end = i + ch.len_utf8();
                if let Some(s) = start.take() {
                    tokens.push(Token { start: s, end });
                }
                chars_in_token = 0;
            }
        }
    }

    if let Some(s) = start {
        tokens.push(Token {
            start: s,
            end: text.len(),
        });
    }

    tokens
}

/// Count tokens in text using the same tokenizer the chunker uses
#[inline]
pub fn count_tokens(text: &str) -> usize {
    tokenize(text).len()
}

/// Chunk a document using the configured strategy.
///
/// Deterministic: the same `(text, config)` pair always yields the same
/// sequence. Empty or whitespace-only text yields an empty Vec.
#[inline]
pub fn chunk(text: &str, config: &ChunkingConfig) -> Result<Vec<TextChunk>> {
    config.validate()?;

    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let spans = match config.method {
        ChunkingMethod::Sentence => {
            // A lone sentence over budget is hard-split at the budget
            // boundary, without overlap between the split pieces.
            pack_units(text, &split_sentences(text), config, 0)
        }
        ChunkingMethod::Token => window_tokens(&tokenize(text), config.chunk_size, config.chunk_overlap),
        ChunkingMethod::Paragraph => {
            // Oversized paragraphs fall back to token windows with the
            // configured overlap.
            pack_units(text, &split_paragraphs(text), config, config.chunk_overlap)
        }
    };

    let chunks: Vec<TextChunk> = spans
        .into_iter()
        .enumerate()
        .map(|(chunk_index, span)| {
            let chunk_text = &text[span.start..span.end];
            TextChunk {
                text: chunk_text.to_string(),
                start_index: span.start,
                end_index: span.end,
                chunk_index,
                token_count: count_tokens(chunk_text),
            }
        })
        .collect();

    debug!(
        "Chunked {} bytes into {} chunks using '{}' strategy",
        text.len(),
        chunks.len(),
        config.method
    );

    Ok(chunks)
}

/// Trim whitespace from both ends of a byte range, returning `None` for
/// all-whitespace ranges.
fn trim_span(text: &str, start: usize, end: usize) -> Option<Span> {
    let slice = &text[start..end];
    let front_trimmed = slice.trim_start();
    let new_start = start + (slice.len() - front_trimmed.len());
    let fully_trimmed = front_trimmed.trim_end();
    let new_end = new_start + fully_trimmed.len();
    (new_start < new_end).then_some(Span {
        start: new_start,
        end: new_end,
    })
}

/// Split text into sentence spans on multilingual sentence boundaries.
///
/// A sentence ends after a run of ending punctuation followed by
/// whitespace (or end of text).
fn split_sentences(text: &str) -> Vec<Span> {
    let mut spans = Vec::new();
    let mut start = 0;
    let mut prev_was_ending = false;

    for (i, ch) in text.char_indices() {
        if prev_was_ending && ch.is_whitespace() {
            if let Some(span) = trim_span(text, start, i) {
                spans.push(span);
            }
            start = i;
            prev_was_ending = false;
        } else {
            prev_was_ending = SENTENCE_ENDINGS.contains(&ch);
        }
    }

    if let Some(span) = trim_span(text, start, text.len()) {
        spans.push(span);
    }

    spans
}

/// Split text into paragraph spans on blank-line boundaries.
fn split_paragraphs(text: &str) -> Vec<Span> {
    let mut spans = Vec::new();
    let mut para_start: Option<usize> = None;
    let mut offset = 0;

    for line in text.split('\n') {
        let line_end = offset + line.len();
        if line.trim().is_empty() {
            if let Some(start) = para_start.take()
                && let Some(span) = trim_span(text, start, offset)
            {
                spans.push(span);
            }
        } else if para_start.is_none() {
            para_start = Some(offset);
        }
        // Skip past the newline separator
        offset = line_end + 1;
    }

    if let Some(start) = para_start
        && let Some(span) = trim_span(text, start, text.len())
    {
        spans.push(span);
    }

    spans
}

/// Slide a fixed-size token window across tokenized text.
///
/// The window advances by `size - overlap` tokens per step; the last
/// window is clipped to the remaining tokens.
fn window_tokens(tokens: &[Token], size: usize, overlap: usize) -> Vec<Span> {
    let mut spans = Vec::new();
    if tokens.is_empty() {
        return spans;
    }

    let step = size - overlap;
    let mut start = 0;
    loop {
        let end = (start + size).min(tokens.len());
        spans.push(Span {
            start: tokens[start].start,
            end: tokens[end - 1].end,
        });
        if end == tokens.len() {
            break;
        }
        start += step;
    }

    spans
}

/// Greedily pack unit spans (sentences or paragraphs) into chunks within
/// the token budget, repeating trailing units that fit within the overlap
/// budget at the start of the next chunk.
///
/// Units that alone exceed the budget are token-windowed with
/// `oversize_overlap` tokens of overlap between the resulting pieces.
fn pack_units(text: &str, units: &[Span], config: &ChunkingConfig, oversize_overlap: usize) -> Vec<Span> {
    let unit_tokens: Vec<usize> = units
        .iter()
        .map(|u| count_tokens(&text[u.start..u.end]))
        .collect();

    let mut chunks = Vec::new();
    // Indices into `units` making up the chunk under construction
    let mut current: Vec<usize> = Vec::new();
    let mut current_tokens = 0;

    let flush = |current: &mut Vec<usize>, current_tokens: &mut usize, chunks: &mut Vec<Span>| {
        if let (Some(&first), Some(&last)) = (current.first(), current.last()) {
            chunks.push(Span {
                start: units[first].start,
                end: units[last].end,
            });
        }
        current.clear();
        *current_tokens = 0;
    };

    for (i, &tokens) in unit_tokens.iter().enumerate() {
        if tokens > config.chunk_size {
            // Unit alone exceeds the budget: emit what we have, then
            // split the unit itself at token boundaries.
            flush(&mut current, &mut current_tokens, &mut chunks);
            let unit = units[i];
            let inner = tokenize(&text[unit.start..unit.end]);
            for span in window_tokens(&inner, config.chunk_size, oversize_overlap) {
                chunks.push(Span {
                    start: unit.start + span.start,
                    end: unit.start + span.end,
                });
            }
            continue;
        }

        if current.is_empty() {
            current.push(i);
            current_tokens = tokens;
            continue;
        }

        if current_tokens + tokens <= config.chunk_size {
            current.push(i);
            current_tokens += tokens;
            continue;
        }

        // Budget exceeded: emit the chunk, then seed the next one with a
        // proper suffix of its units that fits within the overlap budget.
        // Excluding the first unit guarantees strictly increasing chunk
        // start offsets.
        let mut tail: Vec<usize> = Vec::new();
        let mut tail_tokens = 0;
        for &prev in current.iter().skip(1).rev() {
            let prev_tokens = unit_tokens[prev];
            if tail_tokens + prev_tokens <= config.chunk_overlap
                && tail_tokens + prev_tokens + tokens <= config.chunk_size
            {
                tail.push(prev);
                tail_tokens += prev_tokens;
            } else {
                break;
            }
        }
        tail.reverse();

        flush(&mut current, &mut current_tokens, &mut chunks);
        current = tail;
        current.push(i);
        current_tokens = tail_tokens + tokens;
    }

    flush(&mut current, &mut current_tokens, &mut chunks);
    chunks
}
