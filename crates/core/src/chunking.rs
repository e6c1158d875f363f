use crate::error::IngestError;
use regex::Regex;
use std::sync::OnceLock;

pub const DEFAULT_MAX_CHUNK_CHARS: usize = 1_000;
pub const DEFAULT_CHUNK_OVERLAP_CHARS: usize = 200;

#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_MAX_CHUNK_CHARS,
            overlap_chars: DEFAULT_CHUNK_OVERLAP_CHARS,
        }
    }
}

impl ChunkingConfig {
    pub fn new(max_chars: usize, overlap_chars: usize) -> Result<Self, IngestError> {
        if max_chars == 0 {
            return Err(IngestError::InvalidArgument(
                "max_chars must be greater than zero".to_string(),
            ));
        }
        if overlap_chars >= max_chars {
            return Err(IngestError::InvalidArgument(format!(
                "overlap_chars {overlap_chars} must be smaller than max_chars {max_chars}"
            )));
        }
        Ok(Self {
            max_chars,
            overlap_chars,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    pub text: String,
    pub index: usize,
}

pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('\u{a0}', " ")
}

/// Splits `text` into overlapping chunks of at most `max_chars` characters.
///
/// Splitting prefers the largest natural boundary that fits: paragraph
/// breaks, then line breaks, then sentence boundaries, then whitespace,
/// then raw characters. Adjacent small pieces are merged back together up
/// to the size bound, and every chunk after the first repeats the trailing
/// `overlap_chars` characters of its predecessor. Empty input yields zero
/// chunks. Output order matches the source text and indices are contiguous.
pub fn chunk_text(text: &str, config: &ChunkingConfig) -> Vec<TextChunk> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    // Pieces are bounded by max - overlap so the overlap prefix added later
    // can never push a chunk past max_chars.
    let body_limit = config
        .max_chars
        .saturating_sub(config.overlap_chars)
        .max(1);

    let mut pieces = Vec::new();
    split_pieces(text, 0, body_limit, &mut pieces);

    let mut bodies: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for piece in pieces {
        let piece_len = char_count(&piece);
        let cap = if bodies.is_empty() {
            config.max_chars
        } else {
            body_limit
        };

        if !current.is_empty() && current_len + piece_len > cap {
            bodies.push(std::mem::take(&mut current));
            current_len = 0;
        }

        current.push_str(&piece);
        current_len += piece_len;
    }

    if !current.is_empty() {
        bodies.push(current);
    }

    let mut chunks: Vec<TextChunk> = Vec::with_capacity(bodies.len());
    for (index, body) in bodies.into_iter().enumerate() {
        let text = if index == 0 {
            body
        } else {
            let tail = char_suffix(&chunks[index - 1].text, config.overlap_chars);
            format!("{tail}{body}")
        };
        chunks.push(TextChunk { text, index });
    }

    chunks
}

fn split_pieces(text: &str, level: usize, limit: usize, out: &mut Vec<String>) {
    if char_count(text) <= limit {
        if !text.is_empty() {
            out.push(text.to_string());
        }
        return;
    }

    match level {
        0 => {
            for part in text.split_inclusive("\n\n") {
                split_pieces(part, 1, limit, out);
            }
        }
        1 => {
            for part in text.split_inclusive('\n') {
                split_pieces(part, 2, limit, out);
            }
        }
        2 => {
            for part in sentence_pieces(text) {
                split_pieces(part, 3, limit, out);
            }
        }
        3 => {
            for part in text.split_inclusive(|c: char| c.is_whitespace()) {
                split_pieces(part, 4, limit, out);
            }
        }
        _ => {
            let chars: Vec<char> = text.chars().collect();
            let mut start = 0;
            while start < chars.len() {
                let end = (start + limit).min(chars.len());
                out.push(chars[start..end].iter().collect());
                start = end;
            }
        }
    }
}

fn sentence_boundary() -> &'static Regex {
    static BOUNDARY: OnceLock<Regex> = OnceLock::new();
    BOUNDARY.get_or_init(|| Regex::new(r"[.!?]\s+").expect("sentence boundary pattern is valid"))
}

// Each piece keeps its terminating punctuation and whitespace so that
// concatenating pieces reproduces the input exactly.
fn sentence_pieces(text: &str) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;

    for found in sentence_boundary().find_iter(text) {
        pieces.push(&text[start..found.end()]);
        start = found.end();
    }

    if start < text.len() {
        pieces.push(&text[start..]);
    }

    pieces
}

fn char_count(text: &str) -> usize {
    text.chars().count()
}

fn char_suffix(text: &str, chars: usize) -> &str {
    let total = char_count(text);
    if total <= chars {
        return text;
    }
    let skip = total - chars;
    text.char_indices()
        .nth(skip)
        .map_or(text, |(offset, _)| &text[offset..])
}
