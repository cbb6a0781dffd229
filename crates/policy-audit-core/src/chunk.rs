//! Page-aware paragraph chunker.
//!
//! Splits a document's pages into [`Chunk`]s of at most `max_tokens`
//! (approximated as 4 characters per token). Paragraphs (`\n\n`) are packed
//! greedily and may run across a page break; each chunk records the first
//! and last page it covers. A paragraph longer than the limit is hard-split
//! at the last newline or space before the limit.
//!
//! ```rust
//! use policy_audit_core::chunk::chunk_pages;
//!
//! let chunks = chunk_pages("doc-1", &["Intro.\n\nScope.", "Policy."], 700);
//! assert_eq!(chunks.len(), 1);
//! assert_eq!((chunks[0].page_from, chunks[0].page_to), (1, 2));
//! ```

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::Chunk;

const CHARS_PER_TOKEN: usize = 4;
const PARAGRAPH_BREAK: &str = "\n\n";

struct Packer<'a> {
    doc_id: &'a str,
    max_chars: usize,
    buf: String,
    first_page: u32,
    last_page: u32,
    out: Vec<Chunk>,
}

impl<'a> Packer<'a> {
    fn push_paragraph(&mut self, page: u32, para: &str) {
        let would_be = if self.buf.is_empty() {
            para.len()
        } else {
            self.buf.len() + PARAGRAPH_BREAK.len() + para.len()
        };
        if would_be > self.max_chars {
            self.flush();
        }

        if para.len() > self.max_chars {
            for piece in hard_split(para, self.max_chars) {
                self.emit(page, page, piece);
            }
            return;
        }

        if self.buf.is_empty() {
            self.first_page = page;
        } else {
            self.buf.push_str(PARAGRAPH_BREAK);
        }
        self.buf.push_str(para);
        self.last_page = page;
    }

    fn flush(&mut self) {
        if self.buf.is_empty() {
            return;
        }
        let text = std::mem::take(&mut self.buf);
        self.emit(self.first_page, self.last_page, &text);
    }

    fn emit(&mut self, page_from: u32, page_to: u32, text: &str) {
        self.out.push(make_chunk(self.doc_id, page_from, page_to, text));
    }
}

/// Chunk a document given as one string per page (page 1 first).
///
/// # Arguments
///
/// * `doc_id` — The parent document id, copied into every chunk.
/// * `pages` — Page texts in order; index 0 is page 1.
/// * `max_tokens` — Maximum tokens per chunk (converted to chars via `× 4`).
///
/// # Guarantees
///
/// - At least one chunk is always returned (even for an empty document).
/// - `page_from <= page_to`, and page ranges never go backwards.
/// - No chunk exceeds `max_tokens × 4` bytes, unless a single character
///   is wider than the limit.
/// - Each chunk's `hash` is the SHA-256 of its text.
pub fn chunk_pages<S: AsRef<str>>(doc_id: &str, pages: &[S], max_tokens: usize) -> Vec<Chunk> {
    let mut packer = Packer {
        doc_id,
        max_chars: (max_tokens * CHARS_PER_TOKEN).max(1),
        buf: String::new(),
        first_page: 1,
        last_page: 1,
        out: Vec::new(),
    };

    for (i, page) in pages.iter().enumerate() {
        let number = u32::try_from(i + 1).unwrap_or(u32::MAX);
        for para in page.as_ref().split(PARAGRAPH_BREAK) {
            let para = para.trim();
            if !para.is_empty() {
                packer.push_paragraph(number, para);
            }
        }
    }
    packer.flush();

    if packer.out.is_empty() {
        packer.emit(1, 1, "");
    }
    packer.out
}

/// Cut `text` into pieces of at most `max_chars` bytes, preferring
/// newline then space boundaries. Pieces are trimmed; blank ones dropped.
fn hard_split(text: &str, max_chars: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut remaining = text;
    while !remaining.is_empty() {
        let limit = snap_back(remaining, max_chars);
        let cut = if limit >= remaining.len() {
            remaining.len()
        } else {
            remaining[..limit]
                .rfind('\n')
                .or_else(|| remaining[..limit].rfind(' '))
                .map(|pos| pos + 1)
                .unwrap_or(limit)
        };
        let cut = if cut == 0 {
            // A single character wider than the limit.
            remaining
                .char_indices()
                .nth(1)
                .map_or(remaining.len(), |(i, _)| i)
        } else {
            cut
        };
        let piece = remaining[..cut].trim();
        if !piece.is_empty() {
            pieces.push(piece);
        }
        remaining = &remaining[cut..];
    }
    pieces
}

fn snap_back(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// SHA-256 hex digest of chunk text.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn make_chunk(doc_id: &str, page_from: u32, page_to: u32, text: &str) -> Chunk {
    Chunk {
        id: Uuid::new_v4().to_string(),
        doc_id: doc_id.to_string(),
        page_from,
        page_to,
        text: text.to_string(),
        hash: content_hash(text),
    }
}
