//! Sentence-level evidence extraction.
//!
//! Given the selected chunk, finds the sentence that best supports the
//! requirement and cuts a bounded quote around it:
//!
//! 1. Split the chunk on `". "` (text without a delimiter is one sentence).
//! 2. Score each sentence: 3 per focus term, 2 per policy action word,
//!    1 per long requirement word.
//! 3. Ignore sentences shorter than `min_sentence_chars`.
//! 4. Quote `[start - context_before, end + context_after]` around the best
//!    sentence, clipped to the chunk, with `"..."` when cut at the end.
//! 5. A `Page <n> of <m>` footer inside the quote overrides the chunk's page.
//!
//! Extraction never fails. Without a scoring sentence it falls back to the
//! sentences after the leading header block, then to a raw prefix.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::models::Chunk;
use crate::terms;

/// Words and phrases that mark binding policy language.
pub const ACTION_WORDS: &[&str] = &[
    "shall",
    "must",
    "will",
    "required",
    "provide",
    "pay",
    "cover",
    "policy states",
    "contract requires",
    "state law",
];

const REQUIREMENT_STOP_WORDS: &[&str] = &["does", "that", "with", "from", "this", "will", "shall"];

const ELLIPSIS: &str = "...";

static PAGE_FOOTER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Page (\d+) of \d+").expect("page footer pattern is valid"));

/// Tuning for [`extract_quote`].
#[derive(Debug, Clone, Copy)]
pub struct QuoteParams {
    pub min_sentence_chars: usize,
    pub context_before: usize,
    pub context_after: usize,
    pub fallback_quote_chars: usize,
    /// Leading sentences assumed to be headers in the fallback path.
    pub header_sentences: usize,
}

impl Default for QuoteParams {
    fn default() -> Self {
        Self {
            min_sentence_chars: 50,
            context_before: 100,
            context_after: 200,
            fallback_quote_chars: 500,
            header_sentences: 3,
        }
    }
}

/// A sentence and its byte span inside the chunk text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sentence<'a> {
    pub start: usize,
    pub text: &'a str,
}

impl Sentence<'_> {
    pub fn end(&self) -> usize {
        self.start + self.text.len()
    }
}

/// Quote and page recovered from a chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Quote {
    pub text: String,
    pub page: u32,
    /// The sentence the quote was built around, when one scored.
    pub sentence: Option<String>,
    pub score: u32,
}

/// Split on `". "`, keeping byte offsets.
pub fn split_sentences(text: &str) -> Vec<Sentence<'_>> {
    let mut out = Vec::new();
    let mut start = 0;
    for (idx, delim) in text.match_indices(". ") {
        out.push(Sentence {
            start,
            text: &text[start..idx],
        });
        start = idx + delim.len();
    }
    out.push(Sentence {
        start,
        text: &text[start..],
    });
    out
}

/// Score one sentence against the focus terms and requirement words.
pub fn score_sentence(sentence: &str, focus_terms: &[String], requirement_words: &[&str]) -> u32 {
    let lowered = sentence.to_lowercase();
    let focus = count_present(&lowered, focus_terms.iter().map(String::as_str));
    let action = count_present(&lowered, ACTION_WORDS.iter().copied());
    let words = count_present(&lowered, requirement_words.iter().copied());
    focus * 3 + action * 2 + words
}

fn count_present<'a>(haystack: &str, needles: impl Iterator<Item = &'a str>) -> u32 {
    needles.filter(|n| haystack.contains(n)).count() as u32
}

/// Requirement words longer than four characters, minus stop words.
pub fn requirement_words(lowered_requirement: &str) -> Vec<&str> {
    let mut out: Vec<&str> = Vec::new();
    for word in terms::tokens(lowered_requirement) {
        if word.chars().count() > 4
            && !REQUIREMENT_STOP_WORDS.contains(&word)
            && !out.contains(&word)
        {
            out.push(word);
        }
    }
    out
}

/// Build the supporting quote for `requirement` out of `chunk`.
///
/// # Arguments
///
/// * `chunk` — The selected chunk; its `page_from` is the default page.
/// * `requirement` — Raw requirement text; its long words add to sentence scores.
/// * `focus_terms` — Lowercase terms worth the most per sentence.
/// * `params` — Window sizes and sentence length floor.
///
/// # Guarantees
///
/// - Never fails; an empty chunk yields an empty quote.
/// - With a matched sentence, the quote (minus a trailing `"..."`) is a
///   substring of the chunk no longer than the sentence plus
///   `context_before + context_after` bytes.
/// - Window edges always fall on char boundaries.
pub fn extract_quote(
    chunk: &Chunk,
    requirement: &str,
    focus_terms: &[String],
    params: &QuoteParams,
) -> Quote {
    let text = chunk.text.as_str();
    let lowered = requirement.to_lowercase();
    let words = requirement_words(&lowered);
    let sentences = split_sentences(text);

    let mut best: Option<(&Sentence<'_>, u32)> = None;
    for sentence in &sentences {
        if sentence.text.chars().count() < params.min_sentence_chars {
            continue;
        }
        let score = score_sentence(sentence.text, focus_terms, &words);
        if score > best.map_or(0, |(_, s)| s) {
            best = Some((sentence, score));
        }
    }

    let (quote, matched, score) = match best {
        Some((sentence, score)) => (
            window(text, sentence, params),
            Some(sentence.text.to_string()),
            score,
        ),
        None => {
            tracing::debug!(chunk = %chunk.id, "no scoring sentence; using fallback excerpt");
            (fallback_excerpt(text, &sentences, params), None, 0)
        }
    };

    let page = page_from_footer(&quote).unwrap_or(chunk.page_from);

    Quote {
        text: quote,
        page,
        sentence: matched,
        score,
    }
}

/// First `Page <n> of <m>` page number in `text`.
pub fn page_from_footer(text: &str) -> Option<u32> {
    PAGE_FOOTER
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn window(text: &str, sentence: &Sentence<'_>, params: &QuoteParams) -> String {
    let start = snap_forward(text, sentence.start.saturating_sub(params.context_before));
    let end = snap_back(text, (sentence.end() + params.context_after).min(text.len()));
    let mut quote = text[start..end].to_string();
    if end < text.len() {
        quote.push_str(ELLIPSIS);
    }
    quote
}

fn fallback_excerpt(text: &str, sentences: &[Sentence<'_>], params: &QuoteParams) -> String {
    let body = if sentences.len() > params.header_sentences {
        &sentences[params.header_sentences..]
    } else {
        sentences
    };
    let picked = &body[..body.len().min(3)];

    if let (Some(first), Some(last)) = (picked.first(), picked.last()) {
        let (start, end) = (first.start, last.end());
        if !text[start..end].trim().is_empty() {
            let mut quote = text[start..end].to_string();
            if end < text.len() {
                quote.push_str(ELLIPSIS);
            }
            return quote;
        }
    }

    let end = snap_back(text, params.fallback_quote_chars.min(text.len()));
    let mut quote = text[..end].to_string();
    if end < text.len() {
        quote.push_str(ELLIPSIS);
    }
    quote
}

/// Largest char boundary `<= index`.
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

/// Smallest char boundary `>= index`.
fn snap_forward(s: &str, index: usize) -> usize {
    let mut i = index.min(s.len());
    while i < s.len() && !s.is_char_boundary(i) {
        i += 1;
    }
    i
}
