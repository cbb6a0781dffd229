//! Chunk scoring against a term set.
//!
//! Two modes are supported:
//!
//! - [`ScoreMode::Presence`] counts distinct matched terms. Used for the
//!   corpus-wide filtering pass.
//! - [`ScoreMode::Frequency`] sums per-term occurrence counts and adds one
//!   point per requirement word (longer than three characters) found in the
//!   text. Used to rank the already-filtered candidates.
//!
//! Matching is case-insensitive substring containment. Scoring is a pure
//! function of its inputs, so [`scan`] fans out over chunks with rayon.

use rayon::prelude::*;
use serde::Serialize;

use crate::models::Chunk;
use crate::terms;

/// How a chunk's score is computed.
#[derive(Debug, Clone, Copy)]
pub enum ScoreMode<'a> {
    Presence,
    Frequency {
        /// Lowercased requirement text; its words earn the bonus.
        requirement: &'a str,
    },
}

/// Result of scoring one text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TextScore {
    pub score: u32,
    pub matched: Vec<String>,
}

/// A chunk paired with its relevance score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Candidate {
    /// Position of the chunk in the scanned slice.
    pub index: usize,
    pub doc_id: String,
    pub score: u32,
    pub matched: Vec<String>,
}

/// Score a single text. `terms` are expected lowercase.
pub fn score_text(text: &str, terms: &[String], mode: ScoreMode<'_>) -> TextScore {
    let haystack = text.to_lowercase();
    let mut out = TextScore::default();

    for term in terms.iter().filter(|t| !t.is_empty()) {
        let hits = match mode {
            ScoreMode::Presence => u32::from(haystack.contains(term.as_str())),
            ScoreMode::Frequency { .. } => count_occurrences(&haystack, term),
        };
        if hits > 0 {
            out.score += hits;
            out.matched.push(term.clone());
        }
    }

    if let ScoreMode::Frequency { requirement } = mode {
        out.score += requirement_word_bonus(&haystack, requirement);
    }

    out
}

/// Score every chunk and return the positive ones, best first.
///
/// Chunks are scored in parallel; the result does not depend on the
/// thread count.
///
/// # Guarantees
///
/// - Every returned candidate has `score > 0`.
/// - `Candidate::index` points into `chunks`.
/// - The sort is stable, so equal scores keep scan order.
pub fn scan(chunks: &[Chunk], terms: &[String], mode: ScoreMode<'_>) -> Vec<Candidate> {
    let mut candidates: Vec<Candidate> = chunks
        .par_iter()
        .enumerate()
        .filter_map(|(index, chunk)| {
            let scored = score_text(&chunk.text, terms, mode);
            (scored.score > 0).then(|| Candidate {
                index,
                doc_id: chunk.doc_id.clone(),
                score: scored.score,
                matched: scored.matched,
            })
        })
        .collect();

    candidates.sort_by(|a, b| b.score.cmp(&a.score));
    candidates
}

/// Non-overlapping occurrences of `needle` in `haystack`.
fn count_occurrences(haystack: &str, needle: &str) -> u32 {
    haystack.matches(needle).count() as u32
}

fn requirement_word_bonus(haystack: &str, requirement: &str) -> u32 {
    let mut seen: Vec<&str> = Vec::new();
    let mut bonus = 0;
    for word in terms::tokens(requirement) {
        if word.chars().count() > 3 && !seen.contains(&word) {
            seen.push(word);
            if haystack.contains(word) {
                bonus += 1;
            }
        }
    }
    bonus
}
