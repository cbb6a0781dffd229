//! Corpus-scan answering pipeline.
//!
//! ```text
//! requirement ─► extract_terms ─► scan (presence) ─► fallback rescan?
//!                                        │
//!                    top window ◄────────┘
//!                        │ rescore (frequency)
//!                        ▼
//!                rotation::select ─► extract_quote ─► decide ─► Answer
//! ```
//!
//! The engine is synchronous and holds no mutable state of its own; usage
//! history is passed in by the caller, either directly or through a shared
//! [`RotationRegistry`].

use std::collections::HashMap;

use serde::Serialize;

use crate::decision::{decide, Verdict};
use crate::extract::{extract_quote, QuoteParams};
use crate::models::{Answer, Chunk, EvidenceBlock, UNKNOWN_DOCUMENT};
use crate::rotation::{self, RotationPolicy, RotationRegistry, UsageHistory};
use crate::score::{scan, score_text, Candidate, ScoreMode};
use crate::terms::{extract_terms, TermSet};

pub const NO_EVIDENCE_REASONING: &str =
    "No relevant policy content found in the document corpus for this requirement.";

#[derive(Debug, Clone, Copy)]
pub struct EngineParams {
    /// Only the first `scan_limit` chunks of the corpus are scored.
    pub scan_limit: usize,
    /// Number of top candidates considered for rotation.
    pub candidate_window: usize,
    /// Below this many primary hits the fallback tokens are added.
    pub min_candidates: usize,
    pub rotation: RotationPolicy,
    pub quote: QuoteParams,
}

impl Default for EngineParams {
    fn default() -> Self {
        Self {
            scan_limit: 400,
            candidate_window: 20,
            min_candidates: 3,
            rotation: RotationPolicy::default(),
            quote: QuoteParams::default(),
        }
    }
}

/// Everything the engine needs to answer one requirement.
#[derive(Debug, Clone, Copy)]
pub struct AnswerRequest<'a> {
    pub requirement_id: &'a str,
    pub requirement: &'a str,
    pub chunks: &'a [Chunk],
    /// Document id to title. Missing entries resolve to [`UNKNOWN_DOCUMENT`].
    pub titles: &'a HashMap<String, String>,
}

/// Ranked candidate window for one requirement.
#[derive(Debug, Clone, Serialize)]
pub struct Ranking {
    pub terms: TermSet,
    /// Best first; `index` points into the scanned chunk slice.
    pub candidates: Vec<Candidate>,
    pub used_fallback: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Engine {
    params: EngineParams,
}

impl Engine {
    pub fn new(params: EngineParams) -> Self {
        Self { params }
    }

    /// Score the corpus and return the rescored candidate window.
    ///
    /// Only the first `scan_limit` chunks are considered. The presence scan
    /// uses domain and requirement terms; when it finds fewer than
    /// `min_candidates` chunks the scan is repeated with the fallback
    /// tokens added. The best `candidate_window` hits are then rescored by
    /// term frequency.
    pub fn rank(&self, requirement: &str, chunks: &[Chunk]) -> Ranking {
        let terms = extract_terms(requirement);
        let corpus = &chunks[..chunks.len().min(self.params.scan_limit)];

        let mut scan_terms = terms.primary();
        let mut candidates = scan(corpus, &scan_terms, ScoreMode::Presence);
        let mut used_fallback = false;
        if candidates.len() < self.params.min_candidates && !terms.fallback.is_empty() {
            scan_terms = terms.all();
            candidates = scan(corpus, &scan_terms, ScoreMode::Presence);
            used_fallback = true;
        }

        candidates.truncate(self.params.candidate_window);

        let lowered = requirement.to_lowercase();
        let mode = ScoreMode::Frequency {
            requirement: &lowered,
        };
        for c in &mut candidates {
            let rescored = score_text(&corpus[c.index].text, &scan_terms, mode);
            c.score = rescored.score;
            c.matched = rescored.matched;
        }
        candidates.sort_by(|a, b| b.score.cmp(&a.score));

        tracing::debug!(
            scanned = corpus.len(),
            candidates = candidates.len(),
            used_fallback,
            domains = ?terms.domains,
            "ranked corpus"
        );

        Ranking {
            terms,
            candidates,
            used_fallback,
        }
    }

    /// Answer against a caller-owned usage history.
    pub fn answer(&self, request: &AnswerRequest<'_>, history: &mut UsageHistory) -> Answer {
        let ranking = self.rank(request.requirement, request.chunks);
        let picked = rotation::select(&ranking.candidates, history, self.params.rotation);
        self.finish(request, &ranking, picked)
    }

    /// Answer against the session's history in a shared registry.
    ///
    /// Ranking runs outside the registry lock; only select-and-record holds it.
    pub fn answer_shared(
        &self,
        request: &AnswerRequest<'_>,
        registry: &RotationRegistry,
        session: &str,
    ) -> Answer {
        let ranking = self.rank(request.requirement, request.chunks);
        let picked = registry.select(session, &ranking.candidates, self.params.rotation);
        self.finish(request, &ranking, picked)
    }

    fn finish(
        &self,
        request: &AnswerRequest<'_>,
        ranking: &Ranking,
        picked: Option<usize>,
    ) -> Answer {
        let Some(pos) = picked else {
            tracing::info!(requirement_id = %request.requirement_id, "no candidate chunks");
            return Answer::Unknown {
                confidence: 0.0,
                reasoning: NO_EVIDENCE_REASONING.to_string(),
            };
        };

        let candidate = &ranking.candidates[pos];
        let chunk = &request.chunks[candidate.index];
        let title = request
            .titles
            .get(&chunk.doc_id)
            .filter(|t| !t.trim().is_empty())
            .map(String::as_str)
            .unwrap_or(UNKNOWN_DOCUMENT);

        let focus = ranking.terms.focus_terms();
        let quote = extract_quote(chunk, request.requirement, &focus, &self.params.quote);
        let decision = decide(request.requirement, &chunk.text, title);

        tracing::info!(
            requirement_id = %request.requirement_id,
            doc_id = %chunk.doc_id,
            chunk_id = %chunk.id,
            score = candidate.score,
            verdict = ?decision.verdict,
            "answered requirement"
        );

        let evidence = EvidenceBlock {
            doc_id: chunk.doc_id.clone(),
            filename: title.to_string(),
            page: quote.page,
            quote: quote.text,
        };
        match decision.verdict {
            Verdict::Yes => Answer::Yes {
                confidence: decision.confidence,
                reasoning: decision.reasoning,
                evidence,
            },
            Verdict::No => Answer::No {
                confidence: decision.confidence,
                reasoning: decision.reasoning,
                evidence,
            },
        }
    }
}
