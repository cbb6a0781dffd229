//! Evidence consolidation for pre-scored candidates.
//!
//! Takes candidates that already carry a similarity score from an external
//! retriever, drops the weak ones, trims each survivor down to its most
//! relevant sentence(s), and keeps the strongest few blocks.

use serde::{Deserialize, Serialize};

use crate::models::UNKNOWN_DOCUMENT;
use crate::similarity::{number_set, sequence_ratio, word_set};

/// Audit vocabulary worth a flat bonus when shared by sentence and requirement.
pub const KEY_PHRASES: &[&str] = &[
    "calendar days",
    "business days",
    "within",
    "no later than",
    "deadline",
    "timeframe",
    "period",
    "response",
    "request",
    "retrospective",
    "prospective",
    "authorization",
    "approval",
    "denial",
    "decision",
    "process",
    "procedure",
    "abuse",
    "fraud",
    "waste",
    "fiscal",
    "business",
    "medical",
    "standards",
    "practices",
    "inconsistent",
    "sound",
    "unnecessary",
    "cost",
    "medi-cal",
];

const KEYWORD_WEIGHT: f64 = 0.4;
const SEQUENCE_WEIGHT: f64 = 0.3;
const PHRASE_BONUS: f64 = 0.1;
const NUMBER_BONUS: f64 = 0.2;
const NUMBER_BONUS_CAP: f64 = 0.4;
const JOINED_SENTENCES: usize = 3;

/// One retriever hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrescoredCandidate {
    #[serde(alias = "policy_id")]
    pub doc_id: String,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default = "first_page")]
    pub page: u32,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub score: f64,
}

fn first_page() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceRequest {
    #[serde(alias = "question_id")]
    pub requirement_id: String,
    #[serde(default)]
    pub requirement: String,
    #[serde(default)]
    pub candidates: Vec<PrescoredCandidate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceCitation {
    pub policy_id: String,
    pub filename: String,
    pub page: u32,
    pub quote: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidatedEvidence {
    pub requirement_id: String,
    pub evidence: Vec<EvidenceCitation>,
}

#[derive(Debug, Clone, Copy)]
pub struct ConsolidateParams {
    /// Candidates scored below this by the retriever are ignored.
    pub min_score: f64,
    pub max_blocks: usize,
    /// A single sentence at or above this relevance is quoted alone.
    pub sentence_threshold: f64,
    /// Blocks below this relevance are dropped.
    pub min_relevance: f64,
    /// Sentence fragments this short or shorter are discarded.
    pub min_fragment_chars: usize,
}

impl Default for ConsolidateParams {
    fn default() -> Self {
        Self {
            min_score: 0.5,
            max_blocks: 3,
            sentence_threshold: 0.3,
            min_relevance: 0.05,
            min_fragment_chars: 10,
        }
    }
}

struct Block<'a> {
    candidate: &'a PrescoredCandidate,
    quote: String,
    relevance: f64,
}

/// Reduce pre-scored candidates to at most `max_blocks` citations.
///
/// Candidates under `min_score` are dropped before any text work. Each
/// survivor contributes its best sentence, or its best few sentences joined
/// when none reaches `sentence_threshold`. Candidates whose best sentence
/// is below `min_relevance` are dropped.
///
/// # Guarantees
///
/// - At most `max_blocks` citations, ordered by sentence relevance, then by
///   retriever score.
/// - An empty or fully filtered candidate list yields an empty `evidence`.
/// - Missing or blank filenames become `"Unknown Document"`.
pub fn consolidate(request: &EvidenceRequest, params: &ConsolidateParams) -> ConsolidatedEvidence {
    let mut blocks: Vec<Block<'_>> = request
        .candidates
        .iter()
        .filter(|c| c.score >= params.min_score)
        .filter_map(|c| best_block(c, &request.requirement, params))
        .collect();

    blocks.sort_by(|a, b| {
        b.relevance
            .total_cmp(&a.relevance)
            .then(b.candidate.score.total_cmp(&a.candidate.score))
    });
    blocks.truncate(params.max_blocks);

    tracing::info!(
        requirement_id = %request.requirement_id,
        candidates = request.candidates.len(),
        selected = blocks.len(),
        "consolidated evidence"
    );

    ConsolidatedEvidence {
        requirement_id: request.requirement_id.clone(),
        evidence: blocks
            .into_iter()
            .map(|b| EvidenceCitation {
                policy_id: b.candidate.doc_id.clone(),
                filename: b
                    .candidate
                    .filename
                    .clone()
                    .filter(|f| !f.trim().is_empty())
                    .unwrap_or_else(|| UNKNOWN_DOCUMENT.to_string()),
                page: b.candidate.page,
                quote: b.quote,
            })
            .collect(),
    }
}

fn best_block<'a>(
    candidate: &'a PrescoredCandidate,
    requirement: &str,
    params: &ConsolidateParams,
) -> Option<Block<'a>> {
    let mut scored: Vec<(&str, f64)> = split_sentences(&candidate.text, params.min_fragment_chars)
        .into_iter()
        .map(|s| (s, sentence_relevance(s, requirement)))
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));

    let (_, best) = *scored.first()?;
    let take = if best >= params.sentence_threshold {
        1
    } else {
        JOINED_SENTENCES
    };
    if best < params.min_relevance {
        return None;
    }

    let quote = scored
        .iter()
        .take(take)
        .map(|(s, _)| *s)
        .collect::<Vec<_>>()
        .join(" ");
    Some(Block {
        candidate,
        quote,
        relevance: best,
    })
}

/// Split after `.`, `!` or `?` when whitespace and an uppercase letter follow.
///
/// Fragments of `min_chars` characters or fewer are dropped.
pub fn split_sentences(text: &str, min_chars: usize) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        let end = i + c.len_utf8();
        let mut next = end;
        while let Some(&(j, w)) = chars.peek() {
            if !w.is_whitespace() {
                break;
            }
            next = j + w.len_utf8();
            chars.next();
        }
        let upper_follows = chars.peek().is_some_and(|&(_, n)| n.is_uppercase());
        if next > end && upper_follows {
            push_fragment(&mut out, &text[start..end], min_chars);
            start = next;
        }
    }
    push_fragment(&mut out, &text[start..], min_chars);
    out
}

fn push_fragment<'a>(out: &mut Vec<&'a str>, fragment: &'a str, min_chars: usize) {
    let fragment = fragment.trim();
    if fragment.chars().count() > min_chars {
        out.push(fragment);
    }
}

/// Relevance of one sentence to the requirement, in `[0.0, 1.0]`.
pub fn sentence_relevance(sentence: &str, requirement: &str) -> f64 {
    let sentence_lower = sentence.trim().to_lowercase();
    let requirement_lower = requirement.trim().to_lowercase();
    if sentence_lower.is_empty() || requirement_lower.is_empty() {
        return 0.0;
    }

    let requirement_words = word_set(&requirement_lower);
    if requirement_words.is_empty() {
        return 0.0;
    }
    let sentence_words = word_set(&sentence_lower);
    let overlap = sentence_words.intersection(&requirement_words).count() as f64
        / requirement_words.len() as f64;

    let sequence = sequence_ratio(&sentence_lower, &requirement_lower);

    let phrases = KEY_PHRASES
        .iter()
        .filter(|p| sentence_lower.contains(*p) && requirement_lower.contains(*p))
        .count() as f64
        * PHRASE_BONUS;

    let shared_numbers = number_set(sentence)
        .intersection(&number_set(requirement))
        .count() as f64;
    let numbers = (shared_numbers * NUMBER_BONUS).min(NUMBER_BONUS_CAP);

    (overlap * KEYWORD_WEIGHT + sequence * SEQUENCE_WEIGHT + phrases + numbers).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUIREMENT: &str = "Does the P&P state the MCP must respond to retrospective requests no longer than 14 calendar days from receipt?";

    fn candidate(doc: &str, filename: Option<&str>, text: &str, score: f64) -> PrescoredCandidate {
        PrescoredCandidate {
            doc_id: doc.to_string(),
            filename: filename.map(str::to_string),
            page: 3,
            text: text.to_string(),
            score,
        }
    }

    fn sample(scores: (f64, f64)) -> EvidenceRequest {
        EvidenceRequest {
            requirement_id: "123".to_string(),
            requirement: REQUIREMENT.to_string(),
            candidates: vec![
                candidate(
                    "AA.1204",
                    Some("Gifts, Honoraria, and Travel Payments"),
                    "Employees may not accept honoraria in connection with CalOptima responsibilities.",
                    scores.1,
                ),
                candidate(
                    "GG.1508",
                    Some("Authorization and Processing of Referrals"),
                    "For a retrospective request involving direct payment to the Member, CalOptima Health shall complete the CD, notify the Member or Member's Authorized Representative and the Prescriber, and effectuate the decision, if applicable, no later than fourteen (14) calendar days after the date and time CalOptima Health received the request.",
                    scores.0,
                ),
            ],
        }
    }

    #[test]
    fn test_both_above_threshold_sorted_by_relevance() {
        let out = consolidate(&sample((0.89, 0.52)), &ConsolidateParams::default());
        assert_eq!(out.requirement_id, "123");
        assert_eq!(out.evidence.len(), 2);
        assert_eq!(out.evidence[0].policy_id, "GG.1508");
        assert_eq!(out.evidence[1].policy_id, "AA.1204");
        assert!(out.evidence[0].quote.contains("fourteen (14) calendar days"));
    }

    #[test]
    fn test_all_below_threshold_is_empty() {
        let out = consolidate(&sample((0.49, 0.2)), &ConsolidateParams::default());
        assert!(out.evidence.is_empty());
    }

    #[test]
    fn test_empty_candidates_is_empty() {
        let request = EvidenceRequest {
            requirement_id: "q".to_string(),
            requirement: REQUIREMENT.to_string(),
            candidates: Vec::new(),
        };
        assert!(consolidate(&request, &ConsolidateParams::default())
            .evidence
            .is_empty());
    }

    #[test]
    fn test_truncates_to_max_blocks() {
        let text = "The MCP must respond to retrospective requests within 14 calendar days.";
        let request = EvidenceRequest {
            requirement_id: "q".to_string(),
            requirement: REQUIREMENT.to_string(),
            candidates: (0..5)
                .map(|i| candidate(&format!("P{}", i), None, text, 0.9))
                .collect(),
        };
        let out = consolidate(&request, &ConsolidateParams::default());
        assert_eq!(out.evidence.len(), 3);
        assert_eq!(out.evidence[0].filename, UNKNOWN_DOCUMENT);
    }

    #[test]
    fn test_retriever_score_breaks_relevance_ties() {
        let text = "The MCP must respond to retrospective requests within 14 calendar days.";
        let request = EvidenceRequest {
            requirement_id: "q".to_string(),
            requirement: REQUIREMENT.to_string(),
            candidates: vec![
                candidate("low", None, text, 0.6),
                candidate("high", None, text, 0.95),
            ],
        };
        let out = consolidate(&request, &ConsolidateParams::default());
        assert_eq!(out.evidence[0].policy_id, "high");
    }

    #[test]
    fn test_empty_requirement_drops_everything() {
        let mut request = sample((0.9, 0.9));
        request.requirement.clear();
        assert!(consolidate(&request, &ConsolidateParams::default())
            .evidence
            .is_empty());
    }

    #[test]
    fn test_split_requires_uppercase_after_boundary() {
        let s = split_sentences(
            "Members shall be notified. Appeals go to section 4. e.g. this continues here. Ok.",
            10,
        );
        assert_eq!(
            s,
            vec![
                "Members shall be notified.",
                "Appeals go to section 4. e.g. this continues here.",
            ]
        );
    }

    #[test]
    fn test_relevance_rewards_numbers_and_phrases() {
        let with = sentence_relevance("Respond within 14 calendar days.", REQUIREMENT);
        let without = sentence_relevance("Respond promptly.", REQUIREMENT);
        assert!(with > without);
        assert!(with <= 1.0);
    }

    #[test]
    fn test_request_accepts_question_and_policy_aliases() {
        let request: EvidenceRequest = serde_json::from_str(
            r#"{"question_id":"7","requirement":"x","candidates":[{"policy_id":"GG.1","text":"t","score":0.7}]}"#,
        )
        .unwrap();
        assert_eq!(request.requirement_id, "7");
        assert_eq!(request.candidates[0].doc_id, "GG.1");
        assert_eq!(request.candidates[0].page, 1);
    }
}
