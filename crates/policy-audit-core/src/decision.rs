//! Conservative YES/NO determination.
//!
//! The default is NO. YES requires explicit policy language in the selected
//! chunk:
//!
//! - Any chunk without an obligation marker (`shall`, `must`, `will`,
//!   `required`) is NO.
//! - For a requirement in a recognised domain, the chunk must contain a
//!   domain anchor, one of `policy` / `shall` / `must`, and a domain phrase.
//! - Otherwise the chunk must contain an explicit policy-statement phrase,
//!   the first word of the (prefix-stripped) requirement, and `shall` or
//!   `must`.
//!
//! Confidence is a constant per branch: [`YES_CONFIDENCE`] or
//! [`NO_CONFIDENCE`].

use serde::Serialize;

use crate::terms::{matched_buckets, DomainRule};

pub const YES_CONFIDENCE: f64 = 0.9;
pub const NO_CONFIDENCE: f64 = 0.8;

/// Reasoning attached to every NO outside a recognised domain.
pub const NO_POLICY_CONTENT: &str = "No explicit policy content found that directly addresses the question. The policy documents contain general information but do not specifically address the question asked.";

pub const OBLIGATION_MARKERS: &[&str] = &["shall", "must", "will", "required"];

const DOMAIN_OBLIGATION: &[&str] = &["policy", "shall", "must"];
const STATEMENT_PHRASES: &[&str] = &["policy states", "contract requires", "state law requires"];
const STRICT_OBLIGATION: &[&str] = &["shall", "must"];

/// Question openers stripped before looking at the core question.
const REQUIREMENT_PREFIXES: &[&str] = &[
    "does the p&p state that",
    "does the policy state that",
    "does the policy state",
    "does the p&p state",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Yes,
    No,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decision {
    pub verdict: Verdict,
    pub confidence: f64,
    pub reasoning: String,
}

impl Decision {
    fn yes(reasoning: String) -> Self {
        Self {
            verdict: Verdict::Yes,
            confidence: YES_CONFIDENCE,
            reasoning,
        }
    }

    fn no(reasoning: String) -> Self {
        Self {
            verdict: Verdict::No,
            confidence: NO_CONFIDENCE,
            reasoning,
        }
    }
}

/// The requirement with its leading question opener removed, lowercased.
pub fn core_question(requirement: &str) -> String {
    let mut q = requirement.to_lowercase();
    for prefix in REQUIREMENT_PREFIXES {
        q = q.replace(prefix, "");
    }
    q.trim().to_string()
}

/// Decide whether `chunk_text` explicitly answers `requirement`.
///
/// `document_title` is only used in the reasoning string.
pub fn decide(requirement: &str, chunk_text: &str, document_title: &str) -> Decision {
    let text = chunk_text.to_lowercase();
    let core = core_question(requirement);
    let rule = matched_buckets(&core).find_map(|b| b.rule.as_ref());

    if !contains_any(&text, OBLIGATION_MARKERS) {
        return match rule {
            Some(rule) => domain_no(rule),
            None => Decision::no(NO_POLICY_CONTENT.to_string()),
        };
    }

    match rule {
        Some(rule) => {
            let found = contains_any(&text, rule.anchors)
                && contains_any(&text, DOMAIN_OBLIGATION)
                && contains_any(&text, rule.phrases);
            if found {
                Decision::yes(format!(
                    "Found explicit {} policy content. Document '{}' contains clear policy statements about {}.",
                    rule.topic, document_title, rule.topic
                ))
            } else {
                domain_no(rule)
            }
        }
        None => {
            let first_word = core
                .split_whitespace()
                .next()
                .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
                .filter(|w| !w.is_empty());
            let found = contains_any(&text, STATEMENT_PHRASES)
                && first_word.is_some_and(|w| text.contains(w))
                && contains_any(&text, STRICT_OBLIGATION);
            if found {
                Decision::yes(format!(
                    "Found explicit policy content addressing the question. Document '{}' contains clear policy statements about the topic.",
                    document_title
                ))
            } else {
                Decision::no(NO_POLICY_CONTENT.to_string())
            }
        }
    }
}

fn domain_no(rule: &DomainRule) -> Decision {
    Decision::no(format!(
        "No explicit {} policy content found that directly addresses the question.",
        rule.topic
    ))
}

fn contains_any(text: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| text.contains(n))
}
