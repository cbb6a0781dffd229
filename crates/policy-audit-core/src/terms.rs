//! Requirement term extraction.
//!
//! Turns a natural-language audit requirement into a [`TermSet`]: an
//! ordered, de-duplicated set of lowercase search terms in three groups.
//!
//! | Group | Source | Used for |
//! |-------|--------|----------|
//! | domain | [`DOMAIN_BUCKETS`] triggered by the requirement | scanning, focus terms, decision rules |
//! | generic | [`GENERIC_TERMS`], always present | scanning |
//! | fallback | requirement tokens (len ≥ 3, not stop words) | scanning when the primary terms find too little |
//!
//! Domain detection is table-driven: adding a topic means adding one
//! [`DomainBucket`] entry, nothing else.

use serde::Serialize;

/// Obligation and coverage vocabulary included in every term set.
pub const GENERIC_TERMS: &[&str] = &[
    "policy",
    "procedure",
    "requirement",
    "shall",
    "must",
    "will",
    "provide",
    "cover",
];

/// Tokens never used as fallback terms.
const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "all", "can", "had", "her", "was", "one",
    "our", "out", "day", "get", "has", "him", "his", "how", "its", "may", "new", "now", "old",
    "see", "two", "who", "did", "put", "say", "she", "too", "use", "does", "that", "this",
    "with", "from",
];

/// Number of fallback tokens used as focus terms when no domain matched.
const FOCUS_FALLBACK_LEN: usize = 5;

/// Explicit-YES rule attached to a domain bucket.
#[derive(Debug)]
pub struct DomainRule {
    /// At least one must appear in the chunk.
    pub anchors: &'static [&'static str],
    /// At least one must appear in the chunk.
    pub phrases: &'static [&'static str],
    /// Topic name used in reasoning strings.
    pub topic: &'static str,
}

/// A topic-specific vocabulary triggered by keyword presence.
#[derive(Debug)]
pub struct DomainBucket {
    pub name: &'static str,
    pub triggers: &'static [&'static str],
    pub terms: &'static [&'static str],
    /// `None` for buckets that only steer retrieval.
    pub rule: Option<DomainRule>,
}

impl DomainBucket {
    pub fn is_triggered_by(&self, lowered: &str) -> bool {
        self.triggers.iter().any(|t| lowered.contains(t))
    }
}

pub static DOMAIN_BUCKETS: &[DomainBucket] = &[
    DomainBucket {
        name: "hospice",
        triggers: &["hospice"],
        terms: &[
            "hospice",
            "hospice care",
            "hospice services",
            "terminal",
            "palliative",
            "end of life",
            "end-of-life",
        ],
        rule: Some(DomainRule {
            anchors: &["hospice"],
            phrases: &["hospice care", "hospice services", "terminal illness"],
            topic: "hospice care",
        }),
    },
    DomainBucket {
        name: "transplant",
        triggers: &["transplant"],
        terms: &[
            "transplant",
            "transplant services",
            "bone marrow",
            "organ",
            "organ transplant",
            "dhcs-approved",
            "ccs-approved",
        ],
        rule: Some(DomainRule {
            anchors: &["transplant"],
            phrases: &["transplant services", "bone marrow", "organ transplant"],
            topic: "transplant services",
        }),
    },
    DomainBucket {
        name: "medical_review",
        triggers: &["medical review", "site review"],
        terms: &[
            "medical review",
            "site review",
            "prepayment review",
            "utilization review",
            "utilization management",
            "claims processing",
        ],
        rule: Some(DomainRule {
            anchors: &["medical review", "utilization review", "site review"],
            phrases: &["medical review", "utilization review", "prepayment review"],
            topic: "medical review",
        }),
    },
    DomainBucket {
        name: "continuous_home_care",
        triggers: &["continuous home care"],
        terms: &["continuous home care", "home care", "24-hour care"],
        rule: None,
    },
];

/// Weighted search vocabulary for one requirement.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TermSet {
    pub domain: Vec<String>,
    pub generic: Vec<String>,
    pub fallback: Vec<String>,
    /// Names of the buckets that fired, in table order.
    pub domains: Vec<&'static str>,
}

impl TermSet {
    /// Domain and generic terms, in that order.
    pub fn primary(&self) -> Vec<String> {
        self.domain.iter().chain(&self.generic).cloned().collect()
    }

    /// Primary terms followed by the fallback tokens.
    pub fn all(&self) -> Vec<String> {
        self.domain
            .iter()
            .chain(&self.generic)
            .chain(&self.fallback)
            .cloned()
            .collect()
    }

    /// Terms the sentence extractor weights most heavily.
    pub fn focus_terms(&self) -> Vec<String> {
        if self.domain.is_empty() {
            self.fallback.iter().take(FOCUS_FALLBACK_LEN).cloned().collect()
        } else {
            self.domain.clone()
        }
    }

    pub fn len(&self) -> usize {
        self.domain.len() + self.generic.len() + self.fallback.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Derive the term set for a requirement. Pure and infallible.
pub fn extract_terms(requirement: &str) -> TermSet {
    let lowered = requirement.to_lowercase();
    let mut set = TermSet::default();
    let mut seen: Vec<String> = Vec::new();

    for bucket in matched_buckets(&lowered) {
        set.domains.push(bucket.name);
        for term in bucket.terms {
            push_unique(&mut set.domain, &mut seen, term);
        }
    }

    for term in GENERIC_TERMS {
        push_unique(&mut set.generic, &mut seen, term);
    }

    for token in tokens(&lowered) {
        if token.chars().count() >= 3 && !STOP_WORDS.contains(&token) {
            push_unique(&mut set.fallback, &mut seen, token);
        }
    }

    set
}

/// Buckets triggered by `text`, in table order.
pub fn matched_buckets(text: &str) -> impl Iterator<Item = &'static DomainBucket> {
    let lowered = text.to_lowercase();
    DOMAIN_BUCKETS
        .iter()
        .filter(move |b| b.is_triggered_by(&lowered))
}

/// Whitespace tokens with surrounding punctuation trimmed.
///
/// Inner punctuation is kept so `p&p` and `end-of-life` survive intact.
pub fn tokens(text: &str) -> impl Iterator<Item = &str> {
    text.split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|w| !w.is_empty())
}

fn push_unique(group: &mut Vec<String>, seen: &mut Vec<String>, term: &str) {
    if !seen.iter().any(|s| s == term) {
        seen.push(term.to_string());
        group.push(term.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_hospice_bucket_triggered() {
        let set = extract_terms("Does the P&P state that Hospice care must be provided?");
        assert_eq!(set.domains, vec!["hospice"]);
        assert!(set.domain.contains(&"hospice care".to_string()));
        assert!(set.domain.contains(&"palliative".to_string()));
    }

    #[test]
    fn test_multiple_buckets_are_unioned_in_table_order() {
        let set = extract_terms("Transplant patients referred to hospice");
        assert_eq!(set.domains, vec!["hospice", "transplant"]);
        assert!(set.domain.contains(&"bone marrow".to_string()));
        assert!(set.domain.contains(&"terminal".to_string()));
    }

    #[test]
    fn test_matched_buckets_is_case_insensitive() {
        let names: Vec<&str> = matched_buckets("CONTINUOUS HOME CARE during a Hospice crisis")
            .map(|b| b.name)
            .collect();
        assert_eq!(names, vec!["hospice", "continuous_home_care"]);
        assert_eq!(matched_buckets("billing codes").count(), 0);
    }

    #[test]
    fn test_site_review_triggers_medical_review() {
        let set = extract_terms("Is a site review performed annually?");
        assert_eq!(set.domains, vec!["medical_review"]);
    }

    #[test]
    fn test_generic_terms_always_present() {
        let set = extract_terms("");
        assert_eq!(set.generic.len(), GENERIC_TERMS.len());
        assert!(set.domain.is_empty());
        assert!(set.fallback.is_empty());
    }

    #[test]
    fn test_fallback_tokens_filtered_and_deduplicated() {
        let set = extract_terms("Does the plan pay claims, and does the plan pay providers?");
        assert_eq!(set.fallback, vec!["plan", "pay", "claims", "providers"]);
    }

    #[test]
    fn test_fallback_skips_terms_already_present() {
        let set = extract_terms("policy must cover dental");
        assert_eq!(set.fallback, vec!["dental"]);
    }

    #[test]
    fn test_focus_terms_prefer_domain() {
        let set = extract_terms("Does the policy describe transplant evaluation?");
        assert_eq!(set.focus_terms(), set.domain);

        let set = extract_terms("Members receive interpreter services within five business days");
        assert_eq!(
            set.focus_terms(),
            vec!["members", "receive", "interpreter", "services", "within"]
        );
    }

    #[test]
    fn test_primary_excludes_fallback() {
        let set = extract_terms("dental coverage");
        assert!(!set.primary().contains(&"dental".to_string()));
        assert!(set.all().contains(&"dental".to_string()));
    }

    proptest! {
        #[test]
        fn prop_never_empty(req in ".{0,200}") {
            let set = extract_terms(&req);
            prop_assert!(!set.is_empty());
            prop_assert!(!set.primary().is_empty());
        }

        #[test]
        fn prop_all_terms_unique_and_lowercase(req in "[A-Za-z ,.?]{0,120}") {
            let all = extract_terms(&req).all();
            for (i, t) in all.iter().enumerate() {
                prop_assert_eq!(t.to_lowercase(), t.clone());
                prop_assert!(!all[i + 1..].contains(t));
            }
        }
    }
}
