//! Rotation-aware chunk selection.
//!
//! Picks one chunk from a ranked candidate list while steering away from
//! source documents that were cited recently, so a sequence of answers
//! draws its evidence from as many documents as the scores allow.
//!
//! # Tiers
//!
//! 1. Documents never cited in this session: raw score.
//! 2. Cited, but not among the `recent_window` most recent documents:
//!    score halved (`max(1, score / 2)`).
//! 3. Cited recently: score quartered (`max(1, score / 4)`).
//!
//! The first tier holding a positive score wins; within a tier the highest
//! score wins and equal scores keep scan order. When nothing scores, the
//! first unused candidate is taken, then the first used one, then the first
//! candidate overall.
//!
//! # State
//!
//! [`UsageHistory`] is explicit state owned by the caller. Long-lived
//! services keep one history per session in a [`RotationRegistry`], which
//! serializes every read-then-record behind a single mutex.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};

use serde::Serialize;

use crate::score::Candidate;

/// Default number of distinct documents treated as "recently used".
pub const DEFAULT_RECENT_WINDOW: usize = 3;

/// Ordered memory of cited documents, most recent first.
///
/// Each document id appears at most once. The history only grows; it is
/// never trimmed or reset except through [`UsageHistory::clear`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct UsageHistory {
    order: Vec<String>,
    #[serde(skip)]
    members: HashSet<String>,
}

impl UsageHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, doc_id: &str) -> bool {
        self.members.contains(doc_id)
    }

    /// Whether `doc_id` is among the `window` most recently cited documents.
    pub fn is_recent(&self, doc_id: &str, window: usize) -> bool {
        self.order.iter().take(window).any(|d| d == doc_id)
    }

    /// Move (or insert) `doc_id` to the front.
    pub fn record(&mut self, doc_id: &str) {
        if self.members.contains(doc_id) {
            self.order.retain(|d| d != doc_id);
        } else {
            self.members.insert(doc_id.to_string());
        }
        self.order.insert(0, doc_id.to_string());
    }

    /// Most recent first.
    pub fn documents(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.members.clear();
    }
}

/// Tuning for [`select`].
#[derive(Debug, Clone, Copy)]
pub struct RotationPolicy {
    pub recent_window: usize,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            recent_window: DEFAULT_RECENT_WINDOW,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tier {
    Unused,
    Used,
    Recent,
}

fn penalize(score: u32, divisor: u32) -> u32 {
    if score == 0 {
        0
    } else {
        (score / divisor).max(1)
    }
}

/// Choose a candidate without touching the history.
///
/// Returns the position in `candidates`, or `None` when it is empty.
pub fn choose(
    candidates: &[Candidate],
    history: &UsageHistory,
    policy: RotationPolicy,
) -> Option<usize> {
    if candidates.is_empty() {
        return None;
    }

    let tier_of = |c: &Candidate| {
        if !history.contains(&c.doc_id) {
            Tier::Unused
        } else if history.is_recent(&c.doc_id, policy.recent_window) {
            Tier::Recent
        } else {
            Tier::Used
        }
    };

    for (tier, divisor) in [(Tier::Unused, 1), (Tier::Used, 2), (Tier::Recent, 4)] {
        let mut best: Option<(usize, u32)> = None;
        for (pos, c) in candidates.iter().enumerate() {
            if tier_of(c) != tier {
                continue;
            }
            let effective = penalize(c.score, divisor);
            if effective > 0 && best.map_or(true, |(_, s)| effective > s) {
                best = Some((pos, effective));
            }
        }
        if let Some((pos, score)) = best {
            tracing::debug!(?tier, pos, score, "rotation tier selected candidate");
            return Some(pos);
        }
    }

    let fallback = candidates
        .iter()
        .position(|c| !history.contains(&c.doc_id))
        .or_else(|| candidates.iter().position(|c| history.contains(&c.doc_id)))
        .unwrap_or(0);
    tracing::debug!(pos = fallback, "no positive score; using fallback candidate");
    Some(fallback)
}

/// Choose a candidate and record its document in the history.
pub fn select(
    candidates: &[Candidate],
    history: &mut UsageHistory,
    policy: RotationPolicy,
) -> Option<usize> {
    let pos = choose(candidates, history, policy)?;
    history.record(&candidates[pos].doc_id);
    Some(pos)
}

/// Per-session usage histories behind a single guard.
///
/// Every mutation goes through one `Mutex`, so concurrent selections for
/// the same session are applied one after another and never lose an
/// update.
#[derive(Debug, Default)]
pub struct RotationRegistry {
    sessions: Mutex<HashMap<String, UsageHistory>>,
}

impl RotationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically choose a candidate and record it for `session`.
    pub fn select(
        &self,
        session: &str,
        candidates: &[Candidate],
        policy: RotationPolicy,
    ) -> Option<usize> {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        let history = sessions.entry(session.to_string()).or_default();
        select(candidates, history, policy)
    }

    /// Copy of a session's history, if it exists.
    pub fn snapshot(&self, session: &str) -> Option<UsageHistory> {
        let sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        sessions.get(session).cloned()
    }

    /// Forget a session. Returns whether it existed.
    pub fn reset(&self, session: &str) -> bool {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        sessions.remove(session).is_some()
    }

    pub fn session_count(&self) -> usize {
        let sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        sessions.len()
    }
}
