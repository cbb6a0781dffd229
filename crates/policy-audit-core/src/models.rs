//! Core data models shared by the engine, the store, and the application.
//!
//! These types represent the documents, chunks, evidence, and answers that
//! flow through the retrieval and answering pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Title used when a document's metadata cannot be resolved.
pub const UNKNOWN_DOCUMENT: &str = "Unknown Document";

/// A policy document registered at ingestion time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub source_path: Option<String>,
    pub page_count: u32,
    pub created_at: i64,
}

/// A contiguous span of extracted document text with page attribution.
///
/// Chunks are immutable once ingested; the engine only ever reads them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub doc_id: String,
    #[serde(default = "first_page")]
    pub page_from: u32,
    #[serde(default = "first_page")]
    pub page_to: u32,
    pub text: String,
    /// SHA-256 of `text`, filled in by the chunker.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub hash: String,
}

fn first_page() -> u32 {
    1
}

/// The quoted excerpt and source attribution supporting an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceBlock {
    pub doc_id: String,
    pub filename: String,
    pub page: u32,
    pub quote: String,
}

/// Determination for one requirement.
///
/// Each variant carries exactly the fields that make sense for it; the
/// serialized form is flat with an `answer` tag (`"YES"`, `"NO"`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "answer", rename_all = "UPPERCASE")]
pub enum Answer {
    Yes {
        confidence: f64,
        reasoning: String,
        evidence: EvidenceBlock,
    },
    No {
        confidence: f64,
        reasoning: String,
        evidence: EvidenceBlock,
    },
    /// No usable evidence in the corpus; callers may fall back to an LLM.
    Unknown { confidence: f64, reasoning: String },
    /// The pipeline could not run to completion (timeout, worker panic).
    Error { message: String },
}

impl Answer {
    pub fn label(&self) -> &'static str {
        match self {
            Answer::Yes { .. } => "YES",
            Answer::No { .. } => "NO",
            Answer::Unknown { .. } => "UNKNOWN",
            Answer::Error { .. } => "ERROR",
        }
    }

    pub fn confidence(&self) -> f64 {
        match self {
            Answer::Yes { confidence, .. }
            | Answer::No { confidence, .. }
            | Answer::Unknown { confidence, .. } => *confidence,
            Answer::Error { .. } => 0.0,
        }
    }

    pub fn evidence(&self) -> Option<&EvidenceBlock> {
        match self {
            Answer::Yes { evidence, .. } | Answer::No { evidence, .. } => Some(evidence),
            _ => None,
        }
    }

    /// Whether this answer may be persisted and served from cache.
    pub fn is_cacheable(&self) -> bool {
        !matches!(self, Answer::Error { .. })
    }
}

/// Persisted determination for one requirement id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub requirement_id: String,
    pub requirement: String,
    #[serde(flatten)]
    pub answer: Answer,
    pub created_at: DateTime<Utc>,
}

impl AnswerRecord {
    pub fn new(requirement_id: &str, requirement: &str, answer: Answer) -> Self {
        Self {
            requirement_id: requirement_id.to_string(),
            requirement: requirement.to_string(),
            answer,
            created_at: Utc::now(),
        }
    }
}
