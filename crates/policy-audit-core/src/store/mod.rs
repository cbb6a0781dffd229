//! Storage abstraction for Policy Audit.
//!
//! The [`Store`] trait covers everything the answering pipeline persists:
//! ingested documents and chunks, and the per-requirement answer cache.
//! Backends are pluggable (SQLite in the application, in-memory here).
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{AnswerRecord, Chunk, Document};

/// Abstract storage backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert_document`](Store::upsert_document) | Insert or update a document |
/// | [`replace_chunks`](Store::replace_chunks) | Replace all chunks for a document |
/// | [`load_chunks`](Store::load_chunks) | Corpus in ingestion order |
/// | [`document_titles`](Store::document_titles) | Document id to title |
/// | [`get_answer`](Store::get_answer) | Cached answer for a requirement id |
/// | [`insert_answer`](Store::insert_answer) | Cache an answer, first writer wins |
/// | [`replace_answer`](Store::replace_answer) | Overwrite a cached answer |
/// | [`delete_answer`](Store::delete_answer) | Drop a cached answer |
/// | [`list_answers`](Store::list_answers) | Cached answers, optionally by id prefix |
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert or update a document. Returns its id.
    async fn upsert_document(&self, doc: &Document) -> Result<String>;

    async fn replace_chunks(&self, doc_id: &str, chunks: &[Chunk]) -> Result<()>;

    /// Up to `limit` chunks in ingestion order.
    async fn load_chunks(&self, limit: usize) -> Result<Vec<Chunk>>;

    async fn document_titles(&self) -> Result<HashMap<String, String>>;

    async fn get_answer(&self, requirement_id: &str) -> Result<Option<AnswerRecord>>;

    /// Store `record` unless an answer for the same requirement id exists.
    ///
    /// Returns whichever record is stored afterwards, so a losing concurrent
    /// writer receives the winner's answer.
    async fn insert_answer(&self, record: &AnswerRecord) -> Result<AnswerRecord>;

    /// Store `record`, overwriting any answer for the same requirement id.
    ///
    /// Used for explicit refreshes; the previous answer stays in place until
    /// this call succeeds.
    async fn replace_answer(&self, record: &AnswerRecord) -> Result<AnswerRecord>;

    /// Returns whether an answer was removed.
    async fn delete_answer(&self, requirement_id: &str) -> Result<bool>;

    /// Cached answers ordered by requirement id.
    async fn list_answers(&self, prefix: Option<&str>) -> Result<Vec<AnswerRecord>>;
}
