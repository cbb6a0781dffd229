//! In-memory [`Store`] implementation for tests and embedding.
//!
//! Uses `HashMap`/`BTreeMap` and `Vec` behind `std::sync::RwLock`.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::models::{AnswerRecord, Chunk, Document};

use super::Store;

#[derive(Default)]
pub struct InMemoryStore {
    docs: RwLock<HashMap<String, Document>>,
    chunks: RwLock<Vec<Chunk>>,
    answers: RwLock<BTreeMap<String, AnswerRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("in-memory store lock poisoned")
}

#[async_trait]
impl Store for InMemoryStore {
    async fn upsert_document(&self, doc: &Document) -> Result<String> {
        let mut docs = self.docs.write().map_err(poisoned)?;
        let created_at = docs.get(&doc.id).map_or(doc.created_at, |d| d.created_at);
        docs.insert(
            doc.id.clone(),
            Document {
                created_at,
                ..doc.clone()
            },
        );
        Ok(doc.id.clone())
    }

    async fn replace_chunks(&self, doc_id: &str, chunks: &[Chunk]) -> Result<()> {
        let mut stored = self.chunks.write().map_err(poisoned)?;
        stored.retain(|c| c.doc_id != doc_id);
        stored.extend(chunks.iter().cloned());
        Ok(())
    }

    async fn load_chunks(&self, limit: usize) -> Result<Vec<Chunk>> {
        let stored = self.chunks.read().map_err(poisoned)?;
        Ok(stored.iter().take(limit).cloned().collect())
    }

    async fn document_titles(&self) -> Result<HashMap<String, String>> {
        let docs = self.docs.read().map_err(poisoned)?;
        Ok(docs
            .values()
            .map(|d| (d.id.clone(), d.title.clone()))
            .collect())
    }

    async fn get_answer(&self, requirement_id: &str) -> Result<Option<AnswerRecord>> {
        let answers = self.answers.read().map_err(poisoned)?;
        Ok(answers.get(requirement_id).cloned())
    }

    async fn insert_answer(&self, record: &AnswerRecord) -> Result<AnswerRecord> {
        let mut answers = self.answers.write().map_err(poisoned)?;
        Ok(answers
            .entry(record.requirement_id.clone())
            .or_insert_with(|| record.clone())
            .clone())
    }

    async fn replace_answer(&self, record: &AnswerRecord) -> Result<AnswerRecord> {
        let mut answers = self.answers.write().map_err(poisoned)?;
        answers.insert(record.requirement_id.clone(), record.clone());
        Ok(record.clone())
    }

    async fn delete_answer(&self, requirement_id: &str) -> Result<bool> {
        let mut answers = self.answers.write().map_err(poisoned)?;
        Ok(answers.remove(requirement_id).is_some())
    }

    async fn list_answers(&self, prefix: Option<&str>) -> Result<Vec<AnswerRecord>> {
        let answers = self.answers.read().map_err(poisoned)?;
        Ok(answers
            .values()
            .filter(|r| prefix.map_or(true, |p| r.requirement_id.starts_with(p)))
            .cloned()
            .collect())
    }
}
