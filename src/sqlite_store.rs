//! SQLite-backed [`Store`] implementation.
//!
//! Answers are stored as their full JSON record alongside a few indexed
//! columns. `INSERT OR IGNORE` on the requirement id makes the answer cache
//! write-once: concurrent writers race, the first row wins, and everyone
//! reads back the same record.

use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use policy_audit_core::models::{AnswerRecord, Chunk, Document};
use policy_audit_core::store::Store;

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn page(row: &SqliteRow, column: &str) -> Result<u32> {
    let raw: i64 = row.try_get(column)?;
    Ok(u32::try_from(raw).unwrap_or(1))
}

fn decode_record(row: &SqliteRow) -> Result<AnswerRecord> {
    let json: String = row.try_get("record_json")?;
    serde_json::from_str(&json).context("Corrupt answer record in database")
}

#[async_trait]
impl Store for SqliteStore {
    async fn upsert_document(&self, doc: &Document) -> Result<String> {
        sqlx::query(
            r#"
            INSERT INTO documents (id, title, source_path, page_count, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                source_path = excluded.source_path,
                page_count = excluded.page_count
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.title)
        .bind(&doc.source_path)
        .bind(i64::from(doc.page_count))
        .bind(doc.created_at)
        .execute(&self.pool)
        .await?;

        Ok(doc.id.clone())
    }

    async fn replace_chunks(&self, doc_id: &str, chunks: &[Chunk]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(doc_id)
            .execute(&mut *tx)
            .await?;

        for chunk in chunks {
            sqlx::query(
                "INSERT INTO chunks (id, document_id, page_from, page_to, text, hash) VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&chunk.id)
            .bind(doc_id)
            .bind(i64::from(chunk.page_from))
            .bind(i64::from(chunk.page_to))
            .bind(&chunk.text)
            .bind(&chunk.hash)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn load_chunks(&self, limit: usize) -> Result<Vec<Chunk>> {
        let rows = sqlx::query(
            "SELECT id, document_id, page_from, page_to, text, hash FROM chunks ORDER BY rowid ASC LIMIT ?",
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<Chunk> {
                Ok(Chunk {
                    id: row.try_get("id")?,
                    doc_id: row.try_get("document_id")?,
                    page_from: page(row, "page_from")?,
                    page_to: page(row, "page_to")?,
                    text: row.try_get("text")?,
                    hash: row.try_get("hash")?,
                })
            })
            .collect()
    }

    async fn document_titles(&self) -> Result<HashMap<String, String>> {
        let rows = sqlx::query("SELECT id, title FROM documents")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| -> Result<(String, String)> {
                Ok((row.try_get("id")?, row.try_get("title")?))
            })
            .collect()
    }

    async fn get_answer(&self, requirement_id: &str) -> Result<Option<AnswerRecord>> {
        let row = sqlx::query("SELECT record_json FROM answers WHERE requirement_id = ?")
            .bind(requirement_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(decode_record).transpose()
    }

    async fn insert_answer(&self, record: &AnswerRecord) -> Result<AnswerRecord> {
        let json = serde_json::to_string(record)?;
        let inserted = sqlx::query(
            r#"
            INSERT OR IGNORE INTO answers (requirement_id, requirement, answer, confidence, record_json, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.requirement_id)
        .bind(&record.requirement)
        .bind(record.answer.label())
        .bind(record.answer.confidence())
        .bind(&json)
        .bind(record.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if inserted == 0 {
            tracing::debug!(requirement_id = %record.requirement_id, "answer already cached");
        }

        self.get_answer(&record.requirement_id)
            .await?
            .with_context(|| format!("answer for {} vanished after insert", record.requirement_id))
    }

    async fn replace_answer(&self, record: &AnswerRecord) -> Result<AnswerRecord> {
        let json = serde_json::to_string(record)?;
        sqlx::query(
            r#"
            INSERT INTO answers (requirement_id, requirement, answer, confidence, record_json, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(requirement_id) DO UPDATE SET
                requirement = excluded.requirement,
                answer = excluded.answer,
                confidence = excluded.confidence,
                record_json = excluded.record_json,
                created_at = excluded.created_at
            "#,
        )
        .bind(&record.requirement_id)
        .bind(&record.requirement)
        .bind(record.answer.label())
        .bind(record.answer.confidence())
        .bind(&json)
        .bind(record.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(record.clone())
    }

    async fn delete_answer(&self, requirement_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM answers WHERE requirement_id = ?")
            .bind(requirement_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_answers(&self, prefix: Option<&str>) -> Result<Vec<AnswerRecord>> {
        let rows = match prefix {
            Some(p) => {
                sqlx::query(
                    "SELECT record_json FROM answers WHERE substr(requirement_id, 1, length(?1)) = ?1 ORDER BY requirement_id ASC",
                )
                .bind(p)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query("SELECT record_json FROM answers ORDER BY requirement_id ASC")
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        rows.iter().map(decode_record).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::create_schema;
    use policy_audit_core::models::{Answer, EvidenceBlock};
    use sqlx::sqlite::SqlitePoolOptions;

    async fn store() -> SqliteStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        create_schema(&pool).await.unwrap();
        SqliteStore::new(pool)
    }

    fn chunk(id: &str, doc: &str, page: u32) -> Chunk {
        Chunk {
            id: id.to_string(),
            doc_id: doc.to_string(),
            page_from: page,
            page_to: page,
            text: format!("text {}", id),
            hash: "h".to_string(),
        }
    }

    fn yes(id: &str, reasoning: &str) -> AnswerRecord {
        AnswerRecord::new(
            id,
            "Does the policy cover hospice?",
            Answer::Yes {
                confidence: 0.9,
                reasoning: reasoning.to_string(),
                evidence: EvidenceBlock {
                    doc_id: "d1".to_string(),
                    filename: "GG.1200".to_string(),
                    page: 2,
                    quote: "Hospice care shall be provided.".to_string(),
                },
            },
        )
    }

    #[tokio::test]
    async fn test_documents_and_chunks_roundtrip_in_order() {
        let store = store().await;
        store
            .upsert_document(&Document {
                id: "d1".to_string(),
                title: "GG.1200".to_string(),
                source_path: Some("gg1200.txt".to_string()),
                page_count: 2,
                created_at: 1,
            })
            .await
            .unwrap();
        store
            .replace_chunks("d1", &[chunk("a", "d1", 1), chunk("b", "d1", 2)])
            .await
            .unwrap();
        store
            .upsert_document(&Document {
                id: "d2".to_string(),
                title: "GG.1300".to_string(),
                source_path: None,
                page_count: 1,
                created_at: 2,
            })
            .await
            .unwrap();
        store.replace_chunks("d2", &[chunk("c", "d2", 1)]).await.unwrap();

        let chunks = store.load_chunks(10).await.unwrap();
        let ids: Vec<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(chunks[1].page_from, 2);
        assert_eq!(store.load_chunks(2).await.unwrap().len(), 2);
        assert_eq!(store.document_titles().await.unwrap()["d1"], "GG.1200");
    }

    #[tokio::test]
    async fn test_answer_cache_is_write_once() {
        let store = store().await;
        let first = store.insert_answer(&yes("Q1", "first")).await.unwrap();
        let again = store.insert_answer(&yes("Q1", "second")).await.unwrap();
        assert_eq!(first, again);
        match again.answer {
            Answer::Yes { reasoning, .. } => assert_eq!(reasoning, "first"),
            other => panic!("unexpected answer {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_replace_answer_overwrites_cached_record() {
        let store = store().await;
        store.insert_answer(&yes("Q1", "first")).await.unwrap();
        store.replace_answer(&yes("Q1", "second")).await.unwrap();

        let stored = store.get_answer("Q1").await.unwrap().unwrap();
        match stored.answer {
            Answer::Yes { reasoning, .. } => assert_eq!(reasoning, "second"),
            other => panic!("unexpected answer {:?}", other),
        }
        assert_eq!(store.list_answers(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_by_prefix_and_delete() {
        let store = store().await;
        for id in ["HOS_2", "HOS_1", "TRN_1", "HOS%"] {
            store.insert_answer(&yes(id, "r")).await.unwrap();
        }
        let ids: Vec<String> = store
            .list_answers(Some("HOS_"))
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.requirement_id)
            .collect();
        assert_eq!(ids, vec!["HOS_1", "HOS_2"]);

        assert!(store.delete_answer("HOS_1").await.unwrap());
        assert!(!store.delete_answer("HOS_1").await.unwrap());
        assert_eq!(store.list_answers(None).await.unwrap().len(), 3);
    }
}
