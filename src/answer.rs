//! Answer service: caching, bounded concurrency, and timeouts around the
//! synchronous engine.
//!
//! Each request goes through:
//!
//! 1. Cache lookup by requirement id (skipped with `refresh`).
//! 2. The per-id gate: at most one computation per requirement id runs at a
//!    time, and waiters re-check the cache once they get their turn.
//! 3. A semaphore permit (`engine.max_concurrent`).
//! 4. Corpus load, then the engine on tokio's blocking pool, under
//!    `engine.timeout_secs`.
//! 5. Cache write: write-once for normal requests, overwrite for refreshes.
//!    `ERROR` answers are returned but never stored, so a failed refresh
//!    leaves the previous answer in place.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex as AsyncMutex, Semaphore};

use policy_audit_core::engine::{AnswerRequest, Engine};
use policy_audit_core::models::{Answer, AnswerRecord};
use policy_audit_core::rotation::RotationRegistry;
use policy_audit_core::store::Store;

use crate::config::{Config, EngineConfig};
use crate::db;
use crate::sqlite_store::SqliteStore;

/// Session used when the caller does not name one.
pub const DEFAULT_SESSION: &str = "default";

/// One requirement to answer, as read from a batch file or a request body.
#[derive(Debug, Clone, Deserialize)]
pub struct Question {
    #[serde(alias = "question_id")]
    pub requirement_id: String,
    #[serde(alias = "question")]
    pub requirement: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnswerOutcome {
    #[serde(flatten)]
    pub record: AnswerRecord,
    /// Served from the cache without running the engine.
    pub cached: bool,
}

/// Per-requirement-id gates. An entry lives while some request holds or
/// waits on it.
#[derive(Default)]
struct InFlight {
    gates: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl InFlight {
    fn enter(&self, requirement_id: &str) -> Ticket<'_> {
        let mut gates = self.gates.lock().unwrap_or_else(PoisonError::into_inner);
        let gate = gates.entry(requirement_id.to_string()).or_default().clone();
        Ticket {
            inflight: self,
            requirement_id: requirement_id.to_string(),
            gate,
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.gates.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

struct Ticket<'a> {
    inflight: &'a InFlight,
    requirement_id: String,
    gate: Arc<AsyncMutex<()>>,
}

impl Drop for Ticket<'_> {
    fn drop(&mut self) {
        let mut gates = self
            .inflight
            .gates
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // One reference in the map, one here: nobody else is waiting.
        if Arc::strong_count(&self.gate) <= 2 {
            gates.remove(&self.requirement_id);
        }
    }
}

#[derive(Clone)]
pub struct AnswerService {
    store: Arc<dyn Store>,
    engine: Arc<Engine>,
    registry: Arc<RotationRegistry>,
    inflight: Arc<InFlight>,
    permits: Arc<Semaphore>,
    scan_limit: usize,
    timeout: Duration,
}

impl AnswerService {
    pub fn new(store: Arc<dyn Store>, config: &EngineConfig) -> Self {
        Self {
            store,
            engine: Arc::new(Engine::new(config.params())),
            registry: Arc::new(RotationRegistry::new()),
            inflight: Arc::new(InFlight::default()),
            permits: Arc::new(Semaphore::new(config.max_concurrent)),
            scan_limit: config.scan_limit,
            timeout: config.timeout(),
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn registry(&self) -> &RotationRegistry {
        &self.registry
    }

    /// Answer one requirement, using the cache unless `refresh` is set.
    ///
    /// Concurrent calls for the same requirement id are serialized, so the
    /// engine runs (and records a rotation pick) at most once per id unless
    /// a refresh is requested.
    pub async fn answer(
        &self,
        requirement_id: &str,
        requirement: &str,
        session: &str,
        refresh: bool,
    ) -> Result<AnswerOutcome> {
        if requirement_id.trim().is_empty() {
            bail!("requirement_id must not be empty");
        }

        if !refresh {
            if let Some(outcome) = self.cached(requirement_id).await? {
                return Ok(outcome);
            }
        }

        let ticket = self.inflight.enter(requirement_id);
        let _turn = ticket.gate.lock().await;

        if !refresh {
            if let Some(outcome) = self.cached(requirement_id).await? {
                return Ok(outcome);
            }
        }

        let answer = self.compute(requirement_id, requirement, session).await?;
        let record = AnswerRecord::new(requirement_id, requirement, answer);

        if !record.answer.is_cacheable() {
            return Ok(AnswerOutcome {
                record,
                cached: false,
            });
        }

        let stored = if refresh {
            self.store.replace_answer(&record).await?
        } else {
            self.store.insert_answer(&record).await?
        };
        let cached = stored != record;
        Ok(AnswerOutcome {
            record: stored,
            cached,
        })
    }

    async fn cached(&self, requirement_id: &str) -> Result<Option<AnswerOutcome>> {
        let record = self.store.get_answer(requirement_id).await?;
        if record.is_some() {
            tracing::debug!(requirement_id, "answer served from cache");
        }
        Ok(record.map(|record| AnswerOutcome {
            record,
            cached: true,
        }))
    }

    async fn compute(
        &self,
        requirement_id: &str,
        requirement: &str,
        session: &str,
    ) -> Result<Answer> {
        let _permit = self
            .permits
            .acquire()
            .await
            .context("answer service is shutting down")?;

        let chunks = self.store.load_chunks(self.scan_limit).await?;
        let titles = self.store.document_titles().await?;

        let engine = self.engine.clone();
        let registry = self.registry.clone();
        let (id, req, session) = (
            requirement_id.to_string(),
            requirement.to_string(),
            session.to_string(),
        );
        let task = tokio::task::spawn_blocking(move || {
            let request = AnswerRequest {
                requirement_id: &id,
                requirement: &req,
                chunks: &chunks,
                titles: &titles,
            };
            engine.answer_shared(&request, &registry, &session)
        });

        // A timed-out task keeps running on the blocking pool; only its
        // result is discarded.
        let answer = match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(answer)) => answer,
            Ok(Err(join_err)) => {
                tracing::error!(requirement_id, error = %join_err, "answer pipeline failed");
                Answer::Error {
                    message: format!("answer pipeline failed: {}", join_err),
                }
            }
            Err(_) => {
                let secs = self.timeout.as_secs();
                tracing::warn!(requirement_id, timeout_secs = secs, "answer pipeline timed out");
                Answer::Error {
                    message: format!("answer pipeline timed out after {}s", secs),
                }
            }
        };
        Ok(answer)
    }
}

async fn open_service(config: &Config) -> Result<AnswerService> {
    let pool = db::connect(config).await?;
    Ok(AnswerService::new(
        Arc::new(SqliteStore::new(pool)),
        &config.engine,
    ))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub async fn run_answer(
    config: &Config,
    requirement_id: &str,
    requirement: &str,
    refresh: bool,
) -> Result<()> {
    let service = open_service(config).await?;
    let outcome = service
        .answer(requirement_id, requirement, DEFAULT_SESSION, refresh)
        .await?;
    print_json(&outcome)
}

/// Answer every question in a JSON array, in order, sharing one rotation
/// session so evidence is spread across documents.
pub async fn run_batch(config: &Config, path: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let questions: Vec<Question> = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse questions file {}", path.display()))?;

    let service = open_service(config).await?;
    let session = uuid::Uuid::new_v4().to_string();
    let mut outcomes = Vec::with_capacity(questions.len());
    for q in &questions {
        outcomes.push(
            service
                .answer(&q.requirement_id, &q.requirement, &session, false)
                .await?,
        );
    }

    tracing::info!(questions = questions.len(), session = %session, "batch complete");
    print_json(&outcomes)
}

pub async fn run_answers_list(config: &Config, prefix: Option<&str>) -> Result<()> {
    let service = open_service(config).await?;
    let records = service.store().list_answers(prefix).await?;
    if records.is_empty() {
        println!("No cached answers.");
        return Ok(());
    }
    for r in &records {
        println!(
            "{}\t{}\t{:.2}\t{}",
            r.requirement_id,
            r.answer.label(),
            r.answer.confidence(),
            r.requirement
        );
    }
    Ok(())
}

pub async fn run_answers_get(config: &Config, requirement_id: &str) -> Result<()> {
    let service = open_service(config).await?;
    match service.store().get_answer(requirement_id).await? {
        Some(record) => print_json(&record),
        None => bail!("answer not found: {}", requirement_id),
    }
}

pub async fn run_answers_delete(config: &Config, requirement_id: &str) -> Result<()> {
    let service = open_service(config).await?;
    if !service.store().delete_answer(requirement_id).await? {
        bail!("answer not found: {}", requirement_id);
    }
    println!("Deleted answer {}", requirement_id);
    Ok(())
}
