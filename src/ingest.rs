//! Corpus ingestion.
//!
//! Two input formats are accepted:
//!
//! | Extension | Content |
//! |-----------|---------|
//! | `.txt` | Extracted document text, pages separated by form feed (`\x0c`) |
//! | `.json` | Pre-extracted chunks: `[{id, doc_id, page_from, page_to, text}]`, or `{documents: [{id, title}], chunks: [...]}` |
//!
//! A directory is walked recursively and every supported file ingested in
//! path order. Re-ingesting a document replaces its chunks.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use walkdir::WalkDir;

use policy_audit_core::chunk::{chunk_pages, content_hash};
use policy_audit_core::models::{Chunk, Document, UNKNOWN_DOCUMENT};
use policy_audit_core::store::Store;

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

const PAGE_BREAK: char = '\x0c';
const DOC_ID_LEN: usize = 16;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestSummary {
    pub documents: usize,
    pub chunks: usize,
    pub skipped: usize,
}

#[derive(Debug, Deserialize)]
struct CorpusDocument {
    id: String,
    #[serde(default)]
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CorpusFile {
    Chunks(Vec<Chunk>),
    Corpus {
        #[serde(default)]
        documents: Vec<CorpusDocument>,
        chunks: Vec<Chunk>,
    },
}

pub async fn run_ingest(config: &Config, path: &Path, title: Option<&str>) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);
    let summary = ingest_path(&store, path, title, config.chunking.max_tokens).await?;

    println!("Ingest {}:", path.display());
    println!("  documents: {}", summary.documents);
    println!("  chunks: {}", summary.chunks);
    println!("  skipped files: {}", summary.skipped);
    println!("ok");

    store.pool().close().await;
    Ok(())
}

/// Ingest a file or a directory tree into `store`.
///
/// `title` overrides the derived title and is only allowed for a single
/// `.txt` file.
pub async fn ingest_path(
    store: &dyn Store,
    path: &Path,
    title: Option<&str>,
    max_tokens: usize,
) -> Result<IngestSummary> {
    if !path.exists() {
        bail!("Path not found: {}", path.display());
    }

    let mut summary = IngestSummary::default();

    if path.is_dir() {
        if title.is_some() {
            bail!("--title applies to a single file, not a directory");
        }
        let (files, skipped) = scan_dir(path)?;
        summary.skipped = skipped;
        for file in files {
            ingest_file(store, &file, None, max_tokens, &mut summary).await?;
        }
    } else if !ingest_file(store, path, title, max_tokens, &mut summary).await? {
        bail!(
            "Unsupported file type: {} (expected .txt or .json)",
            path.display()
        );
    }

    tracing::info!(
        path = %path.display(),
        documents = summary.documents,
        chunks = summary.chunks,
        skipped = summary.skipped,
        "ingest complete"
    );
    Ok(summary)
}

/// Returns `false` for unsupported extensions.
async fn ingest_file(
    store: &dyn Store,
    path: &Path,
    title: Option<&str>,
    max_tokens: usize,
    summary: &mut IngestSummary,
) -> Result<bool> {
    match extension(path).as_deref() {
        Some("txt") => {
            ingest_text(store, path, title, max_tokens, summary).await?;
            Ok(true)
        }
        Some("json") => {
            if title.is_some() {
                bail!("--title does not apply to JSON corpora; set titles in the file");
            }
            ingest_corpus(store, path, summary).await?;
            Ok(true)
        }
        _ => Ok(false),
    }
}

async fn ingest_text(
    store: &dyn Store,
    path: &Path,
    title: Option<&str>,
    max_tokens: usize,
    summary: &mut IngestSummary,
) -> Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let pages: Vec<&str> = text.split(PAGE_BREAK).collect();

    let source = path.display().to_string();
    let doc_id = document_id(&source);
    let title = title
        .map(str::to_string)
        .or_else(|| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .unwrap_or_else(|| UNKNOWN_DOCUMENT.to_string());

    let chunks = chunk_pages(&doc_id, &pages, max_tokens);
    store
        .upsert_document(&Document {
            id: doc_id.clone(),
            title,
            source_path: Some(source),
            page_count: u32::try_from(pages.len()).unwrap_or(u32::MAX),
            created_at: chrono::Utc::now().timestamp(),
        })
        .await?;
    store.replace_chunks(&doc_id, &chunks).await?;

    tracing::debug!(
        doc_id = %doc_id,
        pages = pages.len(),
        chunks = chunks.len(),
        "ingested text document"
    );
    summary.documents += 1;
    summary.chunks += chunks.len();
    Ok(())
}

async fn ingest_corpus(store: &dyn Store, path: &Path, summary: &mut IngestSummary) -> Result<()> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let (documents, chunks) = match serde_json::from_str::<CorpusFile>(&raw)
        .with_context(|| format!("Failed to parse chunk corpus {}", path.display()))?
    {
        CorpusFile::Chunks(chunks) => (Vec::new(), chunks),
        CorpusFile::Corpus { documents, chunks } => (documents, chunks),
    };

    let titles: HashMap<String, Option<String>> =
        documents.into_iter().map(|d| (d.id, d.title)).collect();

    let mut order: Vec<String> = Vec::new();
    let mut grouped: HashMap<String, Vec<Chunk>> = HashMap::new();
    for mut chunk in chunks {
        if chunk.id.trim().is_empty() || chunk.doc_id.trim().is_empty() {
            bail!("Chunk in {} is missing id or doc_id", path.display());
        }
        if chunk.hash.is_empty() {
            chunk.hash = content_hash(&chunk.text);
        }
        if !grouped.contains_key(&chunk.doc_id) {
            order.push(chunk.doc_id.clone());
        }
        grouped.entry(chunk.doc_id.clone()).or_default().push(chunk);
    }

    let now = chrono::Utc::now().timestamp();
    for doc_id in order {
        let doc_chunks = grouped.remove(&doc_id).unwrap_or_default();
        let title = titles
            .get(&doc_id)
            .cloned()
            .flatten()
            .unwrap_or_else(|| UNKNOWN_DOCUMENT.to_string());
        let page_count = doc_chunks.iter().map(|c| c.page_to).max().unwrap_or(0);

        store
            .upsert_document(&Document {
                id: doc_id.clone(),
                title,
                source_path: Some(path.display().to_string()),
                page_count,
                created_at: now,
            })
            .await?;
        store.replace_chunks(&doc_id, &doc_chunks).await?;

        summary.documents += 1;
        summary.chunks += doc_chunks.len();
    }
    Ok(())
}

/// Supported files in path order, and the number of other files seen.
fn scan_dir(root: &Path) -> Result<(Vec<PathBuf>, usize)> {
    let mut files = Vec::new();
    let mut skipped = 0;
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        if matches!(extension(entry.path()).as_deref(), Some("txt" | "json")) {
            files.push(entry.into_path());
        } else {
            tracing::debug!(path = %entry.path().display(), "skipping unsupported file");
            skipped += 1;
        }
    }
    Ok((files, skipped))
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
}

/// Stable document id derived from the source path.
fn document_id(source: &str) -> String {
    content_hash(source)[..DOC_ID_LEN].to_string()
}
