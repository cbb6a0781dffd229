//! # Policy Audit
//!
//! Answers audit requirements ("Does the P&P state that ...?") against a
//! corpus of policy documents, citing one evidence quote per answer.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌──────────┐
//! │   Ingest    │──▶│   Chunker   │──▶│  SQLite  │
//! │  .txt/.json │   │  (core)     │   │  chunks  │
//! └─────────────┘   └─────────────┘   └────┬─────┘
//!                                          │
//!                                    ┌─────▼──────┐
//!                                    │   Engine   │ terms → scan → rotate
//!                                    │   (core)   │ → extract → decide
//!                                    └─────┬──────┘
//!                      ┌───────────────────┤
//!                      ▼                   ▼
//!                 ┌──────────┐       ┌──────────┐
//!                 │   CLI    │       │   HTTP   │
//!                 │ (audit)  │       │  (axum)  │
//!                 └──────────┘       └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`db`] | SQLite connection pool |
//! | [`migrate`] | Schema creation |
//! | [`sqlite_store`] | SQLite implementation of the core `Store` trait |
//! | [`ingest`] | Text and JSON corpus ingestion |
//! | [`answer`] | Cached, bounded, time-limited answering |
//! | [`evidence`] | Pre-scored candidate consolidation |
//! | [`server`] | HTTP API |
//! | [`logging`] | Tracing subscriber setup |
//!
//! The retrieval and decision algorithms live in `policy_audit_core` and
//! have no I/O.

pub mod answer;
pub mod config;
pub mod db;
pub mod evidence;
pub mod ingest;
pub mod logging;
pub mod migrate;
pub mod server;
pub mod sqlite_store;
