//! # Policy Audit Core
//!
//! Evidence retrieval and ranking for yes/no policy audit questions: term
//! extraction, chunk scoring, rotation-aware selection, sentence-level
//! quoting, the conservative answer heuristic, and consolidation of
//! pre-scored retriever hits.
//!
//! Everything here is synchronous and free of I/O except the async
//! [`store::Store`] trait and its in-memory implementation. The
//! application crate supplies SQLite storage, the CLI, and the HTTP server.

pub mod chunk;
pub mod consolidate;
pub mod decision;
pub mod engine;
pub mod extract;
pub mod models;
pub mod rotation;
pub mod score;
pub mod similarity;
pub mod store;
pub mod terms;
