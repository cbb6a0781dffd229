//! # Policy Audit CLI (`audit`)
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `audit init` | Create the SQLite database and schema |
//! | `audit ingest <path>` | Ingest a `.txt`/`.json` file or a directory |
//! | `audit answer <id> "<requirement>"` | Answer one requirement (cached) |
//! | `audit batch <questions.json>` | Answer a list of requirements in one rotation session |
//! | `audit evidence <request.json>` | Consolidate pre-scored candidates |
//! | `audit answers list\|get\|delete` | Inspect the answer cache |
//! | `audit serve` | Start the HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! audit init --config ./config/audit.toml
//! audit ingest ./policies
//! audit answer HOS_1 "Does the P&P state that hospice care must be provided to MCP members?"
//! audit answers list --prefix HOS_
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use policy_audit::{answer, config, evidence, ingest, logging, migrate, server};

/// Policy audit CLI: answer compliance requirements from a policy corpus.
#[derive(Parser)]
#[command(
    name = "audit",
    about = "Answer audit requirements against a corpus of policy documents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/audit.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Ingest policy documents.
    ///
    /// `.txt` files are chunked (form feed separates pages); `.json` files
    /// carry pre-extracted chunks. Directories are walked recursively.
    Ingest {
        /// File or directory to ingest.
        path: PathBuf,

        /// Document title for a single `.txt` file (defaults to the file stem).
        #[arg(long)]
        title: Option<String>,
    },

    /// Answer one requirement.
    Answer {
        /// Requirement identifier; answers are cached under it.
        requirement_id: String,

        /// Requirement text.
        requirement: String,

        /// Drop any cached answer and recompute.
        #[arg(long)]
        refresh: bool,
    },

    /// Answer every requirement in a JSON file of `{requirement_id, requirement}`.
    Batch {
        path: PathBuf,
    },

    /// Consolidate a JSON request of pre-scored candidates into citations.
    Evidence {
        path: PathBuf,
    },

    /// Inspect or edit the answer cache.
    Answers {
        #[command(subcommand)]
        action: AnswersAction,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[derive(Subcommand)]
enum AnswersAction {
    /// List cached answers, ordered by requirement id.
    List {
        /// Only ids starting with this prefix.
        #[arg(long)]
        prefix: Option<String>,
    },
    /// Print one cached answer as JSON.
    Get { requirement_id: String },
    /// Remove one cached answer.
    Delete { requirement_id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_tracing();
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest { path, title } => {
            ingest::run_ingest(&cfg, &path, title.as_deref()).await?;
        }
        Commands::Answer {
            requirement_id,
            requirement,
            refresh,
        } => {
            answer::run_answer(&cfg, &requirement_id, &requirement, refresh).await?;
        }
        Commands::Batch { path } => {
            answer::run_batch(&cfg, &path).await?;
        }
        Commands::Evidence { path } => {
            evidence::run_evidence(&cfg, &path)?;
        }
        Commands::Answers { action } => match action {
            AnswersAction::List { prefix } => {
                answer::run_answers_list(&cfg, prefix.as_deref()).await?;
            }
            AnswersAction::Get { requirement_id } => {
                answer::run_answers_get(&cfg, &requirement_id).await?;
            }
            AnswersAction::Delete { requirement_id } => {
                answer::run_answers_delete(&cfg, &requirement_id).await?;
            }
        },
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
