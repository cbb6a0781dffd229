//! TOML configuration.
//!
//! ```toml
//! [db]
//! path = "./data/audit.sqlite"
//!
//! [chunking]
//! max_tokens = 700
//!
//! [engine]        # all optional
//! scan_limit = 400
//! timeout_secs = 30
//!
//! [evidence]      # all optional
//! min_score = 0.5
//!
//! [server]
//! bind = "127.0.0.1:7341"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use policy_audit_core::consolidate::ConsolidateParams;
use policy_audit_core::engine::EngineParams;
use policy_audit_core::extract::QuoteParams;
use policy_audit_core::rotation::RotationPolicy;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub evidence: EvidenceConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    pub max_tokens: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EngineConfig {
    pub scan_limit: usize,
    pub candidate_window: usize,
    pub recent_window: usize,
    pub min_candidates: usize,
    pub min_sentence_chars: usize,
    pub context_before: usize,
    pub context_after: usize,
    pub fallback_quote_chars: usize,
    /// Pipelines allowed to run at once.
    pub max_concurrent: usize,
    pub timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let engine = EngineParams::default();
        Self {
            scan_limit: engine.scan_limit,
            candidate_window: engine.candidate_window,
            recent_window: engine.rotation.recent_window,
            min_candidates: engine.min_candidates,
            min_sentence_chars: engine.quote.min_sentence_chars,
            context_before: engine.quote.context_before,
            context_after: engine.quote.context_after,
            fallback_quote_chars: engine.quote.fallback_quote_chars,
            max_concurrent: 4,
            timeout_secs: 30,
        }
    }
}

impl EngineConfig {
    pub fn params(&self) -> EngineParams {
        EngineParams {
            scan_limit: self.scan_limit,
            candidate_window: self.candidate_window,
            min_candidates: self.min_candidates,
            rotation: RotationPolicy {
                recent_window: self.recent_window,
            },
            quote: QuoteParams {
                min_sentence_chars: self.min_sentence_chars,
                context_before: self.context_before,
                context_after: self.context_after,
                fallback_quote_chars: self.fallback_quote_chars,
                ..QuoteParams::default()
            },
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EvidenceConfig {
    pub min_score: f64,
    pub max_blocks: usize,
    pub sentence_threshold: f64,
    pub min_relevance: f64,
}

impl Default for EvidenceConfig {
    fn default() -> Self {
        let p = ConsolidateParams::default();
        Self {
            min_score: p.min_score,
            max_blocks: p.max_blocks,
            sentence_threshold: p.sentence_threshold,
            min_relevance: p.min_relevance,
        }
    }
}

impl EvidenceConfig {
    pub fn params(&self) -> ConsolidateParams {
        ConsolidateParams {
            min_score: self.min_score,
            max_blocks: self.max_blocks,
            sentence_threshold: self.sentence_threshold,
            min_relevance: self.min_relevance,
            ..ConsolidateParams::default()
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.chunking.max_tokens == 0 {
        anyhow::bail!("chunking.max_tokens must be > 0");
    }

    let engine = &config.engine;
    if engine.scan_limit == 0 {
        anyhow::bail!("engine.scan_limit must be > 0");
    }
    if engine.candidate_window == 0 {
        anyhow::bail!("engine.candidate_window must be > 0");
    }
    if engine.max_concurrent == 0 {
        anyhow::bail!("engine.max_concurrent must be > 0");
    }
    if engine.timeout_secs == 0 {
        anyhow::bail!("engine.timeout_secs must be > 0");
    }

    let evidence = &config.evidence;
    if !(0.0..=1.0).contains(&evidence.min_score) {
        anyhow::bail!("evidence.min_score must be in [0.0, 1.0]");
    }
    if !(0.0..=1.0).contains(&evidence.sentence_threshold) {
        anyhow::bail!("evidence.sentence_threshold must be in [0.0, 1.0]");
    }
    if !(0.0..=1.0).contains(&evidence.min_relevance) {
        anyhow::bail!("evidence.min_relevance must be in [0.0, 1.0]");
    }
    if evidence.max_blocks == 0 {
        anyhow::bail!("evidence.max_blocks must be >= 1");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[db]
path = "./data/audit.sqlite"

[chunking]
max_tokens = 700

[server]
bind = "127.0.0.1:7341"
"#;

    fn write(content: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("audit.toml");
        std::fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let (_dir, path) = write(MINIMAL);
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.engine.scan_limit, 400);
        assert_eq!(cfg.engine.candidate_window, 20);
        assert_eq!(cfg.engine.recent_window, 3);
        assert_eq!(cfg.engine.timeout(), Duration::from_secs(30));
        assert_eq!(cfg.evidence.max_blocks, 3);
        assert_eq!(cfg.engine.params().quote.context_after, 200);
    }

    #[test]
    fn test_partial_engine_section() {
        let (_dir, path) = write(&format!("{}\n[engine]\nscan_limit = 50\n", MINIMAL));
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.engine.scan_limit, 50);
        assert_eq!(cfg.engine.min_candidates, 3);
    }

    #[test]
    fn test_rejects_zero_max_tokens() {
        let (_dir, path) = write(&MINIMAL.replace("max_tokens = 700", "max_tokens = 0"));
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("max_tokens"));
    }

    #[test]
    fn test_rejects_out_of_range_min_score() {
        let (_dir, path) = write(&format!("{}\n[evidence]\nmin_score = 1.5\n", MINIMAL));
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = load_config(Path::new("/nonexistent/audit.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
