//! Pre-scored candidate consolidation (`audit evidence`, `POST /evidence`).

use std::path::Path;

use anyhow::{bail, Context, Result};

use policy_audit_core::consolidate::{
    consolidate, ConsolidateParams, ConsolidatedEvidence, EvidenceRequest,
};

use crate::config::Config;

/// Validate and consolidate one request.
///
/// An empty candidate list is not an error; it yields an empty evidence list.
pub fn consolidate_request(
    request: &EvidenceRequest,
    params: &ConsolidateParams,
) -> Result<ConsolidatedEvidence> {
    if request.requirement_id.trim().is_empty() {
        bail!("requirement_id must not be empty");
    }
    if let Some(bad) = request
        .candidates
        .iter()
        .find(|c| !c.score.is_finite())
    {
        bail!("invalid score for candidate {}", bad.doc_id);
    }
    Ok(consolidate(request, params))
}

pub fn run_evidence(config: &Config, path: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let request: EvidenceRequest = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse evidence request {}", path.display()))?;

    let result = consolidate_request(&request, &config.evidence.params())?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
