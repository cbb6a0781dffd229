use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

const HOSPICE_Q: &str = "Does the P&P state that hospice care must be provided to MCP members?";

fn audit_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("audit");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let policies = root.join("policies");
    fs::create_dir_all(&policies).unwrap();
    fs::write(
        policies.join("GG.1200.txt"),
        "Hospice Services\n\nThe policy states that hospice care services shall be provided to all MCP members upon election.\x0cRevision history and approvals.",
    )
    .unwrap();
    fs::write(
        policies.join("GG.1300.txt"),
        "Transplant services approved by DHCS shall be covered for eligible members.",
    )
    .unwrap();
    fs::write(policies.join("notes.md"), "not ingested").unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/audit.sqlite"

[chunking]
max_tokens = 700

[server]
bind = "127.0.0.1:7341"
"#,
        root.display()
    );

    let config_path = config_dir.join("audit.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_audit(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = audit_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run audit binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn ingested_env() -> (TempDir, PathBuf) {
    let (tmp, config_path) = setup_test_env();
    run_audit(&config_path, &["init"]);
    let policies = tmp.path().join("policies");
    let (stdout, stderr, success) =
        run_audit(&config_path, &["ingest", policies.to_str().unwrap()]);
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    (tmp, config_path)
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_audit(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/audit.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_audit(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_audit(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_ingest_directory_counts() {
    let (tmp, config_path) = setup_test_env();
    run_audit(&config_path, &["init"]);

    let policies = tmp.path().join("policies");
    let (stdout, _, success) = run_audit(&config_path, &["ingest", policies.to_str().unwrap()]);
    assert!(success);
    assert!(stdout.contains("documents: 2"), "got: {}", stdout);
    assert!(stdout.contains("skipped files: 1"), "got: {}", stdout);
    assert!(stdout.contains("ok"));
}

#[test]
fn test_ingest_json_chunks() {
    let (tmp, config_path) = setup_test_env();
    run_audit(&config_path, &["init"]);

    let corpus = tmp.path().join("corpus.json");
    fs::write(
        &corpus,
        r#"{
  "documents": [{"id": "AA.1000", "title": "Member Rights"}],
  "chunks": [
    {"id": "c1", "doc_id": "AA.1000", "page_from": 1, "page_to": 1, "text": "Members may file a grievance at any time."},
    {"id": "c2", "doc_id": "AA.1000", "page_from": 2, "page_to": 2, "text": "The MCP shall acknowledge grievances within five days."}
  ]
}"#,
    )
    .unwrap();

    let (stdout, stderr, success) = run_audit(&config_path, &["ingest", corpus.to_str().unwrap()]);
    assert!(success, "stderr={}", stderr);
    assert!(stdout.contains("documents: 1"));
    assert!(stdout.contains("chunks: 2"));
}

#[test]
fn test_ingest_missing_path_fails() {
    let (_tmp, config_path) = setup_test_env();
    run_audit(&config_path, &["init"]);

    let (_, stderr, success) = run_audit(&config_path, &["ingest", "/nonexistent/policies"]);
    assert!(!success);
    assert!(stderr.contains("Path not found"));
}

#[test]
fn test_answer_yes_then_cached() {
    let (_tmp, config_path) = ingested_env();

    let (stdout, stderr, success) = run_audit(&config_path, &["answer", "HOS_1", HOSPICE_Q]);
    assert!(success, "answer failed: stderr={}", stderr);
    let first: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(first["answer"], "YES");
    assert_eq!(first["confidence"], 0.9);
    assert_eq!(first["cached"], false);
    assert_eq!(first["evidence"]["filename"], "GG.1200");
    assert!(first["evidence"]["quote"]
        .as_str()
        .unwrap()
        .contains("hospice care services shall be provided"));

    let (stdout, _, _) = run_audit(&config_path, &["answer", "HOS_1", HOSPICE_Q]);
    let second: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(second["cached"], true);
    assert_eq!(second["created_at"], first["created_at"]);

    let (stdout, _, _) = run_audit(&config_path, &["answer", "HOS_1", HOSPICE_Q, "--refresh"]);
    let third: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(third["cached"], false);
}

#[test]
fn test_answer_on_empty_corpus_is_unknown() {
    let (_tmp, config_path) = setup_test_env();
    run_audit(&config_path, &["init"]);

    let (stdout, _, success) = run_audit(&config_path, &["answer", "Q1", HOSPICE_Q]);
    assert!(success);
    let v: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(v["answer"], "UNKNOWN");
    assert_eq!(v["confidence"], 0.0);
}

#[test]
fn test_batch_answers_in_order() {
    let (tmp, config_path) = ingested_env();

    let questions = tmp.path().join("questions.json");
    fs::write(
        &questions,
        format!(
            r#"[
  {{"question_id": "B1", "question": "{}"}},
  {{"requirement_id": "B2", "requirement": "Does the policy state that transplant services are covered?"}}
]"#,
            HOSPICE_Q
        ),
    )
    .unwrap();

    let (stdout, stderr, success) =
        run_audit(&config_path, &["batch", questions.to_str().unwrap()]);
    assert!(success, "batch failed: stderr={}", stderr);
    let v: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let items = v.as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["requirement_id"], "B1");
    assert_eq!(items[1]["requirement_id"], "B2");
}

#[test]
fn test_answers_list_get_delete() {
    let (_tmp, config_path) = ingested_env();

    let (stdout, _, _) = run_audit(&config_path, &["answers", "list"]);
    assert!(stdout.contains("No cached answers."));

    run_audit(&config_path, &["answer", "HOS_1", HOSPICE_Q]);
    run_audit(
        &config_path,
        &[
            "answer",
            "TRN_1",
            "Does the policy state that transplant services are covered?",
        ],
    );

    let (stdout, _, success) = run_audit(&config_path, &["answers", "list", "--prefix", "HOS_"]);
    assert!(success);
    assert!(stdout.contains("HOS_1\tYES"), "got: {}", stdout);
    assert!(!stdout.contains("TRN_1"));

    let (stdout, _, success) = run_audit(&config_path, &["answers", "get", "TRN_1"]);
    assert!(success);
    let v: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(v["requirement_id"], "TRN_1");

    let (stdout, _, success) = run_audit(&config_path, &["answers", "delete", "HOS_1"]);
    assert!(success);
    assert!(stdout.contains("Deleted answer HOS_1"));

    let (_, stderr, success) = run_audit(&config_path, &["answers", "get", "HOS_1"]);
    assert!(!success);
    assert!(stderr.contains("answer not found"));
}

#[test]
fn test_evidence_consolidation() {
    let (tmp, config_path) = setup_test_env();

    let request = tmp.path().join("request.json");
    fs::write(
        &request,
        r#"{
  "question_id": "E1",
  "requirement": "Does the MCP respond within 14 calendar days?",
  "candidates": [
    {"policy_id": "GG.1508", "filename": "Referrals", "page": 10, "text": "The MCP shall respond within fourteen (14) calendar days of the request.", "score": 0.9},
    {"policy_id": "GG.1600", "page": 2, "text": "Unrelated text about something else entirely.", "score": 0.2}
  ]
}"#,
    )
    .unwrap();

    let (stdout, stderr, success) =
        run_audit(&config_path, &["evidence", request.to_str().unwrap()]);
    assert!(success, "evidence failed: stderr={}", stderr);
    let v: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(v["requirement_id"], "E1");
    let evidence = v["evidence"].as_array().unwrap();
    assert!(evidence.iter().all(|e| e["policy_id"] != "GG.1600"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let (_tmp, config_path) = setup_test_env();
    let content = fs::read_to_string(&config_path).unwrap();
    fs::write(&config_path, content.replace("max_tokens = 700", "max_tokens = 0")).unwrap();

    let (_, stderr, success) = run_audit(&config_path, &["init"]);
    assert!(!success);
    assert!(stderr.contains("max_tokens"));
}
