//! Path arguments must stay inside the project root: traversal and symlink
//! escapes are rejected before anything is read or written.

mod common;

use common::{test_date, TestProject};
use debt_ledger::cli::{DiffArgs, IngestArgs, NormalizeArgs};
use debt_ledger::commands::{run_diff, run_ingest, run_normalize};

#[test]
fn traversal_input_is_rejected_with_nothing_written() {
    let project = TestProject::new();
    let err = run_normalize(NormalizeArgs {
        root: project.root.clone(),
        input: "../../etc/passwd".into(),
        category: "security".to_string(),
        date: Some(test_date()),
        output: None,
        json: false,
    })
    .unwrap_err();
    assert!(format!("{err:#}").contains("escapes project root"));
    assert!(!project.root.join("findings").exists());
}

#[test]
fn traversal_output_is_rejected() {
    let project = TestProject::new();
    project.write("raw/batch.jsonl", "{\"title\": \"x\", \"category\": \"security\"}\n");
    let err = run_normalize(NormalizeArgs {
        root: project.root.clone(),
        input: "raw/batch.jsonl".into(),
        category: "security".to_string(),
        date: Some(test_date()),
        output: Some("../outside.jsonl".into()),
        json: false,
    })
    .unwrap_err();
    assert!(format!("{err:#}").contains("escapes project root"));
}

#[test]
fn symlink_escape_is_rejected() {
    let project = TestProject::new();
    let outside = tempfile::tempdir().unwrap();
    std::fs::write(outside.path().join("secret.jsonl"), "{}\n").unwrap();
    std::os::unix::fs::symlink(outside.path(), project.root.join("link")).unwrap();

    let err = run_ingest(IngestArgs {
        root: project.root.clone(),
        batch: "link/secret.jsonl".into(),
        apply: true,
        json: false,
    })
    .unwrap_err();
    assert!(format!("{err:#}").contains("escapes project root"));
    assert!(!project.store_path().exists());
}

#[test]
fn diff_rejects_escaping_snapshots() {
    let project = TestProject::new();
    project.write("history/after.jsonl", "");
    let err = run_diff(DiffArgs {
        root: project.root.clone(),
        before: "../../etc/hosts".into(),
        after: "history/after.jsonl".into(),
        similarity_threshold: 0.40,
        json: false,
    })
    .unwrap_err();
    assert!(format!("{err:#}").contains("escapes project root"));
}
