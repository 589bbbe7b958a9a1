//! End-to-end flow: normalize a legacy batch, ingest it twice, classify
//! resolution against a fake history, and diff two snapshots.

mod common;

use common::{legacy_s2_line, test_date, TestProject};
use debt_ledger::cli::{DiffArgs, IngestArgs, NormalizeArgs};
use debt_ledger::commands::{run_diff, run_ingest, run_normalize};
use debt_ledger::resolution::{plan_resolution, ResolutionClass, ResolutionThresholds};
use debt_ledger::schema::FindingRecord;
use debt_ledger::store::Store;
use debt_ledger::vcs::FakeVcs;

fn normalize_args(project: &TestProject, input: &str, output: Option<&str>) -> NormalizeArgs {
    NormalizeArgs {
        root: project.root.clone(),
        input: input.into(),
        category: "security".to_string(),
        date: Some(test_date()),
        output: output.map(Into::into),
        json: false,
    }
}

fn ingest_args(project: &TestProject, batch: &std::path::Path, apply: bool) -> IngestArgs {
    IngestArgs {
        root: project.root.clone(),
        batch: batch.to_path_buf(),
        apply,
        json: false,
    }
}

#[test]
fn normalize_canonicalizes_legacy_shapes() {
    let project = TestProject::new();
    let raw = format!(
        "{}\n{}\n",
        legacy_s2_line("Unsanitized input in login", "src/login.ts"),
        legacy_s2_line("Unsanitized input in search", "src/search.ts")
    );
    project.write("raw/security.jsonl", &raw);

    run_normalize(normalize_args(&project, "raw/security.jsonl", None)).unwrap();

    let batch_path = project.batch_path("security", test_date());
    let text = project.read(&batch_path);
    let records: Vec<FindingRecord> = text
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(records.len(), 2);
    for record in &records {
        assert_eq!(record.category.as_str(), "security");
        assert_eq!(record.confidence, 90);
        assert!(record.fingerprint.starts_with("security::"));
        assert_eq!(record.why_it_matters, "input reaches a sink");
        assert_eq!(record.suggested_fix, "sanitize at the boundary");
        assert!(!record.acceptance_tests.is_empty());
    }
    assert!(records[0].files[0].ends_with(":12"));
}

#[test]
fn normalizing_a_normalized_batch_is_byte_identical() {
    let project = TestProject::new();
    project.write(
        "raw/security.jsonl",
        &legacy_s2_line("Unsanitized input in login", "src/login.ts"),
    );

    run_normalize(normalize_args(&project, "raw/security.jsonl", None)).unwrap();
    let first_path = project.batch_path("security", test_date());
    let first = project.read(&first_path);

    run_normalize(normalize_args(
        &project,
        "findings/security/2026-08-05.jsonl",
        Some("findings/security/repeat.jsonl"),
    ))
    .unwrap();
    let second = project.read(&project.root.join("findings/security/repeat.jsonl"));
    assert_eq!(first, second);
}

#[test]
fn unparsable_line_aborts_normalization_with_no_output() {
    let project = TestProject::new();
    let raw = format!(
        "{}\nnot json\n",
        legacy_s2_line("Unsanitized input in login", "src/login.ts")
    );
    project.write("raw/security.jsonl", &raw);

    let err = run_normalize(normalize_args(&project, "raw/security.jsonl", None)).unwrap_err();
    assert!(err.to_string().contains("line 2"));
    assert!(!project.batch_path("security", test_date()).exists());
}

#[test]
fn double_apply_ingest_keeps_one_item_per_fingerprint() {
    let project = TestProject::new();
    let raw = format!(
        "{}\n{}\n",
        legacy_s2_line("Unsanitized input in login", "src/login.ts"),
        legacy_s2_line("Unsanitized input in search", "src/search.ts")
    );
    project.write("raw/security.jsonl", &raw);
    run_normalize(normalize_args(&project, "raw/security.jsonl", None)).unwrap();
    let batch_path = project.batch_path("security", test_date());

    run_ingest(ingest_args(&project, &batch_path, true)).unwrap();
    let after_first = project.read(&project.store_path());
    assert_eq!(after_first.lines().count(), 2);

    run_ingest(ingest_args(&project, &batch_path, true)).unwrap();
    let after_second = project.read(&project.store_path());
    assert_eq!(after_first, after_second, "second apply must be a no-op");

    let store = Store::load(&project.store_path()).unwrap();
    assert_eq!(store.highest_id_number(), 2);
    let ids: Vec<&str> = store.items().iter().map(|item| item.id.as_str()).collect();
    assert_eq!(ids, vec!["DEBT-0001", "DEBT-0002"]);
}

#[test]
fn dry_run_ingest_mutates_nothing() {
    let project = TestProject::new();
    project.write(
        "raw/security.jsonl",
        &legacy_s2_line("Unsanitized input in login", "src/login.ts"),
    );
    run_normalize(normalize_args(&project, "raw/security.jsonl", None)).unwrap();
    let batch_path = project.batch_path("security", test_date());

    run_ingest(ingest_args(&project, &batch_path, false)).unwrap();
    assert!(!project.store_path().exists());
}

#[test]
fn resolution_classifies_ingested_items_against_history() {
    let project = TestProject::new();
    let raw = format!(
        "{}\n{}\n",
        legacy_s2_line("Churned finding", "src/churned.ts"),
        legacy_s2_line("Fresh finding", "src/fresh.ts")
    );
    project.write("raw/security.jsonl", &raw);
    run_normalize(normalize_args(&project, "raw/security.jsonl", None)).unwrap();
    run_ingest(ingest_args(&project, &project.batch_path("security", test_date()), true)).unwrap();

    let store = Store::load(&project.store_path()).unwrap();
    let vcs = FakeVcs::default()
        .with_answer("src/churned.ts", true, 5)
        .with_answer("src/fresh.ts", true, 0);
    let plan = plan_resolution(&store, &vcs, ResolutionThresholds::default());
    assert_eq!(plan.count(ResolutionClass::LikelyResolved), 1);
    assert_eq!(plan.count(ResolutionClass::StillOpen), 1);
}

#[test]
fn diff_tolerates_bad_lines_and_reports_the_scenario_sets() {
    let project = TestProject::new();
    project.write(
        "history/before.jsonl",
        "{\"title\": \"Leak in handler\", \"file\": \"h.ts\", \"severity\": \"S1\"}\nbroken line\n",
    );
    project.write("history/after.jsonl", "");

    run_diff(DiffArgs {
        root: project.root.clone(),
        before: "history/before.jsonl".into(),
        after: "history/after.jsonl".into(),
        similarity_threshold: 0.40,
        json: true,
    })
    .unwrap();
}
