//! Shared test infrastructure for integration tests.
// Not every suite uses every helper.
#![allow(dead_code)]

use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A scratch project root with the ledger layout helpers.
pub struct TestProject {
    _dir: TempDir,
    pub root: PathBuf,
}

impl Default for TestProject {
    fn default() -> Self {
        TestProject::new()
    }
}

impl TestProject {
    pub fn new() -> TestProject {
        let dir = tempfile::tempdir().expect("create temp project root");
        let root = dir.path().to_path_buf();
        TestProject { _dir: dir, root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn store_path(&self) -> PathBuf {
        self.root.join("ledger").join("findings.jsonl")
    }

    pub fn batch_path(&self, category: &str, date: NaiveDate) -> PathBuf {
        self.root
            .join("findings")
            .join(category)
            .join(format!("{}.jsonl", date.format("%Y-%m-%d")))
    }

    /// Write a file under the root, creating parents.
    pub fn write(&self, rel: &str, contents: &str) -> PathBuf {
        let path = self.root.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent dirs");
        }
        std::fs::write(&path, contents).expect("write fixture file");
        path
    }

    pub fn read(&self, path: &Path) -> String {
        std::fs::read_to_string(path).expect("read fixture file")
    }
}

pub fn test_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 8, 5).expect("valid date")
}

/// A raw legacy-shaped S2 finding line as scanners emit them.
pub fn legacy_s2_line(title: &str, file: &str) -> String {
    format!(
        concat!(
            "{{\"category\": \"sec\", \"title\": \"{}\", \"severity\": \"S2\", ",
            "\"effort\": \"E1\", \"confidence\": \"high\", \"file\": \"{}\", \"line\": 12, ",
            "\"description\": \"input reaches a sink\", ",
            "\"recommendation\": \"sanitize at the boundary\", ",
            "\"verification_steps\": [\"grep for the sink\", \"manually reviewed the call site\"]}}"
        ),
        title, file
    )
}

/// A canonical S0 finding line with confirmed verification steps.
pub fn verified_s0_line(title: &str, identifier: &str) -> String {
    format!(
        concat!(
            "{{\"category\": \"security\", \"title\": \"{}\", ",
            "\"fingerprint\": \"security::auth.rs::{}\", \"severity\": \"S0\", ",
            "\"effort\": \"E1\", \"confidence\": 95, \"files\": [\"src/auth.rs:40\"], ",
            "\"why_it_matters\": \"auth bypass\", \"suggested_fix\": \"check the token\", ",
            "\"acceptance_tests\": [\"bypass attempt fails\"], ",
            "\"verification_steps\": {{",
            "\"first_pass\": {{\"method\": \"code_search\", \"evidence_collected\": [\"call site at auth.rs:40\"]}}, ",
            "\"second_pass\": {{\"method\": \"exploitation_test\", \"confirmed\": true}}, ",
            "\"tool_confirmation\": {{\"tool\": \"semgrep\", \"reference\": \"semgrep run 42\"}}}}}}"
        ),
        title, identifier
    )
}

/// An S0 finding line with no verification steps at all.
pub fn unverified_s0_line(title: &str, identifier: &str) -> String {
    format!(
        concat!(
            "{{\"category\": \"security\", \"title\": \"{}\", ",
            "\"fingerprint\": \"security::auth.rs::{}\", \"severity\": \"S0\", ",
            "\"effort\": \"E1\", \"confidence\": 95, \"files\": [\"src/auth.rs:40\"], ",
            "\"why_it_matters\": \"auth bypass\", \"suggested_fix\": \"check the token\", ",
            "\"acceptance_tests\": [\"bypass attempt fails\"]}}"
        ),
        title, identifier
    )
}
