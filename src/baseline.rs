//! Point-in-time store baselines for before/after session deltas.
//!
//! A baseline ties a validation session to an exact store state so the gate
//! can detect what a session changed without guessing.
use crate::schema::Severity;
use crate::store::Store;
use crate::util::sha256_hex;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Summary of the store at one point in time.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Baseline {
    pub exists: bool,
    pub item_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    pub highest_id_number: u64,
    pub severity_counts: BTreeMap<String, usize>,
}

/// Delta between a captured baseline and the current store.
#[derive(Debug, Serialize, Clone)]
pub struct BaselineDiff {
    pub item_delta: i64,
    pub hash_changed: bool,
    pub newly_assigned_ids: Vec<String>,
    pub severity_deltas: BTreeMap<String, i64>,
}

/// Capture the current store state.
///
/// An unreadable store (any corrupt line) is a hard error: a session must
/// never proceed against a suspect store. A missing store is a valid
/// baseline with `exists: false`.
pub fn capture_baseline(store_path: &Path) -> Result<Baseline> {
    if !store_path.exists() {
        let mut severity_counts = BTreeMap::new();
        for severity in Severity::ALL {
            severity_counts.insert(severity.as_str().to_string(), 0);
        }
        return Ok(Baseline {
            exists: false,
            item_count: 0,
            content_hash: None,
            highest_id_number: 0,
            severity_counts,
        });
    }

    let store = Store::load(store_path)
        .with_context(|| format!("baseline capture over {}", store_path.display()))?;
    let bytes =
        fs::read(store_path).with_context(|| format!("read {}", store_path.display()))?;
    let severity_counts = store
        .severity_counts()
        .into_iter()
        .map(|(severity, count)| (severity.as_str().to_string(), count))
        .collect();
    Ok(Baseline {
        exists: true,
        item_count: store.len(),
        content_hash: Some(sha256_hex(&bytes)),
        highest_id_number: store.highest_id_number(),
        severity_counts,
    })
}

/// Diff a captured baseline against a freshly captured one, listing the ids
/// assigned in between from the current store contents.
pub fn diff_baselines(captured: &Baseline, fresh: &Baseline, current: &Store) -> BaselineDiff {
    let newly_assigned_ids = current
        .items()
        .iter()
        .filter(|item| match item.id_number() {
            Some(number) => number > captured.highest_id_number,
            None => false,
        })
        .map(|item| item.id.clone())
        .collect();

    let mut severity_deltas = BTreeMap::new();
    for severity in Severity::ALL {
        let key = severity.as_str();
        let before = captured.severity_counts.get(key).copied().unwrap_or(0) as i64;
        let after = fresh.severity_counts.get(key).copied().unwrap_or(0) as i64;
        severity_deltas.insert(key.to_string(), after - before);
    }

    BaselineDiff {
        item_delta: fresh.item_count as i64 - captured.item_count as i64,
        hash_changed: captured.content_hash != fresh.content_hash,
        newly_assigned_ids,
        severity_deltas,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Category, Effort, FindingRecord};
    use crate::store::{commit_intake, plan_intake};
    use chrono::NaiveDate;

    fn record(fingerprint: &str) -> FindingRecord {
        FindingRecord {
            category: Category::Security,
            title: format!("finding {fingerprint}"),
            fingerprint: fingerprint.to_string(),
            severity: Severity::S2,
            effort: Effort::E2,
            confidence: 70,
            files: vec!["src/app.ts:1".to_string()],
            why_it_matters: "matters".to_string(),
            suggested_fix: "fix".to_string(),
            acceptance_tests: vec!["passes".to_string()],
            evidence: Vec::new(),
            verification_steps: None,
            notes: None,
        }
    }

    #[test]
    fn missing_store_is_a_valid_empty_baseline() {
        let dir = tempfile::tempdir().unwrap();
        let baseline = capture_baseline(&dir.path().join("findings.jsonl")).unwrap();
        assert!(!baseline.exists);
        assert_eq!(baseline.item_count, 0);
        assert!(baseline.content_hash.is_none());
    }

    #[test]
    fn corrupt_store_fails_capture() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("findings.jsonl");
        std::fs::write(&path, "{not json\n").unwrap();
        assert!(capture_baseline(&path).is_err());
    }

    #[test]
    fn diff_reports_new_ids_and_severity_deltas() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("findings.jsonl");
        let today = NaiveDate::from_ymd_opt(2026, 8, 5).unwrap();

        let mut store = Store::default();
        let plan = plan_intake(&store, &[record("security::a.ts::one")]);
        commit_intake(&mut store, &plan, today);
        store.persist(&path).unwrap();
        let captured = capture_baseline(&path).unwrap();

        let plan = plan_intake(&store, &[record("security::b.ts::two")]);
        commit_intake(&mut store, &plan, today);
        store.persist(&path).unwrap();
        let fresh = capture_baseline(&path).unwrap();

        let diff = diff_baselines(&captured, &fresh, &store);
        assert_eq!(diff.item_delta, 1);
        assert!(diff.hash_changed);
        assert_eq!(diff.newly_assigned_ids, vec!["DEBT-0002".to_string()]);
        assert_eq!(diff.severity_deltas.get("S2"), Some(&1));
        assert_eq!(diff.severity_deltas.get("S0"), Some(&0));
    }
}
