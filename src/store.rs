//! The durable finding store and the intake/dedup engine.
//!
//! The store is an append-mostly JSONL log, one item per line. Intake is
//! split into a pure plan step and a commit step so the dedup decision logic
//! stays filesystem-free: dry-run callers stop after the plan, apply callers
//! commit and persist.
use crate::fsio;
use crate::schema::{format_id, FindingRecord, ItemStatus, Severity, StoreItem};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// In-memory view of the finding store.
///
/// Every operation takes the store by handle; nothing reads an ambient
/// current-store global, so classifiers and gates test against fixtures.
#[derive(Debug, Clone, Default)]
pub struct Store {
    items: Vec<StoreItem>,
}

impl Store {
    /// Load the store strictly: any corrupt line is an integrity error.
    pub fn load(path: &Path) -> Result<Store> {
        let items = fsio::read_jsonl_strict(path)
            .with_context(|| format!("load finding store {}", path.display()))?;
        Ok(Store { items })
    }

    /// Build a store from in-memory items, for fixtures and staged rebuilds.
    pub fn from_items(items: Vec<StoreItem>) -> Store {
        Store { items }
    }

    /// Load the store, treating a missing file as an empty store.
    pub fn load_or_empty(path: &Path) -> Result<Store> {
        if !path.exists() {
            return Ok(Store::default());
        }
        Store::load(path)
    }

    /// Persist all items atomically, preserving order.
    pub fn persist(&self, path: &Path) -> Result<()> {
        fsio::write_jsonl(path, &self.items)
            .with_context(|| format!("persist finding store {}", path.display()))
    }

    pub fn items(&self) -> &[StoreItem] {
        &self.items
    }

    pub fn items_mut(&mut self) -> &mut [StoreItem] {
        &mut self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Highest numeric id suffix ever assigned, 0 for an empty store.
    pub fn highest_id_number(&self) -> u64 {
        self.items
            .iter()
            .filter_map(StoreItem::id_number)
            .max()
            .unwrap_or(0)
    }

    /// Item counts per severity band, in S0..S3 order.
    pub fn severity_counts(&self) -> BTreeMap<Severity, usize> {
        let mut counts = BTreeMap::new();
        for severity in Severity::ALL {
            counts.insert(severity, 0);
        }
        for item in &self.items {
            *counts.entry(item.record.severity).or_insert(0) += 1;
        }
        counts
    }

    /// Item counts per lifecycle status.
    pub fn status_counts(&self) -> (usize, usize, usize) {
        let mut open = 0;
        let mut resolved = 0;
        let mut false_positive = 0;
        for item in &self.items {
            match item.status {
                ItemStatus::Open => open += 1,
                ItemStatus::Resolved => resolved += 1,
                ItemStatus::FalsePositive => false_positive += 1,
            }
        }
        (open, resolved, false_positive)
    }
}

/// A batch record skipped because its fingerprint already exists.
#[derive(Debug, Serialize, Clone)]
pub struct DuplicateHit {
    pub fingerprint: String,
    pub existing_id: String,
}

/// Intended intake mutations, computed without touching the store.
#[derive(Debug, Serialize, Clone)]
pub struct IntakePlan {
    pub new_records: Vec<FindingRecord>,
    pub duplicates: Vec<DuplicateHit>,
    pub next_id_number: u64,
}

impl IntakePlan {
    pub fn new_count(&self) -> usize {
        self.new_records.len()
    }

    pub fn duplicate_count(&self) -> usize {
        self.duplicates.len()
    }
}

/// Compute the intake plan for a batch against the current store.
///
/// A fingerprint collision with any existing item, whatever its status,
/// skips the record; repeats inside the batch itself dedup the same way.
pub fn plan_intake(store: &Store, batch: &[FindingRecord]) -> IntakePlan {
    let seen: BTreeMap<&str, &str> = store
        .items()
        .iter()
        .map(|item| (item.record.fingerprint.as_str(), item.id.as_str()))
        .collect();
    let mut batch_fingerprints: BTreeSet<String> = BTreeSet::new();

    let mut new_records = Vec::new();
    let mut duplicates = Vec::new();
    for record in batch {
        if let Some(existing_id) = seen.get(record.fingerprint.as_str()) {
            duplicates.push(DuplicateHit {
                fingerprint: record.fingerprint.clone(),
                existing_id: existing_id.to_string(),
            });
            continue;
        }
        if batch_fingerprints.contains(&record.fingerprint) {
            duplicates.push(DuplicateHit {
                fingerprint: record.fingerprint.clone(),
                existing_id: "(this batch)".to_string(),
            });
            continue;
        }
        batch_fingerprints.insert(record.fingerprint.clone());
        new_records.push(record.clone());
    }
    IntakePlan {
        new_records,
        duplicates,
        next_id_number: store.highest_id_number() + 1,
    }
}

/// Apply an intake plan: assign monotonic ids, stamp creation metadata, and
/// append. Existing entries are never renumbered or reordered.
pub fn commit_intake(store: &mut Store, plan: &IntakePlan, today: NaiveDate) -> Vec<String> {
    let mut assigned = Vec::new();
    let mut next = plan.next_id_number.max(store.highest_id_number() + 1);
    for record in &plan.new_records {
        let id = format_id(next);
        next += 1;
        tracing::info!(id = id.as_str(), fingerprint = record.fingerprint.as_str(), "ingested finding");
        store.items.push(StoreItem {
            id: id.clone(),
            status: ItemStatus::Open,
            created: Some(today),
            resolved_at: None,
            resolved_by: None,
            record: record.clone(),
        });
        assigned.push(id);
    }
    assigned
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Category, Effort};

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

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 5).unwrap()
    }

    #[test]
    fn repeated_intake_reports_duplicates_and_leaves_size_unchanged() {
        let mut store = Store::default();
        let batch = vec![record("security::a.ts::one"), record("security::b.ts::two")];

        let plan = plan_intake(&store, &batch);
        assert_eq!(plan.new_count(), 2);
        assert_eq!(plan.duplicate_count(), 0);
        commit_intake(&mut store, &plan, today());
        assert_eq!(store.len(), 2);

        let replan = plan_intake(&store, &batch);
        assert_eq!(replan.new_count(), 0);
        assert_eq!(replan.duplicate_count(), 2);
        commit_intake(&mut store, &replan, today());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn duplicate_reports_the_colliding_id() {
        let mut store = Store::default();
        let plan = plan_intake(&store, &[record("security::app.ts::xyz")]);
        commit_intake(&mut store, &plan, today());

        let replan = plan_intake(&store, &[record("security::app.ts::xyz")]);
        assert_eq!(replan.duplicates.len(), 1);
        assert_eq!(replan.duplicates[0].existing_id, "DEBT-0001");
    }

    #[test]
    fn intra_batch_repeats_dedup_too() {
        let store = Store::default();
        let batch = vec![record("security::a.ts::dup"), record("security::a.ts::dup")];
        let plan = plan_intake(&store, &batch);
        assert_eq!(plan.new_count(), 1);
        assert_eq!(plan.duplicate_count(), 1);
    }

    #[test]
    fn ids_stay_monotonic_across_status_changes() {
        let mut store = Store::default();
        let plan = plan_intake(&store, &[record("security::a.ts::one")]);
        let first = commit_intake(&mut store, &plan, today());
        assert_eq!(first, vec!["DEBT-0001".to_string()]);

        store.items_mut()[0].status = ItemStatus::Resolved;

        let plan = plan_intake(&store, &[record("security::b.ts::two")]);
        let second = commit_intake(&mut store, &plan, today());
        assert_eq!(second, vec!["DEBT-0002".to_string()]);
        assert_eq!(store.highest_id_number(), 2);
    }

    #[test]
    fn resolved_items_still_block_reintake() {
        let mut store = Store::default();
        let plan = plan_intake(&store, &[record("security::a.ts::one")]);
        commit_intake(&mut store, &plan, today());
        store.items_mut()[0].status = ItemStatus::Resolved;

        let replan = plan_intake(&store, &[record("security::a.ts::one")]);
        assert_eq!(replan.new_count(), 0);
        assert_eq!(replan.duplicate_count(), 1);
    }

    #[test]
    fn load_rejects_a_corrupt_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("findings.jsonl");
        std::fs::write(&path, "{broken\n").unwrap();
        assert!(Store::load(&path).is_err());
    }

    #[test]
    fn persist_round_trips_items_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("findings.jsonl");
        let mut store = Store::default();
        let plan = plan_intake(
            &store,
            &[record("security::a.ts::one"), record("security::b.ts::two")],
        );
        commit_intake(&mut store, &plan, today());
        store.persist(&path).unwrap();

        let reloaded = Store::load(&path).unwrap();
        assert_eq!(reloaded.items(), store.items());
    }
}
