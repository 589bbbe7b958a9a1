//! Heuristic resolution inference for open store items.
//!
//! Classification is a signal, not proof: commit churn on a referenced file
//! suggests the issue was probably addressed. Items reopening later is
//! expected. The classifier is a pure plan over a store handle plus a
//! version-control query; only the apply path mutates anything.
use crate::schema::ItemStatus;
use crate::store::Store;
use crate::vcs::VcsQuery;
use anyhow::Result;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

/// Identity stamped into `resolved_by` for auto-resolved items.
pub const AUTO_RESOLVER: &str = "auto-resolution-tracker";

/// Commit-count thresholds for the resolution heuristic.
///
/// The 1-2 / >=3 split is inherited tuning, not a proven constant; both
/// bounds are overridable from the CLI.
#[derive(Debug, Clone, Copy)]
pub struct ResolutionThresholds {
    /// Minimum commit count classified as `potentially_resolved`.
    pub potential_min: usize,
    /// Minimum commit count classified as `likely_resolved`.
    pub likely_min: usize,
}

impl Default for ResolutionThresholds {
    fn default() -> Self {
        ResolutionThresholds {
            potential_min: 1,
            likely_min: 3,
        }
    }
}

/// Classification outcome for one open item.
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionClass {
    Unknown,
    StillOpen,
    PotentiallyResolved,
    LikelyResolved,
}

impl ResolutionClass {
    /// Return the stable string identifier used in JSON artifacts.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionClass::Unknown => "unknown",
            ResolutionClass::StillOpen => "still_open",
            ResolutionClass::PotentiallyResolved => "potentially_resolved",
            ResolutionClass::LikelyResolved => "likely_resolved",
        }
    }
}

impl fmt::Display for ResolutionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-item classification with the evidence that produced it.
#[derive(Debug, Serialize, Clone)]
pub struct ItemResolution {
    pub id: String,
    pub title: String,
    pub class: ResolutionClass,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_count: Option<usize>,
}

/// Proposed status transitions for every open item.
#[derive(Debug, Serialize, Clone)]
pub struct ResolutionPlan {
    pub entries: Vec<ItemResolution>,
}

impl ResolutionPlan {
    pub fn count(&self, class: ResolutionClass) -> usize {
        self.entries.iter().filter(|entry| entry.class == class).count()
    }

    pub fn likely_ids(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|entry| entry.class == ResolutionClass::LikelyResolved)
            .map(|entry| entry.id.as_str())
            .collect()
    }
}

/// Classify every open item against version-control history.
///
/// A failed query never fails the run; the item degrades to `unknown`.
pub fn plan_resolution(
    store: &Store,
    vcs: &dyn VcsQuery,
    thresholds: ResolutionThresholds,
) -> ResolutionPlan {
    let mut entries = Vec::new();
    for item in store.items() {
        if item.status != ItemStatus::Open {
            continue;
        }
        let entry = match item.record.primary_file() {
            None => ItemResolution {
                id: item.id.clone(),
                title: item.record.title.clone(),
                class: ResolutionClass::Unknown,
                reason: "no usable file reference".to_string(),
                commit_count: None,
            },
            Some(file) => match vcs.query(file, item.created) {
                Err(err) => {
                    tracing::warn!(id = item.id.as_str(), error = %err, "version-control query failed");
                    ItemResolution {
                        id: item.id.clone(),
                        title: item.record.title.clone(),
                        class: ResolutionClass::Unknown,
                        reason: format!("version-control query failed: {err}"),
                        commit_count: None,
                    }
                }
                Ok(answer) if !answer.exists => ItemResolution {
                    id: item.id.clone(),
                    title: item.record.title.clone(),
                    class: ResolutionClass::LikelyResolved,
                    reason: format!("referenced file {file} no longer exists"),
                    commit_count: Some(answer.commit_count),
                },
                Ok(answer) => match item.created {
                    None => ItemResolution {
                        id: item.id.clone(),
                        title: item.record.title.clone(),
                        class: ResolutionClass::Unknown,
                        reason: "no creation date to bound the history query".to_string(),
                        commit_count: None,
                    },
                    Some(created) => {
                        let class = classify_commit_count(answer.commit_count, thresholds);
                        ItemResolution {
                            id: item.id.clone(),
                            title: item.record.title.clone(),
                            class,
                            reason: format!(
                                "{} commits touched {file} since {}",
                                answer.commit_count,
                                created.format("%Y-%m-%d")
                            ),
                            commit_count: Some(answer.commit_count),
                        }
                    }
                },
            },
        };
        entries.push(entry);
    }
    ResolutionPlan { entries }
}

fn classify_commit_count(count: usize, thresholds: ResolutionThresholds) -> ResolutionClass {
    if count >= thresholds.likely_min {
        ResolutionClass::LikelyResolved
    } else if count >= thresholds.potential_min {
        ResolutionClass::PotentiallyResolved
    } else {
        ResolutionClass::StillOpen
    }
}

/// Apply a resolution plan: only `likely_resolved` items transition, and the
/// caller persists the store afterwards.
pub fn apply_resolution(store: &mut Store, plan: &ResolutionPlan, today: NaiveDate) -> Result<usize> {
    let likely: BTreeSet<&str> = plan.likely_ids().into_iter().collect();
    let mut applied = 0;
    for item in store.items_mut() {
        if item.status != ItemStatus::Open || !likely.contains(item.id.as_str()) {
            continue;
        }
        item.status = ItemStatus::Resolved;
        item.resolved_at = Some(today);
        item.resolved_by = Some(AUTO_RESOLVER.to_string());
        tracing::info!(id = item.id.as_str(), "marked resolved");
        applied += 1;
    }
    Ok(applied)
}
