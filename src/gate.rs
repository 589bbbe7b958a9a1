//! Staged validation gate run around a full audit session.
//!
//! Each gate step is independently invocable and persists additively into a
//! small state document; rerunning a step overwrites only that step's entry,
//! never resetting the others. The gate enforces the canonical schema before
//! intake and makes any S0/S1 verification gap a blocking failure for its
//! whole stage.
use crate::baseline::{capture_baseline, diff_baselines, Baseline, BaselineDiff};
use crate::fsio;
use crate::paths::ProjectPaths;
use crate::schema::{
    Category, FindingRecord, FINGERPRINT_DELIMITER, FIRST_PASS_METHODS, KNOWN_TOOLS,
    SECOND_PASS_METHODS,
};
use crate::store::{plan_intake, Store};
use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::time::{SystemTime, UNIX_EPOCH};

/// Current schema version for `ledger/validation_state.json`.
pub const STATE_SCHEMA_VERSION: u32 = 1;

/// Number of validation stages in a full session.
pub const STAGE_COUNT: usize = 3;

/// Categories expected per stage. The original pipeline leaves stage
/// membership implicit; this table makes the split explicit and editable.
pub const STAGE_CATEGORIES: &[&[Category]] = &[
    &[Category::Security, Category::Performance],
    &[Category::CodeQuality, Category::Documentation],
    &[
        Category::Process,
        Category::Refactoring,
        Category::EngineeringProductivity,
    ],
];

/// One itemized validation problem on a single record.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct Issue {
    pub field: String,
    pub message: String,
    pub blocking: bool,
}

impl Issue {
    fn warning(field: &str, message: String) -> Issue {
        Issue {
            field: field.to_string(),
            message,
            blocking: false,
        }
    }

    fn blocking(field: &str, message: String) -> Issue {
        Issue {
            field: field.to_string(),
            message,
            blocking: true,
        }
    }
}

/// Validation outcome for one batch file inside a stage.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StageFileResult {
    pub category: Category,
    pub path: String,
    pub present: bool,
    pub record_count: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<Issue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl StageFileResult {
    pub fn blocking_count(&self) -> usize {
        self.issues.iter().filter(|issue| issue.blocking).count()
    }
}

/// Persisted record of one stage validation run.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StageStep {
    pub recorded_at_epoch_ms: u128,
    pub date: NaiveDate,
    pub passed: bool,
    pub files: Vec<StageFileResult>,
}

impl StageStep {
    pub fn blocking_count(&self) -> usize {
        self.files.iter().map(StageFileResult::blocking_count).sum()
    }
}

/// Persisted record of the baseline capture step.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BaselineStep {
    pub recorded_at_epoch_ms: u128,
    pub baseline: Baseline,
}

/// Persisted record of the intake dry-run step.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IntakeStep {
    pub recorded_at_epoch_ms: u128,
    pub batch_path: String,
    pub success: bool,
    pub new_count: usize,
    pub duplicate_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Persisted record of the baseline comparison step.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ComparisonStep {
    pub recorded_at_epoch_ms: u128,
    pub item_delta: i64,
    pub hash_changed: bool,
    pub newly_assigned_ids: Vec<String>,
    pub severity_deltas: BTreeMap<String, i64>,
}

/// Persisted record of the report generation step.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ReportStep {
    pub recorded_at_epoch_ms: u128,
    pub decision: GateDecision,
}

/// Additive state document for a staged validation session.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct GateState {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline: Option<BaselineStep>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub stages: BTreeMap<String, StageStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intake: Option<IntakeStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comparison: Option<ComparisonStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<ReportStep>,
}

fn default_schema_version() -> u32 {
    STATE_SCHEMA_VERSION
}

impl GateState {
    pub fn stage(&self, stage: usize) -> Option<&StageStep> {
        self.stages.get(&stage.to_string())
    }

    /// Total blocking issues recorded across every step that ran.
    pub fn blocking_count(&self) -> usize {
        self.stages.values().map(StageStep::blocking_count).sum()
    }

    /// Overall decision over the steps recorded so far.
    pub fn decision(&self) -> GateDecision {
        let intake_failed = self.intake.as_ref().is_some_and(|step| !step.success);
        if self.blocking_count() > 0 || intake_failed {
            return GateDecision::Blocked;
        }
        let all_stages_ran = (1..=STAGE_COUNT).all(|stage| self.stage(stage).is_some());
        if !all_stages_ran || self.baseline.is_none() || self.intake.is_none() {
            return GateDecision::Incomplete;
        }
        GateDecision::Pass
    }
}

/// Overall session outcome.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GateDecision {
    Pass,
    Blocked,
    Incomplete,
}

impl GateDecision {
    /// Return the stable string identifier used in JSON artifacts.
    pub fn as_str(&self) -> &'static str {
        match self {
            GateDecision::Pass => "PASS",
            GateDecision::Blocked => "BLOCKED",
            GateDecision::Incomplete => "INCOMPLETE",
        }
    }
}

impl fmt::Display for GateDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Load the gate state, treating a missing document as a fresh session.
pub fn load_state(paths: &ProjectPaths) -> Result<GateState> {
    let path = paths.state_path();
    if !path.is_file() {
        return Ok(GateState {
            schema_version: STATE_SCHEMA_VERSION,
            ..GateState::default()
        });
    }
    fsio::read_json(&path)
}

/// Persist the gate state document.
pub fn save_state(paths: &ProjectPaths, state: &GateState) -> Result<()> {
    fsio::write_json(&paths.state_path(), state)
}

/// Current epoch time in milliseconds for step timestamps.
pub fn now_epoch_ms() -> Result<u128> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("compute timestamp")?
        .as_millis())
}

/// Capture the session baseline. An unreadable store aborts the whole
/// session here rather than letting later steps run against suspect data.
pub fn run_baseline(paths: &ProjectPaths) -> Result<BaselineStep> {
    let baseline = capture_baseline(&paths.store_path())
        .context("fatal: finding store is unreadable; aborting session")?;
    let step = BaselineStep {
        recorded_at_epoch_ms: now_epoch_ms()?,
        baseline,
    };
    let mut state = load_state(paths)?;
    state.baseline = Some(step.clone());
    save_state(paths, &state)?;
    Ok(step)
}

/// Validate every §4 invariant on one record. Returns itemized issues and
/// never fails; ordinary-severity problems are warnings for triage while
/// S0/S1 verification gaps block the stage.
pub fn validate_record(record: &FindingRecord) -> Vec<Issue> {
    let mut issues = Vec::new();

    if record.title.trim().is_empty() {
        issues.push(Issue::warning("title", "title is empty".to_string()));
    }
    validate_fingerprint(record, &mut issues);
    if record.confidence > 100 {
        issues.push(Issue::warning(
            "confidence",
            format!("confidence {} exceeds 100", record.confidence),
        ));
    }
    if record.files.is_empty() {
        issues.push(Issue::warning("files", "file list is empty".to_string()));
    }
    if record.why_it_matters.trim().is_empty() {
        issues.push(Issue::warning(
            "why_it_matters",
            "rationale is empty".to_string(),
        ));
    }
    if record.suggested_fix.trim().is_empty() {
        issues.push(Issue::warning(
            "suggested_fix",
            "suggested fix is empty".to_string(),
        ));
    }
    if record.acceptance_tests.is_empty() {
        issues.push(Issue::warning(
            "acceptance_tests",
            "acceptance test list is empty".to_string(),
        ));
    }

    issues.extend(validate_critical_verification(record));
    issues
}

fn validate_fingerprint(record: &FindingRecord, issues: &mut Vec<Issue>) {
    let segments: Vec<&str> = record.fingerprint.split(FINGERPRINT_DELIMITER).collect();
    if segments.len() < 3 {
        issues.push(Issue::warning(
            "fingerprint",
            format!("fingerprint {:?} has fewer than 3 segments", record.fingerprint),
        ));
        return;
    }
    if segments[0] != record.category.as_str() {
        issues.push(Issue::warning(
            "fingerprint",
            format!(
                "fingerprint category segment {:?} does not match category {}",
                segments[0], record.category
            ),
        ));
    }
}

/// Enforce the verification contract for top-severity findings. Every
/// violation is blocking: an S0/S1 record must not reach intake unverified.
pub fn validate_critical_verification(record: &FindingRecord) -> Vec<Issue> {
    if !record.severity.requires_verification() {
        return Vec::new();
    }
    let severity = record.severity;
    let Some(steps) = record.verification_steps.as_ref() else {
        return vec![Issue::blocking(
            "verification_steps",
            format!("{severity} finding has no verification_steps"),
        )];
    };

    let mut issues = Vec::new();
    if !FIRST_PASS_METHODS.contains(&steps.first_pass.method.as_str()) {
        issues.push(Issue::blocking(
            "verification_steps.first_pass.method",
            format!("unrecognized first-pass method {:?}", steps.first_pass.method),
        ));
    }
    if steps.first_pass.evidence_collected.is_empty() {
        issues.push(Issue::blocking(
            "verification_steps.first_pass.evidence_collected",
            "first pass collected no evidence".to_string(),
        ));
    }
    if !SECOND_PASS_METHODS.contains(&steps.second_pass.method.as_str()) {
        issues.push(Issue::blocking(
            "verification_steps.second_pass.method",
            format!("unrecognized second-pass method {:?}", steps.second_pass.method),
        ));
    }
    if !steps.second_pass.confirmed {
        issues.push(Issue::blocking(
            "verification_steps.second_pass.confirmed",
            format!("{severity} finding is not confirmed by the second pass"),
        ));
    }
    if !KNOWN_TOOLS.contains(&steps.tool_confirmation.tool.as_str()) {
        issues.push(Issue::blocking(
            "verification_steps.tool_confirmation.tool",
            format!("unrecognized tool {:?}", steps.tool_confirmation.tool),
        ));
    }
    if steps.tool_confirmation.reference.trim().is_empty() {
        issues.push(Issue::blocking(
            "verification_steps.tool_confirmation.reference",
            "tool confirmation reference is empty".to_string(),
        ));
    }
    issues
}

/// Validate one batch file's text into per-record issues.
///
/// Unlike the normalizer, the gate is read-only over the batch: a line that
/// fails to parse as a canonical record is itemized as blocking (it could
/// never be intaken) instead of aborting the stage.
pub fn validate_batch_text(text: &str) -> (usize, Vec<Issue>) {
    let id_shape = Regex::new(r"^[a-z][a-z-]*::").expect("fingerprint shape regex");
    let mut issues = Vec::new();
    let mut record_count = 0;
    for (index, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<FindingRecord>(line) {
            Ok(record) => {
                record_count += 1;
                if !id_shape.is_match(&record.fingerprint) {
                    issues.push(Issue::warning(
                        "fingerprint",
                        format!(
                            "line {}: fingerprint {:?} is not category-prefixed",
                            index + 1,
                            record.fingerprint
                        ),
                    ));
                }
                for issue in validate_record(&record) {
                    issues.push(Issue {
                        field: issue.field,
                        message: format!("line {}: {}", index + 1, issue.message),
                        blocking: issue.blocking,
                    });
                }
            }
            Err(err) => {
                issues.push(Issue::blocking(
                    "record",
                    format!("line {}: unparsable canonical record ({err})", index + 1),
                ));
            }
        }
    }
    (record_count, issues)
}

/// Validate every expected per-category batch for one stage and date.
///
/// A missing expected file is a warning, not automatically blocking: a
/// scanner may legitimately have found nothing for a category.
pub fn run_stage(paths: &ProjectPaths, stage: usize, date: NaiveDate) -> Result<StageStep> {
    if stage == 0 || stage > STAGE_COUNT {
        return Err(anyhow!("stage must be between 1 and {STAGE_COUNT}"));
    }
    let mut files = Vec::new();
    for category in STAGE_CATEGORIES[stage - 1] {
        let path = paths.batch_path(*category, date);
        let display = crate::util::display_path(&path, Some(paths.root()));
        if !path.is_file() {
            files.push(StageFileResult {
                category: *category,
                path: display.clone(),
                present: false,
                record_count: 0,
                issues: Vec::new(),
                warnings: vec![format!("expected batch {display} is missing")],
            });
            continue;
        }
        let text = fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
        let (record_count, issues) = validate_batch_text(&text);
        files.push(StageFileResult {
            category: *category,
            path: display,
            present: true,
            record_count,
            issues,
            warnings: Vec::new(),
        });
    }

    let step = StageStep {
        recorded_at_epoch_ms: now_epoch_ms()?,
        date,
        passed: files.iter().map(StageFileResult::blocking_count).sum::<usize>() == 0,
        files,
    };
    let mut state = load_state(paths)?;
    state.stages.insert(stage.to_string(), step.clone());
    save_state(paths, &state)?;
    Ok(step)
}

/// Run intake in dry-run mode against a batch and record the outcome.
pub fn run_intake_check(paths: &ProjectPaths, batch_path: &std::path::Path) -> Result<IntakeStep> {
    let display = crate::util::display_path(batch_path, Some(paths.root()));
    let outcome = (|| -> Result<(usize, usize)> {
        let store = Store::load_or_empty(&paths.store_path())?;
        let batch: Vec<FindingRecord> = fsio::read_jsonl_strict(batch_path)?;
        let plan = plan_intake(&store, &batch);
        Ok((plan.new_count(), plan.duplicate_count()))
    })();

    let step = match outcome {
        Ok((new_count, duplicate_count)) => IntakeStep {
            recorded_at_epoch_ms: now_epoch_ms()?,
            batch_path: display,
            success: true,
            new_count,
            duplicate_count,
            message: None,
        },
        Err(err) => IntakeStep {
            recorded_at_epoch_ms: now_epoch_ms()?,
            batch_path: display,
            success: false,
            new_count: 0,
            duplicate_count: 0,
            message: Some(format!("{err:#}")),
        },
    };
    let mut state = load_state(paths)?;
    state.intake = Some(step.clone());
    save_state(paths, &state)?;
    Ok(step)
}

/// Recompute a fresh baseline and diff it against the captured one.
pub fn run_compare_baseline(paths: &ProjectPaths) -> Result<ComparisonStep> {
    let state = load_state(paths)?;
    let captured = state
        .baseline
        .as_ref()
        .ok_or_else(|| anyhow!("no baseline captured (run `dledger baseline` first)"))?;
    let fresh = capture_baseline(&paths.store_path())?;
    let store = Store::load_or_empty(&paths.store_path())?;
    let diff: BaselineDiff = diff_baselines(&captured.baseline, &fresh, &store);

    let step = ComparisonStep {
        recorded_at_epoch_ms: now_epoch_ms()?,
        item_delta: diff.item_delta,
        hash_changed: diff.hash_changed,
        newly_assigned_ids: diff.newly_assigned_ids,
        severity_deltas: diff.severity_deltas,
    };
    let mut state = load_state(paths)?;
    state.comparison = Some(step.clone());
    save_state(paths, &state)?;
    Ok(step)
}

/// Record the report step and return the final state for rendering.
pub fn run_report(paths: &ProjectPaths) -> Result<GateState> {
    let mut state = load_state(paths)?;
    state.report = Some(ReportStep {
        recorded_at_epoch_ms: now_epoch_ms()?,
        decision: state.decision(),
    });
    save_state(paths, &state)?;
    Ok(state)
}
