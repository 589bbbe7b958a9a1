//! Normalization of raw scanner output into canonical finding records.
//!
//! Upstream scanners emit findings in several legacy shapes; this module
//! canonicalizes them one field at a time, logging every repair so scanner
//! fixes can be audited later. A single bad field never fails a record, but
//! one unparsable line aborts the whole batch so no data is silently dropped.
//!
//! ## Field migration table
//! - `description` → `why_it_matters`
//! - `recommendation` → `suggested_fix`
//! - list-style `verification_steps` → derived `acceptance_tests`
//! - `file` + `line` → `files[0]` as `path:line`
use crate::schema::{
    Category, Effort, FindingRecord, Severity, VerificationSteps, FINGERPRINT_DELIMITER,
    KNOWN_TOOLS,
};
use anyhow::{anyhow, Result};
use serde::Serialize;
use serde_json::Value;

/// Category fallback for unmapped or blank inputs.
pub const DEFAULT_CATEGORY: Category = Category::CodeQuality;

/// Maximum length of a single fingerprint segment.
const MAX_SEGMENT_LEN: usize = 64;

/// Maximum length of a title slug used as a fingerprint identifier.
const MAX_SLUG_LEN: usize = 40;

/// Alias table mapping legacy category spellings to canonical categories.
/// Canonical names map to themselves so normalization is idempotent.
const CATEGORY_ALIASES: &[(&str, Category)] = &[
    ("security", Category::Security),
    ("sec", Category::Security),
    ("vuln", Category::Security),
    ("vulnerability", Category::Security),
    ("performance", Category::Performance),
    ("perf", Category::Performance),
    ("code-quality", Category::CodeQuality),
    ("code_quality", Category::CodeQuality),
    ("codequality", Category::CodeQuality),
    ("quality", Category::CodeQuality),
    ("documentation", Category::Documentation),
    ("docs", Category::Documentation),
    ("doc", Category::Documentation),
    ("process", Category::Process),
    ("workflow", Category::Process),
    ("refactoring", Category::Refactoring),
    ("refactor", Category::Refactoring),
    ("cleanup", Category::Refactoring),
    ("engineering-productivity", Category::EngineeringProductivity),
    ("engineering_productivity", Category::EngineeringProductivity),
    ("eng-productivity", Category::EngineeringProductivity),
    ("productivity", Category::EngineeringProductivity),
    ("tooling", Category::EngineeringProductivity),
];

/// Free-text markers indicating a legacy verification line references a tool.
const TOOL_MARKERS: &[&str] = &[
    "grep", "ripgrep", "rg ", "cargo", "clippy", "eslint", "semgrep", "tool",
];

/// Free-text markers indicating review language in a legacy verification line.
const REVIEW_MARKERS: &[&str] = &["review", "manual", "verified", "confirm", "inspect"];

/// One applied field repair, kept for the transformation log.
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct Transformation {
    pub field: String,
    pub action: String,
    pub detail: String,
}

/// Per-record transformation log entry in a normalized batch.
#[derive(Debug, Serialize, Clone)]
pub struct RecordLog {
    pub index: usize,
    pub fingerprint: String,
    pub transformations: Vec<Transformation>,
}

/// Result of normalizing one raw batch.
#[derive(Debug, Serialize, Clone)]
pub struct BatchNormalization {
    pub records: Vec<FindingRecord>,
    pub logs: Vec<RecordLog>,
}

impl BatchNormalization {
    /// Total number of field repairs across the batch.
    pub fn transformation_count(&self) -> usize {
        self.logs.iter().map(|log| log.transformations.len()).sum()
    }
}

/// Normalize a whole line-delimited batch.
///
/// Any unparsable line aborts the batch: partial output would make a
/// truncated scanner run look like a clean one.
pub fn normalize_batch(text: &str) -> Result<BatchNormalization> {
    let mut records = Vec::new();
    let mut logs = Vec::new();
    for (index, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let raw: Value = serde_json::from_str(line)
            .map_err(|err| anyhow!("unparsable batch line {}: {err}", index + 1))?;
        let (record, transformations) = normalize_record(&raw);
        for transformation in &transformations {
            tracing::debug!(
                field = transformation.field.as_str(),
                action = transformation.action.as_str(),
                detail = transformation.detail.as_str(),
                "normalized field"
            );
        }
        logs.push(RecordLog {
            index,
            fingerprint: record.fingerprint.clone(),
            transformations,
        });
        records.push(record);
    }
    Ok(BatchNormalization { records, logs })
}

/// Normalize one raw finding into the canonical schema plus its repair log.
pub fn normalize_record(raw: &Value) -> (FindingRecord, Vec<Transformation>) {
    let mut log = Vec::new();

    let category = normalize_category(raw.get("category"), &mut log);
    let title = normalize_title(raw, &mut log);
    let severity = normalize_severity(raw.get("severity"), &mut log);
    let effort = normalize_effort(raw.get("effort"), &mut log);
    let confidence = normalize_confidence(raw.get("confidence"), &mut log);
    let files = normalize_files(raw, &mut log);
    let fingerprint = generate_fingerprint(raw, category, &files, &title, &mut log);
    let why_it_matters = migrate_text_field(
        raw,
        "why_it_matters",
        "description",
        "No rationale recorded by the scanner.",
        &mut log,
    );
    let suggested_fix = migrate_text_field(
        raw,
        "suggested_fix",
        "recommendation",
        "No fix suggested by the scanner.",
        &mut log,
    );
    let acceptance_tests = normalize_acceptance_tests(raw, &mut log);
    let evidence = string_list(raw.get("evidence"));
    let verification_steps = normalize_verification_steps(raw, severity, &mut log);
    let notes = raw
        .get("notes")
        .and_then(Value::as_str)
        .map(str::to_string)
        .filter(|notes| !notes.trim().is_empty());

    let record = FindingRecord {
        category,
        title,
        fingerprint,
        severity,
        effort,
        confidence,
        files,
        why_it_matters,
        suggested_fix,
        acceptance_tests,
        evidence,
        verification_steps,
        notes,
    };
    (record, log)
}

fn push_log(log: &mut Vec<Transformation>, field: &str, action: &str, detail: String) {
    log.push(Transformation {
        field: field.to_string(),
        action: action.to_string(),
        detail,
    });
}

/// Canonicalize the category via the alias table; unmapped or blank values
/// fall back to the default category.
pub fn normalize_category(raw: Option<&Value>, log: &mut Vec<Transformation>) -> Category {
    let token = raw.and_then(Value::as_str).unwrap_or("").trim().to_lowercase();
    if token.is_empty() {
        push_log(
            log,
            "category",
            "defaulted",
            format!("blank category mapped to {DEFAULT_CATEGORY}"),
        );
        return DEFAULT_CATEGORY;
    }
    for (alias, category) in CATEGORY_ALIASES {
        if *alias == token {
            if token != category.as_str() {
                push_log(
                    log,
                    "category",
                    "aliased",
                    format!("{token} mapped to {category}"),
                );
            }
            return *category;
        }
    }
    push_log(
        log,
        "category",
        "defaulted",
        format!("unmapped category {token:?} mapped to {DEFAULT_CATEGORY}"),
    );
    DEFAULT_CATEGORY
}

fn normalize_title(raw: &Value, log: &mut Vec<Transformation>) -> String {
    if let Some(title) = raw.get("title").and_then(Value::as_str) {
        if !title.trim().is_empty() {
            return title.trim().to_string();
        }
    }
    if let Some(name) = raw.get("name").and_then(Value::as_str) {
        if !name.trim().is_empty() {
            push_log(log, "title", "migrated", "taken from legacy name field".to_string());
            return name.trim().to_string();
        }
    }
    push_log(log, "title", "defaulted", "missing title".to_string());
    "Untitled finding".to_string()
}

fn normalize_severity(raw: Option<&Value>, log: &mut Vec<Transformation>) -> Severity {
    let token = raw.and_then(Value::as_str).unwrap_or("");
    match Severity::parse(token) {
        Some(severity) => severity,
        None => {
            push_log(
                log,
                "severity",
                "defaulted",
                format!("unrecognized severity {token:?} mapped to S2"),
            );
            Severity::S2
        }
    }
}

fn normalize_effort(raw: Option<&Value>, log: &mut Vec<Transformation>) -> Effort {
    let token = raw.and_then(Value::as_str).unwrap_or("");
    match Effort::parse(token) {
        Some(effort) => effort,
        None => {
            push_log(
                log,
                "effort",
                "defaulted",
                format!("unrecognized effort {token:?} mapped to E2"),
            );
            Effort::E2
        }
    }
}

/// Map legacy tri-level confidence labels and clamp numeric values to 0-100.
pub fn normalize_confidence(raw: Option<&Value>, log: &mut Vec<Transformation>) -> u8 {
    match raw {
        Some(Value::String(label)) => {
            let trimmed = label.trim();
            match trimmed.to_lowercase().as_str() {
                "high" => {
                    push_log(log, "confidence", "mapped", "high mapped to 90".to_string());
                    90
                }
                "medium" => {
                    push_log(log, "confidence", "mapped", "medium mapped to 70".to_string());
                    70
                }
                "low" => {
                    push_log(log, "confidence", "mapped", "low mapped to 50".to_string());
                    50
                }
                _ => match trimmed.parse::<f64>() {
                    Ok(value) => clamp_confidence(value, log),
                    Err(_) => {
                        push_log(
                            log,
                            "confidence",
                            "defaulted",
                            format!("unrecognized confidence {trimmed:?} mapped to 70"),
                        );
                        70
                    }
                },
            }
        }
        Some(Value::Number(number)) => match number.as_f64() {
            Some(value) => clamp_confidence(value, log),
            None => 70,
        },
        _ => {
            push_log(
                log,
                "confidence",
                "defaulted",
                "missing confidence mapped to 70".to_string(),
            );
            70
        }
    }
}

fn clamp_confidence(value: f64, log: &mut Vec<Transformation>) -> u8 {
    if !(0.0..=100.0).contains(&value) {
        let clamped = value.clamp(0.0, 100.0);
        push_log(
            log,
            "confidence",
            "clamped",
            format!("{value} clamped to {clamped}"),
        );
        return clamped.round() as u8;
    }
    value.round() as u8
}

/// Coerce file references into an ordered `path[:line]` token list.
pub fn normalize_files(raw: &Value, log: &mut Vec<Transformation>) -> Vec<String> {
    let mut files: Vec<String> = string_list(raw.get("files"))
        .into_iter()
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
        .collect();

    if files.is_empty() {
        if let Some(file) = raw.get("file").and_then(Value::as_str) {
            let file = file.trim();
            if !file.is_empty() {
                let token = match raw.get("line").and_then(Value::as_u64) {
                    Some(line) => format!("{file}:{line}"),
                    None => file.to_string(),
                };
                push_log(
                    log,
                    "files",
                    "migrated",
                    format!("legacy file/line pair coerced to {token}"),
                );
                files.push(token);
            }
        }
    }

    if files.is_empty() {
        push_log(
            log,
            "files",
            "defaulted",
            "no file references; using unknown sentinel".to_string(),
        );
        files.push("unknown".to_string());
    }
    files
}

/// Rewrite an existing fingerprint's category segment or synthesize a fresh
/// fingerprint from the primary file and an identifier.
pub fn generate_fingerprint(
    raw: &Value,
    category: Category,
    files: &[String],
    title: &str,
    log: &mut Vec<Transformation>,
) -> String {
    if let Some(existing) = raw.get("fingerprint").and_then(Value::as_str) {
        let segments: Vec<&str> = existing.split(FINGERPRINT_DELIMITER).collect();
        if segments.len() >= 3 {
            let mut sanitized: Vec<String> =
                segments.iter().map(|segment| sanitize_segment(segment)).collect();
            if sanitized[0] != category.as_str() {
                push_log(
                    log,
                    "fingerprint",
                    "rewritten",
                    format!("category segment {} rewritten to {category}", sanitized[0]),
                );
            }
            sanitized[0] = category.as_str().to_string();
            let rebuilt = sanitized.join(FINGERPRINT_DELIMITER);
            if rebuilt != existing && sanitized[0] == segments[0] {
                push_log(
                    log,
                    "fingerprint",
                    "sanitized",
                    "delimiter or whitespace collisions removed".to_string(),
                );
            }
            return rebuilt;
        }
    }

    let file_token = files
        .first()
        .map(|token| token.split(':').next().unwrap_or(token))
        .map(|path| path.rsplit('/').next().unwrap_or(path))
        .unwrap_or("unknown");
    let identifier = raw
        .get("id")
        .and_then(Value::as_str)
        .map(sanitize_segment)
        .filter(|identifier| !identifier.is_empty())
        .unwrap_or_else(|| slugify(title));
    let fingerprint = format!(
        "{}{FINGERPRINT_DELIMITER}{}{FINGERPRINT_DELIMITER}{}",
        category.as_str(),
        sanitize_segment(file_token),
        identifier
    );
    push_log(
        log,
        "fingerprint",
        "synthesized",
        format!("generated {fingerprint}"),
    );
    fingerprint
}

/// Strip delimiter collisions, collapse whitespace, and cap segment length.
fn sanitize_segment(segment: &str) -> String {
    let mut out = String::new();
    let mut last_was_gap = false;
    for ch in segment.trim().chars() {
        let mapped = if ch == ':' || ch.is_whitespace() { None } else { Some(ch) };
        match mapped {
            Some(ch) => {
                out.push(ch);
                last_was_gap = false;
            }
            None => {
                if !last_was_gap && !out.is_empty() {
                    out.push('-');
                }
                last_was_gap = true;
            }
        }
        if out.len() >= MAX_SEGMENT_LEN {
            break;
        }
    }
    out.trim_matches('-').to_string()
}

/// Lowercase alphanumeric slug of a title, for synthesized identifiers.
fn slugify(title: &str) -> String {
    let mut slug = String::new();
    for word in title
        .split(|ch: char| !ch.is_ascii_alphanumeric())
        .filter(|word| !word.is_empty())
    {
        if !slug.is_empty() {
            slug.push('-');
        }
        slug.push_str(&word.to_lowercase());
        if slug.len() >= MAX_SLUG_LEN {
            break;
        }
    }
    if slug.is_empty() {
        "untitled".to_string()
    } else {
        slug
    }
}

fn migrate_text_field(
    raw: &Value,
    canonical: &str,
    legacy: &str,
    fallback: &str,
    log: &mut Vec<Transformation>,
) -> String {
    if let Some(text) = raw.get(canonical).and_then(Value::as_str) {
        if !text.trim().is_empty() {
            return text.trim().to_string();
        }
    }
    if let Some(text) = raw.get(legacy).and_then(Value::as_str) {
        if !text.trim().is_empty() {
            push_log(
                log,
                canonical,
                "migrated",
                format!("taken from legacy {legacy} field"),
            );
            return text.trim().to_string();
        }
    }
    push_log(log, canonical, "defaulted", "missing field".to_string());
    fallback.to_string()
}

fn normalize_acceptance_tests(raw: &Value, log: &mut Vec<Transformation>) -> Vec<String> {
    let tests = string_list(raw.get("acceptance_tests"));
    if !tests.is_empty() {
        return tests;
    }
    // Legacy records carried a flat verification_steps list; derive
    // acceptance tests from it rather than losing the checklist.
    if let Some(Value::Array(_)) = raw.get("verification_steps") {
        let derived: Vec<String> = string_list(raw.get("verification_steps"))
            .into_iter()
            .map(|step| format!("Verify: {step}"))
            .collect();
        if !derived.is_empty() {
            push_log(
                log,
                "acceptance_tests",
                "migrated",
                format!("derived {} tests from legacy verification_steps", derived.len()),
            );
            return derived;
        }
    }
    push_log(
        log,
        "acceptance_tests",
        "defaulted",
        "missing acceptance tests".to_string(),
    );
    vec!["Manually confirm the finding no longer reproduces.".to_string()]
}

/// Build verification steps for top-severity findings.
///
/// Object inputs are deep-merged onto structural defaults so every required
/// key exists; legacy list inputs are classified line by line.
pub fn normalize_verification_steps(
    raw: &Value,
    severity: Severity,
    log: &mut Vec<Transformation>,
) -> Option<VerificationSteps> {
    let raw_steps = raw.get("verification_steps");
    if !severity.requires_verification() {
        // Lower severities keep structured steps when present, untouched.
        return raw_steps
            .filter(|value| value.is_object())
            .map(|value| merge_verification_object(value, &mut Vec::new()));
    }

    match raw_steps {
        Some(value) if value.is_object() => Some(merge_verification_object(value, log)),
        Some(Value::Array(lines)) => {
            let lines: Vec<String> = lines
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect();
            push_log(
                log,
                "verification_steps",
                "synthesized",
                format!("classified {} legacy lines", lines.len()),
            );
            Some(classify_legacy_lines(&lines))
        }
        _ => {
            push_log(
                log,
                "verification_steps",
                "defaulted",
                "missing verification steps for top-severity finding".to_string(),
            );
            Some(VerificationSteps::structural_default())
        }
    }
}

/// Deep-merge a partial verification object onto structural defaults.
fn merge_verification_object(value: &Value, log: &mut Vec<Transformation>) -> VerificationSteps {
    let mut steps = VerificationSteps::structural_default();
    let mut merged_defaults = false;

    if let Some(first) = value.get("first_pass") {
        if let Some(method) = first.get("method").and_then(Value::as_str) {
            steps.first_pass.method = method.to_string();
        } else {
            merged_defaults = true;
        }
        steps.first_pass.evidence_collected = string_list(first.get("evidence_collected"));
    } else {
        merged_defaults = true;
    }

    if let Some(second) = value.get("second_pass") {
        if let Some(method) = second.get("method").and_then(Value::as_str) {
            steps.second_pass.method = method.to_string();
        } else {
            merged_defaults = true;
        }
        steps.second_pass.confirmed = second
            .get("confirmed")
            .and_then(Value::as_bool)
            .unwrap_or(false);
    } else {
        merged_defaults = true;
    }

    if let Some(tool) = value.get("tool_confirmation") {
        if let Some(name) = tool.get("tool").and_then(Value::as_str) {
            steps.tool_confirmation.tool = name.to_string();
        } else {
            merged_defaults = true;
        }
        if let Some(reference) = tool.get("reference").and_then(Value::as_str) {
            steps.tool_confirmation.reference = reference.to_string();
        }
    } else {
        merged_defaults = true;
    }

    if merged_defaults {
        push_log(
            log,
            "verification_steps",
            "merged",
            "missing keys filled from structural defaults".to_string(),
        );
    }
    steps
}

/// Classify legacy free-text verification lines into the two-pass structure.
fn classify_legacy_lines(lines: &[String]) -> VerificationSteps {
    let mut steps = VerificationSteps::structural_default();
    for line in lines {
        let lower = line.to_lowercase();
        if TOOL_MARKERS.iter().any(|marker| lower.contains(marker)) {
            steps.tool_confirmation.tool = KNOWN_TOOLS
                .iter()
                .find(|tool| **tool != "NONE" && lower.contains(&tool.to_lowercase()))
                .map(|tool| tool.to_string())
                .unwrap_or_else(|| "NONE".to_string());
            steps.tool_confirmation.reference = line.clone();
        } else if REVIEW_MARKERS.iter().any(|marker| lower.contains(marker)) {
            steps.second_pass.method = "manual_verification".to_string();
            steps.second_pass.confirmed =
                lower.contains("confirmed") || lower.contains("verified");
        } else {
            steps.first_pass.evidence_collected.push(line.clone());
        }
    }
    steps
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .filter(|item| !item.trim().is_empty())
            .collect(),
        Some(Value::String(item)) if !item.trim().is_empty() => vec![item.clone()],
        _ => Vec::new(),
    }
}
