//! Trend diffs between two historical finding snapshots.
//!
//! The comparator never touches the store: it reads two dated per-category
//! batches directly and reports what appeared, vanished, changed severity, or
//! recurred. Because it is read-only, a corrupt line is skipped with a
//! warning instead of aborting the run.
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Default Jaccard threshold for title-similarity pairing. Inherited tuning,
/// overridable from the CLI.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.40;

/// Tokens dropped before title similarity is computed.
const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "of", "in", "on", "for", "to", "with", "is", "are", "this",
    "that", "not", "no", "from", "into", "when",
];

/// Comparator tuning knobs.
#[derive(Debug, Clone, Copy)]
pub struct CompareOptions {
    pub similarity_threshold: f64,
}

impl Default for CompareOptions {
    fn default() -> Self {
        CompareOptions {
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
        }
    }
}

/// Compact view of one snapshot record used in diff output.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct FindingSummary {
    pub key: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_file: Option<String>,
}

/// A record present in both sets with a differing severity band.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct SeverityChange {
    pub key: String,
    pub title: String,
    pub before: String,
    pub after: String,
}

/// A file referenced in both sets, with per-set reference counts.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct FileRecurrence {
    pub file: String,
    pub before_count: usize,
    pub after_count: usize,
}

/// A candidate rename: a new/resolved title pair above the threshold.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct TitleSimilarity {
    pub new_title: String,
    pub resolved_title: String,
    pub similarity: f64,
}

/// Full structured output of one snapshot comparison.
#[derive(Debug, Serialize, Clone)]
pub struct ComparisonResult {
    pub new_findings: Vec<FindingSummary>,
    pub resolved_findings: Vec<FindingSummary>,
    pub severity_changes: Vec<SeverityChange>,
    pub recurring: Vec<FindingSummary>,
    pub file_recurrence: Vec<FileRecurrence>,
    pub similar_titles: Vec<TitleSimilarity>,
    pub warnings: Vec<String>,
}

/// Parse a snapshot leniently: unparsable lines are skipped with a warning
/// naming the source and line number.
pub fn parse_snapshot_lenient(text: &str, label: &str) -> (Vec<Value>, Vec<String>) {
    let mut records = Vec::new();
    let mut warnings = Vec::new();
    for (index, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(record) => records.push(record),
            Err(err) => {
                let warning = format!("{label} line {}: skipped unparsable record ({err})", index + 1);
                tracing::warn!("{warning}");
                warnings.push(warning);
            }
        }
    }
    (records, warnings)
}

/// Stable cross-run key for a snapshot record.
///
/// Priority order: explicit fingerprint, legacy id, an explicit content hash,
/// then a composite of primary file, lowercased title, and line number. The
/// composite keeps matching stable when scanners emit no identifiers at all.
pub fn finding_key(record: &Value) -> String {
    for field in ["fingerprint", "id", "content_hash"] {
        if let Some(value) = record.get(field).and_then(Value::as_str) {
            if !value.trim().is_empty() {
                return value.trim().to_string();
            }
        }
    }
    let file = primary_file(record).unwrap_or_else(|| "unknown".to_string());
    let title = record
        .get("title")
        .and_then(Value::as_str)
        .unwrap_or("")
        .trim()
        .to_lowercase();
    match line_number(record) {
        Some(line) => format!("composite::{file}::{title}::{line}"),
        None => format!("composite::{file}::{title}"),
    }
}

fn primary_file(record: &Value) -> Option<String> {
    if let Some(files) = record.get("files").and_then(Value::as_array) {
        if let Some(token) = files.first().and_then(Value::as_str) {
            let path = token.split(':').next().unwrap_or(token);
            if !path.is_empty() {
                return Some(path.to_string());
            }
        }
    }
    record
        .get("file")
        .and_then(Value::as_str)
        .map(str::to_string)
        .filter(|file| !file.is_empty())
}

fn line_number(record: &Value) -> Option<u64> {
    if let Some(line) = record.get("line").and_then(Value::as_u64) {
        return Some(line);
    }
    let files = record.get("files")?.as_array()?;
    let token = files.first()?.as_str()?;
    token.split(':').nth(1)?.parse().ok()
}

fn severity_token(record: &Value) -> Option<String> {
    record
        .get("severity")
        .and_then(Value::as_str)
        .map(|token| token.trim().to_uppercase())
        .filter(|token| !token.is_empty())
}

fn summary_for(key: &str, record: &Value) -> FindingSummary {
    FindingSummary {
        key: key.to_string(),
        title: record
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or("(untitled)")
            .to_string(),
        severity: severity_token(record),
        primary_file: primary_file(record),
    }
}

/// Diff two snapshots into new/resolved/changed/recurring sets plus the
/// file-recurrence and title-similarity auxiliaries.
pub fn compare(
    before: &[Value],
    after: &[Value],
    options: CompareOptions,
    warnings: Vec<String>,
) -> ComparisonResult {
    let before_by_key = index_by_key(before);
    let after_by_key = index_by_key(after);

    let mut new_findings = Vec::new();
    let mut recurring = Vec::new();
    let mut severity_changes = Vec::new();
    for (key, record) in &after_by_key {
        match before_by_key.get(key) {
            None => new_findings.push(summary_for(key, record)),
            Some(previous) => {
                recurring.push(summary_for(key, record));
                let before_severity = severity_token(previous);
                let after_severity = severity_token(record);
                if let (Some(before_severity), Some(after_severity)) =
                    (before_severity, after_severity)
                {
                    if before_severity != after_severity {
                        severity_changes.push(SeverityChange {
                            key: key.clone(),
                            title: record
                                .get("title")
                                .and_then(Value::as_str)
                                .unwrap_or("(untitled)")
                                .to_string(),
                            before: before_severity,
                            after: after_severity,
                        });
                    }
                }
            }
        }
    }
    let resolved_findings: Vec<FindingSummary> = before_by_key
        .iter()
        .filter(|(key, _)| !after_by_key.contains_key(*key))
        .map(|(key, record)| summary_for(key, record))
        .collect();

    let file_recurrence = file_recurrence(before, after);
    let similar_titles =
        similar_titles(&new_findings, &resolved_findings, options.similarity_threshold);

    ComparisonResult {
        new_findings,
        resolved_findings,
        severity_changes,
        recurring,
        file_recurrence,
        similar_titles,
        warnings,
    }
}

/// First occurrence wins when a key repeats inside one snapshot.
fn index_by_key(records: &[Value]) -> BTreeMap<String, &Value> {
    let mut index = BTreeMap::new();
    for record in records {
        index.entry(finding_key(record)).or_insert(record);
    }
    index
}

fn file_counts(records: &[Value]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for record in records {
        if let Some(file) = primary_file(record) {
            *counts.entry(file).or_insert(0) += 1;
        }
    }
    counts
}

/// Files referenced in both sets, sorted by combined frequency.
fn file_recurrence(before: &[Value], after: &[Value]) -> Vec<FileRecurrence> {
    let before_counts = file_counts(before);
    let after_counts = file_counts(after);
    let mut rows: Vec<FileRecurrence> = before_counts
        .iter()
        .filter_map(|(file, before_count)| {
            after_counts.get(file).map(|after_count| FileRecurrence {
                file: file.clone(),
                before_count: *before_count,
                after_count: *after_count,
            })
        })
        .collect();
    rows.sort_by(|a, b| {
        let combined_a = a.before_count + a.after_count;
        let combined_b = b.before_count + b.after_count;
        combined_b.cmp(&combined_a).then_with(|| a.file.cmp(&b.file))
    });
    rows
}

/// Lowercase alphanumeric title tokens with stop-words and short tokens
/// dropped.
fn title_tokens(title: &str) -> BTreeSet<String> {
    title
        .split(|ch: char| !ch.is_ascii_alphanumeric())
        .map(str::to_lowercase)
        .filter(|token| token.len() > 2)
        .filter(|token| !STOP_WORDS.contains(&token.as_str()))
        .collect()
}

fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    intersection as f64 / union as f64
}

/// Candidate renames: every new/resolved title pair at or above the
/// threshold, sorted most-similar first. Without this, a retitled finding
/// shows up as an unrelated new+resolved pair.
fn similar_titles(
    new_findings: &[FindingSummary],
    resolved_findings: &[FindingSummary],
    threshold: f64,
) -> Vec<TitleSimilarity> {
    let mut pairs = Vec::new();
    for new in new_findings {
        let new_tokens = title_tokens(&new.title);
        for resolved in resolved_findings {
            let similarity = jaccard(&new_tokens, &title_tokens(&resolved.title));
            if similarity >= threshold {
                pairs.push(TitleSimilarity {
                    new_title: new.title.clone(),
                    resolved_title: resolved.title.clone(),
                    similarity,
                });
            }
        }
    }
    pairs.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.new_title.cmp(&b.new_title))
            .then_with(|| a.resolved_title.cmp(&b.resolved_title))
    });
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(title: &str, file: &str, severity: &str) -> Value {
        json!({"title": title, "file": file, "severity": severity})
    }

    #[test]
    fn key_priority_prefers_explicit_identifiers() {
        assert_eq!(
            finding_key(&json!({"fingerprint": "security::a::b", "id": "X"})),
            "security::a::b"
        );
        assert_eq!(finding_key(&json!({"id": "LEGACY-9"})), "LEGACY-9");
        assert_eq!(finding_key(&json!({"content_hash": "abc123"})), "abc123");
        assert_eq!(
            finding_key(&json!({"title": " Leak ", "file": "h.ts", "line": 3})),
            "composite::h.ts::leak::3"
        );
    }

    #[test]
    fn composite_key_uses_files_token_line() {
        let key = finding_key(&json!({"title": "Leak", "files": ["src/h.ts:42"]}));
        assert_eq!(key, "composite::src/h.ts::leak::42");
    }

    #[test]
    fn one_sided_snapshot_resolves_everything() {
        let before = vec![rec("Leak in handler", "h.ts", "S1")];
        let result = compare(&before, &[], CompareOptions::default(), Vec::new());
        assert!(result.new_findings.is_empty());
        assert_eq!(result.resolved_findings.len(), 1);
        assert_eq!(result.resolved_findings[0].title, "Leak in handler");
        assert!(result.severity_changes.is_empty());
    }

    #[test]
    fn diff_is_symmetric() {
        let set1 = vec![rec("A", "a.ts", "S2"), rec("B", "b.ts", "S2")];
        let set2 = vec![rec("B", "b.ts", "S2"), rec("C", "c.ts", "S3")];
        let forward = compare(&set1, &set2, CompareOptions::default(), Vec::new());
        let backward = compare(&set2, &set1, CompareOptions::default(), Vec::new());
        assert_eq!(forward.new_findings, backward.resolved_findings);
        assert_eq!(forward.resolved_findings, backward.new_findings);
    }

    #[test]
    fn recurring_records_with_changed_severity_are_reported() {
        let before = vec![rec("Slow query", "db.rs", "S2")];
        let after = vec![rec("Slow query", "db.rs", "S1")];
        let result = compare(&before, &after, CompareOptions::default(), Vec::new());
        assert_eq!(result.recurring.len(), 1);
        assert_eq!(result.severity_changes.len(), 1);
        assert_eq!(result.severity_changes[0].before, "S2");
        assert_eq!(result.severity_changes[0].after, "S1");
    }

    #[test]
    fn file_recurrence_counts_both_sets() {
        let before = vec![rec("A", "hot.rs", "S2"), rec("B", "hot.rs", "S2")];
        let after = vec![rec("C", "hot.rs", "S2"), rec("D", "cold.rs", "S2")];
        let result = compare(&before, &after, CompareOptions::default(), Vec::new());
        assert_eq!(result.file_recurrence.len(), 1);
        assert_eq!(result.file_recurrence[0].file, "hot.rs");
        assert_eq!(result.file_recurrence[0].before_count, 2);
        assert_eq!(result.file_recurrence[0].after_count, 1);
    }

    #[test]
    fn similar_titles_pair_candidate_renames() {
        let before = vec![rec("Memory leak in request handler", "h.ts", "S1")];
        let after = vec![rec("Request handler memory leak", "handler.ts", "S1")];
        let result = compare(&before, &after, CompareOptions::default(), Vec::new());
        assert_eq!(result.new_findings.len(), 1);
        assert_eq!(result.resolved_findings.len(), 1);
        assert_eq!(result.similar_titles.len(), 1);
        assert!(result.similar_titles[0].similarity >= DEFAULT_SIMILARITY_THRESHOLD);
    }

    #[test]
    fn dissimilar_titles_stay_below_threshold() {
        let before = vec![rec("Unpinned dependency versions", "Cargo.toml", "S3")];
        let after = vec![rec("Request handler memory leak", "handler.ts", "S1")];
        let result = compare(&before, &after, CompareOptions::default(), Vec::new());
        assert!(result.similar_titles.is_empty());
    }

    #[test]
    fn lenient_parse_warns_and_continues() {
        let text = "{\"title\": \"ok\", \"file\": \"a.ts\"}\ngarbage\n{\"title\": \"two\", \"file\": \"b.ts\"}\n";
        let (records, warnings) = parse_snapshot_lenient(text, "before");
        assert_eq!(records.len(), 2);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("before line 2"));
    }

    #[test]
    fn stop_words_and_short_tokens_are_dropped() {
        let tokens = title_tokens("The leak in a handler is bad");
        assert!(tokens.contains("leak"));
        assert!(tokens.contains("handler"));
        assert!(tokens.contains("bad"));
        assert!(!tokens.contains("the"));
        assert!(!tokens.contains("in"));
        assert!(!tokens.contains("is"));
    }
}
