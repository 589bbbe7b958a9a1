//! Narrative renderings of computed results.
//!
//! Every command computes one structured result; the `--json` path
//! serializes it and these printers narrate the same struct, so the two
//! output modes can never disagree.
use crate::compare::ComparisonResult;
use crate::gate::{GateState, StageStep};
use crate::resolution::{ResolutionClass, ResolutionPlan};
use crate::store::{IntakePlan, Store};
use serde::Serialize;
use std::collections::BTreeMap;

/// Read-only ledger summary for the `status` command.
#[derive(Debug, Serialize, Clone)]
pub struct StatusSummary {
    pub store_present: bool,
    pub item_count: usize,
    pub open_count: usize,
    pub resolved_count: usize,
    pub false_positive_count: usize,
    pub highest_id_number: u64,
    pub severity_counts: BTreeMap<String, usize>,
    pub gate: GateProgress,
}

/// Which gate steps have been recorded so far.
#[derive(Debug, Serialize, Clone)]
pub struct GateProgress {
    pub baseline_captured: bool,
    pub stages_recorded: Vec<usize>,
    pub intake_checked: bool,
    pub baseline_compared: bool,
    pub decision: String,
}

/// Build the status summary from a store handle and the gate state.
pub fn build_status(store_present: bool, store: &Store, state: &GateState) -> StatusSummary {
    let (open_count, resolved_count, false_positive_count) = store.status_counts();
    let severity_counts = store
        .severity_counts()
        .into_iter()
        .map(|(severity, count)| (severity.as_str().to_string(), count))
        .collect();
    let stages_recorded = (1..=crate::gate::STAGE_COUNT)
        .filter(|stage| state.stage(*stage).is_some())
        .collect();
    StatusSummary {
        store_present,
        item_count: store.len(),
        open_count,
        resolved_count,
        false_positive_count,
        highest_id_number: store.highest_id_number(),
        severity_counts,
        gate: GateProgress {
            baseline_captured: state.baseline.is_some(),
            stages_recorded,
            intake_checked: state.intake.is_some(),
            baseline_compared: state.comparison.is_some(),
            decision: state.decision().to_string(),
        },
    }
}

pub fn print_status(summary: &StatusSummary) {
    println!("store: {}", if summary.store_present { "present" } else { "missing" });
    println!(
        "items: {} ({} open, {} resolved, {} false-positive)",
        summary.item_count,
        summary.open_count,
        summary.resolved_count,
        summary.false_positive_count
    );
    println!("highest id: {}", summary.highest_id_number);
    let severities: Vec<String> = summary
        .severity_counts
        .iter()
        .map(|(severity, count)| format!("{severity}={count}"))
        .collect();
    println!("severity: {}", severities.join(" "));
    println!(
        "gate: baseline={} stages={:?} intake={} compared={}",
        summary.gate.baseline_captured,
        summary.gate.stages_recorded,
        summary.gate.intake_checked,
        summary.gate.baseline_compared
    );
    println!("gate decision: {}", summary.gate.decision);
}

pub fn print_intake(plan: &IntakePlan, applied: bool, assigned: &[String]) {
    let mode = if applied { "apply" } else { "dry-run" };
    println!("intake ({mode}): new={} duplicate={}", plan.new_count(), plan.duplicate_count());
    for duplicate in &plan.duplicates {
        println!("  duplicate {} (existing {})", duplicate.fingerprint, duplicate.existing_id);
    }
    if applied {
        for id in assigned {
            println!("  assigned {id}");
        }
    }
}

pub fn print_resolution(plan: &ResolutionPlan, applied: Option<usize>) {
    println!(
        "resolution: likely={} potential={} still-open={} unknown={}",
        plan.count(ResolutionClass::LikelyResolved),
        plan.count(ResolutionClass::PotentiallyResolved),
        plan.count(ResolutionClass::StillOpen),
        plan.count(ResolutionClass::Unknown)
    );
    for entry in &plan.entries {
        println!("  {} {}: {}", entry.id, entry.class, entry.reason);
    }
    match applied {
        Some(count) => println!("applied: {count} items marked resolved"),
        None => println!("dry-run: no changes written"),
    }
}

pub fn print_comparison(result: &ComparisonResult) {
    println!(
        "diff: new={} resolved={} severity-changed={} recurring={}",
        result.new_findings.len(),
        result.resolved_findings.len(),
        result.severity_changes.len(),
        result.recurring.len()
    );
    for finding in &result.new_findings {
        println!("  new: {} ({})", finding.title, finding.key);
    }
    for finding in &result.resolved_findings {
        println!("  resolved: {} ({})", finding.title, finding.key);
    }
    for change in &result.severity_changes {
        println!("  severity: {} {} -> {}", change.title, change.before, change.after);
    }
    if !result.file_recurrence.is_empty() {
        println!("recurring files:");
        for row in &result.file_recurrence {
            println!("  {} ({} before, {} after)", row.file, row.before_count, row.after_count);
        }
    }
    if !result.similar_titles.is_empty() {
        println!("possible renames:");
        for pair in &result.similar_titles {
            println!(
                "  {:.2} {:?} ~ {:?}",
                pair.similarity, pair.new_title, pair.resolved_title
            );
        }
    }
    for warning in &result.warnings {
        println!("warning: {warning}");
    }
}

/// Render the narrative validation report document.
pub fn render_gate_report(state: &GateState) -> String {
    let mut out = String::new();
    let decision = state.decision();
    push_line(&mut out, "# Validation Report");
    push_line(&mut out, "");
    push_line(&mut out, &format!("Decision: **{decision}**"));
    push_line(&mut out, "");

    push_line(&mut out, "## Baseline");
    match &state.baseline {
        Some(step) => {
            let baseline = &step.baseline;
            push_line(
                &mut out,
                &format!(
                    "- store {}: {} items, highest id {}",
                    if baseline.exists { "present" } else { "missing" },
                    baseline.item_count,
                    baseline.highest_id_number
                ),
            );
            let severities: Vec<String> = baseline
                .severity_counts
                .iter()
                .map(|(severity, count)| format!("{severity}={count}"))
                .collect();
            push_line(&mut out, &format!("- severity: {}", severities.join(" ")));
            if let Some(hash) = &baseline.content_hash {
                push_line(&mut out, &format!("- content hash: {hash}"));
            }
        }
        None => push_line(&mut out, "- not captured"),
    }
    push_line(&mut out, "");

    for stage in 1..=crate::gate::STAGE_COUNT {
        push_line(&mut out, &format!("## Stage {stage}"));
        match state.stage(stage) {
            Some(step) => render_stage(&mut out, step),
            None => push_line(&mut out, "- not run"),
        }
        push_line(&mut out, "");
    }

    push_line(&mut out, "## Intake check");
    match &state.intake {
        Some(step) => {
            push_line(
                &mut out,
                &format!(
                    "- {}: new={} duplicate={} ({})",
                    if step.success { "ok" } else { "failed" },
                    step.new_count,
                    step.duplicate_count,
                    step.batch_path
                ),
            );
            if let Some(message) = &step.message {
                push_line(&mut out, &format!("- error: {message}"));
            }
        }
        None => push_line(&mut out, "- not run"),
    }
    push_line(&mut out, "");

    push_line(&mut out, "## Baseline comparison");
    match &state.comparison {
        Some(step) => {
            push_line(
                &mut out,
                &format!(
                    "- item delta: {}, hash changed: {}",
                    step.item_delta, step.hash_changed
                ),
            );
            if !step.newly_assigned_ids.is_empty() {
                push_line(
                    &mut out,
                    &format!("- new ids: {}", step.newly_assigned_ids.join(", ")),
                );
            }
            let deltas: Vec<String> = step
                .severity_deltas
                .iter()
                .filter(|(_, delta)| **delta != 0)
                .map(|(severity, delta)| format!("{severity}{delta:+}"))
                .collect();
            if !deltas.is_empty() {
                push_line(&mut out, &format!("- severity deltas: {}", deltas.join(" ")));
            }
        }
        None => push_line(&mut out, "- not run"),
    }
    out
}

fn render_stage(out: &mut String, step: &StageStep) {
    let verdict = if step.passed { "passed" } else { "blocked" };
    push_line(
        out,
        &format!(
            "- {verdict} for {} ({} blocking issues)",
            step.date.format("%Y-%m-%d"),
            step.blocking_count()
        ),
    );
    for file in &step.files {
        if !file.present {
            push_line(out, &format!("- {}: missing (warning)", file.path));
            continue;
        }
        push_line(
            out,
            &format!(
                "- {}: {} records, {} issues",
                file.path,
                file.record_count,
                file.issues.len()
            ),
        );
        for issue in &file.issues {
            let kind = if issue.blocking { "blocking" } else { "warning" };
            push_line(out, &format!("  - [{kind}] {}: {}", issue.field, issue.message));
        }
    }
}

fn push_line(out: &mut String, line: &str) {
    out.push_str(line);
    out.push('\n');
}
