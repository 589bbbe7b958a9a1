//! Command runners wiring the CLI to the library.
//!
//! Each runner resolves paths inside the project root before touching
//! anything, computes a structured result, and renders it in narrative or
//! JSON form. Dry-run is the default everywhere; only `--apply` persists.
use crate::cli::{
    BaselineArgs, CheckArgs, CheckIntakeArgs, CompareBaselineArgs, DiffArgs, IngestArgs,
    NormalizeArgs, ReportArgs, ResolveArgs, StatusArgs,
};
use crate::compare::{self, CompareOptions};
use crate::fsio;
use crate::gate::{self, GateDecision};
use crate::normalize::normalize_batch;
use crate::paths::{ensure_project_root, resolve_in_root, ProjectPaths};
use crate::report;
use crate::resolution::{apply_resolution, plan_resolution, ResolutionThresholds};
use crate::schema::{Category, FindingRecord};
use crate::store::{commit_intake, plan_intake, Store};
use crate::util::display_path;
use crate::vcs::GitCli;
use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use serde_json::json;
use std::fs;

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

pub fn run_normalize(args: NormalizeArgs) -> Result<()> {
    let root = ensure_project_root(&args.root, true)?;
    let paths = ProjectPaths::new(root.clone());
    let category = Category::parse(&args.category).ok_or_else(|| {
        anyhow!(
            "unknown category {:?} (expected one of: {})",
            args.category,
            Category::ALL.map(|c| c.as_str()).join(", ")
        )
    })?;
    let date = args.date.unwrap_or_else(today);

    let input = resolve_in_root(&root, &args.input)?;
    let text = fs::read_to_string(&input).with_context(|| format!("read {}", input.display()))?;
    let batch = normalize_batch(&text)?;

    let output = match &args.output {
        Some(path) => resolve_in_root(&root, path)?,
        None => paths.batch_path(category, date),
    };
    fsio::write_jsonl(&output, &batch.records)?;
    let output_display = display_path(&output, Some(&root));

    if args.json {
        let summary = json!({
            "record_count": batch.records.len(),
            "transformation_count": batch.transformation_count(),
            "output": output_display,
            "logs": batch.logs,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "normalized {} records ({} transformations)",
            batch.records.len(),
            batch.transformation_count()
        );
        println!("wrote {output_display}");
    }
    Ok(())
}

pub fn run_ingest(args: IngestArgs) -> Result<()> {
    let root = ensure_project_root(&args.root, true)?;
    let paths = ProjectPaths::new(root.clone());
    let batch_path = resolve_in_root(&root, &args.batch)?;

    let mut store = Store::load_or_empty(&paths.store_path())?;
    let batch: Vec<FindingRecord> = fsio::read_jsonl_strict(&batch_path)?;

    // Top-severity findings are unintakeable without confirmed verification,
    // even when the caller skips the staged gate.
    let mut blocking = Vec::new();
    for (index, record) in batch.iter().enumerate() {
        for issue in gate::validate_critical_verification(record) {
            blocking.push(format!("record {}: {}: {}", index + 1, issue.field, issue.message));
        }
    }
    if !blocking.is_empty() {
        for line in &blocking {
            eprintln!("blocking: {line}");
        }
        return Err(anyhow!(
            "{} blocking verification issues; nothing ingested",
            blocking.len()
        ));
    }

    let plan = plan_intake(&store, &batch);
    let assigned = if args.apply {
        let assigned = commit_intake(&mut store, &plan, today());
        store.persist(&paths.store_path())?;
        assigned
    } else {
        Vec::new()
    };

    if args.json {
        let summary = json!({
            "mode": if args.apply { "apply" } else { "dry-run" },
            "new_count": plan.new_count(),
            "duplicate_count": plan.duplicate_count(),
            "duplicates": plan.duplicates,
            "assigned_ids": assigned,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        report::print_intake(&plan, args.apply, &assigned);
    }
    Ok(())
}

pub fn run_resolve(args: ResolveArgs) -> Result<()> {
    let root = ensure_project_root(&args.root, false)?;
    let paths = ProjectPaths::new(root.clone());
    let repo = match &args.repo {
        Some(repo) => repo
            .canonicalize()
            .with_context(|| format!("resolve repository {}", repo.display()))?,
        None => root.clone(),
    };

    let mut store = Store::load_or_empty(&paths.store_path())?;
    let vcs = GitCli::discover(repo)?;
    let thresholds = ResolutionThresholds {
        potential_min: args.potential_threshold,
        likely_min: args.likely_threshold,
    };
    let plan = plan_resolution(&store, &vcs, thresholds);

    let applied = if args.apply {
        let count = apply_resolution(&mut store, &plan, today())?;
        store.persist(&paths.store_path())?;
        Some(count)
    } else {
        None
    };

    if args.json {
        let summary = json!({
            "mode": if args.apply { "apply" } else { "dry-run" },
            "entries": plan.entries,
            "applied_count": applied,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        report::print_resolution(&plan, applied);
    }
    Ok(())
}

pub fn run_diff(args: DiffArgs) -> Result<()> {
    let root = ensure_project_root(&args.root, false)?;
    let before_path = resolve_in_root(&root, &args.before)?;
    let after_path = resolve_in_root(&root, &args.after)?;

    let before_text =
        fs::read_to_string(&before_path).with_context(|| format!("read {}", before_path.display()))?;
    let after_text =
        fs::read_to_string(&after_path).with_context(|| format!("read {}", after_path.display()))?;
    let (before, mut warnings) = compare::parse_snapshot_lenient(&before_text, "before");
    let (after, after_warnings) = compare::parse_snapshot_lenient(&after_text, "after");
    warnings.extend(after_warnings);

    let options = CompareOptions {
        similarity_threshold: args.similarity_threshold,
    };
    let result = compare::compare(&before, &after, options, warnings);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        report::print_comparison(&result);
    }
    Ok(())
}

pub fn run_baseline(args: BaselineArgs) -> Result<()> {
    let root = ensure_project_root(&args.root, true)?;
    let paths = ProjectPaths::new(root);
    let step = gate::run_baseline(&paths)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&step)?);
    } else {
        let baseline = &step.baseline;
        println!(
            "baseline captured: store {}, {} items, highest id {}",
            if baseline.exists { "present" } else { "missing" },
            baseline.item_count,
            baseline.highest_id_number
        );
    }
    Ok(())
}

pub fn run_check(args: CheckArgs) -> Result<()> {
    let root = ensure_project_root(&args.root, true)?;
    let paths = ProjectPaths::new(root);
    let date = args.date.unwrap_or_else(today);
    let step = gate::run_stage(&paths, args.stage, date)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&step)?);
    } else {
        println!(
            "stage {}: {} ({} blocking issues)",
            args.stage,
            if step.passed { "passed" } else { "blocked" },
            step.blocking_count()
        );
        for file in &step.files {
            if !file.present {
                println!("  {}: missing (warning)", file.path);
                continue;
            }
            println!("  {}: {} records, {} issues", file.path, file.record_count, file.issues.len());
            for issue in &file.issues {
                let kind = if issue.blocking { "blocking" } else { "warning" };
                println!("    [{kind}] {}: {}", issue.field, issue.message);
            }
        }
    }
    if !step.passed {
        return Err(anyhow!(
            "stage {} blocked with {} issues",
            args.stage,
            step.blocking_count()
        ));
    }
    Ok(())
}

pub fn run_check_intake(args: CheckIntakeArgs) -> Result<()> {
    let root = ensure_project_root(&args.root, true)?;
    let paths = ProjectPaths::new(root.clone());
    let batch_path = resolve_in_root(&root, &args.batch)?;
    let step = gate::run_intake_check(&paths, &batch_path)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&step)?);
    } else if step.success {
        println!(
            "intake check ok: new={} duplicate={}",
            step.new_count, step.duplicate_count
        );
    } else {
        println!(
            "intake check failed: {}",
            step.message.as_deref().unwrap_or("unknown error")
        );
    }
    if !step.success {
        return Err(anyhow!("intake validation failed"));
    }
    Ok(())
}

pub fn run_compare_baseline(args: CompareBaselineArgs) -> Result<()> {
    let root = ensure_project_root(&args.root, false)?;
    let paths = ProjectPaths::new(root);
    let step = gate::run_compare_baseline(&paths)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&step)?);
    } else {
        println!(
            "baseline comparison: item delta {}, hash changed {}",
            step.item_delta, step.hash_changed
        );
        if !step.newly_assigned_ids.is_empty() {
            println!("new ids: {}", step.newly_assigned_ids.join(", "));
        }
    }
    Ok(())
}

pub fn run_report(args: ReportArgs) -> Result<()> {
    let root = ensure_project_root(&args.root, false)?;
    let paths = ProjectPaths::new(root.clone());
    let state = gate::run_report(&paths)?;
    let rendered = report::render_gate_report(&state);
    fsio::write_atomic(&paths.report_path(), rendered.as_bytes())?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&state)?);
    } else {
        print!("{rendered}");
        println!("wrote {}", display_path(&paths.report_path(), Some(&root)));
    }
    match state.decision() {
        GateDecision::Pass => Ok(()),
        decision => Err(anyhow!("validation session is {decision}")),
    }
}

pub fn run_status(args: StatusArgs) -> Result<()> {
    let root = ensure_project_root(&args.root, false)?;
    let paths = ProjectPaths::new(root);
    let store_present = paths.store_path().is_file();
    let store = Store::load_or_empty(&paths.store_path())?;
    let state = gate::load_state(&paths)?;
    let summary = report::build_status(store_present, &store, &state);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        report::print_status(&summary);
    }
    Ok(())
}
