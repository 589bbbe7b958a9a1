//! CLI argument parsing for the finding-ledger workflow.
//!
//! The CLI is intentionally thin: it wires commands to the library without
//! embedding policy, so the same core logic is testable against fixtures.
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Root CLI entrypoint for the finding-ledger workflow.
#[derive(Parser, Debug)]
#[command(
    name = "dledger",
    version,
    about = "Durable audit-finding ledger with dedup, resolution tracking, and trend diffs",
    after_help = "Commands:\n  normalize --root <dir> --input <file> --category <cat>  Canonicalize a raw scanner batch\n  ingest --root <dir> --batch <file> [--apply]            Dedup a batch into the store\n  resolve --root <dir> [--apply]                          Classify open items against git history\n  diff --root <dir> --before <file> --after <file>        Trend diff between two snapshots\n  baseline --root <dir>                                   Capture the session store baseline\n  check --root <dir> --stage <n>                          Validate one stage's batches\n  check-intake --root <dir> --batch <file>                Dry-run intake for the gate\n  compare-baseline --root <dir>                           Diff the store against the baseline\n  report --root <dir>                                     Write the narrative validation report\n  status --root <dir>                                     Read-only ledger summary\n\nExamples:\n  dledger normalize --root . --input raw.jsonl --category security\n  dledger ingest --root . --batch findings/security/2026-08-05.jsonl --apply\n  dledger resolve --root . --repo . --apply\n  dledger diff --root . --before old.jsonl --after new.jsonl --json",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    #[command(subcommand)]
    pub command: Command,
}

/// Top-level workflow commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    Normalize(NormalizeArgs),
    Ingest(IngestArgs),
    Resolve(ResolveArgs),
    Diff(DiffArgs),
    Baseline(BaselineArgs),
    Check(CheckArgs),
    CheckIntake(CheckIntakeArgs),
    CompareBaseline(CompareBaselineArgs),
    Report(ReportArgs),
    Status(StatusArgs),
}

/// Normalize command inputs for one raw scanner batch.
#[derive(Parser, Debug)]
#[command(about = "Canonicalize a raw finding batch into the standard schema")]
pub struct NormalizeArgs {
    /// Project root containing the ledger and batch directories
    #[arg(long, value_name = "DIR")]
    pub root: PathBuf,

    /// Raw batch file (line-delimited JSON), relative to the root
    #[arg(long, value_name = "FILE")]
    pub input: PathBuf,

    /// Canonical category naming the output batch directory
    #[arg(long, value_name = "CAT")]
    pub category: String,

    /// Batch date (defaults to today)
    #[arg(long, value_name = "YYYY-MM-DD")]
    pub date: Option<chrono::NaiveDate>,

    /// Output path override, relative to the root
    #[arg(long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Emit the transformation summary as JSON
    #[arg(long)]
    pub json: bool,
}

/// Ingest command inputs for merging a batch into the store.
#[derive(Parser, Debug)]
#[command(about = "Dedup a normalized batch into the finding store")]
pub struct IngestArgs {
    /// Project root containing the ledger and batch directories
    #[arg(long, value_name = "DIR")]
    pub root: PathBuf,

    /// Normalized batch file, relative to the root
    #[arg(long, value_name = "FILE")]
    pub batch: PathBuf,

    /// Mutate and persist the store (default is dry-run)
    #[arg(long)]
    pub apply: bool,

    /// Emit the intake plan as JSON
    #[arg(long)]
    pub json: bool,
}

/// Resolve command inputs for the resolution classifier.
#[derive(Parser, Debug)]
#[command(about = "Classify open items against version-control history")]
pub struct ResolveArgs {
    /// Project root containing the ledger and batch directories
    #[arg(long, value_name = "DIR")]
    pub root: PathBuf,

    /// Repository queried for file history (defaults to the project root)
    #[arg(long, value_name = "DIR")]
    pub repo: Option<PathBuf>,

    /// Mutate likely-resolved items and persist (default is dry-run)
    #[arg(long)]
    pub apply: bool,

    /// Minimum commit count classified as potentially resolved
    #[arg(long, value_name = "N", default_value_t = 1)]
    pub potential_threshold: usize,

    /// Minimum commit count classified as likely resolved
    #[arg(long, value_name = "N", default_value_t = 3)]
    pub likely_threshold: usize,

    /// Emit the resolution plan as JSON
    #[arg(long)]
    pub json: bool,
}

/// Diff command inputs for two historical snapshots.
#[derive(Parser, Debug)]
#[command(about = "Trend diff between two historical finding snapshots")]
pub struct DiffArgs {
    /// Project root containing the ledger and batch directories
    #[arg(long, value_name = "DIR")]
    pub root: PathBuf,

    /// Earlier snapshot file, relative to the root
    #[arg(long, value_name = "FILE")]
    pub before: PathBuf,

    /// Later snapshot file, relative to the root
    #[arg(long, value_name = "FILE")]
    pub after: PathBuf,

    /// Jaccard threshold for title-similarity pairing
    #[arg(long, value_name = "F", default_value_t = crate::compare::DEFAULT_SIMILARITY_THRESHOLD)]
    pub similarity_threshold: f64,

    /// Emit the comparison result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Baseline command inputs for the validation gate.
#[derive(Parser, Debug)]
#[command(about = "Capture the session store baseline")]
pub struct BaselineArgs {
    /// Project root containing the ledger and batch directories
    #[arg(long, value_name = "DIR")]
    pub root: PathBuf,

    /// Emit the captured baseline as JSON
    #[arg(long)]
    pub json: bool,
}

/// Check command inputs validating one stage's batches.
#[derive(Parser, Debug)]
#[command(about = "Validate every expected batch for one stage")]
pub struct CheckArgs {
    /// Project root containing the ledger and batch directories
    #[arg(long, value_name = "DIR")]
    pub root: PathBuf,

    /// Stage number (1-3)
    #[arg(long, value_name = "N")]
    pub stage: usize,

    /// Batch date (defaults to today)
    #[arg(long, value_name = "YYYY-MM-DD")]
    pub date: Option<chrono::NaiveDate>,

    /// Emit the stage result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Check-intake command inputs for the gate's intake dry-run.
#[derive(Parser, Debug)]
#[command(about = "Record an intake dry-run for the validation gate")]
pub struct CheckIntakeArgs {
    /// Project root containing the ledger and batch directories
    #[arg(long, value_name = "DIR")]
    pub root: PathBuf,

    /// Normalized batch file, relative to the root
    #[arg(long, value_name = "FILE")]
    pub batch: PathBuf,

    /// Emit the intake check as JSON
    #[arg(long)]
    pub json: bool,
}

/// Compare-baseline command inputs.
#[derive(Parser, Debug)]
#[command(about = "Diff the current store against the captured baseline")]
pub struct CompareBaselineArgs {
    /// Project root containing the ledger and batch directories
    #[arg(long, value_name = "DIR")]
    pub root: PathBuf,

    /// Emit the comparison as JSON
    #[arg(long)]
    pub json: bool,
}

/// Report command inputs for the narrative session report.
#[derive(Parser, Debug)]
#[command(about = "Generate the narrative validation report")]
pub struct ReportArgs {
    /// Project root containing the ledger and batch directories
    #[arg(long, value_name = "DIR")]
    pub root: PathBuf,

    /// Emit the gate state as JSON instead of the narrative
    #[arg(long)]
    pub json: bool,
}

/// Status command inputs for the read-only ledger summary.
#[derive(Parser, Debug)]
#[command(about = "Summarize the ledger and gate progress")]
pub struct StatusArgs {
    /// Project root containing the ledger and batch directories
    #[arg(long, value_name = "DIR")]
    pub root: PathBuf,

    /// Emit machine-readable JSON output
    #[arg(long)]
    pub json: bool,
}
