use anyhow::Result;
use clap::Parser;
use debt_ledger::cli::{Command, RootArgs};
use debt_ledger::commands;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = RootArgs::parse();
    match cli.command {
        Command::Normalize(args) => commands::run_normalize(args),
        Command::Ingest(args) => commands::run_ingest(args),
        Command::Resolve(args) => commands::run_resolve(args),
        Command::Diff(args) => commands::run_diff(args),
        Command::Baseline(args) => commands::run_baseline(args),
        Command::Check(args) => commands::run_check(args),
        Command::CheckIntake(args) => commands::run_check_intake(args),
        Command::CompareBaseline(args) => commands::run_compare_baseline(args),
        Command::Report(args) => commands::run_report(args),
        Command::Status(args) => commands::run_status(args),
    }
}
