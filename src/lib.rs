//! Durable audit-finding ledger.
//!
//! The pipeline runs in batch between audit sessions: raw scanner output is
//! normalized into one canonical schema, validated by a staged gate, deduped
//! into a durable store with monotonic identifiers, classified against
//! version-control history, and diffed across historical snapshots.
pub mod baseline;
pub mod cli;
pub mod commands;
pub mod compare;
pub mod fsio;
pub mod gate;
pub mod normalize;
pub mod paths;
pub mod report;
pub mod resolution;
pub mod schema;
pub mod store;
pub mod util;
pub mod vcs;
