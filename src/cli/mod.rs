//! CLI command definitions for taskmark
//!
//! This module defines the CLI structure using clap's derive macros.
//! The main entry point is the `Cli` struct which contains subcommands.

pub mod diff;
pub mod export;

use crate::types::{NO_ID, TaskId, decode_id};
use clap::{Args, Parser, Subcommand};
use diff::DiffArgs;
use export::ExportArgs;
use std::path::PathBuf;

/// Reconcile markdown checklists with a task store
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Vault root directory (default: current directory)
    #[arg(long, global = true)]
    pub vault: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging output: 0/off, 1/stdout, 2/stderr (default), or filename
    #[arg(short, long, default_value = "2", global = true)]
    pub log: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Reconcile every document and write index documents (default)
    Sync,

    /// Print an index document without writing it
    Index(IndexArgs),

    /// Print a task's record as front matter
    Show(ShowArgs),

    /// Export the store to a snapshot
    Export(ExportArgs),

    /// Compare snapshot files or a snapshot against the store
    Diff(DiffArgs),

    /// Sync, then keep syncing as documents change
    Watch,
}

/// Arguments for the index subcommand
#[derive(Args, Debug)]
pub struct IndexArgs {
    /// Index document path, relative to the vault
    #[arg(value_name = "FILE")]
    pub file: String,

    /// Ad-hoc query as JSON instead of the configured one
    #[arg(short, long, value_name = "JSON")]
    pub query: Option<String>,
}

/// Arguments for the show subcommand
#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Decimal task id (`361`) or id token with its caret (`^a1`)
    #[arg(value_name = "ID")]
    pub id: String,
}

impl ShowArgs {
    /// The task id named by the argument, or `None` if it names none.
    pub fn task_id(&self) -> Option<TaskId> {
        let id = self.id.trim();
        let id = match id.strip_prefix('^') {
            Some(token) => decode_id(token),
            None => id.parse().unwrap_or(NO_ID),
        };
        (id != NO_ID).then_some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn show(id: &str) -> Option<TaskId> {
        ShowArgs { id: id.to_string() }.task_id()
    }

    #[test]
    fn test_show_id_forms() {
        assert_eq!(show("42"), Some(42));
        assert_eq!(show("^a1"), Some(361));
        assert_eq!(show("^A1"), Some(361));
        assert_eq!(show("a1"), None);
        assert_eq!(show("0"), None);
        assert_eq!(show("^"), None);
    }
}
