//! `taskmark diff`: compare a snapshot with the vault's store or another snapshot.

use crate::export::diff::DiffOptions;
use clap::{Args, ValueEnum};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Fields that change on every touch of a task.
const TIMESTAMP_FIELDS: &[&str] = &["created", "updated", "completedDate"];

#[derive(Args, Debug)]
pub struct DiffArgs {
    /// Snapshot to compare from
    #[arg(value_name = "FILE")]
    pub source: PathBuf,

    /// Snapshot to compare to (defaults to the current store)
    #[arg(value_name = "FILE")]
    pub target: Option<PathBuf>,

    #[arg(short, long, value_enum, default_value_t = DiffFormat::Text)]
    pub format: DiffFormat,

    /// Only compare these tables (comma-separated)
    #[arg(long, value_enum, value_name = "LIST", value_delimiter = ',')]
    pub tables: Vec<DiffTable>,

    /// Leave these record fields out of the comparison (comma-separated)
    #[arg(long, value_name = "FIELDS", value_delimiter = ',')]
    pub ignore: Vec<String>,

    /// Shorthand for ignoring created, updated and completedDate
    #[arg(long)]
    pub ignore_timestamps: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum DiffFormat {
    #[default]
    Text,
    Json,
    /// Per-table counts only
    Summary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DiffTable {
    Tasks,
    Instances,
}

impl DiffTable {
    pub fn table_name(self) -> &'static str {
        match self {
            DiffTable::Tasks => crate::export::TASKS_TABLE,
            DiffTable::Instances => crate::export::INSTANCES_TABLE,
        }
    }
}

impl DiffArgs {
    pub fn options(&self) -> DiffOptions {
        let tables = (!self.tables.is_empty()).then(|| {
            self.tables
                .iter()
                .map(|table| table.table_name().to_string())
                .collect()
        });

        let mut ignore_fields: BTreeSet<String> =
            self.ignore.iter().map(|field| field.trim().to_string()).collect();
        if self.ignore_timestamps {
            ignore_fields.extend(TIMESTAMP_FIELDS.iter().map(|field| field.to_string()));
        }

        DiffOptions {
            tables,
            ignore_fields,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: DiffArgs,
    }

    fn parse(argv: &[&str]) -> DiffArgs {
        Harness::try_parse_from(std::iter::once("diff").chain(argv.iter().copied()))
            .unwrap()
            .args
    }

    #[test]
    fn test_defaults() {
        let args = parse(&["a.json"]);
        assert_eq!(args.format, DiffFormat::Text);
        assert!(args.target.is_none());

        let options = args.options();
        assert!(options.tables.is_none());
        assert!(options.ignore_fields.is_empty());
    }

    #[test]
    fn test_table_filter() {
        let args = parse(&["a.json", "b.json", "--tables", "instances", "-f", "summary"]);
        assert_eq!(args.format, DiffFormat::Summary);

        let options = args.options();
        assert!(options.includes_table("instances"));
        assert!(!options.includes_table("tasks"));
    }

    #[test]
    fn test_ignored_fields() {
        let options = parse(&["a.json", "--ignore", "rawText,tags", "--ignore-timestamps"]).options();
        let fields: Vec<&str> = options.ignore_fields.iter().map(String::as_str).collect();
        assert_eq!(
            fields,
            vec!["completedDate", "created", "rawText", "tags", "updated"]
        );
    }

    #[test]
    fn test_unknown_values_rejected() {
        let argv = ["diff", "a.json", "--tables", "agents"];
        assert!(Harness::try_parse_from(argv).is_err());
        let argv = ["diff", "a.json", "--format", "xml"];
        assert!(Harness::try_parse_from(argv).is_err());
    }
}
