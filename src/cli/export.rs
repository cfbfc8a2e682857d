//! Export subcommand for the taskmark CLI
//!
//! Writes the store as a snapshot that can be version-controlled and diffed.

use clap::Args;
use std::path::PathBuf;

/// Arguments for the export subcommand
#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Output file path (default: stdout)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Force gzip compression (auto-detected from .gz extension otherwise)
    #[arg(long)]
    pub gzip: bool,

    /// Reconcile the vault before exporting
    #[arg(long)]
    pub sync: bool,
}

impl ExportArgs {
    /// Output path, with `.gz` appended when `--gzip` is set and missing.
    pub fn output_path(&self) -> Option<PathBuf> {
        let path = self.output.clone()?;
        if self.gzip && path.extension().is_none_or(|ext| ext != "gz") {
            let mut name = path.into_os_string();
            name.push(".gz");
            return Some(PathBuf::from(name));
        }
        Some(path)
    }
}
