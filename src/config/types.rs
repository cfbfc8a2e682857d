//! Configuration types and structures.
//!
//! This module contains all the configuration types used throughout the application.

use crate::index::IndexSpec;
use crate::index::query::{Condition, Field, Operator, Query, SortKey, SortOrder};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Name of the project config directory inside a vault.
pub const PROJECT_DIR_NAME: &str = "taskmark";

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub tasks: TasksConfig,

    #[serde(default)]
    pub tokens: TokensConfig,

    #[serde(default)]
    pub files: FilesConfig,

    /// Index documents, keyed by vault-relative path.
    #[serde(default = "default_indexes")]
    pub indexes: BTreeMap<String, IndexSpec>,

    #[serde(default)]
    pub watch: WatchConfig,

    #[serde(default)]
    pub store: StoreConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tasks: TasksConfig::default(),
            tokens: TokensConfig::default(),
            files: FilesConfig::default(),
            indexes: default_indexes(),
            watch: WatchConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a single YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }
}

/// Task identity and lifecycle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TasksConfig {
    /// Lowest id handed out when minting new tasks.
    #[serde(default = "default_min_id")]
    pub min_id: u64,

    /// Whether deleting a task also deletes its subtasks.
    #[serde(default)]
    pub delete_subtasks: bool,

    /// Reuse the task of the previous instance at the same line when a line
    /// without an id token has the same name or the same children.
    #[serde(default = "default_true")]
    pub match_previous_lines: bool,
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            min_id: default_min_id(),
            delete_subtasks: false,
            match_previous_lines: true,
        }
    }
}

fn default_min_id() -> u64 {
    1
}

fn default_true() -> bool {
    true
}

/// Inline token characters recognised by the line parser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokensConfig {
    #[serde(default = "default_tag_prefix")]
    pub tag_prefix: String,

    #[serde(default = "default_due_prefix")]
    pub due_prefix: String,

    #[serde(default = "default_recurrence_prefix")]
    pub recurrence_prefix: String,

    /// Bracket contents that mark a line complete.
    #[serde(default = "default_complete_markers")]
    pub complete_markers: Vec<String>,

    /// Bracket contents that mark a line in progress (still incomplete).
    #[serde(default = "default_in_progress_markers")]
    pub in_progress_markers: Vec<String>,

    /// Strip tag, due date and recurrence tokens from task names.
    #[serde(default)]
    pub normalize_names: bool,
}

impl Default for TokensConfig {
    fn default() -> Self {
        Self {
            tag_prefix: default_tag_prefix(),
            due_prefix: default_due_prefix(),
            recurrence_prefix: default_recurrence_prefix(),
            complete_markers: default_complete_markers(),
            in_progress_markers: default_in_progress_markers(),
            normalize_names: false,
        }
    }
}

fn default_tag_prefix() -> String {
    "#".to_string()
}

fn default_due_prefix() -> String {
    "@".to_string()
}

fn default_recurrence_prefix() -> String {
    "🔁".to_string()
}

fn default_complete_markers() -> Vec<String> {
    vec!["x".to_string(), "X".to_string()]
}

fn default_in_progress_markers() -> Vec<String> {
    vec!["/".to_string(), "-".to_string()]
}

/// Which documents take part in reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesConfig {
    /// File extensions (without dot) treated as documents.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Vault-relative path prefixes that are never reconciled.
    #[serde(default = "default_ignore")]
    pub ignore: Vec<String>,

    /// Append `^id` tokens to lines that were assigned a new task.
    #[serde(default)]
    pub write_ids: bool,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            ignore: default_ignore(),
            write_ids: false,
        }
    }
}

impl FilesConfig {
    /// Check whether a vault-relative path is ignored.
    pub fn is_ignored(&self, relative_path: &str) -> bool {
        let normalized = relative_path.replace('\\', "/");
        self.ignore.iter().any(|prefix| {
            let prefix = prefix.trim_start_matches("./");
            normalized == prefix.trim_end_matches('/') || normalized.starts_with(prefix)
        })
    }

    /// Check whether a path has one of the document extensions.
    pub fn is_document(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
    }
}

fn default_extensions() -> Vec<String> {
    vec!["md".to_string()]
}

fn default_ignore() -> Vec<String> {
    vec![
        ".obsidian/".to_string(),
        ".git/".to_string(),
        format!("{}/", PROJECT_DIR_NAME),
    ]
}

/// Watch mode settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Debounce window for coalescing rapid document edits.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
        }
    }
}

fn default_debounce_ms() -> u64 {
    500
}

/// Store persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Snapshot file, relative to the vault root unless absolute.
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            snapshot_path: default_snapshot_path(),
        }
    }
}

fn default_snapshot_path() -> PathBuf {
    PathBuf::from(PROJECT_DIR_NAME).join("store.json")
}

/// The two index documents every vault gets unless overridden.
pub fn default_indexes() -> BTreeMap<String, IndexSpec> {
    let mut indexes = BTreeMap::new();

    indexes.insert(
        "Backlog.md".to_string(),
        IndexSpec {
            query: Query::Condition(Condition {
                field: Field::Complete,
                op: Operator::Eq,
                value: Value::Bool(false),
            }),
            sort: vec![SortKey {
                field: Field::Created,
                order: SortOrder::Asc,
            }],
        },
    );

    indexes.insert(
        "Completed.md".to_string(),
        IndexSpec {
            query: Query::Condition(Condition {
                field: Field::Complete,
                op: Operator::Eq,
                value: Value::Bool(true),
            }),
            sort: vec![SortKey {
                field: Field::CompletedDate,
                order: SortOrder::Desc,
            }],
        },
    );

    indexes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.tasks.min_id, 1);
        assert!(!config.tasks.delete_subtasks);
        assert_eq!(config.tokens.tag_prefix, "#");
        assert!(config.indexes.contains_key("Backlog.md"));
        assert!(config.indexes.contains_key("Completed.md"));
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = r#"
tasks:
  min_id: 100
tokens:
  tag_prefix: "+"
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.tasks.min_id, 100);
        assert!(config.tasks.match_previous_lines);
        assert_eq!(config.tokens.tag_prefix, "+");
        assert_eq!(config.tokens.due_prefix, "@");
        assert_eq!(config.indexes.len(), 2);
    }

    #[test]
    fn test_is_ignored() {
        let files = FilesConfig::default();
        assert!(files.is_ignored(".obsidian/workspace.md"));
        assert!(files.is_ignored("taskmark/store.json"));
        assert!(files.is_ignored("taskmark"));
        assert!(!files.is_ignored("notes/taskmark.md"));
        assert!(!files.is_ignored("daily/2024-01-01.md"));
    }

    #[test]
    fn test_is_document() {
        let files = FilesConfig::default();
        assert!(files.is_document(Path::new("a/b.md")));
        assert!(files.is_document(Path::new("a/b.MD")));
        assert!(!files.is_document(Path::new("a/b.txt")));
        assert!(!files.is_document(Path::new("a/README")));
    }
}
