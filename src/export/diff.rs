//! Record-level comparison of snapshots.
//!
//! Rows are matched by [`RowKey`] (task id, or file and line for instances)
//! and compared field by field. Either side may be a live store, which is
//! snapshotted first.

use super::{INSTANCES_TABLE, Snapshot, TASKS_TABLE};
use crate::error::Result;
use crate::store::Store;
use crate::types::{INSTANCE_KEY_DELIMITER, TaskId};
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Identity of a row within its table.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum RowKey {
    Task(TaskId),
    Instance { file_path: String, line: usize },
    /// Row of an unknown table, or with missing key fields. Keyed by its JSON text.
    Opaque(String),
}

impl RowKey {
    pub fn of(table: &str, row: &Value) -> Self {
        let field = |name: &str| row.get(name).and_then(Value::as_str);
        let parsed = match table {
            TASKS_TABLE => field("id").and_then(|id| id.parse().ok()).map(RowKey::Task),
            INSTANCES_TABLE => field("filePath")
                .zip(field("line").and_then(|line| line.parse().ok()))
                .map(|(file_path, line)| RowKey::Instance {
                    file_path: file_path.to_string(),
                    line,
                }),
            _ => None,
        };
        parsed.unwrap_or_else(|| RowKey::Opaque(row.to_string()))
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowKey::Task(id) => write!(f, "{}", id),
            RowKey::Instance { file_path, line } => {
                write!(f, "{}{}{}", file_path, INSTANCE_KEY_DELIMITER, line)
            }
            RowKey::Opaque(text) => f.write_str(text),
        }
    }
}

impl Serialize for RowKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// What to compare.
#[derive(Debug, Clone, Default)]
pub struct DiffOptions {
    /// Tables to compare. `None` compares every table.
    pub tables: Option<BTreeSet<String>>,
    /// Fields left out of row comparison, e.g. `updated`.
    pub ignore_fields: BTreeSet<String>,
}

impl DiffOptions {
    pub fn includes_table(&self, name: &str) -> bool {
        self.tables.as_ref().is_none_or(|tables| tables.contains(name))
    }
}

/// One field that differs between two rows with the same key.
/// `None` means the field is absent on that side.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldChange {
    pub field: String,
    pub before: Option<Value>,
    pub after: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChangedRow {
    pub key: RowKey,
    pub changes: Vec<FieldChange>,
}

/// Differences within one table, each list ordered by key.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TableDiff {
    /// Rows only in the target
    pub added: Vec<Value>,
    /// Rows only in the source
    pub removed: Vec<Value>,
    pub changed: Vec<ChangedRow>,
}

impl TableDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }

    pub fn change_count(&self) -> usize {
        self.added.len() + self.removed.len() + self.changed.len()
    }
}

/// Differences between two snapshots. Only tables with changes are listed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SnapshotDiff {
    pub source_label: String,
    pub target_label: String,
    pub tables: BTreeMap<String, TableDiff>,
}

impl SnapshotDiff {
    pub fn is_empty(&self) -> bool {
        self.tables.values().all(TableDiff::is_empty)
    }

    pub fn total_changes(&self) -> usize {
        self.tables.values().map(TableDiff::change_count).sum()
    }

    /// `(table, added, removed, changed)` for every table with changes.
    pub fn summary(&self) -> Vec<(String, usize, usize, usize)> {
        self.tables
            .iter()
            .filter(|(_, diff)| !diff.is_empty())
            .map(|(name, diff)| {
                (
                    name.clone(),
                    diff.added.len(),
                    diff.removed.len(),
                    diff.changed.len(),
                )
            })
            .collect()
    }

    pub fn with_labels(mut self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.source_label = source.into();
        self.target_label = target.into();
        self
    }
}

impl fmt::Display for SnapshotDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return writeln!(f, "No differences found.");
        }

        writeln!(f, "--- {}", self.source_label)?;
        writeln!(f, "+++ {}", self.target_label)?;

        for (table, diff) in self.tables.iter().filter(|(_, diff)| !diff.is_empty()) {
            writeln!(
                f,
                "{}: {} added, {} removed, {} changed",
                table,
                diff.added.len(),
                diff.removed.len(),
                diff.changed.len()
            )?;
            for row in &diff.added {
                writeln!(f, "  + {}", describe_row(table, row))?;
            }
            for row in &diff.removed {
                writeln!(f, "  - {}", describe_row(table, row))?;
            }
            for row in &diff.changed {
                writeln!(f, "  ~ {}", row.key)?;
                for change in &row.changes {
                    writeln!(
                        f,
                        "      {}: {} -> {}",
                        change.field,
                        show_value(change.before.as_ref()),
                        show_value(change.after.as_ref())
                    )?;
                }
            }
        }

        writeln!(f, "{} changes", self.total_changes())
    }
}

fn show_value(value: Option<&Value>) -> String {
    value.map_or_else(|| "(none)".to_string(), Value::to_string)
}

/// Key of a row followed by its name, shortened to 40 characters.
fn describe_row(table: &str, row: &Value) -> String {
    let key = RowKey::of(table, row);
    let name = row.get("name").and_then(Value::as_str).unwrap_or_default();
    if name.is_empty() {
        return key.to_string();
    }
    let name = if name.chars().count() > 40 {
        format!("{}...", name.chars().take(37).collect::<String>())
    } else {
        name.to_string()
    };
    format!("{} ({})", key, name)
}

fn index_rows<'a>(table: &str, rows: &'a [Value]) -> BTreeMap<RowKey, &'a Value> {
    rows.iter().map(|row| (RowKey::of(table, row), row)).collect()
}

/// Fields that differ between two rows, in field name order.
fn diff_fields(source: &Value, target: &Value, options: &DiffOptions) -> Vec<FieldChange> {
    let (Some(source), Some(target)) = (source.as_object(), target.as_object()) else {
        return if source == target {
            Vec::new()
        } else {
            vec![FieldChange {
                field: String::new(),
                before: Some(source.clone()),
                after: Some(target.clone()),
            }]
        };
    };

    let fields: BTreeSet<&String> = source.keys().chain(target.keys()).collect();
    fields
        .into_iter()
        .filter(|field| !options.ignore_fields.contains(*field))
        .filter_map(|field| {
            let (before, after) = (source.get(field), target.get(field));
            (before != after).then(|| FieldChange {
                field: field.clone(),
                before: before.cloned(),
                after: after.cloned(),
            })
        })
        .collect()
}

fn diff_table(
    table: &str,
    source_rows: &[Value],
    target_rows: &[Value],
    options: &DiffOptions,
) -> TableDiff {
    let source = index_rows(table, source_rows);
    let target = index_rows(table, target_rows);
    let mut diff = TableDiff::default();

    for (key, row) in &source {
        match target.get(key) {
            None => diff.removed.push((*row).clone()),
            Some(other) => {
                let changes = diff_fields(row, other, options);
                if !changes.is_empty() {
                    diff.changed.push(ChangedRow {
                        key: key.clone(),
                        changes,
                    });
                }
            }
        }
    }
    diff.added = target
        .iter()
        .filter(|(key, _)| !source.contains_key(*key))
        .map(|(_, row)| (*row).clone())
        .collect();

    diff
}

/// Compare two snapshots with the given options.
pub fn diff_snapshots_with(source: &Snapshot, target: &Snapshot, options: &DiffOptions) -> SnapshotDiff {
    let tables: BTreeSet<&String> = source.tables.keys().chain(target.tables.keys()).collect();
    let rows = |snapshot: &Snapshot, table: &str| -> Vec<Value> {
        snapshot.get_table(table).cloned().unwrap_or_default()
    };

    let tables = tables
        .into_iter()
        .filter(|table| options.includes_table(table))
        .map(|table| {
            let diff = diff_table(table, &rows(source, table), &rows(target, table), options);
            (table.clone(), diff)
        })
        .filter(|(_, diff)| !diff.is_empty())
        .collect();

    SnapshotDiff {
        source_label: "source".to_string(),
        target_label: "target".to_string(),
        tables,
    }
}

/// Compare two snapshots over every table and field.
/// "added" rows are only in `target`.
pub fn diff_snapshots(source: &Snapshot, target: &Snapshot) -> SnapshotDiff {
    diff_snapshots_with(source, target, &DiffOptions::default())
}

/// Compare a snapshot against a live store ("added" = only in the store).
pub fn diff_snapshot_vs_store(
    snapshot: &Snapshot,
    store: &Store,
    options: &DiffOptions,
) -> Result<SnapshotDiff> {
    let current = Snapshot::from_store(store)?;
    Ok(diff_snapshots_with(snapshot, &current, options).with_labels("snapshot", "store"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::NewTask;
    use serde_json::json;

    #[test]
    fn test_row_keys() {
        let task = json!({"id": "12", "name": "x"});
        let instance = json!({"filePath": "a.md", "line": "3"});
        assert_eq!(RowKey::of("tasks", &task), RowKey::Task(12));
        assert_eq!(RowKey::of("instances", &instance).to_string(), "a.md::3");
        assert!(matches!(RowKey::of("tasks", &json!({"id": "^x"})), RowKey::Opaque(_)));
        assert!(matches!(RowKey::of("other", &task), RowKey::Opaque(_)));
    }

    #[test]
    fn test_task_keys_order_numerically() {
        let rows = vec![json!({"id": "10"}), json!({"id": "9"})];
        let diff = diff_table("tasks", &[], &rows, &DiffOptions::default());
        assert_eq!(diff.added[0]["id"], json!("9"));
        assert_eq!(diff.added[1]["id"], json!("10"));
    }

    #[test]
    fn test_diff_table() {
        let source = vec![
            json!({"id": "1", "name": "Keep"}),
            json!({"id": "2", "name": "Remove"}),
            json!({"id": "3", "name": "Old", "dueDate": "2024-01-01T00:00:00Z"}),
        ];
        let target = vec![
            json!({"id": "1", "name": "Keep"}),
            json!({"id": "3", "name": "New"}),
            json!({"id": "4", "name": "Added"}),
        ];

        let diff = diff_table("tasks", &source, &target, &DiffOptions::default());
        assert_eq!(diff.added[0]["id"], json!("4"));
        assert_eq!(diff.removed[0]["id"], json!("2"));
        assert_eq!(diff.changed[0].key, RowKey::Task(3));
        assert_eq!(
            diff.changed[0].changes,
            vec![
                FieldChange {
                    field: "dueDate".to_string(),
                    before: Some(json!("2024-01-01T00:00:00Z")),
                    after: None,
                },
                FieldChange {
                    field: "name".to_string(),
                    before: Some(json!("Old")),
                    after: Some(json!("New")),
                },
            ]
        );
    }

    #[test]
    fn test_ignored_fields_and_tables() {
        let mut store = Store::new(1);
        let id = store.create_task(NewTask::named("a")).id;
        let before = Snapshot::from_store(&store).unwrap();

        store.set_task_complete(id, true).unwrap();
        let options = DiffOptions {
            tables: None,
            ignore_fields: ["complete", "completedDate", "updated"]
                .into_iter()
                .map(String::from)
                .collect(),
        };
        assert!(diff_snapshot_vs_store(&before, &store, &options).unwrap().is_empty());

        let only_instances = DiffOptions {
            tables: Some(BTreeSet::from(["instances".to_string()])),
            ..DiffOptions::default()
        };
        assert!(
            diff_snapshot_vs_store(&before, &store, &only_instances)
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_diff_snapshot_vs_store() {
        let mut store = Store::new(1);
        let id = store.create_task(NewTask::named("a")).id;
        let before = Snapshot::from_store(&store).unwrap();

        store.set_task_complete(id, true).unwrap();
        store.create_task(NewTask::named("b"));

        let diff = diff_snapshot_vs_store(&before, &store, &DiffOptions::default()).unwrap();
        assert_eq!(diff.summary(), vec![("tasks".to_string(), 1, 0, 1)]);
        let fields: Vec<&str> = diff.tables["tasks"].changed[0]
            .changes
            .iter()
            .map(|c| c.field.as_str())
            .collect();
        assert!(fields.contains(&"complete"));
        assert!(fields.contains(&"completedDate"));
    }

    #[test]
    fn test_display() {
        let mut diff = SnapshotDiff::default().with_labels("old.json", "new.json");
        diff.tables.insert(
            "instances".to_string(),
            TableDiff {
                added: vec![json!({"filePath": "a.md", "line": "2", "name": "New Task"})],
                ..TableDiff::default()
            },
        );

        let output = diff.to_string();
        assert!(output.starts_with("--- old.json\n+++ new.json\n"));
        assert!(output.contains("instances: 1 added, 0 removed, 0 changed"));
        assert!(output.contains("  + a.md::2 (New Task)"));
        assert!(output.ends_with("1 changes\n"));
    }

    #[test]
    fn test_empty_diff_display() {
        assert_eq!(SnapshotDiff::default().to_string(), "No differences found.\n");
    }

    #[test]
    fn test_json_keys_are_strings() {
        let row = ChangedRow {
            key: RowKey::Instance {
                file_path: "b.md".to_string(),
                line: 4,
            },
            changes: vec![],
        };
        assert_eq!(serde_json::to_value(&row).unwrap()["key"], json!("b.md::4"));
    }
}
