//! Integration tests for snapshot export, import and diff.

use serde_json::json;
use std::fs;
use taskmark::config::{Config, TasksConfig};
use taskmark::export::diff::{DiffOptions, RowKey, diff_snapshot_vs_store, diff_snapshots};
use taskmark::export::{INSTANCES_TABLE, Snapshot, TASKS_TABLE};
use taskmark::vault::Vault;
use tempfile::TempDir;

fn synced_vault(temp: &TempDir, text: &str) -> Vault {
    fs::write(temp.path().join("todo.md"), text).unwrap();
    let mut vault = Vault::open(temp.path(), Config::default()).unwrap();
    vault.sync().unwrap();
    vault
}

#[test]
fn export_then_import_restores_store() {
    let temp = TempDir::new().unwrap();
    let vault = synced_vault(&temp, "- [ ] plan ^1\n    - [x] book #travel ^2\n");

    let path = temp.path().join("out").join("snapshot.json");
    Snapshot::from_store(vault.store()).unwrap().write_to(&path).unwrap();

    let restored = Snapshot::from_file(&path)
        .unwrap()
        .to_store(&TasksConfig::default())
        .unwrap();
    assert_eq!(restored.task_count(), 2);
    assert_eq!(restored.instance_count(), 2);
    assert_eq!(restored.get_task(2), vault.store().get_task(2));
    assert!(restored.get_task(1).unwrap().child_ids.contains(&2));

    let diff = diff_snapshot_vs_store(
        &Snapshot::from_file(&path).unwrap(),
        &restored,
        &DiffOptions::default(),
    )
    .unwrap();
    assert!(diff.is_empty());
}

#[test]
fn gzip_snapshot_reads_back() {
    let temp = TempDir::new().unwrap();
    let vault = synced_vault(&temp, "- [ ] one ^1\n");

    let path = temp.path().join("snapshot.json.gz");
    Snapshot::from_store(vault.store()).unwrap().write_to(&path).unwrap();

    let bytes = fs::read(&path).unwrap();
    assert_eq!(&bytes[..2], &[0x1f, 0x8b]);

    let snapshot = Snapshot::from_file(&path).unwrap();
    assert_eq!(snapshot.get_table(TASKS_TABLE).unwrap().len(), 1);
    assert!(snapshot.is_schema_compatible());
}

#[test]
fn diff_reports_edits_since_export() {
    let temp = TempDir::new().unwrap();
    let mut vault = synced_vault(&temp, "- [ ] one ^1\n");
    let before = Snapshot::from_store(vault.store()).unwrap();

    fs::write(temp.path().join("todo.md"), "- [x] one ^1\n- [ ] two ^2\n").unwrap();
    vault.sync().unwrap();

    let diff = diff_snapshot_vs_store(&before, vault.store(), &DiffOptions::default()).unwrap();
    let tasks = &diff.tables[TASKS_TABLE];
    assert_eq!(tasks.added.len(), 1);
    assert!(tasks.removed.is_empty());
    assert_eq!(tasks.changed.len(), 1);
    assert_eq!(tasks.changed[0].key, RowKey::Task(1));
    assert!(
        tasks.changed[0]
            .changes
            .iter()
            .any(|change| change.field == "complete" && change.after == Some(json!("true")))
    );

    let instances = &diff.tables[INSTANCES_TABLE];
    assert_eq!(instances.added.len(), 1);
    assert_eq!(instances.changed.len(), 1);
}

#[test]
fn identical_snapshots_have_no_diff() {
    let temp = TempDir::new().unwrap();
    let vault = synced_vault(&temp, "- [ ] one ^1\n");

    let a = Snapshot::from_store(vault.store()).unwrap();
    let b = Snapshot::from_store(vault.store()).unwrap();
    let diff = diff_snapshots(&a, &b);

    assert!(diff.is_empty());
    assert_eq!(diff.total_changes(), 0);
    assert_eq!(diff.to_string(), "No differences found.\n");
}

#[test]
fn incompatible_schema_is_rejected() {
    let mut snapshot = Snapshot::new();
    snapshot.schema_version = 99;
    assert!(snapshot.to_store(&TasksConfig::default()).is_err());
}
