//! Whole-store snapshots.
//!
//! A snapshot holds every task and instance as flat records, grouped into tables.
//! It is what the vault persists between runs and what `export`/`diff` work on:
//! - persistence of the store next to the documents
//! - reviewable, diffable exports (records are sorted by key)
//! - optional gzip compression

pub mod diff;

use crate::config::TasksConfig;
use crate::error::{Result, SyncError};
use crate::record::{Record, Recordable};
use crate::store::Store;
use crate::types::{Task, TaskInstance};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Version of the record layout inside snapshots.
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Snapshot format version (semver).
pub const EXPORT_VERSION: &str = "1.0.0";

pub const TASKS_TABLE: &str = "tasks";
pub const INSTANCES_TABLE: &str = "instances";

/// Tables every snapshot carries.
pub const EXPORTED_TABLES: &[&str] = &[TASKS_TABLE, INSTANCES_TABLE];

/// A serialized copy of a [`Store`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub schema_version: i32,

    /// Export format version (semver)
    pub export_version: String,

    /// ISO 8601 timestamp of export
    pub exported_at: String,

    /// Tool name and version that created this export
    pub exported_by: String,

    /// Records keyed by table name.
    pub tables: BTreeMap<String, Vec<Value>>,
}

impl Snapshot {
    /// Create an empty snapshot with current metadata.
    pub fn new() -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            export_version: EXPORT_VERSION.to_string(),
            exported_at: chrono::Utc::now().to_rfc3339(),
            exported_by: format!("taskmark v{}", env!("CARGO_PKG_VERSION")),
            tables: BTreeMap::new(),
        }
    }

    /// Capture every task and instance of a store.
    pub fn from_store(store: &Store) -> Result<Self> {
        let mut snapshot = Self::new();

        let tasks = store
            .tasks()
            .map(|task| serde_json::to_value(task.to_record()))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let instances = store
            .instances()
            .map(|instance| serde_json::to_value(instance.to_record()))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        snapshot.tables.insert(TASKS_TABLE.to_string(), tasks);
        snapshot.tables.insert(INSTANCES_TABLE.to_string(), instances);
        Ok(snapshot)
    }

    /// Rebuild a store from this snapshot.
    pub fn to_store(&self, config: &TasksConfig) -> Result<Store> {
        if !self.is_schema_compatible() {
            return Err(SyncError::invalid_record(
                "schema_version",
                format!(
                    "snapshot has version {}, expected {}",
                    self.schema_version, CURRENT_SCHEMA_VERSION
                ),
            ));
        }
        let tasks: Vec<Task> = self.decode_table(TASKS_TABLE)?;
        let instances: Vec<TaskInstance> = self.decode_table(INSTANCES_TABLE)?;
        Ok(Store::from_parts(config, tasks, instances))
    }

    fn decode_table<T: Recordable>(&self, name: &str) -> Result<Vec<T>> {
        self.get_table(name)
            .map(|rows| rows.as_slice())
            .unwrap_or(&[])
            .iter()
            .map(|row| {
                let record: Record = serde_json::from_value(row.clone())?;
                T::from_record(&record)
            })
            .collect()
    }

    /// Load a snapshot from JSON data.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a snapshot from a file (supports both plain JSON and gzip).
    pub fn from_file(path: &Path) -> Result<Self> {
        let mut reader = BufReader::new(File::open(path)?);

        // Check for gzip magic bytes
        let mut magic = [0u8; 2];
        let is_gzip = reader.read_exact(&mut magic).is_ok() && magic == [0x1f, 0x8b];

        // Reset to start
        let reader = BufReader::new(File::open(path)?);

        let snapshot = if is_gzip {
            serde_json::from_reader(GzDecoder::new(reader))?
        } else {
            serde_json::from_reader(reader)?
        };
        Ok(snapshot)
    }

    /// Write the snapshot to a file, gzip-compressed when the path ends in `.gz`.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let json = self.to_json_pretty()?;
        let file = BufWriter::new(File::create(path)?);
        if path.extension().is_some_and(|ext| ext == "gz") {
            let mut encoder = GzEncoder::new(file, Compression::default());
            encoder.write_all(json.as_bytes())?;
            encoder.finish()?.flush()?;
        } else {
            let mut file = file;
            file.write_all(json.as_bytes())?;
            file.flush()?;
        }
        Ok(())
    }

    /// Serialize to JSON with pretty formatting.
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Get rows for a specific table.
    pub fn get_table(&self, name: &str) -> Option<&Vec<Value>> {
        self.tables.get(name)
    }

    /// Check if this snapshot's schema is compatible with the current version.
    pub fn is_schema_compatible(&self) -> bool {
        self.schema_version == CURRENT_SCHEMA_VERSION
    }

    /// Get the list of tables present in this snapshot.
    pub fn table_names(&self) -> Vec<&str> {
        self.tables.keys().map(|s| s.as_str()).collect()
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::new()
    }
}
