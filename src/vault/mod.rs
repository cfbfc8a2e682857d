//! A directory of markdown documents backed by a task store.
//!
//! The vault is the document source for the reconciliation engine: it walks the
//! directory, feeds each document through the parser into
//! [`Store::reconcile_file`], writes index documents and persists the store
//! as a snapshot under the vault.

pub mod watcher;

use crate::config::Config;
use crate::error::Result;
use crate::export::Snapshot;
use crate::index::{IndexSpec, materialize_index};
use crate::parser::LineParser;
use crate::render::{render_index, with_id_token};
use crate::store::{ReconcileReport, Store};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Totals for one sync pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    /// Documents examined.
    pub documents: usize,
    /// Documents whose instances changed.
    pub reconciled: usize,
    pub created_tasks: usize,
    /// Files that vanished and had their instances removed.
    pub removed_files: usize,
    /// Files whose source lines received new id tokens.
    pub ids_written: usize,
    pub indexes_written: usize,
    /// Documents that could not be reconciled, with the reason.
    pub failed: Vec<(String, String)>,
}

/// A vault directory with its configuration, parser and store.
#[derive(Debug)]
pub struct Vault {
    root: PathBuf,
    config: Config,
    parser: LineParser,
    store: Store,
}

impl Vault {
    /// Open a vault, restoring the store from its snapshot when one exists.
    pub fn open(root: impl Into<PathBuf>, config: Config) -> Result<Self> {
        let root = root.into();
        let parser = LineParser::new(&config.tokens)?;
        let snapshot_path = resolve(&root, &config.store.snapshot_path);

        let store = if snapshot_path.exists() {
            let store = Snapshot::from_file(&snapshot_path)?.to_store(&config.tasks)?;
            info!(
                path = %snapshot_path.display(),
                tasks = store.task_count(),
                instances = store.instance_count(),
                "Restored store"
            );
            store
        } else {
            debug!(path = %snapshot_path.display(), "No snapshot; starting empty");
            Store::from_config(&config.tasks)
        };

        Ok(Self {
            root,
            config,
            parser,
            store,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut Store {
        &mut self.store
    }

    pub fn parser(&self) -> &LineParser {
        &self.parser
    }

    pub fn snapshot_path(&self) -> PathBuf {
        resolve(&self.root, &self.config.store.snapshot_path)
    }

    /// Vault-relative path with forward slashes, or `None` outside the vault.
    pub fn relative_path(&self, path: &Path) -> Option<String> {
        let relative = if path.is_absolute() {
            path.strip_prefix(&self.root).ok()?
        } else {
            path
        };
        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        (!parts.is_empty()).then(|| parts.join("/"))
    }

    /// Whether a vault-relative path is a document that takes part in reconciliation.
    /// Index documents are generated views and never reconciled.
    pub fn is_tracked(&self, relative_path: &str) -> bool {
        self.config.files.is_document(Path::new(relative_path))
            && !self.config.files.is_ignored(relative_path)
            && !self.config.indexes.contains_key(relative_path)
    }

    /// All tracked documents, sorted by relative path.
    pub fn documents(&self) -> Vec<String> {
        let mut documents: Vec<String> = WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| {
                if entry.depth() == 0 || !entry.file_type().is_dir() {
                    return true;
                }
                self.relative_path(entry.path())
                    .is_none_or(|rel| !self.config.files.is_ignored(&format!("{}/", rel)))
            })
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| self.relative_path(entry.path()))
            .filter(|rel| self.is_tracked(rel))
            .collect();
        documents.sort();
        documents
    }

    /// Reconcile every document, drop vanished files, then write indexes and the snapshot.
    pub fn sync(&mut self) -> Result<SyncSummary> {
        let documents = self.documents();
        let mut summary = SyncSummary {
            documents: documents.len(),
            ..SyncSummary::default()
        };

        let present: BTreeSet<&str> = documents.iter().map(String::as_str).collect();
        let vanished: Vec<String> = self
            .store
            .files()
            .filter(|file| !present.contains(file))
            .map(str::to_string)
            .collect();
        for file in vanished {
            self.store.delete_file(&file, false)?;
            summary.removed_files += 1;
        }

        for document in &documents {
            self.sync_into(document, &mut summary)?;
        }

        summary.indexes_written = self.write_indexes()?;
        self.save()?;

        info!(
            documents = summary.documents,
            reconciled = summary.reconciled,
            created = summary.created_tasks,
            removed_files = summary.removed_files,
            failed = summary.failed.len(),
            "Sync complete"
        );
        Ok(summary)
    }

    /// Sync only the given paths (absolute or vault-relative), as reported by a watcher.
    pub fn sync_paths(&mut self, paths: &[PathBuf]) -> Result<SyncSummary> {
        let mut summary = SyncSummary::default();
        let relative: BTreeSet<String> = paths
            .iter()
            .filter_map(|path| self.relative_path(path))
            .collect();

        for rel in &relative {
            if !self.is_tracked(rel) {
                continue;
            }
            if self.root.join(rel).is_file() {
                summary.documents += 1;
                self.sync_into(rel, &mut summary)?;
            } else if self.store.files().any(|file| file == rel) {
                self.store.delete_file(rel, false)?;
                summary.removed_files += 1;
            }
        }

        if summary.reconciled > 0 || summary.removed_files > 0 {
            summary.indexes_written = self.write_indexes()?;
            self.save()?;
        }
        Ok(summary)
    }

    fn sync_into(&mut self, document: &str, summary: &mut SyncSummary) -> Result<()> {
        match self.sync_file(document) {
            Ok(report) => {
                if !report.unchanged {
                    summary.reconciled += 1;
                }
                summary.created_tasks += report.created.len();
                if self.config.files.write_ids && !report.assigned.is_empty() {
                    summary.ids_written += 1;
                }
                Ok(())
            }
            Err(e) if e.is_structural() => {
                warn!(file = %document, error = %e, "Skipping document");
                summary.failed.push((document.to_string(), e.to_string()));
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Parse and reconcile one document. With `files.write_ids`, lines that were
    /// assigned an id get an id token appended and the document is rewritten.
    pub fn sync_file(&mut self, relative_path: &str) -> Result<ReconcileReport> {
        let path = self.root.join(relative_path);
        let text = std::fs::read_to_string(&path)?;
        let batch = self.parser.parse_document(&text);
        let report = self.store.reconcile_file(relative_path, &batch)?;

        if self.config.files.write_ids && !report.assigned.is_empty() {
            let rewritten = write_ids(&text, &report.assigned);
            std::fs::write(&path, &rewritten)?;
            debug!(file = %relative_path, lines = report.assigned.len(), "Wrote id tokens");

            // The rewritten text now names every id; record it so the next pass is a no-op.
            let batch = self.parser.parse_document(&rewritten);
            self.store.reconcile_file(relative_path, &batch)?;
        }

        Ok(report)
    }

    /// Render one configured index document.
    pub fn render_index(&self, relative_path: &str) -> Option<String> {
        let spec = self.config.indexes.get(relative_path)?;
        Some(self.render_spec(relative_path, spec))
    }

    /// Render an ad-hoc index spec.
    pub fn render_spec(&self, relative_path: &str, spec: &IndexSpec) -> String {
        render_index(&materialize_index(relative_path, spec, &self.store))
    }

    /// Write every configured index document whose content changed. Returns how many were written.
    pub fn write_indexes(&self) -> Result<usize> {
        let mut written = 0;
        for (relative_path, spec) in &self.config.indexes {
            let content = self.render_spec(relative_path, spec);
            let path = self.root.join(relative_path);
            if std::fs::read_to_string(&path).is_ok_and(|existing| existing == content) {
                continue;
            }
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, content)?;
            debug!(index = %relative_path, "Wrote index document");
            written += 1;
        }
        Ok(written)
    }

    /// Persist the store snapshot.
    pub fn save(&self) -> Result<()> {
        let path = self.snapshot_path();
        Snapshot::from_store(&self.store)?.write_to(&path)?;
        debug!(path = %path.display(), "Saved snapshot");
        Ok(())
    }
}

fn resolve(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// Append id tokens to the given lines, keeping the document's line endings.
fn write_ids(text: &str, assigned: &[(usize, u64)]) -> String {
    let newline = if text.contains("\r\n") { "\r\n" } else { "\n" };
    let mut lines: Vec<String> = text.lines().map(str::to_string).collect();
    for &(line, id) in assigned {
        if let Some(source) = lines.get_mut(line) {
            *source = with_id_token(source, id);
        }
    }
    let mut out = lines.join(newline);
    if text.ends_with('\n') {
        out.push_str(newline);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_ids_preserves_endings() {
        let text = "# Todo\r\n- [ ] a\r\n- [ ] b\r\n";
        assert_eq!(
            write_ids(text, &[(1, 1), (2, 36)]),
            "# Todo\r\n- [ ] a ^1\r\n- [ ] b ^10\r\n"
        );
        assert_eq!(write_ids("- [ ] a", &[(0, 2)]), "- [ ] a ^2");
    }

    #[test]
    fn test_resolve() {
        let root = Path::new("/vault");
        assert_eq!(resolve(root, Path::new("taskmark/store.json")), PathBuf::from("/vault/taskmark/store.json"));
        assert_eq!(resolve(root, Path::new("/tmp/s.json")), PathBuf::from("/tmp/s.json"));
    }
}
