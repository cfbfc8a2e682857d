//! Vault watcher for watch mode.
//!
//! Watches the vault recursively and emits:
//! - document batches for tracked markdown files that changed or vanished
//! - config events for YAML files in the project directory
//!
//! Events are debounced, so one editor save produces a single batch. Index
//! documents and the snapshot are never reported, which keeps the vault's own
//! writes from feeding back into another sync.

use crate::config::{FilesConfig, PROJECT_DIR_NAME};
use notify_debouncer_mini::{DebouncedEvent, DebouncedEventKind, new_debouncer};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::{debug, error, info};

/// Event types emitted when vault files change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VaultEvent {
    /// Tracked documents changed, were created or were removed.
    Documents(Vec<PathBuf>),
    /// A YAML file in the project config directory changed.
    Config(PathBuf),
    /// Watcher encountered an error
    Error(String),
}

/// What the watcher reports, derived from the vault's config.
#[derive(Debug, Clone)]
pub struct WatchFilter {
    pub root: PathBuf,
    pub files: FilesConfig,
    /// Vault-relative index document paths.
    pub indexes: BTreeSet<String>,
    pub debounce: Duration,
}

impl WatchFilter {
    pub fn from_vault(vault: &super::Vault) -> Self {
        let config = vault.config();
        Self {
            root: vault.root().to_path_buf(),
            files: config.files.clone(),
            indexes: config.indexes.keys().cloned().collect(),
            debounce: Duration::from_millis(config.watch.debounce_ms),
        }
    }

    fn relative(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        (!parts.is_empty()).then(|| parts.join("/"))
    }

    /// Classify a changed path, or `None` if the watcher should ignore it.
    fn classify(&self, path: &Path) -> Option<Classified> {
        let rel = self.relative(path)?;

        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );
        if is_yaml && rel.starts_with(&format!("{}/", PROJECT_DIR_NAME)) {
            return Some(Classified::Config);
        }

        let tracked = self.files.is_document(path)
            && !self.files.is_ignored(&rel)
            && !self.indexes.contains(&rel);
        tracked.then_some(Classified::Document)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Classified {
    Document,
    Config,
}

/// Handle to a running watcher. Dropping it stops the watcher.
pub struct VaultWatcherHandle {
    pub events: UnboundedReceiver<VaultEvent>,
    _task_handle: tokio::task::JoinHandle<()>,
}

impl VaultWatcherHandle {
    /// Wait for the next event; `None` once the watcher has stopped.
    pub async fn next_event(&mut self) -> Option<VaultEvent> {
        self.events.recv().await
    }
}

/// Start watching a vault. Must be called from within a tokio runtime.
pub fn start_vault_watcher(filter: WatchFilter) -> Result<VaultWatcherHandle, notify::Error> {
    let (event_tx, event_rx) = unbounded_channel();
    let (notify_tx, notify_rx) = mpsc::channel();

    let mut debouncer = new_debouncer(filter.debounce, notify_tx)?;
    debouncer
        .watcher()
        .watch(&filter.root, notify::RecursiveMode::Recursive)?;
    info!("Watching vault: {}", filter.root.display());

    let task_handle = tokio::task::spawn_blocking(move || {
        // Keep the debouncer alive
        let _debouncer = debouncer;
        process_notify_events(notify_rx, event_tx, &filter);
    });

    Ok(VaultWatcherHandle {
        events: event_rx,
        _task_handle: task_handle,
    })
}

fn process_notify_events(
    rx: mpsc::Receiver<Result<Vec<DebouncedEvent>, notify::Error>>,
    tx: UnboundedSender<VaultEvent>,
    filter: &WatchFilter,
) {
    loop {
        match rx.recv() {
            Ok(Ok(events)) => {
                for event in classify_events(events, filter) {
                    debug!("Vault change detected: {:?}", event);
                    if tx.send(event).is_err() {
                        info!("Vault watcher receiver dropped, stopping");
                        return;
                    }
                }
            }
            Ok(Err(e)) => {
                error!("File watcher error: {}", e);
                if tx.send(VaultEvent::Error(e.to_string())).is_err() {
                    return;
                }
            }
            Err(_) => {
                info!("Vault watcher channel closed, stopping");
                return;
            }
        }
    }
}

/// Group a debounced batch into at most one config event per file and one document event.
fn classify_events(events: Vec<DebouncedEvent>, filter: &WatchFilter) -> Vec<VaultEvent> {
    let mut documents = BTreeSet::new();
    let mut configs = BTreeSet::new();

    for event in events {
        if !matches!(
            event.kind,
            DebouncedEventKind::Any | DebouncedEventKind::AnyContinuous
        ) {
            continue;
        }
        match filter.classify(&event.path) {
            Some(Classified::Document) => {
                documents.insert(event.path);
            }
            Some(Classified::Config) => {
                configs.insert(event.path);
            }
            None => {}
        }
    }

    let mut result: Vec<VaultEvent> = configs.into_iter().map(VaultEvent::Config).collect();
    if !documents.is_empty() {
        result.push(VaultEvent::Documents(documents.into_iter().collect()));
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> WatchFilter {
        WatchFilter {
            root: PathBuf::from("/vault"),
            files: FilesConfig::default(),
            indexes: ["Backlog.md".to_string()].into_iter().collect(),
            debounce: Duration::from_millis(10),
        }
    }

    fn event(path: &str) -> DebouncedEvent {
        DebouncedEvent {
            path: PathBuf::from(path),
            kind: DebouncedEventKind::Any,
        }
    }

    #[test]
    fn test_classify_document() {
        let f = filter();
        assert_eq!(f.classify(Path::new("/vault/notes/a.md")), Some(Classified::Document));
        assert_eq!(f.classify(Path::new("/vault/notes/a.txt")), None);
        assert_eq!(f.classify(Path::new("/elsewhere/a.md")), None);
    }

    #[test]
    fn test_index_and_ignored_paths_skipped() {
        let f = filter();
        assert_eq!(f.classify(Path::new("/vault/Backlog.md")), None);
        assert_eq!(f.classify(Path::new("/vault/.obsidian/a.md")), None);
        assert_eq!(f.classify(Path::new("/vault/taskmark/store.json")), None);
    }

    #[test]
    fn test_classify_config() {
        let f = filter();
        assert_eq!(
            f.classify(Path::new("/vault/taskmark/config.yaml")),
            Some(Classified::Config)
        );
        assert_eq!(f.classify(Path::new("/vault/notes/config.yaml")), None);
    }

    #[test]
    fn test_classify_events_batches_documents() {
        let events = vec![
            event("/vault/b.md"),
            event("/vault/a.md"),
            event("/vault/a.md"),
            event("/vault/taskmark/config.yaml"),
            event("/vault/Backlog.md"),
        ];
        let result = classify_events(events, &filter());
        assert_eq!(
            result,
            vec![
                VaultEvent::Config(PathBuf::from("/vault/taskmark/config.yaml")),
                VaultEvent::Documents(vec![PathBuf::from("/vault/a.md"), PathBuf::from("/vault/b.md")]),
            ]
        );
    }
}
