//! taskmark CLI
//!
//! Reconciles markdown checklist lines across a vault with a task store,
//! writes index documents and keeps them current in watch mode.

use anyhow::{Context, Result, bail};
use clap::Parser;
use std::io::Write;
use std::path::Path;
use taskmark::cli::diff::{DiffArgs, DiffFormat};
use taskmark::cli::export::ExportArgs;
use taskmark::cli::{Cli, Command, IndexArgs, ShowArgs};
use taskmark::config::{Config, ConfigLoader};
use taskmark::export::Snapshot;
use taskmark::export::diff::{diff_snapshot_vs_store, diff_snapshots_with};
use taskmark::index::IndexSpec;
use taskmark::index::query::Query;
use taskmark::logging;
use taskmark::render::render_front_matter;
use taskmark::vault::watcher::{VaultEvent, WatchFilter, start_vault_watcher};
use taskmark::vault::{SyncSummary, Vault};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log, cli.verbose)?;

    // If explicit config path given, set it as env var for ConfigLoader to pick up
    // SAFETY: This is safe at program startup before any other threads are spawned
    if let Some(config_path) = &cli.config {
        unsafe {
            std::env::set_var("TASKMARK_CONFIG_PATH", config_path);
        }
    }

    let root = match cli.vault {
        Some(root) => root,
        None => std::env::current_dir()?,
    };
    let root = root
        .canonicalize()
        .with_context(|| format!("vault not found: {}", root.display()))?;
    let config = load_config(&root)?;

    match cli.command {
        Some(Command::Sync) | None => {
            let mut vault = Vault::open(&root, config)?;
            let summary = vault.sync()?;
            print_summary(&summary);
        }
        Some(Command::Index(args)) => run_index(&root, config, args)?,
        Some(Command::Show(args)) => run_show(&root, config, args)?,
        Some(Command::Export(args)) => run_export(&root, config, args)?,
        Some(Command::Diff(args)) => run_diff(&root, config, args)?,
        Some(Command::Watch) => run_watch(&root, config).await?,
    }

    Ok(())
}

fn load_config(root: &Path) -> Result<Config> {
    let loader = ConfigLoader::load(root)?;
    if let Some(path) = loader.config_path() {
        info!(path = %path.display(), "Loaded config");
    }
    Ok(loader.into_config())
}

fn print_summary(summary: &SyncSummary) {
    println!(
        "{} documents, {} reconciled, {} tasks created, {} files removed, {} indexes written",
        summary.documents,
        summary.reconciled,
        summary.created_tasks,
        summary.removed_files,
        summary.indexes_written
    );
    for (file, reason) in &summary.failed {
        println!("  skipped {}: {}", file, reason);
    }
}

fn run_index(root: &Path, config: Config, args: IndexArgs) -> Result<()> {
    let vault = Vault::open(root, config)?;
    let rendered = match args.query {
        Some(json) => {
            let query = Query::from_json(&json)?;
            let sort = vault
                .config()
                .indexes
                .get(&args.file)
                .map(|spec| spec.sort.clone())
                .unwrap_or_default();
            vault.render_spec(&args.file, &IndexSpec::new(query, sort))
        }
        None => match vault.render_index(&args.file) {
            Some(rendered) => rendered,
            None => bail!("No index configured for {}", args.file),
        },
    };
    print!("{}", rendered);
    Ok(())
}

fn run_show(root: &Path, config: Config, args: ShowArgs) -> Result<()> {
    let vault = Vault::open(root, config)?;
    let Some(id) = args.task_id() else {
        bail!("Invalid task id: {} (use 42 or ^a1)", args.id);
    };
    let task = vault
        .store()
        .get_task(id)
        .with_context(|| format!("Task not found: {}", args.id))?;
    print!("{}", render_front_matter(task)?);
    for instance in vault.store().instances_of(id) {
        println!("{}", instance.key());
    }
    Ok(())
}

fn run_export(root: &Path, config: Config, args: ExportArgs) -> Result<()> {
    let mut vault = Vault::open(root, config)?;
    if args.sync {
        vault.sync()?;
    }
    let snapshot = Snapshot::from_store(vault.store())?;

    match args.output_path() {
        Some(path) => {
            snapshot.write_to(&path)?;
            eprintln!(
                "Exported {} tasks and {} instances to {}",
                vault.store().task_count(),
                vault.store().instance_count(),
                path.display()
            );
        }
        None => {
            if args.gzip {
                bail!("--gzip requires --output");
            }
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(snapshot.to_json_pretty()?.as_bytes())?;
            stdout.write_all(b"\n")?;
        }
    }
    Ok(())
}

fn run_diff(root: &Path, config: Config, args: DiffArgs) -> Result<()> {
    let source = Snapshot::from_file(&args.source)
        .with_context(|| format!("reading {}", args.source.display()))?;
    let options = args.options();

    let diff = if let Some(ref target_path) = args.target {
        let target = Snapshot::from_file(target_path)
            .with_context(|| format!("reading {}", target_path.display()))?;
        diff_snapshots_with(&source, &target, &options)
            .with_labels(args.source.display().to_string(), target_path.display().to_string())
    } else {
        let vault = Vault::open(root, config)?;
        diff_snapshot_vs_store(&source, vault.store(), &options)?
            .with_labels(args.source.display().to_string(), "store")
    };

    match args.format {
        DiffFormat::Text => print!("{}", diff),
        DiffFormat::Json => println!("{}", serde_json::to_string_pretty(&diff)?),
        DiffFormat::Summary if diff.is_empty() => println!("No differences found."),
        DiffFormat::Summary => {
            for (table, added, removed, changed) in diff.summary() {
                println!("{}: +{} -{} ~{}", table, added, removed, changed);
            }
        }
    }

    Ok(())
}

async fn run_watch(root: &Path, config: Config) -> Result<()> {
    let mut vault = Vault::open(root, config)?;
    print_summary(&vault.sync()?);

    loop {
        let mut handle = start_vault_watcher(WatchFilter::from_vault(&vault))?;

        let reload = loop {
            tokio::select! {
                event = handle.next_event() => match event {
                    Some(VaultEvent::Documents(paths)) => {
                        let summary = vault.sync_paths(&paths)?;
                        info!(
                            reconciled = summary.reconciled,
                            removed_files = summary.removed_files,
                            indexes = summary.indexes_written,
                            "Documents changed"
                        );
                    }
                    Some(VaultEvent::Config(path)) => break Some(path),
                    Some(VaultEvent::Error(e)) => warn!(error = %e, "Watcher error"),
                    None => break None,
                },
                _ = tokio::signal::ctrl_c() => {
                    info!("Stopping watch");
                    vault.save()?;
                    return Ok(());
                }
            }
        };

        let Some(path) = reload else {
            bail!("Vault watcher stopped unexpectedly");
        };
        drop(handle);
        vault = reload_vault(vault, root, &path)?;
    }
}

/// Save the store and reopen the vault with freshly loaded config.
/// An invalid config keeps the running vault.
fn reload_vault(vault: Vault, root: &Path, changed: &Path) -> Result<Vault> {
    info!(path = %changed.display(), "Config changed, reloading");
    vault.save()?;
    let config = match load_config(root) {
        Ok(config) => config,
        Err(e) => {
            warn!(error = %e, "Keeping previous config");
            return Ok(vault);
        }
    };
    let mut vault = Vault::open(root, config)?;
    print_summary(&vault.sync()?);
    Ok(vault)
}
