//! Layered config loading.
//!
//! Each tier that has a `config.yaml` is deep-merged over the ones below it,
//! then `TASKMARK_*` variables are applied on top.

use super::merge::deep_merge_all;
use super::types::{Config, PROJECT_DIR_NAME};
use anyhow::{Context, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Where a piece of configuration came from, in increasing priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConfigTier {
    /// Built-in defaults
    Defaults = 0,
    /// Vault-level config (`<vault>/taskmark/config.yaml`)
    Project = 1,
    /// User-level config (`~/.taskmark/config.yaml`)
    User = 2,
    /// `TASKMARK_*` variables
    Environment = 3,
}

impl std::fmt::Display for ConfigTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigTier::Defaults => write!(f, "defaults"),
            ConfigTier::Project => write!(f, "project"),
            ConfigTier::User => write!(f, "user"),
            ConfigTier::Environment => write!(f, "environment"),
        }
    }
}

/// Directories searched for `config.yaml`.
#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub project_dir: Option<PathBuf>,
    pub user_dir: Option<PathBuf>,
}

impl ConfigPaths {
    /// Discover paths for a vault: `TASKMARK_USER_DIR` or `~/.taskmark` for the user tier.
    pub fn discover(vault_root: &Path) -> Self {
        let user_dir = std::env::var("TASKMARK_USER_DIR")
            .ok()
            .map(PathBuf::from)
            .or_else(|| dirs::home_dir().map(|h| h.join(".taskmark")));

        Self {
            project_dir: Some(vault_root.join(PROJECT_DIR_NAME)),
            user_dir,
        }
    }

    pub fn with_dirs(project_dir: Option<PathBuf>, user_dir: Option<PathBuf>) -> Self {
        Self {
            project_dir,
            user_dir,
        }
    }
}

/// Merged configuration plus where it was found.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    pub paths: ConfigPaths,
    config: Config,
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Load configuration for a vault from all tiers.
    pub fn load(vault_root: &Path) -> Result<Self> {
        Self::load_with_paths(ConfigPaths::discover(vault_root))
    }

    /// Load from explicit tier directories. `TASKMARK_CONFIG_PATH` bypasses the tiers.
    pub fn load_with_paths(paths: ConfigPaths) -> Result<Self> {
        if let Ok(explicit_path) = std::env::var("TASKMARK_CONFIG_PATH") {
            let path = PathBuf::from(&explicit_path);
            let mut config = Config::load(&path)
                .with_context(|| format!("loading config from {}", path.display()))?;
            Self::apply_env_overrides(&mut config);
            return Ok(Self {
                paths,
                config,
                config_path: Some(path),
            });
        }

        let mut configs: Vec<Value> = vec![serde_json::to_value(Config::default())?];
        let mut config_path = None;

        for (tier, dir) in [
            (ConfigTier::Project, paths.project_dir.as_deref()),
            (ConfigTier::User, paths.user_dir.as_deref()),
        ] {
            let Some(dir) = dir else { continue };
            let file = dir.join("config.yaml");
            if let Some(value) = read_yaml_tier(&file, tier) {
                configs.push(value);
                config_path = Some(file);
            }
        }

        let merged = deep_merge_all(configs);
        let mut config: Config = serde_json::from_value(merged).context("merged config is invalid")?;

        Self::apply_env_overrides(&mut config);

        Ok(Self {
            paths,
            config,
            config_path,
        })
    }

    fn apply_env_overrides(config: &mut Config) {
        if let Ok(min_id) = std::env::var("TASKMARK_MIN_ID") {
            match min_id.parse() {
                Ok(min_id) => config.tasks.min_id = min_id,
                Err(_) => warn!(value = %min_id, "Ignoring invalid TASKMARK_MIN_ID"),
            }
        }

        if let Ok(path) = std::env::var("TASKMARK_SNAPSHOT_PATH") {
            config.store.snapshot_path = PathBuf::from(path);
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn into_config(self) -> Config {
        self.config
    }

    /// Highest-priority file that contributed, if any.
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }
}

/// Read one tier's YAML file. Unreadable or invalid files are skipped with a warning.
fn read_yaml_tier(file: &Path, tier: ConfigTier) -> Option<Value> {
    if !file.exists() {
        return None;
    }
    let content = match std::fs::read_to_string(file) {
        Ok(content) => content,
        Err(e) => {
            warn!(%tier, path = %file.display(), error = %e, "Cannot read config file");
            return None;
        }
    };
    match serde_yaml::from_str::<Value>(&content) {
        Ok(value) => {
            debug!(%tier, path = %file.display(), "Loaded config tier");
            Some(value)
        }
        Err(e) => {
            warn!(%tier, path = %file.display(), error = %e, "Invalid config file");
            None
        }
    }
}
