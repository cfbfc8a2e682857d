//! Unified configuration system.
//!
//! Consolidates configuration from three tiers with field-by-field YAML merging:
//! 1. **Defaults** - Built into the binary
//! 2. **Project** - `<vault>/taskmark/config.yaml`
//! 3. **User** - `~/.taskmark/config.yaml` and environment variables
//!
//! ## Environment Variables
//! - `TASKMARK_CONFIG_PATH` - Explicit config file (overrides all)
//! - `TASKMARK_USER_DIR` - User config dir (default: `~/.taskmark`)
//! - `TASKMARK_MIN_ID` - Lowest id handed to new tasks
//! - `TASKMARK_SNAPSHOT_PATH` - Store snapshot path

mod loader;
mod merge;
mod types;

pub use loader::{ConfigLoader, ConfigPaths, ConfigTier};
pub use merge::deep_merge;
pub use types::*;
