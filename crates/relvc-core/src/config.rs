//! Engine configuration.
//!
//! Settings arrive from the embedding application as an opaque structure;
//! the engine never reads files or environment variables itself.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::errors::Result;

/// Default number of commits between stored full snapshots.
pub const DEFAULT_CHECKPOINT_INTERVAL: u64 = 10;

/// Engine settings supplied by the embedding application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Commits between full-snapshot checkpoints along a lineage.
    ///
    /// Bounds diff-replay length during checkout; larger values trade
    /// checkout cost for storage.
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval: u64,

    /// Root directory for the filesystem object store, when one is used.
    #[serde(default)]
    pub storage_root: Option<PathBuf>,
}

fn default_checkpoint_interval() -> u64 {
    DEFAULT_CHECKPOINT_INTERVAL
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            storage_root: None,
        }
    }
}

impl Settings {
    /// Parse settings from a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
