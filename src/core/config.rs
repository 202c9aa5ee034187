//! Workspace configuration loaded from `.failsafe/config.toml`.
//!
//! Every field has a default so a workspace without a config file behaves
//! exactly like one with an empty file.

use crate::core::error::FailsafeError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const CONFIG_DIR: &str = ".failsafe";
pub const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FailsafeConfig {
    pub checkpoint: CheckpointConfig,
    pub manifold: ManifoldConfig,
    pub ledger: LedgerConfig,
    pub rag: RagConfig,
    pub revert: RevertConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CheckpointConfig {
    pub dir: String,
    pub latest_file: String,
    pub archive_dir: String,
    pub max_archive_depth: usize,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            dir: ".agent/checkpoints".to_string(),
            latest_file: "latest.yaml".to_string(),
            archive_dir: ".agent/checkpoints/archive".to_string(),
            max_archive_depth: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ManifoldConfig {
    /// Root folders, relative to the workspace, that get a manifold entry.
    pub tracked_folders: Vec<String>,
    /// Directory or file names skipped at any depth (build output, dependency caches).
    pub ignored_names: Vec<String>,
}

impl Default for ManifoldConfig {
    fn default() -> Self {
        Self {
            tracked_folders: ["src", "docs", ".agent", "FailSafe"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            ignored_names: ["node_modules", "out", "dist", "target"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LedgerConfig {
    pub path: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: ".failsafe/ledger.jsonl".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagConfig {
    pub db_path: String,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            db_path: ".failsafe/rag.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RevertConfig {
    pub emergency_log: String,
}

impl Default for RevertConfig {
    fn default() -> Self {
        Self {
            emergency_log: ".failsafe/revert-emergency.log".to_string(),
        }
    }
}

/// Load config from `<workspace>/.failsafe/config.toml`.
/// No config file = defaults (not an error); a file that fails to parse is.
pub fn load_config(workspace_root: &Path) -> Result<FailsafeConfig, FailsafeError> {
    let config_path = workspace_root.join(CONFIG_DIR).join(CONFIG_FILE);
    if !config_path.exists() {
        return Ok(FailsafeConfig::default());
    }

    let content = fs::read_to_string(&config_path).map_err(FailsafeError::IoError)?;
    toml::from_str(&content).map_err(|e| {
        FailsafeError::ConfigError(format!("{}: {}", config_path.display(), e))
    })
}
