use crate::CoreError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Engine tuning knobs, loadable from a JSON file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineConfig {
    /// Delta records retained per (item, lens type), newest first.
    #[serde(default = "default_delta_retention")]
    pub delta_retention: usize,
    /// Default age window for prune requests that omit `days`.
    #[serde(default = "default_prune_days")]
    pub prune_days: i64,
    /// Upper bound on viewport batch size.
    #[serde(default = "default_max_batch")]
    pub max_batch: usize,
}

fn default_delta_retention() -> usize {
    10
}

fn default_prune_days() -> i64 {
    30
}

fn default_max_batch() -> usize {
    100
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            delta_retention: default_delta_retention(),
            prune_days: default_prune_days(),
            max_batch: default_max_batch(),
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(CoreError::Serialization)
    }

    pub fn save(&self, path: &Path) -> Result<(), CoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
