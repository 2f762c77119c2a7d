//! Engine configuration.
//!
//! Every field has a default, so a partial JSON object (or none at all) is a
//! valid configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::PageConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    #[serde(default)]
    pub page: PageConfig,

    /// Upper bound on layout passes per relayout.
    #[serde(default = "default_max_passes")]
    pub max_passes: usize,

    /// After this many passes a footnote is never moved back to an
    /// earlier page.
    #[serde(default = "default_hysteresis_after")]
    pub hysteresis_after: usize,

    /// Quiet period before an edit is saved.
    #[serde(default = "default_autosave_delay_ms")]
    pub autosave_delay_ms: u64,

    /// Maximum number of records kept in the recycling bin; 0 is unbounded.
    #[serde(default = "default_recycle_bin_cap")]
    pub recycle_bin_cap: usize,
}

fn default_max_passes() -> usize {
    5
}

fn default_hysteresis_after() -> usize {
    2
}

fn default_autosave_delay_ms() -> u64 {
    1500
}

fn default_recycle_bin_cap() -> usize {
    64
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            page: PageConfig::default(),
            max_passes: default_max_passes(),
            hysteresis_after: default_hysteresis_after(),
            autosave_delay_ms: default_autosave_delay_ms(),
            recycle_bin_cap: default_recycle_bin_cap(),
        }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn autosave_delay(&self) -> Duration {
        Duration::from_millis(self.autosave_delay_ms)
    }
}
