use std::path::Path;

use mission_common::{CoreError, CoreResult, Extent, Setup};
use mission_timeline::TimelineConfig;
use serde::{Deserialize, Serialize};

/// Defaults used when sessions and scenarios are created.
///
/// Every field has a default, so a config file only needs the keys it
/// overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Root extent of every new scenario's environment.
    pub extent: Extent,
    /// Per-axis split factor used when a presenter refines without choosing.
    pub refine_factor: u32,
    pub timeline: TimelineConfig,
    pub setup: Setup,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            extent: Extent::default(),
            refine_factor: 2,
            timeline: TimelineConfig::default(),
            setup: Setup::default(),
        }
    }
}

impl PlannerConfig {
    /// Load a config from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> CoreResult<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|source| CoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_reader(std::io::BufReader::new(file))
            .map_err(|e| CoreError::Validation(format!("{}: {e}", path.display())))?;
        tracing::debug!(path = %path.display(), "loaded planner config");
        Ok(config)
    }

    /// Parse a config from a JSON string.
    pub fn from_json(json: &str) -> CoreResult<Self> {
        serde_json::from_str(json).map_err(|e| CoreError::Validation(e.to_string()))
    }
}
