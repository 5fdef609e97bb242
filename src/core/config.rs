#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::approximator::ApproximatorConfig;
use crate::population::PopulationConfig;

/// Number of evaluation points an ensemble draws when none is configured.
pub const DEFAULT_EVAL_POINT_COUNT: usize = 500;

/// Everything needed to build a LIF ensemble.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct NefConfig {
    pub population: PopulationConfig,
    pub approximator: ApproximatorConfig,
    pub eval_point_count: usize,
}

impl Default for NefConfig {
    fn default() -> Self {
        Self {
            population: PopulationConfig::default(),
            approximator: ApproximatorConfig::default(),
            eval_point_count: DEFAULT_EVAL_POINT_COUNT,
        }
    }
}

#[cfg(feature = "serde")]
impl NefConfig {
    /// Parses a JSON document; omitted fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
