//! Pipeline configuration
//!
//! Policy knobs that are not part of the competition settings. Every field has
//! a default so a partial JSON document is a valid configuration.

use crate::interpolator::MAX_INTERPOLATION_GAP_MINUTES;
use serde::{Deserialize, Serialize};

/// Lower bound of a physiologically plausible BPM, used for diagnostics only
pub const PLAUSIBLE_BPM_MIN: i64 = 20;
/// Upper bound of a physiologically plausible BPM, used for diagnostics only
pub const PLAUSIBLE_BPM_MAX: i64 = 250;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Longest heart-rate gap bridged by interpolation
    pub max_interpolation_gap_minutes: i64,
    /// Discard buckets older than the user's latest persisted bucket before
    /// reconciling
    pub watermark_prefilter: bool,
    pub plausible_bpm_min: i64,
    pub plausible_bpm_max: i64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_interpolation_gap_minutes: MAX_INTERPOLATION_GAP_MINUTES,
            watermark_prefilter: false,
            plausible_bpm_min: PLAUSIBLE_BPM_MIN,
            plausible_bpm_max: PLAUSIBLE_BPM_MAX,
        }
    }
}

impl PipelineConfig {
    pub fn with_max_gap(mut self, minutes: i64) -> Self {
        self.max_interpolation_gap_minutes = minutes;
        self
    }

    pub fn with_watermark_prefilter(mut self, enabled: bool) -> Self {
        self.watermark_prefilter = enabled;
        self
    }

    pub fn is_plausible_bpm(&self, bpm: i64) -> bool {
        (self.plausible_bpm_min..=self.plausible_bpm_max).contains(&bpm)
    }

    /// Load configuration from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize configuration to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
