use serde::{Deserialize, Serialize};
use volsynth_core::constants::{CANDIDATE_COUNT, DEFAULT_RESOLUTION, PREVIEW_SCALE};
use volsynth_core::ConfigError;

use crate::transform::Filter;

/// Rendering pipeline settings, loadable from RON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Edge length of the primary view in pixels.
    pub resolution: u32,
    /// Previews render at `ceil(resolution * preview_scale)`.
    pub preview_scale: f32,
    /// Number of preview targets. Always equals the candidate count.
    pub preview_count: usize,
    /// Whether a lost context is acknowledged and awaited rather than fatal.
    pub restorable: bool,
    pub filter: Filter,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            resolution: DEFAULT_RESOLUTION,
            preview_scale: PREVIEW_SCALE,
            preview_count: CANDIDATE_COUNT,
            restorable: true,
            filter: Filter::Linear,
        }
    }
}

impl PipelineConfig {
    pub fn from_ron_str(ron_str: &str) -> Result<Self, ConfigError> {
        let mut config: Self = volsynth_core::config::from_ron_str(ron_str)?;
        config.preview_count = CANDIDATE_COUNT;
        Ok(config)
    }

    pub fn preview_resolution(&self) -> u32 {
        preview_resolution(self.resolution, self.preview_scale)
    }
}

/// Scaled edge length, rounded up and never zero.
pub fn preview_resolution(resolution: u32, scale: f32) -> u32 {
    ((resolution as f32 * scale).ceil() as u32).max(1)
}
