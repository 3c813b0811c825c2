use serde::{Deserialize, Serialize};
use volsynth_core::constants::{
    ADAPTATION_DECAY, SATURATION_RANGE, START_SATURATION, START_VALUE, VALUE_EXPONENT,
    VALUE_RANGE,
};

use crate::session::AdaptationRates;

/// Tunables of a synthesis session, loadable from RON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// Multiplicative decay of the adaptation magnitudes per round.
    pub decay: f64,
    /// Adaptation magnitudes at the start of every session.
    pub initial_rates: AdaptationRates,
    /// Base saturation seed for initial generation.
    pub start_saturation: f64,
    /// Saturation seeds clamp to [0, saturation_range].
    pub saturation_range: f64,
    /// Base value seed for initial generation.
    pub start_value: f64,
    /// Value seeds clamp to [0, value_range].
    pub value_range: f64,
    /// Exponent of the distance → value power scale.
    pub value_exponent: f64,
    /// Fixed RNG seed. `None` seeds from OS entropy. A service offsets it by
    /// the number of sessions already started, so the n-th session (counting
    /// from zero) uses `seed + n` and a restarted service replays the same
    /// sequence of sessions.
    pub seed: Option<u64>,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            decay: ADAPTATION_DECAY,
            initial_rates: AdaptationRates::default(),
            start_saturation: START_SATURATION,
            saturation_range: SATURATION_RANGE,
            start_value: START_VALUE,
            value_range: VALUE_RANGE,
            value_exponent: VALUE_EXPONENT,
            seed: None,
        }
    }
}

impl SynthesisConfig {
    pub fn from_ron_str(ron_str: &str) -> Result<Self, volsynth_core::ConfigError> {
        volsynth_core::config::from_ron_str(ron_str)
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}
