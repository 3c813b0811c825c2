//! Dense 256-entry RGBA lookup ramps built from sparse transfer functions.

use volsynth_core::constants::{RAMP_BYTES, RAMP_CHANNELS, RAMP_SIZE};
use volsynth_core::{Rgba8, TransferFunction};

use crate::error::RampError;

/// A 256×4-byte RGBA ramp, or an empty ramp meaning "no transfer function".
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Ramp {
    bytes: Vec<u8>,
}

impl Ramp {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Color at value index `i`, if the ramp is populated.
    pub fn color_at(&self, i: u8) -> Option<Rgba8> {
        let start = i as usize * RAMP_CHANNELS;
        let texel = self.bytes.get(start..start + RAMP_CHANNELS)?;
        Some(Rgba8::new(texel[0], texel[1], texel[2], texel[3]))
    }
}

/// Expand `tf` into a ramp by piecewise-linear interpolation between control
/// points. Positions must be strictly increasing; zero points give an empty
/// ramp.
pub fn interpolate(tf: &TransferFunction) -> Result<Ramp, RampError> {
    let (Some(first), Some(last)) = (tf.points.first(), tf.points.last()) else {
        return Ok(Ramp::empty());
    };
    if let Some(index) = tf.first_unordered() {
        return Err(RampError::MalformedRamp {
            index,
            position: tf.points[index].position,
            previous: tf.points[index - 1].position,
        });
    }

    let mut bytes = Vec::with_capacity(RAMP_BYTES);
    for _ in 0..first.position {
        bytes.extend_from_slice(&first.color.to_array());
    }

    for pair in tf.points.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        let span = (b.position - a.position) as f32;
        let (ca, cb) = (a.color.to_array(), b.color.to_array());
        for i in a.position..b.position {
            let f = (i - a.position) as f32 / span;
            for ch in 0..RAMP_CHANNELS {
                let v = ca[ch] as f32 + (cb[ch] as f32 - ca[ch] as f32) * f;
                bytes.push(v.round().clamp(0.0, 255.0) as u8);
            }
        }
    }

    for _ in last.position as usize..RAMP_SIZE {
        bytes.extend_from_slice(&last.color.to_array());
    }

    debug_assert_eq!(bytes.len(), RAMP_BYTES);
    Ok(Ramp { bytes })
}

/// Collapse duplicate positions (first point wins) and interpolate.
pub fn prepare_ramp(tf: &TransferFunction) -> Result<Ramp, RampError> {
    interpolate(&tf.dedup_positions())
}
