//! Shared constants for synthesis, ramps and rendering.

/// Number of candidate transfer functions kept per synthesis session.
/// Also the number of preview render targets.
pub const CANDIDATE_COUNT: usize = 8;

/// Number of entries in a transfer-function ramp (one per 8-bit value).
pub const RAMP_SIZE: usize = 256;

/// Bytes per ramp entry (RGBA8).
pub const RAMP_CHANNELS: usize = 4;

/// Total byte length of a ramp texture: 256 × RGBA.
pub const RAMP_BYTES: usize = RAMP_SIZE * RAMP_CHANNELS;

/// Largest value on the transfer-function axis.
pub const MAX_VALUE: f64 = 255.0;

/// Multiplicative decay applied to the adaptation magnitudes after every round.
pub const ADAPTATION_DECAY: f64 = 0.8;

/// Initial saturation-seed jitter magnitude.
pub const INITIAL_ADAPT_S: f64 = 30.0;

/// Initial value-seed jitter magnitude.
pub const INITIAL_ADAPT_V: f64 = 4.0;

/// Initial hue jitter magnitude.
pub const INITIAL_ADAPT_H: f64 = 2.0 / 3.0;

/// Base saturation seed for initial generation.
pub const START_SATURATION: f64 = 10.0;

/// Saturation seeds are clamped to [0, SATURATION_RANGE].
pub const SATURATION_RANGE: f64 = 100.0;

/// Base value seed for initial generation.
pub const START_VALUE: f64 = 0.0;

/// Value seeds are clamped to [0, VALUE_RANGE].
pub const VALUE_RANGE: f64 = 10.0;

/// Exponent of the power scale mapping distance-to-center onto value.
pub const VALUE_EXPONENT: f64 = 3.0;

/// Default edge length of the primary view in pixels.
pub const DEFAULT_RESOLUTION: u32 = 512;

/// Preview views render at this fraction of the primary resolution.
pub const PREVIEW_SCALE: f32 = 0.25;
