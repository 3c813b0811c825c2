use thiserror::Error;
use volsynth_synth::ServiceError;
use volsynth_volume::VolumeError;

/// Ramp interpolation failures. A rejected ramp is never uploaded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RampError {
    #[error("control point {index} at position {position} does not follow position {previous}")]
    MalformedRamp {
        index: usize,
        position: u8,
        previous: u8,
    },

    #[error("transfer function has no control points")]
    Empty,
}

/// Render target and pipeline errors.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("GPU context of '{0}' lost; awaiting restore")]
    ContextLostRecoverable(String),

    #[error("GPU context of '{0}' lost and not restorable; renderer unavailable")]
    ContextLostFatal(String),

    #[error("no GPU context available: {0}")]
    ContextUnavailable(String),

    #[error("render target '{0}' has been destroyed")]
    Destroyed(String),

    #[error("GPU error: {0}")]
    Gpu(String),

    #[error("preview index {index} out of range (0..{count})")]
    InvalidCandidateIndex { index: usize, count: usize },

    #[error("expected {expected} candidate transfer functions, got {actual}")]
    CandidateCount { expected: usize, actual: usize },

    #[error(transparent)]
    Ramp(#[from] RampError),

    #[error(transparent)]
    Volume(#[from] VolumeError),

    #[error(transparent)]
    Synthesis(#[from] ServiceError),
}
