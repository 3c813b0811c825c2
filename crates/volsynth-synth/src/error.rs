use thiserror::Error;

/// Errors raised by a synthesis session.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SynthError {
    #[error("no cluster features to synthesize from")]
    EmptyVolume,

    #[error("candidate index {index} out of range (0..{count})")]
    InvalidCandidateIndex { index: usize, count: usize },
}

/// Errors raised by the synthesis service and its clients.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ServiceError {
    #[error("adaptation requested before any synthesis session exists")]
    NoActiveSession,

    #[error("malformed synthesis request: {0}")]
    MalformedRequest(String),

    #[error(transparent)]
    Synthesis(#[from] SynthError),

    #[error("synthesis transport failed: {0}")]
    Transport(String),
}
