/// Errors that can occur while reading a volume or extracting its features.
#[derive(Debug, thiserror::Error)]
pub enum VolumeError {
    #[error("volume has no samples to bin")]
    EmptyVolume,

    #[error("volume metadata has not been read")]
    NoMetadata,

    #[error("modality '{0}' does not exist")]
    UnknownModality(String),

    #[error("block {0} does not exist")]
    MissingBlock(usize),

    #[error("block {index}: expected {expected} bytes, got {actual}")]
    BlockSizeMismatch {
        index: usize,
        expected: usize,
        actual: usize,
    },

    #[error("block {index} at {position:?} exceeds the modality bounds")]
    PlacementOutOfBounds { index: usize, position: [u32; 3] },

    #[error("volume reader failed: {0}")]
    Reader(String),
}
