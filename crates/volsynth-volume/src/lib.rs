pub mod error;
pub mod features;
pub mod load;
pub mod reader;

pub use error::VolumeError;
pub use features::{extract_features, Binning, FeatureExtractor};
pub use load::{load_modality, LoadEvent, LoadedVolume};
pub use reader::{Block, MemoryReader, Modality, Placement, SampleFormat, VolumeMetadata, VolumeReader};
