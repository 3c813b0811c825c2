pub mod color;
pub mod config;
pub mod constants;
pub mod error;
pub mod math;
pub mod transfer;
pub mod types;

pub use color::hsv_to_rgba;
pub use error::ConfigError;
pub use transfer::{ControlPoint, Rgba8, TransferFunction};
pub use types::{Centroid, ClusterFeature, Dimensions, Sample, VolumeTexels};
