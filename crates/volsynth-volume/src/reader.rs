//! Boundary to the external volume-reader capability.
//!
//! File/URL readers and their block formats live outside this crate; they only
//! need to produce [`VolumeMetadata`] and raw block bytes.

use glam::UVec3;
use serde::{Deserialize, Serialize};
use volsynth_core::Dimensions;

use crate::error::VolumeError;

/// Storage type of one sample in a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleFormat {
    U8,
    /// Little-endian.
    U16,
    /// Little-endian, expected in [0, 1].
    F32,
}

impl SampleFormat {
    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::U8 => 1,
            SampleFormat::U16 => 2,
            SampleFormat::F32 => 4,
        }
    }

    /// Decode the sample at the start of `bytes` onto the 0–255 value axis.
    /// `None` if `bytes` is shorter than one sample.
    pub fn decode(self, bytes: &[u8]) -> Option<f64> {
        let value = match self {
            SampleFormat::U8 => *bytes.first()? as f64,
            SampleFormat::U16 => u16::from_le_bytes(bytes.get(..2)?.try_into().ok()?) as f64 / 257.0,
            SampleFormat::F32 => {
                let raw = f32::from_le_bytes(bytes.get(..4)?.try_into().ok()?) as f64;
                if raw.is_finite() {
                    raw.clamp(0.0, 1.0) * 255.0
                } else {
                    raw
                }
            }
        };
        Some(value)
    }
}

/// A sub-volume block stored by the reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub dimensions: Dimensions,
}

/// Where a block lands inside a modality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    /// Index into [`VolumeMetadata::blocks`].
    pub index: usize,
    pub position: UVec3,
}

/// One named channel of volumetric data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Modality {
    pub name: String,
    pub dimensions: Dimensions,
    pub format: SampleFormat,
    pub placements: Vec<Placement>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VolumeMetadata {
    pub modalities: Vec<Modality>,
    pub blocks: Vec<Block>,
}

impl VolumeMetadata {
    pub fn modality(&self, name: &str) -> Option<&Modality> {
        self.modalities.iter().find(|m| m.name == name)
    }
}

/// External volume-reader capability.
pub trait VolumeReader {
    fn read_metadata(&mut self) -> Result<VolumeMetadata, VolumeError>;
    fn read_block(&mut self, index: usize) -> Result<Vec<u8>, VolumeError>;
}

/// Reader over blocks already held in memory.
#[derive(Debug, Clone)]
pub struct MemoryReader {
    metadata: VolumeMetadata,
    blocks: Vec<Vec<u8>>,
}

impl MemoryReader {
    pub fn new(metadata: VolumeMetadata, blocks: Vec<Vec<u8>>) -> Self {
        Self { metadata, blocks }
    }

    /// Split a dense 8-bit volume into z-slabs of at most `slab_depth` slices,
    /// exposed as a single modality named `name`.
    pub fn from_u8_volume(name: &str, dimensions: Dimensions, data: &[u8], slab_depth: u32) -> Self {
        let slab_depth = slab_depth.max(1);
        let slice_len = dimensions.width as usize * dimensions.height as usize;
        let mut blocks = Vec::new();
        let mut block_meta = Vec::new();
        let mut placements = Vec::new();

        let mut z = 0;
        while z < dimensions.depth {
            let depth = slab_depth.min(dimensions.depth - z);
            let start = z as usize * slice_len;
            let end = (start + depth as usize * slice_len).min(data.len());
            placements.push(Placement {
                index: blocks.len(),
                position: UVec3::new(0, 0, z),
            });
            block_meta.push(Block {
                dimensions: Dimensions::new(dimensions.width, dimensions.height, depth),
            });
            blocks.push(data.get(start..end).unwrap_or_default().to_vec());
            z += depth;
        }

        let metadata = VolumeMetadata {
            modalities: vec![Modality {
                name: name.to_string(),
                dimensions,
                format: SampleFormat::U8,
                placements,
            }],
            blocks: block_meta,
        };
        Self::new(metadata, blocks)
    }
}

impl VolumeReader for MemoryReader {
    fn read_metadata(&mut self) -> Result<VolumeMetadata, VolumeError> {
        Ok(self.metadata.clone())
    }

    fn read_block(&mut self, index: usize) -> Result<Vec<u8>, VolumeError> {
        self.blocks
            .get(index)
            .cloned()
            .ok_or(VolumeError::MissingBlock(index))
    }
}
