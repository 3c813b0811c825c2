use glam::{DVec3, UVec3};
use serde::{Deserialize, Serialize};

/// Volume extent in voxels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

impl Dimensions {
    pub const fn new(width: u32, height: u32, depth: u32) -> Self {
        Self {
            width,
            height,
            depth,
        }
    }

    /// Total number of voxels.
    pub fn voxel_count(&self) -> usize {
        self.width as usize * self.height as usize * self.depth as usize
    }

    /// Geometric center: half of each dimension.
    pub fn center(&self) -> DVec3 {
        DVec3::new(
            self.width as f64 / 2.0,
            self.height as f64 / 2.0,
            self.depth as f64 / 2.0,
        )
    }

    pub fn as_uvec3(&self) -> UVec3 {
        UVec3::new(self.width, self.height, self.depth)
    }
}

/// One voxel read from a modality: integer position plus scalar value on the
/// 0–255 value axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub x: u32,
    pub y: u32,
    pub z: u32,
    pub value: f64,
}

impl Sample {
    pub fn new(x: u32, y: u32, z: u32, value: f64) -> Self {
        Self { x, y, z, value }
    }

    pub fn position(&self) -> DVec3 {
        DVec3::new(self.x as f64, self.y as f64, self.z as f64)
    }
}

/// Coordinate-wise mean of a cluster's member samples.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Centroid {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Mean sample value.
    pub v: f64,
}

impl Centroid {
    pub fn position(&self) -> DVec3 {
        DVec3::new(self.x, self.y, self.z)
    }
}

/// Statistical summary of one histogram bin of voxel values.
///
/// Immutable once extracted; this is also the wire format sent to the
/// synthesis service.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterFeature {
    pub min_value: f64,
    pub max_value: f64,
    #[serde(alias = "numberOfPoints")]
    pub point_count: usize,
    #[serde(alias = "mean")]
    pub centroid: Centroid,
    /// Sum of squared spatial distances of the members from the centroid.
    pub variance: f64,
    /// Euclidean distance from the centroid to the volume's geometric center.
    pub distance_to_volume_center: f64,
}

/// Dense 8-bit voxel data ready for upload as a 3D texture.
/// Texels are laid out x-fastest, then y, then z.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeTexels {
    pub dimensions: Dimensions,
    pub data: Vec<u8>,
}

impl VolumeTexels {
    /// Zero-filled texels for the given dimensions.
    pub fn zeroed(dimensions: Dimensions) -> Self {
        Self {
            dimensions,
            data: vec![0; dimensions.voxel_count()],
        }
    }

    /// Linear texel index of (x, y, z).
    pub fn index(&self, x: u32, y: u32, z: u32) -> usize {
        let d = self.dimensions;
        x as usize + y as usize * d.width as usize + z as usize * d.width as usize * d.height as usize
    }
}
