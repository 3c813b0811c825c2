use crossbeam_channel::Sender;
use volsynth_core::{Dimensions, Sample, VolumeTexels};

use crate::error::VolumeError;
use crate::reader::VolumeReader;

/// Notifications emitted while a modality loads. For one load, every
/// `Progress` precedes the single `Complete`.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadEvent {
    /// Fraction of blocks read so far, in (0, 1].
    Progress(f32),
    Complete { modality: String },
}

/// A fully read modality: dense texels for the GPU plus the samples the
/// feature extractor bins.
#[derive(Debug, Clone)]
pub struct LoadedVolume {
    pub name: String,
    pub texels: VolumeTexels,
    pub samples: Vec<Sample>,
}

impl LoadedVolume {
    pub fn dimensions(&self) -> Dimensions {
        self.texels.dimensions
    }
}

/// Read every block of modality `name`, place it in the dense volume and
/// collect its samples. Sending on a disconnected channel is not an error.
pub fn load_modality<R: VolumeReader>(
    reader: &mut R,
    name: &str,
    events: Option<&Sender<LoadEvent>>,
) -> Result<LoadedVolume, VolumeError> {
    let metadata = reader.read_metadata()?;
    let modality = metadata
        .modality(name)
        .ok_or_else(|| VolumeError::UnknownModality(name.to_string()))?;

    let dims = modality.dimensions;
    let format = modality.format;
    let stride = format.bytes_per_sample();
    let mut texels = VolumeTexels::zeroed(dims);
    let mut samples = Vec::with_capacity(dims.voxel_count());
    let total = modality.placements.len();

    log::info!(
        "Loading modality '{}' ({}x{}x{}, {:?}, {} blocks)",
        name,
        dims.width,
        dims.height,
        dims.depth,
        format,
        total
    );

    for (done, placement) in modality.placements.iter().enumerate() {
        let block = metadata
            .blocks
            .get(placement.index)
            .ok_or(VolumeError::MissingBlock(placement.index))?;
        let bdim = block.dimensions;
        let origin = placement.position;

        let fits = |start: u32, len: u32, limit: u32| {
            start.checked_add(len).is_some_and(|end| end <= limit)
        };
        if !(fits(origin.x, bdim.width, dims.width)
            && fits(origin.y, bdim.height, dims.height)
            && fits(origin.z, bdim.depth, dims.depth))
        {
            return Err(VolumeError::PlacementOutOfBounds {
                index: placement.index,
                position: origin.to_array(),
            });
        }

        let data = reader.read_block(placement.index)?;
        let expected = bdim.voxel_count() * stride;
        if data.len() != expected {
            return Err(VolumeError::BlockSizeMismatch {
                index: placement.index,
                expected,
                actual: data.len(),
            });
        }

        for (i, raw) in data.chunks_exact(stride).enumerate() {
            let lx = (i % bdim.width as usize) as u32;
            let ly = ((i / bdim.width as usize) % bdim.height as usize) as u32;
            let lz = (i / (bdim.width as usize * bdim.height as usize)) as u32;
            let (x, y, z) = (origin.x + lx, origin.y + ly, origin.z + lz);

            let Some(value) = format.decode(raw) else {
                continue;
            };
            let idx = texels.index(x, y, z);
            texels.data[idx] = value.round().clamp(0.0, 255.0) as u8;
            if value.is_finite() {
                samples.push(Sample::new(x, y, z, value));
            }
        }

        if let Some(tx) = events {
            let _ = tx.send(LoadEvent::Progress((done + 1) as f32 / total as f32));
        }
    }

    if let Some(tx) = events {
        let _ = tx.send(LoadEvent::Complete {
            modality: name.to_string(),
        });
    }

    log::info!("Loaded modality '{}': {} samples", name, samples.len());

    Ok(LoadedVolume {
        name: name.to_string(),
        texels,
        samples,
    })
}
