//! wgpu backend. Every render target gets its own headless device, so a
//! device loss takes down exactly one target.

pub mod raymarch;
pub mod tonemap;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use volsynth_core::constants::RAMP_SIZE;
use volsynth_core::VolumeTexels;

use crate::backend::{Backend, GpuContext};
use crate::error::RenderError;
use crate::ramp::Ramp;
use crate::transform::Filter;

pub use raymarch::RayMarchRenderer;
pub use tonemap::GpuToneMapper;

/// Format of the tone-mapped image and the display texture.
pub const DISPLAY_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

pub struct GpuTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: Option<wgpu::Sampler>,
}

impl GpuTexture {
    pub fn size(&self) -> wgpu::Extent3d {
        self.texture.size()
    }
}

/// Creates one device per render target on a shared instance.
pub struct GpuBackend {
    instance: wgpu::Instance,
    power_preference: wgpu::PowerPreference,
}

impl GpuBackend {
    pub fn new() -> Self {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });
        Self {
            instance,
            power_preference: wgpu::PowerPreference::HighPerformance,
        }
    }
}

impl Default for GpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

pub struct WgpuContext {
    label: String,
    device: wgpu::Device,
    queue: wgpu::Queue,
    display: GpuTexture,
    lost: Arc<AtomicBool>,
}

impl WgpuContext {
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// The destination surface presented frames land on.
    pub fn display(&self) -> &GpuTexture {
        &self.display
    }

    /// Read the display texture back as tightly packed RGBA8 rows.
    pub fn read_display(&self) -> Result<Vec<u8>, RenderError> {
        let size = self.display.size();
        let row = size.width * 4;
        let padded_row = row.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
            * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("display-readback"),
            size: (padded_row * size.height) as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("display-readback-encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.display.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row),
                    rows_per_image: Some(size.height),
                },
            },
            size,
        );
        self.queue.submit(Some(encoder.finish()));

        let (tx, rx) = crossbeam_channel::bounded(1);
        let slice = buffer.slice(..);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|e| RenderError::Gpu(e.to_string()))?
            .map_err(|e| RenderError::Gpu(e.to_string()))?;

        let mapped = slice.get_mapped_range();
        let mut pixels = Vec::with_capacity((row * size.height) as usize);
        for chunk in mapped.chunks(padded_row as usize) {
            pixels.extend_from_slice(&chunk[..row as usize]);
        }
        drop(mapped);
        buffer.unmap();
        Ok(pixels)
    }
}

fn create_display(device: &wgpu::Device, width: u32, height: u32) -> GpuTexture {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("display-texture"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DISPLAY_FORMAT,
        usage: wgpu::TextureUsages::COPY_DST
            | wgpu::TextureUsages::COPY_SRC
            | wgpu::TextureUsages::TEXTURE_BINDING,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    GpuTexture {
        texture,
        view,
        sampler: None,
    }
}

fn filter_mode(filter: Filter) -> wgpu::FilterMode {
    match filter {
        Filter::Linear => wgpu::FilterMode::Linear,
        Filter::Nearest => wgpu::FilterMode::Nearest,
    }
}

impl GpuContext for WgpuContext {
    type Texture = GpuTexture;

    fn create_volume_texture(
        &mut self,
        volume: &VolumeTexels,
        filter: Filter,
    ) -> Result<GpuTexture, RenderError> {
        let dims = volume.dimensions;
        if dims.voxel_count() == 0 || volume.data.len() != dims.voxel_count() {
            return Err(RenderError::Gpu(format!(
                "volume {}x{}x{} has {} texels",
                dims.width,
                dims.height,
                dims.depth,
                volume.data.len()
            )));
        }

        let size = wgpu::Extent3d {
            width: dims.width,
            height: dims.height,
            depth_or_array_layers: dims.depth,
        };
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("volume-texture"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D3,
            format: wgpu::TextureFormat::R8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &volume.data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(dims.width),
                rows_per_image: Some(dims.height),
            },
            size,
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            dimension: Some(wgpu::TextureViewDimension::D3),
            ..Default::default()
        });
        let mode = filter_mode(filter);
        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("volume-sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: mode,
            min_filter: mode,
            ..Default::default()
        });

        Ok(GpuTexture {
            texture,
            view,
            sampler: Some(sampler),
        })
    }

    fn create_ramp_texture(&mut self, ramp: &Ramp) -> Result<GpuTexture, RenderError> {
        if ramp.is_empty() {
            return Err(RenderError::Gpu("refusing to upload an empty ramp".into()));
        }
        let size = wgpu::Extent3d {
            width: RAMP_SIZE as u32,
            height: 1,
            depth_or_array_layers: 1,
        };
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("transfer-function-ramp"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D1,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            ramp.bytes(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(RAMP_SIZE as u32 * 4),
                rows_per_image: None,
            },
            size,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            dimension: Some(wgpu::TextureViewDimension::D1),
            ..Default::default()
        });
        Ok(GpuTexture {
            texture,
            view,
            sampler: None,
        })
    }

    fn destroy_texture(&mut self, texture: GpuTexture) {
        texture.texture.destroy();
    }

    fn present(&mut self, texture: &GpuTexture) -> Result<(), RenderError> {
        let size = texture.size();
        if self.display.size() != size {
            self.display.texture.destroy();
            self.display = create_display(&self.device, size.width, size.height);
        }

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("present-encoder"),
            });
        encoder.copy_texture_to_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyTextureInfo {
                texture: &self.display.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            size,
        );
        self.queue.submit(Some(encoder.finish()));
        self.device.poll(wgpu::Maintain::Poll);
        Ok(())
    }

    fn is_lost(&self) -> bool {
        self.lost.load(Ordering::Acquire)
    }
}

impl Backend for GpuBackend {
    type Context = WgpuContext;
    type Renderer = RayMarchRenderer;
    type ToneMapper = GpuToneMapper;

    fn create_context(&mut self, label: &str, resolution: u32) -> Result<WgpuContext, RenderError> {
        let adapter = pollster::block_on(self.instance.request_adapter(
            &wgpu::RequestAdapterOptions {
                power_preference: self.power_preference,
                compatible_surface: None,
                force_fallback_adapter: false,
            },
        ))
        .ok_or_else(|| RenderError::ContextUnavailable("no GPU adapter found".into()))?;

        let info = adapter.get_info();
        log::info!("Adapter for '{}': {} ({:?})", label, info.name, info.backend);

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some(label),
                required_features: wgpu::Features::empty(),
                required_limits: adapter.limits(),
                ..Default::default()
            },
            None,
        ))
        .map_err(|e| RenderError::ContextUnavailable(e.to_string()))?;

        let lost = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&lost);
        let owner = label.to_string();
        device.set_device_lost_callback(move |reason, message| {
            log::error!("Device of '{owner}' lost ({reason:?}): {message}");
            flag.store(true, Ordering::Release);
        });

        let display = create_display(&device, resolution, resolution);
        Ok(WgpuContext {
            label: label.to_string(),
            device,
            queue,
            display,
            lost,
        })
    }

    fn create_renderer(
        &mut self,
        ctx: &mut WgpuContext,
        resolution: u32,
    ) -> Result<RayMarchRenderer, RenderError> {
        Ok(RayMarchRenderer::new(ctx, resolution))
    }

    fn create_tone_mapper(
        &mut self,
        ctx: &mut WgpuContext,
        resolution: u32,
    ) -> Result<GpuToneMapper, RenderError> {
        Ok(GpuToneMapper::new(ctx, resolution))
    }
}
