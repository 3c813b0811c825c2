use crate::backend::Renderer;
use crate::error::RenderError;
use crate::transform::Transform;

use super::{GpuTexture, WgpuContext};

/// Samples taken along each ray per progressive step.
const RAY_STEPS: u32 = 256;

/// Accumulation buffers hold a running mean, so they need float precision.
const ACCUMULATION_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;

/// Must match RayMarchUniforms in raymarch.wgsl.
#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct RayMarchUniforms {
    pub inv_model_view_proj: [[f32; 4]; 4],
    pub resolution: [u32; 2],
    pub frame: u32,
    pub steps: u32,
}

/// Progressive ray marcher. Each step renders one jittered sample per pixel
/// and folds it into a running mean held in a ping-ponged float texture.
pub struct RayMarchRenderer {
    pipeline: wgpu::ComputePipeline,
    frame_bgl: wgpu::BindGroupLayout,
    volume_bgl: wgpu::BindGroupLayout,
    ramp_bgl: wgpu::BindGroupLayout,
    uniform_buffer: wgpu::Buffer,
    // [0] is the latest accumulation, [1] the one written next.
    accumulation: [GpuTexture; 2],
    // frame_bind_groups[i] reads accumulation[i] and writes the other.
    frame_bind_groups: [wgpu::BindGroup; 2],
    current: usize,
    volume_bind_group: Option<wgpu::BindGroup>,
    ramp_bind_group: Option<wgpu::BindGroup>,
    uniforms: RayMarchUniforms,
}

fn create_accumulation(device: &wgpu::Device, resolution: u32, label: &str) -> GpuTexture {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width: resolution,
            height: resolution,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: ACCUMULATION_FORMAT,
        usage: wgpu::TextureUsages::STORAGE_BINDING
            | wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    GpuTexture {
        texture,
        view,
        sampler: None,
    }
}

fn create_frame_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    uniforms: &wgpu::Buffer,
    previous: &GpuTexture,
    output: &GpuTexture,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("raymarch-frame-bg"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: uniforms.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(&previous.view),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::TextureView(&output.view),
            },
        ],
    })
}

impl RayMarchRenderer {
    pub fn new(ctx: &WgpuContext, resolution: u32) -> Self {
        let device = ctx.device();
        let resolution = resolution.max(1);

        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("raymarch-shader"),
            source: wgpu::ShaderSource::Wgsl(
                include_str!("../../../../shaders/render/raymarch.wgsl").into(),
            ),
        });

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("raymarch-uniforms"),
            size: std::mem::size_of::<RayMarchUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let frame_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("raymarch-frame-bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::StorageTexture {
                        access: wgpu::StorageTextureAccess::WriteOnly,
                        format: ACCUMULATION_FORMAT,
                        view_dimension: wgpu::TextureViewDimension::D2,
                    },
                    count: None,
                },
            ],
        });

        let volume_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("raymarch-volume-bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D3,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let ramp_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("raymarch-ramp-bgl"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: false },
                    view_dimension: wgpu::TextureViewDimension::D1,
                    multisampled: false,
                },
                count: None,
            }],
        });

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("raymarch-pipeline-layout"),
            bind_group_layouts: &[&frame_bgl, &volume_bgl, &ramp_bgl],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("raymarch-pipeline"),
            layout: Some(&layout),
            module: &module,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        });

        let accumulation = [
            create_accumulation(device, resolution, "accumulation-a"),
            create_accumulation(device, resolution, "accumulation-b"),
        ];
        let frame_bind_groups = [
            create_frame_bind_group(
                device,
                &frame_bgl,
                &uniform_buffer,
                &accumulation[0],
                &accumulation[1],
            ),
            create_frame_bind_group(
                device,
                &frame_bgl,
                &uniform_buffer,
                &accumulation[1],
                &accumulation[0],
            ),
        ];

        Self {
            pipeline,
            frame_bgl,
            volume_bgl,
            ramp_bgl,
            uniform_buffer,
            accumulation,
            frame_bind_groups,
            current: 0,
            volume_bind_group: None,
            ramp_bind_group: None,
            uniforms: RayMarchUniforms {
                inv_model_view_proj: Transform::default()
                    .inverse_model_view_projection()
                    .to_cols_array_2d(),
                resolution: [resolution, resolution],
                frame: 0,
                steps: RAY_STEPS,
            },
        }
    }

    /// Progressive steps folded into the current image.
    pub fn frame(&self) -> u32 {
        self.uniforms.frame
    }
}

impl Renderer<WgpuContext> for RayMarchRenderer {
    fn set_volume(&mut self, ctx: &mut WgpuContext, volume: &GpuTexture) {
        let Some(sampler) = volume.sampler.as_ref() else {
            log::warn!("Volume texture for '{}' has no sampler", ctx.label());
            return;
        };
        self.volume_bind_group = Some(ctx.device().create_bind_group(
            &wgpu::BindGroupDescriptor {
                label: Some("raymarch-volume-bg"),
                layout: &self.volume_bgl,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&volume.view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::Sampler(sampler),
                    },
                ],
            },
        ));
    }

    fn set_transfer_function(&mut self, ctx: &mut WgpuContext, ramp: &GpuTexture) {
        self.ramp_bind_group = Some(ctx.device().create_bind_group(
            &wgpu::BindGroupDescriptor {
                label: Some("raymarch-ramp-bg"),
                layout: &self.ramp_bgl,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&ramp.view),
                }],
            },
        ));
    }

    fn set_matrices(&mut self, _ctx: &mut WgpuContext, transform: &Transform) {
        self.uniforms.inv_model_view_proj =
            transform.inverse_model_view_projection().to_cols_array_2d();
    }

    fn render(&mut self, ctx: &mut WgpuContext) -> Result<(), RenderError> {
        let (Some(volume), Some(ramp)) = (&self.volume_bind_group, &self.ramp_bind_group) else {
            return Err(RenderError::Gpu(format!(
                "'{}' has no volume or transfer function bound",
                ctx.label()
            )));
        };

        ctx.queue()
            .write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&self.uniforms));

        let mut encoder = ctx
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("raymarch-encoder"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("raymarch-pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &self.frame_bind_groups[self.current], &[]);
            pass.set_bind_group(1, volume, &[]);
            pass.set_bind_group(2, ramp, &[]);
            let [width, height] = self.uniforms.resolution;
            pass.dispatch_workgroups(width.div_ceil(8), height.div_ceil(8), 1);
        }
        ctx.queue().submit(Some(encoder.finish()));

        self.current = 1 - self.current;
        self.uniforms.frame += 1;
        Ok(())
    }

    fn texture(&self) -> &GpuTexture {
        &self.accumulation[self.current]
    }

    fn reset(&mut self, _ctx: &mut WgpuContext) {
        self.uniforms.frame = 0;
    }

    fn set_resolution(&mut self, ctx: &mut WgpuContext, resolution: u32) {
        let resolution = resolution.max(1);
        if self.uniforms.resolution == [resolution, resolution] {
            return;
        }
        let device = ctx.device();
        for texture in &self.accumulation {
            texture.texture.destroy();
        }
        self.accumulation = [
            create_accumulation(device, resolution, "accumulation-a"),
            create_accumulation(device, resolution, "accumulation-b"),
        ];
        self.frame_bind_groups = [
            create_frame_bind_group(
                device,
                &self.frame_bgl,
                &self.uniform_buffer,
                &self.accumulation[0],
                &self.accumulation[1],
            ),
            create_frame_bind_group(
                device,
                &self.frame_bgl,
                &self.uniform_buffer,
                &self.accumulation[1],
                &self.accumulation[0],
            ),
        ];
        self.current = 0;
        self.uniforms.resolution = [resolution, resolution];
        self.uniforms.frame = 0;
    }

    fn destroy(&mut self, _ctx: &mut WgpuContext) {
        for texture in &self.accumulation {
            texture.texture.destroy();
        }
        self.uniform_buffer.destroy();
        self.volume_bind_group = None;
        self.ramp_bind_group = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniforms_layout_matches_shader() {
        assert_eq!(std::mem::size_of::<RayMarchUniforms>(), 80);
    }
}
