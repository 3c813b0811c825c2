//! Capability traits a render target drives. The ray-marching renderer and
//! the tone-mapping operator are opaque behind [`Renderer`] and
//! [`ToneMapper`]; a [`Backend`] creates one context plus one of each per
//! render target.

use volsynth_core::VolumeTexels;

use crate::error::RenderError;
use crate::ramp::Ramp;
use crate::transform::{Filter, Transform};

/// Texture handle type of a backend's context.
pub type TextureOf<B> = <<B as Backend>::Context as GpuContext>::Texture;

/// One independently owned GPU context and its destination surface.
pub trait GpuContext {
    type Texture;

    /// Upload dense 8-bit voxels as a 3D texture sampled with `filter`.
    fn create_volume_texture(
        &mut self,
        volume: &VolumeTexels,
        filter: Filter,
    ) -> Result<Self::Texture, RenderError>;

    /// Upload a populated 256×4 ramp as a 1D lookup texture.
    fn create_ramp_texture(&mut self, ramp: &Ramp) -> Result<Self::Texture, RenderError>;

    fn destroy_texture(&mut self, texture: Self::Texture);

    /// Composite `texture` onto the context's destination surface.
    fn present(&mut self, texture: &Self::Texture) -> Result<(), RenderError>;

    /// Whether the context has been lost since creation.
    fn is_lost(&self) -> bool;
}

/// Progressive volume renderer bound to one context.
pub trait Renderer<C: GpuContext> {
    fn set_volume(&mut self, ctx: &mut C, volume: &C::Texture);
    fn set_transfer_function(&mut self, ctx: &mut C, ramp: &C::Texture);
    fn set_matrices(&mut self, ctx: &mut C, transform: &Transform);
    /// Accumulate one more progressive step.
    fn render(&mut self, ctx: &mut C) -> Result<(), RenderError>;
    /// The accumulated image.
    fn texture(&self) -> &C::Texture;
    /// Discard accumulated state.
    fn reset(&mut self, ctx: &mut C);
    fn set_resolution(&mut self, ctx: &mut C, resolution: u32);
    fn destroy(&mut self, ctx: &mut C);
}

/// Maps the renderer's accumulated image to displayable color.
pub trait ToneMapper<C: GpuContext> {
    fn render(&mut self, ctx: &mut C, input: &C::Texture) -> Result<(), RenderError>;
    fn texture(&self) -> &C::Texture;
    fn set_resolution(&mut self, ctx: &mut C, resolution: u32);
    fn destroy(&mut self, ctx: &mut C);
}

/// Factory for the per-target context and capabilities.
pub trait Backend {
    type Context: GpuContext;
    type Renderer: Renderer<Self::Context>;
    type ToneMapper: ToneMapper<Self::Context>;

    fn create_context(&mut self, label: &str, resolution: u32)
        -> Result<Self::Context, RenderError>;

    fn create_renderer(
        &mut self,
        ctx: &mut Self::Context,
        resolution: u32,
    ) -> Result<Self::Renderer, RenderError>;

    fn create_tone_mapper(
        &mut self,
        ctx: &mut Self::Context,
        resolution: u32,
    ) -> Result<Self::ToneMapper, RenderError>;
}
