//! Headless backend that performs no GPU work but honors every capability
//! call and records what it was asked to do. Context loss can be simulated.

use volsynth_core::VolumeTexels;

use crate::backend::{Backend, GpuContext, Renderer, ToneMapper};
use crate::error::RenderError;
use crate::ramp::Ramp;
use crate::transform::{Filter, Transform};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureKind {
    Volume,
    Ramp,
    Accumulation,
    Display,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NullTexture {
    pub id: u64,
    pub kind: TextureKind,
    /// Ramp bytes; empty for other kinds.
    pub bytes: Vec<u8>,
    pub filter: Option<Filter>,
}

#[derive(Debug, Default)]
pub struct NullBackend {
    contexts_created: usize,
    /// When set, every context request fails as if no adapter existed.
    pub fail_contexts: bool,
}

impl NullBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contexts_created(&self) -> usize {
        self.contexts_created
    }
}

#[derive(Debug)]
pub struct NullContext {
    label: String,
    lost: bool,
    next_id: u64,
    live_textures: usize,
    volume_uploads: usize,
    ramp_uploads: usize,
    presents: usize,
    last_presented: Option<u64>,
}

impl NullContext {
    fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            lost: false,
            next_id: 0,
            live_textures: 0,
            volume_uploads: 0,
            ramp_uploads: 0,
            presents: 0,
            last_presented: None,
        }
    }

    fn allocate(
        &mut self,
        kind: TextureKind,
        bytes: Vec<u8>,
        filter: Option<Filter>,
    ) -> NullTexture {
        self.next_id += 1;
        self.live_textures += 1;
        NullTexture {
            id: self.next_id,
            kind,
            bytes,
            filter,
        }
    }

    /// Mark the context lost, as a GPU reset or driver crash would.
    pub fn simulate_loss(&mut self) {
        self.lost = true;
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn live_textures(&self) -> usize {
        self.live_textures
    }

    pub fn volume_uploads(&self) -> usize {
        self.volume_uploads
    }

    pub fn ramp_uploads(&self) -> usize {
        self.ramp_uploads
    }

    pub fn presents(&self) -> usize {
        self.presents
    }

    pub fn last_presented(&self) -> Option<u64> {
        self.last_presented
    }
}

impl GpuContext for NullContext {
    type Texture = NullTexture;

    fn create_volume_texture(
        &mut self,
        _volume: &VolumeTexels,
        filter: Filter,
    ) -> Result<NullTexture, RenderError> {
        self.volume_uploads += 1;
        Ok(self.allocate(TextureKind::Volume, Vec::new(), Some(filter)))
    }

    fn create_ramp_texture(&mut self, ramp: &Ramp) -> Result<NullTexture, RenderError> {
        self.ramp_uploads += 1;
        Ok(self.allocate(TextureKind::Ramp, ramp.bytes().to_vec(), None))
    }

    fn destroy_texture(&mut self, _texture: NullTexture) {
        self.live_textures = self.live_textures.saturating_sub(1);
    }

    fn present(&mut self, texture: &NullTexture) -> Result<(), RenderError> {
        self.presents += 1;
        self.last_presented = Some(texture.id);
        Ok(())
    }

    fn is_lost(&self) -> bool {
        self.lost
    }
}

#[derive(Debug)]
pub struct NullRenderer {
    output: NullTexture,
    resolution: u32,
    renders: u64,
    resets: u64,
    accumulated: u32,
    volume: Option<(u64, Option<Filter>)>,
    ramp: Option<Vec<u8>>,
    transform: Option<Transform>,
    destroyed: bool,
}

impl NullRenderer {
    /// Progressive steps since the last reset.
    pub fn accumulated(&self) -> u32 {
        self.accumulated
    }

    pub fn renders(&self) -> u64 {
        self.renders
    }

    pub fn resets(&self) -> u64 {
        self.resets
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    pub fn volume_filter(&self) -> Option<Filter> {
        self.volume.and_then(|(_, filter)| filter)
    }

    pub fn has_volume(&self) -> bool {
        self.volume.is_some()
    }

    /// Bytes of the currently bound ramp texture.
    pub fn ramp(&self) -> Option<&[u8]> {
        self.ramp.as_deref()
    }

    pub fn transform(&self) -> Option<&Transform> {
        self.transform.as_ref()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }
}

impl Renderer<NullContext> for NullRenderer {
    fn set_volume(&mut self, _ctx: &mut NullContext, volume: &NullTexture) {
        self.volume = Some((volume.id, volume.filter));
    }

    fn set_transfer_function(&mut self, _ctx: &mut NullContext, ramp: &NullTexture) {
        self.ramp = Some(ramp.bytes.clone());
    }

    fn set_matrices(&mut self, _ctx: &mut NullContext, transform: &Transform) {
        self.transform = Some(*transform);
    }

    fn render(&mut self, ctx: &mut NullContext) -> Result<(), RenderError> {
        if ctx.lost {
            return Err(RenderError::ContextLostRecoverable(ctx.label.clone()));
        }
        self.renders += 1;
        self.accumulated += 1;
        Ok(())
    }

    fn texture(&self) -> &NullTexture {
        &self.output
    }

    fn reset(&mut self, _ctx: &mut NullContext) {
        self.resets += 1;
        self.accumulated = 0;
    }

    fn set_resolution(&mut self, _ctx: &mut NullContext, resolution: u32) {
        self.resolution = resolution;
    }

    fn destroy(&mut self, ctx: &mut NullContext) {
        ctx.live_textures = ctx.live_textures.saturating_sub(1);
        self.destroyed = true;
    }
}

#[derive(Debug)]
pub struct NullToneMapper {
    output: NullTexture,
    resolution: u32,
    renders: u64,
    last_input: Option<u64>,
}

impl NullToneMapper {
    pub fn renders(&self) -> u64 {
        self.renders
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    pub fn last_input(&self) -> Option<u64> {
        self.last_input
    }
}

impl ToneMapper<NullContext> for NullToneMapper {
    fn render(&mut self, _ctx: &mut NullContext, input: &NullTexture) -> Result<(), RenderError> {
        self.renders += 1;
        self.last_input = Some(input.id);
        Ok(())
    }

    fn texture(&self) -> &NullTexture {
        &self.output
    }

    fn set_resolution(&mut self, _ctx: &mut NullContext, resolution: u32) {
        self.resolution = resolution;
    }

    fn destroy(&mut self, ctx: &mut NullContext) {
        ctx.live_textures = ctx.live_textures.saturating_sub(1);
    }
}

impl Backend for NullBackend {
    type Context = NullContext;
    type Renderer = NullRenderer;
    type ToneMapper = NullToneMapper;

    fn create_context(&mut self, label: &str, _resolution: u32) -> Result<NullContext, RenderError> {
        if self.fail_contexts {
            return Err(RenderError::ContextUnavailable(format!(
                "null backend refused context for '{label}'"
            )));
        }
        self.contexts_created += 1;
        Ok(NullContext::new(label))
    }

    fn create_renderer(
        &mut self,
        ctx: &mut NullContext,
        resolution: u32,
    ) -> Result<NullRenderer, RenderError> {
        Ok(NullRenderer {
            output: ctx.allocate(TextureKind::Accumulation, Vec::new(), None),
            resolution,
            renders: 0,
            resets: 0,
            accumulated: 0,
            volume: None,
            ramp: None,
            transform: None,
            destroyed: false,
        })
    }

    fn create_tone_mapper(
        &mut self,
        ctx: &mut NullContext,
        resolution: u32,
    ) -> Result<NullToneMapper, RenderError> {
        Ok(NullToneMapper {
            output: ctx.allocate(TextureKind::Display, Vec::new(), None),
            resolution,
            renders: 0,
            last_input: None,
        })
    }
}
