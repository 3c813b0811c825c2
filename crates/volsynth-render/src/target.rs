//! One independently GPU-context-managed view.
//!
//! A target owns its context, renderer and tone mapper. It remembers the
//! last volume, ramp, transform and filter it was given so that a rebuild
//! after context loss can re-bind them. Rendering calls made while the
//! target is not [`TargetState::Ready`] are no-ops.

use std::sync::Arc;

use volsynth_core::VolumeTexels;

use crate::backend::{Backend, GpuContext, Renderer, TextureOf, ToneMapper};
use crate::error::{RampError, RenderError};
use crate::ramp::Ramp;
use crate::transform::{Filter, Transform};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetState {
    Uninitialized,
    Ready,
    ContextLost,
    Destroyed,
}

/// Resources that live and die with one context.
struct Bound<B: Backend> {
    context: B::Context,
    renderer: B::Renderer,
    tone_mapper: B::ToneMapper,
    volume: Option<TextureOf<B>>,
    ramp: Option<TextureOf<B>>,
}

impl<B: Backend> Bound<B> {
    fn upload_volume(&mut self, volume: &VolumeTexels, filter: Filter) -> Result<(), RenderError> {
        let texture = self.context.create_volume_texture(volume, filter)?;
        self.renderer.set_volume(&mut self.context, &texture);
        if let Some(old) = self.volume.replace(texture) {
            self.context.destroy_texture(old);
        }
        Ok(())
    }

    fn upload_ramp(&mut self, ramp: &Ramp) -> Result<(), RenderError> {
        let texture = self.context.create_ramp_texture(ramp)?;
        self.renderer.set_transfer_function(&mut self.context, &texture);
        if let Some(old) = self.ramp.replace(texture) {
            self.context.destroy_texture(old);
        }
        Ok(())
    }

    /// Free every resource through the still-valid context.
    fn release(mut self) {
        self.renderer.destroy(&mut self.context);
        self.tone_mapper.destroy(&mut self.context);
        if let Some(texture) = self.volume.take() {
            self.context.destroy_texture(texture);
        }
        if let Some(texture) = self.ramp.take() {
            self.context.destroy_texture(texture);
        }
    }
}

pub struct RenderTarget<B: Backend> {
    label: String,
    resolution: u32,
    restorable: bool,
    state: TargetState,
    bound: Option<Bound<B>>,
    volume: Option<Arc<VolumeTexels>>,
    ramp: Option<Ramp>,
    transform: Transform,
    filter: Filter,
    dirty: bool,
    frames: u64,
}

impl<B: Backend> RenderTarget<B> {
    /// Create an uninitialized target. Call [`rebuild`](Self::rebuild) to
    /// acquire its context.
    pub fn new(label: impl Into<String>, resolution: u32, restorable: bool) -> Self {
        Self {
            label: label.into(),
            resolution: resolution.max(1),
            restorable,
            state: TargetState::Uninitialized,
            bound: None,
            volume: None,
            ramp: None,
            transform: Transform::default(),
            filter: Filter::default(),
            dirty: false,
            frames: 0,
        }
    }

    /// (Re)acquire the context and resources, then re-bind the last known
    /// volume, ramp and transform.
    pub fn rebuild(&mut self, backend: &mut B) -> Result<(), RenderError> {
        if self.state == TargetState::Destroyed {
            return Err(RenderError::Destroyed(self.label.clone()));
        }
        if let Some(old) = self.bound.take() {
            if self.state == TargetState::Ready {
                old.release();
            }
        }
        let was_lost = self.state == TargetState::ContextLost;
        self.state = if was_lost {
            TargetState::ContextLost
        } else {
            TargetState::Uninitialized
        };

        let mut context = backend.create_context(&self.label, self.resolution)?;
        let renderer = backend.create_renderer(&mut context, self.resolution)?;
        let tone_mapper = backend.create_tone_mapper(&mut context, self.resolution)?;
        let mut bound = Bound::<B> {
            context,
            renderer,
            tone_mapper,
            volume: None,
            ramp: None,
        };

        if let Some(volume) = &self.volume {
            bound.upload_volume(volume, self.filter)?;
        }
        if let Some(ramp) = &self.ramp {
            bound.upload_ramp(ramp)?;
        }
        bound.renderer.set_matrices(&mut bound.context, &self.transform);
        bound.renderer.reset(&mut bound.context);

        self.bound = Some(bound);
        self.state = TargetState::Ready;
        self.dirty = false;
        self.frames = 0;

        log::info!(
            "Render target '{}' {} at {}px",
            self.label,
            if was_lost { "restored" } else { "built" },
            self.resolution
        );
        Ok(())
    }

    pub fn bind_volume(&mut self, volume: Arc<VolumeTexels>) -> Result<(), RenderError> {
        self.ensure_alive()?;
        let filter = self.filter;
        if let Some(bound) = self.ready_mut() {
            bound.upload_volume(&volume, filter)?;
        }
        self.volume = Some(volume);
        self.reset();
        Ok(())
    }

    /// Bind a populated ramp. An empty ramp ("no transfer function") is
    /// rejected and the previous ramp stays bound.
    pub fn bind_transfer_function(&mut self, ramp: Ramp) -> Result<(), RenderError> {
        self.ensure_alive()?;
        if ramp.is_empty() {
            return Err(RampError::Empty.into());
        }
        if let Some(bound) = self.ready_mut() {
            bound.upload_ramp(&ramp)?;
        }
        self.ramp = Some(ramp);
        self.reset();
        Ok(())
    }

    /// Store new matrices. Accumulation resets at the next frame.
    pub fn set_transform(&mut self, transform: Transform) {
        if self.state == TargetState::Destroyed {
            return;
        }
        self.transform = transform;
        self.dirty = true;
    }

    pub fn set_filter(&mut self, filter: Filter) -> Result<(), RenderError> {
        self.ensure_alive()?;
        self.filter = filter;
        if let Some(volume) = self.volume.clone() {
            if let Some(bound) = self.ready_mut() {
                bound.upload_volume(&volume, filter)?;
            }
        }
        self.reset();
        Ok(())
    }

    pub fn set_resolution(&mut self, resolution: u32) {
        if self.state == TargetState::Destroyed {
            return;
        }
        self.resolution = resolution.max(1);
        let resolution = self.resolution;
        if let Some(bound) = self.ready_mut() {
            bound.renderer.set_resolution(&mut bound.context, resolution);
            bound.tone_mapper.set_resolution(&mut bound.context, resolution);
        }
        self.reset();
    }

    /// Discard accumulated progressive state.
    pub fn reset(&mut self) {
        self.frames = 0;
        if let Some(bound) = self.ready_mut() {
            bound.renderer.reset(&mut bound.context);
        }
    }

    /// Accumulate one progressive step. Returns whether a step was rendered.
    /// A lost context is detected here and routed through
    /// [`handle_context_lost`](Self::handle_context_lost).
    pub fn advance(&mut self) -> Result<bool, RenderError> {
        if self.state != TargetState::Ready {
            return Ok(false);
        }
        if self.bound.as_ref().is_some_and(|b| b.context.is_lost()) {
            return self.handle_context_lost().map(|_| false);
        }

        let dirty = self.dirty;
        let transform = self.transform;
        let Some(bound) = self.bound.as_mut() else {
            return Ok(false);
        };
        if bound.volume.is_none() || bound.ramp.is_none() {
            return Ok(false);
        }
        if dirty {
            bound.renderer.set_matrices(&mut bound.context, &transform);
            bound.renderer.reset(&mut bound.context);
        }
        bound.renderer.render(&mut bound.context)?;

        if dirty {
            self.dirty = false;
            self.frames = 0;
        }
        self.frames += 1;
        Ok(true)
    }

    /// Tone-map the accumulated image and present it. Returns whether
    /// anything was presented.
    pub fn composite(&mut self) -> Result<bool, RenderError> {
        if self.state != TargetState::Ready || self.frames == 0 {
            return Ok(false);
        }
        let Some(bound) = self.bound.as_mut() else {
            return Ok(false);
        };
        bound
            .tone_mapper
            .render(&mut bound.context, bound.renderer.texture())?;
        bound.context.present(bound.tone_mapper.texture())?;
        Ok(true)
    }

    /// Advance one step and composite it.
    pub fn render_frame(&mut self) -> Result<bool, RenderError> {
        if !self.advance()? {
            return Ok(false);
        }
        self.composite()
    }

    /// React to a context-lost signal. Resources died with the context. A
    /// restorable target acknowledges the loss and waits for restore; any
    /// other target surfaces [`RenderError::ContextLostFatal`].
    pub fn handle_context_lost(&mut self) -> Result<(), RenderError> {
        match self.state {
            TargetState::Ready => {
                self.bound = None;
                self.state = TargetState::ContextLost;
                self.frames = 0;
            }
            TargetState::ContextLost => {}
            TargetState::Uninitialized | TargetState::Destroyed => return Ok(()),
        }

        if self.restorable {
            log::warn!("Render target '{}' lost its context; awaiting restore", self.label);
            Ok(())
        } else {
            log::error!("Render target '{}' lost its context; renderer unavailable", self.label);
            Err(RenderError::ContextLostFatal(self.label.clone()))
        }
    }

    /// React to a context-restored signal by rebuilding. Non-restorable
    /// targets stay down until an explicit [`rebuild`](Self::rebuild).
    pub fn handle_context_restored(&mut self, backend: &mut B) -> Result<(), RenderError> {
        if self.state != TargetState::ContextLost {
            return Ok(());
        }
        if !self.restorable {
            return Err(RenderError::ContextLostFatal(self.label.clone()));
        }
        self.rebuild(backend)
    }

    /// Release every resource. The target cannot be rebuilt afterwards.
    pub fn destroy(&mut self) {
        if let Some(bound) = self.bound.take() {
            if self.state == TargetState::Ready {
                bound.release();
            }
        }
        self.state = TargetState::Destroyed;
        self.volume = None;
        self.ramp = None;
        self.frames = 0;
        log::debug!("Render target '{}' destroyed", self.label);
    }

    fn ensure_alive(&self) -> Result<(), RenderError> {
        if self.state == TargetState::Destroyed {
            Err(RenderError::Destroyed(self.label.clone()))
        } else {
            Ok(())
        }
    }

    fn ready_mut(&mut self) -> Option<&mut Bound<B>> {
        if self.state == TargetState::Ready {
            self.bound.as_mut()
        } else {
            None
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn state(&self) -> TargetState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == TargetState::Ready
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    pub fn restorable(&self) -> bool {
        self.restorable
    }

    /// Whether new matrices are waiting to be applied.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Progressive steps accumulated since the last reset.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn ramp(&self) -> Option<&Ramp> {
        self.ramp.as_ref()
    }

    pub fn volume(&self) -> Option<&Arc<VolumeTexels>> {
        self.volume.as_ref()
    }

    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    pub fn filter(&self) -> Filter {
        self.filter
    }

    pub fn context(&self) -> Option<&B::Context> {
        self.bound.as_ref().map(|b| &b.context)
    }

    pub fn context_mut(&mut self) -> Option<&mut B::Context> {
        self.bound.as_mut().map(|b| &mut b.context)
    }

    pub fn renderer(&self) -> Option<&B::Renderer> {
        self.bound.as_ref().map(|b| &b.renderer)
    }

    pub fn tone_mapper(&self) -> Option<&B::ToneMapper> {
        self.bound.as_ref().map(|b| &b.tone_mapper)
    }
}
