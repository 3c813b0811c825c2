//! Orchestrates one primary render target and the preview targets.
//!
//! Every target shares the volume, camera transform and filter; each
//! preview is bound to its own candidate ramp. Failures inside a tick are
//! logged and counted, never propagated, so one bad target cannot stop
//! the others.

use std::sync::Arc;

use crossbeam_channel::Sender;
use glam::{Mat4, Vec3};
use volsynth_core::VolumeTexels;
use volsynth_synth::{ServiceError, SynthesisClient, SynthesisRequest, SynthesisResponse};
use volsynth_volume::{load_modality, Binning, FeatureExtractor, LoadEvent, VolumeReader};

use crate::backend::Backend;
use crate::config::{preview_resolution, PipelineConfig};
use crate::error::RenderError;
use crate::ramp::{prepare_ramp, Ramp};
use crate::target::{RenderTarget, TargetState};
use crate::transform::{model_matrix, Filter, Transform};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetId {
    Primary,
    Preview(usize),
}

/// Per-tick outcome counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameStats {
    pub rendered: usize,
    pub composited: usize,
    pub failed: usize,
}

/// An in-flight preview selection. Only the most recently issued ticket
/// may be completed; older ones are stale.
#[derive(Debug, Clone)]
pub struct SelectionTicket {
    index: usize,
    generation: u64,
    /// Ramp of the clicked preview at click time.
    ramp: Option<Ramp>,
}

impl SelectionTicket {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

pub struct RenderingPipeline<B: Backend> {
    backend: B,
    config: PipelineConfig,
    primary: RenderTarget<B>,
    previews: Vec<RenderTarget<B>>,
    extractor: FeatureExtractor,
    scale: Vec3,
    translation: Vec3,
    view: Mat4,
    projection: Mat4,
    generation: u64,
    // Per-tick record of which previews advanced, reused across ticks.
    advanced: Vec<bool>,
}

impl<B: Backend> RenderingPipeline<B> {
    /// Create and build the primary target and one preview per candidate.
    pub fn new(backend: B, config: PipelineConfig) -> Result<Self, RenderError> {
        let preview_res = config.preview_resolution();
        let primary = RenderTarget::new("primary", config.resolution, config.restorable);
        let previews = (0..config.preview_count)
            .map(|i| RenderTarget::new(format!("preview-{i}"), preview_res, config.restorable))
            .collect();

        let mut pipeline = Self {
            backend,
            primary,
            previews,
            extractor: FeatureExtractor::default(),
            scale: Vec3::ONE,
            translation: Vec3::ZERO,
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            generation: 0,
            advanced: Vec::with_capacity(config.preview_count),
            config,
        };

        let filter = pipeline.config.filter;
        let backend = &mut pipeline.backend;
        for target in std::iter::once(&mut pipeline.primary).chain(pipeline.previews.iter_mut()) {
            target.set_filter(filter)?;
            target.rebuild(backend)?;
        }
        pipeline.broadcast_transform();

        log::info!(
            "Rendering pipeline ready: primary {}px, {} previews at {}px",
            pipeline.config.resolution,
            pipeline.previews.len(),
            preview_res
        );
        Ok(pipeline)
    }

    fn targets_mut(&mut self) -> impl Iterator<Item = &mut RenderTarget<B>> {
        std::iter::once(&mut self.primary).chain(self.previews.iter_mut())
    }

    /// Apply `f` to every target, logging failures. Returns the first error
    /// after all targets have been visited.
    fn broadcast(
        &mut self,
        mut f: impl FnMut(&mut RenderTarget<B>) -> Result<(), RenderError>,
    ) -> Result<(), RenderError> {
        let mut first = None;
        for target in self.targets_mut() {
            if let Err(e) = f(&mut *target) {
                log::warn!("Render target '{}': {e}", target.label());
                first.get_or_insert(e);
            }
        }
        first.map_or(Ok(()), Err)
    }

    fn broadcast_transform(&mut self) {
        let transform = self.transform();
        for target in self.targets_mut() {
            target.set_transform(transform);
        }
    }

    pub fn set_volume(&mut self, volume: VolumeTexels) -> Result<(), RenderError> {
        let volume = Arc::new(volume);
        log::info!(
            "Binding volume {}x{}x{} to all targets",
            volume.dimensions.width,
            volume.dimensions.height,
            volume.dimensions.depth
        );
        self.broadcast(|t| t.bind_volume(Arc::clone(&volume)))
    }

    /// Camera matrices from the external camera controller.
    pub fn set_camera(&mut self, view: Mat4, projection: Mat4) {
        self.view = view;
        self.projection = projection;
        self.broadcast_transform();
    }

    pub fn set_scale(&mut self, scale: Vec3) {
        self.scale = scale;
        self.broadcast_transform();
    }

    pub fn set_translation(&mut self, translation: Vec3) {
        self.translation = translation;
        self.broadcast_transform();
    }

    pub fn set_filter(&mut self, filter: Filter) -> Result<(), RenderError> {
        self.config.filter = filter;
        self.broadcast(|t| t.set_filter(filter))
    }

    /// Resize the primary to `resolution` and the previews to the scaled size.
    pub fn set_resolution(&mut self, resolution: u32) {
        self.config.resolution = resolution.max(1);
        let preview_res = preview_resolution(self.config.resolution, self.config.preview_scale);
        self.primary.set_resolution(self.config.resolution);
        for preview in &mut self.previews {
            preview.set_resolution(preview_res);
        }
    }

    pub fn set_binning(&mut self, binning: Binning) {
        self.extractor = FeatureExtractor::new(binning);
    }

    pub fn reset_all(&mut self) {
        for target in self.targets_mut() {
            target.reset();
        }
    }

    /// Replace every preview's ramp with the candidates in `response`.
    ///
    /// All ramps are interpolated before any is bound. An empty response
    /// keeps the current set and returns `Ok(false)`. A candidate whose
    /// ramp is malformed or empty keeps that preview's previous ramp.
    pub fn apply_candidates(&mut self, response: &SynthesisResponse) -> Result<bool, RenderError> {
        if response.is_empty() {
            log::warn!("Empty candidate set; keeping the current previews");
            return Ok(false);
        }
        if response.transfer_functions.len() != self.previews.len() {
            return Err(RenderError::CandidateCount {
                expected: self.previews.len(),
                actual: response.transfer_functions.len(),
            });
        }

        let ramps: Vec<Option<Ramp>> = response
            .transfer_functions
            .iter()
            .enumerate()
            .map(|(i, tf)| match prepare_ramp(tf) {
                Ok(ramp) if !ramp.is_empty() => Some(ramp),
                Ok(_) => {
                    log::warn!("Candidate {i} has no control points; keeping previous ramp");
                    None
                }
                Err(e) => {
                    log::warn!("Candidate {i} rejected: {e}; keeping previous ramp");
                    None
                }
            })
            .collect();

        for (preview, ramp) in self.previews.iter_mut().zip(ramps) {
            if let Some(ramp) = ramp {
                if let Err(e) = preview.bind_transfer_function(ramp) {
                    log::warn!("Render target '{}': {e}", preview.label());
                }
            }
        }
        Ok(true)
    }

    /// Start selecting preview `index`. Issuing a ticket makes every earlier
    /// ticket stale.
    pub fn begin_selection(&mut self, index: usize) -> Result<SelectionTicket, RenderError> {
        let preview = self
            .previews
            .get(index)
            .ok_or(RenderError::InvalidCandidateIndex {
                index,
                count: self.previews.len(),
            })?;
        self.generation += 1;
        Ok(SelectionTicket {
            index,
            generation: self.generation,
            ramp: preview.ramp().cloned(),
        })
    }

    /// Finish a selection with the synthesis outcome. Previews take the new
    /// candidates first, then the primary adopts the clicked ramp. A failed
    /// or empty outcome keeps the previous candidates. Stale tickets are
    /// dropped and return `Ok(false)`.
    pub fn complete_selection(
        &mut self,
        ticket: SelectionTicket,
        outcome: Result<SynthesisResponse, ServiceError>,
    ) -> Result<bool, RenderError> {
        if ticket.generation != self.generation {
            log::warn!(
                "Dropping stale synthesis response for preview {} (generation {} < {})",
                ticket.index,
                ticket.generation,
                self.generation
            );
            return Ok(false);
        }

        let applied = match outcome {
            Ok(response) => self.apply_candidates(&response),
            Err(e) => {
                log::warn!("Synthesis failed: {e}; keeping the current previews");
                Err(RenderError::Synthesis(e))
            }
        };

        if let Some(ramp) = ticket.ramp {
            if let Err(e) = self.primary.bind_transfer_function(ramp) {
                log::warn!("Render target '{}': {e}", self.primary.label());
            }
        }
        applied
    }

    /// Select preview `index`: adapt the candidates toward it and let the
    /// primary adopt its ramp.
    pub async fn select_preview<C: SynthesisClient>(
        &mut self,
        index: usize,
        client: &mut C,
    ) -> Result<bool, RenderError> {
        let ticket = self.begin_selection(index)?;
        let outcome = client
            .request(&SynthesisRequest::Adapt { tf_index: index })
            .await;
        self.complete_selection(ticket, outcome)
    }

    /// Load modality `name`, bind it to every target and start a synthesis
    /// session from its features. Returns the number of clusters.
    pub async fn load_volume<R: VolumeReader, C: SynthesisClient>(
        &mut self,
        reader: &mut R,
        name: &str,
        client: &mut C,
        events: Option<&Sender<LoadEvent>>,
    ) -> Result<usize, RenderError> {
        let loaded = load_modality(reader, name, events)?;
        let features = self.extractor.extract(&loaded.samples, loaded.dimensions())?;
        let clusters = features.len();
        self.set_volume(loaded.texels)?;

        // selections against the previous volume are void
        self.generation += 1;

        let response = client
            .request(&SynthesisRequest::NewSession { volume: features })
            .await?;
        self.apply_candidates(&response)?;

        if self.primary.ramp().is_none() {
            if let Some(ramp) = self.previews.first().and_then(|p| p.ramp()).cloned() {
                self.primary.bind_transfer_function(ramp)?;
            }
        }
        Ok(clusters)
    }

    /// One animation tick: render the primary, advance every preview in
    /// index order, then composite the previews.
    pub fn tick(&mut self) -> FrameStats {
        let mut stats = FrameStats::default();

        match self.primary.render_frame() {
            Ok(true) => {
                stats.rendered += 1;
                stats.composited += 1;
            }
            Ok(false) => {}
            Err(e) => {
                log::warn!("Render target '{}': {e}", self.primary.label());
                stats.failed += 1;
            }
        }

        self.advanced.clear();
        self.advanced.resize(self.previews.len(), false);
        for (preview, flag) in self.previews.iter_mut().zip(self.advanced.iter_mut()) {
            match preview.advance() {
                Ok(done) => {
                    *flag = done;
                    stats.rendered += done as usize;
                }
                Err(e) => {
                    log::warn!("Render target '{}': {e}", preview.label());
                    stats.failed += 1;
                }
            }
        }

        let advanced = self.advanced.iter().copied();
        for (preview, _) in self.previews.iter_mut().zip(advanced).filter(|(_, a)| *a) {
            match preview.composite() {
                Ok(done) => stats.composited += done as usize,
                Err(e) => {
                    log::warn!("Render target '{}': {e}", preview.label());
                    stats.failed += 1;
                }
            }
        }

        stats
    }

    /// Route a context-lost signal to one target.
    pub fn context_lost(&mut self, id: TargetId) -> Result<(), RenderError> {
        let count = self.previews.len();
        self.target_mut(id)
            .ok_or(RenderError::InvalidCandidateIndex {
                index: preview_index(id),
                count,
            })?
            .handle_context_lost()
    }

    /// Route a context-restored signal to one target.
    pub fn context_restored(&mut self, id: TargetId) -> Result<(), RenderError> {
        let count = self.previews.len();
        let backend = &mut self.backend;
        let target = match id {
            TargetId::Primary => &mut self.primary,
            TargetId::Preview(i) => self
                .previews
                .get_mut(i)
                .ok_or(RenderError::InvalidCandidateIndex { index: i, count })?,
        };
        target.handle_context_restored(backend)
    }

    /// Try to restore every restorable target whose context is lost.
    /// Returns how many came back.
    pub fn restore_lost_targets(&mut self) -> usize {
        let backend = &mut self.backend;
        let mut restored = 0;
        for target in std::iter::once(&mut self.primary).chain(self.previews.iter_mut()) {
            if target.state() != TargetState::ContextLost || !target.restorable() {
                continue;
            }
            match target.handle_context_restored(backend) {
                Ok(()) => restored += 1,
                Err(e) => log::warn!("Render target '{}' not restored: {e}", target.label()),
            }
        }
        restored
    }

    pub fn destroy(&mut self) {
        for target in self.targets_mut() {
            target.destroy();
        }
    }

    pub fn transform(&self) -> Transform {
        Transform {
            model: model_matrix(self.scale, self.translation),
            view: self.view,
            projection: self.projection,
        }
    }

    pub fn target(&self, id: TargetId) -> Option<&RenderTarget<B>> {
        match id {
            TargetId::Primary => Some(&self.primary),
            TargetId::Preview(i) => self.previews.get(i),
        }
    }

    pub fn target_mut(&mut self, id: TargetId) -> Option<&mut RenderTarget<B>> {
        match id {
            TargetId::Primary => Some(&mut self.primary),
            TargetId::Preview(i) => self.previews.get_mut(i),
        }
    }

    pub fn primary(&self) -> &RenderTarget<B> {
        &self.primary
    }

    pub fn previews(&self) -> &[RenderTarget<B>] {
        &self.previews
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Generation of the most recently issued selection ticket.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

fn preview_index(id: TargetId) -> usize {
    match id {
        TargetId::Primary => 0,
        TargetId::Preview(i) => i,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::null::NullBackend;
    use volsynth_core::{ControlPoint, Dimensions, Rgba8, TransferFunction};

    fn pipeline() -> RenderingPipeline<NullBackend> {
        RenderingPipeline::new(NullBackend::new(), PipelineConfig::default()).expect("pipeline")
    }

    fn candidate(shade: u8) -> TransferFunction {
        TransferFunction::new(vec![
            ControlPoint::new(0, Rgba8::new(0, 0, 0, 0)),
            ControlPoint::new(255, Rgba8::new(shade, shade, shade, 255)),
        ])
    }

    fn candidate_set() -> SynthesisResponse {
        SynthesisResponse::new((0..8).map(|i| candidate(i * 30)).collect())
    }

    fn loaded() -> RenderingPipeline<NullBackend> {
        let mut p = pipeline();
        p.set_volume(VolumeTexels::zeroed(Dimensions::new(4, 4, 4)))
            .expect("volume");
        p.apply_candidates(&candidate_set()).expect("candidates");
        p
    }

    #[test]
    fn test_builds_all_targets() {
        let p = pipeline();
        assert_eq!(p.previews().len(), 8);
        assert_eq!(p.backend().contexts_created(), 9);
        assert_eq!(p.primary().resolution(), 512);
        assert!(p.previews().iter().all(|t| t.resolution() == 128 && t.is_ready()));
    }

    #[test]
    fn test_candidates_bound_per_preview() {
        let p = loaded();
        for (i, preview) in p.previews().iter().enumerate() {
            let ramp = preview.ramp().expect("ramp");
            let top = ramp.color_at(255).expect("texel");
            assert_eq!(top.r, i as u8 * 30);
        }
    }

    #[test]
    fn test_wrong_candidate_count() {
        let mut p = pipeline();
        let response = SynthesisResponse::new(vec![candidate(1); 3]);
        assert!(matches!(
            p.apply_candidates(&response),
            Err(RenderError::CandidateCount {
                expected: 8,
                actual: 3
            })
        ));
    }

    #[test]
    fn test_malformed_candidate_keeps_previous_ramp() {
        let mut p = loaded();
        let before = p.previews()[2].ramp().cloned();
        let mut response = candidate_set();
        response.transfer_functions[2] = TransferFunction::new(vec![
            ControlPoint::new(200, Rgba8::new(1, 1, 1, 1)),
            ControlPoint::new(10, Rgba8::new(2, 2, 2, 2)),
        ]);
        response.transfer_functions[3] = candidate(77);
        assert!(p.apply_candidates(&response).expect("applied"));
        assert_eq!(p.previews()[2].ramp().cloned(), before);
        assert_eq!(
            p.previews()[3].ramp().and_then(|r| r.color_at(255)).map(|c| c.r),
            Some(77)
        );
    }

    #[test]
    fn test_empty_response_keeps_candidates() {
        let mut p = loaded();
        let before: Vec<_> = p.previews().iter().map(|t| t.ramp().cloned()).collect();
        assert!(!p.apply_candidates(&SynthesisResponse::empty()).expect("no-op"));
        let after: Vec<_> = p.previews().iter().map(|t| t.ramp().cloned()).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_tick_renders_in_order() {
        let mut p = loaded();
        // primary has no ramp yet
        let stats = p.tick();
        assert_eq!(
            stats,
            FrameStats {
                rendered: 8,
                composited: 8,
                failed: 0
            }
        );
        for preview in p.previews() {
            assert_eq!(preview.frames(), 1);
            assert_eq!(preview.context().map(|c| c.presents()), Some(1));
        }
    }

    #[test]
    fn test_tick_reuses_advance_buffer() {
        let mut p = loaded();
        p.tick();
        let capacity = p.advanced.capacity();
        let buffer = p.advanced.as_ptr();

        // a lost preview is skipped for compositing without reallocating
        p.target_mut(TargetId::Preview(4))
            .and_then(|t| t.context_mut())
            .expect("context")
            .simulate_loss();
        for _ in 0..3 {
            let stats = p.tick();
            assert_eq!(stats.rendered, 7);
            assert_eq!(stats.composited, 7);
        }
        assert_eq!(p.advanced.capacity(), capacity);
        assert_eq!(p.advanced.as_ptr(), buffer);
        assert_eq!(p.advanced, vec![true, true, true, true, false, true, true, true]);
    }

    #[test]
    fn test_selection_adopts_clicked_ramp() {
        let mut p = loaded();
        let clicked = p.previews()[5].ramp().cloned();
        let ticket = p.begin_selection(5).expect("ticket");
        let adapted = SynthesisResponse::new((0..8).map(|i| candidate(200 + i)).collect());
        assert!(p.complete_selection(ticket, Ok(adapted)).expect("applied"));

        assert_eq!(p.primary().ramp().cloned(), clicked);
        assert_eq!(
            p.previews()[0].ramp().and_then(|r| r.color_at(255)).map(|c| c.r),
            Some(200)
        );
    }

    #[test]
    fn test_failed_selection_keeps_candidates_but_adopts() {
        let mut p = loaded();
        let before: Vec<_> = p.previews().iter().map(|t| t.ramp().cloned()).collect();
        let ticket = p.begin_selection(1).expect("ticket");
        let result = p.complete_selection(ticket, Err(ServiceError::Transport("down".into())));
        assert!(matches!(result, Err(RenderError::Synthesis(_))));
        let after: Vec<_> = p.previews().iter().map(|t| t.ramp().cloned()).collect();
        assert_eq!(before, after);
        assert_eq!(p.primary().ramp().cloned(), before[1]);
    }

    #[test]
    fn test_stale_ticket_dropped() {
        let mut p = loaded();
        let first = p.begin_selection(1).expect("ticket");
        let second = p.begin_selection(6).expect("ticket");
        let clicked = p.previews()[6].ramp().cloned();

        let late = SynthesisResponse::new(vec![candidate(9); 8]);
        assert!(!p.complete_selection(first, Ok(late)).expect("stale"));
        assert!(p.primary().ramp().is_none());

        assert!(p.complete_selection(second, Ok(candidate_set())).expect("applied"));
        assert_eq!(p.primary().ramp().cloned(), clicked);
    }

    #[test]
    fn test_invalid_selection_index() {
        let mut p = pipeline();
        assert!(matches!(
            p.begin_selection(8),
            Err(RenderError::InvalidCandidateIndex { index: 8, count: 8 })
        ));
        assert_eq!(p.generation(), 0);
    }

    #[test]
    fn test_transform_broadcast_marks_dirty() {
        let mut p = loaded();
        p.tick();
        p.set_scale(Vec3::new(1.0, 2.0, 0.5));
        assert!(p.primary().is_dirty());
        assert!(p.previews().iter().all(|t| t.is_dirty()));
        let expected = model_matrix(Vec3::new(1.0, 2.0, 0.5), Vec3::ZERO);
        assert_eq!(p.previews()[4].transform().model, expected);

        p.tick();
        assert!(p.previews().iter().all(|t| !t.is_dirty() && t.frames() == 1));
    }

    #[test]
    fn test_resolution_and_filter() {
        let mut p = loaded();
        p.set_resolution(300);
        assert_eq!(p.primary().resolution(), 300);
        assert!(p.previews().iter().all(|t| t.resolution() == 75));

        p.set_filter(Filter::Nearest).expect("filter");
        assert!(p
            .previews()
            .iter()
            .all(|t| t.renderer().and_then(|r| r.volume_filter()) == Some(Filter::Nearest)));
    }

    #[test]
    fn test_per_target_context_loss() {
        let mut p = loaded();
        if let Some(ctx) = p
            .target_mut(TargetId::Preview(3))
            .and_then(|t| t.context_mut())
        {
            ctx.simulate_loss();
        }

        let stats = p.tick();
        assert_eq!(stats.failed, 0);
        assert_eq!(stats.rendered, 7);
        assert_eq!(p.previews()[3].state(), TargetState::ContextLost);
        assert!(p.previews()[2].is_ready());

        assert_eq!(p.restore_lost_targets(), 1);
        assert!(p.previews()[3].is_ready());
        assert!(p.previews()[3].ramp().is_some());
        assert_eq!(p.tick().rendered, 8);
    }

    #[test]
    fn test_explicit_loss_signals() {
        let mut p = loaded();
        p.context_lost(TargetId::Primary).expect("restorable");
        assert_eq!(p.primary().state(), TargetState::ContextLost);
        p.context_restored(TargetId::Primary).expect("restored");
        assert!(p.primary().is_ready());
        assert!(p.context_lost(TargetId::Preview(12)).is_err());
    }

    #[test]
    fn test_fatal_loss_surfaces() {
        let config = PipelineConfig {
            restorable: false,
            ..PipelineConfig::default()
        };
        let mut p = RenderingPipeline::new(NullBackend::new(), config).expect("pipeline");
        let result = p.context_lost(TargetId::Preview(0));
        assert!(matches!(result, Err(RenderError::ContextLostFatal(_))));
        assert_eq!(p.restore_lost_targets(), 0);
    }

    #[test]
    fn test_no_context_available() {
        let mut backend = NullBackend::new();
        backend.fail_contexts = true;
        let result = RenderingPipeline::new(backend, PipelineConfig::default());
        assert!(matches!(result, Err(RenderError::ContextUnavailable(_))));
    }
}
