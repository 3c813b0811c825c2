//! End-to-end selection round on the headless backend: load a volume, start
//! a synthesis session in-process, pick a preview and keep rendering.

use volsynth_core::Dimensions;
use volsynth_render::{NullBackend, PipelineConfig, RenderingPipeline, TargetId, TargetState};
use volsynth_synth::{SynthesisConfig, SynthesisService};
use volsynth_volume::{LoadEvent, MemoryReader};

fn two_material_volume() -> MemoryReader {
    let dims = Dimensions::new(8, 8, 8);
    let data: Vec<u8> = (0..dims.voxel_count())
        .map(|i| if i < dims.voxel_count() / 2 { 50 } else { 200 })
        .collect();
    MemoryReader::from_u8_volume("ct", dims, &data, 3)
}

fn pipeline() -> RenderingPipeline<NullBackend> {
    RenderingPipeline::new(NullBackend::new(), PipelineConfig::default()).expect("pipeline")
}

#[test]
fn test_load_then_select_round() {
    let mut pipeline = pipeline();
    let mut service = SynthesisService::new(SynthesisConfig::default().with_seed(11));
    let mut reader = two_material_volume();
    let (tx, rx) = crossbeam_channel::unbounded();

    let clusters = pollster::block_on(pipeline.load_volume(
        &mut reader,
        "ct",
        &mut service,
        Some(&tx),
    ))
    .expect("load");
    drop(tx);

    // 512 samples give ceil(log2 512) + 1 equal-count bins
    assert_eq!(clusters, 10);
    assert!(service.has_session());

    let events: Vec<LoadEvent> = rx.iter().collect();
    assert!(matches!(
        events.last(),
        Some(LoadEvent::Complete { modality }) if modality == "ct"
    ));
    let progress: Vec<f32> = events
        .iter()
        .filter_map(|e| match e {
            LoadEvent::Progress(p) => Some(*p),
            LoadEvent::Complete { .. } => None,
        })
        .collect();
    assert_eq!(progress.len(), 3);
    assert!((progress[2] - 1.0).abs() < 1e-6);
    assert!(progress.windows(2).all(|w| w[0] < w[1]));

    for preview in pipeline.previews() {
        let ramp = preview.ramp().expect("every preview gets a ramp");
        assert_eq!(ramp.len(), 256);
    }
    assert_eq!(pipeline.primary().ramp(), pipeline.previews()[0].ramp());

    let clicked = pipeline.previews()[3].ramp().cloned();
    let applied = pollster::block_on(pipeline.select_preview(3, &mut service)).expect("select");
    assert!(applied);
    assert_eq!(pipeline.primary().ramp().cloned(), clicked);

    let session = service.session().expect("session");
    assert_eq!(session.round(), 1);
    let rates = session.rates();
    assert!((rates.saturation - 30.0 * 0.8).abs() < 1e-9);
    assert!((rates.value - 4.0 * 0.8).abs() < 1e-9);
    assert!((rates.hue - 2.0 / 3.0 * 0.8).abs() < 1e-9);

    let stats = pipeline.tick();
    assert_eq!(stats.rendered, 9);
    assert_eq!(stats.failed, 0);
}

#[test]
fn test_selection_without_session_keeps_previews() {
    let mut pipeline = pipeline();
    let mut service = SynthesisService::new(SynthesisConfig::default().with_seed(3));

    // No volume loaded: the service answers with an empty candidate set.
    let applied = pollster::block_on(pipeline.select_preview(0, &mut service)).expect("select");
    assert!(!applied);
    assert!(pipeline.previews().iter().all(|p| p.ramp().is_none()));
    assert!(pipeline.primary().ramp().is_none());
}

#[test]
fn test_context_loss_mid_session_recovers() {
    let mut pipeline = pipeline();
    let mut service = SynthesisService::new(SynthesisConfig::default().with_seed(5));
    let mut reader = two_material_volume();
    pollster::block_on(pipeline.load_volume(&mut reader, "ct", &mut service, None))
        .expect("load");

    pipeline
        .target_mut(TargetId::Preview(2))
        .and_then(|t| t.context_mut())
        .expect("context")
        .simulate_loss();

    let stats = pipeline.tick();
    assert_eq!(stats.rendered, 8);
    assert_eq!(
        pipeline.target(TargetId::Preview(2)).map(|t| t.state()),
        Some(TargetState::ContextLost)
    );

    assert_eq!(pipeline.restore_lost_targets(), 1);
    let preview = pipeline.target(TargetId::Preview(2)).expect("preview");
    assert_eq!(preview.state(), TargetState::Ready);
    assert!(preview.ramp().is_some());
    assert_eq!(pipeline.tick().rendered, 9);
}
