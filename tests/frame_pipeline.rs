//! One frame through the full pass chain on the recording backend

use glam::Vec3;
use pbr_ibl_renderer::backend::{
    BindGroupEntry, BindGroupHandle, CompareFunction, RecordedCommand, RecordedPass, RecordingBackend,
    TextureViewHandle,
};
use pbr_ibl_renderer::ibl::capture::UNIFORM_SLOT_STRIDE;
use pbr_ibl_renderer::pipeline::{ColorBloomPass, CompositePass, GaussianBlurPass, ShadowPass};
use pbr_ibl_renderer::resources::{HdrImage, Model};
use pbr_ibl_renderer::scene::TransparentSortPolicy;
use pbr_ibl_renderer::{App, RendererConfig};
use rstest::rstest;

fn app_with(backend: RecordingBackend, config: RendererConfig) -> App<RecordingBackend> {
    App::with_backend(backend, config, &HdrImage::uniform(64, 32, Vec3::ONE)).unwrap()
}

fn app() -> App<RecordingBackend> {
    app_with(RecordingBackend::default(), RendererConfig::default())
}

/// Render passes recorded by one frame
fn render_one(app: &mut App<RecordingBackend>) -> Vec<RecordedPass> {
    app.backend_mut().clear_commands();
    app.render_frame(0.016).unwrap();
    app.backend().render_passes()
}

fn labelled<'a>(passes: &'a [RecordedPass], name: &str) -> Vec<&'a RecordedPass> {
    passes.iter().filter(|pass| pass.label.as_deref() == Some(name)).collect()
}

fn texture_views(backend: &RecordingBackend, group: BindGroupHandle) -> Vec<TextureViewHandle> {
    backend
        .bind_group_entries(group)
        .unwrap()
        .iter()
        .filter_map(|(_, entry)| match entry {
            BindGroupEntry::Texture(view) => Some(*view),
            _ => None,
        })
        .collect()
}

fn viewport(pass: &RecordedPass) -> Option<(u32, u32)> {
    pass.commands.iter().find_map(|command| match command {
        RecordedCommand::SetViewport { width, height } => Some((*width as u32, *height as u32)),
        _ => None,
    })
}

#[test]
fn test_graph_orders_all_six_passes() {
    let app = app();
    assert_eq!(
        app.frame_graph().pass_names(),
        vec!["Omni Shadow", "Color/Bloom", "Resolve Color", "Resolve Bloom", "Gaussian Blur", "Composite"]
    );
}

#[test]
fn test_frame_is_bracketed_by_begin_and_end() {
    let mut app = app();
    render_one(&mut app);
    let commands = app.backend().commands();
    let begin = commands.iter().position(|c| c == &RecordedCommand::BeginFrame).unwrap();
    let end = commands.iter().position(|c| c == &RecordedCommand::EndFrame).unwrap();
    let first_pass = commands
        .iter()
        .position(|c| matches!(c, RecordedCommand::BeginRenderPass { .. }))
        .unwrap();
    assert!(begin < first_pass);
    assert_eq!(end, commands.len() - 1);
}

#[test]
fn test_recorded_passes_follow_graph_order() {
    let mut app = app();
    let passes = render_one(&mut app);
    let mut labels: Vec<String> = passes.into_iter().filter_map(|pass| pass.label).collect();
    labels.dedup();
    assert_eq!(
        labels,
        vec!["Omni Shadow", "Color/Bloom", "Resolve Color", "Resolve Bloom", "Gaussian Blur", "Composite"]
    );
}

#[rstest]
#[case::multiview(true, vec!["Omni Shadow"])]
#[case::per_face(
    false,
    vec![
        "Omni Shadow PositiveX",
        "Omni Shadow NegativeX",
        "Omni Shadow PositiveY",
        "Omni Shadow NegativeY",
        "Omni Shadow PositiveZ",
        "Omni Shadow NegativeZ",
    ]
)]
fn test_shadow_pass_per_backend_features(#[case] multiview: bool, #[case] expected: Vec<&str>) {
    let mut app = app_with(RecordingBackend::default().with_multiview(multiview), RendererConfig::default());
    let passes = render_one(&mut app);
    let shadow: Vec<&RecordedPass> = passes
        .iter()
        .filter(|pass| pass.label.as_deref().is_some_and(|label| label.starts_with(ShadowPass::NAME)))
        .collect();

    let labels: Vec<&str> = shadow.iter().filter_map(|pass| pass.label.as_deref()).collect();
    assert_eq!(labels, expected);

    let casters = app.gpu_scene().object_count();
    for pass in shadow {
        assert!(pass.color.is_empty());
        assert!(pass.depth.is_some());
        assert_eq!(pass.bind_groups_at(1).len(), casters);
        assert_eq!(viewport(pass), Some((1024, 1024)));
    }
}

#[test]
fn test_scene_pass_targets_msaa_color_and_bloom() {
    let mut app = app();
    let passes = render_one(&mut app);
    let scene = labelled(&passes, ColorBloomPass::NAME);
    assert_eq!(scene.len(), 1);

    let target = &app.pipeline().scene_target;
    assert_eq!(target.sample_count(), 4);
    assert_eq!(scene[0].color, vec![target.color_view(0).unwrap(), target.color_view(1).unwrap()]);
    assert_eq!(scene[0].depth, target.depth_view());
}

#[test]
fn test_scene_pass_draw_sequence() {
    let mut app = app();
    let passes = render_one(&mut app);
    let scene = labelled(&passes, ColorBloomPass::NAME)[0].clone();
    let backend = app.backend();

    let lights = app.gpu_scene().light_count();
    let pipelines = scene.pipelines();
    // opaque, marker + outline per light, skybox, windows
    assert_eq!(pipelines.len(), 1 + 2 * lights + 2);

    let depth = |index: usize| backend.pipeline(pipelines[index]).unwrap().depth_stencil.clone().unwrap();

    let opaque = depth(0);
    assert_eq!(opaque.depth_compare, CompareFunction::Less);
    assert!(opaque.depth_write_enabled);
    assert_eq!(opaque.stencil.write_mask, 0);

    for light in 0..lights {
        let marker = depth(1 + 2 * light);
        assert_eq!(marker.stencil.front.compare, CompareFunction::Always);
        assert_eq!(marker.stencil.write_mask, 0xFF);

        let outline = depth(2 + 2 * light);
        assert_eq!(outline.stencil.front.compare, CompareFunction::NotEqual);
        assert_eq!(outline.stencil.write_mask, 0);
        assert_eq!(outline.depth_compare, CompareFunction::Always);
        assert!(!outline.depth_write_enabled);
    }

    let skybox = depth(1 + 2 * lights);
    assert_eq!(skybox.depth_compare, CompareFunction::LessEqual);
    assert!(!skybox.depth_write_enabled);

    let windows = backend.pipeline(pipelines[2 + 2 * lights]).unwrap();
    assert!(windows.color_targets[0].blend.is_some());
    assert!(!windows.depth_stencil.as_ref().unwrap().depth_write_enabled);

    let references: Vec<u32> = scene
        .commands
        .iter()
        .filter_map(|command| match command {
            RecordedCommand::SetStencilReference(reference) => Some(*reference),
            _ => None,
        })
        .collect();
    assert_eq!(references, vec![1; 2 * lights]);
}

#[test]
fn test_windows_drawn_last_in_slot_order() {
    let mut app = app();
    let passes = render_one(&mut app);
    let scene = labelled(&passes, ColorBloomPass::NAME)[0].clone();

    let panes = app.scene().transparent.len();
    let slots = scene.bind_groups_at(1);
    let expected: Vec<BindGroupHandle> = (0..panes).map(|k| app.gpu_scene().window_slot(k).unwrap()).collect();
    assert_eq!(slots[slots.len() - panes..], expected[..]);

    let last = scene.commands.last().unwrap();
    assert!(matches!(last, RecordedCommand::DrawIndexed { .. }));
}

#[test]
fn test_each_scene_object_is_one_single_instance_draw() {
    let mut app = app();
    let passes = render_one(&mut app);
    let scene = labelled(&passes, ColorBloomPass::NAME)[0].clone();
    let gpu_scene = app.gpu_scene();

    let submeshes = |count: usize, model: &Model| count * model.submeshes.len();
    let opaque: usize = gpu_scene.opaque().map(|(_, model)| model.submeshes.len()).sum();
    let expected = opaque
        + submeshes(2 * gpu_scene.light_count(), &gpu_scene.marker)
        + 1
        + submeshes(app.scene().transparent.len(), &gpu_scene.window);

    let instances: Vec<_> = scene
        .commands
        .iter()
        .filter_map(|command| match command {
            RecordedCommand::DrawIndexed { instances, .. } => Some(instances.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(instances.len(), expected);
    assert!(instances.iter().all(|range| *range == (0..1)));
}

fn window_positions(app: &App<RecordingBackend>) -> Vec<Vec3> {
    let gpu = app.gpu_scene();
    let contents = app.backend().buffer_contents(gpu.uniform_buffer()).unwrap();
    let first = gpu.object_count() + gpu.light_count() * 2;
    (0..app.scene().transparent.len())
        .map(|k| {
            // Translation column of the model matrix
            let base = (first + k) * UNIFORM_SLOT_STRIDE as usize + 48;
            let read = |i: usize| f32::from_le_bytes(contents[base + i * 4..base + i * 4 + 4].try_into().unwrap());
            Vec3::new(read(0), read(1), read(2))
        })
        .collect()
}

fn is_back_to_front(positions: &[Vec3], eye: Vec3) -> bool {
    positions
        .windows(2)
        .all(|pair| pair[0].distance(eye) >= pair[1].distance(eye))
}

#[test]
fn test_windows_uploaded_back_to_front() {
    let app = app();
    let positions = window_positions(&app);
    assert_eq!(positions.len(), 4);
    assert!(is_back_to_front(&positions, app.scene().camera.position));
}

#[rstest]
#[case::once_at_load(TransparentSortPolicy::OnceAtLoad, false)]
#[case::per_frame(TransparentSortPolicy::PerFrame, true)]
fn test_window_order_after_moving(#[case] policy: TransparentSortPolicy, #[case] resorted: bool) {
    let config = RendererConfig {
        transparent_sort: policy,
        ..RendererConfig::default()
    };
    let mut app = app_with(RecordingBackend::default(), config);
    let initial = window_positions(&app);

    // Walk four units forward, past most of the panes
    app.input_mut().forward = true;
    app.render_frame(1.6).unwrap();
    app.input_mut().forward = false;

    let eye = app.scene().camera.position;
    let after = window_positions(&app);
    assert_eq!(after == initial, !resorted);
    assert_eq!(is_back_to_front(&after, eye), resorted);
}

#[test]
fn test_resolve_passes_only_resolve() {
    let mut app = app();
    let passes = render_one(&mut app);
    let pipeline = app.pipeline();

    let color = labelled(&passes, "Resolve Color");
    assert_eq!(color.len(), 1);
    assert_eq!(color[0].color[0], pipeline.scene_target.color_view(0).unwrap());
    assert_eq!(color[0].resolve, vec![pipeline.resolved_color.color_view(0)]);
    assert_eq!(color[0].draw_count(), 0);

    let bloom = labelled(&passes, "Resolve Bloom");
    assert_eq!(bloom.len(), 1);
    assert_eq!(bloom[0].color[0], pipeline.scene_target.color_view(1).unwrap());
    assert_eq!(bloom[0].resolve, vec![pipeline.resolved_bloom.color_view(0)]);
    assert_eq!(bloom[0].draw_count(), 0);
}

#[test]
fn test_blur_ping_pongs_from_resolved_bloom() {
    let mut app = app();
    let passes = render_one(&mut app);
    let backend = app.backend();
    let pipeline = app.pipeline();
    let ping_pong = [pipeline.ping_pong.view(0).unwrap(), pipeline.ping_pong.view(1).unwrap()];

    let blur = labelled(&passes, GaussianBlurPass::NAME);
    assert_eq!(blur.len(), 10);

    for (i, pass) in blur.iter().enumerate() {
        let write = if i % 2 == 0 { 1 } else { 0 };
        assert_eq!(pass.color, vec![ping_pong[write]]);
        assert_eq!(pass.draw_count(), 1);

        let source = texture_views(backend, pass.bind_groups_at(0)[0]);
        let expected = if i == 0 {
            pipeline.resolved_bloom.color_view(0).unwrap()
        } else {
            ping_pong[1 - write]
        };
        assert_eq!(source, vec![expected]);
    }
}

#[rstest]
#[case::ten(10, Some(0))]
#[case::odd(3, Some(1))]
#[case::none(0, None)]
fn test_composite_reads_final_blur_target(#[case] iterations: u32, #[case] result: Option<usize>) {
    let config = RendererConfig {
        blur_iterations: iterations,
        ..RendererConfig::default()
    };
    let mut app = app_with(RecordingBackend::default(), config);
    let passes = render_one(&mut app);
    let backend = app.backend();
    let pipeline = app.pipeline();

    assert_eq!(labelled(&passes, GaussianBlurPass::NAME).len(), iterations as usize);

    let composite = labelled(&passes, CompositePass::NAME);
    assert_eq!(composite.len(), 1);
    assert_eq!(composite[0].draw_count(), 1);
    assert!(composite[0].depth.is_none());

    let bloom = match result {
        Some(index) => pipeline.ping_pong.view(index).unwrap(),
        None => pipeline.resolved_bloom.color_view(0).unwrap(),
    };
    let views = texture_views(backend, composite[0].bind_groups_at(0)[0]);
    assert_eq!(views, vec![pipeline.resolved_color.color_view(0).unwrap(), bloom]);
}

#[test]
fn test_resize_reallocates_window_targets() {
    let mut app = app();
    let before = app.pipeline().resolved_color.color_view(0);

    app.resize(1920, 1080).unwrap();

    let pipeline = app.pipeline();
    assert_eq!(pipeline.surface_size, (1920, 1080));
    assert_eq!(pipeline.scene_target.size(), (1920, 1080));
    assert_eq!(pipeline.resolved_color.size(), (1920, 1080));
    assert_eq!(pipeline.resolved_bloom.size(), (1920, 1080));
    assert_eq!(pipeline.ping_pong.size(), (1920, 1080));
    assert_ne!(pipeline.resolved_color.color_view(0), before);
    assert!(pipeline.validate().is_ok());

    let passes = render_one(&mut app);
    let pipeline = app.pipeline();
    for pass in labelled(&passes, GaussianBlurPass::NAME) {
        assert_eq!(viewport(pass), Some((1920, 1080)));
    }

    let composite = labelled(&passes, CompositePass::NAME)[0];
    let views = texture_views(app.backend(), composite.bind_groups_at(0)[0]);
    assert_eq!(views[0], pipeline.resolved_color.color_view(0).unwrap());
    assert_eq!(views[1], pipeline.ping_pong.view(0).unwrap());
}

#[test]
fn test_zero_resize_is_ignored() {
    let mut app = app();
    app.resize(0, 600).unwrap();
    assert_eq!(app.pipeline().surface_size, (1280, 720));
    assert_eq!(app.pipeline().scene_target.size(), (1280, 720));
}

#[test]
fn test_precompute_runs_before_first_frame() {
    let app = app();
    let commands = app.backend().commands();
    let precompute = commands
        .iter()
        .position(|c| c == &RecordedCommand::BeginCommands("IBL Precompute".to_string()))
        .unwrap();
    assert!(commands.iter().skip(precompute).any(|c| c == &RecordedCommand::SubmitCommands));
    assert!(!commands.contains(&RecordedCommand::BeginFrame));
}
