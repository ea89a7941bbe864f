//! IBL precompute submission, checked against the recorded command stream

use glam::Vec3;
use pbr_ibl_renderer::backend::{BindGroupEntry, RecordedCommand, RecordedPass, RecordingBackend};
use pbr_ibl_renderer::ibl::{
    run_precompute, BrdfLutPass, EquirectPass, IrradiancePass, MipChain, PrefilterPass,
};
use pbr_ibl_renderer::pipeline::{PipelineContext, RenderSettings};
use pbr_ibl_renderer::resources::HdrImage;
use pbr_ibl_renderer::scene::Camera;
use rstest::rstest;

fn precomputed() -> (RecordingBackend, PipelineContext) {
    let mut backend = RecordingBackend::default();
    let mut ctx =
        PipelineContext::new(&mut backend, RenderSettings::default(), &Camera::default(), Vec3::new(0.0, 2.0, 0.0))
            .unwrap();
    backend.clear_commands();
    run_precompute(&mut backend, &mut ctx, &HdrImage::uniform(64, 32, Vec3::splat(2.0))).unwrap();
    (backend, ctx)
}

fn passes_of(backend: &RecordingBackend, name: &str) -> Vec<RecordedPass> {
    backend
        .render_passes()
        .into_iter()
        .filter(|pass| pass.label.as_deref().is_some_and(|label| label.starts_with(name)))
        .collect()
}

fn viewport(pass: &RecordedPass) -> Option<(u32, u32)> {
    pass.commands.iter().find_map(|command| match command {
        RecordedCommand::SetViewport { width, height } => Some((*width as u32, *height as u32)),
        _ => None,
    })
}

fn read_f32(bytes: &[u8], offset: usize) -> f32 {
    f32::from_le_bytes([bytes[offset], bytes[offset + 1], bytes[offset + 2], bytes[offset + 3]])
}

#[test]
fn test_precompute_is_one_submission() {
    let (backend, _) = precomputed();
    let commands = backend.commands();

    let begins: Vec<_> = commands
        .iter()
        .enumerate()
        .filter(|(_, c)| matches!(c, RecordedCommand::BeginCommands(_)))
        .collect();
    assert_eq!(begins.len(), 1);
    assert_eq!(begins[0].1, &RecordedCommand::BeginCommands("IBL Precompute".to_string()));
    assert_eq!(commands.last(), Some(&RecordedCommand::SubmitCommands));

    let first_pass = commands
        .iter()
        .position(|c| matches!(c, RecordedCommand::BeginRenderPass { .. }))
        .unwrap();
    assert!(begins[0].0 < first_pass);
}

#[test]
fn test_stages_run_in_dependency_order() {
    let (backend, _) = precomputed();
    let labels: Vec<String> = backend.render_passes().into_iter().filter_map(|pass| pass.label).collect();

    let first = |name: &str| labels.iter().position(|label| label.starts_with(name)).unwrap();
    let last = |name: &str| labels.iter().rposition(|label| label.starts_with(name)).unwrap();

    assert!(last(EquirectPass::NAME) < first(IrradiancePass::NAME));
    assert!(last(IrradiancePass::NAME) < first(PrefilterPass::NAME));
    assert!(last(PrefilterPass::NAME) < first(BrdfLutPass::NAME));
}

#[test]
fn test_environment_mips_generated_after_capture() {
    let (backend, ctx) = precomputed();
    let commands = backend.commands();
    let environment = ctx.ibl.environment.texture();

    let mips = commands
        .iter()
        .position(|c| c == &RecordedCommand::GenerateMipmaps(environment))
        .unwrap();
    let last_capture = commands
        .iter()
        .rposition(|c| {
            matches!(c, RecordedCommand::BeginRenderPass { label: Some(label), .. }
                if label.starts_with(EquirectPass::NAME))
        })
        .unwrap();
    assert!(last_capture < mips);
}

#[rstest]
#[case::environment(EquirectPass::NAME, 1)]
#[case::irradiance(IrradiancePass::NAME, 1)]
#[case::prefilter(PrefilterPass::NAME, 5)]
fn test_faces_captured_in_layer_order(#[case] name: &str, #[case] mips: u32) {
    let (backend, _) = precomputed();
    let passes = passes_of(&backend, name);
    assert_eq!(passes.len(), 6 * mips as usize);

    for (mip, chunk) in passes.chunks(6).enumerate() {
        let layers: Vec<(u32, u32)> = chunk
            .iter()
            .map(|pass| {
                let (_, view) = backend.view(pass.color[0]).unwrap();
                (view.base_array_layer, view.base_mip_level)
            })
            .collect();
        let expected: Vec<(u32, u32)> = (0..6).map(|layer| (layer, mip as u32)).collect();
        assert_eq!(layers, expected);
    }
}

#[test]
fn test_prefilter_mips_halve_in_size() {
    let (backend, _) = precomputed();
    let sizes: Vec<(u32, u32)> = passes_of(&backend, PrefilterPass::NAME)
        .iter()
        .step_by(6)
        .map(|pass| viewport(pass).unwrap())
        .collect();
    assert_eq!(sizes, vec![(128, 128), (64, 64), (32, 32), (16, 16), (8, 8)]);
}

#[test]
fn test_prefilter_roughness_per_mip() {
    let (backend, _) = precomputed();
    let chain = MipChain::new(128, 5);

    for (index, pass) in passes_of(&backend, PrefilterPass::NAME).iter().enumerate() {
        let mip = index as u32 / 6;
        let uniforms = pass.bind_groups_at(0);
        let entries = backend.bind_group_entries(uniforms[0]).unwrap();
        let (buffer, offset) = entries
            .iter()
            .find_map(|(_, entry)| match entry {
                BindGroupEntry::Buffer { buffer, offset, .. } => Some((*buffer, *offset)),
                _ => None,
            })
            .unwrap();

        let contents = backend.buffer_contents(buffer).unwrap();
        let roughness = read_f32(contents, offset as usize + 64);
        assert!((roughness - chain.roughness(mip)).abs() < 1e-6, "mip {}: {}", mip, roughness);
        assert!((roughness - mip as f32 / 4.0).abs() < 1e-6);
    }
}

#[test]
fn test_scratch_depth_reallocated_before_size_change() {
    let (backend, ctx) = precomputed();

    let mut current: Option<(u32, u32)> = None;
    let mut created_since_pass = false;
    let mut checked = 0;
    let mut pass_start = None;

    for (index, command) in backend.commands().iter().enumerate() {
        match command {
            RecordedCommand::CreateTexture(_) => created_since_pass = true,
            RecordedCommand::BeginRenderPass { .. } => pass_start = Some(index),
            RecordedCommand::SetViewport { width, height } if pass_start.is_some() => {
                let size = (*width as u32, *height as u32);
                if current.is_some_and(|previous| previous != size) {
                    assert!(created_since_pass, "no reallocation before the {:?} pass", size);
                    checked += 1;
                }
                current = Some(size);
                created_since_pass = false;
                pass_start = None;
            }
            _ => {}
        }
    }

    // 512 -> 32 -> 128 -> 64 -> 32 -> 16 -> 8 -> 512
    assert_eq!(checked, 7);
    assert_eq!(ctx.scratch_depth.resize_count(), 7);
    assert_eq!(ctx.scratch_depth.size(), (512, 512));
}

#[test]
fn test_every_capture_pass_uses_live_scratch_depth() {
    let (backend, ctx) = precomputed();
    let passes = backend.render_passes();
    assert!(!passes.is_empty());

    for pass in &passes {
        let depth = pass.depth.unwrap();
        // Views of the earlier scratch sizes were released when it was resized.
        if let Some((texture, _)) = backend.view(depth) {
            assert_eq!(*texture, ctx.scratch_depth.texture());
        }
    }

    let final_pass = passes.last().unwrap();
    assert_eq!(final_pass.label.as_deref(), Some(BrdfLutPass::NAME));
    assert_eq!(final_pass.depth, Some(ctx.scratch_depth.view()));
    assert_eq!(viewport(final_pass), Some((512, 512)));
}
