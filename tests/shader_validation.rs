//! Every WGSL module the passes build must parse and validate the way the
//! wgpu backend compiles it

use glam::Vec3;
use naga::valid::{Capabilities, ValidationFlags, Validator};
use pbr_ibl_renderer::backend::RecordingBackend;
use pbr_ibl_renderer::resources::HdrImage;
use pbr_ibl_renderer::{App, RendererConfig};
use rstest::rstest;

fn compile(label: &str, source: &str) -> naga::Module {
    let module = naga::front::wgsl::parse_str(source)
        .unwrap_or_else(|err| panic!("{}: {}", label, err.emit_to_string(source)));
    if let Err(err) = Validator::new(ValidationFlags::all(), Capabilities::all()).validate(&module) {
        panic!("{}: {:?}", label, err);
    }
    module
}

fn has_entry_point(module: &naga::Module, name: &str, stage: naga::ShaderStage) -> bool {
    module
        .entry_points
        .iter()
        .any(|entry| entry.name == name && entry.stage == stage)
}

#[rstest]
#[case::multiview(true)]
#[case::per_face_shadow(false)]
fn test_every_pipeline_shader_compiles(#[case] multiview: bool) {
    let app = App::with_backend(
        RecordingBackend::default().with_multiview(multiview),
        RendererConfig::default(),
        &HdrImage::uniform(16, 8, Vec3::ONE),
    )
    .unwrap();

    let mut labels = Vec::new();
    for (_, desc) in app.backend().render_pipelines() {
        let label = desc.label.clone().unwrap_or_default();
        let module = compile(&label, &desc.shader);
        assert!(has_entry_point(&module, "vs_main", naga::ShaderStage::Vertex), "{}", label);
        if desc.has_fragment {
            assert!(has_entry_point(&module, "fs_main", naga::ShaderStage::Fragment), "{}", label);
        }
        labels.push(label);
    }

    labels.sort();
    for expected in [
        "Shadow Pipeline",
        "Opaque Pipeline",
        "Outline Pipeline",
        "Skybox Pipeline",
        "Window Pipeline",
        "Prefilter Pipeline",
    ] {
        assert!(labels.iter().any(|label| label == expected), "{} missing from {:?}", expected, labels);
    }
    assert!(labels.iter().any(|label| label.contains("Composite")), "{:?}", labels);
    assert!(labels.iter().any(|label| label.contains("Blur")), "{:?}", labels);
}
