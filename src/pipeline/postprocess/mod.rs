//! Post-processing: MSAA resolve, bloom blur and the final composite

mod blur;
mod composite;
mod resolve;

pub use blur::{GaussianBlurPass, BLUR_WEIGHTS};
pub use composite::{CompositePass, CompositeUniform, TonemapOperator};
pub use resolve::ResolvePass;

/// Fullscreen triangle. `uv` is (0, 0) at the top-left of the target and
/// (0, 1) at the bottom-left.
pub const FULLSCREEN_VERTEX_SHADER: &str = r#"
struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@vertex
fn vs_main(@builtin(vertex_index) vertex_index: u32) -> VertexOutput {
    var output: VertexOutput;

    // One triangle covering the screen
    let x = f32((vertex_index << 1u) & 2u);
    let y = f32(vertex_index & 2u);

    output.position = vec4<f32>(x * 2.0 - 1.0, y * 2.0 - 1.0, 0.0, 1.0);
    output.uv = vec2<f32>(x, 1.0 - y);

    return output;
}
"#;
