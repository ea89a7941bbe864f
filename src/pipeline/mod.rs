//! Per-frame HDR pipeline
//!
//! Six passes, ordered by the render graph from their declared resources:
//!
//! 1. [`ShadowPass`] - linear light distance into the omni shadow cube
//! 2. [`ColorBloomPass`] - 4x MSAA PBR scene into color + bloom attachments
//! 3. [`ResolvePass::color`] / [`ResolvePass::bloom`] - single-sample copies
//! 4. [`GaussianBlurPass`] - ping-pong separable blur of the bloom
//! 5. [`CompositePass`] - color + bloom, tone mapped onto the surface
//!
//! The IBL maps are registered as external inputs since the precompute graph
//! produced them before the first frame.

pub mod context;
pub mod postprocess;
pub mod scene_pass;
pub mod shadow;
pub mod state;

pub use context::*;
pub use postprocess::{CompositePass, GaussianBlurPass, ResolvePass, TonemapOperator};
pub use scene_pass::ColorBloomPass;
pub use shadow::*;
pub use state::*;

use crate::backend::traits::GraphicsBackend;
use crate::error::RendererError;
use crate::render_graph::{RenderGraphBuilder, RenderGraphExecutor};

/// Graph resources written by the IBL precompute
pub const IBL_INPUTS: [&str; 4] = ["environment", "irradiance", "prefilter", "brdf_lut"];

/// Build the frame graph over the targets owned by `ctx`
pub fn build_frame_graph<B: GraphicsBackend>(
    backend: &mut B,
    ctx: &PipelineContext,
) -> Result<RenderGraphExecutor<B>, RendererError> {
    let mut builder = RenderGraphBuilder::new();
    for input in IBL_INPUTS {
        builder = builder.external(input);
    }

    let executor = builder
        .graphics_pass(ShadowPass::new(backend, ctx)?)?
        .graphics_pass(ColorBloomPass::new(backend, ctx)?)?
        .transfer_pass(ResolvePass::color())?
        .transfer_pass(ResolvePass::bloom())?
        .graphics_pass(GaussianBlurPass::new(backend, ctx)?)?
        .graphics_pass(CompositePass::new(backend, ctx)?)?
        .compile()?;

    log::info!("Frame graph: {}", executor.pass_names().join(" -> "));
    Ok(executor)
}
