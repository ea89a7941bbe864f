//! Equirectangular panorama → environment cubemap

use crate::backend::traits::*;
use crate::error::RendererError;
use crate::ibl::capture::{capture_faces, CaptureUniform, UniformSlots};
use crate::pipeline::PipelineContext;
use crate::render_graph::pass::*;
use crate::render_graph::resource::*;
use crate::resources::{GpuTexture, HdrImage};
use crate::targets::CubeFace;
use glam::Vec4;

/// Projects the panorama onto the six faces of the environment cube, then
/// fills its mip chain for the convolution passes.
pub struct EquirectPass {
    panorama: GpuTexture,
    source: BindGroupHandle,
    pipeline: RenderPipelineHandle,
    slots: UniformSlots,
}

impl EquirectPass {
    pub const NAME: &'static str = "Equirect To Cubemap";

    pub fn new<B: GraphicsBackend>(
        backend: &mut B,
        ctx: &PipelineContext,
        panorama: &HdrImage,
    ) -> Result<Self, RendererError> {
        let capture = &ctx.capture;
        let panorama = GpuTexture::from_hdr(backend, panorama)?;
        let source = capture.source_bind_group(backend, capture.panorama_layout, panorama.view)?;
        let pipeline = capture.cube_pipeline(
            backend,
            "Equirect Capture Pipeline",
            EQUIRECT_FRAGMENT_SHADER,
            capture.panorama_layout,
            ctx.ibl.environment.format(),
        )?;
        let slots = UniformSlots::new(
            backend,
            capture.uniform_layout,
            "Equirect Capture Uniforms",
            CubeFace::ALL.len(),
            std::mem::size_of::<CaptureUniform>() as u64,
        )?;

        Ok(Self {
            panorama,
            source,
            pipeline,
            slots,
        })
    }
}

impl<B: GraphicsBackend> RenderPass<B> for EquirectPass {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn setup(&mut self, ctx: &mut PassSetupContext) {
        ctx.write("environment", ResourceUsage::RenderTarget);
        ctx.write("capture_depth", ResourceUsage::DepthStencilWrite);
    }

    fn execute(&self, ctx: &mut PassExecuteContext<B>) -> Result<(), RendererError> {
        let pipeline = &mut *ctx.pipeline;
        let environment = &pipeline.ibl.environment;
        let size = environment.size();
        log::info!(
            "IBL: capturing {}x{} panorama into {}x{} environment cube",
            self.panorama.width,
            self.panorama.height,
            size,
            size
        );

        pipeline.scratch_depth.resize(ctx.backend, size, size)?;

        let params = Vec4::new(0.0, self.panorama.width as f32, 0.0, size as f32);
        for face in CubeFace::ALL {
            let uniform = pipeline.capture.face_uniform(face, params);
            self.slots.write(ctx.backend, face.index() as usize, &uniform);
        }

        capture_faces(
            ctx.backend,
            Self::NAME,
            &pipeline.capture,
            &pipeline.scratch_depth,
            environment,
            0,
            self.pipeline,
            &self.slots,
            0,
            self.source,
        )?;

        ctx.backend.generate_mipmaps(environment.texture());
        Ok(())
    }
}

pub const EQUIRECT_FRAGMENT_SHADER: &str = r#"
@group(1) @binding(0) var panorama: texture_2d<f32>;
@group(1) @binding(1) var panorama_sampler: sampler;

const INV_ATAN: vec2<f32> = vec2<f32>(0.1591, 0.3183);

fn sample_spherical_map(v: vec3<f32>) -> vec2<f32> {
    let uv = vec2<f32>(atan2(v.z, v.x), asin(v.y)) * INV_ATAN + 0.5;
    // Panorama rows run top to bottom
    return vec2<f32>(uv.x, 1.0 - uv.y);
}

@fragment
fn fs_main(in: CaptureOutput) -> @location(0) vec4<f32> {
    let uv = sample_spherical_map(normalize(in.local_position));
    let color = textureSampleLevel(panorama, panorama_sampler, uv, 0.0).rgb;
    return vec4<f32>(color, 1.0);
}
"#;
