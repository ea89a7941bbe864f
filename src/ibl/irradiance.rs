//! Diffuse irradiance convolution

use crate::backend::traits::*;
use crate::error::RendererError;
use crate::ibl::capture::{capture_faces, CaptureUniform, UniformSlots};
use crate::ibl::cpu::IRRADIANCE_SAMPLE_DELTA;
use crate::pipeline::PipelineContext;
use crate::render_graph::pass::*;
use crate::render_graph::resource::*;
use crate::targets::CubeFace;
use glam::Vec4;

pub struct IrradiancePass {
    source: BindGroupHandle,
    pipeline: RenderPipelineHandle,
    slots: UniformSlots,
}

impl IrradiancePass {
    pub const NAME: &'static str = "Irradiance Convolution";

    pub fn new<B: GraphicsBackend>(backend: &mut B, ctx: &PipelineContext) -> Result<Self, RendererError> {
        let capture = &ctx.capture;
        let source =
            capture.source_bind_group(backend, capture.cube_source_layout, ctx.ibl.environment.cube_view())?;
        let pipeline = capture.cube_pipeline(
            backend,
            "Irradiance Pipeline",
            IRRADIANCE_FRAGMENT_SHADER,
            capture.cube_source_layout,
            ctx.ibl.irradiance.format(),
        )?;
        let slots = UniformSlots::new(
            backend,
            capture.uniform_layout,
            "Irradiance Uniforms",
            CubeFace::ALL.len(),
            std::mem::size_of::<CaptureUniform>() as u64,
        )?;

        Ok(Self {
            source,
            pipeline,
            slots,
        })
    }
}

impl<B: GraphicsBackend> RenderPass<B> for IrradiancePass {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn setup(&mut self, ctx: &mut PassSetupContext) {
        ctx.read("environment", ResourceUsage::TextureRead);
        ctx.write("irradiance", ResourceUsage::RenderTarget);
        ctx.write("capture_depth", ResourceUsage::DepthStencilWrite);
    }

    fn execute(&self, ctx: &mut PassExecuteContext<B>) -> Result<(), RendererError> {
        let pipeline = &mut *ctx.pipeline;
        let size = pipeline.ibl.irradiance.size();
        log::info!("IBL: convolving irradiance at {}x{}", size, size);

        pipeline.scratch_depth.resize(ctx.backend, size, size)?;

        let params = Vec4::new(
            0.0,
            pipeline.ibl.environment.size() as f32,
            IRRADIANCE_SAMPLE_DELTA,
            size as f32,
        );
        for face in CubeFace::ALL {
            let uniform = pipeline.capture.face_uniform(face, params);
            self.slots.write(ctx.backend, face.index() as usize, &uniform);
        }

        capture_faces(
            ctx.backend,
            Self::NAME,
            &pipeline.capture,
            &pipeline.scratch_depth,
            &pipeline.ibl.irradiance,
            0,
            self.pipeline,
            &self.slots,
            0,
            self.source,
        )
    }
}

pub const IRRADIANCE_FRAGMENT_SHADER: &str = r#"
@group(1) @binding(0) var environment: texture_cube<f32>;
@group(1) @binding(1) var environment_sampler: sampler;

const PI: f32 = 3.14159265359;

@fragment
fn fs_main(in: CaptureOutput) -> @location(0) vec4<f32> {
    let normal = normalize(in.local_position);

    var up = vec3<f32>(0.0, 1.0, 0.0);
    if (abs(normal.y) >= 0.999) {
        up = vec3<f32>(1.0, 0.0, 0.0);
    }
    let right = normalize(cross(up, normal));
    up = cross(normal, right);

    // Sample a mip whose texels roughly match the target footprint
    let lod = max(log2(capture.params.y / capture.params.w), 0.0);
    let sample_delta = capture.params.z;

    var irradiance = vec3<f32>(0.0);
    var sample_count = 0.0;
    var phi = 0.0;
    loop {
        if (phi >= 2.0 * PI) {
            break;
        }
        var theta = 0.0;
        loop {
            if (theta >= 0.5 * PI) {
                break;
            }
            let tangent_sample = vec3<f32>(sin(theta) * cos(phi), sin(theta) * sin(phi), cos(theta));
            let sample_vec = tangent_sample.x * right + tangent_sample.y * up + tangent_sample.z * normal;

            irradiance += textureSampleLevel(environment, environment_sampler, sample_vec, lod).rgb
                * cos(theta) * sin(theta);
            sample_count += 1.0;
            theta += sample_delta;
        }
        phi += sample_delta;
    }

    irradiance = PI * irradiance / max(sample_count, 1.0);
    return vec4<f32>(irradiance, 1.0);
}
"#;
