//! Split-sum BRDF lookup table

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::error::RendererError;
use crate::ibl::cpu::GGX_SAMPLE_COUNT;
use crate::ibl::prefilter::GGX_SAMPLING_SHADER;
use crate::pipeline::postprocess::FULLSCREEN_VERTEX_SHADER;
use crate::pipeline::PipelineContext;
use crate::render_graph::pass::*;
use crate::render_graph::resource::*;
use crate::targets::ScratchDepthBuffer;

/// Bakes (NdotV, roughness) → (scale, bias) into a two-channel texture with
/// one fullscreen triangle. Depends on nothing in the scene.
pub struct BrdfLutPass {
    pipeline: RenderPipelineHandle,
}

impl BrdfLutPass {
    pub const NAME: &'static str = "BRDF Integration";

    pub fn new<B: GraphicsBackend>(backend: &mut B, ctx: &PipelineContext) -> Result<Self, RendererError> {
        let format = ctx
            .ibl
            .brdf_lut
            .color_format(0)
            .ok_or_else(|| RendererError::MissingInput {
                pass: Self::NAME.to_string(),
                input: "brdf_lut".to_string(),
            })?;

        let mut desc = RenderPipelineDescriptor::fullscreen(
            "BRDF LUT Pipeline",
            format!(
                "{}{}{}",
                FULLSCREEN_VERTEX_SHADER,
                GGX_SAMPLING_SHADER,
                brdf_fragment_shader()
            ),
            Vec::new(),
            vec![ColorTargetState::opaque(format)],
        );
        desc.depth_stencil = Some(DepthStencilState::depth(
            ScratchDepthBuffer::FORMAT,
            false,
            CompareFunction::Always,
        ));

        Ok(Self {
            pipeline: backend.create_render_pipeline(&desc)?,
        })
    }
}

impl<B: GraphicsBackend> RenderPass<B> for BrdfLutPass {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn setup(&mut self, ctx: &mut PassSetupContext) {
        ctx.write("brdf_lut", ResourceUsage::RenderTarget);
        ctx.write("capture_depth", ResourceUsage::DepthStencilWrite);
    }

    fn execute(&self, ctx: &mut PassExecuteContext<B>) -> Result<(), RendererError> {
        let pipeline = &mut *ctx.pipeline;
        let lut = &pipeline.ibl.brdf_lut;
        let (width, height) = lut.size();
        log::info!("IBL: integrating BRDF LUT at {}x{}", width, height);

        pipeline.scratch_depth.resize(ctx.backend, width, height)?;
        pipeline.scratch_depth.ensure_size(Self::NAME, width, height)?;

        let view = lut.color_view(0).ok_or_else(|| RendererError::MissingInput {
            pass: Self::NAME.to_string(),
            input: "brdf_lut".to_string(),
        })?;

        ctx.backend.begin_render_pass(&RenderPassDescriptor {
            label: Some(Self::NAME.to_string()),
            color_attachments: vec![ColorAttachment::clear(view, [0.0, 0.0, 0.0, 0.0])],
            depth_stencil_attachment: Some(DepthStencilAttachment::clear(pipeline.scratch_depth.view())),
        });
        ctx.backend
            .set_viewport(0.0, 0.0, width as f32, height as f32, 0.0, 1.0);
        ctx.backend.set_render_pipeline(self.pipeline);
        ctx.backend.draw(0..3, 0..1);
        ctx.backend.end_render_pass();

        Ok(())
    }
}

pub const BRDF_FRAGMENT_SHADER: &str = r#"
fn geometry_schlick_ggx(n_dot_v: f32, roughness: f32) -> f32 {
    let k = (roughness * roughness) / 2.0;
    return n_dot_v / (n_dot_v * (1.0 - k) + k);
}

fn geometry_smith(n_dot_v: f32, n_dot_l: f32, roughness: f32) -> f32 {
    return geometry_schlick_ggx(n_dot_v, roughness) * geometry_schlick_ggx(n_dot_l, roughness);
}

fn integrate_brdf(n_dot_v: f32, roughness: f32) -> vec2<f32> {
    let v = vec3<f32>(sqrt(1.0 - n_dot_v * n_dot_v), 0.0, n_dot_v);
    let n = vec3<f32>(0.0, 0.0, 1.0);

    var a = 0.0;
    var b = 0.0;

    let sample_count = SAMPLE_COUNT;
    for (var i = 0u; i < sample_count; i++) {
        let xi = hammersley(i, sample_count);
        let h = importance_sample_ggx(xi, n, roughness);
        let l = normalize(2.0 * dot(v, h) * h - v);

        let n_dot_l = max(l.z, 0.0);
        let n_dot_h = max(h.z, 0.0);
        let v_dot_h = max(dot(v, h), 0.0);

        if (n_dot_l > 0.0) {
            let g = geometry_smith(n_dot_v, n_dot_l, roughness);
            let g_vis = (g * v_dot_h) / (n_dot_h * n_dot_v);
            let fc = pow(1.0 - v_dot_h, 5.0);

            a += (1.0 - fc) * g_vis;
            b += fc * g_vis;
        }
    }

    return vec2<f32>(a, b) / f32(sample_count);
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec2<f32> {
    return integrate_brdf(in.uv.x, in.uv.y);
}
"#;

fn brdf_fragment_shader() -> String {
    format!(
        "const SAMPLE_COUNT: u32 = {}u;\n{}",
        GGX_SAMPLE_COUNT, BRDF_FRAGMENT_SHADER
    )
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_sample_count_matches_cpu_reference() {
        let source = super::brdf_fragment_shader();
        assert!(source.contains(&format!("{}u", super::GGX_SAMPLE_COUNT)));
    }
}
