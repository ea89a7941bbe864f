//! Roughness-indexed specular prefilter chain

use crate::backend::traits::*;
use crate::error::RendererError;
use crate::ibl::capture::{capture_faces, CaptureUniform, UniformSlots};
use crate::ibl::cpu::GGX_SAMPLE_COUNT;
use crate::pipeline::PipelineContext;
use crate::render_graph::pass::*;
use crate::render_graph::resource::*;
use crate::targets::CubeFace;
use glam::Vec4;

/// Mip layout of the prefiltered cube: level `m` is `base >> m` texels wide
/// and holds roughness `m / (levels - 1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MipChain {
    base_size: u32,
    levels: u32,
}

impl MipChain {
    pub fn new(base_size: u32, levels: u32) -> Self {
        Self {
            base_size,
            levels: levels.max(1),
        }
    }

    pub fn base_size(&self) -> u32 {
        self.base_size
    }

    pub fn levels(&self) -> u32 {
        self.levels
    }

    pub fn level_size(&self, mip: u32) -> u32 {
        (self.base_size >> mip).max(1)
    }

    pub fn roughness(&self, mip: u32) -> f32 {
        if self.levels <= 1 {
            return 0.0;
        }
        mip as f32 / (self.levels - 1) as f32
    }

    /// `(mip, size, roughness)` from sharpest to roughest
    pub fn iter(&self) -> impl Iterator<Item = (u32, u32, f32)> + '_ {
        (0..self.levels).map(move |mip| (mip, self.level_size(mip), self.roughness(mip)))
    }
}

pub struct PrefilterPass {
    chain: MipChain,
    source: BindGroupHandle,
    pipeline: RenderPipelineHandle,
    /// Slot `mip * 6 + face`
    slots: UniformSlots,
}

impl PrefilterPass {
    pub const NAME: &'static str = "Specular Prefilter";

    pub fn new<B: GraphicsBackend>(backend: &mut B, ctx: &PipelineContext) -> Result<Self, RendererError> {
        let capture = &ctx.capture;
        let prefilter = &ctx.ibl.prefilter;
        let chain = MipChain::new(prefilter.size(), prefilter.mip_levels());

        let source =
            capture.source_bind_group(backend, capture.cube_source_layout, ctx.ibl.environment.cube_view())?;
        let pipeline = capture.cube_pipeline(
            backend,
            "Prefilter Pipeline",
            &format!("{}{}", GGX_SAMPLING_SHADER, PREFILTER_FRAGMENT_SHADER),
            capture.cube_source_layout,
            prefilter.format(),
        )?;
        let slots = UniformSlots::new(
            backend,
            capture.uniform_layout,
            "Prefilter Uniforms",
            chain.levels() as usize * CubeFace::ALL.len(),
            std::mem::size_of::<CaptureUniform>() as u64,
        )?;

        Ok(Self {
            chain,
            source,
            pipeline,
            slots,
        })
    }

    pub fn chain(&self) -> MipChain {
        self.chain
    }
}

impl<B: GraphicsBackend> RenderPass<B> for PrefilterPass {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn setup(&mut self, ctx: &mut PassSetupContext) {
        ctx.read("environment", ResourceUsage::TextureRead);
        ctx.write("prefilter", ResourceUsage::RenderTarget);
        ctx.write("capture_depth", ResourceUsage::DepthStencilWrite);
    }

    fn execute(&self, ctx: &mut PassExecuteContext<B>) -> Result<(), RendererError> {
        let pipeline = &mut *ctx.pipeline;
        let environment_size = pipeline.ibl.environment.size() as f32;

        for (mip, size, roughness) in self.chain.iter() {
            log::info!(
                "IBL: prefiltering mip {} at {}x{} (roughness {:.2})",
                mip,
                size,
                size,
                roughness
            );
            pipeline.scratch_depth.resize(ctx.backend, size, size)?;

            let slot_base = mip as usize * CubeFace::ALL.len();
            let params = Vec4::new(roughness, environment_size, GGX_SAMPLE_COUNT as f32, size as f32);
            for face in CubeFace::ALL {
                let uniform = pipeline.capture.face_uniform(face, params);
                self.slots.write(ctx.backend, slot_base + face.index() as usize, &uniform);
            }

            capture_faces(
                ctx.backend,
                Self::NAME,
                &pipeline.capture,
                &pipeline.scratch_depth,
                &pipeline.ibl.prefilter,
                mip,
                self.pipeline,
                &self.slots,
                slot_base,
                self.source,
            )?;
        }

        Ok(())
    }
}

/// GGX helpers shared by the prefilter and BRDF integration shaders
pub const GGX_SAMPLING_SHADER: &str = r#"
const PI: f32 = 3.14159265359;

fn radical_inverse_vdc(bits: u32) -> f32 {
    return f32(reverseBits(bits)) * 2.3283064365386963e-10;
}

fn hammersley(i: u32, n: u32) -> vec2<f32> {
    return vec2<f32>(f32(i) / f32(n), radical_inverse_vdc(i));
}

fn importance_sample_ggx(xi: vec2<f32>, n: vec3<f32>, roughness: f32) -> vec3<f32> {
    let a = roughness * roughness;

    let phi = 2.0 * PI * xi.x;
    let cos_theta = sqrt((1.0 - xi.y) / (1.0 + (a * a - 1.0) * xi.y));
    let sin_theta = sqrt(1.0 - cos_theta * cos_theta);

    let h = vec3<f32>(cos(phi) * sin_theta, sin(phi) * sin_theta, cos_theta);

    var up = vec3<f32>(0.0, 0.0, 1.0);
    if (abs(n.z) >= 0.999) {
        up = vec3<f32>(1.0, 0.0, 0.0);
    }
    let tangent = normalize(cross(up, n));
    let bitangent = cross(n, tangent);

    return normalize(tangent * h.x + bitangent * h.y + n * h.z);
}

fn distribution_ggx(n_dot_h: f32, roughness: f32) -> f32 {
    let a = roughness * roughness;
    let a2 = a * a;
    let denom = n_dot_h * n_dot_h * (a2 - 1.0) + 1.0;
    return a2 / (PI * denom * denom);
}
"#;

pub const PREFILTER_FRAGMENT_SHADER: &str = r#"
@group(1) @binding(0) var environment: texture_cube<f32>;
@group(1) @binding(1) var environment_sampler: sampler;

@fragment
fn fs_main(in: CaptureOutput) -> @location(0) vec4<f32> {
    let n = normalize(in.local_position);
    let v = n;

    let roughness = capture.params.x;
    let resolution = capture.params.y;
    let sample_count = u32(capture.params.z);

    var prefiltered = vec3<f32>(0.0);
    var total_weight = 0.0;

    for (var i = 0u; i < sample_count; i++) {
        let xi = hammersley(i, sample_count);
        let h = importance_sample_ggx(xi, n, roughness);
        let l = normalize(2.0 * dot(v, h) * h - v);

        let n_dot_l = dot(n, l);
        if (n_dot_l > 0.0) {
            // Pick the source mip from the sample's solid angle to avoid
            // bright-spot aliasing
            let n_dot_h = max(dot(n, h), 0.0);
            let h_dot_v = max(dot(h, v), 0.0);
            let pdf = distribution_ggx(n_dot_h, roughness) * n_dot_h / (4.0 * h_dot_v) + 0.0001;

            let sa_texel = 4.0 * PI / (6.0 * resolution * resolution);
            let sa_sample = 1.0 / (f32(sample_count) * pdf + 0.0001);
            var mip_level = 0.0;
            if (roughness > 0.0) {
                mip_level = 0.5 * log2(sa_sample / sa_texel);
            }

            prefiltered += textureSampleLevel(environment, environment_sampler, l, mip_level).rgb * n_dot_l;
            total_weight += n_dot_l;
        }
    }

    prefiltered = prefiltered / max(total_weight, 0.001);
    return vec4<f32>(prefiltered, 1.0);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::sharpest(0, 128, 0.0)]
    #[case::first(1, 64, 0.25)]
    #[case::middle(2, 32, 0.5)]
    #[case::third(3, 16, 0.75)]
    #[case::roughest(4, 8, 1.0)]
    fn test_mip_roughness_mapping(#[case] mip: u32, #[case] size: u32, #[case] roughness: f32) {
        let chain = MipChain::new(128, 5);
        assert_eq!(chain.level_size(mip), size);
        assert_eq!(chain.roughness(mip), roughness);
    }

    #[test]
    fn test_levels_run_sharp_to_rough() {
        let chain = MipChain::new(128, 5);
        let roughness: Vec<f32> = chain.iter().map(|(_, _, r)| r).collect();
        assert_eq!(roughness, vec![0.0, 0.25, 0.5, 0.75, 1.0]);
    }

    #[test]
    fn test_single_level_is_mirror() {
        assert_eq!(MipChain::new(64, 1).roughness(0), 0.0);
    }
}
