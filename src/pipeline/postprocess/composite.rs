//! Final composite: scene color plus blurred bloom, tone mapped to the surface

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::error::RendererError;
use crate::pipeline::context::{PipelineContext, RenderSettings};
use crate::pipeline::postprocess::FULLSCREEN_VERTEX_SHADER;
use crate::render_graph::pass::*;
use crate::render_graph::resource::*;
use crate::targets::blur_schedule;
use bytemuck::{Pod, Zeroable};

/// Tonemapping operator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TonemapOperator {
    /// `1 - exp(-color * exposure)`
    #[default]
    Exposure,
    Reinhard,
    Aces,
}

impl TonemapOperator {
    fn shader_index(self) -> u32 {
        match self {
            TonemapOperator::Exposure => 0,
            TonemapOperator::Reinhard => 1,
            TonemapOperator::Aces => 2,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CompositeUniform {
    pub exposure: f32,
    pub tonemap: u32,
    /// 1 when the surface does not encode sRGB itself
    pub apply_gamma: u32,
    pub _padding: u32,
}

impl CompositeUniform {
    pub fn new(settings: &RenderSettings, surface_format: TextureFormat) -> Self {
        Self {
            exposure: settings.exposure,
            tonemap: settings.tonemap.shader_index(),
            apply_gamma: (!surface_format.is_srgb()) as u32,
            _padding: 0,
        }
    }
}

/// Adds the blurred bloom onto the resolved scene color, tone maps and
/// writes the presentable surface
pub struct CompositePass {
    pipeline: RenderPipelineHandle,
    layout: BindGroupLayoutHandle,
    uniform: BufferHandle,
    bind_group: BindGroupHandle,
}

impl CompositePass {
    pub const NAME: &'static str = "Composite";

    pub fn new<B: GraphicsBackend>(backend: &mut B, ctx: &PipelineContext) -> Result<Self, RendererError> {
        let texture = |binding| BindGroupLayoutEntry {
            binding,
            visibility: ShaderStageFlags::FRAGMENT,
            ty: BindingType::float_texture(TextureViewDimension::D2),
        };
        let layout = backend.create_bind_group_layout(&[
            texture(0),
            texture(1),
            BindGroupLayoutEntry {
                binding: 2,
                visibility: ShaderStageFlags::FRAGMENT,
                ty: BindingType::Sampler(SamplerBindingType::Filtering),
            },
            BindGroupLayoutEntry {
                binding: 3,
                visibility: ShaderStageFlags::FRAGMENT,
                ty: BindingType::UniformBuffer,
            },
        ])?;

        let uniform = backend.create_buffer_init(
            &BufferDescriptor {
                label: Some("Composite Uniforms".to_string()),
                size: std::mem::size_of::<CompositeUniform>() as u64,
                usage: BufferUsage::UNIFORM | BufferUsage::COPY_DST,
            },
            bytemuck::bytes_of(&CompositeUniform::new(&ctx.settings, ctx.surface_format)),
        )?;

        let pipeline = backend.create_render_pipeline(&RenderPipelineDescriptor::fullscreen(
            "Composite Pipeline",
            format!("{}{}", FULLSCREEN_VERTEX_SHADER, COMPOSITE_SHADER),
            vec![layout],
            vec![ColorTargetState::opaque(ctx.surface_format)],
        ))?;

        let bind_group = Self::create_bind_group(backend, ctx, layout, uniform)?;
        Ok(Self {
            pipeline,
            layout,
            uniform,
            bind_group,
        })
    }

    /// The blurred bloom lives in whichever ping-pong target the last blur
    /// iteration wrote; without blur iterations the resolved bloom is used
    fn bloom_view(ctx: &PipelineContext) -> Option<TextureViewHandle> {
        match ctx.settings.blur_iterations {
            0 => ctx.resolved_bloom.color_view(0),
            n => ctx.ping_pong.view(blur_schedule(n).1),
        }
    }

    fn create_bind_group<B: GraphicsBackend>(
        backend: &mut B,
        ctx: &PipelineContext,
        layout: BindGroupLayoutHandle,
        uniform: BufferHandle,
    ) -> Result<BindGroupHandle, RendererError> {
        let missing = |input: &str| RendererError::MissingInput {
            pass: Self::NAME.to_string(),
            input: input.to_string(),
        };
        let scene = ctx.resolved_color.color_view(0).ok_or_else(|| missing("scene_color"))?;
        let bloom = Self::bloom_view(ctx).ok_or_else(|| missing("bloom_blurred"))?;
        Ok(backend.create_bind_group(
            layout,
            &[
                (0, BindGroupEntry::Texture(scene)),
                (1, BindGroupEntry::Texture(bloom)),
                (2, BindGroupEntry::Sampler(ctx.samplers.linear)),
                (
                    3,
                    BindGroupEntry::Buffer {
                        buffer: uniform,
                        offset: 0,
                        size: None,
                    },
                ),
            ],
        )?)
    }
}

impl<B: GraphicsBackend> RenderPass<B> for CompositePass {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn setup(&mut self, ctx: &mut PassSetupContext) {
        ctx.read("scene_color", ResourceUsage::TextureRead);
        ctx.read("bloom_blurred", ResourceUsage::TextureRead);
        ctx.write("surface", ResourceUsage::RenderTarget);
    }

    fn execute(&self, ctx: &mut PassExecuteContext<B>) -> Result<(), RendererError> {
        let surface = ctx.require_surface(Self::NAME)?;
        let (width, height) = ctx.pipeline.surface_size;
        let uniform = CompositeUniform::new(&ctx.pipeline.settings, ctx.pipeline.surface_format);

        let backend = &mut *ctx.backend;
        backend.write_buffer(self.uniform, 0, bytemuck::bytes_of(&uniform));
        backend.begin_render_pass(&RenderPassDescriptor {
            label: Some(Self::NAME.to_string()),
            color_attachments: vec![ColorAttachment::clear(surface, [0.0, 0.0, 0.0, 1.0])],
            depth_stencil_attachment: None,
        });
        backend.set_viewport(0.0, 0.0, width as f32, height as f32, 0.0, 1.0);
        backend.set_render_pipeline(self.pipeline);
        backend.set_bind_group(0, self.bind_group);
        backend.draw(0..3, 0..1);
        backend.end_render_pass();
        Ok(())
    }

    fn resize(&mut self, backend: &mut B, pipeline: &PipelineContext) -> Result<(), RendererError> {
        let bind_group = Self::create_bind_group(backend, pipeline, self.layout, self.uniform)?;
        backend.destroy_bind_group(std::mem::replace(&mut self.bind_group, bind_group));
        Ok(())
    }
}

const COMPOSITE_SHADER: &str = r#"
@group(0) @binding(0) var scene_texture: texture_2d<f32>;
@group(0) @binding(1) var bloom_texture: texture_2d<f32>;
@group(0) @binding(2) var composite_sampler: sampler;

struct CompositeUniform {
    exposure: f32,
    tonemap: u32,
    apply_gamma: u32,
    _padding: u32,
}

@group(0) @binding(3) var<uniform> params: CompositeUniform;

fn aces_tonemap(color: vec3<f32>) -> vec3<f32> {
    let a = 2.51;
    let b = 0.03;
    let c = 2.43;
    let d = 0.59;
    let e = 0.14;
    return saturate((color * (a * color + b)) / (color * (c * color + d) + e));
}

fn reinhard_tonemap(color: vec3<f32>) -> vec3<f32> {
    return color / (color + vec3<f32>(1.0));
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let hdr = textureSample(scene_texture, composite_sampler, input.uv).rgb
        + textureSample(bloom_texture, composite_sampler, input.uv).rgb;

    var mapped: vec3<f32>;
    switch params.tonemap {
        case 1u: { mapped = reinhard_tonemap(hdr * params.exposure); }
        case 2u: { mapped = aces_tonemap(hdr * params.exposure); }
        default: { mapped = vec3<f32>(1.0) - exp(-hdr * params.exposure); }
    }

    if params.apply_gamma == 1u {
        mapped = pow(mapped, vec3<f32>(1.0 / 2.2));
    }
    return vec4<f32>(mapped, 1.0);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::srgb_surface(TextureFormat::Bgra8UnormSrgb, 0)]
    #[case::linear_surface(TextureFormat::Bgra8Unorm, 1)]
    fn test_gamma_only_without_srgb_surface(#[case] format: TextureFormat, #[case] expected: u32) {
        let uniform = CompositeUniform::new(&RenderSettings::default(), format);
        assert_eq!(uniform.apply_gamma, expected);
    }

    #[test]
    fn test_default_operator_is_exposure() {
        let uniform = CompositeUniform::new(&RenderSettings::default(), TextureFormat::Bgra8UnormSrgb);
        assert_eq!(uniform.tonemap, 0);
        assert_eq!(uniform.exposure, 1.0);
    }
}
