//! Separable Gaussian blur of the bloom texture over the ping-pong pair

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::error::RendererError;
use crate::pipeline::context::{PipelineContext, HDR_FORMAT};
use crate::pipeline::postprocess::FULLSCREEN_VERTEX_SHADER;
use crate::render_graph::pass::*;
use crate::render_graph::resource::*;
use bytemuck::{Pod, Zeroable};
use glam::Vec4;

/// Center tap followed by the four symmetric taps on each side
pub const BLUR_WEIGHTS: [f32; 5] = [0.227027, 0.1945946, 0.1216216, 0.054054, 0.016216];

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct BlurUniform {
    /// xy: unit step along the blur axis
    direction: Vec4,
}

/// Bind groups over the blur sources. They reference window-sized textures
/// and are rebuilt on resize.
struct BlurSources {
    bloom: BindGroupHandle,
    /// Indexed by ping-pong target. Target 0 is only ever read on horizontal
    /// iterations and target 1 on vertical ones.
    ping_pong: [BindGroupHandle; 2],
}

pub struct GaussianBlurPass {
    pipeline: RenderPipelineHandle,
    layout: BindGroupLayoutHandle,
    horizontal: BufferHandle,
    vertical: BufferHandle,
    sources: BlurSources,
}

impl GaussianBlurPass {
    pub const NAME: &'static str = "Gaussian Blur";

    pub fn new<B: GraphicsBackend>(backend: &mut B, ctx: &PipelineContext) -> Result<Self, RendererError> {
        let layout = backend.create_bind_group_layout(&[
            BindGroupLayoutEntry {
                binding: 0,
                visibility: ShaderStageFlags::FRAGMENT,
                ty: BindingType::float_texture(TextureViewDimension::D2),
            },
            BindGroupLayoutEntry {
                binding: 1,
                visibility: ShaderStageFlags::FRAGMENT,
                ty: BindingType::Sampler(SamplerBindingType::Filtering),
            },
            BindGroupLayoutEntry {
                binding: 2,
                visibility: ShaderStageFlags::FRAGMENT,
                ty: BindingType::UniformBuffer,
            },
        ])?;

        let direction = |backend: &mut B, label: &str, axis: Vec4| {
            backend.create_buffer_init(
                &BufferDescriptor {
                    label: Some(label.to_string()),
                    size: std::mem::size_of::<BlurUniform>() as u64,
                    usage: BufferUsage::UNIFORM,
                },
                bytemuck::bytes_of(&BlurUniform { direction: axis }),
            )
        };
        let horizontal = direction(backend, "Blur Horizontal", Vec4::X)?;
        let vertical = direction(backend, "Blur Vertical", Vec4::Y)?;

        let pipeline = backend.create_render_pipeline(&RenderPipelineDescriptor::fullscreen(
            "Gaussian Blur Pipeline",
            format!("{}{}", FULLSCREEN_VERTEX_SHADER, BLUR_SHADER),
            vec![layout],
            vec![ColorTargetState::opaque(HDR_FORMAT)],
        ))?;

        let sources = Self::create_sources(backend, ctx, layout, horizontal, vertical)?;
        Ok(Self {
            pipeline,
            layout,
            horizontal,
            vertical,
            sources,
        })
    }

    fn create_sources<B: GraphicsBackend>(
        backend: &mut B,
        ctx: &PipelineContext,
        layout: BindGroupLayoutHandle,
        horizontal: BufferHandle,
        vertical: BufferHandle,
    ) -> Result<BlurSources, RendererError> {
        let group = |backend: &mut B, view: Option<TextureViewHandle>, axis: BufferHandle, input: &str| {
            let view = view.ok_or_else(|| RendererError::MissingInput {
                pass: Self::NAME.to_string(),
                input: input.to_string(),
            })?;
            Ok::<_, RendererError>(backend.create_bind_group(
                layout,
                &[
                    (0, BindGroupEntry::Texture(view)),
                    (1, BindGroupEntry::Sampler(ctx.samplers.linear)),
                    (
                        2,
                        BindGroupEntry::Buffer {
                            buffer: axis,
                            offset: 0,
                            size: None,
                        },
                    ),
                ],
            )?)
        };

        Ok(BlurSources {
            bloom: group(backend, ctx.resolved_bloom.color_view(0), horizontal, "bloom")?,
            ping_pong: [
                group(backend, ctx.ping_pong.view(0), horizontal, "ping-pong 0")?,
                group(backend, ctx.ping_pong.view(1), vertical, "ping-pong 1")?,
            ],
        })
    }
}

impl<B: GraphicsBackend> RenderPass<B> for GaussianBlurPass {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn setup(&mut self, ctx: &mut PassSetupContext) {
        ctx.read("bloom", ResourceUsage::TextureRead);
        ctx.write("bloom_blurred", ResourceUsage::RenderTarget);
    }

    fn execute(&self, ctx: &mut PassExecuteContext<B>) -> Result<(), RendererError> {
        let iterations = ctx.pipeline.settings.blur_iterations;
        let ping_pong = &mut ctx.pipeline.ping_pong;
        let (width, height) = ping_pong.size();
        ping_pong.reset();

        for i in 0..iterations {
            let view = ping_pong.view(ping_pong.write_index()).ok_or_else(|| RendererError::MissingInput {
                pass: Self::NAME.to_string(),
                input: format!("ping-pong {}", ping_pong.write_index()),
            })?;
            let source = if i == 0 {
                self.sources.bloom
            } else {
                self.sources.ping_pong[ping_pong.result_index()]
            };

            ctx.backend.begin_render_pass(&RenderPassDescriptor {
                label: Some(Self::NAME.to_string()),
                color_attachments: vec![ColorAttachment::clear(view, [0.0, 0.0, 0.0, 1.0])],
                depth_stencil_attachment: None,
            });
            ctx.backend.set_viewport(0.0, 0.0, width as f32, height as f32, 0.0, 1.0);
            ctx.backend.set_render_pipeline(self.pipeline);
            ctx.backend.set_bind_group(0, source);
            ctx.backend.draw(0..3, 0..1);
            ctx.backend.end_render_pass();

            ping_pong.flip();
        }
        Ok(())
    }

    fn resize(&mut self, backend: &mut B, pipeline: &PipelineContext) -> Result<(), RendererError> {
        let sources = Self::create_sources(backend, pipeline, self.layout, self.horizontal, self.vertical)?;
        let old = std::mem::replace(&mut self.sources, sources);
        backend.destroy_bind_group(old.bloom);
        for group in old.ping_pong {
            backend.destroy_bind_group(group);
        }
        Ok(())
    }
}

const BLUR_SHADER: &str = r#"
@group(0) @binding(0) var source: texture_2d<f32>;
@group(0) @binding(1) var source_sampler: sampler;

struct BlurUniform {
    direction: vec4<f32>,
}

@group(0) @binding(2) var<uniform> blur: BlurUniform;

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    var weights = array<f32, 5>(0.227027, 0.1945946, 0.1216216, 0.054054, 0.016216);
    let texel = 1.0 / vec2<f32>(textureDimensions(source));
    let step = blur.direction.xy * texel;

    var result = textureSample(source, source_sampler, input.uv).rgb * weights[0];
    for (var i = 1; i < 5; i = i + 1) {
        let offset = step * f32(i);
        result += textureSample(source, source_sampler, input.uv + offset).rgb * weights[i];
        result += textureSample(source, source_sampler, input.uv - offset).rgb * weights[i];
    }
    return vec4<f32>(result, 1.0);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weights_integrate_to_one() {
        let total = BLUR_WEIGHTS[0] + 2.0 * BLUR_WEIGHTS[1..].iter().sum::<f32>();
        assert!((total - 1.0).abs() < 1e-3, "{}", total);
    }
}
