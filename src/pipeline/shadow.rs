//! Omnidirectional shadow map for one point light

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::error::RendererError;
use crate::ibl::{CaptureTransforms, CaptureUniform, UniformSlots};
use crate::pipeline::PipelineContext;
use crate::render_graph::pass::*;
use crate::render_graph::resource::*;
use crate::scene::OBJECT_UNIFORM_SHADER;
use crate::targets::{CubeFace, CubemapTexture, TargetStatus};
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};
use std::num::NonZeroU32;

/// Depth format of the shadow cube
pub const SHADOW_FORMAT: TextureFormat = TextureFormat::Depth32Float;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowSettings {
    /// Edge length of each cube face
    pub size: u32,
    pub near: f32,
    pub far: f32,
}

impl Default for ShadowSettings {
    fn default() -> Self {
        Self {
            size: 1024,
            near: 1.0,
            far: 25.0,
        }
    }
}

/// Light position, clip range and the six light-space transforms.
///
/// The transforms are built exactly like the environment capture ones, only
/// centred on the light. They are recomputed only when the light moves.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowContext {
    transforms: CaptureTransforms,
}

impl ShadowContext {
    pub fn new(light_position: Vec3, settings: &ShadowSettings) -> Self {
        Self {
            transforms: CaptureTransforms::centered_at(light_position, settings.near, settings.far),
        }
    }

    pub fn light_position(&self) -> Vec3 {
        self.transforms.origin()
    }

    pub fn near(&self) -> f32 {
        self.transforms.near()
    }

    pub fn far(&self) -> f32 {
        self.transforms.far()
    }

    pub fn transforms(&self) -> &CaptureTransforms {
        &self.transforms
    }

    pub fn set_light_position(&mut self, light_position: Vec3) {
        if light_position != self.light_position() {
            self.transforms = CaptureTransforms::centered_at(light_position, self.near(), self.far());
        }
    }

    /// All six transforms plus the light for the single-submission path
    pub fn uniform(&self) -> ShadowUniform {
        ShadowUniform {
            view_projections: CubeFace::ALL.map(|face| self.transforms.view_projection(face)),
            light: self.light_position().extend(self.far()),
        }
    }

    /// Transform and light for one face of the per-face path
    pub fn face_uniform(&self, face: CubeFace) -> CaptureUniform {
        CaptureUniform {
            view_projection: self.transforms.view_projection(face),
            params: self.light_position().extend(self.far()),
        }
    }

    /// Allocate the depth cube. A zero extent is a fatal configuration error.
    pub fn allocate_map<B: GraphicsBackend>(&self, backend: &mut B, size: u32) -> Result<CubemapTexture, RendererError> {
        if size == 0 {
            let err = RendererError::IncompleteTarget {
                label: "Shadow Cubemap".to_string(),
                status: TargetStatus::ZeroExtent.to_string(),
            };
            log::error!("{}", err);
            return Err(err);
        }
        CubemapTexture::create(backend, "Shadow Cubemap", size, 1, SHADOW_FORMAT)
    }
}

/// Six view-projections indexed by view, plus the light (w = far plane)
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct ShadowUniform {
    pub view_projections: [Mat4; 6],
    pub light: Vec4,
}

enum ShadowMode {
    /// One pass over a six-layer view; geometry is submitted once
    Multiview { bind_group: BindGroupHandle },
    /// One pass per face, each with its own uniform slot
    PerFace { slots: UniformSlots },
}

/// Renders linear light distance of every opaque object into all six faces
/// of the shadow cube.
///
/// Front faces are culled. The projection flips Y, which reverses winding in
/// clip space, so the pipeline declares clockwise fronts to cull the faces
/// that really point at the light.
pub struct ShadowPass {
    pipeline: RenderPipelineHandle,
    mode: ShadowMode,
}

impl ShadowPass {
    pub const NAME: &'static str = "Omni Shadow";

    pub fn new<B: GraphicsBackend>(backend: &mut B, ctx: &PipelineContext) -> Result<Self, RendererError> {
        let layout = ctx.capture.uniform_layout;
        let (shader, multiview, mode) = if ctx.features.multiview {
            let buffer = backend.create_buffer_init(
                &BufferDescriptor {
                    label: Some("Shadow Transforms".to_string()),
                    size: std::mem::size_of::<ShadowUniform>() as u64,
                    usage: BufferUsage::UNIFORM | BufferUsage::COPY_DST,
                },
                bytemuck::bytes_of(&ctx.shadow.uniform()),
            )?;
            let bind_group = backend.create_bind_group(
                layout,
                &[(
                    0,
                    BindGroupEntry::Buffer {
                        buffer,
                        offset: 0,
                        size: None,
                    },
                )],
            )?;
            (
                format!("{}{}", OBJECT_UNIFORM_SHADER, MULTIVIEW_SHADOW_SHADER),
                NonZeroU32::new(6),
                ShadowMode::Multiview { bind_group },
            )
        } else {
            log::warn!("MULTIVIEW unsupported: shadow cube falls back to six passes");
            let slots = UniformSlots::new(
                backend,
                layout,
                "Shadow Face Uniforms",
                6,
                std::mem::size_of::<CaptureUniform>() as u64,
            )?;
            for face in CubeFace::ALL {
                slots.write(backend, face.index() as usize, &ctx.shadow.face_uniform(face));
            }
            (
                format!("{}{}", OBJECT_UNIFORM_SHADER, PER_FACE_SHADOW_SHADER),
                None,
                ShadowMode::PerFace { slots },
            )
        };

        let pipeline = backend.create_render_pipeline(&RenderPipelineDescriptor {
            label: Some("Shadow Pipeline".to_string()),
            shader,
            has_fragment: true,
            vertex_layouts: vec![Vertex::layout()],
            bind_group_layouts: vec![layout, ctx.layouts.object],
            primitive_topology: PrimitiveTopology::TriangleList,
            front_face: FrontFace::Cw,
            cull_mode: CullMode::Front,
            depth_stencil: Some(DepthStencilState::depth(SHADOW_FORMAT, true, CompareFunction::Less)),
            color_targets: Vec::new(),
            sample_count: 1,
            multiview,
        })?;

        Ok(Self { pipeline, mode })
    }

    pub fn is_multiview(&self) -> bool {
        matches!(self.mode, ShadowMode::Multiview { .. })
    }

    fn missing(face: &str) -> RendererError {
        RendererError::MissingInput {
            pass: Self::NAME.to_string(),
            input: format!("shadow cube {}", face),
        }
    }
}

impl<B: GraphicsBackend> RenderPass<B> for ShadowPass {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn setup(&mut self, ctx: &mut PassSetupContext) {
        ctx.write("shadow_cube", ResourceUsage::DepthStencilWrite);
    }

    fn execute(&self, ctx: &mut PassExecuteContext<B>) -> Result<(), RendererError> {
        let (_, gpu_scene) = ctx.require_scene(Self::NAME)?;
        let map = &ctx.pipeline.shadow_map;
        let size = map.size() as f32;

        let draw_casters = |backend: &mut B| {
            for (slot, model) in gpu_scene.opaque() {
                backend.set_bind_group(1, slot);
                model.draw(backend, None, None);
            }
        };

        match &self.mode {
            ShadowMode::Multiview { bind_group } => {
                let view = map.layered_view(0).ok_or_else(|| Self::missing("layers"))?;
                ctx.backend.begin_render_pass(&RenderPassDescriptor {
                    label: Some(Self::NAME.to_string()),
                    color_attachments: Vec::new(),
                    depth_stencil_attachment: Some(DepthStencilAttachment::clear(view)),
                });
                ctx.backend.set_viewport(0.0, 0.0, size, size, 0.0, 1.0);
                ctx.backend.set_render_pipeline(self.pipeline);
                ctx.backend.set_bind_group(0, *bind_group);
                draw_casters(ctx.backend);
                ctx.backend.end_render_pass();
            }
            ShadowMode::PerFace { slots } => {
                for face in CubeFace::ALL {
                    let (Some(view), Some(uniforms)) =
                        (map.face_view(face, 0), slots.bind_group(face.index() as usize))
                    else {
                        return Err(Self::missing(&format!("{:?}", face)));
                    };
                    ctx.backend.begin_render_pass(&RenderPassDescriptor {
                        label: Some(format!("{} {:?}", Self::NAME, face)),
                        color_attachments: Vec::new(),
                        depth_stencil_attachment: Some(DepthStencilAttachment::clear(view)),
                    });
                    ctx.backend.set_viewport(0.0, 0.0, size, size, 0.0, 1.0);
                    ctx.backend.set_render_pipeline(self.pipeline);
                    ctx.backend.set_bind_group(0, uniforms);
                    draw_casters(ctx.backend);
                    ctx.backend.end_render_pass();
                }
            }
        }

        Ok(())
    }
}

const MULTIVIEW_SHADOW_SHADER: &str = r#"
struct ShadowUniform {
    view_projections: array<mat4x4<f32>, 6>,
    light: vec4<f32>,
}

@group(0) @binding(0) var<uniform> shadow: ShadowUniform;

struct ShadowOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) world_position: vec3<f32>,
}

@vertex
fn vs_main(@location(0) position: vec3<f32>, @builtin(view_index) view_index: i32) -> ShadowOutput {
    let world = object.model * vec4<f32>(position, 1.0);
    var output: ShadowOutput;
    output.world_position = world.xyz;
    output.clip_position = shadow.view_projections[view_index] * world;
    return output;
}

@fragment
fn fs_main(input: ShadowOutput) -> @builtin(frag_depth) f32 {
    return length(input.world_position - shadow.light.xyz) / shadow.light.w;
}
"#;

const PER_FACE_SHADOW_SHADER: &str = r#"
struct CaptureUniform {
    view_projection: mat4x4<f32>,
    params: vec4<f32>,
}

@group(0) @binding(0) var<uniform> shadow: CaptureUniform;

struct ShadowOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) world_position: vec3<f32>,
}

@vertex
fn vs_main(@location(0) position: vec3<f32>) -> ShadowOutput {
    let world = object.model * vec4<f32>(position, 1.0);
    var output: ShadowOutput;
    output.world_position = world.xyz;
    output.clip_position = shadow.view_projection * world;
    return output;
}

@fragment
fn fs_main(input: ShadowOutput) -> @builtin(frag_depth) f32 {
    return length(input.world_position - shadow.params.xyz) / shadow.params.w;
}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordingBackend;

    #[test]
    fn test_transforms_follow_light() {
        let light = Vec3::new(0.7, 0.2, 2.0);
        let shadow = ShadowContext::new(light, &ShadowSettings::default());
        let uniform = shadow.uniform();
        assert_eq!(uniform.light, Vec4::new(0.7, 0.2, 2.0, 25.0));
        for face in CubeFace::ALL {
            // Every face looks out from the light
            let eye = shadow.transforms().view(face).transform_point3(light);
            assert!(eye.abs_diff_eq(Vec3::ZERO, 1e-5));
            assert_eq!(uniform.view_projections[face.index() as usize], shadow.face_uniform(face).view_projection);
        }
    }

    #[test]
    fn test_zero_size_map_is_incomplete() {
        let mut backend = RecordingBackend::default();
        let shadow = ShadowContext::new(Vec3::ZERO, &ShadowSettings::default());
        let err = shadow.allocate_map(&mut backend, 0).unwrap_err();
        assert!(matches!(err, RendererError::IncompleteTarget { .. }));
    }

    #[test]
    fn test_moving_light_rebuilds_transforms() {
        let mut shadow = ShadowContext::new(Vec3::ZERO, &ShadowSettings::default());
        shadow.set_light_position(Vec3::X);
        assert_eq!(shadow.light_position(), Vec3::X);
        assert_eq!(shadow.far(), 25.0);
    }
}
