//! Shared cube-capture machinery

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::error::RendererError;
use crate::resources::GpuMesh;
use crate::targets::{CubeFace, CubemapTexture, ScratchDepthBuffer};
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};

/// Stride between per-draw uniform slots
pub const UNIFORM_SLOT_STRIDE: u64 = 256;

/// One 90° projection plus a look-at view per cube face.
///
/// The projection flips Y so that rendering into a face with a top-left
/// framebuffer origin stores the face in standard cube addressing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureTransforms {
    origin: Vec3,
    near: f32,
    far: f32,
    projection: Mat4,
    views: [Mat4; 6],
}

impl Default for CaptureTransforms {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureTransforms {
    pub const NEAR: f32 = 0.1;
    pub const FAR: f32 = 10.0;

    /// Environment capture from the origin
    pub fn new() -> Self {
        Self::centered_at(Vec3::ZERO, Self::NEAR, Self::FAR)
    }

    pub fn centered_at(origin: Vec3, near: f32, far: f32) -> Self {
        let projection = Mat4::from_scale(Vec3::new(1.0, -1.0, 1.0))
            * Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, near, far);
        let views = CubeFace::ALL.map(|face| Mat4::look_at_rh(origin, origin + face.direction(), face.up()));

        Self {
            origin,
            near,
            far,
            projection,
            views,
        }
    }

    pub fn origin(&self) -> Vec3 {
        self.origin
    }

    pub fn near(&self) -> f32 {
        self.near
    }

    pub fn far(&self) -> f32 {
        self.far
    }

    pub fn projection(&self) -> Mat4 {
        self.projection
    }

    pub fn view(&self, face: CubeFace) -> Mat4 {
        self.views[face.index() as usize]
    }

    pub fn view_projection(&self, face: CubeFace) -> Mat4 {
        self.projection * self.view(face)
    }
}

/// Per-draw capture parameters
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct CaptureUniform {
    pub view_projection: Mat4,
    /// x: roughness, y: source face size, z: sample delta, w: target face size
    pub params: Vec4,
}

/// A uniform buffer split into fixed-stride slots, one bind group per slot.
///
/// Queue writes land before the submitted commands run, so every draw that
/// needs different values reads its own slot.
pub struct UniformSlots {
    buffer: BufferHandle,
    bind_groups: Vec<BindGroupHandle>,
}

impl UniformSlots {
    pub fn new<B: GraphicsBackend>(
        backend: &mut B,
        layout: BindGroupLayoutHandle,
        label: &str,
        count: usize,
        slot_size: u64,
    ) -> Result<Self, RendererError> {
        let buffer = backend.create_buffer(&BufferDescriptor {
            label: Some(label.to_string()),
            size: UNIFORM_SLOT_STRIDE * count as u64,
            usage: BufferUsage::UNIFORM | BufferUsage::COPY_DST,
        })?;

        let bind_groups = (0..count)
            .map(|slot| {
                backend.create_bind_group(
                    layout,
                    &[(
                        0,
                        BindGroupEntry::Buffer {
                            buffer,
                            offset: slot as u64 * UNIFORM_SLOT_STRIDE,
                            size: Some(slot_size),
                        },
                    )],
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { buffer, bind_groups })
    }

    pub fn write<B: GraphicsBackend, T: Pod>(&self, backend: &mut B, slot: usize, value: &T) {
        backend.write_buffer(
            self.buffer,
            slot as u64 * UNIFORM_SLOT_STRIDE,
            bytemuck::bytes_of(value),
        );
    }

    pub fn bind_group(&self, slot: usize) -> Option<BindGroupHandle> {
        self.bind_groups.get(slot).copied()
    }

    pub fn buffer(&self) -> BufferHandle {
        self.buffer
    }

    pub fn len(&self) -> usize {
        self.bind_groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bind_groups.is_empty()
    }
}

/// Layouts, sampler and geometry shared by every capture pass
pub struct CaptureResources {
    pub transforms: CaptureTransforms,
    pub uniform_layout: BindGroupLayoutHandle,
    pub panorama_layout: BindGroupLayoutHandle,
    pub cube_source_layout: BindGroupLayoutHandle,
    pub sampler: SamplerHandle,
    pub unit_cube: GpuMesh,
}

impl CaptureResources {
    pub fn new<B: GraphicsBackend>(backend: &mut B, unit_cube: GpuMesh) -> Result<Self, RendererError> {
        let uniform_layout = backend.create_bind_group_layout(&[BindGroupLayoutEntry {
            binding: 0,
            visibility: ShaderStageFlags::VERTEX_FRAGMENT,
            ty: BindingType::UniformBuffer,
        }])?;

        let source_layout = |backend: &mut B, dimension| {
            backend.create_bind_group_layout(&[
                BindGroupLayoutEntry {
                    binding: 0,
                    visibility: ShaderStageFlags::FRAGMENT,
                    ty: BindingType::float_texture(dimension),
                },
                BindGroupLayoutEntry {
                    binding: 1,
                    visibility: ShaderStageFlags::FRAGMENT,
                    ty: BindingType::Sampler(SamplerBindingType::Filtering),
                },
            ])
        };
        let panorama_layout = source_layout(backend, TextureViewDimension::D2)?;
        let cube_source_layout = source_layout(backend, TextureViewDimension::Cube)?;

        let sampler = backend.create_sampler(&SamplerDescriptor::linear("Capture Sampler"))?;

        Ok(Self {
            transforms: CaptureTransforms::new(),
            uniform_layout,
            panorama_layout,
            cube_source_layout,
            sampler,
            unit_cube,
        })
    }

    /// Bind group over a sampled source texture
    pub fn source_bind_group<B: GraphicsBackend>(
        &self,
        backend: &mut B,
        layout: BindGroupLayoutHandle,
        view: TextureViewHandle,
    ) -> Result<BindGroupHandle, RendererError> {
        Ok(backend.create_bind_group(
            layout,
            &[
                (0, BindGroupEntry::Texture(view)),
                (1, BindGroupEntry::Sampler(self.sampler)),
            ],
        )?)
    }

    /// Pipeline that draws the unit cube into one face of an HDR cubemap
    pub fn cube_pipeline<B: GraphicsBackend>(
        &self,
        backend: &mut B,
        label: &str,
        fragment: &str,
        source_layout: BindGroupLayoutHandle,
        format: TextureFormat,
    ) -> Result<RenderPipelineHandle, RendererError> {
        Ok(backend.create_render_pipeline(&RenderPipelineDescriptor {
            label: Some(label.to_string()),
            shader: format!("{}{}", CAPTURE_VERTEX_SHADER, fragment),
            has_fragment: true,
            vertex_layouts: vec![Vertex::layout()],
            bind_group_layouts: vec![self.uniform_layout, source_layout],
            primitive_topology: PrimitiveTopology::TriangleList,
            front_face: FrontFace::Ccw,
            cull_mode: CullMode::None,
            depth_stencil: Some(DepthStencilState::depth(
                ScratchDepthBuffer::FORMAT,
                true,
                CompareFunction::LessEqual,
            )),
            color_targets: vec![ColorTargetState::opaque(format)],
            sample_count: 1,
            multiview: None,
        })?)
    }

    /// Uniform value for `face` with the given parameters
    pub fn face_uniform(&self, face: CubeFace, params: Vec4) -> CaptureUniform {
        CaptureUniform {
            view_projection: self.transforms.view_projection(face),
            params,
        }
    }
}

/// Draw the unit cube into every face of `target` at `mip`, in face order.
///
/// `slot_base + face` selects the uniform slot holding that face's transform.
#[allow(clippy::too_many_arguments)]
pub fn capture_faces<B: GraphicsBackend>(
    backend: &mut B,
    label: &str,
    capture: &CaptureResources,
    scratch: &ScratchDepthBuffer,
    target: &CubemapTexture,
    mip: u32,
    pipeline: RenderPipelineHandle,
    slots: &UniformSlots,
    slot_base: usize,
    source: BindGroupHandle,
) -> Result<(), RendererError> {
    let size = target.mip_size(mip);
    scratch.ensure_size(label, size, size)?;

    for face in CubeFace::ALL {
        let (Some(view), Some(uniforms)) = (
            target.face_view(face, mip),
            slots.bind_group(slot_base + face.index() as usize),
        ) else {
            return Err(RendererError::MissingInput {
                pass: label.to_string(),
                input: format!("{} face {:?} mip {}", target.label(), face, mip),
            });
        };

        backend.begin_render_pass(&RenderPassDescriptor {
            label: Some(format!("{} {:?} mip {}", label, face, mip)),
            color_attachments: vec![ColorAttachment::clear(view, [0.0, 0.0, 0.0, 1.0])],
            depth_stencil_attachment: Some(DepthStencilAttachment::clear(scratch.view())),
        });
        backend.set_viewport(0.0, 0.0, size as f32, size as f32, 0.0, 1.0);
        backend.set_render_pipeline(pipeline);
        backend.set_bind_group(0, uniforms);
        backend.set_bind_group(1, source);
        capture.unit_cube.draw(backend);
        backend.end_render_pass();
    }

    Ok(())
}

/// Vertex stage shared by cube captures; fragment stages append to it
pub const CAPTURE_VERTEX_SHADER: &str = r#"
struct CaptureUniform {
    view_projection: mat4x4<f32>,
    params: vec4<f32>,
}

@group(0) @binding(0) var<uniform> capture: CaptureUniform;

struct CaptureOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) local_position: vec3<f32>,
}

@vertex
fn vs_main(@location(0) position: vec3<f32>) -> CaptureOutput {
    var output: CaptureOutput;
    output.local_position = position;
    output.clip_position = capture.view_projection * vec4<f32>(position, 1.0);
    return output;
}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    /// Un-project texel (x, y) of a face back into a world direction
    fn unproject(transforms: &CaptureTransforms, face: CubeFace, x: u32, y: u32, size: u32) -> Vec3 {
        let ndc_x = (x as f32 + 0.5) / size as f32 * 2.0 - 1.0;
        // Row 0 is the top of the framebuffer
        let ndc_y = 1.0 - (y as f32 + 0.5) / size as f32 * 2.0;
        let world = transforms.view_projection(face).inverse() * Vec4::new(ndc_x, ndc_y, 0.5, 1.0);
        (world.truncate() / world.w - transforms.origin()).normalize()
    }

    #[rstest]
    #[case::positive_x(CubeFace::PositiveX)]
    #[case::negative_x(CubeFace::NegativeX)]
    #[case::positive_y(CubeFace::PositiveY)]
    #[case::negative_y(CubeFace::NegativeY)]
    #[case::positive_z(CubeFace::PositiveZ)]
    #[case::negative_z(CubeFace::NegativeZ)]
    fn test_face_pixels_map_to_cube_directions(#[case] face: CubeFace) {
        let transforms = CaptureTransforms::new();
        let size = 8;
        for y in 0..size {
            for x in 0..size {
                let got = unproject(&transforms, face, x, y, size);
                let expected = face.texel_direction(x, y, size);
                assert!(
                    got.abs_diff_eq(expected, 1e-4),
                    "{:?} texel ({}, {}): {} != {}",
                    face,
                    x,
                    y,
                    got,
                    expected
                );
            }
        }
    }

    #[rstest]
    #[case::positive_x(CubeFace::PositiveX)]
    #[case::negative_y(CubeFace::NegativeY)]
    #[case::negative_z(CubeFace::NegativeZ)]
    fn test_centered_transforms_look_from_origin(#[case] face: CubeFace) {
        let light = Vec3::new(0.7, 0.2, 2.0);
        let transforms = CaptureTransforms::centered_at(light, 1.0, 25.0);
        let got = unproject(&transforms, face, 2, 5, 8);
        assert!(got.abs_diff_eq(face.texel_direction(2, 5, 8), 1e-4));
    }

    #[test]
    fn test_uniform_fits_in_slot() {
        assert!(std::mem::size_of::<CaptureUniform>() as u64 <= UNIFORM_SLOT_STRIDE);
    }
}
