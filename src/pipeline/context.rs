//! Ownership of every GPU target the passes render into or sample from

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::error::RendererError;
use crate::ibl::{CaptureResources, IblMaps, IblSettings};
use crate::pipeline::postprocess::TonemapOperator;
use crate::pipeline::shadow::{ShadowContext, ShadowSettings};
use crate::render_graph::TextureSize;
use crate::resources::{GpuMaterial, GpuMesh, Mesh};
use crate::scene::{Camera, CameraUniformBuffer, LightingUniform, PointLight};
use crate::targets::*;
use bytemuck::Zeroable;
use glam::Vec3;

/// HDR format of the scene color, bloom and blur targets
pub const HDR_FORMAT: TextureFormat = TextureFormat::Rgba16Float;
/// Depth/stencil format of the multisampled scene target
pub const SCENE_DEPTH_FORMAT: TextureFormat = TextureFormat::Depth24PlusStencil8;

/// Tunables of the frame pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct RenderSettings {
    pub msaa_samples: u32,
    pub blur_iterations: u32,
    pub bloom_threshold: f32,
    pub exposure: f32,
    pub tonemap: TonemapOperator,
    pub shadow: ShadowSettings,
    pub ibl: IblSettings,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            msaa_samples: 4,
            blur_iterations: 10,
            bloom_threshold: 1.0,
            exposure: 1.0,
            tonemap: TonemapOperator::default(),
            shadow: ShadowSettings::default(),
            ibl: IblSettings::default(),
        }
    }
}

/// Bind group layouts shared by the scene shaders
pub struct SceneLayouts {
    /// Group 0: camera block, lighting block
    pub frame: BindGroupLayoutHandle,
    /// Group 1: one object uniform slot
    pub object: BindGroupLayoutHandle,
    /// Group 2: material texture set
    pub material: BindGroupLayoutHandle,
    /// Group 3: irradiance, prefilter, BRDF LUT, shadow cube and samplers
    pub environment: BindGroupLayoutHandle,
}

impl SceneLayouts {
    fn new<B: GraphicsBackend>(backend: &mut B) -> BackendResult<Self> {
        let uniform = |binding| BindGroupLayoutEntry {
            binding,
            visibility: ShaderStageFlags::VERTEX_FRAGMENT,
            ty: BindingType::UniformBuffer,
        };
        let fragment = |binding, ty| BindGroupLayoutEntry {
            binding,
            visibility: ShaderStageFlags::FRAGMENT,
            ty,
        };

        let frame = backend.create_bind_group_layout(&[uniform(0), uniform(1)])?;
        let object = backend.create_bind_group_layout(&[uniform(0)])?;
        let material = backend.create_bind_group_layout(&GpuMaterial::layout_entries())?;
        let environment = backend.create_bind_group_layout(&[
            fragment(0, BindingType::float_texture(TextureViewDimension::Cube)),
            fragment(1, BindingType::float_texture(TextureViewDimension::Cube)),
            fragment(2, BindingType::float_texture(TextureViewDimension::D2)),
            fragment(3, BindingType::Sampler(SamplerBindingType::Filtering)),
            fragment(
                4,
                BindingType::Texture {
                    sample_type: TextureSampleType::Depth,
                    view_dimension: TextureViewDimension::Cube,
                },
            ),
            fragment(5, BindingType::Sampler(SamplerBindingType::Comparison)),
        ])?;

        Ok(Self {
            frame,
            object,
            material,
            environment,
        })
    }
}

/// Samplers shared across passes
pub struct Samplers {
    /// Clamped trilinear, for IBL maps and post-processing
    pub linear: SamplerHandle,
    /// Repeating trilinear, for material textures
    pub material: SamplerHandle,
    /// Depth comparison for the shadow cube
    pub shadow: SamplerHandle,
}

/// Owns all targets, textures and shared buffers of the renderer. Passes
/// borrow it through [`PassExecuteContext`](crate::render_graph::PassExecuteContext)
/// instead of reaching for globals.
pub struct PipelineContext {
    pub settings: RenderSettings,
    pub surface_format: TextureFormat,
    pub surface_size: (u32, u32),
    pub features: BackendFeatures,

    pub capture: CaptureResources,
    pub scratch_depth: ScratchDepthBuffer,
    pub ibl: IblMaps,

    pub shadow: ShadowContext,
    pub shadow_map: CubemapTexture,

    /// Multisampled color + bloom + depth/stencil
    pub scene_target: RenderTarget,
    pub resolved_color: RenderTarget,
    pub resolved_bloom: RenderTarget,
    pub ping_pong: PingPongPair,

    pub camera: CameraUniformBuffer,
    pub lighting: BufferHandle,
    pub frame_bind_group: BindGroupHandle,
    pub layouts: SceneLayouts,
    pub samplers: Samplers,
    pub unit_cube: GpuMesh,
}

impl PipelineContext {
    pub fn new<B: GraphicsBackend>(
        backend: &mut B,
        settings: RenderSettings,
        camera: &Camera,
        shadow_light: Vec3,
    ) -> Result<Self, RendererError> {
        let (width, height) = backend.surface_size();
        let surface_format = backend.swapchain_format();
        let features = backend.features();

        let unit_cube = GpuMesh::upload(backend, &Mesh::cube())?;
        let capture = CaptureResources::new(backend, unit_cube)?;
        let scratch_depth = ScratchDepthBuffer::new(
            backend,
            settings.ibl.environment_size,
            settings.ibl.environment_size,
        )?;
        let ibl = IblMaps::allocate(backend, &settings.ibl)?;

        let shadow = ShadowContext::new(shadow_light, &settings.shadow);
        let shadow_map = shadow.allocate_map(backend, settings.shadow.size)?;

        let scene_target = RenderTarget::create(
            backend,
            RenderTargetDesc {
                label: "Scene MSAA".to_string(),
                size: TextureSize::default(),
                sample_count: settings.msaa_samples,
                color: vec![
                    AttachmentDesc::attachment_only("Color", HDR_FORMAT),
                    AttachmentDesc::attachment_only("Bloom", HDR_FORMAT),
                ],
                depth: Some(AttachmentDesc::attachment_only("Depth Stencil", SCENE_DEPTH_FORMAT)),
            },
            width,
            height,
        )?;
        let resolved = |backend: &mut B, label: &str| {
            RenderTarget::create(
                backend,
                RenderTargetDesc {
                    label: label.to_string(),
                    size: TextureSize::default(),
                    sample_count: 1,
                    color: vec![AttachmentDesc::sampled("Color", HDR_FORMAT)],
                    depth: None,
                },
                width,
                height,
            )
        };
        let resolved_color = resolved(backend, "Resolved Color")?;
        let resolved_bloom = resolved(backend, "Resolved Bloom")?;
        let ping_pong = PingPongPair::create(backend, HDR_FORMAT, width, height)?;

        let layouts = SceneLayouts::new(backend)?;
        let samplers = Samplers {
            linear: backend.create_sampler(&SamplerDescriptor::linear("Linear Sampler"))?,
            material: backend.create_sampler(&SamplerDescriptor::repeat("Material Sampler"))?,
            shadow: backend.create_sampler(&SamplerDescriptor {
                compare: Some(CompareFunction::LessEqual),
                ..SamplerDescriptor::linear("Shadow Sampler")
            })?,
        };

        let camera = CameraUniformBuffer::new(backend, camera)?;
        let lighting = backend.create_buffer_init(
            &BufferDescriptor {
                label: Some("Lighting Uniforms".to_string()),
                size: std::mem::size_of::<LightingUniform>() as u64,
                usage: BufferUsage::UNIFORM | BufferUsage::COPY_DST,
            },
            bytemuck::bytes_of(&LightingUniform::zeroed()),
        )?;
        let frame_bind_group = backend.create_bind_group(
            layouts.frame,
            &[
                (
                    0,
                    BindGroupEntry::Buffer {
                        buffer: camera.buffer(),
                        offset: 0,
                        size: Some(CameraUniformBuffer::size()),
                    },
                ),
                (
                    1,
                    BindGroupEntry::Buffer {
                        buffer: lighting,
                        offset: 0,
                        size: None,
                    },
                ),
            ],
        )?;

        log::info!(
            "Pipeline targets allocated at {}x{} ({}x MSAA, surface {:?})",
            width,
            height,
            settings.msaa_samples,
            surface_format
        );

        Ok(Self {
            settings,
            surface_format,
            surface_size: (width, height),
            features,
            capture,
            scratch_depth,
            ibl,
            shadow,
            shadow_map,
            scene_target,
            resolved_color,
            resolved_bloom,
            ping_pong,
            camera,
            lighting,
            frame_bind_group,
            layouts,
            samplers,
            unit_cube,
        })
    }

    /// Rewrite the lighting block from the scene's lights
    pub fn write_lighting<B: GraphicsBackend>(&self, backend: &mut B, lights: &[PointLight]) {
        let uniform = LightingUniform::new(
            lights,
            self.shadow.light_position(),
            self.shadow.far(),
            self.settings.bloom_threshold,
            self.ibl.prefilter.mip_levels().saturating_sub(1) as f32,
        );
        backend.write_buffer(self.lighting, 0, bytemuck::bytes_of(&uniform));
    }

    /// Reallocate every window-sized target; contents become undefined.
    ///
    /// Every target is reallocated even if an earlier one fails, then all of
    /// them are validated. Failures are logged and the first one is returned,
    /// but the targets stay in place, so a caller that keeps rendering draws
    /// into whatever the backend allocated.
    pub fn resize<B: GraphicsBackend>(&mut self, backend: &mut B, width: u32, height: u32) -> Result<(), RendererError> {
        if width == 0 || height == 0 {
            return Ok(());
        }
        log::info!(
            "Resizing frame targets {}x{} -> {}x{}",
            self.surface_size.0,
            self.surface_size.1,
            width,
            height
        );

        let reallocated = [
            self.scene_target.resize(backend, width, height).map(drop),
            self.resolved_color.resize(backend, width, height).map(drop),
            self.resolved_bloom.resize(backend, width, height).map(drop),
            self.ping_pong.resize(backend, width, height).map(drop),
        ];
        self.surface_size = (width, height);

        let mut first_error = None;
        for err in reallocated.into_iter().filter_map(Result::err) {
            log::error!("{}", err);
            first_error.get_or_insert(err);
        }
        match first_error {
            Some(err) => Err(err),
            None => self.validate().inspect_err(|err| log::error!("{}", err)),
        }
    }

    /// Check every window-sized target is complete
    pub fn validate(&self) -> Result<(), RendererError> {
        self.scene_target.validate()?;
        self.resolved_color.validate()?;
        self.resolved_bloom.validate()?;
        self.ping_pong.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordingBackend;

    fn context(backend: &mut RecordingBackend) -> PipelineContext {
        PipelineContext::new(backend, RenderSettings::default(), &Camera::default(), Vec3::new(0.7, 0.2, 2.0)).unwrap()
    }

    #[test]
    fn test_scene_target_is_multisampled_with_two_colors() {
        let mut backend = RecordingBackend::default();
        let ctx = context(&mut backend);
        assert_eq!(ctx.scene_target.sample_count(), 4);
        assert_eq!(ctx.scene_target.color_count(), 2);
        assert_eq!(ctx.scene_target.depth_format(), Some(SCENE_DEPTH_FORMAT));
        assert_eq!(ctx.resolved_color.sample_count(), 1);
    }

    #[test]
    fn test_resize_reallocates_window_targets() {
        let mut backend = RecordingBackend::default();
        let mut ctx = context(&mut backend);
        ctx.resize(&mut backend, 1920, 1080).unwrap();

        assert_eq!(ctx.scene_target.size(), (1920, 1080));
        assert_eq!(ctx.resolved_bloom.size(), (1920, 1080));
        assert_eq!(ctx.ping_pong.size(), (1920, 1080));
        let depth = ctx.scene_target.depth().unwrap();
        let desc = backend.texture(depth.texture).unwrap();
        assert_eq!((desc.width, desc.height), (1920, 1080));
        // Fixed-size maps are untouched
        assert_eq!(ctx.shadow_map.size(), 1024);
    }

    #[test]
    fn test_failed_resize_still_reallocates_every_target() {
        let mut backend = RecordingBackend::default().with_max_texture_size(4096);
        let mut ctx = context(&mut backend);

        let err = ctx.resize(&mut backend, 5000, 1000).err();
        assert!(matches!(err, Some(RendererError::Backend(_))), "{:?}", err);
        assert_eq!(ctx.surface_size, (5000, 1000));
        // The later targets were released too instead of being skipped
        assert!(ctx.scene_target.validate().is_err());
        assert!(ctx.resolved_color.validate().is_err());
        assert!(ctx.resolved_bloom.validate().is_err());
        assert!(ctx.ping_pong.validate().is_err());

        ctx.resize(&mut backend, 1920, 1080).unwrap();
        assert!(ctx.validate().is_ok());
        assert_eq!(ctx.ping_pong.target(1).size(), (1920, 1080));
    }

    #[test]
    fn test_zero_size_resize_is_ignored() {
        let mut backend = RecordingBackend::default();
        let mut ctx = context(&mut backend);
        ctx.resize(&mut backend, 0, 0).unwrap();
        assert_eq!(ctx.scene_target.size(), (1280, 720));
    }
}
