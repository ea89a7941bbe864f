//! Image-based lighting precompute
//!
//! Four offscreen passes run once before the first frame:
//!
//! 1. [`EquirectPass`] projects the HDR panorama onto the environment cube
//!    and fills its mip chain
//! 2. [`IrradiancePass`] convolves the environment into diffuse irradiance
//! 3. [`PrefilterPass`] bakes the roughness-indexed specular [`MipChain`]
//! 4. [`BrdfLutPass`] integrates the split-sum BRDF table
//!
//! All four share one [`ScratchDepthBuffer`](crate::targets::ScratchDepthBuffer),
//! declared as the graph resource `capture_depth`, so the graph keeps them in
//! insertion order and each pass resizes the buffer before drawing.

mod brdf_lut;
pub mod capture;
pub mod cpu;
mod equirect;
mod irradiance;
mod prefilter;

pub use brdf_lut::*;
pub use capture::{CaptureResources, CaptureTransforms, CaptureUniform, UniformSlots};
pub use equirect::*;
pub use irradiance::*;
pub use prefilter::*;

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::error::RendererError;
use crate::pipeline::PipelineContext;
use crate::render_graph::*;
use crate::resources::HdrImage;
use crate::targets::{AttachmentDesc, CubemapTexture, RenderTarget, RenderTargetDesc};

pub const ENVIRONMENT_SIZE: u32 = 512;
pub const IRRADIANCE_SIZE: u32 = 32;
pub const PREFILTER_SIZE: u32 = 128;
pub const PREFILTER_MIP_LEVELS: u32 = 5;
pub const BRDF_LUT_SIZE: u32 = 512;

pub const CUBE_FORMAT: TextureFormat = TextureFormat::Rgba16Float;
pub const BRDF_LUT_FORMAT: TextureFormat = TextureFormat::Rg16Float;

/// Resolutions of the baked maps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IblSettings {
    pub environment_size: u32,
    pub irradiance_size: u32,
    pub prefilter_size: u32,
    pub prefilter_mip_levels: u32,
    pub brdf_lut_size: u32,
}

impl Default for IblSettings {
    fn default() -> Self {
        Self {
            environment_size: ENVIRONMENT_SIZE,
            irradiance_size: IRRADIANCE_SIZE,
            prefilter_size: PREFILTER_SIZE,
            prefilter_mip_levels: PREFILTER_MIP_LEVELS,
            brdf_lut_size: BRDF_LUT_SIZE,
        }
    }
}

/// The baked lighting environment, read by the scene pass every frame
pub struct IblMaps {
    pub environment: CubemapTexture,
    pub irradiance: CubemapTexture,
    pub prefilter: CubemapTexture,
    pub brdf_lut: RenderTarget,
}

impl IblMaps {
    pub fn allocate<B: GraphicsBackend>(backend: &mut B, settings: &IblSettings) -> Result<Self, RendererError> {
        let environment = CubemapTexture::create(
            backend,
            "Environment Cubemap",
            settings.environment_size,
            TextureDescriptor::full_mip_count(settings.environment_size, settings.environment_size),
            CUBE_FORMAT,
        )?;
        let irradiance = CubemapTexture::create(backend, "Irradiance Cubemap", settings.irradiance_size, 1, CUBE_FORMAT)?;
        let prefilter = CubemapTexture::create(
            backend,
            "Prefilter Cubemap",
            settings.prefilter_size,
            settings.prefilter_mip_levels,
            CUBE_FORMAT,
        )?;
        let brdf_lut = RenderTarget::create(
            backend,
            RenderTargetDesc {
                label: "BRDF LUT".to_string(),
                size: TextureSize::square(settings.brdf_lut_size),
                sample_count: 1,
                color: vec![AttachmentDesc::sampled("Color", BRDF_LUT_FORMAT)],
                depth: None,
            },
            settings.brdf_lut_size,
            settings.brdf_lut_size,
        )?;

        Ok(Self {
            environment,
            irradiance,
            prefilter,
            brdf_lut,
        })
    }
}

/// Assemble the precompute graph over the maps in `ctx.ibl`
pub fn build_precompute_graph<B: GraphicsBackend>(
    backend: &mut B,
    ctx: &PipelineContext,
    panorama: &HdrImage,
) -> Result<RenderGraphExecutor<B>, RendererError> {
    let equirect = EquirectPass::new(backend, ctx, panorama)?;
    let irradiance = IrradiancePass::new(backend, ctx)?;
    let prefilter = PrefilterPass::new(backend, ctx)?;
    let brdf = BrdfLutPass::new(backend, ctx)?;

    let executor = RenderGraphBuilder::new()
        .graphics_pass(equirect)?
        .graphics_pass(irradiance)?
        .graphics_pass(prefilter)?
        .graphics_pass(brdf)?
        .compile()?;
    Ok(executor)
}

/// Bake every IBL map in one submission
pub fn run_precompute<B: GraphicsBackend>(
    backend: &mut B,
    ctx: &mut PipelineContext,
    panorama: &HdrImage,
) -> Result<(), RendererError> {
    let executor = build_precompute_graph(backend, ctx, panorama)?;
    log::info!("IBL precompute: {}", executor.pass_names().join(" -> "));

    backend.begin_commands("IBL Precompute");
    let result = executor.execute(&mut PassExecuteContext::offscreen(backend, ctx));
    backend.submit_commands();
    result?;

    log::info!("IBL precompute finished");
    Ok(())
}
