//! PBR IBL Renderer - image-based lighting precompute and a multi-pass HDR
//! frame pipeline on wgpu
//!
//! # Features
//! - Render graph ordering passes from the resources they read and write
//! - IBL precompute: equirect to cubemap, irradiance, prefiltered specular
//!   mip chain and the split-sum BRDF LUT
//! - Omnidirectional shadow cube for one point light
//! - 4x MSAA color + bloom pass with stencil-outlined light markers, a skybox
//!   and sorted transparent quads
//! - Resolve, ping-pong Gaussian blur and a tone-mapped composite
//! - A recording backend that runs every pass without a GPU

pub mod app;
pub mod backend;
pub mod error;
pub mod ibl;
pub mod metrics;
pub mod pipeline;
pub mod render_graph;
pub mod resources;
pub mod scene;
pub mod targets;
pub mod window;

pub use app::App;
pub use backend::wgpu_backend::WgpuBackend;
pub use error::{GraphError, RendererError};
pub use window::{run, Window};

use ibl::IblSettings;
use pipeline::{RenderSettings, ShadowSettings, TonemapOperator};
use scene::TransparentSortPolicy;
use std::path::PathBuf;

/// Configuration for the renderer and its window
#[derive(Debug, Clone, PartialEq)]
pub struct RendererConfig {
    /// Window title
    pub title: String,
    /// Initial window width
    pub width: u32,
    /// Initial window height
    pub height: u32,
    /// Enable vsync
    pub vsync: bool,
    pub msaa_samples: u32,
    /// Equirectangular Radiance HDR panorama, relative to `asset_root`
    pub hdr_path: PathBuf,
    /// Base directory of every asset path
    pub asset_root: PathBuf,
    pub environment_size: u32,
    pub irradiance_size: u32,
    pub prefilter_size: u32,
    pub prefilter_mip_levels: u32,
    pub brdf_lut_size: u32,
    pub shadow_size: u32,
    pub shadow_near: f32,
    pub shadow_far: f32,
    pub blur_iterations: u32,
    pub bloom_threshold: f32,
    pub exposure: f32,
    pub tonemap: TonemapOperator,
    pub transparent_sort: TransparentSortPolicy,
}

impl Default for RendererConfig {
    fn default() -> Self {
        let ibl = IblSettings::default();
        let shadow = ShadowSettings::default();
        let render = RenderSettings::default();
        Self {
            title: "PBR IBL Renderer".to_string(),
            width: 1280,
            height: 720,
            vsync: true,
            msaa_samples: render.msaa_samples,
            hdr_path: PathBuf::from("textures/construction.hdr"),
            asset_root: PathBuf::from("."),
            environment_size: ibl.environment_size,
            irradiance_size: ibl.irradiance_size,
            prefilter_size: ibl.prefilter_size,
            prefilter_mip_levels: ibl.prefilter_mip_levels,
            brdf_lut_size: ibl.brdf_lut_size,
            shadow_size: shadow.size,
            shadow_near: shadow.near,
            shadow_far: shadow.far,
            blur_iterations: render.blur_iterations,
            bloom_threshold: render.bloom_threshold,
            exposure: render.exposure,
            tonemap: render.tonemap,
            transparent_sort: TransparentSortPolicy::default(),
        }
    }
}

impl RendererConfig {
    /// Pipeline tunables carried by this configuration
    pub fn render_settings(&self) -> RenderSettings {
        RenderSettings {
            msaa_samples: self.msaa_samples,
            blur_iterations: self.blur_iterations,
            bloom_threshold: self.bloom_threshold,
            exposure: self.exposure,
            tonemap: self.tonemap,
            shadow: ShadowSettings {
                size: self.shadow_size,
                near: self.shadow_near,
                far: self.shadow_far,
            },
            ibl: IblSettings {
                environment_size: self.environment_size,
                irradiance_size: self.irradiance_size,
                prefilter_size: self.prefilter_size,
                prefilter_mip_levels: self.prefilter_mip_levels,
                brdf_lut_size: self.brdf_lut_size,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_matches_render_defaults() {
        let config = RendererConfig::default();
        assert_eq!(config.render_settings(), RenderSettings::default());
        assert_eq!((config.width, config.height), (1280, 720));
        assert_eq!(config.transparent_sort, TransparentSortPolicy::OnceAtLoad);
        assert_eq!(config.tonemap, TonemapOperator::Exposure);
    }
}
