//! PBR IBL demo
//!
//! Controls: WASD to move, mouse to look, scroll to zoom, ESC to quit.

use clap::Parser;
use pbr_ibl_renderer::pipeline::TonemapOperator;
use pbr_ibl_renderer::scene::TransparentSortPolicy;
use pbr_ibl_renderer::RendererConfig;
use std::path::PathBuf;
use std::process::ExitCode;

/// Tone mapping operator selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
enum CliTonemap {
    /// 1 - exp(-color * exposure)
    #[default]
    Exposure,
    Reinhard,
    Aces,
}

impl From<CliTonemap> for TonemapOperator {
    fn from(value: CliTonemap) -> Self {
        match value {
            CliTonemap::Exposure => TonemapOperator::Exposure,
            CliTonemap::Reinhard => TonemapOperator::Reinhard,
            CliTonemap::Aces => TonemapOperator::Aces,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "pbr-demo",
    about = "Image-based lighting, omni shadows and bloom over an HDR panorama"
)]
struct Args {
    /// Initial window width
    #[arg(long, default_value = "1280")]
    width: u32,

    /// Initial window height
    #[arg(long, default_value = "720")]
    height: u32,

    /// Disable vertical sync
    #[arg(long)]
    no_vsync: bool,

    /// Equirectangular Radiance HDR panorama, relative to the asset root
    #[arg(long, default_value = "textures/construction.hdr")]
    hdr: PathBuf,

    /// Directory every asset path is resolved against
    #[arg(long, default_value = ".")]
    assets: PathBuf,

    /// MSAA sample count of the scene pass
    #[arg(long, default_value = "4")]
    msaa: u32,

    /// Gaussian blur iterations over the bloom texture
    #[arg(long, default_value = "10")]
    blur_iterations: u32,

    #[arg(long, default_value = "1.0")]
    exposure: f32,

    #[arg(long, default_value = "exposure", value_enum)]
    tonemap: CliTonemap,

    /// Re-sort the window panes every frame instead of once at load
    #[arg(long)]
    sort_transparent_per_frame: bool,
}

impl Args {
    fn into_config(self) -> RendererConfig {
        RendererConfig {
            width: self.width,
            height: self.height,
            vsync: !self.no_vsync,
            hdr_path: self.hdr,
            asset_root: self.assets,
            msaa_samples: self.msaa,
            blur_iterations: self.blur_iterations,
            exposure: self.exposure,
            tonemap: self.tonemap.into(),
            transparent_sort: if self.sort_transparent_per_frame {
                TransparentSortPolicy::PerFrame
            } else {
                TransparentSortPolicy::OnceAtLoad
            },
            ..RendererConfig::default()
        }
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Args::parse().into_config();
    log::info!("Starting {} at {}x{}", config.title, config.width, config.height);

    match pbr_ibl_renderer::run(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{}", err);
            ExitCode::FAILURE
        }
    }
}
