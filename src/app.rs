//! Application orchestrator
//!
//! Setup runs once and in a fixed order: pipeline targets, the IBL precompute
//! submission, the scene upload, then the frame graph. Any failure along the
//! way is fatal and no frame is rendered.

use crate::backend::traits::*;
use crate::error::RendererError;
use crate::ibl::run_precompute;
use crate::metrics::FrameMetrics;
use crate::pipeline::{build_frame_graph, PipelineContext};
use crate::render_graph::{PassExecuteContext, RenderGraphExecutor};
use crate::resources::HdrImage;
use crate::scene::{CameraInput, GpuScene, Scene};
use crate::RendererConfig;
use glam::Vec3;
use std::sync::Arc;
use winit::window::Window as WinitWindow;

pub struct App<B: GraphicsBackend> {
    backend: B,
    config: RendererConfig,
    scene: Scene,
    gpu_scene: GpuScene,
    pipeline: PipelineContext,
    frame_graph: RenderGraphExecutor<B>,
    input: CameraInput,
    metrics: FrameMetrics,
}

impl<B: GraphicsBackend> App<B> {
    /// Create the backend on `window` and load the configured panorama
    pub fn new(window: Arc<WinitWindow>, config: RendererConfig) -> Result<Self, RendererError> {
        let backend = B::new(window, config.vsync)?;
        let panorama = HdrImage::from_file(config.asset_root.join(&config.hdr_path))?;
        Self::with_backend(backend, config, &panorama)
    }

    /// Build everything on an existing backend from an already decoded panorama
    pub fn with_backend(mut backend: B, config: RendererConfig, panorama: &HdrImage) -> Result<Self, RendererError> {
        let mut scene = Scene::demo(config.transparent_sort);
        let (width, height) = backend.surface_size();
        scene.camera.set_aspect(width, height);

        let shadow_light = scene.shadow_light().map_or(Vec3::ZERO, |light| light.position);
        let mut pipeline = PipelineContext::new(&mut backend, config.render_settings(), &scene.camera, shadow_light)?;
        pipeline.write_lighting(&mut backend, &scene.lights);

        run_precompute(&mut backend, &mut pipeline, panorama)?;

        let gpu_scene = GpuScene::upload(&mut backend, &pipeline, &scene, &config.asset_root)?;
        let frame_graph = build_frame_graph(&mut backend, &pipeline)?;

        Ok(Self {
            backend,
            config,
            scene,
            gpu_scene,
            pipeline,
            frame_graph,
            input: CameraInput::new(),
            metrics: FrameMetrics::default(),
        })
    }

    /// Advance by the wall-clock time since the last frame and render
    pub fn frame(&mut self) -> Result<(), RendererError> {
        let delta = self.metrics.tick();
        self.render_frame(delta.as_secs_f32())
    }

    /// Apply input, update the scene and run the frame graph once
    pub fn render_frame(&mut self, delta_time: f32) -> Result<(), RendererError> {
        let change = self.input.apply(&mut self.scene.camera, delta_time);
        if change.view {
            self.pipeline.camera.patch_view(&mut self.backend, &self.scene.camera);
        }
        if change.projection {
            self.pipeline.camera.patch_projection(&mut self.backend, &self.scene.camera);
        }
        self.scene.update();
        self.gpu_scene.update(&mut self.backend, &self.scene);

        let frame = match self.backend.begin_frame() {
            Ok(frame) => frame,
            Err(BackendError::SurfaceLost) => {
                log::error!("Surface lost, reconfiguring");
                let (width, height) = self.pipeline.surface_size;
                self.backend.resize(width, height);
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };

        let result = self.frame_graph.execute(&mut PassExecuteContext {
            backend: &mut self.backend,
            pipeline: &mut self.pipeline,
            scene: Some(&self.scene),
            gpu_scene: Some(&self.gpu_scene),
            surface_view: Some(frame.swapchain_view),
        });
        self.backend.end_frame()?;
        result
    }

    /// Reallocate the surface and every window-sized target.
    ///
    /// An incomplete target is logged and returned, but the app stays usable
    /// and keeps rendering into whatever was allocated.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), RendererError> {
        if width == 0 || height == 0 {
            return Ok(());
        }
        self.backend.resize(width, height);
        self.scene.camera.set_aspect(width, height);
        self.pipeline.camera.patch_projection(&mut self.backend, &self.scene.camera);

        let validated = self.pipeline.resize(&mut self.backend, width, height);
        let rebound = self.frame_graph.resize(&mut self.backend, &self.pipeline);
        validated.and(rebound)
    }

    pub fn input_mut(&mut self) -> &mut CameraInput {
        &mut self.input
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn gpu_scene(&self) -> &GpuScene {
        &self.gpu_scene
    }

    pub fn pipeline(&self) -> &PipelineContext {
        &self.pipeline
    }

    pub fn frame_graph(&self) -> &RenderGraphExecutor<B> {
        &self.frame_graph
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}
