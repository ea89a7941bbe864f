//! Window management and the event loop, using winit

use crate::app::App;
use crate::backend::WgpuBackend;
use crate::error::RendererError;
use crate::scene::CameraInput;
use crate::RendererConfig;
use std::sync::Arc;
use winit::{
    dpi::PhysicalSize,
    event::{ElementState, Event, MouseScrollDelta, WindowEvent},
    event_loop::{ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window as WinitWindow, WindowBuilder},
};

/// Pixels of trackpad scrolling equivalent to one wheel line
const PIXELS_PER_LINE: f32 = 20.0;

/// Wrapper around the winit window with resize and close state
pub struct Window {
    window: Arc<WinitWindow>,
    width: u32,
    height: u32,
    resized: bool,
    close_requested: bool,
}

impl Window {
    pub fn new(event_loop: &EventLoop<()>, config: &RendererConfig) -> Result<Self, RendererError> {
        let window = WindowBuilder::new()
            .with_title(&config.title)
            .with_inner_size(PhysicalSize::new(config.width, config.height))
            .build(event_loop)
            .map_err(|e| RendererError::EventLoop(e.to_string()))?;

        Ok(Self {
            window: Arc::new(window),
            width: config.width,
            height: config.height,
            resized: false,
            close_requested: false,
        })
    }

    /// Shared handle for backend initialization
    pub fn window_arc(&self) -> Arc<WinitWindow> {
        Arc::clone(&self.window)
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Size to apply if the window changed since the last call
    pub fn take_resize(&mut self) -> Option<(u32, u32)> {
        std::mem::take(&mut self.resized).then_some((self.width, self.height))
    }

    pub fn should_close(&self) -> bool {
        self.close_requested
    }

    /// Track window state and route camera input
    pub fn handle_event(&mut self, event: &WindowEvent, input: &mut CameraInput) {
        match event {
            WindowEvent::Resized(size) => {
                self.width = size.width;
                self.height = size.height;
                self.resized = true;
            }
            WindowEvent::CloseRequested => {
                self.close_requested = true;
            }
            WindowEvent::KeyboardInput { event, .. } => {
                let PhysicalKey::Code(code) = event.physical_key else {
                    return;
                };
                let pressed = event.state == ElementState::Pressed;
                match code {
                    KeyCode::Escape if pressed => self.close_requested = true,
                    KeyCode::KeyW => input.forward = pressed,
                    KeyCode::KeyS => input.backward = pressed,
                    KeyCode::KeyA => input.left = pressed,
                    KeyCode::KeyD => input.right = pressed,
                    _ => {}
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                input.cursor_moved(position.x as f32, position.y as f32);
            }
            WindowEvent::MouseWheel { delta, .. } => match delta {
                MouseScrollDelta::LineDelta(_, y) => input.scrolled(*y),
                MouseScrollDelta::PixelDelta(position) => input.scrolled(position.y as f32 / PIXELS_PER_LINE),
            },
            _ => {}
        }
    }

    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }
}

/// Open the window, set everything up and render until closed.
///
/// Setup failures return before the first frame. Resize failures are logged
/// and rendering continues; a failed frame stops the loop.
pub fn run(config: RendererConfig) -> Result<(), RendererError> {
    let event_loop = EventLoop::new().map_err(|e| RendererError::EventLoop(e.to_string()))?;
    let mut window = Window::new(&event_loop, &config)?;
    let mut app = App::<WgpuBackend>::new(window.window_arc(), config)?;
    let mut failure = None;

    event_loop
        .run(|event, elwt| {
            elwt.set_control_flow(ControlFlow::Poll);

            match event {
                Event::WindowEvent { event, .. } => {
                    window.handle_event(&event, app.input_mut());

                    if let WindowEvent::RedrawRequested = event {
                        if let Some((width, height)) = window.take_resize() {
                            if let Err(err) = app.resize(width, height) {
                                log::error!("Resize to {}x{} left the pipeline incomplete: {}", width, height, err);
                            }
                        }
                        if let Err(err) = app.frame() {
                            log::error!("Frame failed: {}", err);
                            failure = Some(err);
                            elwt.exit();
                        }
                    }

                    if window.should_close() {
                        elwt.exit();
                    }
                }
                Event::AboutToWait => {
                    window.request_redraw();
                }
                _ => {}
            }
        })
        .map_err(|e| RendererError::EventLoop(e.to_string()))?;

    failure.map_or(Ok(()), Err)
}
