//! Backend abstraction layer
//!
//! The passes talk to the GPU only through [`GraphicsBackend`]. [`WgpuBackend`]
//! drives a real device; [`RecordingBackend`] records the command stream so the
//! pass ordering can be checked without hardware.

pub mod traits;
pub mod types;
pub mod wgpu_backend;

#[cfg(feature = "recording")]
pub mod recording;

pub use traits::*;
pub use types::*;
pub use wgpu_backend::WgpuBackend;

#[cfg(feature = "recording")]
pub use recording::{RecordedCommand, RecordedPass, RecordingBackend};
