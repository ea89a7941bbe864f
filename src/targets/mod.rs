//! Render destinations shared by the precompute and frame passes

pub mod cubemap;
pub mod ping_pong;
pub mod render_target;
pub mod scratch_depth;

pub use cubemap::*;
pub use ping_pong::*;
pub use render_target::*;
pub use scratch_depth::*;
