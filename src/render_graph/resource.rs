//! Virtual resources for the render graph
//!
//! Resources are named slots. The textures behind them are owned by the
//! pipeline context; the graph only tracks who produces and who consumes them.

/// Unique identifier for a render graph resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub(crate) u32);

/// Named resource in the render graph
#[derive(Debug, Clone)]
pub struct VirtualResource {
    pub id: ResourceId,
    pub name: String,
    /// Produced outside this graph (precomputed maps, swapchain)
    pub external: bool,
}

/// How a pass uses a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceUsage {
    /// Read as a texture (sampled)
    TextureRead,
    /// Write as a render target
    RenderTarget,
    /// Resolve destination of a multisampled attachment
    ResolveTarget,
    /// Depth/stencil attachment
    DepthStencilRead,
    DepthStencilWrite,
    /// Read as uniform buffer
    UniformBuffer,
}

/// Resource access declaration for a pass
#[derive(Debug, Clone)]
pub struct ResourceAccess {
    pub resource: ResourceId,
    pub usage: ResourceUsage,
}

impl ResourceAccess {
    pub fn is_read(&self) -> bool {
        matches!(
            self.usage,
            ResourceUsage::TextureRead | ResourceUsage::DepthStencilRead | ResourceUsage::UniformBuffer
        )
    }

    pub fn is_write(&self) -> bool {
        matches!(
            self.usage,
            ResourceUsage::RenderTarget | ResourceUsage::ResolveTarget | ResourceUsage::DepthStencilWrite
        )
    }
}

/// Describes texture dimensions that can be relative to screen size
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TextureSize {
    /// Absolute size in pixels
    Absolute { width: u32, height: u32 },
    /// Relative to screen size (1.0 = full screen)
    Relative { width_scale: f32, height_scale: f32 },
}

impl Default for TextureSize {
    fn default() -> Self {
        TextureSize::Relative {
            width_scale: 1.0,
            height_scale: 1.0,
        }
    }
}

impl TextureSize {
    pub fn square(size: u32) -> Self {
        TextureSize::Absolute {
            width: size,
            height: size,
        }
    }

    pub fn resolve(&self, screen_width: u32, screen_height: u32) -> (u32, u32) {
        match self {
            TextureSize::Absolute { width, height } => (*width, *height),
            TextureSize::Relative {
                width_scale,
                height_scale,
            } => (
                (((screen_width as f32) * width_scale) as u32).max(1),
                (((screen_height as f32) * height_scale) as u32).max(1),
            ),
        }
    }

    pub fn is_relative(&self) -> bool {
        matches!(self, TextureSize::Relative { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_size_follows_screen() {
        let size = TextureSize::default();
        assert_eq!(size.resolve(1920, 1080), (1920, 1080));
        let half = TextureSize::Relative {
            width_scale: 0.5,
            height_scale: 0.5,
        };
        assert_eq!(half.resolve(1280, 720), (640, 360));
    }

    #[test]
    fn test_absolute_size_ignores_screen() {
        assert_eq!(TextureSize::square(1024).resolve(1920, 1080), (1024, 1024));
    }
}
