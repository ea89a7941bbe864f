//! Shared depth attachment for capture passes

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::error::RendererError;

/// A single depth attachment reused by every capture pass.
///
/// `resize` re-specifies the storage at a new size. Anything rendered with the
/// previous storage is invalidated unless it was already submitted, so a pass
/// must resize before it starts and must not share the buffer with a pass of a
/// different size in the same submission.
pub struct ScratchDepthBuffer {
    texture: TextureHandle,
    view: TextureViewHandle,
    width: u32,
    height: u32,
    resizes: usize,
}

impl ScratchDepthBuffer {
    pub const FORMAT: TextureFormat = TextureFormat::Depth32Float;

    pub fn new<B: GraphicsBackend>(backend: &mut B, width: u32, height: u32) -> Result<Self, RendererError> {
        let (texture, view) = Self::allocate(backend, width, height)?;
        Ok(Self {
            texture,
            view,
            width,
            height,
            resizes: 0,
        })
    }

    fn allocate<B: GraphicsBackend>(
        backend: &mut B,
        width: u32,
        height: u32,
    ) -> Result<(TextureHandle, TextureViewHandle), RendererError> {
        let texture = backend.create_texture(&TextureDescriptor {
            label: Some("Capture Depth".to_string()),
            width,
            height,
            format: Self::FORMAT,
            usage: TextureUsage::RENDER_ATTACHMENT,
            ..Default::default()
        })?;
        let view = backend.create_texture_view(texture, &TextureViewDescriptor::default())?;
        Ok((texture, view))
    }

    /// Re-specify the storage at `width`×`height`; a no-op at the current size
    pub fn resize<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        width: u32,
        height: u32,
    ) -> Result<(), RendererError> {
        if (width, height) == (self.width, self.height) {
            return Ok(());
        }

        log::debug!(
            "Scratch depth {}x{} -> {}x{}",
            self.width,
            self.height,
            width,
            height
        );

        let (texture, view) = Self::allocate(backend, width, height)?;
        backend.destroy_texture_view(self.view);
        backend.destroy_texture(self.texture);
        self.texture = texture;
        self.view = view;
        self.width = width;
        self.height = height;
        self.resizes += 1;
        Ok(())
    }

    /// Check the buffer matches what `pass` is about to render at
    pub fn ensure_size(&self, pass: &str, width: u32, height: u32) -> Result<(), RendererError> {
        if (width, height) != (self.width, self.height) {
            return Err(RendererError::ScratchSizeMismatch {
                pass: pass.to_string(),
                expected: (width, height),
                actual: (self.width, self.height),
            });
        }
        Ok(())
    }

    pub fn view(&self) -> TextureViewHandle {
        self.view
    }

    pub fn texture(&self) -> TextureHandle {
        self.texture
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Number of times the storage was re-specified
    pub fn resize_count(&self) -> usize {
        self.resizes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordingBackend;

    #[test]
    fn test_resize_respecifies_storage() {
        let mut backend = RecordingBackend::default();
        let mut scratch = ScratchDepthBuffer::new(&mut backend, 512, 512).unwrap();
        let before = scratch.texture();

        scratch.resize(&mut backend, 32, 32).unwrap();

        assert_eq!(scratch.size(), (32, 32));
        assert_eq!(scratch.resize_count(), 1);
        assert!(backend.texture(before).is_none());
        let desc = backend.texture(scratch.texture()).unwrap();
        assert_eq!((desc.width, desc.height), (32, 32));
        assert_eq!(desc.format, TextureFormat::Depth32Float);
    }

    #[test]
    fn test_same_size_resize_is_noop() {
        let mut backend = RecordingBackend::default();
        let mut scratch = ScratchDepthBuffer::new(&mut backend, 128, 128).unwrap();
        scratch.resize(&mut backend, 128, 128).unwrap();
        assert_eq!(scratch.resize_count(), 0);
    }

    #[test]
    fn test_ensure_size_reports_mismatch() {
        let mut backend = RecordingBackend::default();
        let scratch = ScratchDepthBuffer::new(&mut backend, 512, 512).unwrap();
        assert!(scratch.ensure_size("Irradiance", 512, 512).is_ok());
        match scratch.ensure_size("Irradiance", 32, 32) {
            Err(RendererError::ScratchSizeMismatch { pass, expected, actual }) => {
                assert_eq!(pass, "Irradiance");
                assert_eq!(expected, (32, 32));
                assert_eq!(actual, (512, 512));
            }
            _ => panic!("expected a size mismatch"),
        }
    }
}
