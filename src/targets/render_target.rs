//! Offscreen render destinations

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::error::RendererError;
use crate::render_graph::TextureSize;
use std::fmt;

/// One attachment slot of a target
#[derive(Debug, Clone)]
pub struct AttachmentDesc {
    pub label: String,
    pub format: TextureFormat,
    pub usage: TextureUsage,
}

impl AttachmentDesc {
    /// Render attachment that is also sampled later
    pub fn sampled(label: &str, format: TextureFormat) -> Self {
        Self {
            label: label.to_string(),
            format,
            usage: TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
        }
    }

    /// Render attachment that is only ever resolved or tested against
    pub fn attachment_only(label: &str, format: TextureFormat) -> Self {
        Self {
            label: label.to_string(),
            format,
            usage: TextureUsage::RENDER_ATTACHMENT,
        }
    }
}

/// Description of a render target
#[derive(Debug, Clone)]
pub struct RenderTargetDesc {
    pub label: String,
    pub size: TextureSize,
    pub sample_count: u32,
    pub color: Vec<AttachmentDesc>,
    pub depth: Option<AttachmentDesc>,
}

/// An allocated attachment
#[derive(Debug, Clone, Copy)]
pub struct Attachment {
    pub texture: TextureHandle,
    pub view: TextureViewHandle,
    pub width: u32,
    pub height: u32,
    pub sample_count: u32,
}

/// Result of validating a target's configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetStatus {
    Complete,
    NoAttachments,
    ZeroExtent,
    DimensionMismatch { attachment: String },
    SampleCountMismatch { attachment: String },
}

impl fmt::Display for TargetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetStatus::Complete => write!(f, "complete"),
            TargetStatus::NoAttachments => write!(f, "no attachments"),
            TargetStatus::ZeroExtent => write!(f, "zero extent"),
            TargetStatus::DimensionMismatch { attachment } => {
                write!(f, "attachment '{}' has mismatched dimensions", attachment)
            }
            TargetStatus::SampleCountMismatch { attachment } => {
                write!(f, "attachment '{}' has mismatched sample count", attachment)
            }
        }
    }
}

/// A render destination: zero or more color attachments plus an optional
/// depth/stencil attachment, all sharing size and sample count.
pub struct RenderTarget {
    desc: RenderTargetDesc,
    width: u32,
    height: u32,
    color: Vec<Attachment>,
    depth: Option<Attachment>,
}

impl RenderTarget {
    /// Allocate every attachment and validate the result
    pub fn create<B: GraphicsBackend>(
        backend: &mut B,
        desc: RenderTargetDesc,
        screen_width: u32,
        screen_height: u32,
    ) -> Result<Self, RendererError> {
        let mut target = Self {
            desc,
            width: 0,
            height: 0,
            color: Vec::new(),
            depth: None,
        };
        target.allocate(backend, screen_width, screen_height)?;
        target.validate()?;
        Ok(target)
    }

    fn allocate<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        screen_width: u32,
        screen_height: u32,
    ) -> Result<(), RendererError> {
        let (width, height) = self.desc.size.resolve(screen_width, screen_height);
        let sample_count = self.desc.sample_count;

        let mut make = |attachment: &AttachmentDesc| -> Result<Attachment, RendererError> {
            let texture = backend.create_texture(&TextureDescriptor {
                label: Some(format!("{} {}", self.desc.label, attachment.label)),
                width,
                height,
                sample_count,
                format: attachment.format,
                usage: attachment.usage,
                ..Default::default()
            })?;
            let view = backend.create_texture_view(texture, &TextureViewDescriptor::default())?;
            Ok(Attachment {
                texture,
                view,
                width,
                height,
                sample_count,
            })
        };

        self.color = self
            .desc
            .color
            .iter()
            .map(&mut make)
            .collect::<Result<Vec<_>, _>>()?;
        self.depth = self.desc.depth.as_ref().map(&mut make).transpose()?;
        self.width = width;
        self.height = height;
        Ok(())
    }

    fn release<B: GraphicsBackend>(&mut self, backend: &mut B) {
        for attachment in self.color.drain(..).chain(self.depth.take()) {
            backend.destroy_texture_view(attachment.view);
            backend.destroy_texture(attachment.texture);
        }
    }

    /// Reallocate screen-relative attachments; contents become undefined
    ///
    /// Returns whether anything was reallocated. A failed allocation leaves
    /// the target without attachments, so [`validate`](Self::validate) fails.
    pub fn resize<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        screen_width: u32,
        screen_height: u32,
    ) -> Result<bool, RendererError> {
        if !self.desc.size.is_relative() {
            return Ok(false);
        }
        if self.desc.size.resolve(screen_width, screen_height) == (self.width, self.height) {
            return Ok(false);
        }

        self.release(backend);
        self.allocate(backend, screen_width, screen_height)?;
        Ok(true)
    }

    pub fn status(&self) -> TargetStatus {
        let attachments: Vec<(&str, &Attachment)> = self
            .desc
            .color
            .iter()
            .map(|d| d.label.as_str())
            .zip(self.color.iter())
            .chain(
                self.desc
                    .depth
                    .iter()
                    .map(|d| d.label.as_str())
                    .zip(self.depth.iter()),
            )
            .collect();

        let Some((_, first)) = attachments.first() else {
            return TargetStatus::NoAttachments;
        };
        if first.width == 0 || first.height == 0 {
            return TargetStatus::ZeroExtent;
        }

        for (label, attachment) in &attachments {
            if attachment.width != first.width || attachment.height != first.height {
                return TargetStatus::DimensionMismatch {
                    attachment: label.to_string(),
                };
            }
            if attachment.sample_count != first.sample_count {
                return TargetStatus::SampleCountMismatch {
                    attachment: label.to_string(),
                };
            }
        }

        TargetStatus::Complete
    }

    /// Fail with `IncompleteTarget` unless the target is complete
    pub fn validate(&self) -> Result<(), RendererError> {
        match self.status() {
            TargetStatus::Complete => Ok(()),
            status => Err(RendererError::IncompleteTarget {
                label: self.desc.label.clone(),
                status: status.to_string(),
            }),
        }
    }

    pub fn destroy<B: GraphicsBackend>(mut self, backend: &mut B) {
        self.release(backend);
    }

    pub fn label(&self) -> &str {
        &self.desc.label
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn sample_count(&self) -> u32 {
        self.desc.sample_count
    }

    pub fn color(&self, index: usize) -> Option<&Attachment> {
        self.color.get(index)
    }

    pub fn color_view(&self, index: usize) -> Option<TextureViewHandle> {
        self.color.get(index).map(|a| a.view)
    }

    pub fn color_count(&self) -> usize {
        self.color.len()
    }

    pub fn color_format(&self, index: usize) -> Option<TextureFormat> {
        self.desc.color.get(index).map(|d| d.format)
    }

    pub fn depth(&self) -> Option<&Attachment> {
        self.depth.as_ref()
    }

    pub fn depth_view(&self) -> Option<TextureViewHandle> {
        self.depth.map(|a| a.view)
    }

    pub fn depth_format(&self) -> Option<TextureFormat> {
        self.desc.depth.as_ref().map(|d| d.format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordingBackend;

    fn scene_desc() -> RenderTargetDesc {
        RenderTargetDesc {
            label: "Scene".into(),
            size: TextureSize::default(),
            sample_count: 4,
            color: vec![
                AttachmentDesc::attachment_only("Color", TextureFormat::Rgba16Float),
                AttachmentDesc::attachment_only("Bloom", TextureFormat::Rgba16Float),
            ],
            depth: Some(AttachmentDesc::attachment_only(
                "Depth",
                TextureFormat::Depth24PlusStencil8,
            )),
        }
    }

    #[test]
    fn test_create_allocates_every_attachment() {
        let mut backend = RecordingBackend::default();
        let target = RenderTarget::create(&mut backend, scene_desc(), 1280, 720).unwrap();

        assert_eq!(target.size(), (1280, 720));
        assert_eq!(target.color_count(), 2);
        assert_eq!(target.status(), TargetStatus::Complete);
        let depth = backend.texture(target.depth().unwrap().texture).unwrap();
        assert_eq!(depth.sample_count, 4);
        assert_eq!(depth.format, TextureFormat::Depth24PlusStencil8);
    }

    #[test]
    fn test_resize_reallocates_relative_target() {
        let mut backend = RecordingBackend::default();
        let mut target = RenderTarget::create(&mut backend, scene_desc(), 1280, 720).unwrap();
        let old = target.color(0).unwrap().texture;

        assert!(target.resize(&mut backend, 1920, 1080).unwrap());
        assert_eq!(target.size(), (1920, 1080));
        assert!(backend.texture(old).is_none());
        for attachment in [target.color(0), target.color(1), target.depth()] {
            let desc = backend.texture(attachment.unwrap().texture).unwrap();
            assert_eq!((desc.width, desc.height), (1920, 1080));
        }
        assert!(target.validate().is_ok());
    }

    #[test]
    fn test_resize_ignores_absolute_target() {
        let mut backend = RecordingBackend::default();
        let desc = RenderTargetDesc {
            size: TextureSize::square(1024),
            ..scene_desc()
        };
        let mut target = RenderTarget::create(&mut backend, desc, 1280, 720).unwrap();
        assert!(!target.resize(&mut backend, 1920, 1080).unwrap());
        assert_eq!(target.size(), (1024, 1024));
    }

    #[test]
    fn test_target_without_attachments_is_incomplete() {
        let mut backend = RecordingBackend::default();
        let desc = RenderTargetDesc {
            label: "Empty".into(),
            size: TextureSize::default(),
            sample_count: 1,
            color: Vec::new(),
            depth: None,
        };
        match RenderTarget::create(&mut backend, desc, 1280, 720) {
            Err(RendererError::IncompleteTarget { label, status }) => {
                assert_eq!(label, "Empty");
                assert_eq!(status, "no attachments");
            }
            _ => panic!("expected an incomplete target"),
        }
    }
}
