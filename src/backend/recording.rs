//! Recording backend
//!
//! Implements [`GraphicsBackend`] without a device. Every call is appended to a
//! command log and resource descriptors are kept so tests can inspect exactly
//! what a pass would have submitted.

use crate::backend::traits::*;
use crate::backend::types::*;
use std::collections::HashMap;
use std::sync::Arc;

/// Default edge limit, matching wgpu's default `max_texture_dimension_2d`
pub const MAX_TEXTURE_SIZE: u32 = 8192;

/// One recorded backend call
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCommand {
    BeginCommands(String),
    SubmitCommands,
    BeginFrame,
    EndFrame,
    CreateTexture(TextureHandle),
    DestroyTexture(TextureHandle),
    CreateView {
        texture: TextureHandle,
        view: TextureViewHandle,
    },
    GenerateMipmaps(TextureHandle),
    WriteBuffer {
        buffer: BufferHandle,
        offset: u64,
        len: usize,
    },
    WriteTexture(TextureHandle),
    BeginRenderPass {
        label: Option<String>,
        color: Vec<TextureViewHandle>,
        resolve: Vec<Option<TextureViewHandle>>,
        depth: Option<TextureViewHandle>,
    },
    EndRenderPass,
    SetPipeline(RenderPipelineHandle),
    SetBindGroup {
        index: u32,
        bind_group: BindGroupHandle,
    },
    SetStencilReference(u32),
    SetViewport {
        width: f32,
        height: f32,
    },
    Draw {
        vertices: std::ops::Range<u32>,
        instances: std::ops::Range<u32>,
    },
    DrawIndexed {
        indices: std::ops::Range<u32>,
        instances: std::ops::Range<u32>,
    },
}

/// A render pass reassembled from the command log
#[derive(Debug, Clone)]
pub struct RecordedPass {
    pub label: Option<String>,
    pub color: Vec<TextureViewHandle>,
    pub resolve: Vec<Option<TextureViewHandle>>,
    pub depth: Option<TextureViewHandle>,
    /// Commands issued between begin and end
    pub commands: Vec<RecordedCommand>,
}

impl RecordedPass {
    pub fn pipelines(&self) -> Vec<RenderPipelineHandle> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                RecordedCommand::SetPipeline(p) => Some(*p),
                _ => None,
            })
            .collect()
    }

    pub fn draw_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, RecordedCommand::Draw { .. } | RecordedCommand::DrawIndexed { .. }))
            .count()
    }

    /// Bind groups bound at `index`, in order
    pub fn bind_groups_at(&self, index: u32) -> Vec<BindGroupHandle> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                RecordedCommand::SetBindGroup { index: i, bind_group } if *i == index => {
                    Some(*bind_group)
                }
                _ => None,
            })
            .collect()
    }
}

/// Backend that records instead of rendering
pub struct RecordingBackend {
    commands: Vec<RecordedCommand>,
    features: BackendFeatures,
    surface: (u32, u32),
    swapchain_format: TextureFormat,
    max_texture_size: u32,
    next_id: u64,
    in_pass: bool,

    textures: HashMap<TextureHandle, TextureDescriptor>,
    views: HashMap<TextureViewHandle, (TextureHandle, TextureViewDescriptor)>,
    buffers: HashMap<BufferHandle, Vec<u8>>,
    pipelines: HashMap<RenderPipelineHandle, RenderPipelineDescriptor>,
    bind_groups: HashMap<BindGroupHandle, Vec<(u32, BindGroupEntry)>>,
    samplers: HashMap<SamplerHandle, SamplerDescriptor>,
}

impl Default for RecordingBackend {
    fn default() -> Self {
        Self {
            commands: Vec::new(),
            features: BackendFeatures { multiview: true },
            surface: (1280, 720),
            swapchain_format: TextureFormat::Bgra8UnormSrgb,
            max_texture_size: MAX_TEXTURE_SIZE,
            next_id: 1,
            in_pass: false,
            textures: HashMap::new(),
            views: HashMap::new(),
            buffers: HashMap::new(),
            pipelines: HashMap::new(),
            bind_groups: HashMap::new(),
            samplers: HashMap::new(),
        }
    }
}

impl RecordingBackend {
    pub fn new_headless() -> Self {
        Self::default()
    }

    /// Toggle the reported multiview capability
    pub fn with_multiview(mut self, enabled: bool) -> Self {
        self.features.multiview = enabled;
        self
    }

    pub fn with_surface(mut self, width: u32, height: u32, format: TextureFormat) -> Self {
        self.surface = (width, height);
        self.swapchain_format = format;
        self
    }

    /// Reject textures with an edge longer than `size`, like a device limit
    pub fn with_max_texture_size(mut self, size: u32) -> Self {
        self.max_texture_size = size;
        self
    }

    fn next(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn record(&mut self, command: RecordedCommand) {
        log::trace!("RecordingBackend: {:?}", command);
        self.commands.push(command);
    }

    fn record_in_pass(&mut self, command: RecordedCommand) {
        if self.in_pass {
            self.record(command);
        } else {
            log::warn!("RecordingBackend: {:?} issued outside a render pass", command);
        }
    }

    pub fn commands(&self) -> &[RecordedCommand] {
        &self.commands
    }

    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    /// Group the log into render passes
    pub fn render_passes(&self) -> Vec<RecordedPass> {
        let mut passes = Vec::new();
        let mut current: Option<RecordedPass> = None;

        for command in &self.commands {
            match command {
                RecordedCommand::BeginRenderPass {
                    label,
                    color,
                    resolve,
                    depth,
                } => {
                    current = Some(RecordedPass {
                        label: label.clone(),
                        color: color.clone(),
                        resolve: resolve.clone(),
                        depth: *depth,
                        commands: Vec::new(),
                    });
                }
                RecordedCommand::EndRenderPass => {
                    if let Some(pass) = current.take() {
                        passes.push(pass);
                    }
                }
                other => {
                    if let Some(pass) = current.as_mut() {
                        pass.commands.push(other.clone());
                    }
                }
            }
        }

        passes
    }

    pub fn texture(&self, handle: TextureHandle) -> Option<&TextureDescriptor> {
        self.textures.get(&handle)
    }

    /// Texture and descriptor behind a view
    pub fn view(&self, handle: TextureViewHandle) -> Option<&(TextureHandle, TextureViewDescriptor)> {
        self.views.get(&handle)
    }

    pub fn pipeline(&self, handle: RenderPipelineHandle) -> Option<&RenderPipelineDescriptor> {
        self.pipelines.get(&handle)
    }

    /// Every pipeline created so far, in no particular order
    pub fn render_pipelines(&self) -> impl Iterator<Item = (RenderPipelineHandle, &RenderPipelineDescriptor)> + '_ {
        self.pipelines.iter().map(|(handle, desc)| (*handle, desc))
    }

    pub fn buffer_contents(&self, handle: BufferHandle) -> Option<&[u8]> {
        self.buffers.get(&handle).map(|b| b.as_slice())
    }

    pub fn bind_group_entries(&self, handle: BindGroupHandle) -> Option<&[(u32, BindGroupEntry)]> {
        self.bind_groups.get(&handle).map(|e| e.as_slice())
    }

    pub fn sampler(&self, handle: SamplerHandle) -> Option<&SamplerDescriptor> {
        self.samplers.get(&handle)
    }

    /// Number of live textures
    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }
}

impl GraphicsBackend for RecordingBackend {
    fn new(_window: Arc<winit::window::Window>, _vsync: bool) -> BackendResult<Self> {
        Ok(Self::default())
    }

    fn features(&self) -> BackendFeatures {
        self.features
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.surface = (width, height);
        }
    }

    fn surface_size(&self) -> (u32, u32) {
        self.surface
    }

    fn begin_frame(&mut self) -> BackendResult<FrameContext> {
        let view = TextureViewHandle(self.next());
        self.record(RecordedCommand::BeginFrame);
        Ok(FrameContext {
            swapchain_view: view,
            width: self.surface.0,
            height: self.surface.1,
        })
    }

    fn end_frame(&mut self) -> BackendResult<()> {
        self.record(RecordedCommand::EndFrame);
        Ok(())
    }

    fn begin_commands(&mut self, label: &str) {
        self.record(RecordedCommand::BeginCommands(label.to_string()));
    }

    fn submit_commands(&mut self) {
        self.record(RecordedCommand::SubmitCommands);
    }

    fn swapchain_format(&self) -> TextureFormat {
        self.swapchain_format
    }

    fn create_buffer(&mut self, desc: &BufferDescriptor) -> BackendResult<BufferHandle> {
        let handle = BufferHandle(self.next());
        self.buffers.insert(handle, vec![0; desc.size as usize]);
        Ok(handle)
    }

    fn create_buffer_init(
        &mut self,
        _desc: &BufferDescriptor,
        data: &[u8],
    ) -> BackendResult<BufferHandle> {
        let handle = BufferHandle(self.next());
        self.buffers.insert(handle, data.to_vec());
        Ok(handle)
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) {
        if let Some(contents) = self.buffers.get_mut(&buffer) {
            let start = offset as usize;
            let end = start + data.len();
            if contents.len() < end {
                contents.resize(end, 0);
            }
            contents[start..end].copy_from_slice(data);
        }
        self.record(RecordedCommand::WriteBuffer {
            buffer,
            offset,
            len: data.len(),
        });
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle> {
        if desc.width == 0 || desc.height == 0 {
            return Err(BackendError::TextureCreationFailed(format!(
                "{:?} has zero extent",
                desc.label
            )));
        }
        if desc.width.max(desc.height) > self.max_texture_size {
            return Err(BackendError::TextureCreationFailed(format!(
                "{:?} exceeds the {} texel limit",
                desc.label, self.max_texture_size
            )));
        }
        let handle = TextureHandle(self.next());
        self.textures.insert(handle, desc.clone());
        self.record(RecordedCommand::CreateTexture(handle));
        Ok(handle)
    }

    fn create_texture_view(
        &mut self,
        texture: TextureHandle,
        desc: &TextureViewDescriptor,
    ) -> BackendResult<TextureViewHandle> {
        if !self.textures.contains_key(&texture) {
            return Err(BackendError::TextureCreationFailed("Texture not found".into()));
        }
        let view = TextureViewHandle(self.next());
        self.views.insert(view, (texture, *desc));
        self.record(RecordedCommand::CreateView { texture, view });
        Ok(view)
    }

    fn write_texture(&mut self, texture: TextureHandle, _data: &[u8], _width: u32, _height: u32) {
        self.record(RecordedCommand::WriteTexture(texture));
    }

    fn generate_mipmaps(&mut self, texture: TextureHandle) {
        self.record(RecordedCommand::GenerateMipmaps(texture));
    }

    fn create_sampler(&mut self, desc: &SamplerDescriptor) -> BackendResult<SamplerHandle> {
        let handle = SamplerHandle(self.next());
        self.samplers.insert(handle, desc.clone());
        Ok(handle)
    }

    fn create_bind_group_layout(
        &mut self,
        _entries: &[BindGroupLayoutEntry],
    ) -> BackendResult<BindGroupLayoutHandle> {
        Ok(BindGroupLayoutHandle(self.next()))
    }

    fn create_bind_group(
        &mut self,
        _layout: BindGroupLayoutHandle,
        entries: &[(u32, BindGroupEntry)],
    ) -> BackendResult<BindGroupHandle> {
        let handle = BindGroupHandle(self.next());
        self.bind_groups.insert(handle, entries.to_vec());
        Ok(handle)
    }

    fn create_render_pipeline(
        &mut self,
        desc: &RenderPipelineDescriptor,
    ) -> BackendResult<RenderPipelineHandle> {
        if desc.multiview.is_some() && !self.features.multiview {
            return Err(BackendError::PipelineCreationFailed(
                "multiview requested but not supported".into(),
            ));
        }
        let handle = RenderPipelineHandle(self.next());
        self.pipelines.insert(handle, desc.clone());
        Ok(handle)
    }

    fn begin_render_pass(&mut self, desc: &RenderPassDescriptor) {
        self.in_pass = true;
        self.record(RecordedCommand::BeginRenderPass {
            label: desc.label.clone(),
            color: desc.color_attachments.iter().map(|a| a.view).collect(),
            resolve: desc
                .color_attachments
                .iter()
                .map(|a| a.resolve_target)
                .collect(),
            depth: desc.depth_stencil_attachment.as_ref().map(|d| d.view),
        });
    }

    fn end_render_pass(&mut self) {
        if self.in_pass {
            self.in_pass = false;
            self.record(RecordedCommand::EndRenderPass);
        }
    }

    fn set_render_pipeline(&mut self, pipeline: RenderPipelineHandle) {
        self.record_in_pass(RecordedCommand::SetPipeline(pipeline));
    }

    fn set_bind_group(&mut self, index: u32, bind_group: BindGroupHandle) {
        self.record_in_pass(RecordedCommand::SetBindGroup { index, bind_group });
    }

    fn set_vertex_buffer(&mut self, _slot: u32, _buffer: BufferHandle, _offset: u64) {}

    fn set_index_buffer(&mut self, _buffer: BufferHandle, _offset: u64, _format: IndexFormat) {}

    fn set_viewport(&mut self, _x: f32, _y: f32, width: f32, height: f32, _min_depth: f32, _max_depth: f32) {
        self.record_in_pass(RecordedCommand::SetViewport { width, height });
    }

    fn set_stencil_reference(&mut self, reference: u32) {
        self.record_in_pass(RecordedCommand::SetStencilReference(reference));
    }

    fn draw(&mut self, vertices: std::ops::Range<u32>, instances: std::ops::Range<u32>) {
        self.record_in_pass(RecordedCommand::Draw { vertices, instances });
    }

    fn draw_indexed(
        &mut self,
        indices: std::ops::Range<u32>,
        _base_vertex: i32,
        instances: std::ops::Range<u32>,
    ) {
        self.record_in_pass(RecordedCommand::DrawIndexed { indices, instances });
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        self.buffers.remove(&buffer);
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        self.textures.remove(&texture);
        self.views.retain(|_, (owner, _)| *owner != texture);
        self.record(RecordedCommand::DestroyTexture(texture));
    }

    fn destroy_texture_view(&mut self, view: TextureViewHandle) {
        self.views.remove(&view);
    }

    fn destroy_bind_group(&mut self, bind_group: BindGroupHandle) {
        self.bind_groups.remove(&bind_group);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_passes_group_commands() {
        let mut backend = RecordingBackend::default();
        let texture = backend
            .create_texture(&TextureDescriptor {
                usage: TextureUsage::RENDER_ATTACHMENT,
                ..Default::default()
            })
            .unwrap();
        let view = backend
            .create_texture_view(texture, &TextureViewDescriptor::default())
            .unwrap();

        backend.begin_render_pass(&RenderPassDescriptor {
            label: Some("First".into()),
            color_attachments: vec![ColorAttachment::clear(view, [0.0; 4])],
            depth_stencil_attachment: None,
        });
        backend.draw(0..3, 0..1);
        backend.end_render_pass();

        let passes = backend.render_passes();
        assert_eq!(passes.len(), 1);
        assert_eq!(passes[0].label.as_deref(), Some("First"));
        assert_eq!(passes[0].color, vec![view]);
        assert_eq!(passes[0].draw_count(), 1);
    }

    #[test]
    fn test_draw_outside_pass_is_not_recorded() {
        let mut backend = RecordingBackend::default();
        backend.draw(0..3, 0..1);
        assert!(backend.commands().is_empty());
    }

    #[test]
    fn test_write_buffer_updates_contents() {
        let mut backend = RecordingBackend::default();
        let buffer = backend
            .create_buffer(&BufferDescriptor {
                label: None,
                size: 8,
                usage: BufferUsage::UNIFORM,
            })
            .unwrap();
        backend.write_buffer(buffer, 4, &[1, 2, 3, 4]);
        assert_eq!(backend.buffer_contents(buffer), Some(&[0, 0, 0, 0, 1, 2, 3, 4][..]));
    }

    #[test]
    fn test_multiview_pipeline_rejected_when_unsupported() {
        let mut backend = RecordingBackend::default().with_multiview(false);
        let mut desc = RenderPipelineDescriptor::fullscreen("mv", "", vec![], vec![]);
        desc.multiview = std::num::NonZeroU32::new(6);
        assert!(backend.create_render_pipeline(&desc).is_err());
    }
}
