//! Render pass definitions for the render graph

use crate::backend::traits::*;
use crate::error::RendererError;
use crate::pipeline::PipelineContext;
use crate::render_graph::resource::*;
use crate::scene::{GpuScene, Scene};
use std::collections::HashMap;

/// Unique identifier for a render pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PassId(pub(crate) u32);

/// Context for declaring pass resources
pub struct PassSetupContext<'a> {
    pub(crate) resources: &'a mut Vec<VirtualResource>,
    pub(crate) names: &'a mut HashMap<String, ResourceId>,
    pub(crate) inputs: &'a mut Vec<ResourceAccess>,
    pub(crate) outputs: &'a mut Vec<ResourceAccess>,
}

impl<'a> PassSetupContext<'a> {
    /// Look up or create the named resource
    pub fn resource(&mut self, name: &str) -> ResourceId {
        if let Some(&id) = self.names.get(name) {
            return id;
        }
        let id = ResourceId(self.resources.len() as u32);
        self.resources.push(VirtualResource {
            id,
            name: name.to_string(),
            external: false,
        });
        self.names.insert(name.to_string(), id);
        id
    }

    /// Declare that this pass reads from a resource
    pub fn read(&mut self, name: &str, usage: ResourceUsage) -> ResourceId {
        let resource = self.resource(name);
        self.inputs.push(ResourceAccess { resource, usage });
        resource
    }

    /// Declare that this pass writes to a resource
    pub fn write(&mut self, name: &str, usage: ResourceUsage) -> ResourceId {
        let resource = self.resource(name);
        self.outputs.push(ResourceAccess { resource, usage });
        resource
    }
}

/// Context for executing a render pass
pub struct PassExecuteContext<'a, B: GraphicsBackend> {
    pub backend: &'a mut B,
    pub pipeline: &'a mut PipelineContext,
    pub scene: Option<&'a Scene>,
    pub gpu_scene: Option<&'a GpuScene>,
    /// Presentable view for the final pass of a frame
    pub surface_view: Option<TextureViewHandle>,
}

impl<'a, B: GraphicsBackend> PassExecuteContext<'a, B> {
    /// Context for offscreen work with no scene attached
    pub fn offscreen(backend: &'a mut B, pipeline: &'a mut PipelineContext) -> Self {
        Self {
            backend,
            pipeline,
            scene: None,
            gpu_scene: None,
            surface_view: None,
        }
    }

    pub fn require_scene(&self, pass: &str) -> Result<(&'a Scene, &'a GpuScene), RendererError> {
        match (self.scene, self.gpu_scene) {
            (Some(scene), Some(gpu)) => Ok((scene, gpu)),
            _ => Err(RendererError::MissingInput {
                pass: pass.to_string(),
                input: "scene".to_string(),
            }),
        }
    }

    pub fn require_surface(&self, pass: &str) -> Result<TextureViewHandle, RendererError> {
        self.surface_view.ok_or_else(|| RendererError::MissingInput {
            pass: pass.to_string(),
            input: "surface".to_string(),
        })
    }
}

/// Trait for render passes
pub trait RenderPass<B: GraphicsBackend> {
    /// Get the pass name for debugging
    fn name(&self) -> &str;

    /// Setup phase - declare resources and dependencies
    fn setup(&mut self, ctx: &mut PassSetupContext);

    /// Execute phase - record commands
    fn execute(&self, ctx: &mut PassExecuteContext<B>) -> Result<(), RendererError>;

    /// Rebuild size-dependent state such as bind groups over window-sized targets
    fn resize(&mut self, _backend: &mut B, _pipeline: &PipelineContext) -> Result<(), RendererError> {
        Ok(())
    }
}

/// Type of render pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassType {
    /// Graphics render pass
    Graphics,
    /// Transfer/copy pass
    Transfer,
}

/// Metadata about a pass in the graph
#[derive(Debug)]
pub struct PassNode {
    pub id: PassId,
    pub name: String,
    pub pass_type: PassType,
    pub inputs: Vec<ResourceAccess>,
    pub outputs: Vec<ResourceAccess>,
}

impl PassNode {
    pub fn reads_resource(&self, resource: ResourceId) -> bool {
        self.inputs.iter().any(|a| a.resource == resource)
    }

    pub fn writes_resource(&self, resource: ResourceId) -> bool {
        self.outputs.iter().any(|a| a.resource == resource)
    }
}
