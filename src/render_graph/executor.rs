//! Render graph executor

use crate::backend::traits::*;
use crate::error::{GraphError, RendererError};
use crate::pipeline::PipelineContext;
use crate::render_graph::graph::*;
use crate::render_graph::pass::*;

/// A graph together with its compiled execution order
pub struct RenderGraphExecutor<B: GraphicsBackend> {
    graph: RenderGraph<B>,
    compiled: CompiledGraph,
}

impl<B: GraphicsBackend> RenderGraphExecutor<B> {
    /// Compile the graph once; the order is reused every execution
    pub fn new(graph: RenderGraph<B>) -> Result<Self, GraphError> {
        let compiled = graph.compile()?;
        Ok(Self { graph, compiled })
    }

    /// Pass names in execution order
    pub fn pass_names(&self) -> Vec<&str> {
        self.compiled
            .pass_order
            .iter()
            .filter_map(|id| self.graph.get_pass_node(*id))
            .map(|node| node.name.as_str())
            .collect()
    }

    pub fn graph(&self) -> &RenderGraph<B> {
        &self.graph
    }

    pub fn compiled(&self) -> &CompiledGraph {
        &self.compiled
    }

    /// Execute every pass in topological order, stopping at the first failure
    pub fn execute(&self, ctx: &mut PassExecuteContext<B>) -> Result<(), RendererError> {
        for &pass_id in &self.compiled.pass_order {
            if let Some(pass) = self.graph.get_pass(pass_id) {
                log::trace!("Executing pass '{}'", pass.name());
                pass.execute(ctx)?;
            }
        }
        Ok(())
    }

    /// Let every pass rebuild its size-dependent state
    pub fn resize(&mut self, backend: &mut B, pipeline: &PipelineContext) -> Result<(), RendererError> {
        for pass in self.graph.passes_mut() {
            pass.resize(backend, pipeline)?;
        }
        Ok(())
    }
}

/// Builder for creating render graphs with a fluent API
pub struct RenderGraphBuilder<B: GraphicsBackend> {
    graph: RenderGraph<B>,
}

impl<B: GraphicsBackend> RenderGraphBuilder<B> {
    pub fn new() -> Self {
        Self {
            graph: RenderGraph::new(),
        }
    }

    /// Register an external resource
    pub fn external(mut self, name: &str) -> Self {
        self.graph.register_external(name);
        self
    }

    /// Add a graphics pass
    pub fn graphics_pass<P: RenderPass<B> + 'static>(mut self, pass: P) -> Result<Self, GraphError> {
        self.graph.add_pass(pass, PassType::Graphics)?;
        Ok(self)
    }

    /// Add a transfer pass (resolves, blits)
    pub fn transfer_pass<P: RenderPass<B> + 'static>(mut self, pass: P) -> Result<Self, GraphError> {
        self.graph.add_pass(pass, PassType::Transfer)?;
        Ok(self)
    }

    /// Build the render graph
    pub fn build(self) -> RenderGraph<B> {
        self.graph
    }

    /// Build and compile in one step
    pub fn compile(self) -> Result<RenderGraphExecutor<B>, GraphError> {
        RenderGraphExecutor::new(self.graph)
    }
}

impl<B: GraphicsBackend> Default for RenderGraphBuilder<B> {
    fn default() -> Self {
        Self::new()
    }
}
