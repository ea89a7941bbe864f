//! Render graph definition and compilation

use crate::backend::traits::GraphicsBackend;
use crate::error::GraphError;
use crate::render_graph::pass::*;
use crate::render_graph::resource::*;
use std::collections::{BTreeSet, HashMap, HashSet};

/// The main render graph structure
pub struct RenderGraph<B: GraphicsBackend> {
    passes: Vec<Box<dyn RenderPass<B>>>,
    pass_nodes: Vec<PassNode>,
    resources: Vec<VirtualResource>,
    names: HashMap<String, ResourceId>,
}

impl<B: GraphicsBackend> RenderGraph<B> {
    pub fn new() -> Self {
        Self {
            passes: Vec::new(),
            pass_nodes: Vec::new(),
            resources: Vec::new(),
            names: HashMap::new(),
        }
    }

    /// Register a resource produced outside the graph
    pub fn register_external(&mut self, name: &str) -> ResourceId {
        if let Some(&id) = self.names.get(name) {
            if let Some(resource) = self.resources.get_mut(id.0 as usize) {
                resource.external = true;
            }
            return id;
        }
        let id = ResourceId(self.resources.len() as u32);
        self.resources.push(VirtualResource {
            id,
            name: name.to_string(),
            external: true,
        });
        self.names.insert(name.to_string(), id);
        id
    }

    /// Get a resource by name
    pub fn resource(&self, name: &str) -> Option<ResourceId> {
        self.names.get(name).copied()
    }

    /// Add a render pass to the graph
    pub fn add_pass<P: RenderPass<B> + 'static>(
        &mut self,
        pass: P,
        pass_type: PassType,
    ) -> Result<PassId, GraphError> {
        let name = pass.name().to_string();
        if self.pass_nodes.iter().any(|n| n.name == name) {
            return Err(GraphError::DuplicatePass(name));
        }

        let id = PassId(self.pass_nodes.len() as u32);
        let mut boxed_pass = Box::new(pass);

        let mut inputs = Vec::new();
        let mut outputs = Vec::new();
        {
            let mut ctx = PassSetupContext {
                resources: &mut self.resources,
                names: &mut self.names,
                inputs: &mut inputs,
                outputs: &mut outputs,
            };
            boxed_pass.setup(&mut ctx);
        }

        self.passes.push(boxed_pass);
        self.pass_nodes.push(PassNode {
            id,
            name,
            pass_type,
            inputs,
            outputs,
        });

        Ok(id)
    }

    /// Compile the graph - topological sort and resource lifetime planning
    ///
    /// A pass depends on every pass that writes a resource it reads, and on
    /// every earlier pass that writes a resource it also writes. Ties are
    /// broken by insertion order so the result is deterministic.
    pub fn compile(&self) -> Result<CompiledGraph, GraphError> {
        let mut dependencies: Vec<HashSet<PassId>> = vec![HashSet::new(); self.pass_nodes.len()];

        for reader in &self.pass_nodes {
            for input in &reader.inputs {
                let mut produced = self
                    .resources
                    .get(input.resource.0 as usize)
                    .map(|r| r.external)
                    .unwrap_or(false);

                for writer in &self.pass_nodes {
                    if writer.id != reader.id && writer.writes_resource(input.resource) {
                        dependencies[reader.id.0 as usize].insert(writer.id);
                        produced = true;
                    }
                }

                if !produced {
                    return Err(GraphError::MissingProducer {
                        pass: reader.name.clone(),
                        resource: self.resource_name(input.resource).to_string(),
                    });
                }
            }

            // Shared attachments are used in insertion order
            for output in &reader.outputs {
                for writer in &self.pass_nodes[..reader.id.0 as usize] {
                    if writer.writes_resource(output.resource) {
                        dependencies[reader.id.0 as usize].insert(writer.id);
                    }
                }
            }
        }

        // Kahn's algorithm with the lowest ready id first
        let mut in_degree: Vec<usize> = dependencies.iter().map(|d| d.len()).collect();
        let mut ready: BTreeSet<PassId> = self
            .pass_nodes
            .iter()
            .filter(|n| in_degree[n.id.0 as usize] == 0)
            .map(|n| n.id)
            .collect();

        let mut sorted_passes = Vec::with_capacity(self.pass_nodes.len());

        while let Some(pass_id) = ready.pop_first() {
            sorted_passes.push(pass_id);

            for node in &self.pass_nodes {
                if dependencies[node.id.0 as usize].contains(&pass_id) {
                    let degree = &mut in_degree[node.id.0 as usize];
                    *degree -= 1;
                    if *degree == 0 {
                        ready.insert(node.id);
                    }
                }
            }
        }

        if sorted_passes.len() != self.pass_nodes.len() {
            let stuck = self
                .pass_nodes
                .iter()
                .filter(|n| !sorted_passes.contains(&n.id))
                .map(|n| n.name.clone())
                .collect();
            return Err(GraphError::Cycle(stuck));
        }

        let mut resource_lifetimes: HashMap<ResourceId, ResourceLifetime> = HashMap::new();

        for (order, &pass_id) in sorted_passes.iter().enumerate() {
            let node = &self.pass_nodes[pass_id.0 as usize];

            for access in node.inputs.iter().chain(node.outputs.iter()) {
                let lifetime = resource_lifetimes
                    .entry(access.resource)
                    .or_insert(ResourceLifetime {
                        first_use: order,
                        last_use: order,
                    });
                lifetime.last_use = order;
            }
        }

        Ok(CompiledGraph {
            pass_order: sorted_passes,
            resource_lifetimes,
        })
    }

    fn resource_name(&self, id: ResourceId) -> &str {
        self.resources
            .get(id.0 as usize)
            .map(|r| r.name.as_str())
            .unwrap_or("<unknown>")
    }

    /// Get all passes
    pub fn passes(&self) -> &[Box<dyn RenderPass<B>>] {
        &self.passes
    }

    /// Get mutable passes
    pub fn passes_mut(&mut self) -> &mut [Box<dyn RenderPass<B>>] {
        &mut self.passes
    }

    /// Get pass nodes (metadata)
    pub fn pass_nodes(&self) -> &[PassNode] {
        &self.pass_nodes
    }

    /// Get all resources
    pub fn resources(&self) -> &[VirtualResource] {
        &self.resources
    }

    /// Get pass by ID
    pub fn get_pass(&self, id: PassId) -> Option<&dyn RenderPass<B>> {
        self.passes.get(id.0 as usize).map(|p| p.as_ref())
    }

    /// Get pass node by ID
    pub fn get_pass_node(&self, id: PassId) -> Option<&PassNode> {
        self.pass_nodes.get(id.0 as usize)
    }
}

impl<B: GraphicsBackend> Default for RenderGraph<B> {
    fn default() -> Self {
        Self::new()
    }
}

/// Resource lifetime in terms of pass execution order
#[derive(Debug, Clone, Copy)]
pub struct ResourceLifetime {
    pub first_use: usize,
    pub last_use: usize,
}

/// Compiled render graph with execution order and resource lifetimes
#[derive(Debug)]
pub struct CompiledGraph {
    pub pass_order: Vec<PassId>,
    pub resource_lifetimes: HashMap<ResourceId, ResourceLifetime>,
}

impl CompiledGraph {
    /// Check if a resource is alive at a given execution step
    pub fn is_resource_alive(&self, resource: ResourceId, step: usize) -> bool {
        if let Some(lifetime) = self.resource_lifetimes.get(&resource) {
            step >= lifetime.first_use && step <= lifetime.last_use
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordingBackend;
    use crate::error::RendererError;

    struct TestPass {
        name: &'static str,
        reads: Vec<&'static str>,
        writes: Vec<&'static str>,
    }

    impl TestPass {
        fn new(name: &'static str, reads: &[&'static str], writes: &[&'static str]) -> Self {
            Self {
                name,
                reads: reads.to_vec(),
                writes: writes.to_vec(),
            }
        }
    }

    impl RenderPass<RecordingBackend> for TestPass {
        fn name(&self) -> &str {
            self.name
        }

        fn setup(&mut self, ctx: &mut PassSetupContext) {
            for r in &self.reads {
                ctx.read(r, ResourceUsage::TextureRead);
            }
            for w in &self.writes {
                ctx.write(w, ResourceUsage::RenderTarget);
            }
        }

        fn execute(&self, _ctx: &mut PassExecuteContext<RecordingBackend>) -> Result<(), RendererError> {
            Ok(())
        }
    }

    fn names(graph: &RenderGraph<RecordingBackend>, compiled: &CompiledGraph) -> Vec<String> {
        compiled
            .pass_order
            .iter()
            .map(|id| graph.get_pass_node(*id).unwrap().name.clone())
            .collect()
    }

    #[test]
    fn test_readers_follow_writers_regardless_of_insertion() {
        let mut graph = RenderGraph::<RecordingBackend>::new();
        graph
            .add_pass(TestPass::new("composite", &["blurred"], &["surface"]), PassType::Graphics)
            .unwrap();
        graph
            .add_pass(TestPass::new("blur", &["bloom"], &["blurred"]), PassType::Graphics)
            .unwrap();
        graph
            .add_pass(TestPass::new("scene", &[], &["bloom"]), PassType::Graphics)
            .unwrap();

        let compiled = graph.compile().unwrap();
        assert_eq!(names(&graph, &compiled), vec!["scene", "blur", "composite"]);
    }

    #[test]
    fn test_shared_writes_keep_insertion_order() {
        let mut graph = RenderGraph::<RecordingBackend>::new();
        graph
            .add_pass(TestPass::new("a", &[], &["scratch", "x"]), PassType::Graphics)
            .unwrap();
        graph
            .add_pass(TestPass::new("b", &[], &["scratch"]), PassType::Graphics)
            .unwrap();
        graph
            .add_pass(TestPass::new("c", &[], &["scratch"]), PassType::Graphics)
            .unwrap();

        let compiled = graph.compile().unwrap();
        assert_eq!(names(&graph, &compiled), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_cycle_is_rejected() {
        let mut graph = RenderGraph::<RecordingBackend>::new();
        graph
            .add_pass(TestPass::new("a", &["y"], &["x"]), PassType::Graphics)
            .unwrap();
        graph
            .add_pass(TestPass::new("b", &["x"], &["y"]), PassType::Graphics)
            .unwrap();

        match graph.compile() {
            Err(GraphError::Cycle(stuck)) => assert_eq!(stuck, vec!["a", "b"]),
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_producer_is_rejected() {
        let mut graph = RenderGraph::<RecordingBackend>::new();
        graph
            .add_pass(TestPass::new("composite", &["color"], &["surface"]), PassType::Graphics)
            .unwrap();

        assert_eq!(
            graph.compile().unwrap_err(),
            GraphError::MissingProducer {
                pass: "composite".into(),
                resource: "color".into()
            }
        );
    }

    #[test]
    fn test_external_resource_satisfies_reads() {
        let mut graph = RenderGraph::<RecordingBackend>::new();
        graph.register_external("irradiance");
        graph
            .add_pass(TestPass::new("scene", &["irradiance"], &["color"]), PassType::Graphics)
            .unwrap();
        assert!(graph.compile().is_ok());
    }

    #[test]
    fn test_duplicate_pass_name_is_rejected() {
        let mut graph = RenderGraph::<RecordingBackend>::new();
        graph
            .add_pass(TestPass::new("a", &[], &["x"]), PassType::Graphics)
            .unwrap();
        assert_eq!(
            graph
                .add_pass(TestPass::new("a", &[], &["y"]), PassType::Graphics)
                .unwrap_err(),
            GraphError::DuplicatePass("a".into())
        );
    }

    #[test]
    fn test_resource_lifetimes_span_first_to_last_use() {
        let mut graph = RenderGraph::<RecordingBackend>::new();
        graph
            .add_pass(TestPass::new("a", &[], &["x"]), PassType::Graphics)
            .unwrap();
        graph
            .add_pass(TestPass::new("b", &[], &["y"]), PassType::Graphics)
            .unwrap();
        graph
            .add_pass(TestPass::new("c", &["x"], &["z"]), PassType::Graphics)
            .unwrap();

        let compiled = graph.compile().unwrap();
        let x = graph.resource("x").unwrap();
        assert!(compiled.is_resource_alive(x, 0));
        assert!(compiled.is_resource_alive(x, 2));
        let y = graph.resource("y").unwrap();
        assert!(!compiled.is_resource_alive(y, 2));
    }
}
