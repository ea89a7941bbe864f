//! Multisample resolve of one scene attachment

use crate::backend::traits::*;
use crate::error::RendererError;
use crate::render_graph::pass::*;
use crate::render_graph::resource::*;

/// Empty pass that resolves attachment `index` of the MSAA scene target into
/// a single-sample texture. Nothing is drawn; the resolve happens when the
/// pass ends.
pub struct ResolvePass {
    name: &'static str,
    index: usize,
    input: &'static str,
    output: &'static str,
}

impl ResolvePass {
    pub fn color() -> Self {
        Self {
            name: "Resolve Color",
            index: 0,
            input: "scene_color_msaa",
            output: "scene_color",
        }
    }

    pub fn bloom() -> Self {
        Self {
            name: "Resolve Bloom",
            index: 1,
            input: "scene_bloom_msaa",
            output: "bloom",
        }
    }
}

impl<B: GraphicsBackend> RenderPass<B> for ResolvePass {
    fn name(&self) -> &str {
        self.name
    }

    fn setup(&mut self, ctx: &mut PassSetupContext) {
        ctx.read(self.input, ResourceUsage::RenderTarget);
        ctx.write(self.output, ResourceUsage::ResolveTarget);
    }

    fn execute(&self, ctx: &mut PassExecuteContext<B>) -> Result<(), RendererError> {
        let pipeline = &*ctx.pipeline;
        let destination = match self.index {
            0 => &pipeline.resolved_color,
            _ => &pipeline.resolved_bloom,
        };
        let (Some(source), Some(target)) = (pipeline.scene_target.color_view(self.index), destination.color_view(0))
        else {
            return Err(RendererError::MissingInput {
                pass: self.name.to_string(),
                input: self.input.to_string(),
            });
        };

        ctx.backend.begin_render_pass(&RenderPassDescriptor {
            label: Some(self.name.to_string()),
            color_attachments: vec![ColorAttachment {
                view: source,
                resolve_target: Some(target),
                load_op: LoadOp::Load,
                store_op: StoreOp::Store,
            }],
            depth_stencil_attachment: None,
        });
        ctx.backend.end_render_pass();
        Ok(())
    }
}
