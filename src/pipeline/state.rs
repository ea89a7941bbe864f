//! Scoped depth, stencil and cull state
//!
//! wgpu bakes these into pipelines, so "changing state" means picking another
//! pipeline variant. [`StateTracker`] keeps the active [`RenderState`];
//! [`StateTracker::scope`] overrides it and the returned guard puts the
//! previous state back when dropped, including on `?` and early returns.

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::error::RendererError;
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};

/// Stencil behaviour of a draw
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StencilMode {
    /// Test always passes, nothing is written
    Disabled,
    /// Write the reference wherever the fragment passes
    WriteReference(u32),
    /// Draw only where the buffer differs from the reference; no writes
    NotEqualReference(u32),
}

impl StencilMode {
    pub fn reference(self) -> Option<u32> {
        match self {
            StencilMode::Disabled => None,
            StencilMode::WriteReference(r) | StencilMode::NotEqualReference(r) => Some(r),
        }
    }

    fn state(self) -> StencilState {
        match self {
            StencilMode::Disabled => StencilState::both(StencilFaceState::default(), 0xFF, 0x00),
            StencilMode::WriteReference(_) => StencilState::both(
                StencilFaceState {
                    compare: CompareFunction::Always,
                    fail_op: StencilOperation::Keep,
                    depth_fail_op: StencilOperation::Keep,
                    pass_op: StencilOperation::Replace,
                },
                0xFF,
                0xFF,
            ),
            StencilMode::NotEqualReference(_) => StencilState::both(
                StencilFaceState {
                    compare: CompareFunction::NotEqual,
                    ..Default::default()
                },
                0xFF,
                0x00,
            ),
        }
    }
}

/// Fixed-function state of one draw
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderState {
    /// `None` disables the depth test entirely
    pub depth_compare: Option<CompareFunction>,
    pub depth_write: bool,
    pub stencil: StencilMode,
    pub cull: CullMode,
}

impl Default for RenderState {
    fn default() -> Self {
        Self {
            depth_compare: Some(CompareFunction::Less),
            depth_write: true,
            stencil: StencilMode::Disabled,
            cull: CullMode::Back,
        }
    }
}

impl RenderState {
    /// Stencil-writing light marker
    pub fn marker(reference: u32) -> Self {
        Self {
            stencil: StencilMode::WriteReference(reference),
            ..Default::default()
        }
    }

    /// Outline drawn around a marker, visible through other geometry
    pub fn outline(reference: u32) -> Self {
        Self {
            depth_compare: None,
            depth_write: false,
            stencil: StencilMode::NotEqualReference(reference),
            cull: CullMode::Back,
        }
    }

    /// Skybox at the far plane, seen from inside
    pub fn skybox() -> Self {
        Self {
            depth_compare: Some(CompareFunction::LessEqual),
            depth_write: false,
            stencil: StencilMode::Disabled,
            cull: CullMode::None,
        }
    }

    /// Alpha-blended, two-sided, depth-tested but not depth-writing
    pub fn transparent() -> Self {
        Self {
            depth_compare: Some(CompareFunction::Less),
            depth_write: false,
            stencil: StencilMode::Disabled,
            cull: CullMode::None,
        }
    }

    pub fn depth_stencil(&self, format: TextureFormat) -> DepthStencilState {
        DepthStencilState {
            format,
            depth_write_enabled: self.depth_write && self.depth_compare.is_some(),
            depth_compare: self.depth_compare.unwrap_or(CompareFunction::Always),
            stencil: if format.has_stencil() {
                self.stencil.state()
            } else {
                StencilState::default()
            },
        }
    }
}

/// Stack of render states with scoped overrides
#[derive(Debug, Default)]
pub struct StateTracker {
    current: RenderState,
    stack: Vec<RenderState>,
}

impl StateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> RenderState {
        self.current
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Override the state until the returned guard is dropped
    pub fn scope(&mut self, state: RenderState) -> StateScope<'_> {
        self.stack.push(self.current);
        self.current = state;
        StateScope { tracker: self }
    }

    fn restore(&mut self) {
        if let Some(previous) = self.stack.pop() {
            self.current = previous;
        }
    }

    /// Bind the pipeline of `kind` matching the current state, and its
    /// stencil reference if it uses one
    pub fn bind<B: GraphicsBackend, K: Copy + Eq + std::hash::Hash + std::fmt::Debug>(
        &self,
        backend: &mut B,
        variants: &PipelineVariants<K>,
        kind: K,
    ) -> Result<(), RendererError> {
        let pipeline = variants.get(kind, self.current).ok_or_else(|| RendererError::MissingInput {
            pass: variants.label.clone(),
            input: format!("{:?} pipeline for {:?}", kind, self.current),
        })?;
        backend.set_render_pipeline(pipeline);
        if let Some(reference) = self.current.stencil.reference() {
            backend.set_stencil_reference(reference);
        }
        Ok(())
    }
}

/// Guard returned by [`StateTracker::scope`]
pub struct StateScope<'a> {
    tracker: &'a mut StateTracker,
}

impl Deref for StateScope<'_> {
    type Target = StateTracker;

    fn deref(&self) -> &StateTracker {
        self.tracker
    }
}

impl DerefMut for StateScope<'_> {
    fn deref_mut(&mut self) -> &mut StateTracker {
        self.tracker
    }
}

impl Drop for StateScope<'_> {
    fn drop(&mut self) {
        self.tracker.restore();
    }
}

/// Pipelines created up front for every (draw kind, state) pair a pass uses
pub struct PipelineVariants<K> {
    label: String,
    pipelines: HashMap<(K, RenderState), RenderPipelineHandle>,
}

impl<K: Copy + Eq + std::hash::Hash> PipelineVariants<K> {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            pipelines: HashMap::new(),
        }
    }

    pub fn insert(&mut self, kind: K, state: RenderState, pipeline: RenderPipelineHandle) {
        self.pipelines.insert((kind, state), pipeline);
    }

    pub fn get(&self, kind: K, state: RenderState) -> Option<RenderPipelineHandle> {
        self.pipelines.get(&(kind, state)).copied()
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fails_inside_scope(tracker: &mut StateTracker) -> Result<(), RendererError> {
        let mut marker = tracker.scope(RenderState::marker(1));
        let _outline = marker.scope(RenderState::outline(1));
        Err(RendererError::MissingInput {
            pass: "test".to_string(),
            input: "nothing".to_string(),
        })?;
        Ok(())
    }

    #[test]
    fn test_scope_restores_on_drop() {
        let mut tracker = StateTracker::new();
        {
            let scope = tracker.scope(RenderState::skybox());
            assert_eq!(scope.current(), RenderState::skybox());
        }
        assert_eq!(tracker.current(), RenderState::default());
        assert_eq!(tracker.depth(), 0);
    }

    #[test]
    fn test_scope_restores_on_error_path() {
        let mut tracker = StateTracker::new();
        assert!(fails_inside_scope(&mut tracker).is_err());
        assert_eq!(tracker.current(), RenderState::default());
        assert_eq!(tracker.depth(), 0);
    }

    #[test]
    fn test_nested_scopes_unwind_in_order() {
        let mut tracker = StateTracker::new();
        let mut marker = tracker.scope(RenderState::marker(1));
        {
            let outline = marker.scope(RenderState::outline(1));
            assert_eq!(outline.current().stencil, StencilMode::NotEqualReference(1));
        }
        assert_eq!(marker.current(), RenderState::marker(1));
    }

    #[test]
    fn test_outline_state_disables_depth_and_stencil_writes() {
        let ds = RenderState::outline(1).depth_stencil(TextureFormat::Depth24PlusStencil8);
        assert_eq!(ds.depth_compare, CompareFunction::Always);
        assert!(!ds.depth_write_enabled);
        assert_eq!(ds.stencil.write_mask, 0);
        assert_eq!(ds.stencil.front.compare, CompareFunction::NotEqual);
    }

    #[test]
    fn test_default_state_leaves_stencil_untouched() {
        let ds = RenderState::default().depth_stencil(TextureFormat::Depth24PlusStencil8);
        assert_eq!(ds.stencil.write_mask, 0);
        assert_eq!(ds.depth_compare, CompareFunction::Less);
    }

    #[test]
    fn test_marker_state_replaces_stencil() {
        let ds = RenderState::marker(1).depth_stencil(TextureFormat::Depth24PlusStencil8);
        assert_eq!(ds.stencil.write_mask, 0xFF);
        assert_eq!(ds.stencil.front.pass_op, StencilOperation::Replace);
        assert_eq!(ds.stencil.front.compare, CompareFunction::Always);
    }
}
