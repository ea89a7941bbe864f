//! Alternating blur targets

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::error::RendererError;
use crate::render_graph::TextureSize;
use crate::targets::render_target::{AttachmentDesc, RenderTarget, RenderTargetDesc};

/// Two same-sized single-sample color targets used alternately as blur source
/// and destination.
///
/// `horizontal` both selects the blur direction and names the target written
/// next: index 1 while horizontal, index 0 otherwise. The readable result is
/// always the other one.
pub struct PingPongPair {
    targets: [RenderTarget; 2],
    horizontal: bool,
}

impl PingPongPair {
    pub fn create<B: GraphicsBackend>(
        backend: &mut B,
        format: TextureFormat,
        screen_width: u32,
        screen_height: u32,
    ) -> Result<Self, RendererError> {
        let make = |backend: &mut B, index: usize| {
            RenderTarget::create(
                backend,
                RenderTargetDesc {
                    label: format!("Ping-Pong {}", index),
                    size: TextureSize::default(),
                    sample_count: 1,
                    color: vec![AttachmentDesc::sampled("Color", format)],
                    depth: None,
                },
                screen_width,
                screen_height,
            )
        };

        Ok(Self {
            targets: [make(backend, 0)?, make(backend, 1)?],
            horizontal: true,
        })
    }

    /// Restore the initial state before a new blur sequence
    pub fn reset(&mut self) {
        self.horizontal = true;
    }

    pub fn is_horizontal(&self) -> bool {
        self.horizontal
    }

    /// Index of the target the next iteration writes
    pub fn write_index(&self) -> usize {
        self.horizontal as usize
    }

    /// Index holding the latest finished iteration
    pub fn result_index(&self) -> usize {
        (!self.horizontal) as usize
    }

    /// Swap roles after an iteration
    pub fn flip(&mut self) {
        self.horizontal = !self.horizontal;
    }

    pub fn target(&self, index: usize) -> &RenderTarget {
        &self.targets[index & 1]
    }

    pub fn view(&self, index: usize) -> Option<TextureViewHandle> {
        self.target(index).color_view(0)
    }

    pub fn result_view(&self) -> Option<TextureViewHandle> {
        self.view(self.result_index())
    }

    pub fn size(&self) -> (u32, u32) {
        self.targets[0].size()
    }

    pub fn resize<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        screen_width: u32,
        screen_height: u32,
    ) -> Result<bool, RendererError> {
        let [first, second] = &mut self.targets;
        let first = first.resize(backend, screen_width, screen_height);
        let second = second.resize(backend, screen_width, screen_height);
        Ok(first? | second?)
    }

    pub fn validate(&self) -> Result<(), RendererError> {
        self.targets.iter().try_for_each(|t| t.validate())
    }
}

/// Reference schedule of a blur run: `(read, write, horizontal)` per iteration,
/// where `read` is `None` for the unblurred source.
pub fn blur_schedule(iterations: u32) -> (Vec<(Option<usize>, usize, bool)>, usize) {
    let mut horizontal = true;
    let mut steps = Vec::with_capacity(iterations as usize);
    for i in 0..iterations {
        let write = horizontal as usize;
        let read = if i == 0 { None } else { Some((!horizontal) as usize) };
        steps.push((read, write, horizontal));
        horizontal = !horizontal;
    }
    (steps, (!horizontal) as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordingBackend;
    use rstest::rstest;

    fn pair() -> PingPongPair {
        let mut backend = RecordingBackend::default();
        PingPongPair::create(&mut backend, TextureFormat::Rgba16Float, 1280, 720).unwrap()
    }

    #[test]
    fn test_first_write_goes_to_index_one() {
        let pair = pair();
        assert!(pair.is_horizontal());
        assert_eq!(pair.write_index(), 1);
        assert_eq!(pair.result_index(), 0);
    }

    #[rstest]
    #[case::ten(10, 0)]
    #[case::even(4, 0)]
    #[case::odd(5, 1)]
    #[case::one(1, 1)]
    fn test_result_index_after_iterations(#[case] iterations: u32, #[case] expected: usize) {
        let mut pair = pair();
        let initial_write = pair.write_index();
        let mut last_write = initial_write;
        for _ in 0..iterations {
            last_write = pair.write_index();
            pair.flip();
        }
        assert_eq!(pair.result_index(), expected);
        assert_eq!(pair.result_index(), last_write);
        if iterations % 2 == 0 {
            assert_eq!(pair.write_index(), initial_write);
        }
    }

    #[test]
    fn test_schedule_reads_previous_output() {
        let (steps, result) = blur_schedule(10);
        assert_eq!(steps[0], (None, 1, true));
        assert_eq!(steps[1], (Some(1), 0, false));
        assert_eq!(steps[2], (Some(0), 1, true));
        for window in steps.windows(2) {
            assert_eq!(window[1].0, Some(window[0].1));
        }
        assert_eq!(result, 0);
    }

    #[test]
    fn test_reset_restores_initial_direction() {
        let mut pair = pair();
        pair.flip();
        pair.reset();
        assert_eq!(pair.write_index(), 1);
    }
}
