//! Keyboard and mouse state feeding the fly camera
//!
//! The window layer records raw events into [`CameraInput`]; once per frame
//! [`CameraInput::apply`] moves the [`Camera`] and reports which halves of the
//! camera uniform went stale.

use glam::Vec2;

use super::{Camera, Movement};

/// Which parts of the camera uniform an update touched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CameraChange {
    pub view: bool,
    pub projection: bool,
}

impl CameraChange {
    pub fn any(&self) -> bool {
        self.view || self.projection
    }
}

/// Input state for the fly camera
#[derive(Debug, Clone, Default)]
pub struct CameraInput {
    /// Movement keys (WASD)
    pub forward: bool,
    pub backward: bool,
    pub left: bool,
    pub right: bool,

    /// Cursor offset accumulated since the last apply, y up
    pub mouse_delta: Vec2,

    /// Scroll accumulated since the last apply (positive = scroll up)
    pub scroll_delta: f32,

    last_cursor: Option<Vec2>,
}

impl CameraInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an absolute cursor position. The first event only seeds the
    /// reference point so the view doesn't jump when the cursor enters.
    pub fn cursor_moved(&mut self, x: f32, y: f32) {
        let position = Vec2::new(x, y);
        if let Some(last) = self.last_cursor {
            // Window y grows downwards
            self.mouse_delta += Vec2::new(position.x - last.x, last.y - position.y);
        }
        self.last_cursor = Some(position);
    }

    pub fn scrolled(&mut self, amount: f32) {
        self.scroll_delta += amount;
    }

    /// Reset per-frame deltas (call after apply)
    pub fn reset_deltas(&mut self) {
        self.mouse_delta = Vec2::ZERO;
        self.scroll_delta = 0.0;
    }

    fn movements(&self) -> impl Iterator<Item = Movement> + '_ {
        [
            (self.forward, Movement::Forward),
            (self.backward, Movement::Backward),
            (self.left, Movement::Left),
            (self.right, Movement::Right),
        ]
        .into_iter()
        .filter_map(|(held, movement)| held.then_some(movement))
    }

    /// Move and turn the camera for `dt` seconds of input, then clear deltas
    pub fn apply(&mut self, camera: &mut Camera, dt: f32) -> CameraChange {
        let mut change = CameraChange::default();

        for movement in self.movements() {
            camera.process_keyboard(movement, dt);
            change.view = true;
        }

        if self.mouse_delta != Vec2::ZERO {
            camera.process_mouse_movement(self.mouse_delta.x, self.mouse_delta.y, true);
            change.view = true;
        }

        if self.scroll_delta != 0.0 {
            camera.process_mouse_scroll(self.scroll_delta);
            change.projection = true;
        }

        self.reset_deltas();
        change
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_first_cursor_event_only_seeds() {
        let mut input = CameraInput::new();
        input.cursor_moved(640.0, 360.0);
        assert_eq!(input.mouse_delta, Vec2::ZERO);

        input.cursor_moved(650.0, 350.0);
        assert_eq!(input.mouse_delta, Vec2::new(10.0, 10.0));
    }

    #[test]
    fn test_idle_input_changes_nothing() {
        let mut input = CameraInput::new();
        let mut camera = Camera::default();
        let change = input.apply(&mut camera, 0.016);
        assert!(!change.any());
        assert_eq!(camera.position, Vec3::new(0.0, 0.0, 3.0));
    }

    #[test]
    fn test_held_key_moves_and_marks_view() {
        let mut input = CameraInput {
            forward: true,
            ..Default::default()
        };
        let mut camera = Camera::default();
        let change = input.apply(&mut camera, 0.4);
        assert_eq!(change, CameraChange { view: true, projection: false });
        assert!(camera.position.abs_diff_eq(Vec3::new(0.0, 0.0, 2.0), 1e-5));
    }

    #[test]
    fn test_scroll_marks_projection_and_is_consumed() {
        let mut input = CameraInput::new();
        input.scrolled(5.0);
        let mut camera = Camera::default();
        let change = input.apply(&mut camera, 0.016);
        assert!(change.projection);
        assert_eq!(camera.fov, 40.0);
        assert_eq!(input.scroll_delta, 0.0);
    }
}
