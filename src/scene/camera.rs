//! Fly camera and its shared uniform buffer

use crate::backend::traits::*;
use crate::backend::types::*;
use bytemuck::{Pod, Zeroable};
use glam::{Mat3, Mat4, Vec3, Vec4};

/// Direction of a keyboard movement step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Movement {
    Forward,
    Backward,
    Left,
    Right,
}

/// Yaw/pitch fly camera
#[derive(Debug, Clone)]
pub struct Camera {
    pub position: Vec3,
    pub front: Vec3,
    pub up: Vec3,
    pub right: Vec3,
    pub world_up: Vec3,
    /// Degrees
    pub yaw: f32,
    /// Degrees, clamped to ±89 by mouse look
    pub pitch: f32,
    pub movement_speed: f32,
    pub mouse_sensitivity: f32,
    /// Vertical field of view in degrees
    pub fov: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(Vec3::new(0.0, 0.0, 3.0))
    }
}

impl Camera {
    pub const YAW: f32 = -90.0;
    pub const PITCH: f32 = 0.0;
    pub const SPEED: f32 = 2.5;
    pub const SENSITIVITY: f32 = 0.1;
    pub const FOV: f32 = 45.0;
    pub const MIN_FOV: f32 = 1.0;
    pub const MAX_PITCH: f32 = 89.0;

    pub fn new(position: Vec3) -> Self {
        let mut camera = Self {
            position,
            front: Vec3::NEG_Z,
            up: Vec3::Y,
            right: Vec3::X,
            world_up: Vec3::Y,
            yaw: Self::YAW,
            pitch: Self::PITCH,
            movement_speed: Self::SPEED,
            mouse_sensitivity: Self::SENSITIVITY,
            fov: Self::FOV,
            aspect: 1280.0 / 720.0,
            near: 0.1,
            far: 100.0,
        };
        camera.update_vectors();
        camera
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.position + self.front, self.up)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov.to_radians(), self.aspect, self.near, self.far)
    }

    /// View matrix with translation removed, for the skybox
    pub fn skybox_view(&self) -> Mat4 {
        Mat4::from_mat3(Mat3::from_mat4(self.view_matrix()))
    }

    pub fn set_aspect(&mut self, width: u32, height: u32) {
        if height > 0 {
            self.aspect = width as f32 / height as f32;
        }
    }

    /// Step along `direction` for `delta_time` seconds
    pub fn process_keyboard(&mut self, direction: Movement, delta_time: f32) {
        let velocity = self.movement_speed * delta_time;
        match direction {
            Movement::Forward => self.position += self.front * velocity,
            Movement::Backward => self.position -= self.front * velocity,
            Movement::Left => self.position -= self.right * velocity,
            Movement::Right => self.position += self.right * velocity,
        }
    }

    /// Turn by a cursor offset in pixels; positive `y_offset` looks up
    pub fn process_mouse_movement(&mut self, x_offset: f32, y_offset: f32, constrain_pitch: bool) {
        self.yaw += x_offset * self.mouse_sensitivity;
        self.pitch += y_offset * self.mouse_sensitivity;

        if constrain_pitch {
            self.pitch = self.pitch.clamp(-Self::MAX_PITCH, Self::MAX_PITCH);
        }

        self.update_vectors();
    }

    /// Zoom by narrowing the field of view
    pub fn process_mouse_scroll(&mut self, y_offset: f32) {
        self.fov = (self.fov - y_offset).clamp(Self::MIN_FOV, Self::FOV);
    }

    fn update_vectors(&mut self) {
        let (yaw, pitch) = (self.yaw.to_radians(), self.pitch.to_radians());
        self.front = Vec3::new(yaw.cos() * pitch.cos(), pitch.sin(), yaw.sin() * pitch.cos()).normalize();
        self.right = self.front.cross(self.world_up).normalize();
        self.up = self.right.cross(self.front).normalize();
    }
}

/// Layout of the shared camera block. Projection sits at offset 0 and view at
/// offset 64 so either can be patched alone.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct CameraUniformData {
    pub projection: Mat4,
    pub view: Mat4,
    pub position: Vec4,
}

impl CameraUniformData {
    pub const PROJECTION_OFFSET: u64 = 0;
    pub const VIEW_OFFSET: u64 = 64;
    pub const POSITION_OFFSET: u64 = 128;

    pub fn from_camera(camera: &Camera) -> Self {
        Self {
            projection: camera.projection_matrix(),
            view: camera.view_matrix(),
            position: camera.position.extend(1.0),
        }
    }
}

/// Uniform buffer holding the camera matrices, mutated in place on input and
/// resize. Readers always see the latest write; there is no double buffering.
pub struct CameraUniformBuffer {
    buffer: BufferHandle,
}

impl CameraUniformBuffer {
    pub fn new<B: GraphicsBackend>(backend: &mut B, camera: &Camera) -> BackendResult<Self> {
        let buffer = backend.create_buffer_init(
            &BufferDescriptor {
                label: Some("Camera Uniforms".to_string()),
                size: std::mem::size_of::<CameraUniformData>() as u64,
                usage: BufferUsage::UNIFORM | BufferUsage::COPY_DST,
            },
            bytemuck::bytes_of(&CameraUniformData::from_camera(camera)),
        )?;
        Ok(Self { buffer })
    }

    pub fn buffer(&self) -> BufferHandle {
        self.buffer
    }

    pub fn size() -> u64 {
        std::mem::size_of::<CameraUniformData>() as u64
    }

    /// Rewrite the projection after a zoom or resize
    pub fn patch_projection<B: GraphicsBackend>(&self, backend: &mut B, camera: &Camera) {
        backend.write_buffer(
            self.buffer,
            CameraUniformData::PROJECTION_OFFSET,
            bytemuck::bytes_of(&camera.projection_matrix()),
        );
    }

    /// Rewrite the view and eye position after movement or mouse look
    pub fn patch_view<B: GraphicsBackend>(&self, backend: &mut B, camera: &Camera) {
        backend.write_buffer(
            self.buffer,
            CameraUniformData::VIEW_OFFSET,
            bytemuck::bytes_of(&camera.view_matrix()),
        );
        backend.write_buffer(
            self.buffer,
            CameraUniformData::POSITION_OFFSET,
            bytemuck::bytes_of(&camera.position.extend(1.0)),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordingBackend;
    use rstest::rstest;

    #[test]
    fn test_starts_looking_down_negative_z() {
        let camera = Camera::default();
        assert!(camera.front.abs_diff_eq(Vec3::NEG_Z, 1e-6));
        assert!(camera.right.abs_diff_eq(Vec3::X, 1e-6));
    }

    #[rstest]
    #[case::forward(Movement::Forward, Vec3::new(0.0, 0.0, 3.0 - 2.5))]
    #[case::backward(Movement::Backward, Vec3::new(0.0, 0.0, 3.0 + 2.5))]
    #[case::left(Movement::Left, Vec3::new(-2.5, 0.0, 3.0))]
    #[case::right(Movement::Right, Vec3::new(2.5, 0.0, 3.0))]
    fn test_one_second_of_movement(#[case] direction: Movement, #[case] expected: Vec3) {
        let mut camera = Camera::default();
        camera.process_keyboard(direction, 1.0);
        assert!(camera.position.abs_diff_eq(expected, 1e-5), "{}", camera.position);
    }

    #[test]
    fn test_pitch_is_clamped() {
        let mut camera = Camera::default();
        camera.process_mouse_movement(0.0, 10_000.0, true);
        assert_eq!(camera.pitch, Camera::MAX_PITCH);
    }

    #[rstest]
    #[case::zoom_in(10.0, 35.0)]
    #[case::past_minimum(100.0, 1.0)]
    #[case::past_maximum(-5.0, 45.0)]
    fn test_scroll_clamps_fov(#[case] offset: f32, #[case] expected: f32) {
        let mut camera = Camera::default();
        camera.process_mouse_scroll(offset);
        assert_eq!(camera.fov, expected);
    }

    #[test]
    fn test_skybox_view_has_no_translation() {
        let mut camera = Camera::default();
        camera.process_keyboard(Movement::Left, 3.0);
        assert_eq!(camera.skybox_view().w_axis, Vec4::W);
    }

    #[test]
    fn test_patches_land_at_fixed_offsets() {
        let mut backend = RecordingBackend::default();
        let mut camera = Camera::default();
        let ubo = CameraUniformBuffer::new(&mut backend, &camera).unwrap();

        camera.process_mouse_movement(15.0, 5.0, true);
        ubo.patch_view(&mut backend, &camera);
        camera.set_aspect(1920, 1080);
        ubo.patch_projection(&mut backend, &camera);

        let bytes = backend.buffer_contents(ubo.buffer()).unwrap();
        let data: CameraUniformData =
            bytemuck::pod_read_unaligned(&bytes[..CameraUniformBuffer::size() as usize]);
        assert_eq!(data.view, camera.view_matrix());
        assert_eq!(data.projection, camera.projection_matrix());
        assert_eq!(data.position.truncate(), camera.position);
    }
}
