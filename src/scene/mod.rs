//! The hand-authored demo scene
//!
//! [`Scene`] is plain CPU data: camera, point lights, opaque objects and the
//! transparent window quads. [`GpuScene`] uploads it once and rewrites the
//! per-object uniform slots every frame.

mod camera;
mod camera_controller;
mod gpu;
mod light;
mod transform;
mod transparent;

pub use camera::*;
pub use camera_controller::*;
pub use gpu::*;
pub use light::*;
pub use transform::*;
pub use transparent::*;

use crate::resources::{Material, Mesh};
use glam::Vec3;

/// Scale of the light marker cubes
pub const MARKER_SCALE: f32 = 0.2;
/// Outline size relative to its marker
pub const OUTLINE_SCALE: f32 = 1.2;
/// Outline color relative to its light's color
pub const OUTLINE_TINT: f32 = 0.5;

/// An opaque drawable
#[derive(Debug, Clone)]
pub struct SceneObject {
    pub name: String,
    pub mesh: Mesh,
    pub transform: Transform,
    pub material: Material,
}

impl SceneObject {
    pub fn new(name: &str, mesh: Mesh, transform: Transform, material: Material) -> Self {
        Self {
            name: name.to_string(),
            mesh,
            transform,
            material,
        }
    }
}

/// Everything the frame pipeline draws
pub struct Scene {
    pub camera: Camera,
    /// Light 0 casts the omnidirectional shadow
    pub lights: Vec<PointLight>,
    pub objects: Vec<SceneObject>,
    pub transparent: TransparentSet,
    pub window_material: Material,
}

impl Scene {
    pub const WINDOW_TEXTURE: &'static str = "textures/blending_transparent_window.png";

    /// Demo layout: a floor, a row of spheres from smooth to rough, a gold
    /// cube, four coloured lights and four window panes
    pub fn demo(sort_policy: TransparentSortPolicy) -> Self {
        let camera = Camera::default();

        let mut objects = vec![SceneObject::new(
            "floor",
            Mesh::plane(20.0, 20.0, 4),
            Transform::from_position(Vec3::new(0.0, -1.0, 0.0)),
            Material::plastic(Vec3::splat(0.6), 0.8),
        )];

        let roughness = [0.05, 0.25, 0.5, 0.75, 1.0];
        for (i, &r) in roughness.iter().enumerate() {
            let x = (i as f32 - 2.0) * 1.5;
            objects.push(SceneObject::new(
                &format!("sphere {}", i),
                Mesh::sphere(48, 24),
                Transform::from_position(Vec3::new(x, 0.0, -4.0)),
                Material::metal(Vec3::new(0.95, 0.64, 0.54), r),
            ));
        }

        objects.push(SceneObject::new(
            "cube",
            Mesh::cube(),
            Transform::from_position(Vec3::new(2.0, -0.5, -1.5)).with_rotation(Vec3::Y, 0.6),
            Material::gold(),
        ));

        let windows = vec![
            Vec3::new(-1.5, 0.0, -0.48),
            Vec3::new(1.5, 0.0, 0.51),
            Vec3::new(-0.3, 0.0, -2.3),
            Vec3::new(0.5, 0.0, -0.6),
        ];
        let transparent = TransparentSet::new(windows, camera.position, sort_policy);

        Self {
            camera,
            lights: PointLight::demo_lights(),
            objects,
            transparent,
            window_material: Material::window(Self::WINDOW_TEXTURE),
        }
    }

    /// The light whose shadow is rendered
    pub fn shadow_light(&self) -> Option<&PointLight> {
        self.lights.first()
    }

    /// Per-frame CPU update
    pub fn update(&mut self) {
        self.transparent.update(self.camera.position);
    }

    pub fn marker_transform(light: &PointLight) -> Transform {
        Transform::from_position_scale(light.position, Vec3::splat(MARKER_SCALE))
    }

    pub fn outline_transform(light: &PointLight) -> Transform {
        Self::marker_transform(light).scaled(OUTLINE_SCALE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_windows_sorted_from_start_position() {
        let scene = Scene::demo(TransparentSortPolicy::OnceAtLoad);
        let eye = Vec3::new(0.0, 0.0, 3.0);
        let distances: Vec<f32> = scene.transparent.draw_order().map(|p| p.distance(eye)).collect();
        assert!(distances.windows(2).all(|w| w[0] >= w[1]), "{:?}", distances);
        assert_eq!(distances.len(), 4);
    }

    #[test]
    fn test_outline_is_larger_than_marker() {
        let light = PointLight::demo_lights()[1];
        let marker = Scene::marker_transform(&light);
        let outline = Scene::outline_transform(&light);
        assert!(outline.scale.abs_diff_eq(marker.scale * OUTLINE_SCALE, 1e-6));
        assert_eq!(outline.position, light.position);
    }
}
