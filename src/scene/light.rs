//! Point lights

use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};

/// Number of point lights the shading uniform holds
pub const MAX_POINT_LIGHTS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointLight {
    pub position: Vec3,
    pub color: Vec3,
}

impl PointLight {
    pub fn new(position: Vec3, color: Vec3) -> Self {
        Self { position, color }
    }

    /// The four coloured lights of the demo scene; the first one casts the
    /// omnidirectional shadow
    pub fn demo_lights() -> Vec<PointLight> {
        vec![
            PointLight::new(Vec3::new(0.7, 0.2, 2.0), Vec3::new(0.2, 0.0, 0.0)),
            PointLight::new(Vec3::new(2.3, -3.3, -4.0), Vec3::new(0.0, 1.0, 0.0)),
            PointLight::new(Vec3::new(-4.0, 2.0, -12.0), Vec3::new(0.0, 0.0, 1.0)),
            PointLight::new(Vec3::new(0.0, 0.0, -3.0), Vec3::new(1.0, 0.0, 1.0)),
        ]
    }
}

/// Per-frame lighting block bound next to the camera
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct LightingUniform {
    pub positions: [Vec4; MAX_POINT_LIGHTS],
    pub colors: [Vec4; MAX_POINT_LIGHTS],
    /// xyz: shadow-casting light, w: shadow far plane
    pub shadow_light: Vec4,
    /// x: light count, y: bloom threshold, z: max prefilter mip, w: unused
    pub params: Vec4,
}

impl LightingUniform {
    pub fn new(
        lights: &[PointLight],
        shadow_light: Vec3,
        shadow_far: f32,
        bloom_threshold: f32,
        max_prefilter_mip: f32,
    ) -> Self {
        let mut uniform = Self::zeroed();
        let count = lights.len().min(MAX_POINT_LIGHTS);
        if lights.len() > MAX_POINT_LIGHTS {
            log::warn!(
                "{} point lights given, only the first {} are shaded",
                lights.len(),
                MAX_POINT_LIGHTS
            );
        }
        for (i, light) in lights.iter().take(count).enumerate() {
            uniform.positions[i] = light.position.extend(1.0);
            uniform.colors[i] = light.color.extend(1.0);
        }
        uniform.shadow_light = shadow_light.extend(shadow_far);
        uniform.params = Vec4::new(count as f32, bloom_threshold, max_prefilter_mip, 0.0);
        uniform
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_packs_every_demo_light() {
        let lights = PointLight::demo_lights();
        let uniform = LightingUniform::new(&lights, lights[0].position, 25.0, 1.0, 4.0);
        assert_eq!(uniform.params.x, 4.0);
        assert_eq!(uniform.positions[3].truncate(), Vec3::new(0.0, 0.0, -3.0));
        assert_eq!(uniform.colors[1].truncate(), Vec3::new(0.0, 1.0, 0.0));
        assert_eq!(uniform.shadow_light.w, 25.0);
    }

    #[test]
    fn test_extra_lights_are_dropped() {
        let lights = vec![PointLight::new(Vec3::ZERO, Vec3::ONE); 6];
        let uniform = LightingUniform::new(&lights, Vec3::ZERO, 25.0, 1.0, 4.0);
        assert_eq!(uniform.params.x, MAX_POINT_LIGHTS as f32);
    }
}
