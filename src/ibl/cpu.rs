//! CPU reference for the IBL convolutions.
//!
//! These follow the shaders in this module line for line and are used to
//! check their math without a GPU: face addressing, the cosine-weighted
//! irradiance sum, GGX importance-sampled prefiltering and the split-sum BRDF
//! integral.

use crate::resources::HdrImage;
use crate::targets::CubeFace;
use glam::{Vec2, Vec3};
use half::f16;
use std::f32::consts::PI;

/// Angular step of the irradiance hemisphere sum
pub const IRRADIANCE_SAMPLE_DELTA: f32 = 0.025;

/// Importance samples per texel for prefiltering and BRDF integration
pub const GGX_SAMPLE_COUNT: u32 = 1024;

/// One cube face rasterized texel by texel: `size * size` values, row 0 on top
pub fn render_face(face: CubeFace, size: u32, shade: impl Fn(Vec3) -> Vec3) -> Vec<Vec3> {
    let mut texels = Vec::with_capacity((size * size) as usize);
    for y in 0..size {
        for x in 0..size {
            texels.push(shade(face.texel_direction(x, y, size)));
        }
    }
    texels
}

/// Equirect → cube capture of every face in layer order
pub fn equirect_to_cube(panorama: &HdrImage, size: u32) -> [Vec<Vec3>; 6] {
    CubeFace::ALL.map(|face| render_face(face, size, |dir| panorama.sample_direction(dir)))
}

/// Cosine-weighted hemisphere integral of radiance around `normal`
pub fn compute_irradiance<F: Fn(Vec3) -> Vec3>(normal: Vec3, sample_delta: f32, sample_env: &F) -> Vec3 {
    let mut irradiance = Vec3::ZERO;

    let up = if normal.y.abs() < 0.999 { Vec3::Y } else { Vec3::X };
    let right = up.cross(normal).normalize();
    let up = normal.cross(right);

    let mut samples = 0u32;
    let mut phi = 0.0f32;
    while phi < 2.0 * PI {
        let mut theta = 0.0f32;
        while theta < 0.5 * PI {
            let tangent = Vec3::new(theta.sin() * phi.cos(), theta.sin() * phi.sin(), theta.cos());
            let sample = tangent.x * right + tangent.y * up + tangent.z * normal;

            irradiance += sample_env(sample) * theta.cos() * theta.sin();
            samples += 1;
            theta += sample_delta;
        }
        phi += sample_delta;
    }

    PI * irradiance / samples.max(1) as f32
}

/// GGX-prefiltered radiance along `normal` with view = reflection = normal
pub fn compute_prefiltered<F: Fn(Vec3) -> Vec3>(
    normal: Vec3,
    roughness: f32,
    sample_count: u32,
    sample_env: &F,
) -> Vec3 {
    let v = normal;

    let mut prefiltered = Vec3::ZERO;
    let mut total_weight = 0.0;

    for i in 0..sample_count {
        let xi = hammersley(i, sample_count);
        let h = importance_sample_ggx(xi, normal, roughness);
        let l = (2.0 * v.dot(h) * h - v).normalize();

        let n_dot_l = normal.dot(l);
        if n_dot_l > 0.0 {
            prefiltered += sample_env(l) * n_dot_l;
            total_weight += n_dot_l;
        }
    }

    prefiltered / total_weight.max(0.001)
}

/// Hammersley point `i` of `n`
pub fn hammersley(i: u32, n: u32) -> Vec2 {
    Vec2::new(i as f32 / n as f32, radical_inverse_vdc(i))
}

/// Van der Corput radical inverse in base 2
pub fn radical_inverse_vdc(bits: u32) -> f32 {
    bits.reverse_bits() as f32 * 2.328_306_4e-10
}

/// Half vector around `n` distributed by the GGX lobe of `roughness`
pub fn importance_sample_ggx(xi: Vec2, n: Vec3, roughness: f32) -> Vec3 {
    let a = roughness * roughness;

    let phi = 2.0 * PI * xi.x;
    let cos_theta = ((1.0 - xi.y) / (1.0 + (a * a - 1.0) * xi.y)).sqrt();
    let sin_theta = (1.0 - cos_theta * cos_theta).sqrt();

    let h = Vec3::new(phi.cos() * sin_theta, phi.sin() * sin_theta, cos_theta);

    let up = if n.z.abs() < 0.999 { Vec3::Z } else { Vec3::X };
    let tangent = up.cross(n).normalize();
    let bitangent = n.cross(tangent);

    (tangent * h.x + bitangent * h.y + n * h.z).normalize()
}

fn geometry_schlick_ggx(n_dot_v: f32, roughness: f32) -> f32 {
    // IBL remapping of k
    let k = roughness * roughness / 2.0;
    n_dot_v / (n_dot_v * (1.0 - k) + k)
}

fn geometry_smith(n_dot_v: f32, n_dot_l: f32, roughness: f32) -> f32 {
    geometry_schlick_ggx(n_dot_v, roughness) * geometry_schlick_ggx(n_dot_l, roughness)
}

/// Split-sum scale and bias for `(n_dot_v, roughness)`
pub fn integrate_brdf(n_dot_v: f32, roughness: f32, sample_count: u32) -> Vec2 {
    let v = Vec3::new((1.0 - n_dot_v * n_dot_v).sqrt(), 0.0, n_dot_v);
    let n = Vec3::Z;

    let mut a = 0.0;
    let mut b = 0.0;

    for i in 0..sample_count {
        let xi = hammersley(i, sample_count);
        let h = importance_sample_ggx(xi, n, roughness);
        let l = (2.0 * v.dot(h) * h - v).normalize();

        let n_dot_l = l.z.max(0.0);
        let n_dot_h = h.z.max(0.0);
        let v_dot_h = v.dot(h).max(0.0);

        if n_dot_l > 0.0 {
            let g = geometry_smith(n_dot_v, n_dot_l, roughness);
            let g_vis = (g * v_dot_h) / (n_dot_h * n_dot_v);
            let fc = (1.0 - v_dot_h).powi(5);

            a += (1.0 - fc) * g_vis;
            b += fc * g_vis;
        }
    }

    Vec2::new(a, b) / sample_count as f32
}

/// Bake the LUT as interleaved RG half floats, row 0 at roughness ≈ 0.
/// Texel centers are sampled, matching the fullscreen bake.
pub fn bake_brdf_lut(size: u32, sample_count: u32) -> Vec<f16> {
    let mut texels = Vec::with_capacity((size * size * 2) as usize);
    for y in 0..size {
        let roughness = (y as f32 + 0.5) / size as f32;
        for x in 0..size {
            let n_dot_v = (x as f32 + 0.5) / size as f32;
            let scale_bias = integrate_brdf(n_dot_v, roughness, sample_count);
            texels.push(f16::from_f32(scale_bias.x));
            texels.push(f16::from_f32(scale_bias.y));
        }
    }
    texels
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn assert_near(got: Vec3, expected: Vec3, tolerance: f32) {
        let err = (got - expected).abs().max_element() / expected.max_element();
        assert!(err < tolerance, "{} vs {} (relative error {})", got, expected, err);
    }

    #[test]
    fn test_radical_inverse() {
        assert_eq!(radical_inverse_vdc(0), 0.0);
        assert_eq!(radical_inverse_vdc(1), 0.5);
        assert_eq!(radical_inverse_vdc(2), 0.25);
        assert_eq!(radical_inverse_vdc(3), 0.75);
    }

    #[rstest]
    #[case::forward(Vec3::Z)]
    #[case::up(Vec3::Y)]
    #[case::down(Vec3::NEG_Y)]
    #[case::oblique(Vec3::new(0.3, -0.5, 0.8))]
    fn test_uniform_environment_irradiance(#[case] normal: Vec3) {
        let radiance = Vec3::new(0.5, 0.5, 0.5);
        let got = compute_irradiance(normal.normalize(), IRRADIANCE_SAMPLE_DELTA, &|_| radiance);
        assert_near(got, radiance, 0.02);
    }

    #[rstest]
    #[case::mirror(0.0)]
    #[case::quarter(0.25)]
    #[case::half(0.5)]
    #[case::three_quarters(0.75)]
    #[case::rough(1.0)]
    fn test_uniform_environment_prefilter(#[case] roughness: f32) {
        let radiance = Vec3::new(0.2, 0.4, 0.8);
        for face in CubeFace::ALL {
            let got = compute_prefiltered(face.direction(), roughness, 256, &|_| radiance);
            assert_near(got, radiance, 1e-3);
        }
    }

    #[test]
    fn test_uniform_panorama_through_full_chain() {
        let radiance = Vec3::splat(0.75);
        let panorama = HdrImage::uniform(64, 32, radiance);
        let env = |dir: Vec3| panorama.sample_direction(dir);

        for face in CubeFace::ALL {
            for texel in render_face(face, 4, |dir| compute_irradiance(dir, 0.1, &env)) {
                assert_near(texel, radiance, 0.06);
            }
            for texel in render_face(face, 4, |dir| compute_prefiltered(dir, 0.5, 64, &env)) {
                assert_near(texel, radiance, 1e-3);
            }
        }
    }

    #[test]
    fn test_each_face_sees_its_own_marker() {
        // Six markers, one per axis; every texel takes the marker of the
        // dominant axis of its direction
        let markers = [
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(0.0, 1.0, 1.0),
            Vec3::new(1.0, 0.0, 1.0),
        ];
        let panorama = HdrImage::from_fn(512, 256, |dir| {
            let axis = CubeFace::ALL
                .iter()
                .max_by(|a, b| a.direction().dot(dir).total_cmp(&b.direction().dot(dir)))
                .map(|f| f.index() as usize)
                .unwrap_or(0);
            markers[axis]
        });

        let faces = equirect_to_cube(&panorama, 8);
        for (face, texels) in CubeFace::ALL.iter().zip(faces.iter()) {
            // Middle texel of an 8×8 face
            let center = texels[(4 * 8 + 4) as usize];
            assert_eq!(center, markers[face.index() as usize], "{:?}", face);
        }
    }

    #[test]
    fn test_brdf_lut_is_deterministic() {
        let first = bake_brdf_lut(16, 64);
        let second = bake_brdf_lut(16, 64);
        assert_eq!(first.len(), 16 * 16 * 2);
        let bits = |lut: &[f16]| lut.iter().map(|v| v.to_bits()).collect::<Vec<_>>();
        assert_eq!(bits(&first), bits(&second));
    }

    #[test]
    fn test_brdf_smooth_head_on_reflects_fully() {
        let scale_bias = integrate_brdf(1.0, 0.0, 64);
        assert!((scale_bias.x + scale_bias.y - 1.0).abs() < 0.01, "{}", scale_bias);
    }
}
