//! Mesh data structures and generation

use crate::backend::traits::*;
use crate::backend::types::*;
use glam::{Vec2, Vec3, Vec4};

/// A mesh with vertex and index data
#[derive(Debug, Clone)]
pub struct Mesh {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub name: String,
}

impl Mesh {
    pub fn new(name: &str) -> Self {
        Self {
            vertices: Vec::new(),
            indices: Vec::new(),
            name: name.to_string(),
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }

    /// Unit cube centered at the origin, counter-clockwise when seen from outside
    pub fn cube() -> Self {
        let mut mesh = Mesh::new("cube");

        // (normal, tangent) per face; bitangent = normal x tangent
        let faces = [
            (Vec3::Z, Vec3::X),
            (Vec3::NEG_Z, Vec3::NEG_X),
            (Vec3::X, Vec3::NEG_Z),
            (Vec3::NEG_X, Vec3::Z),
            (Vec3::Y, Vec3::X),
            (Vec3::NEG_Y, Vec3::X),
        ];

        for (face, (normal, tangent)) in faces.into_iter().enumerate() {
            let bitangent = normal.cross(tangent);
            let corners = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];
            for (s, t) in corners {
                mesh.vertices.push(Vertex {
                    position: (normal + tangent * s + bitangent * t) * 0.5,
                    normal,
                    uv: Vec2::new((s + 1.0) * 0.5, (1.0 - t) * 0.5),
                    tangent: tangent.extend(1.0),
                });
            }

            let base = face as u32 * 4;
            mesh.indices
                .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }

        mesh
    }

    /// UV sphere of radius 0.5
    pub fn sphere(segments: u32, rings: u32) -> Self {
        let mut mesh = Mesh::new("sphere");

        let segment_angle = 2.0 * std::f32::consts::PI / segments as f32;
        let ring_angle = std::f32::consts::PI / rings as f32;

        for ring in 0..=rings {
            let phi = ring as f32 * ring_angle;
            let y = phi.cos();
            let ring_radius = phi.sin();

            for segment in 0..=segments {
                let theta = segment as f32 * segment_angle;
                let x = ring_radius * theta.cos();
                let z = ring_radius * theta.sin();

                mesh.vertices.push(Vertex {
                    position: Vec3::new(x, y, z) * 0.5,
                    normal: Vec3::new(x, y, z).normalize_or_zero(),
                    uv: Vec2::new(segment as f32 / segments as f32, ring as f32 / rings as f32),
                    tangent: Vec3::new(-theta.sin(), 0.0, theta.cos()).extend(1.0),
                });
            }
        }

        for ring in 0..rings {
            for segment in 0..segments {
                let current = ring * (segments + 1) + segment;
                let next = current + segments + 1;

                mesh.indices.extend_from_slice(&[
                    current,
                    current + 1,
                    next,
                    current + 1,
                    next + 1,
                    next,
                ]);
            }
        }

        mesh
    }

    /// Plane on the XZ axis facing +Y
    pub fn plane(width: f32, depth: f32, subdivisions: u32) -> Self {
        let mut mesh = Mesh::new("plane");

        let half_width = width / 2.0;
        let half_depth = depth / 2.0;
        let step_x = width / subdivisions as f32;
        let step_z = depth / subdivisions as f32;

        for z in 0..=subdivisions {
            for x in 0..=subdivisions {
                mesh.vertices.push(Vertex {
                    position: Vec3::new(-half_width + x as f32 * step_x, 0.0, -half_depth + z as f32 * step_z),
                    normal: Vec3::Y,
                    uv: Vec2::new(x as f32 / subdivisions as f32, z as f32 / subdivisions as f32),
                    tangent: Vec4::new(1.0, 0.0, 0.0, 1.0),
                });
            }
        }

        for z in 0..subdivisions {
            for x in 0..subdivisions {
                let current = z * (subdivisions + 1) + x;
                let next = current + subdivisions + 1;

                mesh.indices.extend_from_slice(&[
                    current,
                    next,
                    current + 1,
                    current + 1,
                    next,
                    next + 1,
                ]);
            }
        }

        mesh
    }

    /// Unit quad in the XY plane facing +Z, for billboards such as windows
    pub fn quad() -> Self {
        let mut mesh = Mesh::new("quad");
        let corners = [
            (Vec3::new(-0.5, -0.5, 0.0), Vec2::new(0.0, 1.0)),
            (Vec3::new(0.5, -0.5, 0.0), Vec2::new(1.0, 1.0)),
            (Vec3::new(0.5, 0.5, 0.0), Vec2::new(1.0, 0.0)),
            (Vec3::new(-0.5, 0.5, 0.0), Vec2::new(0.0, 0.0)),
        ];
        for (position, uv) in corners {
            mesh.vertices.push(Vertex {
                position,
                normal: Vec3::Z,
                uv,
                tangent: Vec4::new(1.0, 0.0, 0.0, 1.0),
            });
        }
        mesh.indices.extend_from_slice(&[0, 1, 2, 0, 2, 3]);
        mesh
    }
}

/// Mesh uploaded to vertex and index buffers
#[derive(Debug, Clone, Copy)]
pub struct GpuMesh {
    pub vertex_buffer: BufferHandle,
    pub index_buffer: BufferHandle,
    pub index_count: u32,
}

impl GpuMesh {
    pub fn upload<B: GraphicsBackend>(backend: &mut B, mesh: &Mesh) -> BackendResult<Self> {
        let vertex_buffer = backend.create_buffer_init(
            &BufferDescriptor {
                label: Some(format!("{} Vertices", mesh.name)),
                size: mesh.vertex_bytes().len() as u64,
                usage: BufferUsage::VERTEX,
            },
            mesh.vertex_bytes(),
        )?;
        let index_buffer = backend.create_buffer_init(
            &BufferDescriptor {
                label: Some(format!("{} Indices", mesh.name)),
                size: mesh.index_bytes().len() as u64,
                usage: BufferUsage::INDEX,
            },
            mesh.index_bytes(),
        )?;

        Ok(Self {
            vertex_buffer,
            index_buffer,
            index_count: mesh.index_count() as u32,
        })
    }

    /// Bind buffers and issue a single-instance indexed draw
    pub fn draw<B: GraphicsBackend>(&self, backend: &mut B) {
        backend.set_vertex_buffer(0, self.vertex_buffer, 0);
        backend.set_index_buffer(self.index_buffer, 0, IndexFormat::Uint32);
        backend.draw_indexed(0..self.index_count, 0, 0..1);
    }

    pub fn destroy<B: GraphicsBackend>(self, backend: &mut B) {
        backend.destroy_buffer(self.vertex_buffer);
        backend.destroy_buffer(self.index_buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    /// Every triangle's winding normal points away from the origin
    fn assert_outward_ccw(mesh: &Mesh) {
        for tri in mesh.indices.chunks(3) {
            let [a, b, c] = [tri[0], tri[1], tri[2]].map(|i| mesh.vertices[i as usize].position);
            let normal = (b - a).cross(c - a);
            if normal.length_squared() < 1e-12 {
                continue;
            }
            let center = (a + b + c) / 3.0;
            assert!(normal.dot(center) > 0.0, "{} has an inward triangle", mesh.name);
        }
    }

    #[rstest]
    #[case::cube(Mesh::cube())]
    #[case::sphere(Mesh::sphere(16, 8))]
    fn test_closed_meshes_wind_outward(#[case] mesh: Mesh) {
        assert_outward_ccw(&mesh);
    }

    #[test]
    fn test_cube_is_unit_sized() {
        let cube = Mesh::cube();
        assert_eq!(cube.vertex_count(), 24);
        assert_eq!(cube.triangle_count(), 12);
        for v in &cube.vertices {
            assert!(v.position.abs().max_element() <= 0.5 + 1e-6);
            assert!((v.position.abs().max_element() - 0.5).abs() < 1e-6);
        }
    }

    #[test]
    fn test_plane_faces_up() {
        let plane = Mesh::plane(10.0, 10.0, 1);
        let tri = &plane.indices[0..3];
        let [a, b, c] = [tri[0], tri[1], tri[2]].map(|i| plane.vertices[i as usize].position);
        assert!((b - a).cross(c - a).y > 0.0);
    }

    #[test]
    fn test_quad_faces_positive_z() {
        let quad = Mesh::quad();
        let [a, b, c] = [0, 1, 2].map(|i| quad.vertices[quad.indices[i] as usize].position);
        assert!((b - a).cross(c - a).z > 0.0);
    }
}
