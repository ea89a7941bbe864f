//! Drawable models: submeshes sharing one material

use crate::backend::traits::*;
use crate::resources::{GpuMaterial, GpuMesh};

/// One or more uploaded meshes drawn with the same material bind group
pub struct Model {
    pub name: String,
    pub submeshes: Vec<GpuMesh>,
    pub material: GpuMaterial,
}

impl Model {
    pub fn new(name: &str, submeshes: Vec<GpuMesh>, material: GpuMaterial) -> Self {
        Self {
            name: name.to_string(),
            submeshes,
            material,
        }
    }

    /// Draw every submesh, or only `submesh` when given. The material is
    /// bound at `material_group` unless the caller's pipeline has none.
    pub fn draw<B: GraphicsBackend>(
        &self,
        backend: &mut B,
        material_group: Option<u32>,
        submesh: Option<usize>,
    ) {
        if let Some(group) = material_group {
            backend.set_bind_group(group, self.material.bind_group);
        }
        match submesh {
            Some(index) => {
                if let Some(mesh) = self.submeshes.get(index) {
                    mesh.draw(backend);
                }
            }
            None => {
                for mesh in &self.submeshes {
                    mesh.draw(backend);
                }
            }
        }
    }

    pub fn destroy<B: GraphicsBackend>(self, backend: &mut B) {
        for mesh in self.submeshes {
            mesh.destroy(backend);
        }
        self.material.destroy(backend);
    }
}
