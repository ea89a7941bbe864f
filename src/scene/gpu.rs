//! GPU copies of the scene's drawables and their per-object uniforms

use crate::backend::traits::*;
use crate::error::RendererError;
use crate::ibl::UniformSlots;
use crate::pipeline::PipelineContext;
use crate::resources::{GpuMaterial, GpuMesh, Material, Mesh, Model, ObjectUniform};
use crate::scene::{Scene, Transform, OUTLINE_TINT};
use glam::Vec3;
use std::path::Path;

/// Object block as declared by every scene shader
pub const OBJECT_UNIFORM_SHADER: &str = r#"
struct ObjectUniform {
    model: mat4x4<f32>,
    normal_matrix: mat4x4<f32>,
    base_color: vec4<f32>,
    emissive: vec4<f32>,
    params: vec4<f32>,
    flags: vec4<u32>,
}

@group(1) @binding(0) var<uniform> object: ObjectUniform;
"#;

/// Uploaded scene.
///
/// Uniform slots are laid out as: one per opaque object, then a marker and an
/// outline slot per light, then one per window pane in draw order.
pub struct GpuScene {
    pub models: Vec<Model>,
    pub marker: Model,
    pub window: Model,
    slots: UniformSlots,
    object_count: usize,
    light_count: usize,
}

impl GpuScene {
    pub fn upload<B: GraphicsBackend>(
        backend: &mut B,
        ctx: &PipelineContext,
        scene: &Scene,
        asset_root: &Path,
    ) -> Result<Self, RendererError> {
        let load = |backend: &mut B, material: &Material| {
            GpuMaterial::load(backend, ctx.layouts.material, ctx.samplers.material, material, asset_root)
        };

        let mut models = Vec::with_capacity(scene.objects.len());
        for object in &scene.objects {
            let mesh = GpuMesh::upload(backend, &object.mesh)?;
            let material = load(backend, &object.material)?;
            models.push(Model::new(&object.name, vec![mesh], material));
        }

        let marker = Model::new(
            "light marker",
            vec![ctx.unit_cube],
            load(backend, &Material::unlit(Vec3::ONE))?,
        );
        let window = Model::new(
            "window",
            vec![GpuMesh::upload(backend, &Mesh::quad())?],
            load(backend, &scene.window_material)?,
        );

        let object_count = scene.objects.len();
        let light_count = scene.lights.len();
        let slots = UniformSlots::new(
            backend,
            ctx.layouts.object,
            "Object Uniforms",
            object_count + light_count * 2 + scene.transparent.len(),
            std::mem::size_of::<ObjectUniform>() as u64,
        )?;

        log::info!(
            "Scene uploaded: {} objects, {} lights, {} transparent",
            object_count,
            light_count,
            scene.transparent.len()
        );

        let gpu = Self {
            models,
            marker,
            window,
            slots,
            object_count,
            light_count,
        };
        gpu.update(backend, scene);
        Ok(gpu)
    }

    /// Rewrite every object slot from the scene's current state
    pub fn update<B: GraphicsBackend>(&self, backend: &mut B, scene: &Scene) {
        for (i, (object, model)) in scene.objects.iter().zip(&self.models).enumerate() {
            let uniform = ObjectUniform::new(&object.transform, &object.material, model.material.texture_mask);
            self.slots.write(backend, i, &uniform);
        }

        for (l, light) in scene.lights.iter().take(self.light_count).enumerate() {
            let marker_material = Material::unlit(light.color);
            let marker = ObjectUniform::new(&Scene::marker_transform(light), &marker_material, 0);
            let outline = ObjectUniform::new(&Scene::outline_transform(light), &marker_material, 0)
                .with_color(light.color * OUTLINE_TINT);
            self.slots.write(backend, self.object_count + l * 2, &marker);
            self.slots.write(backend, self.object_count + l * 2 + 1, &outline);
        }

        let first_window = self.object_count + self.light_count * 2;
        for (k, position) in scene.transparent.draw_order().enumerate() {
            let transform = Transform::from_position(position);
            let uniform = ObjectUniform::new(&transform, &scene.window_material, self.window.material.texture_mask);
            self.slots.write(backend, first_window + k, &uniform);
        }
    }

    pub fn object_count(&self) -> usize {
        self.object_count
    }

    pub fn light_count(&self) -> usize {
        self.light_count
    }

    pub fn object_slot(&self, object: usize) -> Option<BindGroupHandle> {
        (object < self.object_count)
            .then(|| self.slots.bind_group(object))
            .flatten()
    }

    pub fn marker_slot(&self, light: usize) -> Option<BindGroupHandle> {
        (light < self.light_count)
            .then(|| self.slots.bind_group(self.object_count + light * 2))
            .flatten()
    }

    pub fn outline_slot(&self, light: usize) -> Option<BindGroupHandle> {
        (light < self.light_count)
            .then(|| self.slots.bind_group(self.object_count + light * 2 + 1))
            .flatten()
    }

    /// Slot of the `k`-th window pane in back-to-front order
    pub fn window_slot(&self, k: usize) -> Option<BindGroupHandle> {
        self.slots.bind_group(self.object_count + self.light_count * 2 + k)
    }

    /// Opaque objects with their uniform slots, in scene order
    pub fn opaque(&self) -> impl Iterator<Item = (BindGroupHandle, &Model)> + '_ {
        self.models
            .iter()
            .enumerate()
            .filter_map(|(i, model)| self.object_slot(i).map(|slot| (slot, model)))
    }

    /// Uniform buffer behind every slot, for inspection in tests
    pub fn uniform_buffer(&self) -> BufferHandle {
        self.slots.buffer()
    }
}
