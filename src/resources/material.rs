//! PBR materials and their texture sets

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::resources::{GpuTexture, TextureData};
use crate::scene::Transform;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, UVec4, Vec3, Vec4};
use std::path::{Path, PathBuf};

/// Texture slots of a material, in binding order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureSlot {
    Diffuse,
    Normal,
    Roughness,
    Metallic,
    AmbientOcclusion,
    Emissive,
}

impl TextureSlot {
    pub const COUNT: usize = 6;

    pub const ALL: [TextureSlot; Self::COUNT] = [
        TextureSlot::Diffuse,
        TextureSlot::Normal,
        TextureSlot::Roughness,
        TextureSlot::Metallic,
        TextureSlot::AmbientOcclusion,
        TextureSlot::Emissive,
    ];

    /// Binding index inside the material bind group
    pub fn binding(self) -> u32 {
        self as u32
    }

    /// Bit set in the object uniform's texture mask when the slot is bound
    pub fn mask_bit(self) -> u32 {
        1 << self as u32
    }

    /// Whether the texels hold sRGB-encoded color rather than linear data
    pub fn is_color(self) -> bool {
        matches!(self, TextureSlot::Diffuse | TextureSlot::Emissive)
    }

    fn label(self) -> &'static str {
        match self {
            TextureSlot::Diffuse => "diffuse",
            TextureSlot::Normal => "normal",
            TextureSlot::Roughness => "roughness",
            TextureSlot::Metallic => "metallic",
            TextureSlot::AmbientOcclusion => "ao",
            TextureSlot::Emissive => "emissive",
        }
    }
}

/// Binding of the material sampler, after the six textures
pub const MATERIAL_SAMPLER_BINDING: u32 = TextureSlot::COUNT as u32;

/// How the scene shader colors an object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadingMode {
    /// Cook-Torrance direct lighting plus image-based ambient
    Lit = 0,
    /// Base color (times the diffuse texture, if bound) with no lighting
    Unlit = 1,
}

/// PBR material properties
#[derive(Debug, Clone)]
pub struct Material {
    pub name: String,
    pub base_color: Vec4,
    pub metallic: f32,
    pub roughness: f32,
    pub ao: f32,
    pub emissive: Vec3,
    pub shading: ShadingMode,

    /// Optional texture per slot, relative to the asset root
    pub textures: [Option<PathBuf>; TextureSlot::COUNT],
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            base_color: Vec4::ONE,
            metallic: 0.0,
            roughness: 0.5,
            ao: 1.0,
            emissive: Vec3::ZERO,
            shading: ShadingMode::Lit,
            textures: Default::default(),
        }
    }
}

impl Material {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_base_color(mut self, color: Vec4) -> Self {
        self.base_color = color;
        self
    }

    pub fn with_metallic(mut self, metallic: f32) -> Self {
        self.metallic = metallic;
        self
    }

    pub fn with_roughness(mut self, roughness: f32) -> Self {
        self.roughness = roughness;
        self
    }

    pub fn with_emissive(mut self, emissive: Vec3) -> Self {
        self.emissive = emissive;
        self
    }

    pub fn with_shading(mut self, shading: ShadingMode) -> Self {
        self.shading = shading;
        self
    }

    pub fn with_texture(mut self, slot: TextureSlot, path: impl Into<PathBuf>) -> Self {
        self.textures[slot as usize] = Some(path.into());
        self
    }

    pub fn texture(&self, slot: TextureSlot) -> Option<&Path> {
        self.textures[slot as usize].as_deref()
    }

    pub fn plastic(color: Vec3, roughness: f32) -> Self {
        Self::new("plastic")
            .with_base_color(color.extend(1.0))
            .with_roughness(roughness)
    }

    pub fn metal(color: Vec3, roughness: f32) -> Self {
        Self::new("metal")
            .with_base_color(color.extend(1.0))
            .with_metallic(1.0)
            .with_roughness(roughness)
    }

    pub fn gold() -> Self {
        Self::metal(Vec3::new(1.0, 0.766, 0.336), 0.3)
    }

    /// Flat emitter, used for light markers and their outlines
    pub fn unlit(color: Vec3) -> Self {
        Self::new("unlit")
            .with_base_color(color.extend(1.0))
            .with_shading(ShadingMode::Unlit)
    }

    /// Alpha-blended textured quad
    pub fn window(texture: impl Into<PathBuf>) -> Self {
        Self::new("window")
            .with_shading(ShadingMode::Unlit)
            .with_texture(TextureSlot::Diffuse, texture)
    }
}

/// Per-object block bound at group 1 of the scene shaders
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct ObjectUniform {
    pub model: Mat4,
    pub normal_matrix: Mat4,
    pub base_color: Vec4,
    pub emissive: Vec4,
    /// x: metallic, y: roughness, z: ao, w: unused
    pub params: Vec4,
    /// x: bound texture mask, y: [`ShadingMode`]
    pub flags: UVec4,
}

impl ObjectUniform {
    pub fn new(transform: &Transform, material: &Material, texture_mask: u32) -> Self {
        Self {
            model: transform.matrix(),
            normal_matrix: transform.normal_matrix(),
            base_color: material.base_color,
            emissive: material.emissive.extend(0.0),
            params: Vec4::new(material.metallic, material.roughness, material.ao, 0.0),
            flags: UVec4::new(texture_mask, material.shading as u32, 0, 0),
        }
    }

    /// Same object drawn in a flat color, as for stencil outlines
    pub fn with_color(mut self, color: Vec3) -> Self {
        self.base_color = color.extend(1.0);
        self.flags.y = ShadingMode::Unlit as u32;
        self
    }
}

/// A material's textures uploaded and bound
pub struct GpuMaterial {
    pub name: String,
    pub textures: [GpuTexture; TextureSlot::COUNT],
    pub bind_group: BindGroupHandle,
    /// Slots with a configured texture, see [`TextureSlot::mask_bit`]
    pub texture_mask: u32,
}

impl GpuMaterial {
    /// Layout of the material bind group: six 2D textures then a sampler
    pub fn layout_entries() -> Vec<BindGroupLayoutEntry> {
        TextureSlot::ALL
            .iter()
            .map(|slot| BindGroupLayoutEntry {
                binding: slot.binding(),
                visibility: ShaderStageFlags::FRAGMENT,
                ty: BindingType::float_texture(TextureViewDimension::D2),
            })
            .chain(std::iter::once(BindGroupLayoutEntry {
                binding: MATERIAL_SAMPLER_BINDING,
                visibility: ShaderStageFlags::FRAGMENT,
                ty: BindingType::Sampler(SamplerBindingType::Filtering),
            }))
            .collect()
    }

    /// Upload every configured slot. A slot without a path gets a zero
    /// texture and stays out of the mask. A slot whose file fails to decode
    /// is logged and also reads as zero, but keeps its mask bit, so the
    /// object renders dark instead of silently using the constant.
    pub fn load<B: GraphicsBackend>(
        backend: &mut B,
        layout: BindGroupLayoutHandle,
        sampler: SamplerHandle,
        material: &Material,
        asset_root: &Path,
    ) -> BackendResult<Self> {
        let mut texture_mask = 0;
        let mut textures = Vec::with_capacity(TextureSlot::COUNT);

        for slot in TextureSlot::ALL {
            let zero_name = format!("{} {} (none)", material.name, slot.label());
            let data = match material.texture(slot) {
                Some(path) => {
                    texture_mask |= slot.mask_bit();
                    match TextureData::load_slot(asset_root.join(path)) {
                        Some(data) if slot.is_color() => data,
                        Some(data) => data.linear(),
                        None => TextureData::zero(&zero_name),
                    }
                }
                None => TextureData::zero(&zero_name),
            };
            textures.push(GpuTexture::create(backend, &data)?);
        }

        let entries: Vec<(u32, BindGroupEntry)> = TextureSlot::ALL
            .iter()
            .zip(&textures)
            .map(|(slot, texture)| (slot.binding(), BindGroupEntry::Texture(texture.view)))
            .chain(std::iter::once((MATERIAL_SAMPLER_BINDING, BindGroupEntry::Sampler(sampler))))
            .collect();
        let bind_group = backend.create_bind_group(layout, &entries)?;

        let textures: [GpuTexture; TextureSlot::COUNT] = textures
            .try_into()
            .map_err(|_| BackendError::TextureCreationFailed(format!("{}: incomplete texture set", material.name)))?;

        Ok(Self {
            name: material.name.clone(),
            textures,
            bind_group,
            texture_mask,
        })
    }

    pub fn destroy<B: GraphicsBackend>(self, backend: &mut B) {
        backend.destroy_bind_group(self.bind_group);
        for texture in self.textures {
            texture.destroy(backend);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordingBackend;

    #[test]
    fn test_uniform_layout_is_192_bytes() {
        assert_eq!(std::mem::size_of::<ObjectUniform>(), 192);
    }

    #[test]
    fn test_bindings_are_fixed() {
        let bindings: Vec<u32> = GpuMaterial::layout_entries().iter().map(|e| e.binding).collect();
        assert_eq!(bindings, vec![0, 1, 2, 3, 4, 5, 6]);
        assert_eq!(TextureSlot::Emissive.binding(), 5);
    }

    #[test]
    fn test_missing_texture_keeps_mask_bit() {
        let mut backend = RecordingBackend::default();
        let layout = backend.create_bind_group_layout(&GpuMaterial::layout_entries()).unwrap();
        let sampler = backend.create_sampler(&SamplerDescriptor::repeat("Material")).unwrap();
        let material = Material::plastic(Vec3::ONE, 0.5).with_texture(TextureSlot::Normal, "missing/normal.png");

        let gpu = GpuMaterial::load(&mut backend, layout, sampler, &material, Path::new(".")).unwrap();
        assert_eq!(gpu.texture_mask, TextureSlot::Normal.mask_bit());
        assert_eq!(gpu.textures[1].width, 1);

        let entries = backend.bind_group_entries(gpu.bind_group).unwrap();
        assert_eq!(entries.len(), 7);
        assert_eq!(entries[6], (6, BindGroupEntry::Sampler(sampler)));
    }

    #[test]
    fn test_outline_color_overrides_shading() {
        let material = Material::gold();
        let uniform = ObjectUniform::new(&Transform::default(), &material, 0).with_color(Vec3::new(0.5, 0.0, 0.0));
        assert_eq!(uniform.flags.y, ShadingMode::Unlit as u32);
        assert_eq!(uniform.base_color, Vec4::new(0.5, 0.0, 0.0, 1.0));
    }
}
