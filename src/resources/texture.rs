//! Texture loading and management

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::error::RendererError;
use glam::Vec3;
use half::f16;
use image::{DynamicImage, GenericImageView};
use std::path::Path;

/// Loaded 8-bit texture data
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub data: Vec<u8>,
    pub name: String,
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown")
        .to_string()
}

impl TextureData {
    /// Load texture from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, image::ImageError> {
        let path = path.as_ref();
        let img = image::open(path)?;
        Ok(Self::from_image(img, &file_name(path)))
    }

    /// Load texture from bytes
    pub fn from_bytes(bytes: &[u8], name: &str) -> Result<Self, image::ImageError> {
        let img = image::load_from_memory(bytes)?;
        Ok(Self::from_image(img, name))
    }

    /// Load an optional texture slot. Decode failures are logged with the
    /// path and reason and yield `None`.
    pub fn load_slot<P: AsRef<Path>>(path: P) -> Option<Self> {
        let path = path.as_ref();
        match Self::from_file(path) {
            Ok(data) => {
                log::debug!("Loaded texture {} ({}x{})", path.display(), data.width, data.height);
                Some(data)
            }
            Err(err) => {
                log::error!("Texture failed to load at path: {} ({})", path.display(), err);
                None
            }
        }
    }

    fn from_image(img: DynamicImage, name: &str) -> Self {
        let (width, height) = img.dimensions();
        let data = img.to_rgba8().into_raw();

        Self {
            width,
            height,
            format: TextureFormat::Rgba8UnormSrgb,
            data,
            name: name.to_string(),
        }
    }

    /// Reinterpret the texels as linear data (normal, roughness, metallic, AO)
    pub fn linear(mut self) -> Self {
        self.format = TextureFormat::Rgba8Unorm;
        self
    }

    /// Create a solid color texture
    pub fn solid_color(color: [u8; 4], name: &str) -> Self {
        Self {
            width: 1,
            height: 1,
            format: TextureFormat::Rgba8UnormSrgb,
            data: color.to_vec(),
            name: name.to_string(),
        }
    }

    /// Stand-in for a slot whose file is missing or failed to decode
    pub fn zero(name: &str) -> Self {
        Self::solid_color([0, 0, 0, 0], name)
    }
}

/// Decoded equirectangular HDR panorama, RGBA f32 rows top to bottom
#[derive(Debug, Clone)]
pub struct HdrImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<f32>,
    pub name: String,
}

impl HdrImage {
    /// Decode a Radiance `.hdr` (or any float-capable format). Failure is fatal
    /// for the caller since no lighting environment can be built without it.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, RendererError> {
        let path = path.as_ref();
        let img = image::open(path).map_err(|err| RendererError::EnvironmentLoad {
            path: path.display().to_string(),
            reason: err.to_string(),
        })?;

        let (width, height) = img.dimensions();
        let pixels = img.into_rgba32f().into_raw();
        log::info!("Loaded HDR panorama {} ({}x{})", path.display(), width, height);

        Ok(Self {
            width,
            height,
            pixels,
            name: file_name(path),
        })
    }

    /// Panorama of constant radiance
    pub fn uniform(width: u32, height: u32, radiance: Vec3) -> Self {
        let pixels = (0..width * height)
            .flat_map(|_| [radiance.x, radiance.y, radiance.z, 1.0])
            .collect();
        Self {
            width,
            height,
            pixels,
            name: "uniform".to_string(),
        }
    }

    /// Build a panorama by evaluating `radiance` at every texel's direction
    pub fn from_fn(width: u32, height: u32, radiance: impl Fn(Vec3) -> Vec3) -> Self {
        let mut pixels = Vec::with_capacity((width * height * 4) as usize);
        for y in 0..height {
            for x in 0..width {
                let u = (x as f32 + 0.5) / width as f32;
                let v = 1.0 - (y as f32 + 0.5) / height as f32;
                let phi = (u - 0.5) * std::f32::consts::TAU;
                let theta = (v - 0.5) * std::f32::consts::PI;
                let dir = Vec3::new(theta.cos() * phi.cos(), theta.sin(), theta.cos() * phi.sin());
                let c = radiance(dir);
                pixels.extend_from_slice(&[c.x, c.y, c.z, 1.0]);
            }
        }
        Self {
            width,
            height,
            pixels,
            name: "procedural".to_string(),
        }
    }

    pub fn texel(&self, x: u32, y: u32) -> Vec3 {
        let idx = ((y * self.width + x) * 4) as usize;
        Vec3::new(self.pixels[idx], self.pixels[idx + 1], self.pixels[idx + 2])
    }

    /// Nearest texel along `dir` using the spherical-to-UV mapping of the
    /// equirect capture shader
    pub fn sample_direction(&self, dir: Vec3) -> Vec3 {
        let dir = dir.normalize();
        let inv_atan = glam::vec2(0.5 * std::f32::consts::FRAC_1_PI, std::f32::consts::FRAC_1_PI);
        let uv = glam::vec2(dir.z.atan2(dir.x), dir.y.clamp(-1.0, 1.0).asin()) * inv_atan + 0.5;

        let x = ((uv.x * self.width as f32) as u32).min(self.width - 1);
        let y = (((1.0 - uv.y) * self.height as f32) as u32).min(self.height - 1);
        self.texel(x, y)
    }

    /// Texels as half floats, ready for an Rgba16Float upload
    pub fn to_f16_bytes(&self) -> Vec<u8> {
        let halves: Vec<f16> = self.pixels.iter().map(|&v| f16::from_f32(v)).collect();
        bytemuck::cast_slice(&halves).to_vec()
    }
}

/// GPU texture with its default view
#[derive(Debug, Clone, Copy)]
pub struct GpuTexture {
    pub handle: TextureHandle,
    pub view: TextureViewHandle,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
}

impl GpuTexture {
    /// Create and upload texture to GPU
    pub fn create<B: GraphicsBackend>(backend: &mut B, data: &TextureData) -> BackendResult<Self> {
        Self::upload(backend, &data.name, data.width, data.height, data.format, &data.data)
    }

    /// Upload a panorama as a half-float 2D texture
    pub fn from_hdr<B: GraphicsBackend>(backend: &mut B, image: &HdrImage) -> BackendResult<Self> {
        Self::upload(
            backend,
            &image.name,
            image.width,
            image.height,
            TextureFormat::Rgba16Float,
            &image.to_f16_bytes(),
        )
    }

    fn upload<B: GraphicsBackend>(
        backend: &mut B,
        name: &str,
        width: u32,
        height: u32,
        format: TextureFormat,
        bytes: &[u8],
    ) -> BackendResult<Self> {
        let handle = backend.create_texture(&TextureDescriptor {
            label: Some(name.to_string()),
            width,
            height,
            format,
            usage: TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
            ..Default::default()
        })?;
        let view = backend.create_texture_view(handle, &TextureViewDescriptor::default())?;
        backend.write_texture(handle, bytes, width, height);

        Ok(Self {
            handle,
            view,
            width,
            height,
            format,
        })
    }

    pub fn destroy<B: GraphicsBackend>(self, backend: &mut B) {
        backend.destroy_texture_view(self.view);
        backend.destroy_texture(self.handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_missing_slot_is_none() {
        assert!(TextureData::load_slot("does/not/exist.png").is_none());
    }

    #[test]
    fn test_missing_panorama_is_environment_error() {
        let err = HdrImage::from_file("does/not/exist.hdr").unwrap_err();
        assert!(matches!(err, RendererError::EnvironmentLoad { .. }));
    }

    #[test]
    fn test_half_float_upload_size() {
        let image = HdrImage::uniform(8, 4, Vec3::splat(0.5));
        let bytes = image.to_f16_bytes();
        assert_eq!(bytes.len(), 8 * 4 * 4 * 2);
        let halves: &[f16] = bytemuck::cast_slice(&bytes);
        assert_eq!(halves[0].to_f32(), 0.5);
    }

    #[rstest]
    #[case::right(Vec3::X)]
    #[case::up(Vec3::new(0.1, 0.9, 0.2))]
    #[case::back(Vec3::NEG_Z)]
    #[case::down(Vec3::new(-0.3, -0.8, 0.4))]
    fn test_direction_round_trips_through_panorama(#[case] dir: Vec3) {
        // A panorama whose texels store their own direction samples back
        // approximately that direction
        let image = HdrImage::from_fn(256, 128, |d| d);
        let got = image.sample_direction(dir);
        assert!(got.normalize().dot(dir.normalize()) > 0.99, "{} vs {}", got, dir);
    }
}
