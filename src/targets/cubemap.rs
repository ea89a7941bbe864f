//! Cube textures addressed by face and mip

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::error::RendererError;
use glam::Vec3;

/// Cube face in the fixed layer order +X, -X, +Y, -Y, +Z, -Z
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CubeFace {
    PositiveX,
    NegativeX,
    PositiveY,
    NegativeY,
    PositiveZ,
    NegativeZ,
}

impl CubeFace {
    /// Every face in array-layer order
    pub const ALL: [CubeFace; 6] = [
        CubeFace::PositiveX,
        CubeFace::NegativeX,
        CubeFace::PositiveY,
        CubeFace::NegativeY,
        CubeFace::PositiveZ,
        CubeFace::NegativeZ,
    ];

    pub fn index(self) -> u32 {
        self as u32
    }

    /// Look direction from the cube center
    pub fn direction(self) -> Vec3 {
        match self {
            CubeFace::PositiveX => Vec3::X,
            CubeFace::NegativeX => Vec3::NEG_X,
            CubeFace::PositiveY => Vec3::Y,
            CubeFace::NegativeY => Vec3::NEG_Y,
            CubeFace::PositiveZ => Vec3::Z,
            CubeFace::NegativeZ => Vec3::NEG_Z,
        }
    }

    /// Up vector of the face camera. ±Y look along Z so the up vector flips
    /// there instead of degenerating.
    pub fn up(self) -> Vec3 {
        match self {
            CubeFace::PositiveY => Vec3::Z,
            CubeFace::NegativeY => Vec3::NEG_Z,
            _ => Vec3::NEG_Y,
        }
    }

    /// Direction through texel (x, y) of a `size`×`size` face
    pub fn texel_direction(self, x: u32, y: u32, size: u32) -> Vec3 {
        let u = (x as f32 + 0.5) / size as f32 * 2.0 - 1.0;
        let v = (y as f32 + 0.5) / size as f32 * 2.0 - 1.0;

        let dir = match self {
            CubeFace::PositiveX => Vec3::new(1.0, -v, -u),
            CubeFace::NegativeX => Vec3::new(-1.0, -v, u),
            CubeFace::PositiveY => Vec3::new(u, 1.0, v),
            CubeFace::NegativeY => Vec3::new(u, -1.0, -v),
            CubeFace::PositiveZ => Vec3::new(u, -v, 1.0),
            CubeFace::NegativeZ => Vec3::new(-u, -v, -1.0),
        };

        dir.normalize()
    }
}

/// Six-layer texture with optional mips and cached per-face views
#[derive(Debug)]
pub struct CubemapTexture {
    label: String,
    texture: TextureHandle,
    size: u32,
    mip_levels: u32,
    format: TextureFormat,
    cube_view: TextureViewHandle,
    /// Indexed by `mip * 6 + face`
    face_views: Vec<TextureViewHandle>,
    /// One six-layer array view per mip, for multiview rendering
    layered_views: Vec<TextureViewHandle>,
}

impl CubemapTexture {
    pub fn create<B: GraphicsBackend>(
        backend: &mut B,
        label: &str,
        size: u32,
        mip_levels: u32,
        format: TextureFormat,
    ) -> Result<Self, RendererError> {
        let texture = backend.create_texture(&TextureDescriptor::cube(
            label,
            size,
            mip_levels,
            format,
            TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
        ))?;

        let cube_view = backend.create_texture_view(texture, &TextureViewDescriptor::cube())?;

        let mut face_views = Vec::with_capacity((mip_levels * 6) as usize);
        let mut layered_views = Vec::with_capacity(mip_levels as usize);
        for mip in 0..mip_levels {
            for face in CubeFace::ALL {
                face_views.push(
                    backend.create_texture_view(texture, &TextureViewDescriptor::layer(face.index(), mip))?,
                );
            }
            layered_views.push(backend.create_texture_view(texture, &TextureViewDescriptor::layered(mip))?);
        }

        Ok(Self {
            label: label.to_string(),
            texture,
            size,
            mip_levels,
            format,
            cube_view,
            face_views,
            layered_views,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn texture(&self) -> TextureHandle {
        self.texture
    }

    pub fn format(&self) -> TextureFormat {
        self.format
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }

    /// Edge length of one face at `mip`
    pub fn mip_size(&self, mip: u32) -> u32 {
        (self.size >> mip).max(1)
    }

    /// Sampled view covering every face and mip
    pub fn cube_view(&self) -> TextureViewHandle {
        self.cube_view
    }

    /// Attachment view of one face at one mip
    pub fn face_view(&self, face: CubeFace, mip: u32) -> Option<TextureViewHandle> {
        if mip >= self.mip_levels {
            return None;
        }
        self.face_views.get((mip * 6 + face.index()) as usize).copied()
    }

    /// Array view of all six faces at one mip
    pub fn layered_view(&self, mip: u32) -> Option<TextureViewHandle> {
        self.layered_views.get(mip as usize).copied()
    }

    pub fn destroy<B: GraphicsBackend>(self, backend: &mut B) {
        for view in self
            .face_views
            .into_iter()
            .chain(self.layered_views)
            .chain(std::iter::once(self.cube_view))
        {
            backend.destroy_texture_view(view);
        }
        backend.destroy_texture(self.texture);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordingBackend;
    use rstest::rstest;

    #[test]
    fn test_faces_are_in_layer_order() {
        let indices: Vec<u32> = CubeFace::ALL.iter().map(|f| f.index()).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4, 5]);
    }

    #[rstest]
    #[case::positive_x(CubeFace::PositiveX)]
    #[case::negative_x(CubeFace::NegativeX)]
    #[case::positive_y(CubeFace::PositiveY)]
    #[case::negative_y(CubeFace::NegativeY)]
    #[case::positive_z(CubeFace::PositiveZ)]
    #[case::negative_z(CubeFace::NegativeZ)]
    fn test_face_center_points_along_direction(#[case] face: CubeFace) {
        // Even size so the center falls between texels; average the middle four
        let size = 2;
        let mut sum = Vec3::ZERO;
        for y in 0..size {
            for x in 0..size {
                sum += face.texel_direction(x, y, size);
            }
        }
        assert!(sum.normalize().abs_diff_eq(face.direction(), 1e-5));
    }

    #[rstest]
    #[case::positive_x(CubeFace::PositiveX)]
    #[case::positive_y(CubeFace::PositiveY)]
    #[case::negative_z(CubeFace::NegativeZ)]
    fn test_up_is_orthogonal_to_direction(#[case] face: CubeFace) {
        assert_eq!(face.up().dot(face.direction()), 0.0);
    }

    #[test]
    fn test_face_views_cover_each_layer_and_mip() {
        let mut backend = RecordingBackend::default();
        let cube =
            CubemapTexture::create(&mut backend, "Prefilter", 128, 5, TextureFormat::Rgba16Float).unwrap();

        assert_eq!(cube.mip_size(0), 128);
        assert_eq!(cube.mip_size(4), 8);

        for mip in 0..5 {
            for face in CubeFace::ALL {
                let view = cube.face_view(face, mip).unwrap();
                let (_, desc) = backend.view(view).unwrap();
                assert_eq!(desc.base_array_layer, face.index());
                assert_eq!(desc.base_mip_level, mip);
                assert_eq!(desc.array_layer_count, Some(1));
            }
        }
        assert!(cube.face_view(CubeFace::PositiveX, 5).is_none());

        let (_, cube_desc) = backend.view(cube.cube_view()).unwrap();
        assert_eq!(cube_desc.dimension, TextureViewDimension::Cube);
        let texture = backend.texture(cube.texture()).unwrap();
        assert_eq!(texture.array_layers, 6);
        assert_eq!(texture.mip_levels, 5);
    }
}
