//! Meshes, textures, materials and the models built from them

mod material;
mod mesh;
mod model;
mod texture;

pub use material::*;
pub use mesh::*;
pub use model::*;
pub use texture::*;
