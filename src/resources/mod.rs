//! Resource management
//!
//! Meshes, decoded textures, materials and the `.wat` packed material format.

mod gpu_cache;
mod material;
mod mesh;
mod texture;
pub mod wat;

pub use gpu_cache::GpuCache;
pub use material::*;
pub use mesh::*;
pub use texture::*;
pub use wat::{pack_maps, MaterialMaps, WatError, WatFile};
