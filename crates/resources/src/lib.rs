//! CPU-side asset loading.
//!
//! - [`MeshData`]: Wavefront OBJ meshes expanded into an unindexed
//!   [`lumen_rhi::vertex::Vertex`] list, plus the built-in triangle
//! - [`ImageData`]: images decoded to tightly packed RGBA8
//!
//! Nothing here touches the GPU; the renderer uploads the results.

mod error;
pub mod image_data;
pub mod mesh;

pub use error::{ResourceError, ResourceResult};
pub use image_data::ImageData;
pub use mesh::MeshData;
