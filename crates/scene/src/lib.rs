//! Scene data for the engine.
//!
//! This crate provides:
//! - The authoritative per-frame [`Camera`]
//! - [`SceneParameters`] for the scene uniform buffer
//! - The object [`Registry`] of meshes, materials, textures and renderables
//! - [`Transform`] for building model matrices

pub mod camera;
pub mod environment;
mod error;
pub mod registry;
pub mod transform;

pub use camera::Camera;
pub use environment::SceneParameters;
pub use error::{SceneError, SceneResult};
pub use registry::{
    Material, MaterialId, Mesh, MeshId, Registry, RenderObject, Texture, TextureId,
};
pub use transform::Transform;
