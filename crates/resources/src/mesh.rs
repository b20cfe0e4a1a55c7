//! Mesh loading from Wavefront OBJ files.
//!
//! Meshes are kept unindexed: every triangle corner becomes its own
//! [`Vertex`], and the renderer draws them with a plain vertex count.

use std::path::Path;

use glam::{Vec2, Vec3};
use lumen_rhi::vertex::Vertex;
use tracing::{debug, info};

use crate::error::{ResourceError, ResourceResult};

/// CPU-side vertex list for one mesh.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
}

impl MeshData {
    /// The built-in green triangle.
    pub fn triangle() -> Self {
        let normal = Vec3::Z;
        let green = Vec3::new(0.0, 1.0, 0.0);
        Self {
            vertices: vec![
                Vertex::new(Vec3::new(1.0, 1.0, 0.0), normal, green, Vec2::new(1.0, 1.0)),
                Vertex::new(Vec3::new(-1.0, 1.0, 0.0), normal, green, Vec2::new(0.0, 1.0)),
                Vertex::new(Vec3::new(0.0, -1.0, 0.0), normal, green, Vec2::new(0.5, 0.0)),
            ],
        }
    }

    /// Loads every model in an OBJ file into one unindexed vertex list.
    ///
    /// Faces are triangulated. Each vertex's color is set to its normal, and
    /// the texture `v` coordinate is flipped (`1 - v`) to match Vulkan's
    /// top-left image origin. Missing normals or texture coordinates read as
    /// zero.
    ///
    /// # Errors
    ///
    /// - [`ResourceError::FileNotFound`] if `path` does not exist
    /// - [`ResourceError::ObjLoad`] if tobj cannot parse the file
    /// - [`ResourceError::EmptyMesh`] if the file has no triangles
    pub fn load_obj(path: &Path) -> ResourceResult<Self> {
        if !path.exists() {
            return Err(ResourceError::FileNotFound(path.to_path_buf()));
        }

        let load_options = tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        };

        let (models, _materials) =
            tobj::load_obj(path, &load_options).map_err(|e| ResourceError::ObjLoad {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        let mut vertices = Vec::new();
        for model in &models {
            let mesh = &model.mesh;
            vertices.reserve(mesh.indices.len());
            for &index in &mesh.indices {
                vertices.push(expand_vertex(mesh, index as usize));
            }
            debug!(
                "OBJ model '{}': {} triangles",
                model.name,
                mesh.indices.len() / 3
            );
        }

        if vertices.is_empty() {
            return Err(ResourceError::EmptyMesh(path.to_path_buf()));
        }

        info!(
            "Loaded OBJ '{}': {} models, {} vertices",
            path.display(),
            models.len(),
            vertices.len()
        );

        Ok(Self { vertices })
    }

    #[inline]
    pub fn vertex_count(&self) -> u32 {
        self.vertices.len() as u32
    }

    /// The vertex list as raw bytes, ready for upload.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }
}

fn vec3_at(data: &[f32], index: usize) -> Vec3 {
    data.get(index * 3..index * 3 + 3)
        .map_or(Vec3::ZERO, Vec3::from_slice)
}

fn expand_vertex(mesh: &tobj::Mesh, index: usize) -> Vertex {
    let position = vec3_at(&mesh.positions, index);
    let normal = vec3_at(&mesh.normals, index);
    let uv = mesh
        .texcoords
        .get(index * 2..index * 2 + 2)
        .map_or(Vec2::ZERO, |uv| Vec2::new(uv[0], 1.0 - uv[1]));

    Vertex::new(position, normal, normal, uv)
}
