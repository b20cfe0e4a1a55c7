//! The object registry: named meshes, materials and textures, plus the
//! ordered renderable list the frame orchestrator draws.
//!
//! Names are interned once on insertion into a typed id ([`MeshId`],
//! [`MaterialId`], [`TextureId`]) that indexes a contiguous store. Lookups by
//! name or id return `None` when absent; inserting a name twice is an error,
//! so an entry is never silently replaced.
//!
//! GPU handles held here are owned by the device context's deletion queue.
//!
//! # Example
//!
//! ```
//! use lumen_scene::registry::{Material, Registry, RenderObject};
//! use lumen_rhi::vk;
//! use glam::Mat4;
//!
//! let mut registry = Registry::new();
//! let material = registry
//!     .insert_material(Material {
//!         name: "defaultmesh".into(),
//!         pipeline: vk::Pipeline::null(),
//!         layout: vk::PipelineLayout::null(),
//!         texture_set: None,
//!     })
//!     .unwrap();
//! assert_eq!(registry.material_id("defaultmesh"), Some(material));
//! assert!(registry.material_id("missing").is_none());
//! ```

use std::collections::HashMap;

use ash::vk;
use glam::Mat4;
use lumen_rhi::memory::{AllocatedBuffer, AllocatedImage};
use lumen_rhi::vertex::Vertex;
use tracing::debug;

use crate::error::{SceneError, SceneResult};

// ============================================================================
// Ids
// ============================================================================

macro_rules! registry_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u32);

        impl $name {
            /// Position in the registry's store.
            #[inline]
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

registry_id!(
    /// Interned mesh name.
    MeshId
);
registry_id!(
    /// Interned material name.
    MaterialId
);
registry_id!(
    /// Interned texture name.
    TextureId
);

// ============================================================================
// Entries
// ============================================================================

/// A vertex list and the GPU-local buffer it was uploaded to.
#[derive(Debug)]
pub struct Mesh {
    pub name: String,
    pub vertices: Vec<Vertex>,
    pub vertex_buffer: AllocatedBuffer,
}

impl Mesh {
    #[inline]
    pub fn vertex_count(&self) -> u32 {
        self.vertices.len() as u32
    }
}

/// A pipeline, its layout and the optional texture set bound at set 2.
#[derive(Debug, Clone)]
pub struct Material {
    pub name: String,
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    pub texture_set: Option<vk::DescriptorSet>,
}

/// A sampled image with its view and sampler.
#[derive(Debug)]
pub struct Texture {
    pub name: String,
    pub image: AllocatedImage,
    pub view: vk::ImageView,
    pub sampler: vk::Sampler,
}

/// One draw: a mesh, a material and a model matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderObject {
    pub mesh: MeshId,
    pub material: MaterialId,
    pub transform: Mat4,
}

trait Named {
    fn name(&self) -> &str;
}

impl Named for Mesh {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Named for Material {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Named for Texture {
    fn name(&self) -> &str {
        &self.name
    }
}

// ============================================================================
// Store
// ============================================================================

/// Name-to-index map over a contiguous vector.
#[derive(Debug)]
struct NamedStore<T> {
    kind: &'static str,
    ids: HashMap<String, u32>,
    items: Vec<T>,
}

impl<T: Named> NamedStore<T> {
    fn new(kind: &'static str) -> Self {
        Self {
            kind,
            ids: HashMap::new(),
            items: Vec::new(),
        }
    }

    fn insert(&mut self, item: T) -> SceneResult<u32> {
        if self.ids.contains_key(item.name()) {
            return Err(SceneError::Duplicate {
                kind: self.kind,
                name: item.name().to_owned(),
            });
        }
        let id = self.items.len() as u32;
        self.ids.insert(item.name().to_owned(), id);
        debug!("Registered {} '{}' as #{}", self.kind, item.name(), id);
        self.items.push(item);
        Ok(id)
    }

    fn id(&self, name: &str) -> Option<u32> {
        self.ids.get(name).copied()
    }

    fn get(&self, id: u32) -> Option<&T> {
        self.items.get(id as usize)
    }

    fn contains(&self, id: u32) -> bool {
        (id as usize) < self.items.len()
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Meshes, materials, textures and the renderable list.
#[derive(Debug)]
pub struct Registry {
    meshes: NamedStore<Mesh>,
    materials: NamedStore<Material>,
    textures: NamedStore<Texture>,
    renderables: Vec<RenderObject>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            meshes: NamedStore::new("mesh"),
            materials: NamedStore::new("material"),
            textures: NamedStore::new("texture"),
            renderables: Vec::new(),
        }
    }

    // ---- meshes ----

    /// Registers `mesh` under its name.
    ///
    /// # Errors
    ///
    /// [`SceneError::Duplicate`] if the name is taken.
    pub fn insert_mesh(&mut self, mesh: Mesh) -> SceneResult<MeshId> {
        self.meshes.insert(mesh).map(MeshId)
    }

    pub fn mesh_id(&self, name: &str) -> Option<MeshId> {
        self.meshes.id(name).map(MeshId)
    }

    pub fn mesh(&self, id: MeshId) -> Option<&Mesh> {
        self.meshes.get(id.0)
    }

    /// Looks a mesh up by name.
    pub fn mesh_by_name(&self, name: &str) -> Option<&Mesh> {
        self.mesh_id(name).and_then(|id| self.mesh(id))
    }

    // ---- materials ----

    /// Registers `material` under its name.
    ///
    /// # Errors
    ///
    /// [`SceneError::Duplicate`] if the name is taken.
    pub fn insert_material(&mut self, material: Material) -> SceneResult<MaterialId> {
        self.materials.insert(material).map(MaterialId)
    }

    pub fn material_id(&self, name: &str) -> Option<MaterialId> {
        self.materials.id(name).map(MaterialId)
    }

    pub fn material(&self, id: MaterialId) -> Option<&Material> {
        self.materials.get(id.0)
    }

    pub fn material_by_name(&self, name: &str) -> Option<&Material> {
        self.material_id(name).and_then(|id| self.material(id))
    }

    // ---- textures ----

    /// Registers `texture` under its name.
    ///
    /// # Errors
    ///
    /// [`SceneError::Duplicate`] if the name is taken.
    pub fn insert_texture(&mut self, texture: Texture) -> SceneResult<TextureId> {
        self.textures.insert(texture).map(TextureId)
    }

    pub fn texture_id(&self, name: &str) -> Option<TextureId> {
        self.textures.id(name).map(TextureId)
    }

    pub fn texture(&self, id: TextureId) -> Option<&Texture> {
        self.textures.get(id.0)
    }

    pub fn texture_by_name(&self, name: &str) -> Option<&Texture> {
        self.texture_id(name).and_then(|id| self.texture(id))
    }

    // ---- renderables ----

    /// Appends a renderable.
    ///
    /// # Errors
    ///
    /// [`SceneError::UnknownId`] if the mesh or material id did not come from
    /// this registry.
    pub fn add_renderable(&mut self, object: RenderObject) -> SceneResult<()> {
        if !self.meshes.contains(object.mesh.0) {
            return Err(SceneError::UnknownId {
                kind: "mesh",
                id: object.mesh.0,
            });
        }
        if !self.materials.contains(object.material.0) {
            return Err(SceneError::UnknownId {
                kind: "material",
                id: object.material.0,
            });
        }
        self.renderables.push(object);
        Ok(())
    }

    #[inline]
    pub fn renderables(&self) -> &[RenderObject] {
        &self.renderables
    }

    /// Mutable access for per-frame transform updates.
    #[inline]
    pub fn renderables_mut(&mut self) -> &mut [RenderObject] {
        &mut self.renderables
    }

    /// Orders renderables so equal materials (and within them equal meshes)
    /// are contiguous. The sort is stable.
    pub fn sort_by_material(&mut self) {
        self.renderables
            .sort_by_key(|object| (object.material, object.mesh));
    }

    pub fn clear_renderables(&mut self) {
        self.renderables.clear();
    }
}
