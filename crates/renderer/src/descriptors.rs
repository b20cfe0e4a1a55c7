//! The descriptor model.
//!
//! Three set layouts, created once:
//!
//! | Set | Binding | Contents | Instances |
//! |-----|---------|----------|-----------|
//! | 0 | 0 | camera uniform buffer | one per frame slot |
//! | 0 | 1 | scene uniform buffer, dynamic offset | one per frame slot |
//! | 1 | 0 | object storage buffer | one per frame slot |
//! | 2 | 0 | combined image sampler | one per textured material |
//!
//! Every set comes from a single pool sized for the engine's lifetime; sets
//! are never freed individually. The pool and the layouts are released by
//! the context's deletion queue.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use lumen_rhi::RhiResult;
use lumen_rhi::descriptor::{
    DescriptorPool, DescriptorSetLayout, DescriptorWriter, allocate_sets, binding,
};
use lumen_rhi::device::Device;
use lumen_rhi::memory::GpuContext;

/// Maximum number of sets the pool hands out.
pub const MAX_SETS: u32 = 10;

/// Descriptors of each type the pool holds.
pub const DESCRIPTORS_PER_TYPE: u32 = 10;

pub const GLOBAL_SET: u32 = 0;
pub const OBJECT_SET: u32 = 1;
pub const TEXTURE_SET: u32 = 2;

/// Set 0: camera at binding 0, scene (dynamic) at binding 1.
pub fn global_bindings() -> [vk::DescriptorSetLayoutBinding<'static>; 2] {
    [
        binding(
            0,
            vk::DescriptorType::UNIFORM_BUFFER,
            vk::ShaderStageFlags::VERTEX,
        ),
        binding(
            1,
            vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
            vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
        ),
    ]
}

/// Set 1: object storage at binding 0.
pub fn object_bindings() -> [vk::DescriptorSetLayoutBinding<'static>; 1] {
    [binding(
        0,
        vk::DescriptorType::STORAGE_BUFFER,
        vk::ShaderStageFlags::VERTEX,
    )]
}

/// Set 2: texture at binding 0.
pub fn texture_bindings() -> [vk::DescriptorSetLayoutBinding<'static>; 1] {
    [binding(
        0,
        vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        vk::ShaderStageFlags::FRAGMENT,
    )]
}

/// Pool capacity: [`DESCRIPTORS_PER_TYPE`] of every type the layouts use.
pub fn pool_sizes() -> [vk::DescriptorPoolSize; 4] {
    [
        vk::DescriptorType::UNIFORM_BUFFER,
        vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
        vk::DescriptorType::STORAGE_BUFFER,
        vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
    ]
    .map(|ty| {
        vk::DescriptorPoolSize::default()
            .ty(ty)
            .descriptor_count(DESCRIPTORS_PER_TYPE)
    })
}

/// Buffers a frame slot's sets point at.
#[derive(Debug, Clone, Copy)]
pub struct FrameBuffers {
    pub camera: vk::Buffer,
    pub camera_range: vk::DeviceSize,
    /// The shared scene ring buffer. The descriptor covers one element
    /// starting at 0; the frame's slice is selected by the dynamic offset.
    pub scene: vk::Buffer,
    pub scene_range: vk::DeviceSize,
    pub objects: vk::Buffer,
    pub objects_range: vk::DeviceSize,
}

/// The global and object sets of one frame slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSets {
    pub global: vk::DescriptorSet,
    pub object: vk::DescriptorSet,
}

/// Set layouts and the engine-lifetime pool.
pub struct DescriptorModel {
    device: Arc<Device>,
    global_layout: vk::DescriptorSetLayout,
    object_layout: vk::DescriptorSetLayout,
    texture_layout: vk::DescriptorSetLayout,
    pool: vk::DescriptorPool,
}

impl DescriptorModel {
    /// Creates the three layouts and the pool, registering all four with the
    /// deletion queue. The pool is registered last so it is destroyed first.
    ///
    /// # Errors
    ///
    /// Returns an error if any layout or the pool cannot be created.
    pub fn new(ctx: &mut GpuContext) -> RhiResult<Self> {
        let device = Arc::clone(ctx.device());

        let global = DescriptorSetLayout::new(Arc::clone(&device), &global_bindings())?;
        let global_layout = global.handle();
        ctx.defer("global set layout", global);

        let object = DescriptorSetLayout::new(Arc::clone(&device), &object_bindings())?;
        let object_layout = object.handle();
        ctx.defer("object set layout", object);

        let texture = DescriptorSetLayout::new(Arc::clone(&device), &texture_bindings())?;
        let texture_layout = texture.handle();
        ctx.defer("texture set layout", texture);

        let pool = DescriptorPool::new(Arc::clone(&device), MAX_SETS, &pool_sizes())?;
        let pool_handle = pool.handle();
        ctx.defer("descriptor pool", pool);

        debug!("Descriptor model created");

        Ok(Self {
            device,
            global_layout,
            object_layout,
            texture_layout,
            pool: pool_handle,
        })
    }

    #[inline]
    pub fn global_layout(&self) -> vk::DescriptorSetLayout {
        self.global_layout
    }

    #[inline]
    pub fn object_layout(&self) -> vk::DescriptorSetLayout {
        self.object_layout
    }

    #[inline]
    pub fn texture_layout(&self) -> vk::DescriptorSetLayout {
        self.texture_layout
    }

    /// Set layouts of a material pipeline, in set order.
    pub fn material_layouts(&self, textured: bool) -> Vec<vk::DescriptorSetLayout> {
        let mut layouts = vec![self.global_layout, self.object_layout];
        if textured {
            layouts.push(self.texture_layout);
        }
        layouts
    }

    /// Allocates and writes the global and object sets for one frame slot.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool is exhausted.
    pub fn allocate_frame_sets(&self, buffers: &FrameBuffers) -> RhiResult<FrameSets> {
        let sets = allocate_sets(
            &self.device,
            self.pool,
            &[self.global_layout, self.object_layout],
        )?;
        let (global, object) = (sets[0], sets[1]);

        DescriptorWriter::new()
            .buffer(
                global,
                0,
                vk::DescriptorType::UNIFORM_BUFFER,
                buffers.camera,
                0,
                buffers.camera_range,
            )
            .buffer(
                global,
                1,
                vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
                buffers.scene,
                0,
                buffers.scene_range,
            )
            .buffer(
                object,
                0,
                vk::DescriptorType::STORAGE_BUFFER,
                buffers.objects,
                0,
                buffers.objects_range,
            )
            .apply(&self.device);

        Ok(FrameSets { global, object })
    }

    /// Allocates a set 2 instance pointing at `view` through `sampler`.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool is exhausted.
    pub fn allocate_texture_set(
        &self,
        view: vk::ImageView,
        sampler: vk::Sampler,
    ) -> RhiResult<vk::DescriptorSet> {
        let set = allocate_sets(&self.device, self.pool, &[self.texture_layout])?[0];
        DescriptorWriter::new()
            .sampled_image(set, 0, view, sampler)
            .apply(&self.device);

        Ok(set)
    }
}
