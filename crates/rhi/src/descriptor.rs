//! Descriptor set layouts, pools and batched writes.
//!
//! ```no_run
//! use std::sync::Arc;
//! use ash::vk;
//! use lumen_rhi::descriptor::{DescriptorPool, DescriptorSetLayout, DescriptorWriter, binding};
//! use lumen_rhi::device::Device;
//!
//! # fn example(device: Arc<Device>, ubo: vk::Buffer) -> Result<(), lumen_rhi::RhiError> {
//! let ty = vk::DescriptorType::UNIFORM_BUFFER;
//! let layout = DescriptorSetLayout::new(device.clone(), &[binding(0, ty, vk::ShaderStageFlags::VERTEX)])?;
//! let pool = DescriptorPool::new(device.clone(), 4, &[vk::DescriptorPoolSize { ty, descriptor_count: 4 }])?;
//! let set = pool.allocate(&[layout.handle()])?[0];
//! DescriptorWriter::new().buffer(set, 0, ty, ubo, 0, 64).apply(&device);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, trace};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// A layout binding holding a single descriptor of type `ty`.
#[inline]
pub fn binding(
    index: u32,
    ty: vk::DescriptorType,
    stages: vk::ShaderStageFlags,
) -> vk::DescriptorSetLayoutBinding<'static> {
    vk::DescriptorSetLayoutBinding::default()
        .binding(index)
        .descriptor_type(ty)
        .descriptor_count(1)
        .stage_flags(stages)
}

pub struct DescriptorSetLayout {
    device: Arc<Device>,
    layout: vk::DescriptorSetLayout,
}

impl DescriptorSetLayout {
    /// # Errors
    ///
    /// Returns the Vulkan error if creation fails.
    pub fn new(device: Arc<Device>, bindings: &[vk::DescriptorSetLayoutBinding]) -> RhiResult<Self> {
        let info = vk::DescriptorSetLayoutCreateInfo::default().bindings(bindings);
        let layout = unsafe { device.handle().create_descriptor_set_layout(&info, None)? };
        debug!("Descriptor set layout: {} binding(s)", bindings.len());
        Ok(Self { device, layout })
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_set_layout(self.layout, None)
        };
    }
}

/// A descriptor pool. Sets are never freed individually; they go away with
/// the pool.
pub struct DescriptorPool {
    device: Arc<Device>,
    pool: vk::DescriptorPool,
    max_sets: u32,
}

impl DescriptorPool {
    /// `max_sets` bounds the number of sets allocated over the pool's whole
    /// lifetime; `sizes` bounds the descriptors of each type.
    ///
    /// # Errors
    ///
    /// Returns the Vulkan error if creation fails.
    pub fn new(
        device: Arc<Device>,
        max_sets: u32,
        sizes: &[vk::DescriptorPoolSize],
    ) -> RhiResult<Self> {
        let info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(sizes);
        let pool = unsafe { device.handle().create_descriptor_pool(&info, None)? };
        debug!("Descriptor pool: {} set(s), {} type(s)", max_sets, sizes.len());
        Ok(Self {
            device,
            pool,
            max_sets,
        })
    }

    /// Allocates one set per entry of `layouts`.
    ///
    /// # Errors
    ///
    /// Returns the Vulkan error when the pool is exhausted.
    pub fn allocate(&self, layouts: &[vk::DescriptorSetLayout]) -> RhiResult<Vec<vk::DescriptorSet>> {
        allocate_sets(&self.device, self.pool, layouts)
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }

    #[inline]
    pub fn max_sets(&self) -> u32 {
        self.max_sets
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe { self.device.handle().destroy_descriptor_pool(self.pool, None) };
        debug!("Descriptor pool destroyed");
    }
}

/// Allocates one set per layout from a pool known only by handle.
///
/// # Errors
///
/// Returns the Vulkan error when the pool is exhausted, or
/// [`RhiError::DescriptorError`] if the driver returns fewer sets than asked.
pub fn allocate_sets(
    device: &Device,
    pool: vk::DescriptorPool,
    layouts: &[vk::DescriptorSetLayout],
) -> RhiResult<Vec<vk::DescriptorSet>> {
    let info = vk::DescriptorSetAllocateInfo::default()
        .descriptor_pool(pool)
        .set_layouts(layouts);
    let sets = unsafe { device.handle().allocate_descriptor_sets(&info)? };
    if sets.len() != layouts.len() {
        return Err(RhiError::DescriptorError(format!(
            "Asked for {} set(s), got {}",
            layouts.len(),
            sets.len()
        )));
    }
    trace!("Allocated {} descriptor set(s)", sets.len());
    Ok(sets)
}

#[derive(Debug, Clone, Copy)]
enum Resource {
    Buffer(vk::DescriptorBufferInfo),
    Image(vk::DescriptorImageInfo),
}

#[derive(Debug, Clone, Copy)]
struct PendingWrite {
    set: vk::DescriptorSet,
    binding: u32,
    ty: vk::DescriptorType,
    resource: Resource,
}

/// Collects descriptor writes and submits them in one
/// `vkUpdateDescriptorSets` call.
#[derive(Debug, Default)]
pub struct DescriptorWriter {
    writes: Vec<PendingWrite>,
}

impl DescriptorWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Points `binding` of `set` at `range` bytes of `buffer` from `offset`.
    pub fn buffer(
        mut self,
        set: vk::DescriptorSet,
        binding: u32,
        ty: vk::DescriptorType,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        range: vk::DeviceSize,
    ) -> Self {
        let info = vk::DescriptorBufferInfo {
            buffer,
            offset,
            range,
        };
        self.writes.push(PendingWrite {
            set,
            binding,
            ty,
            resource: Resource::Buffer(info),
        });
        self
    }

    /// Points a combined image sampler binding at `view`, which must be in
    /// `SHADER_READ_ONLY_OPTIMAL` when sampled.
    pub fn sampled_image(
        mut self,
        set: vk::DescriptorSet,
        binding: u32,
        view: vk::ImageView,
        sampler: vk::Sampler,
    ) -> Self {
        let info = vk::DescriptorImageInfo {
            sampler,
            image_view: view,
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        };
        self.writes.push(PendingWrite {
            set,
            binding,
            ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            resource: Resource::Image(info),
        });
        self
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Applies every collected write.
    pub fn apply(self, device: &Device) {
        if self.writes.is_empty() {
            return;
        }
        let writes: Vec<vk::WriteDescriptorSet<'_>> = self
            .writes
            .iter()
            .map(|pending| {
                let write = vk::WriteDescriptorSet::default()
                    .dst_set(pending.set)
                    .dst_binding(pending.binding)
                    .descriptor_type(pending.ty);
                match &pending.resource {
                    Resource::Buffer(info) => write.buffer_info(std::slice::from_ref(info)),
                    Resource::Image(info) => write.image_info(std::slice::from_ref(info)),
                }
            })
            .collect();
        unsafe { device.handle().update_descriptor_sets(&writes, &[]) };
        trace!("Wrote {} descriptor(s)", writes.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::headless_gpu;

    #[test]
    fn test_binding_holds_one_descriptor() {
        let b = binding(
            3,
            vk::DescriptorType::STORAGE_BUFFER,
            vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
        );
        assert_eq!(b.binding, 3);
        assert_eq!(b.descriptor_count, 1);
        assert_eq!(b.descriptor_type, vk::DescriptorType::STORAGE_BUFFER);
        assert!(b.stage_flags.contains(vk::ShaderStageFlags::FRAGMENT));
    }

    #[test]
    fn test_writer_collects_in_order() {
        let writer = DescriptorWriter::new()
            .buffer(
                vk::DescriptorSet::null(),
                1,
                vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
                vk::Buffer::null(),
                0,
                256,
            )
            .sampled_image(
                vk::DescriptorSet::null(),
                0,
                vk::ImageView::null(),
                vk::Sampler::null(),
            );
        assert_eq!(writer.len(), 2);

        let first = writer.writes[0];
        assert_eq!(first.binding, 1);
        assert!(matches!(first.resource, Resource::Buffer(info) if info.range == 256));

        let second = writer.writes[1];
        assert_eq!(second.ty, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
        assert!(matches!(
            second.resource,
            Resource::Image(info) if info.image_layout == vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
        ));
    }

    #[test]
    fn test_pool_hands_out_sets() {
        let Some(gpu) = headless_gpu() else { return };
        let device = Arc::clone(&gpu.device);
        let ty = vk::DescriptorType::STORAGE_BUFFER;

        let layout = DescriptorSetLayout::new(
            Arc::clone(&device),
            &[binding(0, ty, vk::ShaderStageFlags::VERTEX)],
        )
        .unwrap();
        let pool = DescriptorPool::new(
            Arc::clone(&device),
            2,
            &[vk::DescriptorPoolSize {
                ty,
                descriptor_count: 2,
            }],
        )
        .unwrap();

        let sets = pool.allocate(&[layout.handle(), layout.handle()]).unwrap();
        assert_eq!(sets.len(), 2);
        assert_eq!(pool.max_sets(), 2);
        DescriptorWriter::new().apply(&device);
    }
}
