//! Device/memory context: buffer and image allocation through gpu-allocator.
//!
//! [`GpuContext`] owns the device handle and the engine's [`DeletionQueue`].
//! Every allocation is either:
//!
//! - [`Lifetime::Engine`]: its release is registered with the deletion queue
//!   and runs when the context is flushed at shutdown. The returned handle
//!   does not own the memory.
//! - [`Lifetime::Transient`]: the returned handle owns the memory and releases
//!   it as soon as it is dropped (staging buffers).
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use lumen_rhi::device::Device;
//! use lumen_rhi::memory::{GpuContext, Lifetime, MemoryUsage};
//! use lumen_rhi::vk;
//!
//! # fn example(device: Arc<Device>) -> lumen_rhi::RhiResult<()> {
//! let mut ctx = GpuContext::new(device);
//! let camera = ctx.allocate_buffer(
//!     "camera",
//!     192,
//!     vk::BufferUsageFlags::UNIFORM_BUFFER,
//!     MemoryUsage::CpuToGpu,
//!     Lifetime::Engine,
//! )?;
//! camera.write(0, &[0.0f32; 48])?;
//! ctx.flush();
//! # Ok(())
//! # }
//! ```

use std::borrow::Cow;
use std::ffi::c_void;
use std::ptr::NonNull;
use std::sync::Arc;

use ash::vk;
use bytemuck::Pod;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::{debug, error, trace};

use crate::deletion::DeletionQueue;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Rounds `size` up to the next multiple of `alignment`.
///
/// Equal to `((size + alignment - 1) / alignment) * alignment`. An alignment
/// of zero means the device imposes none and returns `size` unchanged.
#[inline]
pub fn pad_uniform_buffer_size(size: u64, alignment: u64) -> u64 {
    if alignment == 0 {
        return size;
    }
    size.div_ceil(alignment) * alignment
}

/// Where an allocation lives and who can see it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemoryUsage {
    /// Host-visible, written by the CPU every frame or used for staging.
    CpuToGpu,
    /// Device-local only: vertex buffers, textures, depth.
    GpuOnly,
    /// Host-visible and cached, for reading results back.
    GpuToCpu,
}

impl MemoryUsage {
    pub fn location(self) -> MemoryLocation {
        match self {
            MemoryUsage::CpuToGpu => MemoryLocation::CpuToGpu,
            MemoryUsage::GpuOnly => MemoryLocation::GpuOnly,
            MemoryUsage::GpuToCpu => MemoryLocation::GpuToCpu,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            MemoryUsage::CpuToGpu => "cpu-to-gpu",
            MemoryUsage::GpuOnly => "gpu-only",
            MemoryUsage::GpuToCpu => "gpu-to-cpu",
        }
    }
}

/// Who releases an allocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifetime {
    /// Released by the deletion queue at shutdown.
    Engine,
    /// Released when the returned handle is dropped.
    Transient,
}

// ============================================================================
// Release guards
// ============================================================================

/// Frees a buffer's allocation and destroys the buffer on drop.
struct BufferRelease {
    device: Arc<Device>,
    buffer: vk::Buffer,
    allocation: Option<Allocation>,
    label: String,
}

impl Drop for BufferRelease {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            match self.device.lock_allocator() {
                Ok(mut allocator) => {
                    if let Err(e) = allocator.free(allocation) {
                        error!("Failed to free buffer '{}': {:?}", self.label, e);
                    }
                }
                Err(e) => error!("Leaking buffer '{}' memory: {}", self.label, e),
            }
        }
        unsafe { self.device.handle().destroy_buffer(self.buffer, None) };
        trace!("Destroyed buffer '{}'", self.label);
    }
}

/// Frees an image's allocation and destroys the image on drop.
struct ImageRelease {
    device: Arc<Device>,
    image: vk::Image,
    allocation: Option<Allocation>,
    label: String,
}

impl Drop for ImageRelease {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            match self.device.lock_allocator() {
                Ok(mut allocator) => {
                    if let Err(e) = allocator.free(allocation) {
                        error!("Failed to free image '{}': {:?}", self.label, e);
                    }
                }
                Err(e) => error!("Leaking image '{}' memory: {}", self.label, e),
            }
        }
        unsafe { self.device.handle().destroy_image(self.image, None) };
        trace!("Destroyed image '{}'", self.label);
    }
}

// ============================================================================
// AllocatedBuffer
// ============================================================================

/// A buffer handle plus its host mapping, if any.
///
/// Engine-lifetime handles stay valid until the owning [`GpuContext`] is
/// flushed; using one after that is a logic error.
pub struct AllocatedBuffer {
    buffer: vk::Buffer,
    size: vk::DeviceSize,
    mapped: Option<NonNull<c_void>>,
    owner: Option<BufferRelease>,
}

impl AllocatedBuffer {
    /// Wraps a buffer whose memory is managed elsewhere. It is not host
    /// visible and nothing is released on drop.
    pub fn unowned(buffer: vk::Buffer, size: vk::DeviceSize) -> Self {
        Self {
            buffer,
            size,
            mapped: None,
            owner: None,
        }
    }

    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    #[inline]
    pub fn is_host_visible(&self) -> bool {
        self.mapped.is_some()
    }

    #[inline]
    pub fn is_transient(&self) -> bool {
        self.owner.is_some()
    }

    fn check_range(&self, offset: u64, len: u64) -> RhiResult<NonNull<c_void>> {
        let end = offset.checked_add(len);
        if end.is_none_or(|end| end > self.size) {
            return Err(RhiError::OutOfBounds {
                offset,
                len,
                size: self.size,
            });
        }
        self.mapped
            .ok_or_else(|| RhiError::NotHostVisible(format!("{:?}", self.buffer)))
    }

    /// Copies raw bytes into the mapped memory at `offset`.
    ///
    /// # Errors
    ///
    /// [`RhiError::OutOfBounds`] if the range exceeds the buffer and
    /// [`RhiError::NotHostVisible`] for GPU-only memory.
    pub fn write_bytes(&self, offset: vk::DeviceSize, data: &[u8]) -> RhiResult<()> {
        if data.is_empty() {
            return Ok(());
        }
        let mapped = self.check_range(offset, data.len() as u64)?;
        // Host-visible allocations from gpu-allocator are persistently mapped
        // and host coherent.
        unsafe {
            let dst = mapped.as_ptr().cast::<u8>().add(offset as usize);
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len());
        }
        Ok(())
    }

    /// Writes a slice of plain-old-data values at `offset`.
    pub fn write<T: Pod>(&self, offset: vk::DeviceSize, values: &[T]) -> RhiResult<()> {
        self.write_bytes(offset, bytemuck::cast_slice(values))
    }

    /// Copies `len` bytes out of the mapped memory starting at `offset`.
    pub fn read_bytes(&self, offset: vk::DeviceSize, len: usize) -> RhiResult<Vec<u8>> {
        if len == 0 {
            return Ok(Vec::new());
        }
        let mapped = self.check_range(offset, len as u64)?;
        let mut out = vec![0u8; len];
        unsafe {
            let src = mapped.as_ptr().cast::<u8>().add(offset as usize);
            std::ptr::copy_nonoverlapping(src, out.as_mut_ptr(), len);
        }
        Ok(out)
    }
}

impl std::fmt::Debug for AllocatedBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AllocatedBuffer")
            .field("buffer", &self.buffer)
            .field("size", &self.size)
            .field("host_visible", &self.is_host_visible())
            .field("transient", &self.is_transient())
            .finish()
    }
}

// ============================================================================
// AllocatedImage
// ============================================================================

/// An image handle plus the parameters it was created with.
pub struct AllocatedImage {
    image: vk::Image,
    format: vk::Format,
    extent: vk::Extent3D,
    mip_levels: u32,
    owner: Option<ImageRelease>,
}

impl AllocatedImage {
    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent3D {
        self.extent
    }

    #[inline]
    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }

    #[inline]
    pub fn is_transient(&self) -> bool {
        self.owner.is_some()
    }
}

impl std::fmt::Debug for AllocatedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AllocatedImage")
            .field("image", &self.image)
            .field("format", &self.format)
            .field("extent", &self.extent)
            .field("mip_levels", &self.mip_levels)
            .finish()
    }
}

// ============================================================================
// GpuContext
// ============================================================================

/// The device plus everything that must be released with it.
///
/// Passed by reference to every component constructor. Flushing it runs the
/// deletion queue; it does not destroy the device itself.
pub struct GpuContext {
    device: Arc<Device>,
    deletion: DeletionQueue,
    uniform_alignment: vk::DeviceSize,
}

impl GpuContext {
    pub fn new(device: Arc<Device>) -> Self {
        let uniform_alignment = device.limits().min_uniform_buffer_offset_alignment;
        debug!("Minimum uniform buffer offset alignment: {}", uniform_alignment);
        Self {
            device,
            deletion: DeletionQueue::new(),
            uniform_alignment,
        }
    }

    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Device-reported minimum uniform buffer offset alignment.
    #[inline]
    pub fn uniform_alignment(&self) -> vk::DeviceSize {
        self.uniform_alignment
    }

    /// Pads `size` to the device's uniform buffer offset alignment.
    #[inline]
    pub fn pad_uniform_size(&self, size: vk::DeviceSize) -> vk::DeviceSize {
        pad_uniform_buffer_size(size, self.uniform_alignment)
    }

    /// Hands an RAII resource to the deletion queue.
    pub fn defer<R: 'static>(&mut self, label: impl Into<Cow<'static, str>>, resource: R) {
        self.deletion.retain(label, resource);
    }

    /// Number of pending teardown actions.
    #[inline]
    pub fn pending_teardown(&self) -> usize {
        self.deletion.len()
    }

    /// Allocates a buffer.
    ///
    /// # Arguments
    ///
    /// * `label` - Name used for the allocation and in logs
    /// * `size` - Size in bytes, must be non-zero
    /// * `usage` - Vulkan usage flags
    /// * `memory` - Where the memory lives
    /// * `lifetime` - Whether the deletion queue or the handle releases it
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::EmptyBuffer`] for a zero size, or an error if
    /// buffer creation, allocation or binding fails. No object is leaked on
    /// failure.
    pub fn allocate_buffer(
        &mut self,
        label: &str,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        memory: MemoryUsage,
        lifetime: Lifetime,
    ) -> RhiResult<AllocatedBuffer> {
        if size == 0 {
            return Err(RhiError::EmptyBuffer(label.to_owned()));
        }
        let raw = self.device.handle();
        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { raw.create_buffer(&buffer_info, None)? };
        let requirements = unsafe { raw.get_buffer_memory_requirements(buffer) };

        // From here on the guard cleans up if anything fails.
        let mut release = BufferRelease {
            device: Arc::clone(&self.device),
            buffer,
            allocation: None,
            label: label.to_owned(),
        };

        let allocation = self.device.lock_allocator()?.allocate(&AllocationCreateDesc {
            name: label,
            requirements,
            location: memory.location(),
            linear: true,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })?;

        let (memory_handle, offset) = unsafe { (allocation.memory(), allocation.offset()) };
        let mapped = allocation.mapped_ptr();
        release.allocation = Some(allocation);
        unsafe { raw.bind_buffer_memory(buffer, memory_handle, offset)? };

        debug!(
            "Allocated buffer '{}': {} bytes, {:?}, {} ({:?})",
            label,
            size,
            usage,
            memory.name(),
            lifetime
        );

        let owner = match lifetime {
            Lifetime::Engine => {
                self.deletion.retain(format!("buffer '{label}'"), release);
                None
            }
            Lifetime::Transient => Some(release),
        };

        Ok(AllocatedBuffer {
            buffer,
            size,
            mapped,
            owner,
        })
    }

    /// Allocates an image described by `info`.
    ///
    /// # Errors
    ///
    /// Returns an error if image creation, allocation or binding fails.
    pub fn allocate_image(
        &mut self,
        label: &str,
        info: &vk::ImageCreateInfo<'_>,
        memory: MemoryUsage,
        lifetime: Lifetime,
    ) -> RhiResult<AllocatedImage> {
        let raw = self.device.handle();
        let image = unsafe { raw.create_image(info, None)? };
        let requirements = unsafe { raw.get_image_memory_requirements(image) };

        let mut release = ImageRelease {
            device: Arc::clone(&self.device),
            image,
            allocation: None,
            label: label.to_owned(),
        };

        let allocation = self.device.lock_allocator()?.allocate(&AllocationCreateDesc {
            name: label,
            requirements,
            location: memory.location(),
            linear: info.tiling == vk::ImageTiling::LINEAR,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })?;

        let (memory_handle, offset) = unsafe { (allocation.memory(), allocation.offset()) };
        release.allocation = Some(allocation);
        unsafe { raw.bind_image_memory(image, memory_handle, offset)? };

        debug!(
            "Allocated image '{}': {}x{} {:?}, {} mip(s), {} ({:?})",
            label,
            info.extent.width,
            info.extent.height,
            info.format,
            info.mip_levels,
            memory.name(),
            lifetime
        );

        let owner = match lifetime {
            Lifetime::Engine => {
                self.deletion.retain(format!("image '{label}'"), release);
                None
            }
            Lifetime::Transient => Some(release),
        };

        Ok(AllocatedImage {
            image,
            format: info.format,
            extent: info.extent,
            mip_levels: info.mip_levels,
            owner,
        })
    }

    /// Runs every registered teardown action, newest first.
    ///
    /// The caller must make sure the GPU is idle.
    pub fn flush(&mut self) {
        self.deletion.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::headless_gpu;

    #[test]
    fn test_pad_examples() {
        assert_eq!(pad_uniform_buffer_size(80, 256), 256);
        assert_eq!(pad_uniform_buffer_size(256, 256), 256);
        assert_eq!(pad_uniform_buffer_size(257, 256), 512);
        assert_eq!(pad_uniform_buffer_size(0, 64), 0);
        assert_eq!(pad_uniform_buffer_size(80, 0), 80);
    }

    #[test]
    fn test_pad_properties() {
        for alignment in [1u64, 2, 4, 16, 64, 256, 100, 0x40] {
            for size in 0u64..600 {
                let padded = pad_uniform_buffer_size(size, alignment);
                assert_eq!(padded, ((size + alignment - 1) / alignment) * alignment);
                assert_eq!(padded % alignment, 0);
                assert!(padded >= size);
                assert!(padded - size < alignment);
            }
        }
    }

    #[test]
    fn test_pad_identity_for_unit_alignment() {
        for size in [0u64, 1, 7, 80, 4096, u32::MAX as u64] {
            assert_eq!(pad_uniform_buffer_size(size, 1), size);
        }
    }

    #[test]
    fn test_memory_usage_locations() {
        assert_eq!(MemoryUsage::CpuToGpu.location(), MemoryLocation::CpuToGpu);
        assert_eq!(MemoryUsage::GpuOnly.location(), MemoryLocation::GpuOnly);
        assert_eq!(MemoryUsage::GpuToCpu.location(), MemoryLocation::GpuToCpu);
    }

    #[test]
    fn test_unowned_buffer_is_not_host_visible() {
        let buffer = AllocatedBuffer::unowned(vk::Buffer::null(), 64);
        assert!(!buffer.is_host_visible());
        assert!(matches!(
            buffer.write_bytes(0, &[1, 2, 3]),
            Err(RhiError::NotHostVisible(_))
        ));
        assert!(matches!(
            buffer.write_bytes(63, &[1, 2]),
            Err(RhiError::OutOfBounds { offset: 63, len: 2, size: 64 })
        ));
    }

    #[test]
    fn test_engine_buffer_registers_teardown() {
        let Some(gpu) = headless_gpu() else { return };
        let mut ctx = GpuContext::new(Arc::clone(&gpu.device));

        let buffer = ctx
            .allocate_buffer(
                "test uniform",
                256,
                vk::BufferUsageFlags::UNIFORM_BUFFER,
                MemoryUsage::CpuToGpu,
                Lifetime::Engine,
            )
            .unwrap();
        assert!(!buffer.is_transient());
        assert!(buffer.is_host_visible());
        assert_eq!(ctx.pending_teardown(), 1);

        buffer.write(0, &[1.0f32, 2.0, 3.0, 4.0]).unwrap();
        let bytes = buffer.read_bytes(0, 16).unwrap();
        assert_eq!(bytemuck::cast_slice::<u8, f32>(&bytes), &[1.0, 2.0, 3.0, 4.0]);
        assert!(buffer.write_bytes(250, &[0u8; 8]).is_err());

        ctx.flush();
        assert_eq!(ctx.pending_teardown(), 0);
    }

    #[test]
    fn test_transient_buffer_skips_queue() {
        let Some(gpu) = headless_gpu() else { return };
        let mut ctx = GpuContext::new(Arc::clone(&gpu.device));

        let staging = ctx
            .allocate_buffer(
                "staging",
                1024,
                vk::BufferUsageFlags::TRANSFER_SRC,
                MemoryUsage::CpuToGpu,
                Lifetime::Transient,
            )
            .unwrap();
        assert!(staging.is_transient());
        assert_eq!(ctx.pending_teardown(), 0);
        drop(staging);
    }

    #[test]
    fn test_gpu_only_image() {
        let Some(gpu) = headless_gpu() else { return };
        let mut ctx = GpuContext::new(Arc::clone(&gpu.device));

        let info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(vk::Format::R8G8B8A8_UNORM)
            .extent(vk::Extent3D { width: 4, height: 4, depth: 1 })
            .mip_levels(3)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST);

        let image = ctx
            .allocate_image("test image", &info, MemoryUsage::GpuOnly, Lifetime::Engine)
            .unwrap();
        assert_eq!(image.mip_levels(), 3);
        assert_eq!(image.extent().width, 4);
        assert_eq!(ctx.pending_teardown(), 1);
        ctx.flush();
    }
}
