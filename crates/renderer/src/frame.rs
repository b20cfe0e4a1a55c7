//! The frame ring: [`FRAME_OVERLAP`] reusable bundles of per-frame resources.
//!
//! Slot `i` is used by every frame whose number is `i` modulo
//! [`FRAME_OVERLAP`]. A slot's fence is the only thing that tells the CPU the
//! GPU has finished with its buffers, so every per-frame write has to happen
//! after that fence has been waited on.
//!
//! # Synchronization Flow
//!
//! ```text
//! 1. Wait on render_fence (previous use of this slot is done)
//! 2. Acquire swapchain image (signals present_semaphore)
//! 3. Write camera, scene and object data; record command_buffer
//! 4. Reset render_fence, submit command_buffer:
//!    - Wait on present_semaphore at COLOR_ATTACHMENT_OUTPUT
//!    - Signal render_semaphore
//!    - Signal render_fence
//! 5. Present (waits on render_semaphore)
//! ```
//!
//! The fence is reset only right before the submission that signals it
//! again. A frame that fails before step 4 leaves it signalled, so the slot
//! stays usable.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use lumen_rhi::RhiResult;
use lumen_rhi::command::{CommandBuffer, CommandPool};
use lumen_rhi::device::Device;
use lumen_rhi::memory::{AllocatedBuffer, GpuContext, Lifetime, MemoryUsage};
use lumen_rhi::sync::{Fence, Semaphore};
use lumen_scene::SceneParameters;

use crate::descriptors::{DescriptorModel, FrameBuffers, FrameSets};
use crate::orchestrator::FrameData;
use crate::ubo::{GpuCameraData, GpuObjectData};

/// Number of frames in flight.
pub const FRAME_OVERLAP: usize = 2;

/// Slot used by frame `frame_number`.
#[inline]
pub fn slot_index(frame_number: u64) -> usize {
    (frame_number % FRAME_OVERLAP as u64) as usize
}

/// Byte offset of slot `slot`'s scene parameters in the shared scene buffer.
#[inline]
pub fn scene_offset(slot: usize, padded_scene_size: vk::DeviceSize) -> vk::DeviceSize {
    slot as vk::DeviceSize * padded_scene_size
}

/// How a slot's submission synchronizes with presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitSync {
    /// Wait for the acquired swapchain image; signal the render semaphore
    /// that present waits on.
    Present,
    /// No swapchain involved. Only the fence is signalled.
    Offscreen,
}

/// Per-frame resources.
pub struct FrameSlot {
    command_buffer: CommandBuffer,
    // Dropped after the command buffer allocated from it.
    command_pool: CommandPool,
    /// Signalled when the acquired swapchain image is ready.
    present_semaphore: Semaphore,
    /// Signalled when this frame's commands finish.
    render_semaphore: Semaphore,
    render_fence: Fence,
    camera_buffer: AllocatedBuffer,
    object_buffer: AllocatedBuffer,
    sets: FrameSets,
}

impl FrameSlot {
    fn new(
        ctx: &mut GpuContext,
        descriptors: &DescriptorModel,
        index: usize,
        scene_buffer: &AllocatedBuffer,
        max_objects: u32,
    ) -> RhiResult<Self> {
        let device = Arc::clone(ctx.device());
        let command_pool = CommandPool::new(Arc::clone(&device), device.graphics_family())?;
        let command_buffer = CommandBuffer::new(Arc::clone(&device), &command_pool)?;
        let present_semaphore = Semaphore::new(Arc::clone(&device))?;
        let render_semaphore = Semaphore::new(Arc::clone(&device))?;
        // Signaled so the first wait on this slot returns immediately.
        let render_fence = Fence::new(Arc::clone(&device), true)?;

        let camera_buffer = ctx.allocate_buffer(
            &format!("frame {index} camera"),
            GpuCameraData::SIZE as vk::DeviceSize,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            MemoryUsage::CpuToGpu,
            Lifetime::Engine,
        )?;
        let objects_range = GpuObjectData::SIZE as vk::DeviceSize * vk::DeviceSize::from(max_objects);
        let object_buffer = ctx.allocate_buffer(
            &format!("frame {index} objects"),
            objects_range,
            vk::BufferUsageFlags::STORAGE_BUFFER,
            MemoryUsage::CpuToGpu,
            Lifetime::Engine,
        )?;

        let sets = descriptors.allocate_frame_sets(&FrameBuffers {
            camera: camera_buffer.handle(),
            camera_range: camera_buffer.size(),
            scene: scene_buffer.handle(),
            scene_range: SceneParameters::size() as vk::DeviceSize,
            objects: object_buffer.handle(),
            objects_range,
        })?;

        debug!("Created frame slot {}", index);

        Ok(Self {
            command_buffer,
            command_pool,
            present_semaphore,
            render_semaphore,
            render_fence,
            camera_buffer,
            object_buffer,
            sets,
        })
    }

    #[inline]
    pub fn present_semaphore(&self) -> &Semaphore {
        &self.present_semaphore
    }

    #[inline]
    pub fn render_semaphore(&self) -> &Semaphore {
        &self.render_semaphore
    }

    #[inline]
    pub fn render_fence(&self) -> &Fence {
        &self.render_fence
    }

    #[inline]
    pub fn camera_buffer(&self) -> &AllocatedBuffer {
        &self.camera_buffer
    }

    #[inline]
    pub fn object_buffer(&self) -> &AllocatedBuffer {
        &self.object_buffer
    }

    #[inline]
    pub fn sets(&self) -> FrameSets {
        self.sets
    }

    /// Blocks until the GPU has finished this slot's last submission.
    ///
    /// # Errors
    ///
    /// `RhiError::Timeout` if the fence is not signalled within `timeout_ns`.
    pub fn wait_until_free(&self, timeout_ns: u64) -> RhiResult<()> {
        self.render_fence.wait(timeout_ns)
    }

    /// Resets the command buffer and begins recording into it.
    ///
    /// # Errors
    ///
    /// Returns an error if the reset or begin fails.
    pub fn begin_commands(&mut self) -> RhiResult<&mut CommandBuffer> {
        self.command_buffer.reset()?;
        self.command_buffer.begin()?;
        Ok(&mut self.command_buffer)
    }

    /// Ends recording, resets the fence and submits to the graphics queue.
    ///
    /// # Errors
    ///
    /// Returns an error if ending, the fence reset or the submission fails.
    pub fn submit(&self, device: &Device, sync: SubmitSync) -> RhiResult<()> {
        self.command_buffer.end()?;

        let command_buffers = [self.command_buffer.handle()];
        let wait_semaphores = [self.present_semaphore.handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [self.render_semaphore.handle()];
        let mut submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);
        if sync == SubmitSync::Present {
            submit_info = submit_info
                .wait_semaphores(&wait_semaphores)
                .wait_dst_stage_mask(&wait_stages)
                .signal_semaphores(&signal_semaphores);
        }

        self.render_fence.reset()?;
        // SAFETY: the command buffer is fully recorded, the fence was just
        // reset and both semaphores belong to this slot.
        unsafe { device.submit_graphics(std::slice::from_ref(&submit_info), self.render_fence.handle()) }
    }
}

/// All frame slots plus the scene buffer they share.
///
/// The scene buffer holds one padded [`SceneParameters`] per slot; slot `i`
/// writes at [`scene_offset`]`(i, padded)` and binds that same offset
/// dynamically.
pub struct FrameRing {
    slots: Vec<FrameSlot>,
    scene_buffer: AllocatedBuffer,
    padded_scene_size: vk::DeviceSize,
    max_objects: u32,
}

impl FrameRing {
    /// Creates [`FRAME_OVERLAP`] slots, each with room for `max_objects`
    /// object entries.
    ///
    /// # Errors
    ///
    /// Returns an error if any buffer, descriptor set or sync object cannot
    /// be created.
    pub fn new(
        ctx: &mut GpuContext,
        descriptors: &DescriptorModel,
        max_objects: u32,
    ) -> RhiResult<Self> {
        let padded_scene_size = ctx.pad_uniform_size(SceneParameters::size() as vk::DeviceSize);
        let scene_buffer = ctx.allocate_buffer(
            "scene parameters",
            padded_scene_size * FRAME_OVERLAP as vk::DeviceSize,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            MemoryUsage::CpuToGpu,
            Lifetime::Engine,
        )?;

        let slots = (0..FRAME_OVERLAP)
            .map(|index| FrameSlot::new(ctx, descriptors, index, &scene_buffer, max_objects))
            .collect::<RhiResult<Vec<_>>>()?;

        info!(
            "Frame ring created: {} slots, scene stride {} bytes, {} objects per frame",
            FRAME_OVERLAP, padded_scene_size, max_objects
        );

        Ok(Self {
            slots,
            scene_buffer,
            padded_scene_size,
            max_objects,
        })
    }

    #[inline]
    pub fn slot(&self, index: usize) -> &FrameSlot {
        &self.slots[index % FRAME_OVERLAP]
    }

    #[inline]
    pub fn slot_mut(&mut self, index: usize) -> &mut FrameSlot {
        &mut self.slots[index % FRAME_OVERLAP]
    }

    /// Writes camera and object data into slot `slot` and the scene
    /// parameters at `data.scene_offset` in the shared scene buffer.
    ///
    /// # Errors
    ///
    /// `RhiError::OutOfBounds` if `data.objects` exceeds the slot's capacity.
    pub fn write_frame_data(&self, slot: usize, data: &FrameData<'_>) -> RhiResult<()> {
        let frame = self.slot(slot);
        frame.camera_buffer.write(0, &[data.camera])?;
        frame.object_buffer.write(0, data.objects)?;
        self.scene_buffer.write(data.scene_offset, &[data.scene])
    }

    #[inline]
    pub fn scene_buffer(&self) -> &AllocatedBuffer {
        &self.scene_buffer
    }

    #[inline]
    pub fn padded_scene_size(&self) -> vk::DeviceSize {
        self.padded_scene_size
    }

    #[inline]
    pub fn max_objects(&self) -> u32 {
        self.max_objects
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_rhi::memory::pad_uniform_buffer_size;

    #[test]
    fn test_two_frames_in_flight() {
        assert_eq!(FRAME_OVERLAP, 2);
    }

    #[test]
    fn test_slot_rotation() {
        let slots: Vec<usize> = (0..6).map(slot_index).collect();
        assert_eq!(slots, [0, 1, 0, 1, 0, 1]);
    }

    #[test]
    fn test_slot_index_is_modulo() {
        for frame in [0u64, 1, 7, 1000, u64::MAX - 1, u64::MAX] {
            assert_eq!(slot_index(frame), (frame % FRAME_OVERLAP as u64) as usize);
        }
    }

    #[test]
    fn test_scene_offsets_do_not_overlap() {
        for alignment in [16u64, 64, 256] {
            let padded = pad_uniform_buffer_size(SceneParameters::size() as u64, alignment);
            for slot in 0..FRAME_OVERLAP {
                let offset = scene_offset(slot, padded);
                assert_eq!(offset % alignment, 0);
                assert_eq!(offset, slot as u64 * padded);
                if slot + 1 < FRAME_OVERLAP {
                    let next = scene_offset(slot + 1, padded);
                    assert!(offset + SceneParameters::size() as u64 <= next);
                }
            }
        }
    }
}
