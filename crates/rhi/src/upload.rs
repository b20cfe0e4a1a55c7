//! One-shot transfers to and from GPU memory.
//!
//! [`UploadContext`] owns a dedicated command pool, command buffer and fence.
//! [`UploadContext::submit_once`] records a closure, submits it to the
//! graphics queue and blocks until it has executed, so staging buffers can be
//! released right after the call returns.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use lumen_rhi::device::Device;
//! use lumen_rhi::memory::GpuContext;
//! use lumen_rhi::upload::UploadContext;
//! use lumen_rhi::vk;
//!
//! # fn example(device: Arc<Device>) -> lumen_rhi::RhiResult<()> {
//! let mut ctx = GpuContext::new(device.clone());
//! let upload = UploadContext::new(device)?;
//!
//! let vertices = upload.upload_buffer(
//!     &mut ctx,
//!     "triangle",
//!     &[0u8; 132],
//!     vk::BufferUsageFlags::VERTEX_BUFFER,
//! )?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, trace};

use crate::command::{CommandBuffer, CommandPool};
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::memory::{AllocatedBuffer, GpuContext, Lifetime, MemoryUsage};
use crate::sync::Fence;

/// How long `submit_once` waits for the upload fence: about ten seconds.
pub const UPLOAD_TIMEOUT_NS: u64 = 9_999_999_999;

/// Dedicated recording and synchronization objects for blocking transfers.
pub struct UploadContext {
    device: Arc<Device>,
    command_buffer: CommandBuffer,
    // Dropped after the command buffer that was allocated from it.
    pool: CommandPool,
    fence: Fence,
}

impl UploadContext {
    /// Creates the upload pool (graphics family), its command buffer and an
    /// unsignaled fence.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the objects cannot be created.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let pool = CommandPool::new_transient(Arc::clone(&device), device.graphics_family())?;
        let command_buffer = CommandBuffer::new(Arc::clone(&device), &pool)?;
        let fence = Fence::new(Arc::clone(&device), false)?;
        debug!("Upload context created");

        Ok(Self {
            device,
            command_buffer,
            pool,
            fence,
        })
    }

    /// Records `record` into the upload command buffer, submits it and waits
    /// for completion.
    ///
    /// Afterwards the fence is unsignaled again and the pool is reset, so the
    /// context is ready for the next call.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::Timeout`] if the GPU does not finish within
    /// [`UPLOAD_TIMEOUT_NS`], or the Vulkan error of any failing step.
    pub fn submit_once<F>(&self, record: F) -> RhiResult<()>
    where
        F: FnOnce(&CommandBuffer),
    {
        self.command_buffer.begin()?;
        record(&self.command_buffer);
        self.command_buffer.end()?;

        let command_buffers = [self.command_buffer.handle()];
        let submit = vk::SubmitInfo::default().command_buffers(&command_buffers);
        unsafe {
            self.device
                .submit_graphics(std::slice::from_ref(&submit), self.fence.handle())?;
        }

        self.fence.wait(UPLOAD_TIMEOUT_NS)?;
        self.fence.reset()?;
        self.pool.reset(false)?;
        trace!("One-shot submission complete");
        Ok(())
    }

    /// Copies `bytes` into a new GPU-only buffer with engine lifetime.
    ///
    /// The data goes through a CPU-visible staging buffer which is released
    /// as soon as the copy has executed. The destination gets
    /// `TRANSFER_DST | TRANSFER_SRC | usage`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::EmptyBuffer`] for empty input, or any allocation
    /// or submission error.
    pub fn upload_buffer(
        &self,
        ctx: &mut GpuContext,
        label: &str,
        bytes: &[u8],
        usage: vk::BufferUsageFlags,
    ) -> RhiResult<AllocatedBuffer> {
        let size = bytes.len() as vk::DeviceSize;
        let staging = ctx.allocate_buffer(
            &format!("{label} staging"),
            size,
            vk::BufferUsageFlags::TRANSFER_SRC,
            MemoryUsage::CpuToGpu,
            Lifetime::Transient,
        )?;
        staging.write_bytes(0, bytes)?;

        let destination = ctx.allocate_buffer(
            label,
            size,
            vk::BufferUsageFlags::TRANSFER_DST | vk::BufferUsageFlags::TRANSFER_SRC | usage,
            MemoryUsage::GpuOnly,
            Lifetime::Engine,
        )?;

        self.submit_once(|cmd| {
            cmd.copy_buffer(
                staging.handle(),
                destination.handle(),
                &[vk::BufferCopy::default().size(size)],
            );
        })?;

        debug!("Uploaded {} bytes to '{}'", size, label);
        Ok(destination)
    }

    /// Copies the first `len` bytes of `buffer` back to the host.
    ///
    /// `buffer` must have been created with `TRANSFER_SRC` usage, which
    /// [`Self::upload_buffer`] adds.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::OutOfBounds`] if `len` exceeds the buffer size, or
    /// any allocation or submission error.
    pub fn read_back(
        &self,
        ctx: &mut GpuContext,
        buffer: &AllocatedBuffer,
        len: usize,
    ) -> RhiResult<Vec<u8>> {
        let size = len as vk::DeviceSize;
        if size > buffer.size() {
            return Err(RhiError::OutOfBounds {
                offset: 0,
                len: size,
                size: buffer.size(),
            });
        }
        if len == 0 {
            return Ok(Vec::new());
        }

        let staging = ctx.allocate_buffer(
            "readback staging",
            size,
            vk::BufferUsageFlags::TRANSFER_DST,
            MemoryUsage::GpuToCpu,
            Lifetime::Transient,
        )?;

        self.submit_once(|cmd| {
            cmd.copy_buffer(
                buffer.handle(),
                staging.handle(),
                &[vk::BufferCopy::default().size(size)],
            );
        })?;

        staging.read_bytes(0, len)
    }
}
