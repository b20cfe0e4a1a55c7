//! Synchronization primitives.
//!
//! - [`Semaphore`] orders GPU queue operations (acquire, render, present)
//! - [`Fence`] lets the CPU wait for GPU work; the only blocking point of the
//!   frame loop
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use lumen_rhi::device::Device;
//! use lumen_rhi::sync::{Fence, FRAME_TIMEOUT_NS};
//!
//! # fn example(device: Arc<Device>) -> Result<(), lumen_rhi::RhiError> {
//! let render_fence = Fence::new(device.clone(), true)?;
//! render_fence.wait(FRAME_TIMEOUT_NS)?;
//! render_fence.reset()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::trace;

use crate::device::Device;
use crate::error::{RhiResult, wait_error};

/// Timeout for the per-frame fence wait and swapchain acquire: one second.
pub const FRAME_TIMEOUT_NS: u64 = 1_000_000_000;

/// Vulkan semaphore wrapper, created unsignaled.
pub struct Semaphore {
    device: Arc<Device>,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Creates a new binary semaphore.
    ///
    /// # Errors
    ///
    /// Returns an error if semaphore creation fails.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::default();
        let semaphore = unsafe { device.handle().create_semaphore(&create_info, None)? };
        trace!("Semaphore created");
        Ok(Self { device, semaphore })
    }

    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_semaphore(self.semaphore, None);
        }
        trace!("Semaphore destroyed");
    }
}

/// Vulkan fence wrapper.
pub struct Fence {
    device: Arc<Device>,
    fence: vk::Fence,
}

impl Fence {
    /// Creates a fence.
    ///
    /// Frame fences start signaled so the first wait on each slot returns
    /// immediately; upload fences start unsignaled.
    ///
    /// # Errors
    ///
    /// Returns an error if fence creation fails.
    pub fn new(device: Arc<Device>, signaled: bool) -> RhiResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::default().flags(flags);
        let fence = unsafe { device.handle().create_fence(&create_info, None)? };
        trace!("Fence created (signaled: {})", signaled);
        Ok(Self { device, fence })
    }

    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Blocks until the fence is signaled or `timeout_ns` expires.
    ///
    /// # Errors
    ///
    /// Returns [`crate::RhiError::Timeout`] when the timeout expires and
    /// [`crate::RhiError::VulkanError`] for any other failure.
    pub fn wait(&self, timeout_ns: u64) -> RhiResult<()> {
        unsafe {
            self.device
                .handle()
                .wait_for_fences(&[self.fence], true, timeout_ns)
                .map_err(|e| wait_error(e, "fence", timeout_ns))
        }
    }

    /// Returns the fence to the unsignaled state.
    ///
    /// # Errors
    ///
    /// Returns an error if the reset fails.
    pub fn reset(&self) -> RhiResult<()> {
        unsafe { self.device.handle().reset_fences(&[self.fence])? };
        Ok(())
    }

    /// Non-blocking status query; errors read as unsignaled.
    pub fn is_signaled(&self) -> bool {
        unsafe { self.device.handle().get_fence_status(self.fence) }.unwrap_or(false)
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_fence(self.fence, None);
        }
        trace!("Fence destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RhiError;
    use crate::testing::headless_gpu;

    #[test]
    fn test_frame_timeout_is_one_second() {
        assert_eq!(FRAME_TIMEOUT_NS, 1_000_000_000);
    }

    #[test]
    fn test_sync_types_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Semaphore>();
        assert_send_sync::<Fence>();
    }

    #[test]
    fn test_signaled_fence_wait_returns() {
        let Some(gpu) = headless_gpu() else { return };
        let fence = Fence::new(Arc::clone(&gpu.device), true).unwrap();
        assert!(fence.is_signaled());
        fence.wait(FRAME_TIMEOUT_NS).unwrap();
        fence.reset().unwrap();
        assert!(!fence.is_signaled());
    }

    #[test]
    fn test_unsignaled_fence_times_out() {
        let Some(gpu) = headless_gpu() else { return };
        let fence = Fence::new(Arc::clone(&gpu.device), false).unwrap();
        match fence.wait(1_000) {
            Err(RhiError::Timeout { what, timeout_ns }) => {
                assert_eq!(what, "fence");
                assert_eq!(timeout_ns, 1_000);
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[test]
    fn test_semaphore_creation() {
        let Some(gpu) = headless_gpu() else { return };
        let semaphore = Semaphore::new(Arc::clone(&gpu.device)).unwrap();
        assert_ne!(semaphore.handle(), vk::Semaphore::null());
    }
}
