//! RHI-specific error types.

use thiserror::Error;

/// RHI-specific error type.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] ash::vk::Result),

    /// Failed to load Vulkan library
    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    /// GPU allocator error
    #[error("Allocator error: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    /// The allocator mutex was poisoned by a panicking thread
    #[error("Allocator lock poisoned")]
    AllocatorPoisoned,

    /// No suitable GPU found
    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// A fence or swapchain wait expired
    #[error("Timed out after {timeout_ns} ns waiting for {what}")]
    Timeout { what: &'static str, timeout_ns: u64 },

    /// Shader loading error
    #[error("Shader error: {0}")]
    ShaderError(String),

    /// Surface creation error
    #[error("Surface error: {0}")]
    SurfaceError(String),

    /// Swapchain error
    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    /// Pipeline creation error
    #[error("Pipeline error: {0}")]
    PipelineError(String),

    /// Descriptor allocation returned something unexpected
    #[error("Descriptor error: {0}")]
    DescriptorError(String),

    /// The device cannot use a format the way it was asked to
    #[error("Unsupported format {format:?}: {reason}")]
    UnsupportedFormat {
        format: ash::vk::Format,
        reason: &'static str,
    },

    /// A CPU write or read fell outside a buffer
    #[error("Access of {len} bytes at offset {offset} exceeds buffer size {size}")]
    OutOfBounds { offset: u64, len: u64, size: u64 },

    /// Zero-sized buffers cannot be created
    #[error("Buffer '{0}' would be empty")]
    EmptyBuffer(String),

    /// A host access was attempted on memory that is not mapped
    #[error("Buffer '{0}' is not host visible")]
    NotHostVisible(String),
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;

/// Convert a fence/acquire `vk::Result` into a [`RhiError`], promoting
/// `TIMEOUT` and `NOT_READY` to [`RhiError::Timeout`].
pub(crate) fn wait_error(result: ash::vk::Result, what: &'static str, timeout_ns: u64) -> RhiError {
    match result {
        ash::vk::Result::TIMEOUT | ash::vk::Result::NOT_READY => {
            RhiError::Timeout { what, timeout_ns }
        }
        other => RhiError::VulkanError(other),
    }
}
