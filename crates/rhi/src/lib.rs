//! Vulkan abstraction layer (Render Hardware Interface).
//!
//! A thin, safe layer over `ash` and `gpu-allocator`:
//! - Instance, physical device and logical device bootstrap
//! - The device/memory context and its LIFO deletion queue
//! - Swapchain, render pass, framebuffers and pipelines
//! - Command recording, synchronization and one-shot uploads
//! - Descriptor set layouts, pools and writes

mod error;

pub mod command;
pub mod deletion;
pub mod descriptor;
pub mod device;
pub mod image;
pub mod instance;
pub mod memory;
pub mod physical_device;
pub mod pipeline;
pub mod render_pass;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod upload;
pub mod vertex;

#[cfg(test)]
mod testing;

pub use error::{RhiError, RhiResult};

// Re-export ash types that users might need
pub use ash::vk;
