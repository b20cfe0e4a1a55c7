//! Window and surface collaborator for the engine.
//!
//! This crate provides:
//! - A fixed-size window created from [`WindowConfig`](lumen_core::config::WindowConfig)
//! - The Vulkan surface for that window
//! - The instance extensions surface creation needs

mod window;

pub use window::{Surface, Window};

// Re-export winit types the application loop needs
pub use winit::event::WindowEvent;
pub use winit::event_loop::{ActiveEventLoop, EventLoop};
pub use winit::keyboard::{KeyCode, PhysicalKey};
