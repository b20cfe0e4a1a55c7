//! Frame rendering on top of `lumen_rhi`.
//!
//! This crate orchestrates the rendering process:
//! - The frame ring of [`FRAME_OVERLAP`] reusable slots
//! - The descriptor model (global, object and texture sets)
//! - Mesh and texture upload into the registry
//! - Batched draw recording and the per-frame state machine
//! - The [`Engine`] that owns it all for one window

pub mod assets;
pub mod depth_buffer;
pub mod descriptors;
pub mod draw;
pub mod engine;
mod error;
pub mod frame;
pub mod orchestrator;
pub mod overlay;
pub mod ubo;

#[cfg(test)]
mod testing;

pub use draw::DrawStats;
pub use engine::{DEFAULT_MATERIAL, Engine, TEXTURED_MATERIAL};
pub use error::{RenderError, RenderResult};
pub use frame::FRAME_OVERLAP;
pub use orchestrator::{FrameBackend, FrameOrchestrator, FramePhase};
pub use overlay::Overlay;
