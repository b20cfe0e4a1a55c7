//! Hook for UI overlays drawn on top of the scene.
//!
//! An overlay records into the frame's command buffer after every engine
//! draw, inside the same render pass instance.

use ash::vk;
use lumen_rhi::command::CommandRecorder;
use winit::event::WindowEvent;

use crate::draw::DrawStats;

/// A consumer of the active render pass and command buffer.
pub trait Overlay {
    /// Called before the frame is recorded.
    fn prepare(&mut self) {}

    /// Receives raw window events. Returns true if the overlay consumed it.
    fn handle_event(&mut self, _event: &WindowEvent) -> bool {
        false
    }

    /// Records the overlay's commands. The render pass is active.
    fn record(&mut self, recorder: &mut dyn CommandRecorder, render_pass: vk::RenderPass);

    /// Called after the frame has been presented.
    fn frame_complete(&mut self, _frame_number: u64, _stats: &DrawStats) {}
}
