//! A diagnostics overlay that draws nothing and logs frame statistics.

use ash::vk;
use tracing::{debug, info};

use lumen_platform::WindowEvent;
use lumen_renderer::{DrawStats, Overlay};
use lumen_rhi::command::CommandRecorder;

/// Frames between two statistics log lines.
const REPORT_EVERY: u64 = 600;

#[derive(Debug, Default)]
pub struct StatsOverlay {
    frames: u64,
    draws: u64,
    pipeline_binds: u64,
    skipped: u64,
    last: DrawStats,
}

impl StatsOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Statistics of the most recent frame.
    pub fn last(&self) -> DrawStats {
        self.last
    }

    /// Average draws per frame since start.
    pub fn average_draws(&self) -> f64 {
        if self.frames == 0 {
            0.0
        } else {
            self.draws as f64 / self.frames as f64
        }
    }
}

impl Overlay for StatsOverlay {
    fn handle_event(&mut self, event: &WindowEvent) -> bool {
        if let WindowEvent::Focused(focused) = event {
            debug!("Window focus changed: {}", focused);
        }
        false
    }

    fn record(&mut self, _recorder: &mut dyn CommandRecorder, _render_pass: vk::RenderPass) {}

    fn frame_complete(&mut self, frame_number: u64, stats: &DrawStats) {
        self.frames += 1;
        self.draws += u64::from(stats.draws);
        self.pipeline_binds += u64::from(stats.pipeline_binds);
        self.skipped += u64::from(stats.skipped);
        self.last = *stats;

        if frame_number % REPORT_EVERY == 0 {
            info!(
                "Frame {}: {} draws, {} pipeline binds, {} vertex binds; totals {} binds, {} skipped",
                frame_number,
                stats.draws,
                stats.pipeline_binds,
                stats.vertex_binds,
                self.pipeline_binds,
                self.skipped
            );
        }
    }
}
