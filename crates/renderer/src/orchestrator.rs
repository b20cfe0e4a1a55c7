//! The frame orchestrator: one pass through the frame state machine per call.
//!
//! ```text
//! Idle -> Acquiring -> Recording -> Submitted -> Presenting -> Idle
//! ```
//!
//! - Acquiring: wait on the slot's fence, then acquire the next swapchain
//!   image. Per-frame buffers are written only after the wait.
//! - Recording: begin the render pass on the acquired image's framebuffer,
//!   record the batched draws and the overlay, end the render pass.
//! - Submitted: queue the commands, waiting on the image-acquired semaphore.
//! - Presenting: present once rendering has finished.
//!
//! The frame counter advances only after a successful present. An error
//! leaves [`FrameOrchestrator::phase`] at the phase that failed.
//!
//! The GPU side sits behind [`FrameBackend`], so the state machine runs
//! against a mock in tests.

use ash::vk;
use tracing::warn;

use lumen_rhi::command::CommandRecorder;
use lumen_scene::environment::ANIMATION_PERIOD_FRAMES;
use lumen_scene::{Camera, Registry, SceneParameters};

use crate::descriptors::FrameSets;
use crate::draw::{DrawStats, FrameBindings, object_data, record_draws};
use crate::error::RenderResult;
use crate::frame::{scene_offset, slot_index};
use crate::overlay::Overlay;
use crate::ubo::{GpuCameraData, GpuObjectData};

/// Where in the frame state machine the orchestrator is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FramePhase {
    #[default]
    Idle,
    Acquiring,
    Recording,
    Submitted,
    Presenting,
}

/// The framebuffer a frame renders into.
#[derive(Debug, Clone, Copy)]
pub struct RenderTarget {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub extent: vk::Extent2D,
}

/// Data written into a slot's buffers before recording.
#[derive(Debug, Clone, Copy)]
pub struct FrameData<'a> {
    pub camera: GpuCameraData,
    pub scene: SceneParameters,
    /// Where `scene` goes in the shared scene buffer.
    pub scene_offset: vk::DeviceSize,
    pub objects: &'a [GpuObjectData],
}

/// Per-slot GPU operations the orchestrator drives.
pub trait FrameBackend {
    /// Blocks until the slot's previous submission has finished. Must not
    /// reset the fence: a frame that fails before [`FrameBackend::submit`]
    /// has to leave the slot waitable.
    fn wait_for_slot(&mut self, slot: usize) -> RenderResult<()>;

    /// Acquires the next presentable image, signalling the slot's
    /// image-acquired semaphore. Returns the image index.
    fn acquire_image(&mut self, slot: usize) -> RenderResult<u32>;

    /// Writes camera, scene and object data for the slot.
    fn write_frame_data(&mut self, slot: usize, data: &FrameData<'_>) -> RenderResult<()>;

    fn frame_sets(&self, slot: usize) -> FrameSets;

    /// Scene parameter stride in the shared scene buffer.
    fn padded_scene_size(&self) -> vk::DeviceSize;

    /// Object buffer capacity per slot.
    fn max_objects(&self) -> usize;

    fn render_target(&self, image_index: u32) -> RenderResult<RenderTarget>;

    /// Resets the slot's command buffer and begins recording into it.
    fn begin_commands(&mut self, slot: usize) -> RenderResult<&mut dyn CommandRecorder>;

    /// Ends recording, resets the slot's fence and submits the slot's
    /// commands.
    fn submit(&mut self, slot: usize) -> RenderResult<()>;

    fn present(&mut self, slot: usize, image_index: u32) -> RenderResult<()>;
}

/// Clear values for frame `frame_number`: colour, then depth 1.0.
///
/// With `flash` the blue channel pulses as `|sin(f / 120)|`.
pub fn clear_values(frame_number: u64, flash: bool) -> [vk::ClearValue; 2] {
    let blue = if flash {
        (frame_number as f32 / ANIMATION_PERIOD_FRAMES).sin().abs()
    } else {
        0.0
    };
    [
        vk::ClearValue {
            color: vk::ClearColorValue {
                float32: [0.0, 0.0, blue, 1.0],
            },
        },
        vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue {
                depth: 1.0,
                stencil: 0,
            },
        },
    ]
}

/// Drives frames through a [`FrameBackend`].
#[derive(Debug, Default)]
pub struct FrameOrchestrator {
    frame_number: u64,
    phase: FramePhase,
    scene: SceneParameters,
    clear_flash: bool,
}

impl FrameOrchestrator {
    pub fn new(clear_flash: bool) -> Self {
        Self {
            clear_flash,
            ..Self::default()
        }
    }

    /// Frames presented so far.
    #[inline]
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    #[inline]
    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    #[inline]
    pub fn scene(&self) -> &SceneParameters {
        &self.scene
    }

    /// Renders one frame of `registry` seen through `camera`.
    ///
    /// # Errors
    ///
    /// Returns the first backend error. Nothing is retried.
    pub fn draw_frame<B: FrameBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        registry: &Registry,
        camera: &Camera,
        mut overlay: Option<&mut dyn Overlay>,
    ) -> RenderResult<DrawStats> {
        let slot = slot_index(self.frame_number);
        if let Some(overlay) = overlay.as_deref_mut() {
            overlay.prepare();
        }

        // ====== Acquiring ======
        self.phase = FramePhase::Acquiring;
        backend.wait_for_slot(slot)?;
        let image_index = backend.acquire_image(slot)?;

        // The slot's buffers are no longer read by the GPU.
        self.scene.animate(self.frame_number);
        let max_objects = backend.max_objects();
        let objects = object_data(registry.renderables(), max_objects);
        let offset = scene_offset(slot, backend.padded_scene_size());
        backend.write_frame_data(
            slot,
            &FrameData {
                camera: GpuCameraData::from_camera(camera),
                scene: self.scene,
                scene_offset: offset,
                objects: &objects,
            },
        )?;

        // ====== Recording ======
        self.phase = FramePhase::Recording;
        let target = backend.render_target(image_index)?;
        let bindings = FrameBindings {
            sets: backend.frame_sets(slot),
            scene_offset: offset as u32,
        };
        let clear = clear_values(self.frame_number, self.clear_flash);

        let stats = {
            let cmd = backend.begin_commands(slot)?;
            cmd.begin_render_pass(target.render_pass, target.framebuffer, target.extent, &clear);
            let stats = record_draws(
                cmd,
                registry,
                &bindings,
                camera.view_projection_matrix(),
                max_objects,
            );
            if let Some(overlay) = overlay.as_deref_mut() {
                overlay.record(cmd, target.render_pass);
            }
            cmd.end_render_pass();
            stats
        };
        if stats.skipped > 0 {
            warn!(
                "Frame {}: {} renderable(s) not drawn (object capacity {})",
                self.frame_number, stats.skipped, max_objects
            );
        }

        // ====== Submitted ======
        self.phase = FramePhase::Submitted;
        backend.submit(slot)?;

        // ====== Presenting ======
        self.phase = FramePhase::Presenting;
        backend.present(slot, image_index)?;

        self.phase = FramePhase::Idle;
        if let Some(overlay) = overlay {
            overlay.frame_complete(self.frame_number, &stats);
        }
        self.frame_number += 1;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RenderError;
    use crate::frame::FRAME_OVERLAP;
    use crate::testing::{Command, MockRecorder, test_registry};
    use glam::Mat4;
    use lumen_rhi::RhiError;
    use lumen_scene::RenderObject;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Wait(usize),
        Acquire(usize),
        Write { slot: usize, offset: u64, objects: usize },
        Begin(usize),
        Submit(usize),
        Present(usize, u32),
    }

    struct MockBackend {
        calls: Vec<Call>,
        recorder: MockRecorder,
        padded_scene_size: vk::DeviceSize,
        max_objects: usize,
        image_count: u32,
        next_image: u32,
        extent: vk::Extent2D,
        fail_acquire: bool,
    }

    impl MockBackend {
        fn new() -> Self {
            Self {
                calls: Vec::new(),
                recorder: MockRecorder::default(),
                padded_scene_size: 256,
                max_objects: 10_000,
                image_count: 3,
                next_image: 0,
                extent: vk::Extent2D {
                    width: 1,
                    height: 1,
                },
                fail_acquire: false,
            }
        }

        fn waited_slots(&self) -> Vec<usize> {
            self.calls
                .iter()
                .filter_map(|c| match c {
                    Call::Wait(slot) => Some(*slot),
                    _ => None,
                })
                .collect()
        }
    }

    impl FrameBackend for MockBackend {
        fn wait_for_slot(&mut self, slot: usize) -> RenderResult<()> {
            self.calls.push(Call::Wait(slot));
            Ok(())
        }

        fn acquire_image(&mut self, slot: usize) -> RenderResult<u32> {
            if self.fail_acquire {
                return Err(RhiError::Timeout {
                    what: "swapchain image acquire",
                    timeout_ns: 1_000_000_000,
                }
                .into());
            }
            self.calls.push(Call::Acquire(slot));
            let image = self.next_image;
            self.next_image = (self.next_image + 1) % self.image_count;
            Ok(image)
        }

        fn write_frame_data(&mut self, slot: usize, data: &FrameData<'_>) -> RenderResult<()> {
            self.calls.push(Call::Write {
                slot,
                offset: data.scene_offset,
                objects: data.objects.len(),
            });
            Ok(())
        }

        fn frame_sets(&self, _slot: usize) -> FrameSets {
            FrameSets {
                global: vk::DescriptorSet::null(),
                object: vk::DescriptorSet::null(),
            }
        }

        fn padded_scene_size(&self) -> vk::DeviceSize {
            self.padded_scene_size
        }

        fn max_objects(&self) -> usize {
            self.max_objects
        }

        fn render_target(&self, image_index: u32) -> RenderResult<RenderTarget> {
            if image_index >= self.image_count {
                return Err(RenderError::NoFramebuffer(image_index));
            }
            Ok(RenderTarget {
                render_pass: vk::RenderPass::null(),
                framebuffer: vk::Framebuffer::null(),
                extent: self.extent,
            })
        }

        fn begin_commands(&mut self, slot: usize) -> RenderResult<&mut dyn CommandRecorder> {
            self.calls.push(Call::Begin(slot));
            Ok(&mut self.recorder)
        }

        fn submit(&mut self, slot: usize) -> RenderResult<()> {
            self.calls.push(Call::Submit(slot));
            Ok(())
        }

        fn present(&mut self, slot: usize, image_index: u32) -> RenderResult<()> {
            self.calls.push(Call::Present(slot, image_index));
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingOverlay {
        prepared: u32,
        recorded: u32,
        completed: Vec<u64>,
    }

    impl Overlay for CountingOverlay {
        fn prepare(&mut self) {
            self.prepared += 1;
        }

        fn record(&mut self, recorder: &mut dyn CommandRecorder, _render_pass: vk::RenderPass) {
            self.recorded += 1;
            recorder.draw(6, 1, 0, 0);
        }

        fn frame_complete(&mut self, frame_number: u64, _stats: &DrawStats) {
            self.completed.push(frame_number);
        }
    }

    fn registry_with_triangle() -> Registry {
        let mut registry = test_registry();
        let mesh = registry.mesh_id("triangle").unwrap();
        let material = registry.material_id("defaultmesh").unwrap();
        registry
            .add_renderable(RenderObject {
                mesh,
                material,
                transform: Mat4::IDENTITY,
            })
            .unwrap();
        registry
    }

    #[test]
    fn test_slot_rotation_over_six_frames() {
        let mut backend = MockBackend::new();
        let mut orchestrator = FrameOrchestrator::new(true);
        let registry = registry_with_triangle();
        let camera = Camera::default();

        for _ in 0..6 {
            orchestrator
                .draw_frame(&mut backend, &registry, &camera, None)
                .unwrap();
        }

        assert_eq!(backend.waited_slots(), [0, 1, 0, 1, 0, 1]);
        assert_eq!(orchestrator.frame_number(), 6);
        assert_eq!(orchestrator.phase(), FramePhase::Idle);
    }

    #[test]
    fn test_scene_offsets_follow_slot() {
        let mut backend = MockBackend::new();
        let mut orchestrator = FrameOrchestrator::new(false);
        let registry = registry_with_triangle();

        for _ in 0..4 {
            orchestrator
                .draw_frame(&mut backend, &registry, &Camera::default(), None)
                .unwrap();
        }

        let offsets: Vec<u64> = backend
            .calls
            .iter()
            .filter_map(|c| match c {
                Call::Write { offset, .. } => Some(*offset),
                _ => None,
            })
            .collect();
        assert_eq!(offsets, [0, 256, 0, 256]);
        assert!(offsets.iter().all(|o| o % 256 == 0));
    }

    #[test]
    fn test_phase_order_within_frame() {
        let mut backend = MockBackend::new();
        let mut orchestrator = FrameOrchestrator::new(true);
        let registry = registry_with_triangle();

        orchestrator
            .draw_frame(&mut backend, &registry, &Camera::default(), None)
            .unwrap();

        assert_eq!(
            backend.calls,
            [
                Call::Wait(0),
                Call::Acquire(0),
                Call::Write {
                    slot: 0,
                    offset: 0,
                    objects: 1
                },
                Call::Begin(0),
                Call::Submit(0),
                Call::Present(0, 0),
            ]
        );
    }

    #[test]
    fn test_single_triangle_one_pixel_frame() {
        let mut backend = MockBackend::new();
        let mut orchestrator = FrameOrchestrator::new(true);
        let registry = registry_with_triangle();

        let stats = orchestrator
            .draw_frame(&mut backend, &registry, &Camera::default(), None)
            .unwrap();

        assert_eq!(stats.draws, 1);
        assert_eq!(backend.recorder.draws(), [(3, 1, 0, 0)]);
        assert_eq!(
            backend.recorder.commands.first(),
            Some(&Command::BeginRenderPass {
                extent: vk::Extent2D {
                    width: 1,
                    height: 1
                },
                clear_values: 2,
            })
        );
        assert_eq!(
            backend.recorder.commands.last(),
            Some(&Command::EndRenderPass)
        );
    }

    #[test]
    fn test_acquire_failure_stops_frame() {
        let mut backend = MockBackend::new();
        backend.fail_acquire = true;
        let mut orchestrator = FrameOrchestrator::new(true);
        let registry = registry_with_triangle();

        let result = orchestrator.draw_frame(&mut backend, &registry, &Camera::default(), None);

        assert!(matches!(
            result,
            Err(RenderError::Rhi(RhiError::Timeout { .. }))
        ));
        assert_eq!(orchestrator.phase(), FramePhase::Acquiring);
        assert_eq!(orchestrator.frame_number(), 0);
        assert_eq!(backend.calls, [Call::Wait(0)]);
        assert!(backend.recorder.commands.is_empty());
    }

    #[test]
    fn test_missing_framebuffer_is_an_error() {
        let mut backend = MockBackend::new();
        backend.image_count = 1;
        backend.next_image = 5;
        let mut orchestrator = FrameOrchestrator::new(true);

        let result =
            orchestrator.draw_frame(&mut backend, &Registry::new(), &Camera::default(), None);
        assert!(matches!(result, Err(RenderError::NoFramebuffer(5))));
        assert_eq!(orchestrator.phase(), FramePhase::Recording);
    }

    #[test]
    fn test_overlay_records_inside_render_pass_after_draws() {
        let mut backend = MockBackend::new();
        let mut orchestrator = FrameOrchestrator::new(true);
        let registry = registry_with_triangle();
        let mut overlay = CountingOverlay::default();

        for _ in 0..FRAME_OVERLAP {
            orchestrator
                .draw_frame(&mut backend, &registry, &Camera::default(), Some(&mut overlay))
                .unwrap();
        }

        assert_eq!(overlay.prepared, 2);
        assert_eq!(overlay.recorded, 2);
        assert_eq!(overlay.completed, [0, 1]);

        let commands = &backend.recorder.commands;
        let end = commands
            .iter()
            .position(|c| *c == Command::EndRenderPass)
            .unwrap();
        assert_eq!(
            commands[end - 1],
            Command::Draw {
                vertex_count: 6,
                instance_count: 1,
                first_vertex: 0,
                first_instance: 0
            }
        );
        assert_eq!(
            commands[end - 2],
            Command::Draw {
                vertex_count: 3,
                instance_count: 1,
                first_vertex: 0,
                first_instance: 0
            }
        );
    }

    #[test]
    fn test_object_capacity_truncates_writes() {
        let mut backend = MockBackend::new();
        backend.max_objects = 2;
        let mut orchestrator = FrameOrchestrator::new(true);
        let mut registry = registry_with_triangle();
        let first = registry.renderables()[0];
        for _ in 0..4 {
            registry.add_renderable(first).unwrap();
        }

        let stats = orchestrator
            .draw_frame(&mut backend, &registry, &Camera::default(), None)
            .unwrap();
        assert_eq!(stats.draws, 2);
        assert_eq!(stats.skipped, 3);
        assert!(backend.calls.contains(&Call::Write {
            slot: 0,
            offset: 0,
            objects: 2
        }));
    }

    #[test]
    fn test_scene_ambient_animates() {
        let mut backend = MockBackend::new();
        let mut orchestrator = FrameOrchestrator::new(true);
        let registry = Registry::new();
        for _ in 0..121 {
            orchestrator
                .draw_frame(&mut backend, &registry, &Camera::default(), None)
                .unwrap();
        }
        // Last frame drawn was frame 120.
        approx::assert_relative_eq!(orchestrator.scene().ambient_color.x, 1.0f32.sin());
    }

    #[test]
    fn test_clear_values() {
        let [color, depth] = clear_values(0, true);
        unsafe {
            assert_eq!(color.color.float32, [0.0, 0.0, 0.0, 1.0]);
            assert_eq!(depth.depth_stencil.depth, 1.0);
        }

        let [color, _] = clear_values(120, true);
        unsafe {
            approx::assert_relative_eq!(color.color.float32[2], 1.0f32.sin());
        }

        let [color, _] = clear_values(120, false);
        unsafe {
            assert_eq!(color.color.float32, [0.0, 0.0, 0.0, 1.0]);
        }
    }
}
