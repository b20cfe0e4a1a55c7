//! Batched draw recording.
//!
//! Renderables are drawn in list order. State is rebound only when it
//! changes from the previous renderable:
//!
//! - material change: pipeline, set 0 (with the frame's scene offset),
//!   set 1, and set 2 when the material has a texture
//! - mesh change: vertex buffer
//!
//! Push constants are written for every draw. Draw `i` uses first instance
//! `i`, which the vertex shader turns into an index into the object buffer.

use ash::vk;
use glam::Mat4;
use tracing::trace;

use lumen_rhi::command::CommandRecorder;
use lumen_scene::{MaterialId, MeshId, Registry, RenderObject};

use crate::descriptors::{FrameSets, GLOBAL_SET, TEXTURE_SET};
use crate::ubo::{GpuObjectData, MeshPushConstants};

/// Counters for one recorded frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrawStats {
    pub draws: u32,
    /// Pipeline (and descriptor set) rebinds, one per material transition.
    pub pipeline_binds: u32,
    pub vertex_binds: u32,
    /// Renderables not drawn: beyond the object capacity, or referencing an
    /// entry the registry does not hold.
    pub skipped: u32,
}

/// Descriptor state the draws of one frame bind.
#[derive(Debug, Clone, Copy)]
pub struct FrameBindings {
    pub sets: FrameSets,
    /// Dynamic offset of this frame's scene parameters.
    pub scene_offset: u32,
}

/// Object buffer contents for `renderables`, truncated to `max_objects`.
pub fn object_data(renderables: &[RenderObject], max_objects: usize) -> Vec<GpuObjectData> {
    renderables
        .iter()
        .take(max_objects)
        .map(|object| GpuObjectData {
            model: object.transform,
        })
        .collect()
}

/// Records the draws for every renderable in `registry`.
///
/// Must be called inside a render pass. At most `max_objects` renderables
/// are drawn; the rest are counted in [`DrawStats::skipped`].
pub fn record_draws(
    cmd: &mut dyn CommandRecorder,
    registry: &Registry,
    bindings: &FrameBindings,
    view_proj: Mat4,
    max_objects: usize,
) -> DrawStats {
    let renderables = registry.renderables();
    let drawable = renderables.len().min(max_objects);
    let mut stats = DrawStats {
        skipped: (renderables.len() - drawable) as u32,
        ..DrawStats::default()
    };

    let mut last_material: Option<MaterialId> = None;
    let mut last_mesh: Option<MeshId> = None;

    for (index, object) in renderables[..drawable].iter().enumerate() {
        let (Some(material), Some(mesh)) = (
            registry.material(object.material),
            registry.mesh(object.mesh),
        ) else {
            stats.skipped += 1;
            continue;
        };

        if last_material != Some(object.material) {
            cmd.bind_graphics_pipeline(material.pipeline);
            cmd.bind_graphics_descriptor_sets(
                material.layout,
                GLOBAL_SET,
                &[bindings.sets.global, bindings.sets.object],
                &[bindings.scene_offset],
            );
            if let Some(texture_set) = material.texture_set {
                cmd.bind_graphics_descriptor_sets(material.layout, TEXTURE_SET, &[texture_set], &[]);
            }
            last_material = Some(object.material);
            stats.pipeline_binds += 1;
        }

        let push = MeshPushConstants::new(view_proj, object.transform);
        cmd.push_constants(
            material.layout,
            vk::ShaderStageFlags::VERTEX,
            0,
            bytemuck::bytes_of(&push),
        );

        if last_mesh != Some(object.mesh) {
            cmd.bind_vertex_buffer(mesh.vertex_buffer.handle(), 0);
            last_mesh = Some(object.mesh);
            stats.vertex_binds += 1;
        }

        cmd.draw(mesh.vertex_count(), 1, 0, index as u32);
        stats.draws += 1;
    }

    trace!(
        "Recorded {} draws ({} pipeline binds, {} vertex binds)",
        stats.draws, stats.pipeline_binds, stats.vertex_binds
    );
    stats
}
