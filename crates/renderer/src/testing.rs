//! Test doubles for recording and registry setup without a GPU.

use ash::vk;
use lumen_rhi::command::CommandRecorder;
use lumen_rhi::memory::AllocatedBuffer;
use lumen_rhi::vertex::Vertex;
use lumen_scene::{Material, Mesh, Registry};

/// One recorded command.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Command {
    BeginRenderPass {
        extent: vk::Extent2D,
        clear_values: usize,
    },
    EndRenderPass,
    BindPipeline(vk::Pipeline),
    BindSets {
        first_set: u32,
        count: usize,
        dynamic_offsets: Vec<u32>,
    },
    BindVertexBuffer(vk::Buffer),
    PushConstants {
        offset: u32,
        bytes: Vec<u8>,
    },
    Draw {
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    },
}

/// Records every call instead of talking to Vulkan.
#[derive(Debug, Default)]
pub(crate) struct MockRecorder {
    pub commands: Vec<Command>,
}

impl MockRecorder {
    pub fn count(&self, predicate: impl Fn(&Command) -> bool) -> usize {
        self.commands.iter().filter(|c| predicate(c)).count()
    }

    /// `(vertex_count, instance_count, first_vertex, first_instance)` per draw.
    pub fn draws(&self) -> Vec<(u32, u32, u32, u32)> {
        self.commands
            .iter()
            .filter_map(|c| match *c {
                Command::Draw {
                    vertex_count,
                    instance_count,
                    first_vertex,
                    first_instance,
                } => Some((vertex_count, instance_count, first_vertex, first_instance)),
                _ => None,
            })
            .collect()
    }
}

impl CommandRecorder for MockRecorder {
    fn begin_render_pass(
        &mut self,
        _render_pass: vk::RenderPass,
        _framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
        clear_values: &[vk::ClearValue],
    ) {
        self.commands.push(Command::BeginRenderPass {
            extent,
            clear_values: clear_values.len(),
        });
    }

    fn end_render_pass(&mut self) {
        self.commands.push(Command::EndRenderPass);
    }

    fn bind_graphics_pipeline(&mut self, pipeline: vk::Pipeline) {
        self.commands.push(Command::BindPipeline(pipeline));
    }

    fn bind_graphics_descriptor_sets(
        &mut self,
        _layout: vk::PipelineLayout,
        first_set: u32,
        descriptor_sets: &[vk::DescriptorSet],
        dynamic_offsets: &[u32],
    ) {
        self.commands.push(Command::BindSets {
            first_set,
            count: descriptor_sets.len(),
            dynamic_offsets: dynamic_offsets.to_vec(),
        });
    }

    fn bind_vertex_buffer(&mut self, buffer: vk::Buffer, _offset: vk::DeviceSize) {
        self.commands.push(Command::BindVertexBuffer(buffer));
    }

    fn push_constants(
        &mut self,
        _layout: vk::PipelineLayout,
        _stages: vk::ShaderStageFlags,
        offset: u32,
        data: &[u8],
    ) {
        self.commands.push(Command::PushConstants {
            offset,
            bytes: data.to_vec(),
        });
    }

    fn draw(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) {
        self.commands.push(Command::Draw {
            vertex_count,
            instance_count,
            first_vertex,
            first_instance,
        });
    }

    fn raw_handle(&self) -> vk::CommandBuffer {
        vk::CommandBuffer::null()
    }
}

fn mesh(name: &str, vertex_count: usize) -> Mesh {
    Mesh {
        name: name.to_owned(),
        vertices: vec![Vertex::default(); vertex_count],
        vertex_buffer: AllocatedBuffer::unowned(
            vk::Buffer::null(),
            (vertex_count * Vertex::size()) as vk::DeviceSize,
        ),
    }
}

/// A registry with meshes "triangle" (3 vertices) and "quad" (6), and
/// materials "defaultmesh" and "texturedmesh" (with a texture set).
pub(crate) fn test_registry() -> Registry {
    let mut registry = Registry::new();
    registry.insert_mesh(mesh("triangle", 3)).unwrap();
    registry.insert_mesh(mesh("quad", 6)).unwrap();
    registry
        .insert_material(Material {
            name: "defaultmesh".into(),
            pipeline: vk::Pipeline::null(),
            layout: vk::PipelineLayout::null(),
            texture_set: None,
        })
        .unwrap();
    registry
        .insert_material(Material {
            name: "texturedmesh".into(),
            pipeline: vk::Pipeline::null(),
            layout: vk::PipelineLayout::null(),
            texture_set: Some(vk::DescriptorSet::null()),
        })
        .unwrap();
    registry
}
