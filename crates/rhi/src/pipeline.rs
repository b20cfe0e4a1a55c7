//! Graphics pipelines.
//!
//! A [`GraphicsPipelineBuilder`] collects the fixed-function state of a
//! pipeline that renders into one subpass of a classic render pass. The
//! viewport and scissor are static and cover the builder's extent, so a
//! pipeline is tied to the swapchain size it was built for.
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use ash::vk;
//! use lumen_rhi::device::Device;
//! use lumen_rhi::pipeline::{GraphicsPipelineBuilder, PipelineLayout};
//! use lumen_rhi::shader::{Shader, ShaderStage};
//!
//! # fn example(device: Arc<Device>, pass: vk::RenderPass) -> Result<(), lumen_rhi::RhiError> {
//! let vs = Shader::from_spirv_file(device.clone(), Path::new("shaders/tri_mesh_ssbo.vert.spv"), ShaderStage::Vertex)?;
//! let fs = Shader::from_spirv_file(device.clone(), Path::new("shaders/default_lit.frag.spv"), ShaderStage::Fragment)?;
//! let layout = PipelineLayout::new(device.clone(), &[], &[])?;
//! let pipeline = GraphicsPipelineBuilder::new()
//!     .vertex_shader(&vs)
//!     .fragment_shader(&fs)
//!     .render_pass(pass)
//!     .extent(vk::Extent2D { width: 1700, height: 900 })
//!     .build(device, &layout)?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::shader::Shader;
use crate::vertex::Vertex;

/// Set layouts plus push constant ranges shared by a family of pipelines.
pub struct PipelineLayout {
    device: Arc<Device>,
    layout: vk::PipelineLayout,
}

impl PipelineLayout {
    /// `set_layouts` are given in set-index order.
    ///
    /// # Errors
    ///
    /// Returns the Vulkan error if creation fails.
    pub fn new(
        device: Arc<Device>,
        set_layouts: &[vk::DescriptorSetLayout],
        push_ranges: &[vk::PushConstantRange],
    ) -> RhiResult<Self> {
        let info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(set_layouts)
            .push_constant_ranges(push_ranges);
        let layout = unsafe { device.handle().create_pipeline_layout(&info, None)? };
        debug!(
            "Pipeline layout: {} set(s), {} push range(s)",
            set_layouts.len(),
            push_ranges.len()
        );
        Ok(Self { device, layout })
    }

    #[inline]
    pub fn handle(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        unsafe { self.device.handle().destroy_pipeline_layout(self.layout, None) };
    }
}

/// A compiled graphics pipeline.
pub struct Pipeline {
    device: Arc<Device>,
    pipeline: vk::Pipeline,
}

impl Pipeline {
    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        unsafe { self.device.handle().destroy_pipeline(self.pipeline, None) };
        debug!("Graphics pipeline destroyed");
    }
}

/// Fixed-function state for a graphics pipeline.
///
/// Starts from: [`Vertex`] input, triangle list, filled polygons, no culling,
/// clockwise front faces, single sampling, depth test and write with
/// `LESS_OR_EQUAL`, blending off.
pub struct GraphicsPipelineBuilder<'a> {
    vertex_shader: Option<&'a Shader>,
    fragment_shader: Option<&'a Shader>,
    bindings: Vec<vk::VertexInputBindingDescription>,
    attributes: Vec<vk::VertexInputAttributeDescription>,
    topology: vk::PrimitiveTopology,
    polygon_mode: vk::PolygonMode,
    cull_mode: vk::CullModeFlags,
    front_face: vk::FrontFace,
    // `None` disables depth testing and writing.
    depth_op: Option<vk::CompareOp>,
    render_pass: vk::RenderPass,
    subpass: u32,
    extent: vk::Extent2D,
}

impl Default for GraphicsPipelineBuilder<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> GraphicsPipelineBuilder<'a> {
    pub fn new() -> Self {
        Self {
            vertex_shader: None,
            fragment_shader: None,
            bindings: vec![Vertex::binding_description()],
            attributes: Vertex::attribute_descriptions().to_vec(),
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::NONE,
            front_face: vk::FrontFace::CLOCKWISE,
            depth_op: Some(vk::CompareOp::LESS_OR_EQUAL),
            render_pass: vk::RenderPass::null(),
            subpass: 0,
            extent: vk::Extent2D::default(),
        }
    }

    pub fn vertex_shader(mut self, shader: &'a Shader) -> Self {
        self.vertex_shader = Some(shader);
        self
    }

    pub fn fragment_shader(mut self, shader: &'a Shader) -> Self {
        self.fragment_shader = Some(shader);
        self
    }

    /// Replaces the default [`Vertex`] input layout.
    pub fn vertex_input(
        mut self,
        bindings: &[vk::VertexInputBindingDescription],
        attributes: &[vk::VertexInputAttributeDescription],
    ) -> Self {
        self.bindings = bindings.to_vec();
        self.attributes = attributes.to_vec();
        self
    }

    pub fn topology(mut self, topology: vk::PrimitiveTopology) -> Self {
        self.topology = topology;
        self
    }

    pub fn polygon_mode(mut self, mode: vk::PolygonMode) -> Self {
        self.polygon_mode = mode;
        self
    }

    pub fn cull(mut self, mode: vk::CullModeFlags, front_face: vk::FrontFace) -> Self {
        self.cull_mode = mode;
        self.front_face = front_face;
        self
    }

    /// `Some(op)` tests and writes depth with `op`; `None` turns depth off.
    pub fn depth(mut self, op: Option<vk::CompareOp>) -> Self {
        self.depth_op = op;
        self
    }

    pub fn render_pass(mut self, render_pass: vk::RenderPass) -> Self {
        self.render_pass = render_pass;
        self
    }

    pub fn subpass(mut self, subpass: u32) -> Self {
        self.subpass = subpass;
        self
    }

    pub fn extent(mut self, extent: vk::Extent2D) -> Self {
        self.extent = extent;
        self
    }

    fn viewport(&self) -> vk::Viewport {
        vk::Viewport::default()
            .width(self.extent.width as f32)
            .height(self.extent.height as f32)
            .max_depth(1.0)
    }

    fn scissor(&self) -> vk::Rect2D {
        vk::Rect2D::default().extent(self.extent)
    }

    fn validate(&self) -> RhiResult<(&'a Shader, &'a Shader)> {
        let missing = |what: &str| RhiError::PipelineError(format!("{what} is required"));
        let vertex = self.vertex_shader.ok_or_else(|| missing("Vertex shader"))?;
        let fragment = self.fragment_shader.ok_or_else(|| missing("Fragment shader"))?;
        if self.render_pass == vk::RenderPass::null() {
            return Err(missing("A render pass"));
        }
        if self.extent.width == 0 || self.extent.height == 0 {
            return Err(RhiError::PipelineError(format!(
                "Viewport extent must be non-zero, got {}x{}",
                self.extent.width, self.extent.height
            )));
        }
        Ok((vertex, fragment))
    }

    /// Creates the pipeline against `layout`.
    ///
    /// # Errors
    ///
    /// [`RhiError::PipelineError`] when a shader, the render pass or the
    /// extent is missing; the Vulkan error when creation fails.
    pub fn build(self, device: Arc<Device>, layout: &PipelineLayout) -> RhiResult<Pipeline> {
        let (vertex, fragment) = self.validate()?;
        let stages = [vertex.stage_create_info(), fragment.stage_create_info()];

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&self.bindings)
            .vertex_attribute_descriptions(&self.attributes);
        let input_assembly =
            vk::PipelineInputAssemblyStateCreateInfo::default().topology(self.topology);

        let viewports = [self.viewport()];
        let scissors = [self.scissor()];
        let viewport = vk::PipelineViewportStateCreateInfo::default()
            .viewports(&viewports)
            .scissors(&scissors);

        let raster = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(self.polygon_mode)
            .cull_mode(self.cull_mode)
            .front_face(self.front_face)
            .line_width(1.0);
        let multisample = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1)
            .min_sample_shading(1.0);

        let depth_enabled = self.depth_op.is_some();
        let depth = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(depth_enabled)
            .depth_write_enable(depth_enabled)
            .depth_compare_op(self.depth_op.unwrap_or(vk::CompareOp::ALWAYS))
            .max_depth_bounds(1.0);

        let blend_attachments = [vk::PipelineColorBlendAttachmentState::default()
            .color_write_mask(vk::ColorComponentFlags::RGBA)];
        let blend = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op(vk::LogicOp::COPY)
            .attachments(&blend_attachments);

        let info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport)
            .rasterization_state(&raster)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth)
            .color_blend_state(&blend)
            .layout(layout.handle())
            .render_pass(self.render_pass)
            .subpass(self.subpass);

        let created = unsafe {
            device.handle().create_graphics_pipelines(
                vk::PipelineCache::null(),
                std::slice::from_ref(&info),
                None,
            )
        };
        let pipeline = created
            .map_err(|(_, result)| RhiError::from(result))?
            .into_iter()
            .next()
            .ok_or_else(|| RhiError::PipelineError("Driver returned no pipeline".to_string()))?;

        info!(
            "Graphics pipeline created ({}x{}, {:?})",
            self.extent.width, self.extent.height, self.topology
        );
        Ok(Pipeline { device, pipeline })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sized() -> GraphicsPipelineBuilder<'static> {
        GraphicsPipelineBuilder::new().extent(vk::Extent2D {
            width: 1700,
            height: 900,
        })
    }

    #[test]
    fn test_defaults_draw_mesh_vertices_with_depth() {
        let builder = GraphicsPipelineBuilder::new();
        assert_eq!(builder.bindings.len(), 1);
        assert_eq!(builder.attributes.len(), 4);
        assert_eq!(builder.topology, vk::PrimitiveTopology::TRIANGLE_LIST);
        assert_eq!(builder.cull_mode, vk::CullModeFlags::NONE);
        assert_eq!(builder.depth_op, Some(vk::CompareOp::LESS_OR_EQUAL));
    }

    #[test]
    fn test_viewport_covers_extent() {
        let builder = sized();
        let viewport = builder.viewport();
        assert_eq!((viewport.x, viewport.y), (0.0, 0.0));
        assert_eq!((viewport.width, viewport.height), (1700.0, 900.0));
        assert_eq!((viewport.min_depth, viewport.max_depth), (0.0, 1.0));
        let scissor = builder.scissor();
        assert_eq!(scissor.offset.x, 0);
        assert_eq!(scissor.extent.height, 900);
    }

    #[test]
    fn test_overrides_replace_state() {
        let builder = sized()
            .topology(vk::PrimitiveTopology::LINE_LIST)
            .cull(vk::CullModeFlags::BACK, vk::FrontFace::COUNTER_CLOCKWISE)
            .depth(None)
            .vertex_input(&[], &[]);
        assert_eq!(builder.topology, vk::PrimitiveTopology::LINE_LIST);
        assert_eq!(builder.front_face, vk::FrontFace::COUNTER_CLOCKWISE);
        assert!(builder.depth_op.is_none());
        assert!(builder.bindings.is_empty());
    }

    #[test]
    fn test_validation_reports_missing_pieces() {
        let err = sized().validate().err();
        assert!(matches!(err, Some(RhiError::PipelineError(msg)) if msg.contains("Vertex")));

        let unsized_builder = GraphicsPipelineBuilder::new();
        assert!(unsized_builder.validate().is_err());
    }

    #[test]
    fn test_build_without_shaders_fails() {
        let Some(gpu) = crate::testing::headless_gpu() else {
            return;
        };
        let layout = PipelineLayout::new(Arc::clone(&gpu.device), &[], &[]).unwrap();
        let result = sized().build(Arc::clone(&gpu.device), &layout);
        assert!(matches!(result, Err(RhiError::PipelineError(_))));
    }
}
