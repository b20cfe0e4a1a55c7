//! Render pass and framebuffer wrappers.
//!
//! The engine uses one single-subpass render pass with a color attachment
//! (presented afterwards) and a depth attachment, and one framebuffer per
//! swapchain image sharing the same depth view. [`RenderPass::offscreen`]
//! is the same pass for a color image that is read back instead.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::RhiResult;

/// Vulkan render pass wrapper.
pub struct RenderPass {
    device: Arc<Device>,
    render_pass: vk::RenderPass,
}

/// Attachment descriptions for `[color, depth]`.
///
/// Both clear on load and store; color goes `UNDEFINED -> color_final`,
/// depth ends in `DEPTH_STENCIL_ATTACHMENT_OPTIMAL`.
fn attachments(
    color_format: vk::Format,
    depth_format: vk::Format,
    color_final: vk::ImageLayout,
) -> [vk::AttachmentDescription; 2] {
    let color = vk::AttachmentDescription::default()
        .format(color_format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(color_final);

    let depth = vk::AttachmentDescription::default()
        .format(depth_format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::CLEAR)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);

    [color, depth]
}

/// External-to-subpass dependencies: color output waits on earlier color
/// writes, depth tests wait on earlier depth writes.
fn dependencies() -> [vk::SubpassDependency; 2] {
    let color = vk::SubpassDependency::default()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE);

    let fragment_tests = vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
        | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS;
    let depth = vk::SubpassDependency::default()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(fragment_tests)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_stage_mask(fragment_tests)
        .dst_access_mask(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE);

    [color, depth]
}

impl RenderPass {
    /// Creates the color + depth render pass for swapchain images.
    ///
    /// # Errors
    ///
    /// Returns an error if render pass creation fails.
    pub fn new(
        device: Arc<Device>,
        color_format: vk::Format,
        depth_format: vk::Format,
    ) -> RhiResult<Self> {
        Self::with_color_layout(
            device,
            color_format,
            depth_format,
            vk::ImageLayout::PRESENT_SRC_KHR,
        )
    }

    /// Like [`RenderPass::new`], but leaves the color attachment in
    /// `TRANSFER_SRC_OPTIMAL`. Needs no swapchain extension.
    ///
    /// # Errors
    ///
    /// Returns an error if render pass creation fails.
    pub fn offscreen(
        device: Arc<Device>,
        color_format: vk::Format,
        depth_format: vk::Format,
    ) -> RhiResult<Self> {
        Self::with_color_layout(
            device,
            color_format,
            depth_format,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        )
    }

    fn with_color_layout(
        device: Arc<Device>,
        color_format: vk::Format,
        depth_format: vk::Format,
        color_final: vk::ImageLayout,
    ) -> RhiResult<Self> {
        let attachments = attachments(color_format, depth_format, color_final);
        let dependencies = dependencies();

        let color_refs = [vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }];
        let depth_ref = vk::AttachmentReference {
            attachment: 1,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        };
        let subpasses = [vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs)
            .depth_stencil_attachment(&depth_ref)];

        let create_info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        let render_pass = unsafe { device.handle().create_render_pass(&create_info, None)? };
        info!(
            "Render pass created (color {:?}, depth {:?})",
            color_format, depth_format
        );

        Ok(Self {
            device,
            render_pass,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::RenderPass {
        self.render_pass
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_render_pass(self.render_pass, None);
        }
        info!("Render pass destroyed");
    }
}

/// Vulkan framebuffer wrapper.
pub struct Framebuffer {
    device: Arc<Device>,
    framebuffer: vk::Framebuffer,
}

impl Framebuffer {
    /// Creates a framebuffer over `attachments` (in render pass attachment
    /// order).
    ///
    /// # Errors
    ///
    /// Returns an error if framebuffer creation fails.
    pub fn new(
        device: Arc<Device>,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> RhiResult<Self> {
        let create_info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass)
            .attachments(attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        let framebuffer = unsafe { device.handle().create_framebuffer(&create_info, None)? };
        debug!("Framebuffer created ({}x{})", extent.width, extent.height);

        Ok(Self {
            device,
            framebuffer,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::Framebuffer {
        self.framebuffer
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_framebuffer(self.framebuffer, None);
        }
        debug!("Framebuffer destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::headless_gpu;

    #[test]
    fn test_attachment_layouts() {
        let [color, depth] = attachments(
            vk::Format::B8G8R8A8_SRGB,
            vk::Format::D32_SFLOAT,
            vk::ImageLayout::PRESENT_SRC_KHR,
        );

        assert_eq!(color.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(color.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(color.store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(color.initial_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(color.final_layout, vk::ImageLayout::PRESENT_SRC_KHR);

        assert_eq!(depth.format, vk::Format::D32_SFLOAT);
        assert_eq!(depth.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(
            depth.final_layout,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        );
    }

    #[test]
    fn test_offscreen_color_layout() {
        let [color, _] = attachments(
            vk::Format::R8G8B8A8_UNORM,
            vk::Format::D32_SFLOAT,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        );
        assert_eq!(color.final_layout, vk::ImageLayout::TRANSFER_SRC_OPTIMAL);
    }

    #[test]
    fn test_dependencies() {
        let [color, depth] = dependencies();
        assert_eq!(color.src_subpass, vk::SUBPASS_EXTERNAL);
        assert_eq!(color.dst_subpass, 0);
        assert_eq!(
            color.dst_access_mask,
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE
        );
        assert!(
            depth
                .dst_stage_mask
                .contains(vk::PipelineStageFlags::LATE_FRAGMENT_TESTS)
        );
        assert_eq!(
            depth.dst_access_mask,
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE
        );
    }

    #[test]
    fn test_render_pass_creation() {
        let Some(gpu) = headless_gpu() else { return };
        // Headless devices have no swapchain extension.
        let render_pass = RenderPass::offscreen(
            Arc::clone(&gpu.device),
            vk::Format::R8G8B8A8_UNORM,
            vk::Format::D32_SFLOAT,
        )
        .unwrap();
        assert_ne!(render_pass.handle(), vk::RenderPass::null());
    }
}
