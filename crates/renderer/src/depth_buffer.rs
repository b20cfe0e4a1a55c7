//! Depth buffer creation.
//!
//! The depth image lives in GPU-only memory with engine lifetime: both the
//! image and its view are released by the context's deletion queue, so
//! [`DepthBuffer`] only carries handles.
//!
//! # Example
//!
//! ```no_run
//! use lumen_rhi::memory::GpuContext;
//! use lumen_rhi::vk;
//! use lumen_renderer::depth_buffer::DepthBuffer;
//!
//! # fn example(ctx: &mut GpuContext) -> Result<(), lumen_rhi::RhiError> {
//! let depth = DepthBuffer::new(ctx, vk::Extent2D { width: 1700, height: 900 })?;
//! let attachments = [vk::ImageView::null(), depth.image_view()];
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::info;

use lumen_rhi::image::ImageView;
use lumen_rhi::memory::{GpuContext, Lifetime, MemoryUsage};
use lumen_rhi::{RhiError, RhiResult};

/// Depth format (32-bit floating point).
pub const DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

/// Depth attachment shared by every framebuffer.
#[derive(Debug, Clone, Copy)]
pub struct DepthBuffer {
    image: vk::Image,
    image_view: vk::ImageView,
    extent: vk::Extent2D,
}

impl DepthBuffer {
    /// Creates a [`DEPTH_FORMAT`] image of `extent` and its view.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::PipelineError`] for a zero extent, or an error if
    /// image allocation or view creation fails.
    pub fn new(ctx: &mut GpuContext, extent: vk::Extent2D) -> RhiResult<Self> {
        if extent.width == 0 || extent.height == 0 {
            return Err(RhiError::PipelineError(
                "depth buffer dimensions must be greater than 0".to_string(),
            ));
        }

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(DEPTH_FORMAT)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = ctx.allocate_image(
            "depth buffer",
            &image_info,
            MemoryUsage::GpuOnly,
            Lifetime::Engine,
        )?;

        let view = ImageView::new(
            Arc::clone(ctx.device()),
            image.handle(),
            DEPTH_FORMAT,
            vk::ImageAspectFlags::DEPTH,
            1,
        )?;
        let image_view = view.handle();
        ctx.defer("depth image view", view);

        info!(
            "Created depth buffer: {}x{} ({:?})",
            extent.width, extent.height, DEPTH_FORMAT
        );

        Ok(Self {
            image: image.handle(),
            image_view,
            extent,
        })
    }

    #[inline]
    pub fn image(&self) -> vk::Image {
        self.image
    }

    #[inline]
    pub fn image_view(&self) -> vk::ImageView {
        self.image_view
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        DEPTH_FORMAT
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}
