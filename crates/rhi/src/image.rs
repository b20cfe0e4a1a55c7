//! Image views, samplers and image layout recording.
//!
//! - [`ImageView`] wraps VkImageView
//! - [`Sampler`] wraps the texture sampler (nearest filtering, linear
//!   mip interpolation)
//! - [`record_layout_transition`] and [`record_mip_chain`] record the barrier
//!   and blit sequence that takes a freshly uploaded texture to
//!   `SHADER_READ_ONLY_OPTIMAL` on every level

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::command::CommandBuffer;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Number of mip levels for a `width` x `height` image:
/// `floor(log2(max(width, height))) + 1`.
///
/// Zero-sized inputs yield a single level.
pub fn mip_levels(width: u32, height: u32) -> u32 {
    let largest = width.max(height).max(1);
    u32::BITS - largest.leading_zeros()
}

/// Vulkan image view wrapper.
pub struct ImageView {
    device: Arc<Device>,
    view: vk::ImageView,
}

impl ImageView {
    /// Creates a 2D view over `mip_levels` levels of `image`.
    ///
    /// # Errors
    ///
    /// Returns an error if view creation fails.
    pub fn new(
        device: Arc<Device>,
        image: vk::Image,
        format: vk::Format,
        aspect: vk::ImageAspectFlags,
        mip_levels: u32,
    ) -> RhiResult<Self> {
        let create_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .components(vk::ComponentMapping::default())
            .subresource_range(subresource_range(aspect, 0, mip_levels));

        let view = unsafe { device.handle().create_image_view(&create_info, None)? };
        debug!("Image view created ({:?}, {} level(s))", format, mip_levels);

        Ok(Self { device, view })
    }

    #[inline]
    pub fn handle(&self) -> vk::ImageView {
        self.view
    }
}

impl Drop for ImageView {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_image_view(self.view, None);
        }
        debug!("Image view destroyed");
    }
}

/// Vulkan sampler wrapper.
pub struct Sampler {
    device: Arc<Device>,
    sampler: vk::Sampler,
}

impl Sampler {
    /// Creates the blocky texture sampler: nearest min/mag filtering, linear
    /// interpolation between mips, repeat addressing and LOD range
    /// `0..=mip_levels`.
    ///
    /// Anisotropy is enabled when the device has it enabled, at the device's
    /// maximum.
    ///
    /// # Errors
    ///
    /// Returns an error if sampler creation fails.
    pub fn new(device: Arc<Device>, mip_levels: u32) -> RhiResult<Self> {
        let create_info = Self::create_info(
            mip_levels,
            device
                .anisotropy_enabled()
                .then(|| device.limits().max_sampler_anisotropy),
        );
        let sampler = unsafe { device.handle().create_sampler(&create_info, None)? };
        debug!("Sampler created (max LOD {})", mip_levels);

        Ok(Self { device, sampler })
    }

    fn create_info(mip_levels: u32, anisotropy: Option<f32>) -> vk::SamplerCreateInfo<'static> {
        vk::SamplerCreateInfo::default()
            .mag_filter(vk::Filter::NEAREST)
            .min_filter(vk::Filter::NEAREST)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .anisotropy_enable(anisotropy.is_some())
            .max_anisotropy(anisotropy.unwrap_or(1.0))
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .unnormalized_coordinates(false)
            .compare_enable(false)
            .compare_op(vk::CompareOp::ALWAYS)
            .mip_lod_bias(0.0)
            .min_lod(0.0)
            .max_lod(mip_levels as f32)
    }

    #[inline]
    pub fn handle(&self) -> vk::Sampler {
        self.sampler
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_sampler(self.sampler, None);
        }
        debug!("Sampler destroyed");
    }
}

// =============================================================================
// Layout recording
// =============================================================================

fn subresource_range(
    aspect: vk::ImageAspectFlags,
    base_mip_level: u32,
    level_count: u32,
) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange::default()
        .aspect_mask(aspect)
        .base_mip_level(base_mip_level)
        .level_count(level_count)
        .base_array_layer(0)
        .layer_count(1)
}

fn color_barrier(
    image: vk::Image,
    mip_level: u32,
    level_count: u32,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
    src_access: vk::AccessFlags,
    dst_access: vk::AccessFlags,
) -> vk::ImageMemoryBarrier<'static> {
    vk::ImageMemoryBarrier::default()
        .image(image)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .subresource_range(subresource_range(
            vk::ImageAspectFlags::COLOR,
            mip_level,
            level_count,
        ))
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_access_mask(src_access)
        .dst_access_mask(dst_access)
}

/// Records `UNDEFINED -> TRANSFER_DST_OPTIMAL` for all `mip_levels` levels of a
/// color image, ahead of a buffer-to-image copy.
pub fn record_layout_transition(cmd: &CommandBuffer, image: vk::Image, mip_levels: u32) {
    let barrier = color_barrier(
        image,
        0,
        mip_levels,
        vk::ImageLayout::UNDEFINED,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        vk::AccessFlags::empty(),
        vk::AccessFlags::TRANSFER_WRITE,
    );
    cmd.pipeline_barrier(
        vk::PipelineStageFlags::TOP_OF_PIPE,
        vk::PipelineStageFlags::TRANSFER,
        &[barrier],
    );
}

/// Extent of mip level `i + 1` given the extent of level `i`.
fn half_extent(width: i32, height: i32) -> (i32, i32) {
    ((width / 2).max(1), (height / 2).max(1))
}

/// Fails with [`RhiError::UnsupportedFormat`] unless `format` supports linear
/// blit filtering with optimal tiling.
pub fn check_linear_blit(device: &Device, format: vk::Format) -> RhiResult<()> {
    let properties = device.format_properties(format);
    if properties
        .optimal_tiling_features
        .contains(vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR)
    {
        Ok(())
    } else {
        Err(RhiError::UnsupportedFormat {
            format,
            reason: "texture format does not support linear blitting",
        })
    }
}

/// Records the mip chain for an image whose every level is in
/// `TRANSFER_DST_OPTIMAL` with level 0 holding the uploaded pixels.
///
/// For each level `i` in `1..mip_levels`: level `i - 1` moves to
/// `TRANSFER_SRC_OPTIMAL`, is blitted (linear filter) into level `i` at half
/// size (clamped to 1), then moves to `SHADER_READ_ONLY_OPTIMAL`. The last
/// level ends in `SHADER_READ_ONLY_OPTIMAL` too.
pub fn record_mip_chain(
    cmd: &CommandBuffer,
    image: vk::Image,
    extent: vk::Extent3D,
    mip_levels: u32,
) {
    let mut width = extent.width as i32;
    let mut height = extent.height as i32;

    for level in 1..mip_levels {
        let to_src = color_barrier(
            image,
            level - 1,
            1,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            vk::AccessFlags::TRANSFER_WRITE,
            vk::AccessFlags::TRANSFER_READ,
        );
        cmd.pipeline_barrier(
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::TRANSFER,
            &[to_src],
        );

        let (next_width, next_height) = half_extent(width, height);
        let blit = vk::ImageBlit::default()
            .src_offsets([
                vk::Offset3D::default(),
                vk::Offset3D {
                    x: width,
                    y: height,
                    z: 1,
                },
            ])
            .src_subresource(
                vk::ImageSubresourceLayers::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .mip_level(level - 1)
                    .base_array_layer(0)
                    .layer_count(1),
            )
            .dst_offsets([
                vk::Offset3D::default(),
                vk::Offset3D {
                    x: next_width,
                    y: next_height,
                    z: 1,
                },
            ])
            .dst_subresource(
                vk::ImageSubresourceLayers::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .mip_level(level)
                    .base_array_layer(0)
                    .layer_count(1),
            );
        cmd.blit_image(
            image,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &[blit],
            vk::Filter::LINEAR,
        );

        let to_read = color_barrier(
            image,
            level - 1,
            1,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::AccessFlags::TRANSFER_READ,
            vk::AccessFlags::SHADER_READ,
        );
        cmd.pipeline_barrier(
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
            &[to_read],
        );

        width = next_width;
        height = next_height;
    }

    let last = color_barrier(
        image,
        mip_levels.saturating_sub(1),
        1,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        vk::AccessFlags::TRANSFER_WRITE,
        vk::AccessFlags::SHADER_READ,
    );
    cmd.pipeline_barrier(
        vk::PipelineStageFlags::TRANSFER,
        vk::PipelineStageFlags::FRAGMENT_SHADER,
        &[last],
    );
}
