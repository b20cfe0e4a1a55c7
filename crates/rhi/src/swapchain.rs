//! Swapchain management.
//!
//! [`Swapchain`] owns the VkSwapchainKHR and one image view per swapchain
//! image. The extent is fixed at creation; the engine does not recreate the
//! swapchain on resize.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use lumen_rhi::instance::Instance;
//! use lumen_rhi::device::Device;
//! use lumen_rhi::swapchain::Swapchain;
//! use lumen_rhi::sync::FRAME_TIMEOUT_NS;
//! use ash::vk;
//!
//! # fn example(
//! #     instance: &Instance,
//! #     device: Arc<Device>,
//! #     surface: vk::SurfaceKHR,
//! #     acquired: vk::Semaphore,
//! #     rendered: vk::Semaphore,
//! # ) -> Result<(), lumen_rhi::RhiError> {
//! let swapchain = Swapchain::new(instance, device.clone(), surface, 1700, 900, true)?;
//!
//! let (image_index, _suboptimal) = swapchain.acquire_next_image(acquired, FRAME_TIMEOUT_NS)?;
//! // ... record and submit ...
//! # let queue = device.graphics_queue();
//! swapchain.present(queue, image_index, rendered)?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use crate::device::Device;
use crate::error::{RhiError, RhiResult, wait_error};
use crate::image::ImageView;
use crate::instance::Instance;

/// What a surface offers a swapchain on one physical device.
#[derive(Debug, Clone, Default)]
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    /// Queries capabilities, formats and present modes.
    ///
    /// # Errors
    ///
    /// Returns the Vulkan error of a failing query.
    pub fn query(
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        loader: &ash::khr::surface::Instance,
    ) -> RhiResult<Self> {
        let (capabilities, formats, present_modes) = unsafe {
            (
                loader.get_physical_device_surface_capabilities(physical_device, surface)?,
                loader.get_physical_device_surface_formats(physical_device, surface)?,
                loader.get_physical_device_surface_present_modes(physical_device, surface)?,
            )
        };
        debug!(
            "Surface offers {} format(s), {} present mode(s), {}+ images",
            formats.len(),
            present_modes.len(),
            capabilities.min_image_count
        );
        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }

    /// A swapchain needs at least one format and one present mode.
    #[inline]
    pub fn is_usable(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }

    /// B8G8R8A8_SRGB / SRGB_NONLINEAR when offered, otherwise the first
    /// format. `None` when there are no formats.
    pub fn pick_format(&self) -> Option<vk::SurfaceFormatKHR> {
        let preferred = self.formats.iter().copied().find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        });
        if preferred.is_none() {
            if let Some(first) = self.formats.first() {
                warn!("B8G8R8A8_SRGB not offered, using {:?}", first.format);
            }
        }
        preferred.or_else(|| self.formats.first().copied())
    }

    /// FIFO with vsync; otherwise MAILBOX if offered, else FIFO.
    pub fn pick_present_mode(&self, vsync: bool) -> vk::PresentModeKHR {
        if !vsync && self.present_modes.contains(&vk::PresentModeKHR::MAILBOX) {
            vk::PresentModeKHR::MAILBOX
        } else {
            vk::PresentModeKHR::FIFO
        }
    }

    /// The surface's current extent, or `width` x `height` clamped to the
    /// surface limits when the surface leaves it to the swapchain.
    pub fn pick_extent(&self, width: u32, height: u32) -> vk::Extent2D {
        let caps = &self.capabilities;
        if caps.current_extent.width != u32::MAX {
            return caps.current_extent;
        }
        vk::Extent2D {
            width: width.clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: height.clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }

    /// One more than the minimum, capped by the maximum (0 = no maximum).
    pub fn pick_image_count(&self) -> u32 {
        let caps = &self.capabilities;
        let wanted = caps.min_image_count + 1;
        match caps.max_image_count {
            0 => wanted,
            max => wanted.min(max),
        }
    }
}

/// Vulkan swapchain wrapper.
///
/// Swapchain images belong to the swapchain; their views are owned here and
/// dropped before the swapchain itself.
pub struct Swapchain {
    image_views: Vec<ImageView>,
    loader: ash::khr::swapchain::Device,
    swapchain: vk::SwapchainKHR,
    format: vk::Format,
    extent: vk::Extent2D,
    present_mode: vk::PresentModeKHR,
}

impl Swapchain {
    /// Creates a swapchain for `surface`.
    ///
    /// - Format: B8G8R8A8_SRGB with SRGB_NONLINEAR when available
    /// - Present mode: FIFO when `vsync` is set, otherwise MAILBOX when
    ///   available (FIFO as fallback)
    /// - Extent: the surface's current extent, or `width` x `height` clamped
    ///   to the surface limits
    ///
    /// # Errors
    ///
    /// Returns an error if surface queries fail, the surface has no formats or
    /// present modes, the device has no present queue, or creation fails.
    pub fn new(
        instance: &Instance,
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        width: u32,
        height: u32,
        vsync: bool,
    ) -> RhiResult<Self> {
        let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
        let support = SurfaceSupport::query(device.physical_device(), surface, &surface_loader)?;

        let surface_format = support
            .pick_format()
            .filter(|_| support.is_usable())
            .ok_or_else(|| {
                RhiError::SwapchainError("Surface offers no formats or present modes".to_string())
            })?;
        let present_mode = support.pick_present_mode(vsync);
        let extent = support.pick_extent(width, height);
        let image_count = support.pick_image_count();

        let graphics_family = device.graphics_family();
        let present_family = device.queue_families().present_family.ok_or_else(|| {
            RhiError::SwapchainError("Device was created without a present queue".to_string())
        })?;
        let families = [graphics_family, present_family];
        let (sharing_mode, shared_families): (_, &[u32]) = if graphics_family == present_family {
            (vk::SharingMode::EXCLUSIVE, &[])
        } else {
            (vk::SharingMode::CONCURRENT, &families)
        };

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(shared_families)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true);

        let loader = ash::khr::swapchain::Device::new(instance.handle(), device.handle());
        let swapchain = unsafe { loader.create_swapchain(&create_info, None)? };

        let views = unsafe { loader.get_swapchain_images(swapchain) }
            .map_err(RhiError::from)
            .and_then(|images| {
                images
                    .into_iter()
                    .map(|image| {
                        ImageView::new(
                            Arc::clone(&device),
                            image,
                            surface_format.format,
                            vk::ImageAspectFlags::COLOR,
                            1,
                        )
                    })
                    .collect::<RhiResult<Vec<_>>>()
            });
        let image_views = match views {
            Ok(views) => views,
            Err(e) => {
                unsafe { loader.destroy_swapchain(swapchain, None) };
                return Err(e);
            }
        };

        info!(
            "Swapchain created: {}x{}, {:?}, {:?}, {} images",
            extent.width,
            extent.height,
            surface_format.format,
            present_mode,
            image_views.len()
        );

        Ok(Self {
            image_views,
            loader,
            swapchain,
            format: surface_format.format,
            extent,
            present_mode,
        })
    }

    /// Acquires the next swapchain image, signalling `semaphore` when it is
    /// ready to be rendered to.
    ///
    /// Returns `(image_index, suboptimal)`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::Timeout`] if no image becomes available within
    /// `timeout_ns`, or the Vulkan error otherwise.
    pub fn acquire_next_image(
        &self,
        semaphore: vk::Semaphore,
        timeout_ns: u64,
    ) -> RhiResult<(u32, bool)> {
        unsafe {
            self.loader
                .acquire_next_image(self.swapchain, timeout_ns, semaphore, vk::Fence::null())
        }
        .map_err(|result| wait_error(result, "swapchain image acquire", timeout_ns))
    }

    /// Queues image `image_index` for presentation once `wait_semaphore` is
    /// signalled.
    ///
    /// Returns true if the swapchain is suboptimal for the surface.
    ///
    /// # Errors
    ///
    /// Returns the Vulkan error if presentation fails.
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> RhiResult<bool> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let wait_semaphores = [wait_semaphore];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        Ok(unsafe { self.loader.queue_present(queue, &present_info)? })
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    #[inline]
    pub fn image_count(&self) -> u32 {
        self.image_views.len() as u32
    }

    /// One view per swapchain image, in image index order.
    pub fn image_views(&self) -> impl Iterator<Item = vk::ImageView> + '_ {
        self.image_views.iter().map(ImageView::handle)
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.image_views.clear();
        unsafe { self.loader.destroy_swapchain(self.swapchain, None) };
        info!(
            "Swapchain destroyed ({}x{})",
            self.extent.width, self.extent.height
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface_format(format: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    fn support_with_extent(current: u32, min: u32, max: u32) -> SurfaceSupport {
        SurfaceSupport {
            capabilities: vk::SurfaceCapabilitiesKHR {
                current_extent: vk::Extent2D {
                    width: current,
                    height: current,
                },
                min_image_extent: vk::Extent2D {
                    width: min,
                    height: min,
                },
                max_image_extent: vk::Extent2D {
                    width: max,
                    height: max,
                },
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_pick_format_prefers_bgra_srgb() {
        let support = SurfaceSupport {
            formats: vec![
                surface_format(vk::Format::R8G8B8A8_UNORM),
                surface_format(vk::Format::B8G8R8A8_SRGB),
            ],
            ..Default::default()
        };
        assert_eq!(
            support.pick_format().map(|f| f.format),
            Some(vk::Format::B8G8R8A8_SRGB)
        );
    }

    #[test]
    fn test_pick_format_falls_back_to_first() {
        let support = SurfaceSupport {
            formats: vec![surface_format(vk::Format::R8G8B8A8_UNORM)],
            ..Default::default()
        };
        assert_eq!(
            support.pick_format().map(|f| f.format),
            Some(vk::Format::R8G8B8A8_UNORM)
        );
        assert_eq!(SurfaceSupport::default().pick_format(), None);
    }

    #[test]
    fn test_present_mode_follows_vsync() {
        let support = SurfaceSupport {
            present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
            ..Default::default()
        };
        assert_eq!(support.pick_present_mode(true), vk::PresentModeKHR::FIFO);
        assert_eq!(support.pick_present_mode(false), vk::PresentModeKHR::MAILBOX);

        let fifo_only = SurfaceSupport {
            present_modes: vec![vk::PresentModeKHR::FIFO],
            ..Default::default()
        };
        assert_eq!(fifo_only.pick_present_mode(false), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn test_extent_uses_current_when_defined() {
        let support = support_with_extent(1024, 1, 4096);
        let extent = support.pick_extent(1700, 900);
        assert_eq!((extent.width, extent.height), (1024, 1024));
    }

    #[test]
    fn test_extent_clamped_when_undefined() {
        let support = support_with_extent(u32::MAX, 100, 2000);
        let big = support.pick_extent(3000, 3000);
        assert_eq!((big.width, big.height), (2000, 2000));
        let small = support.pick_extent(50, 50);
        assert_eq!((small.width, small.height), (100, 100));
        let fits = support.pick_extent(1700, 900);
        assert_eq!((fits.width, fits.height), (1700, 900));
    }

    #[test]
    fn test_image_count() {
        let mut support = SurfaceSupport::default();
        support.capabilities.min_image_count = 2;
        support.capabilities.max_image_count = 2;
        assert_eq!(support.pick_image_count(), 2);
        support.capabilities.max_image_count = 0;
        assert_eq!(support.pick_image_count(), 3);
    }

    #[test]
    fn test_usable_needs_format_and_mode() {
        let mut support = SurfaceSupport {
            formats: vec![surface_format(vk::Format::B8G8R8A8_SRGB)],
            ..Default::default()
        };
        assert!(!support.is_usable());
        support.present_modes.push(vk::PresentModeKHR::FIFO);
        assert!(support.is_usable());
    }
}
