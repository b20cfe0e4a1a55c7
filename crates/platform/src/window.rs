//! The engine window and its Vulkan surface.
//!
//! The window is created at the configured size and is not resizable: the
//! swapchain, depth buffer and pipelines are all built for one extent.

use std::ffi::{CStr, c_char};

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle, RawWindowHandle};
use tracing::{debug, info};
use winit::dpi::PhysicalSize;
use winit::event_loop::ActiveEventLoop;
use winit::window::{Window as WinitWindow, WindowAttributes};

use lumen_core::config::WindowConfig;
use lumen_core::{Error, Result};

/// A `VkSurfaceKHR` together with the loader that destroys it.
///
/// Must be dropped before the instance it was created on.
pub struct Surface {
    surface: vk::SurfaceKHR,
    loader: ash::khr::surface::Instance,
}

impl Surface {
    fn new(
        entry: &ash::Entry,
        instance: &ash::Instance,
        display: RawDisplayHandle,
        window: RawWindowHandle,
    ) -> Result<Self> {
        // SAFETY: both raw handles belong to a window that outlives this call.
        let surface = unsafe { ash_window::create_surface(entry, instance, display, window, None) }
            .map_err(|e| Error::Window(format!("Vulkan surface creation failed: {e}")))?;
        let loader = ash::khr::surface::Instance::new(entry, instance);
        info!("Vulkan surface created");
        Ok(Self { surface, loader })
    }

    #[inline]
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.surface
    }

    /// Loader for capability, format and present mode queries.
    #[inline]
    pub fn loader(&self) -> &ash::khr::surface::Instance {
        &self.loader
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        // SAFETY: created by `Surface::new` on the loader's instance and
        // destroyed only here.
        unsafe { self.loader.destroy_surface(self.surface, None) };
        debug!("Vulkan surface destroyed");
    }
}

/// A fixed-size winit window.
pub struct Window {
    window: WinitWindow,
    size: PhysicalSize<u32>,
}

impl Window {
    /// Opens the window described by `config`.
    ///
    /// # Errors
    ///
    /// [`Error::Window`] if the event loop refuses to create it.
    pub fn new(event_loop: &ActiveEventLoop, config: &WindowConfig) -> Result<Self> {
        let attributes = WindowAttributes::default()
            .with_title(config.title.as_str())
            .with_inner_size(PhysicalSize::new(config.width, config.height))
            .with_resizable(false);
        let window = event_loop
            .create_window(attributes)
            .map_err(|e| Error::Window(e.to_string()))?;

        // The platform may not honour the requested size exactly.
        let size = window.inner_size();
        if (size.width, size.height) != (config.width, config.height) {
            debug!(
                "Requested {}x{}, got {}x{}",
                config.width, config.height, size.width, size.height
            );
        }
        info!("Window '{}' opened at {}x{}", config.title, size.width, size.height);

        Ok(Self { window, size })
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.size.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.size.height
    }

    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }

    fn raw_handles(&self) -> Result<(RawDisplayHandle, RawWindowHandle)> {
        let display = self
            .window
            .display_handle()
            .map_err(|e| Error::Window(format!("No display handle: {e}")))?;
        let window = self
            .window
            .window_handle()
            .map_err(|e| Error::Window(format!("No window handle: {e}")))?;
        Ok((display.as_raw(), window.as_raw()))
    }

    /// Instance extensions a surface for this window needs.
    ///
    /// The pointers reference static strings.
    ///
    /// # Errors
    ///
    /// [`Error::Window`] if the handles are unavailable or ash-window does
    /// not support the platform.
    pub fn required_extensions(&self) -> Result<Vec<*const c_char>> {
        let (display, _) = self.raw_handles()?;
        let names = ash_window::enumerate_required_extensions(display)
            .map_err(|e| Error::Window(format!("Unsupported windowing platform: {e}")))?;
        for &name in names {
            // SAFETY: ash-window returns NUL-terminated static strings.
            debug!("Surface extension {:?}", unsafe { CStr::from_ptr(name) });
        }
        Ok(names.to_vec())
    }

    /// Creates the Vulkan surface. `instance` must outlive it.
    ///
    /// # Errors
    ///
    /// [`Error::Window`] if the handles are unavailable or creation fails.
    pub fn create_surface(&self, entry: &ash::Entry, instance: &ash::Instance) -> Result<Surface> {
        let (display, window) = self.raw_handles()?;
        Surface::new(entry, instance, display, window)
    }
}
