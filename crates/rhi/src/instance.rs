//! The Vulkan instance.
//!
//! Loads the Vulkan library, creates the `VkInstance` and, when asked and
//! available, turns on `VK_LAYER_KHRONOS_validation` with a messenger that
//! forwards into `tracing`.
//!
//! ```no_run
//! use lumen_rhi::instance::Instance;
//!
//! // Headless: no surface extensions.
//! let instance = Instance::new("lumen", cfg!(debug_assertions), &[])
//!     .expect("Failed to create Vulkan instance");
//! assert!(instance.handle().handle() != ash::vk::Instance::null());
//! ```

use std::borrow::Cow;
use std::ffi::{CStr, CString, c_char, c_void};

use ash::{Entry, vk};
use tracing::{Level, debug, error, info, trace, warn};

use crate::error::RhiError;

const KHRONOS_VALIDATION: &CStr = c"VK_LAYER_KHRONOS_validation";

/// API version requested from the loader. `shaderDrawParameters` is core in 1.1.
pub const API_VERSION: u32 = vk::API_VERSION_1_1;

/// The debug-utils loader and the messenger created through it.
struct Validation {
    loader: ash::ext::debug_utils::Instance,
    messenger: vk::DebugUtilsMessengerEXT,
}

impl Validation {
    fn new(entry: &Entry, instance: &ash::Instance) -> Result<Self, RhiError> {
        let all_severities = vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
            | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
            | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
            | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR;
        let all_types = vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
            | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
            | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE;
        let info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(all_severities)
            .message_type(all_types)
            .pfn_user_callback(Some(forward_to_tracing));

        let loader = ash::ext::debug_utils::Instance::new(entry, instance);
        let messenger = unsafe { loader.create_debug_utils_messenger(&info, None)? };
        Ok(Self { loader, messenger })
    }
}

/// Owns the `VkInstance`. Must outlive every object created from it.
pub struct Instance {
    entry: Entry,
    instance: ash::Instance,
    validation: Option<Validation>,
}

impl Instance {
    /// Creates an instance with `surface_extensions` enabled (`&[]` for
    /// headless use).
    ///
    /// A missing validation layer only logs a warning.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::LoadingError`] if the Vulkan library is missing, or
    /// the Vulkan error if instance or messenger creation fails.
    pub fn new(
        app_name: &str,
        enable_validation: bool,
        surface_extensions: &[*const c_char],
    ) -> Result<Self, RhiError> {
        let entry = unsafe { Entry::load()? };

        let with_validation = enable_validation && has_layer(&entry, KHRONOS_VALIDATION)?;
        if enable_validation && !with_validation {
            warn!("Validation requested but VK_LAYER_KHRONOS_validation is missing");
        }

        let app_name = CString::new(app_name).unwrap_or_default();
        let version = vk::make_api_version(0, 0, 1, 0);
        let app_info = vk::ApplicationInfo::default()
            .application_name(&app_name)
            .application_version(version)
            .engine_name(c"lumen")
            .engine_version(version)
            .api_version(API_VERSION);

        let mut extensions = surface_extensions.to_vec();
        let mut layers = Vec::new();
        if with_validation {
            extensions.push(ash::ext::debug_utils::NAME.as_ptr());
            layers.push(KHRONOS_VALIDATION.as_ptr());
        }

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);
        let instance = unsafe { entry.create_instance(&create_info, None)? };

        let validation = if with_validation {
            match Validation::new(&entry, &instance) {
                Ok(validation) => Some(validation),
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e);
                }
            }
        } else {
            None
        };

        info!(
            "Vulkan instance created: {} extension(s), validation {}",
            extensions.len(),
            if with_validation { "on" } else { "off" }
        );

        Ok(Self {
            entry,
            instance,
            validation,
        })
    }

    #[inline]
    pub fn handle(&self) -> &ash::Instance {
        &self.instance
    }

    #[inline]
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    #[inline]
    pub fn has_validation(&self) -> bool {
        self.validation.is_some()
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        if let Some(validation) = self.validation.take() {
            unsafe {
                validation
                    .loader
                    .destroy_debug_utils_messenger(validation.messenger, None)
            };
            debug!("Debug messenger destroyed");
        }
        unsafe { self.instance.destroy_instance(None) };
        info!("Vulkan instance destroyed");
    }
}

fn has_layer(entry: &Entry, name: &CStr) -> Result<bool, RhiError> {
    let layers = unsafe { entry.enumerate_instance_layer_properties()? };
    Ok(layers
        .iter()
        .any(|layer| layer.layer_name_as_c_str().ok() == Some(name)))
}

/// Log level and category label for a validation message.
fn classify(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    kind: vk::DebugUtilsMessageTypeFlagsEXT,
) -> (Level, &'static str) {
    let level = if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        Level::ERROR
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        Level::WARN
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        Level::DEBUG
    } else {
        Level::TRACE
    };
    let label = if kind.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION) {
        "validation"
    } else if kind.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE) {
        "performance"
    } else {
        "general"
    };
    (level, label)
}

/// # Safety
///
/// Called by the loader; `data` is null or valid for the duration of the call.
unsafe extern "system" fn forward_to_tracing(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    kind: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut c_void,
) -> vk::Bool32 {
    let message = match unsafe { data.as_ref() } {
        Some(data) if !data.p_message.is_null() => unsafe {
            CStr::from_ptr(data.p_message).to_string_lossy()
        },
        _ => Cow::Borrowed("<empty>"),
    };

    let (level, label) = classify(severity, kind);
    match level {
        Level::ERROR => error!(target: "vulkan", "[{label}] {message}"),
        Level::WARN => warn!(target: "vulkan", "[{label}] {message}"),
        Level::DEBUG => debug!(target: "vulkan", "[{label}] {message}"),
        _ => trace!(target: "vulkan", "[{label}] {message}"),
    }
    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_maps_severity() {
        let general = vk::DebugUtilsMessageTypeFlagsEXT::GENERAL;
        assert_eq!(
            classify(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR, general).0,
            Level::ERROR
        );
        assert_eq!(
            classify(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING, general).0,
            Level::WARN
        );
        assert_eq!(
            classify(vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE, general),
            (Level::TRACE, "general")
        );
    }

    #[test]
    fn test_classify_labels_kind() {
        let info = vk::DebugUtilsMessageSeverityFlagsEXT::INFO;
        assert_eq!(
            classify(info, vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION).1,
            "validation"
        );
        assert_eq!(
            classify(info, vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE).1,
            "performance"
        );
    }

    #[test]
    fn test_headless_instance() {
        for validation in [false, true] {
            match Instance::new("lumen-test", validation, &[]) {
                Ok(instance) => {
                    if !validation {
                        assert!(!instance.has_validation());
                    }
                }
                Err(RhiError::LoadingError(_)) => {
                    eprintln!("Skipping test: Vulkan not available");
                    return;
                }
                Err(e) => panic!("Unexpected error: {:?}", e),
            }
        }
    }

    #[test]
    fn test_api_version_supports_draw_parameters() {
        assert!(API_VERSION >= vk::API_VERSION_1_1);
    }
}
