//! GPU selection.
//!
//! Every enumerated GPU is evaluated against the engine's requirements and
//! either rejected with a [`Rejection`] or scored; the highest score wins.
//! With a [`PresentTarget`] a GPU must present to the surface and expose
//! `VK_KHR_swapchain`. Headless callers pass `None` and only need a graphics
//! queue. Either way `shaderDrawParameters` is required because the object
//! shaders index storage data with `gl_BaseInstance`.

use std::ffi::CStr;
use std::fmt;

use ash::vk;
use tracing::{debug, info, warn};

use crate::error::RhiError;

/// Surface a selected GPU has to present to.
#[derive(Clone, Copy)]
pub struct PresentTarget<'a> {
    pub surface: vk::SurfaceKHR,
    pub loader: &'a ash::khr::surface::Instance,
}

/// Queue families the engine submits to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    /// Graphics work, which implies transfer.
    pub graphics_family: Option<u32>,
    /// Presentation to the target surface; `None` when headless.
    pub present_family: Option<u32>,
}

impl QueueFamilyIndices {
    #[inline]
    pub fn is_complete(&self, needs_present: bool) -> bool {
        self.graphics_family.is_some() && (!needs_present || self.present_family.is_some())
    }

    /// Distinct families, graphics first.
    pub fn unique_families(&self) -> Vec<u32> {
        let mut out: Vec<u32> = self.graphics_family.into_iter().collect();
        out.extend(self.present_family.filter(|p| !out.contains(p)));
        out
    }
}

/// Why a GPU was not considered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    ApiTooOld,
    MissingQueues { graphics: bool, present: bool },
    NoDrawParameters,
    NoSwapchain,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ApiTooOld => write!(f, "Vulkan 1.1 not supported"),
            Self::MissingQueues { graphics, present } => {
                write!(f, "missing queues (graphics={graphics}, present={present})")
            }
            Self::NoDrawParameters => write!(f, "shaderDrawParameters not supported"),
            Self::NoSwapchain => write!(f, "VK_KHR_swapchain not supported"),
        }
    }
}

/// The selected GPU and what the logical device needs to know about it.
#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    pub device: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub features: vk::PhysicalDeviceFeatures,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub queue_families: QueueFamilyIndices,
    /// `VK_KHR_swapchain` is enabled on the logical device.
    pub swapchain_supported: bool,
}

impl PhysicalDeviceInfo {
    pub fn device_name(&self) -> &str {
        self.properties
            .device_name_as_c_str()
            .ok()
            .and_then(|name| name.to_str().ok())
            .unwrap_or("<unnamed>")
    }

    pub fn device_type_name(&self) -> &'static str {
        match self.properties.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => "discrete",
            vk::PhysicalDeviceType::INTEGRATED_GPU => "integrated",
            vk::PhysicalDeviceType::VIRTUAL_GPU => "virtual",
            vk::PhysicalDeviceType::CPU => "software",
            _ => "other",
        }
    }

    #[inline]
    pub fn min_uniform_buffer_offset_alignment(&self) -> vk::DeviceSize {
        self.properties.limits.min_uniform_buffer_offset_alignment
    }

    /// Sum of all device-local heaps, in bytes.
    pub fn device_local_memory(&self) -> u64 {
        let heaps = &self.memory_properties.memory_heaps;
        heaps[..self.memory_properties.memory_heap_count as usize]
            .iter()
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size)
            .sum()
    }

    fn score(&self) -> u32 {
        let families = self.queue_families;
        score(
            self.properties.device_type,
            self.device_local_memory(),
            families.present_family.is_none() || families.graphics_family == families.present_family,
        )
    }
}

impl fmt::Debug for PhysicalDeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let version = self.properties.api_version;
        f.debug_struct("PhysicalDeviceInfo")
            .field("name", &self.device_name())
            .field("type", &self.device_type_name())
            .field(
                "api",
                &format_args!(
                    "{}.{}",
                    vk::api_version_major(version),
                    vk::api_version_minor(version)
                ),
            )
            .field("queue_families", &self.queue_families)
            .finish()
    }
}

/// Discrete beats integrated beats everything else; VRAM (capped at 16 GiB)
/// breaks ties, and a shared graphics/present family earns a small bonus.
fn score(device_type: vk::PhysicalDeviceType, vram_bytes: u64, shared_queue: bool) -> u32 {
    let base = match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 20_000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 2_000,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 200,
        _ => 20,
    };
    let vram_mib = (vram_bytes >> 20).min(16 * 1024) as u32;
    base + vram_mib + if shared_queue { 50 } else { 0 }
}

/// Picks the best GPU for the engine.
///
/// # Errors
///
/// Returns [`RhiError::NoSuitableGpu`] if every GPU is rejected, or the
/// Vulkan error if enumeration fails.
pub fn select_physical_device(
    instance: &ash::Instance,
    target: Option<PresentTarget<'_>>,
) -> Result<PhysicalDeviceInfo, RhiError> {
    let devices = unsafe { instance.enumerate_physical_devices()? };
    info!("Found {} GPU(s)", devices.len());

    let mut best: Option<(PhysicalDeviceInfo, u32)> = None;
    for device in devices {
        match evaluate(instance, device, target) {
            Ok(candidate) => {
                let score = candidate.score();
                debug!("GPU '{}' scored {}", candidate.device_name(), score);
                if best.as_ref().is_none_or(|(_, top)| score > *top) {
                    best = Some((candidate, score));
                }
            }
            Err((name, why)) => debug!("GPU '{}' rejected: {}", name, why),
        }
    }

    let Some((selected, _)) = best else {
        warn!("No GPU meets the engine's requirements");
        return Err(RhiError::NoSuitableGpu);
    };
    info!("Selected GPU: {:?}", selected);
    Ok(selected)
}

fn evaluate(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    target: Option<PresentTarget<'_>>,
) -> Result<PhysicalDeviceInfo, (String, Rejection)> {
    let properties = unsafe { instance.get_physical_device_properties(device) };
    let name = properties
        .device_name_as_c_str()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let reject = |why| (name.clone(), why);

    if properties.api_version < vk::API_VERSION_1_1 {
        return Err(reject(Rejection::ApiTooOld));
    }

    let queue_families = find_queue_families(instance, device, target);
    if !queue_families.is_complete(target.is_some()) {
        return Err(reject(Rejection::MissingQueues {
            graphics: queue_families.graphics_family.is_some(),
            present: queue_families.present_family.is_some(),
        }));
    }

    let mut draw_parameters = vk::PhysicalDeviceShaderDrawParametersFeatures::default();
    let mut features2 = vk::PhysicalDeviceFeatures2::default().push_next(&mut draw_parameters);
    unsafe { instance.get_physical_device_features2(device, &mut features2) };
    let features = features2.features;
    if draw_parameters.shader_draw_parameters == vk::FALSE {
        return Err(reject(Rejection::NoDrawParameters));
    }

    let swapchain_supported =
        target.is_some() && has_extension(instance, device, ash::khr::swapchain::NAME);
    if target.is_some() && !swapchain_supported {
        return Err(reject(Rejection::NoSwapchain));
    }

    Ok(PhysicalDeviceInfo {
        device,
        properties,
        features,
        memory_properties: unsafe { instance.get_physical_device_memory_properties(device) },
        queue_families,
        swapchain_supported,
    })
}

fn has_extension(instance: &ash::Instance, device: vk::PhysicalDevice, name: &CStr) -> bool {
    unsafe { instance.enumerate_device_extension_properties(device) }
        .map(|exts| {
            exts.iter()
                .any(|ext| ext.extension_name_as_c_str().ok() == Some(name))
        })
        .unwrap_or(false)
}

fn find_queue_families(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    target: Option<PresentTarget<'_>>,
) -> QueueFamilyIndices {
    let families = unsafe { instance.get_physical_device_queue_family_properties(device) };
    let usable = families
        .iter()
        .zip(0u32..)
        .filter(|(family, _)| family.queue_count > 0);

    let mut indices = QueueFamilyIndices::default();
    for (family, index) in usable {
        let graphics = family.queue_flags.contains(vk::QueueFlags::GRAPHICS);
        if graphics && indices.graphics_family.is_none() {
            indices.graphics_family = Some(index);
        }

        let Some(target) = target else { continue };
        let presents = unsafe {
            target
                .loader
                .get_physical_device_surface_support(device, index, target.surface)
        }
        .unwrap_or(false);
        // Prefer one family serving both roles.
        let shared = graphics && indices.graphics_family == Some(index);
        if presents && (indices.present_family.is_none() || shared) {
            indices.present_family = Some(index);
        }
    }
    indices
}

#[cfg(test)]
mod tests {
    use super::*;

    const GIB: u64 = 1 << 30;

    #[test]
    fn test_completeness_depends_on_mode() {
        let none = QueueFamilyIndices::default();
        assert!(!none.is_complete(false));

        let graphics_only = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: None,
        };
        assert!(graphics_only.is_complete(false));
        assert!(!graphics_only.is_complete(true));

        let present_only = QueueFamilyIndices {
            graphics_family: None,
            present_family: Some(1),
        };
        assert!(!present_only.is_complete(true));
    }

    #[test]
    fn test_unique_families_dedups() {
        let shared = QueueFamilyIndices {
            graphics_family: Some(1),
            present_family: Some(1),
        };
        assert_eq!(shared.unique_families(), vec![1]);

        let split = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(2),
        };
        assert_eq!(split.unique_families(), vec![0, 2]);
        assert!(QueueFamilyIndices::default().unique_families().is_empty());
    }

    #[test]
    fn test_discrete_outranks_integrated() {
        let discrete = score(vk::PhysicalDeviceType::DISCRETE_GPU, 2 * GIB, false);
        let integrated = score(vk::PhysicalDeviceType::INTEGRATED_GPU, 16 * GIB, true);
        assert!(discrete > integrated);
    }

    #[test]
    fn test_vram_and_shared_queue_break_ties() {
        let small = score(vk::PhysicalDeviceType::DISCRETE_GPU, 4 * GIB, false);
        let large = score(vk::PhysicalDeviceType::DISCRETE_GPU, 8 * GIB, false);
        assert!(large > small);

        let shared = score(vk::PhysicalDeviceType::DISCRETE_GPU, 4 * GIB, true);
        assert_eq!(shared, small + 50);

        let capped = score(vk::PhysicalDeviceType::DISCRETE_GPU, 64 * GIB, false);
        assert_eq!(capped, score(vk::PhysicalDeviceType::DISCRETE_GPU, 16 * GIB, false));
    }

    #[test]
    fn test_rejection_messages() {
        let missing = Rejection::MissingQueues {
            graphics: true,
            present: false,
        };
        assert_eq!(
            missing.to_string(),
            "missing queues (graphics=true, present=false)"
        );
        assert!(Rejection::NoSwapchain.to_string().contains("VK_KHR_swapchain"));
    }

    #[test]
    fn test_headless_selection() {
        let instance = match crate::instance::Instance::new("lumen-test", false, &[]) {
            Ok(instance) => instance,
            Err(RhiError::LoadingError(_)) => {
                eprintln!("Skipping test: Vulkan not available");
                return;
            }
            Err(e) => panic!("Unexpected error: {:?}", e),
        };

        match select_physical_device(instance.handle(), None) {
            Ok(info) => {
                assert!(info.queue_families.graphics_family.is_some());
                assert!(info.queue_families.present_family.is_none());
                assert!(!info.swapchain_supported);
                assert!(info.min_uniform_buffer_offset_alignment().is_power_of_two());
            }
            Err(RhiError::NoSuitableGpu) => eprintln!("Skipping test: no suitable GPU"),
            Err(e) => panic!("Unexpected error: {:?}", e),
        }
    }
}
