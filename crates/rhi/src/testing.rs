//! Headless GPU setup shared by the GPU-backed unit tests.

use std::sync::Arc;

use crate::device::Device;
use crate::error::RhiError;
use crate::instance::Instance;
use crate::physical_device::select_physical_device;

/// A headless device plus the instance it came from.
///
/// Fields drop in declaration order, so the device goes before the instance.
pub(crate) struct HeadlessGpu {
    pub device: Arc<Device>,
    #[allow(dead_code)]
    pub instance: Instance,
}

/// Creates a headless device, or returns `None` (after logging why) when the
/// machine has no Vulkan loader or no suitable GPU.
pub(crate) fn headless_gpu() -> Option<HeadlessGpu> {
    let instance = match Instance::new("lumen-test", false, &[]) {
        Ok(instance) => instance,
        Err(RhiError::LoadingError(_)) => {
            eprintln!("Skipping test: Vulkan not available");
            return None;
        }
        Err(e) => panic!("Unexpected error: {:?}", e),
    };

    let info = match select_physical_device(instance.handle(), None) {
        Ok(info) => info,
        Err(RhiError::NoSuitableGpu) => {
            eprintln!("Skipping test: no suitable GPU");
            return None;
        }
        Err(e) => panic!("Unexpected error: {:?}", e),
    };

    let device = Device::new(&instance, &info).expect("Failed to create device");
    Some(HeadlessGpu { device, instance })
}
