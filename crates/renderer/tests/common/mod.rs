//! Headless Vulkan setup shared by the GPU integration tests.

use std::sync::Arc;

use lumen_rhi::RhiError;
use lumen_rhi::device::Device;
use lumen_rhi::instance::Instance;
use lumen_rhi::physical_device::select_physical_device;

/// Instance and device without a surface, or `None` (after a note on
/// stderr) when the machine has no usable Vulkan driver.
pub fn headless() -> Option<(Instance, Arc<Device>)> {
    let instance = match Instance::new("lumen-renderer-test", false, &[]) {
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
    Some((instance, device))
}
