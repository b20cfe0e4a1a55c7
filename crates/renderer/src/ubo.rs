//! GPU-side data layouts shared with the shaders.
//!
//! All structures use `#[repr(C)]` for predictable memory layout and implement
//! `Pod` and `Zeroable` for safe byte casting. Matrices are column-major, as
//! GLSL expects.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};
use lumen_scene::Camera;

/// Camera uniform buffer data (set 0, binding 0).
///
/// # Memory Layout
///
/// - Offset 0: view matrix (64 bytes)
/// - Offset 64: projection matrix (64 bytes)
/// - Offset 128: view-projection matrix (64 bytes)
/// - Total size: 192 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct GpuCameraData {
    pub view: Mat4,
    pub proj: Mat4,
    pub viewproj: Mat4,
}

impl GpuCameraData {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Snapshot of `camera` for this frame.
    pub fn from_camera(camera: &Camera) -> Self {
        let view = camera.view_matrix();
        let proj = camera.projection_matrix();
        Self {
            view,
            proj,
            viewproj: proj * view,
        }
    }
}

/// One entry of the object storage buffer (set 1, binding 0), indexed in
/// the shader by `gl_BaseInstance`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct GpuObjectData {
    pub model: Mat4,
}

impl GpuObjectData {
    pub const SIZE: usize = std::mem::size_of::<Self>();
}

/// Per-draw push constant block, vertex stage, offset 0.
///
/// # Memory Layout
///
/// - Offset 0: free-form data vector (16 bytes)
/// - Offset 16: render matrix, `proj * view * model` (64 bytes)
/// - Total size: 80 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct MeshPushConstants {
    pub data: Vec4,
    pub render_matrix: Mat4,
}

impl MeshPushConstants {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    pub fn new(view_proj: Mat4, model: Mat4) -> Self {
        Self {
            data: Vec4::ZERO,
            render_matrix: view_proj * model,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_camera_data_size() {
        // 3 Mat4 (3 * 64) = 192 bytes
        assert_eq!(GpuCameraData::SIZE, 192);
        assert_eq!(std::mem::align_of::<GpuCameraData>(), 16);
    }

    #[test]
    fn test_object_data_size() {
        assert_eq!(GpuObjectData::SIZE, 64);
    }

    #[test]
    fn test_push_constants_size() {
        // Well within the 128 bytes every device guarantees
        assert_eq!(MeshPushConstants::SIZE, 80);
    }

    #[test]
    fn test_camera_data_matches_camera() {
        let camera = Camera::default();
        let data = GpuCameraData::from_camera(&camera);
        assert_eq!(data.view, camera.view_matrix());
        assert_eq!(data.proj, camera.projection_matrix());
        assert_eq!(data.viewproj, camera.view_projection_matrix());
    }

    #[test]
    fn test_push_constants_compose_model_last() {
        let view_proj = Mat4::from_scale(Vec3::splat(2.0));
        let model = Mat4::from_translation(Vec3::X);
        let push = MeshPushConstants::new(view_proj, model);

        assert_eq!(push.data, Vec4::ZERO);
        // Translate first, then scale.
        let p = push.render_matrix.transform_point3(Vec3::ZERO);
        assert_eq!(p, Vec3::new(2.0, 0.0, 0.0));
    }

    #[test]
    fn test_bytes_of() {
        let push = MeshPushConstants::default();
        assert_eq!(bytemuck::bytes_of(&push).len(), MeshPushConstants::SIZE);
    }
}
