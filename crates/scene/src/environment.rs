//! Scene-wide lighting parameters uploaded to the scene uniform buffer.

use bytemuck::{Pod, Zeroable};
use glam::Vec4;

/// Frames per animation radian for the ambient colour and clear flash.
pub const ANIMATION_PERIOD_FRAMES: f32 = 120.0;

/// Scene uniform block.
///
/// # Memory Layout (std140)
///
/// | Offset | Size | Field |
/// |--------|------|-------|
/// | 0      | 16   | fog_color |
/// | 16     | 16   | fog_distances |
/// | 32     | 16   | ambient_color |
/// | 48     | 16   | sunlight_direction |
/// | 64     | 16   | sunlight_color |
///
/// Total size: 80 bytes, padded per frame slot to the device's uniform
/// offset alignment when stored in the scene ring buffer.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct SceneParameters {
    pub fog_color: Vec4,
    /// x = min, y = max, zw unused
    pub fog_distances: Vec4,
    pub ambient_color: Vec4,
    /// xyz = direction, w = power
    pub sunlight_direction: Vec4,
    pub sunlight_color: Vec4,
}

impl SceneParameters {
    /// Advances the ambient colour for frame `frame_number`:
    /// `(sin(f / 120), 0, cos(f / 120), 1)`.
    pub fn animate(&mut self, frame_number: u64) {
        let phase = frame_number as f32 / ANIMATION_PERIOD_FRAMES;
        self.ambient_color = Vec4::new(phase.sin(), 0.0, phase.cos(), 1.0);
    }

    #[inline]
    pub const fn size() -> usize {
        std::mem::size_of::<Self>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_size_is_five_vec4() {
        assert_eq!(SceneParameters::size(), 80);
    }

    #[test]
    fn test_animate_ambient() {
        let mut scene = SceneParameters::default();
        scene.animate(0);
        assert_eq!(scene.ambient_color, Vec4::new(0.0, 0.0, 1.0, 1.0));

        scene.animate(120);
        assert_relative_eq!(scene.ambient_color.x, 1.0f32.sin());
        assert_relative_eq!(scene.ambient_color.z, 1.0f32.cos());
        assert_eq!(scene.ambient_color.w, 1.0);
    }

    #[test]
    fn test_animate_leaves_other_fields() {
        let mut scene = SceneParameters {
            sunlight_color: Vec4::ONE,
            ..Default::default()
        };
        scene.animate(42);
        assert_eq!(scene.sunlight_color, Vec4::ONE);
        assert_eq!(scene.fog_color, Vec4::ZERO);
    }
}
