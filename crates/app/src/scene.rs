//! The sample scene: a textured model at the origin surrounded by a grid of
//! triangles.

use anyhow::Result;
use glam::{Mat4, Vec3};
use tracing::{info, warn};

use lumen_core::EngineConfig;
use lumen_renderer::engine::{DEFAULT_LIT_SHADER, TEXTURED_LIT_SHADER};
use lumen_renderer::{DEFAULT_MATERIAL, Engine, TEXTURED_MATERIAL};
use lumen_resources::{ImageData, MeshData};
use lumen_scene::{MeshId, RenderObject};

/// Triangles per grid side.
pub const GRID_SIZE: i32 = 40;
const GRID_SCALE: f32 = 0.2;

/// Spin rate of the model, degrees per second.
pub const SPIN_DEGREES_PER_SEC: f32 = 90.0;

/// Grid transforms: one per cell of a `GRID_SIZE` x `GRID_SIZE` square
/// centred on the origin in the XY plane.
pub fn grid_transforms() -> Vec<Mat4> {
    let half = GRID_SIZE / 2;
    (-half..half)
        .flat_map(|x| (-half..half).map(move |y| (x, y)))
        .map(|(x, y)| {
            Mat4::from_translation(Vec3::new(x as f32, y as f32, 0.0))
                * Mat4::from_scale(Vec3::splat(GRID_SCALE))
        })
        .collect()
}

/// Model transform after `seconds` of spinning about Z.
pub fn spin(seconds: f32) -> Mat4 {
    Mat4::from_rotation_z((seconds * SPIN_DEGREES_PER_SEC).to_radians())
}

/// Uploads the sample assets, creates the materials and fills the registry.
///
/// Missing asset files are logged and skipped. Returns the model's mesh id
/// when it was loaded.
pub fn build(engine: &mut Engine, config: &EngineConfig) -> Result<Option<MeshId>> {
    let triangle = engine.upload_mesh("triangle", MeshData::triangle())?;

    let model = match MeshData::load_obj(&config.assets.mesh) {
        Ok(data) => Some(engine.upload_mesh("model", data)?),
        Err(e) => {
            warn!("Skipping model '{}': {}", config.assets.mesh.display(), e);
            None
        }
    };

    let textured = match ImageData::load(&config.assets.texture) {
        Ok(image) => {
            engine.upload_texture("model", &image)?;
            true
        }
        Err(e) => {
            warn!("Skipping texture '{}': {}", config.assets.texture.display(), e);
            false
        }
    };

    let default_material = engine.create_material(DEFAULT_MATERIAL, DEFAULT_LIT_SHADER, None)?;
    let textured_material = if textured {
        engine.create_material(TEXTURED_MATERIAL, TEXTURED_LIT_SHADER, Some("model"))?
    } else {
        None
    };

    let registry = engine.registry_mut();
    if let (Some(mesh), Some(material)) = (model, textured_material.or(default_material)) {
        registry.add_renderable(RenderObject {
            mesh,
            material,
            transform: Mat4::IDENTITY,
        })?;
    }
    if let Some(material) = default_material {
        for transform in grid_transforms() {
            registry.add_renderable(RenderObject {
                mesh: triangle,
                material,
                transform,
            })?;
        }
    }
    registry.sort_by_material();

    info!(
        "Scene built: {} renderables",
        engine.registry().renderables().len()
    );
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_grid_covers_square() {
        let grid = grid_transforms();
        assert_eq!(grid.len(), (GRID_SIZE * GRID_SIZE) as usize);

        let first = grid[0].transform_point3(Vec3::ZERO);
        assert_eq!(first, Vec3::new(-20.0, -20.0, 0.0));
        let last = grid[grid.len() - 1].transform_point3(Vec3::ZERO);
        assert_eq!(last, Vec3::new(19.0, 19.0, 0.0));
    }

    #[test]
    fn test_grid_is_scaled() {
        let cell = grid_transforms()[0];
        let p = cell.transform_point3(Vec3::X) - cell.transform_point3(Vec3::ZERO);
        assert_relative_eq!(p.length(), GRID_SCALE);
    }

    #[test]
    fn test_spin_quarter_turn_per_second() {
        let rotated = spin(1.0).transform_vector3(Vec3::X);
        assert_relative_eq!(rotated.x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(rotated.y, 1.0, epsilon = 1e-6);
        assert_eq!(spin(0.0), Mat4::IDENTITY);
    }
}
