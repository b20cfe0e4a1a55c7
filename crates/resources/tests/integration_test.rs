//! Integration tests for asset loading from disk.

use std::path::Path;

use lumen_resources::{ImageData, MeshData, ResourceError};

#[test]
fn test_load_bundled_assets() {
    let mesh_path = Path::new("../../assets/lost_empire.obj");
    let texture_path = Path::new("../../assets/lost_empire-RGBA.png");

    // Skip test if the assets are not checked out
    if !mesh_path.exists() || !texture_path.exists() {
        println!("Skipping test: assets not found at {:?}", mesh_path);
        return;
    }

    let mesh = MeshData::load_obj(mesh_path).expect("Failed to load OBJ mesh");
    assert!(mesh.vertex_count() > 0);
    assert_eq!(mesh.vertex_count() % 3, 0, "mesh should be whole triangles");

    let image = ImageData::load(texture_path).expect("Failed to load texture");
    assert_eq!(image.pixels.len(), (image.width * image.height * 4) as usize);
    assert!(image.mip_levels() >= 1);
}

#[test]
fn test_obj_with_two_objects_is_concatenated() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pair.obj");
    std::fs::write(
        &path,
        "o first\nv 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n\
         o second\nv 0 0 1\nv 1 0 1\nv 0 1 1\nf 4 5 6\n",
    )
    .unwrap();

    let mesh = MeshData::load_obj(&path).unwrap();
    assert_eq!(mesh.vertex_count(), 6);
    assert_eq!(mesh.vertices[3].position.z, 1.0);
}

#[test]
fn test_malformed_obj_reports_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.obj");
    std::fs::write(&path, "v 0 0 0\nv 1 0 0\nv 0 1 0\nf one two three\n").unwrap();

    let result = MeshData::load_obj(&path);
    assert!(matches!(
        result,
        Err(ResourceError::ObjLoad { .. }) | Err(ResourceError::EmptyMesh(_))
    ));
}
