//! Error types for asset loading.

use std::path::PathBuf;
use thiserror::Error;

/// Error type for asset loading operations.
#[derive(Error, Debug)]
pub enum ResourceError {
    /// The asset path does not exist.
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// tobj rejected the file.
    #[error("Failed to load OBJ file '{path}': {message}")]
    ObjLoad {
        /// Path to the file that failed to load.
        path: PathBuf,
        /// Parser message.
        message: String,
    },

    /// The file parsed but produced no triangles.
    #[error("Mesh '{0}' contains no triangles")]
    EmptyMesh(PathBuf),

    /// Pixel data that does not describe a `width` x `height` RGBA8 image.
    #[error("Invalid {width}x{height} image: {len} bytes with {channels} channel(s)")]
    InvalidImage {
        width: u32,
        height: u32,
        channels: u32,
        len: usize,
    },

    /// Image decoding error.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for resource operations.
pub type ResourceResult<T> = Result<T, ResourceError>;
