//! Error types for the renderer.

use lumen_resources::ResourceError;
use lumen_rhi::RhiError;
use lumen_scene::SceneError;
use thiserror::Error;

/// Renderer error type, wrapping the layers below it.
#[derive(Error, Debug)]
pub enum RenderError {
    /// Vulkan, allocator or synchronization failure
    #[error(transparent)]
    Rhi(#[from] RhiError),

    /// Window or surface failure
    #[error(transparent)]
    Platform(#[from] lumen_core::Error),

    /// Mesh or image loading failure
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// Registry failure
    #[error(transparent)]
    Scene(#[from] SceneError),

    /// A name looked up in the registry was never registered
    #[error("No {kind} named '{name}'")]
    NotFound { kind: &'static str, name: String },

    /// The presentation engine returned an image index with no framebuffer
    #[error("Swapchain image {0} has no framebuffer")]
    NoFramebuffer(u32),
}

impl RenderError {
    /// Whether the error comes from the asset itself (its data or its name)
    /// rather than from the GPU.
    pub fn is_asset_error(&self) -> bool {
        matches!(
            self,
            Self::Resource(_)
                | Self::Scene(_)
                | Self::NotFound { .. }
                | Self::Rhi(RhiError::EmptyBuffer(_))
        )
    }
}

/// Result type alias for renderer operations.
pub type RenderResult<T> = Result<T, RenderError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_asset_errors() {
        let duplicate = RenderError::Scene(SceneError::Duplicate {
            kind: "mesh",
            name: "triangle".to_string(),
        });
        assert!(duplicate.is_asset_error());
        assert!(RenderError::Rhi(RhiError::EmptyBuffer("mesh 'empty'".to_string())).is_asset_error());
        assert!(RenderError::Resource(ResourceError::FileNotFound(PathBuf::from("a.obj"))).is_asset_error());
        assert!(
            RenderError::NotFound {
                kind: "texture",
                name: "missing".to_string(),
            }
            .is_asset_error()
        );
    }

    #[test]
    fn test_gpu_errors_are_not_asset_errors() {
        assert!(!RenderError::NoFramebuffer(3).is_asset_error());
        assert!(!RenderError::Rhi(RhiError::Timeout {
            what: "fence",
            timeout_ns: 1,
        }).is_asset_error());
    }
}
