//! Error types for the object registry.

use thiserror::Error;

/// Registry errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SceneError {
    /// A mesh, material or texture with this name is already registered.
    #[error("{kind} '{name}' is already registered")]
    Duplicate { kind: &'static str, name: String },

    /// A renderable referenced an id the registry never issued.
    #[error("Unknown {kind} id {id}")]
    UnknownId { kind: &'static str, id: u32 },
}

/// Result type alias for registry operations.
pub type SceneResult<T> = Result<T, SceneError>;
