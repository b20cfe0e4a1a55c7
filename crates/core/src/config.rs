//! Engine configuration.
//!
//! Loaded from a TOML file; every field has a default so a partial (or
//! missing) file is fine.
//!
//! ```toml
//! [window]
//! title = "lumen"
//! width = 1700
//! height = 900
//!
//! [renderer]
//! validation = true
//! vsync = true
//! max_objects = 10000
//! shader_dir = "shaders"
//!
//! [camera]
//! position = [2.0, 2.0, 2.0]
//! target = [0.0, 0.0, 0.0]
//!
//! [policy]
//! on_gpu_error = "abort"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{Error, FailurePolicy, Result};

/// Where [`EngineConfig::load_or_default`] got its values from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    /// The file at this path did not exist.
    Defaults(PathBuf),
}

impl ConfigSource {
    /// Logs where the configuration came from.
    pub fn report(&self) {
        match self {
            Self::File(path) => info!("Loaded config from {}", path.display()),
            Self::Defaults(path) => {
                warn!("Config file {} not found, using defaults", path.display())
            }
        }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub window: WindowConfig,
    pub renderer: RendererConfig,
    pub camera: CameraConfig,
    pub assets: AssetConfig,
    pub policy: PolicyConfig,
    pub logging: LoggingConfig,
}

/// Window configuration. The window is created at a fixed size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "lumen".to_string(),
            width: 1700,
            height: 900,
        }
    }
}

/// Renderer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Enable the Khronos validation layer when it is installed.
    pub validation: bool,
    /// FIFO presentation when true, mailbox (if supported) otherwise.
    pub vsync: bool,
    /// Capacity of each frame slot's object storage buffer.
    pub max_objects: u32,
    /// Directory holding compiled `.spv` shaders.
    pub shader_dir: PathBuf,
    /// Pulse the clear colour with the frame number.
    pub clear_flash: bool,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            validation: cfg!(debug_assertions),
            vsync: true,
            max_objects: 10_000,
            shader_dir: PathBuf::from("shaders"),
            clear_flash: true,
        }
    }
}

/// The single camera used for every frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub position: [f32; 3],
    pub target: [f32; 3],
    pub up: [f32; 3],
    pub fov_degrees: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            position: [2.0, 2.0, 2.0],
            target: [0.0, 0.0, 0.0],
            up: [0.0, 0.0, 1.0],
            fov_degrees: 45.0,
            near: 0.1,
            far: 200.0,
        }
    }
}

/// Paths to the sample assets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetConfig {
    pub mesh: PathBuf,
    pub texture: PathBuf,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            mesh: PathBuf::from("assets/lost_empire.obj"),
            texture: PathBuf::from("assets/lost_empire-RGBA.png"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub on_gpu_error: FailurePolicy,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` filter directive. Empty means the built-in default.
    pub filter: String,
}

impl EngineConfig {
    /// Parse a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the text is not valid TOML for this schema
    /// or fails validation.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read and [`Error::Config`]
    /// if it cannot be parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&contents)
    }

    /// Load a configuration file, falling back to defaults when it is absent.
    ///
    /// A file that exists but does not parse is still an error. Nothing is
    /// logged here since the logging filter usually comes from this file;
    /// call [`ConfigSource::report`] once logging is up.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<(Self, ConfigSource)> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok((Self::default(), ConfigSource::Defaults(path.to_path_buf())));
        }

        let config = Self::from_file(path)?;
        Ok((config, ConfigSource::File(path.to_path_buf())))
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.window.width == 0 || self.window.height == 0 {
            return Err(Error::Config(
                "window width and height must be greater than 0".to_string(),
            ));
        }
        if self.renderer.max_objects == 0 {
            return Err(Error::Config(
                "renderer.max_objects must be greater than 0".to_string(),
            ));
        }
        if !(self.camera.near > 0.0 && self.camera.far > self.camera.near) {
            return Err(Error::Config(
                "camera planes must satisfy 0 < near < far".to_string(),
            ));
        }
        Ok(())
    }
}
