//! Image decoding for textures.

use std::path::Path;

use lumen_rhi::image::mip_levels;
use tracing::info;

use crate::error::{ResourceError, ResourceResult};

/// Decoded RGBA8 pixels, row-major, no padding.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageData {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Channels in `pixels`; always 4 after decoding.
    pub channels: u32,
}

impl ImageData {
    /// Decodes the file at `path` (PNG or JPEG) and converts it to RGBA8.
    ///
    /// # Errors
    ///
    /// [`ResourceError::FileNotFound`] for a missing file and
    /// [`ResourceError::Image`] if decoding fails.
    pub fn load(path: &Path) -> ResourceResult<Self> {
        if !path.exists() {
            return Err(ResourceError::FileNotFound(path.to_path_buf()));
        }

        let rgba = image::open(path)?.to_rgba8();
        let (width, height) = rgba.dimensions();
        info!("Loaded image '{}': {}x{}", path.display(), width, height);

        Ok(Self {
            pixels: rgba.into_raw(),
            width,
            height,
            channels: 4,
        })
    }

    /// A single-colour image.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        Self {
            pixels: rgba.repeat((width * height) as usize),
            width,
            height,
            channels: 4,
        }
    }

    /// Full mip chain length for this image.
    #[inline]
    pub fn mip_levels(&self) -> u32 {
        mip_levels(self.width, self.height)
    }

    #[inline]
    pub fn byte_len(&self) -> usize {
        self.pixels.len()
    }

    /// Bytes a tightly packed RGBA8 image of this size needs, or `None` on
    /// overflow.
    pub fn expected_byte_len(&self) -> Option<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)?
            .checked_mul(4)
    }

    /// Checks that `pixels` holds exactly one non-empty RGBA8 image of
    /// `width` x `height`.
    ///
    /// # Errors
    ///
    /// [`ResourceError::InvalidImage`] for zero dimensions, a channel count
    /// other than 4, or a pixel buffer of the wrong length.
    pub fn validate(&self) -> ResourceResult<()> {
        let consistent = self.width > 0
            && self.height > 0
            && self.channels == 4
            && self.expected_byte_len() == Some(self.pixels.len());
        if consistent {
            Ok(())
        } else {
            Err(ResourceError::InvalidImage {
                width: self.width,
                height: self.height,
                channels: self.channels,
                len: self.pixels.len(),
            })
        }
    }
}
