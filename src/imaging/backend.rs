//! Raster types and the decode/encode backend trait.
//!
//! The [`ImageBackend`] trait defines the two operations the engine needs
//! from a codec layer: decode a file into a [`Raster`], and encode a
//! [`CompositeResult`] to a path in a given [`OutputFormat`].
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend), built on the `image`
//! crate. Tests swap in a mock so pipeline logic runs without real files.

use super::params::OutputFormat;
use image::{ColorType, DynamicImage, RgbaImage};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to decode {path}: {message}")]
    Decode { path: String, message: String },
    #[error("Failed to encode {path}: {message}")]
    Encode { path: String, message: String },
}

impl BackendError {
    pub fn decode(path: &Path, message: impl ToString) -> Self {
        BackendError::Decode {
            path: path.display().to_string(),
            message: message.to_string(),
        }
    }

    pub fn encode(path: &Path, message: impl ToString) -> Self {
        BackendError::Encode {
            path: path.display().to_string(),
            message: message.to_string(),
        }
    }
}

/// Dots per inch along each axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dpi {
    pub x: f64,
    pub y: f64,
}

impl Default for Dpi {
    fn default() -> Self {
        Self { x: 96.0, y: 96.0 }
    }
}

/// A decoded image plus its resolution.
///
/// Used for the base canvas: decoded once, read by the compositor, dropped
/// after the composite is built.
#[derive(Debug, Clone)]
pub struct Raster {
    pub pixels: DynamicImage,
    pub dpi: Dpi,
}

/// The base image of a composite.
pub type Canvas = Raster;

impl Raster {
    pub fn new(pixels: DynamicImage, dpi: Dpi) -> Self {
        Self { pixels, dpi }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn color_type(&self) -> ColorType {
        self.pixels.color()
    }
}

/// A decoded watermark, normalized to RGBA8 once.
///
/// Shared behind an `Arc` by every item of a batch run and by successive
/// previews; nothing mutates it after construction.
#[derive(Debug)]
pub struct WatermarkAsset {
    pixels: RgbaImage,
    dpi: Dpi,
    source_color: ColorType,
}

impl WatermarkAsset {
    pub fn from_raster(raster: Raster) -> Self {
        let source_color = raster.color_type();
        Self {
            pixels: raster.pixels.into_rgba8(),
            dpi: raster.dpi,
            source_color,
        }
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn dpi(&self) -> Dpi {
        self.dpi
    }

    /// Pixel format the watermark was decoded with, before normalization.
    pub fn color_type(&self) -> ColorType {
        self.source_color
    }
}

/// Output of the compositor: canvas-sized pixels at canvas DPI.
#[derive(Debug, Clone)]
pub struct CompositeResult {
    pub pixels: DynamicImage,
    pub dpi: Dpi,
}

impl CompositeResult {
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }
}

/// Trait for image codec backends.
///
/// See the [module docs](self).
pub trait ImageBackend: Send + Sync {
    /// Decode an image file, including its DPI when the format records one.
    fn decode(&self, path: &Path) -> Result<Raster, BackendError>;

    /// Encode a composite to `path`, overwriting any existing file.
    fn encode(
        &self,
        image: &CompositeResult,
        path: &Path,
        format: OutputFormat,
    ) -> Result<(), BackendError>;
}
