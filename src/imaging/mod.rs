//! Image processing: placement math, compositing and codecs.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Decode** | `image::ImageReader` (JPEG, PNG, BMP, TIFF, WebP, GIF) |
//! | **DPI** | custom header reader (JFIF APP0, PNG `pHYs`, BMP info header) |
//! | **Resize** | `image::imageops::resize`, Lanczos3 |
//! | **Rotate + blend** | bilinear rotation, Porter-Duff "over", rows on rayon |
//! | **Encode** | `JpegEncoder` with quality + density, BMP, PNG |
//!
//! The module is split into:
//! - **Parameters**: layout modes, placement values, quality, output format
//! - **Geometry**: pure functions from sizes + parameters to placement cells
//! - **Compositor**: stamps the watermark onto the canvas for every cell
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]

pub mod backend;
pub mod compositor;
mod density;
pub mod geometry;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, Canvas, CompositeResult, Dpi, ImageBackend, Raster, WatermarkAsset};
pub use compositor::composite;
pub use geometry::{GeometryError, GeometryPlan, PlacementCell, Point, TileGrid, compute_plan};
pub use params::{LayoutMode, OutputFormat, PlacementParams, Quality};
pub use rust_backend::{RustBackend, supported_input_extensions};
