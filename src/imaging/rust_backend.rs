//! Pure Rust codec backend built on the `image` crate.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, BMP, TIFF, WebP, GIF) | `image::ImageReader` with format sniffing |
//! | Read DPI | custom [`density`](super::density) header reader |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder` (quality + pixel density) |
//! | Encode → PNG | `png::Encoder` (pixel dimensions in a `pHYs` chunk) |
//! | Encode → BMP | `DynamicImage::write_to`, then the header's pixels-per-metre |

use super::backend::{BackendError, CompositeResult, ImageBackend, Raster};
use super::density::{pixels_per_metre, read_density, write_bmp_density};
use super::params::OutputFormat;
use image::codecs::jpeg::{JpegEncoder, PixelDensity, PixelDensityUnit};
use image::{ImageEncoder, ImageFormat, ImageReader};
use std::io::{BufWriter, Cursor, Write};
use std::path::Path;
use std::sync::LazyLock;

/// Extensions whose decoders are compiled in.
const INPUT_CANDIDATES: &[(&str, ImageFormat)] = &[
    ("jpg", ImageFormat::Jpeg),
    ("jpeg", ImageFormat::Jpeg),
    ("png", ImageFormat::Png),
    ("bmp", ImageFormat::Bmp),
    ("tif", ImageFormat::Tiff),
    ("tiff", ImageFormat::Tiff),
    ("webp", ImageFormat::WebP),
    ("gif", ImageFormat::Gif),
];

static SUPPORTED_EXTENSIONS: LazyLock<Vec<&'static str>> = LazyLock::new(|| {
    INPUT_CANDIDATES
        .iter()
        .filter(|(_, fmt)| fmt.reading_enabled())
        .map(|(ext, _)| *ext)
        .collect()
});

/// Returns the set of image file extensions that have working decoders compiled in.
pub fn supported_input_extensions() -> &'static [&'static str] {
    &SUPPORTED_EXTENSIONS
}

/// Backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn encode_jpeg<W: Write>(
    image: &CompositeResult,
    writer: W,
    quality: u8,
) -> image::ImageResult<()> {
    let mut encoder = JpegEncoder::new_with_quality(writer, quality);
    encoder.set_pixel_density(PixelDensity {
        density: (clamp_density(image.dpi.x), clamp_density(image.dpi.y)),
        unit: PixelDensityUnit::Inches,
    });
    // JPEG has no alpha channel.
    let rgb = image.pixels.to_rgb8();
    encoder.write_image(
        rgb.as_raw(),
        rgb.width(),
        rgb.height(),
        image::ExtendedColorType::Rgb8,
    )
}

fn encode_png<W: Write>(image: &CompositeResult, writer: W) -> Result<(), png::EncodingError> {
    let (width, height) = (image.pixels.width(), image.pixels.height());
    let (color, data) = if image.pixels.color().has_alpha() {
        (png::ColorType::Rgba, image.pixels.to_rgba8().into_raw())
    } else {
        (png::ColorType::Rgb, image.pixels.to_rgb8().into_raw())
    };

    let mut encoder = png::Encoder::new(writer, width, height);
    encoder.set_color(color);
    encoder.set_depth(png::BitDepth::Eight);
    encoder.set_pixel_dims(Some(png::PixelDimensions {
        xppu: pixels_per_metre(image.dpi.x),
        yppu: pixels_per_metre(image.dpi.y),
        unit: png::Unit::Meter,
    }));
    let mut writer = encoder.write_header()?;
    writer.write_image_data(&data)?;
    writer.finish()
}

fn encode_bmp(image: &CompositeResult) -> image::ImageResult<Vec<u8>> {
    let mut bytes = Cursor::new(Vec::new());
    image.pixels.write_to(&mut bytes, ImageFormat::Bmp)?;
    let mut bytes = bytes.into_inner();
    write_bmp_density(&mut bytes, image.dpi);
    Ok(bytes)
}

fn clamp_density(dpi: f64) -> u16 {
    dpi.round().clamp(1.0, u16::MAX as f64) as u16
}

impl ImageBackend for RustBackend {
    fn decode(&self, path: &Path) -> Result<Raster, BackendError> {
        let bytes = std::fs::read(path)?;
        let pixels = ImageReader::new(Cursor::new(&bytes))
            .with_guessed_format()?
            .decode()
            .map_err(|e| BackendError::decode(path, e))?;
        let dpi = read_density(&bytes).unwrap_or_default();
        Ok(Raster::new(pixels, dpi))
    }

    fn encode(
        &self,
        image: &CompositeResult,
        path: &Path,
        format: OutputFormat,
    ) -> Result<(), BackendError> {
        let file = std::fs::File::create(path)?;
        let mut writer = BufWriter::new(file);

        match format {
            OutputFormat::Jpeg(quality) => encode_jpeg(image, &mut writer, quality.value() as u8)
                .map_err(|e| BackendError::encode(path, e))?,
            OutputFormat::Png => {
                encode_png(image, &mut writer).map_err(|e| BackendError::encode(path, e))?
            }
            OutputFormat::Bmp => {
                let bytes = encode_bmp(image).map_err(|e| BackendError::encode(path, e))?;
                writer.write_all(&bytes)?;
            }
        }
        writer.flush()?;
        Ok(())
    }
}
