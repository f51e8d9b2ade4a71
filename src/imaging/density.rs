//! Minimal pixel-density reader for JPEG, PNG and BMP headers.
//!
//! The `image` crate decodes pixels but drops resolution metadata, so the
//! backend reads it from the raw bytes it already has in memory:
//!
//! - JPEG: JFIF APP0 segment (`units` + `Xdensity`/`Ydensity`)
//! - PNG: `pHYs` chunk (pixels per unit, unit 1 = metre)
//! - BMP: `BITMAPINFOHEADER` pixels-per-metre fields
//!
//! Anything else, or a header that records only an aspect ratio, yields
//! `None` and the caller falls back to [`Dpi::default`].

use super::backend::Dpi;

const INCHES_PER_METRE: f64 = 0.0254;
const CM_PER_INCH: f64 = 2.54;

/// Read the resolution recorded in an encoded image, sniffing the format
/// from its magic bytes.
pub fn read_density(data: &[u8]) -> Option<Dpi> {
    if data.starts_with(&[0xFF, 0xD8]) {
        read_jfif_density(data)
    } else if data.starts_with(PNG_SIGNATURE) {
        read_png_density(data)
    } else if data.starts_with(b"BM") {
        read_bmp_density(data)
    } else {
        None
    }
}

fn positive(dpi: Dpi) -> Option<Dpi> {
    (dpi.x > 0.0 && dpi.y > 0.0).then_some(dpi)
}

// ---------------------------------------------------------------------------
// JPEG: JFIF APP0
// ---------------------------------------------------------------------------

const JFIF_IDENTIFIER: &[u8] = b"JFIF\0";

/// Walk JPEG marker segments up to SOS looking for a JFIF APP0.
///
/// APP0 layout after the length field: "JFIF\0" (5), version (2), units (1),
/// Xdensity (2, BE), Ydensity (2, BE).
fn read_jfif_density(data: &[u8]) -> Option<Dpi> {
    let mut pos = 2;
    while pos + 4 <= data.len() {
        if data[pos] != 0xFF {
            return None;
        }
        let marker = data[pos + 1];
        // SOS (0xDA) means entropy-coded data starts; no APP0 past here.
        if marker == 0xDA || marker == 0xD9 {
            return None;
        }
        if marker == 0xFF {
            // Fill byte
            pos += 1;
            continue;
        }
        if (0xD0..=0xD7).contains(&marker) || marker == 0x01 {
            pos += 2;
            continue;
        }

        let seg_len = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
        let seg_start = pos + 4;
        let seg_end = (pos + 2 + seg_len).min(data.len());

        if marker == 0xE0 && seg_end > seg_start {
            let segment = &data[seg_start..seg_end];
            if segment.len() >= 12 && segment.starts_with(JFIF_IDENTIFIER) {
                let units = segment[7];
                let x = u16::from_be_bytes([segment[8], segment[9]]) as f64;
                let y = u16::from_be_bytes([segment[10], segment[11]]) as f64;
                return match units {
                    1 => positive(Dpi { x, y }),
                    2 => positive(Dpi {
                        x: x * CM_PER_INCH,
                        y: y * CM_PER_INCH,
                    }),
                    _ => None,
                };
            }
        }

        pos += 2 + seg_len;
    }
    None
}

// ---------------------------------------------------------------------------
// PNG: pHYs chunk
// ---------------------------------------------------------------------------

const PNG_SIGNATURE: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Scan PNG chunks (length, type, data, CRC) until `pHYs` or `IDAT`.
fn read_png_density(data: &[u8]) -> Option<Dpi> {
    let mut pos = PNG_SIGNATURE.len();
    while pos + 8 <= data.len() {
        let len = u32::from_be_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]])
            as usize;
        let kind = &data[pos + 4..pos + 8];
        let body_start = pos + 8;
        let body_end = body_start.checked_add(len)?;
        if body_end > data.len() {
            return None;
        }

        match kind {
            b"pHYs" if len >= 9 => {
                let body = &data[body_start..body_end];
                let ppu_x = u32::from_be_bytes([body[0], body[1], body[2], body[3]]) as f64;
                let ppu_y = u32::from_be_bytes([body[4], body[5], body[6], body[7]]) as f64;
                // Unit 0 is aspect ratio only.
                return if body[8] == 1 {
                    positive(Dpi {
                        x: ppu_x * INCHES_PER_METRE,
                        y: ppu_y * INCHES_PER_METRE,
                    })
                } else {
                    None
                };
            }
            b"IDAT" | b"IEND" => return None,
            _ => {}
        }

        pos = body_end + 4;
    }
    None
}

// ---------------------------------------------------------------------------
// BMP: BITMAPINFOHEADER
// ---------------------------------------------------------------------------

/// The info header starts at offset 14; its resolution fields sit at 38/42
/// as little-endian pixels per metre. `BITMAPCOREHEADER` (12 bytes) has none.
fn read_bmp_density(data: &[u8]) -> Option<Dpi> {
    if data.len() < 46 {
        return None;
    }
    let header_size = u32::from_le_bytes([data[14], data[15], data[16], data[17]]);
    if header_size < 40 {
        return None;
    }
    let ppm_x = i32::from_le_bytes([data[38], data[39], data[40], data[41]]) as f64;
    let ppm_y = i32::from_le_bytes([data[42], data[43], data[44], data[45]]) as f64;
    positive(Dpi {
        x: ppm_x * INCHES_PER_METRE,
        y: ppm_y * INCHES_PER_METRE,
    })
}

/// Pixels per metre for a DPI value, as PNG `pHYs` and BMP headers record it.
pub(crate) fn pixels_per_metre(dpi: f64) -> u32 {
    (dpi / INCHES_PER_METRE).round().clamp(1.0, i32::MAX as f64) as u32
}

/// Overwrite the resolution fields of an encoded BMP. Files without a
/// `BITMAPINFOHEADER` are left alone.
pub(crate) fn write_bmp_density(data: &mut [u8], dpi: Dpi) {
    if data.len() < 46 || !data.starts_with(b"BM") {
        return;
    }
    let header_size = u32::from_le_bytes([data[14], data[15], data[16], data[17]]);
    if header_size < 40 {
        return;
    }
    data[38..42].copy_from_slice(&pixels_per_metre(dpi.x).to_le_bytes());
    data[42..46].copy_from_slice(&pixels_per_metre(dpi.y).to_le_bytes());
}
