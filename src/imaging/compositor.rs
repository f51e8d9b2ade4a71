//! Stamps a watermark onto a canvas following a [`GeometryPlan`].
//!
//! For every cell, back to front:
//!
//! 1. Resize the watermark to the cell's drawn size (Lanczos3, at least 1×1).
//! 2. Rotate it about its center when the cell asks for a non-zero angle.
//! 3. Blend it with Porter-Duff "over" so its center sits on the cell center.
//!
//! Stamps that stick out past the canvas are clipped. Rows of a stamp are
//! blended in parallel on the rayon pool.

use super::backend::{Canvas, CompositeResult, WatermarkAsset};
use super::geometry::{GeometryPlan, PlacementCell};
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgba, RgbaImage};
use rayon::prelude::*;

/// Composite `watermark` onto a copy of `canvas` at every cell of `plan`.
///
/// The result has the canvas's size and DPI. A canvas without an alpha
/// channel produces an RGB result.
pub fn composite(
    canvas: &Canvas,
    watermark: &WatermarkAsset,
    plan: &GeometryPlan,
) -> CompositeResult {
    let keep_alpha = canvas.color_type().has_alpha();
    let mut base = canvas.pixels.to_rgba8();

    let mut stamps = StampCache::default();
    for cell in &plan.cells {
        let stamp = stamps.get(watermark, cell);
        let center = cell.center();
        place_sprite(&mut base, stamp, center.x, center.y);
    }

    tracing::debug!(
        cells = plan.len(),
        width = base.width(),
        height = base.height(),
        "composited watermark"
    );

    let pixels = DynamicImage::ImageRgba8(base);
    CompositeResult {
        pixels: if keep_alpha {
            pixels
        } else {
            DynamicImage::ImageRgb8(pixels.into_rgb8())
        },
        dpi: canvas.dpi,
    }
}

/// Keeps the last resized (and rotated) sprite. Every cell of a plan shares
/// one size and angle, so a plan resizes once.
#[derive(Default)]
struct StampCache {
    cached: Option<((u32, u32, u64), RgbaImage)>,
}

impl StampCache {
    fn get(&mut self, watermark: &WatermarkAsset, cell: &PlacementCell) -> &RgbaImage {
        let width = (cell.drawn_width.round() as u32).max(1);
        let height = (cell.drawn_height.round() as u32).max(1);
        let angle = cell.rotation_deg % 360.0;
        // -0.0 and 0.0 must share a key.
        let angle = if angle == 0.0 { 0.0 } else { angle };
        let key = (width, height, angle.to_bits());

        if self.cached.as_ref().is_some_and(|(k, _)| *k != key) {
            self.cached = None;
        }
        let (_, sprite) = self
            .cached
            .get_or_insert_with(|| (key, render_sprite(watermark, width, height, angle)));
        sprite
    }
}

fn render_sprite(watermark: &WatermarkAsset, width: u32, height: u32, angle: f64) -> RgbaImage {
    let resized = if watermark.pixels().dimensions() == (width, height) {
        watermark.pixels().clone()
    } else {
        imageops::resize(watermark.pixels(), width, height, FilterType::Lanczos3)
    };
    if angle != 0.0 {
        rotate_about_center(&resized, angle)
    } else {
        resized
    }
}

/// Rotate `image` clockwise by `degrees` about its center.
///
/// The output is the bounding box of the rotated source, with the source
/// center mapped to the output center. Samples are bilinear over
/// premultiplied alpha; anything outside the source is transparent.
pub fn rotate_about_center(image: &RgbaImage, degrees: f64) -> RgbaImage {
    let radians = degrees.to_radians();
    let (sin, cos) = radians.sin_cos();

    let src_w = image.width() as f64;
    let src_h = image.height() as f64;
    let cx = src_w / 2.0;
    let cy = src_h / 2.0;

    // Bounding box of the rotated corners.
    let corners = [(-cx, -cy), (cx, -cy), (-cx, cy), (cx, cy)];
    let (mut min_x, mut max_x) = (f64::INFINITY, f64::NEG_INFINITY);
    let (mut min_y, mut max_y) = (f64::INFINITY, f64::NEG_INFINITY);
    for (x, y) in corners {
        let rx = x * cos - y * sin;
        let ry = x * sin + y * cos;
        min_x = min_x.min(rx);
        max_x = max_x.max(rx);
        min_y = min_y.min(ry);
        max_y = max_y.max(ry);
    }
    // Trim float noise so a quarter turn of a 200×100 sprite is 100×200.
    let dst_w = ((max_x - min_x - 1e-9).ceil() as u32).max(1);
    let dst_h = ((max_y - min_y - 1e-9).ceil() as u32).max(1);
    let dst_cx = dst_w as f64 / 2.0;
    let dst_cy = dst_h as f64 / 2.0;

    let mut rotated = RgbaImage::new(dst_w, dst_h);
    let row_len = dst_w as usize * 4;
    let buf: &mut [u8] = &mut rotated;
    buf.par_chunks_mut(row_len)
        .enumerate()
        .for_each(|(dy, row)| {
            let ry = dy as f64 + 0.5 - dst_cy;
            for (dx, out) in row.chunks_exact_mut(4).enumerate() {
                let rx = dx as f64 + 0.5 - dst_cx;
                // Inverse rotation maps the output pixel center into the source.
                let sx = rx * cos + ry * sin + cx - 0.5;
                let sy = -rx * sin + ry * cos + cy - 0.5;
                out.copy_from_slice(&sample_bilinear(image, sx, sy).0);
            }
        });
    rotated
}

fn sample_bilinear(image: &RgbaImage, sx: f64, sy: f64) -> Rgba<u8> {
    let x0 = sx.floor();
    let y0 = sy.floor();
    let fx = sx - x0;
    let fy = sy - y0;

    let taps = [
        (x0, y0, (1.0 - fx) * (1.0 - fy)),
        (x0 + 1.0, y0, fx * (1.0 - fy)),
        (x0, y0 + 1.0, (1.0 - fx) * fy),
        (x0 + 1.0, y0 + 1.0, fx * fy),
    ];

    let mut premul = [0.0f64; 3];
    let mut alpha = 0.0f64;
    for (x, y, weight) in taps {
        if weight == 0.0 || x < 0.0 || y < 0.0 {
            continue;
        }
        let (x, y) = (x as u32, y as u32);
        if x >= image.width() || y >= image.height() {
            continue;
        }
        let p = image.get_pixel(x, y).0;
        let a = p[3] as f64 * weight;
        for (acc, channel) in premul.iter_mut().zip(p) {
            *acc += channel as f64 * a;
        }
        alpha += a;
    }

    if alpha <= 0.0 {
        return Rgba([0, 0, 0, 0]);
    }
    let channel = |v: f64| (v / alpha).round().clamp(0.0, 255.0) as u8;
    Rgba([
        channel(premul[0]),
        channel(premul[1]),
        channel(premul[2]),
        alpha.round().clamp(0.0, 255.0) as u8,
    ])
}

/// Blend `sprite` onto `base` with its center at (`center_x`, `center_y`).
fn place_sprite(base: &mut RgbaImage, sprite: &RgbaImage, center_x: f64, center_y: f64) {
    let origin_x = (center_x - sprite.width() as f64 / 2.0).round() as i64;
    let origin_y = (center_y - sprite.height() as f64 / 2.0).round() as i64;

    let base_w = base.width() as i64;
    let base_h = base.height() as i64;
    let x_start = origin_x.max(0);
    let y_start = origin_y.max(0);
    let x_end = (origin_x + sprite.width() as i64).min(base_w);
    let y_end = (origin_y + sprite.height() as i64).min(base_h);
    if x_start >= x_end || y_start >= y_end {
        return;
    }

    let row_len = base_w as usize * 4;
    let first = y_start as usize * row_len;
    let last = y_end as usize * row_len;
    let buf: &mut [u8] = &mut **base;
    buf[first..last]
        .par_chunks_mut(row_len)
        .enumerate()
        .for_each(|(i, row)| {
            let sy = (y_start + i as i64 - origin_y) as u32;
            for tx in x_start..x_end {
                let sx = (tx - origin_x) as u32;
                let offset = tx as usize * 4;
                let px = &mut row[offset..offset + 4];
                let blended = blend_pixels(
                    Rgba([px[0], px[1], px[2], px[3]]),
                    *sprite.get_pixel(sx, sy),
                );
                px.copy_from_slice(&blended.0);
            }
        });
}

/// Porter-Duff "over": `out = fg + bg * (1 - fg.alpha)`.
fn blend_pixels(background: Rgba<u8>, foreground: Rgba<u8>) -> Rgba<u8> {
    match foreground[3] {
        0 => return background,
        255 => return foreground,
        _ => {}
    }

    let fg_alpha = foreground[3] as f32 / 255.0;
    let bg_alpha = background[3] as f32 / 255.0;
    let out_alpha = fg_alpha + bg_alpha * (1.0 - fg_alpha);

    let blend_channel = |fg: u8, bg: u8| -> u8 {
        let fg_f = fg as f32 / 255.0;
        let bg_f = bg as f32 / 255.0;
        let result = (fg_f * fg_alpha + bg_f * bg_alpha * (1.0 - fg_alpha)) / out_alpha;
        (result * 255.0).round().clamp(0.0, 255.0) as u8
    };

    Rgba([
        blend_channel(foreground[0], background[0]),
        blend_channel(foreground[1], background[1]),
        blend_channel(foreground[2], background[2]),
        (out_alpha * 255.0).round() as u8,
    ])
}
