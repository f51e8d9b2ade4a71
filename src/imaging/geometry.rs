//! Pure placement math for every layout mode.
//!
//! All functions here are pure and testable without any I/O or images.
//! [`compute_plan`] maps a canvas size, the watermark's native size and a set
//! of [`PlacementParams`] to a [`GeometryPlan`]: the ordered list of cells the
//! compositor stamps, back to front.
//!
//! ## Footprint vs. drawn rect
//!
//! Every cell reserves a *footprint* of `target_w × target_h`, where
//! `target_w = canvas_w * width_ratio` and `target_h` follows the watermark's
//! aspect ratio. Padding shrinks the *drawn* rect inside that footprint
//! (`drawn = max(1, target - 2 * padding)`) while the footprint, and therefore
//! its center, stays put. Rotation is about that shared center.
//!
//! ```text
//! ┌──────── footprint ────────┐
//! │ padding                   │
//! │   ┌──── drawn rect ────┐  │
//! │   │         +          │  │   + = rotation center
//! │   └────────────────────┘  │
//! └───────────────────────────┘
//! ```

use super::params::{LayoutMode, PlacementParams};
use thiserror::Error;

/// Upper bound on cells a tiled plan may emit.
pub const MAX_TILE_CELLS: u64 = 1_000_000;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("width ratio must be a positive number, got {0}")]
    InvalidWidthRatio(f64),
    #[error("watermark has zero size ({width}x{height})")]
    EmptyWatermark { width: u32, height: u32 },
    #[error("{name} must be finite{constraint}, got {value}")]
    InvalidParameter {
        name: &'static str,
        constraint: &'static str,
        value: f64,
    },
    #[error("tile step must be positive, got {step_x}x{step_y}")]
    NonPositiveStep { step_x: f64, step_y: f64 },
    #[error("tiling would emit {0} cells, more than the limit of 1,000,000")]
    TooManyCells(u64),
}

/// A 2D point in canvas pixel space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// One watermark instance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacementCell {
    /// Top-left corner of the drawn (padding-shrunk) rect.
    pub top_left: Point,
    pub cell_width: f64,
    pub cell_height: f64,
    pub drawn_width: f64,
    pub drawn_height: f64,
    pub rotation_deg: f64,
}

impl PlacementCell {
    /// Top-left corner of the footprint.
    pub fn footprint_origin(&self) -> Point {
        Point {
            x: self.top_left.x - (self.cell_width - self.drawn_width) / 2.0,
            y: self.top_left.y - (self.cell_height - self.drawn_height) / 2.0,
        }
    }

    /// Center of the footprint, which is also the center of the drawn rect.
    pub fn center(&self) -> Point {
        Point {
            x: self.top_left.x + self.drawn_width / 2.0,
            y: self.top_left.y + self.drawn_height / 2.0,
        }
    }
}

/// The grid a tiled plan was stepped from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileGrid {
    pub cols: u64,
    pub rows: u64,
    pub step_x: f64,
    pub step_y: f64,
}

/// Ordered placement cells for one canvas.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GeometryPlan {
    pub cells: Vec<PlacementCell>,
    /// Present for tiled layouts only.
    pub grid: Option<TileGrid>,
}

impl GeometryPlan {
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }
}

/// Footprint and drawn sizes shared by every cell of a plan.
#[derive(Debug, Clone, Copy, PartialEq)]
struct CellSize {
    target_w: f64,
    target_h: f64,
    drawn_w: f64,
    drawn_h: f64,
}

impl CellSize {
    fn new(canvas_w: f64, wm_w: f64, wm_h: f64, params: &PlacementParams) -> Self {
        let target_w = canvas_w * params.width_ratio;
        let scale = target_w / wm_w;
        let target_h = wm_h * scale;
        Self {
            target_w,
            target_h,
            drawn_w: (target_w - 2.0 * params.padding).max(1.0),
            drawn_h: (target_h - 2.0 * params.padding).max(1.0),
        }
    }

    /// A cell whose footprint starts at `origin`, drawn rect centered inside.
    fn cell_at(&self, origin: Point, rotation_deg: f64) -> PlacementCell {
        PlacementCell {
            top_left: Point {
                x: origin.x + (self.target_w - self.drawn_w) / 2.0,
                y: origin.y + (self.target_h - self.drawn_h) / 2.0,
            },
            cell_width: self.target_w,
            cell_height: self.target_h,
            drawn_width: self.drawn_w,
            drawn_height: self.drawn_h,
            rotation_deg,
        }
    }
}

/// Compute the placement plan for one canvas.
///
/// # Arguments
/// * `canvas_w`, `canvas_h` - Base image size in pixels
/// * `watermark_w`, `watermark_h` - Native watermark size in pixels
/// * `params` - Placement parameters
///
/// # Returns
/// * One cell for anchored layouts, a grid of cells for tiled layouts, no
///   cells for a zero-sized canvas.
///
/// # Examples
/// ```
/// # use watermarker::imaging::{compute_plan, LayoutMode, PlacementParams};
/// let params = PlacementParams {
///     width_ratio: 0.2,
///     padding: 0.0,
///     layout: LayoutMode::Center,
///     ..PlacementParams::default()
/// };
/// let plan = compute_plan(1000, 800, 200, 100, &params).unwrap();
/// assert_eq!(plan.cells.len(), 1);
/// assert_eq!((plan.cells[0].top_left.x, plan.cells[0].top_left.y), (400.0, 350.0));
/// ```
pub fn compute_plan(
    canvas_w: u32,
    canvas_h: u32,
    watermark_w: u32,
    watermark_h: u32,
    params: &PlacementParams,
) -> Result<GeometryPlan, GeometryError> {
    validate(watermark_w, watermark_h, params)?;

    if canvas_w == 0 || canvas_h == 0 {
        return Ok(GeometryPlan::default());
    }

    let (cw, ch) = (canvas_w as f64, canvas_h as f64);
    let size = CellSize::new(cw, watermark_w as f64, watermark_h as f64, params);

    match params.layout {
        LayoutMode::Tiled => tiled_plan(cw, ch, &size, params, false),
        LayoutMode::StaggeredTiled => tiled_plan(cw, ch, &size, params, true),
        anchored => {
            let origin = anchored_origin(anchored, cw, ch, &size, params);
            Ok(GeometryPlan {
                cells: vec![size.cell_at(origin, params.rotation_deg)],
                grid: None,
            })
        }
    }
}

fn validate(
    watermark_w: u32,
    watermark_h: u32,
    params: &PlacementParams,
) -> Result<(), GeometryError> {
    if !params.width_ratio.is_finite() || params.width_ratio <= 0.0 {
        return Err(GeometryError::InvalidWidthRatio(params.width_ratio));
    }
    if watermark_w == 0 || watermark_h == 0 {
        return Err(GeometryError::EmptyWatermark {
            width: watermark_w,
            height: watermark_h,
        });
    }
    for (name, value) in [
        ("offset_x", params.offset_x),
        ("offset_y", params.offset_y),
        ("rotation_deg", params.rotation_deg),
    ] {
        if !value.is_finite() {
            return Err(GeometryError::InvalidParameter {
                name,
                constraint: "",
                value,
            });
        }
    }
    if !params.padding.is_finite() || params.padding < 0.0 {
        return Err(GeometryError::InvalidParameter {
            name: "padding",
            constraint: " and non-negative",
            value: params.padding,
        });
    }
    Ok(())
}

/// Footprint origin for the nine anchored layouts, clamped to the canvas.
fn anchored_origin(
    layout: LayoutMode,
    canvas_w: f64,
    canvas_h: f64,
    size: &CellSize,
    params: &PlacementParams,
) -> Point {
    let margin = params.padding;
    let near_x = margin + params.offset_x;
    let mid_x = (canvas_w - size.target_w) / 2.0 + params.offset_x;
    let far_x = canvas_w - size.target_w - margin + params.offset_x;
    let near_y = margin + params.offset_y;
    let mid_y = (canvas_h - size.target_h) / 2.0 + params.offset_y;
    let far_y = canvas_h - size.target_h - margin + params.offset_y;

    let (x, y) = match layout {
        LayoutMode::TopLeft => (near_x, near_y),
        LayoutMode::TopCenter => (mid_x, near_y),
        LayoutMode::TopRight => (far_x, near_y),
        LayoutMode::MidLeft => (near_x, mid_y),
        LayoutMode::MidRight => (far_x, mid_y),
        LayoutMode::BottomLeft => (near_x, far_y),
        LayoutMode::BottomCenter => (mid_x, far_y),
        LayoutMode::BottomRight => (far_x, far_y),
        // Tiled layouts never reach here; treat them as centered.
        LayoutMode::Center | LayoutMode::Tiled | LayoutMode::StaggeredTiled => (mid_x, mid_y),
    };

    Point {
        x: clamp_to_canvas(x, size.target_w, canvas_w),
        y: clamp_to_canvas(y, size.target_h, canvas_h),
    }
}

/// Keep `[pos, pos + extent]` on the canvas. An extent wider than the canvas
/// ends up pinned to the far edge (negative position).
fn clamp_to_canvas(pos: f64, extent: f64, canvas: f64) -> f64 {
    let mut pos = pos.max(0.0);
    if pos + extent > canvas {
        pos = canvas - extent;
    }
    pos
}

fn tiled_plan(
    canvas_w: f64,
    canvas_h: f64,
    size: &CellSize,
    params: &PlacementParams,
    staggered: bool,
) -> Result<GeometryPlan, GeometryError> {
    let step_x = size.target_w + params.offset_x;
    let step_y = size.target_h + params.offset_y;
    if !(step_x > 0.0 && step_y > 0.0) {
        return Err(GeometryError::NonPositiveStep { step_x, step_y });
    }

    let base_cols = (canvas_w / step_x).ceil();
    let rows = (canvas_h / step_y).ceil();
    // Staggered rows shift left by half a step, so one more column keeps the
    // right edge covered.
    let cols = if staggered { base_cols + 1.0 } else { base_cols };

    let total = cols * rows;
    if !total.is_finite() || total > MAX_TILE_CELLS as f64 {
        return Err(GeometryError::TooManyCells(if total.is_finite() {
            total as u64
        } else {
            u64::MAX
        }));
    }
    let (cols, rows) = (cols as u64, rows as u64);

    let mut cells = Vec::with_capacity((cols * rows) as usize);
    for row in 0..rows {
        let pos_y = row as f64 * step_y;
        let row_shift = if staggered && row % 2 == 1 {
            step_x / 2.0
        } else {
            0.0
        };

        for col in 0..cols {
            let pos_x = col as f64 * step_x - row_shift;

            let visible = if staggered {
                pos_x + size.target_w > 0.0 && pos_x < canvas_w && pos_y < canvas_h
            } else {
                pos_x < canvas_w && pos_y < canvas_h
            };
            if visible {
                cells.push(size.cell_at(Point { x: pos_x, y: pos_y }, params.rotation_deg));
            }
        }
    }

    Ok(GeometryPlan {
        cells,
        grid: Some(TileGrid {
            cols,
            rows,
            step_x,
            step_y,
        }),
    })
}
