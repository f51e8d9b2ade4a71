//! Parameter types for watermark operations.
//!
//! These types describe *what* to draw and *how* to encode it, not how the
//! pixels get there. They are the interface between the settings layer (which
//! persists them), the [`geometry`](super::geometry) module (which turns them
//! into placement cells) and the [`backend`](super::backend) (which encodes
//! the result).
//!
//! ## Types
//!
//! - [`LayoutMode`]: one of nine anchors, regular tiling, or row-staggered tiling.
//! - [`PlacementParams`]: width ratio, offsets, rotation, padding and layout.
//! - [`Quality`]: lossy encoding quality (1–100, default 90). Clamped on construction.
//! - [`OutputFormat`]: encoder selected from the destination file extension.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Where, and how many times, the watermark is drawn.
///
/// The declaration order is the persisted ordinal (`TopLeft` = 0 …
/// `StaggeredTiled` = 10).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LayoutMode {
    TopLeft,
    TopCenter,
    TopRight,
    MidLeft,
    #[default]
    Center,
    MidRight,
    BottomLeft,
    BottomCenter,
    BottomRight,
    Tiled,
    StaggeredTiled,
}

impl LayoutMode {
    pub const ALL: [LayoutMode; 11] = [
        LayoutMode::TopLeft,
        LayoutMode::TopCenter,
        LayoutMode::TopRight,
        LayoutMode::MidLeft,
        LayoutMode::Center,
        LayoutMode::MidRight,
        LayoutMode::BottomLeft,
        LayoutMode::BottomCenter,
        LayoutMode::BottomRight,
        LayoutMode::Tiled,
        LayoutMode::StaggeredTiled,
    ];

    pub fn ordinal(self) -> usize {
        self as usize
    }

    pub fn from_ordinal(ordinal: usize) -> Option<Self> {
        Self::ALL.get(ordinal).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            LayoutMode::TopLeft => "top-left",
            LayoutMode::TopCenter => "top-center",
            LayoutMode::TopRight => "top-right",
            LayoutMode::MidLeft => "mid-left",
            LayoutMode::Center => "center",
            LayoutMode::MidRight => "mid-right",
            LayoutMode::BottomLeft => "bottom-left",
            LayoutMode::BottomCenter => "bottom-center",
            LayoutMode::BottomRight => "bottom-right",
            LayoutMode::Tiled => "tiled",
            LayoutMode::StaggeredTiled => "staggered-tiled",
        }
    }

    /// True for the two repeating layouts.
    pub fn is_tiled(self) -> bool {
        matches!(self, LayoutMode::Tiled | LayoutMode::StaggeredTiled)
    }
}

impl fmt::Display for LayoutMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LayoutMode {
    type Err = String;

    /// Accepts a layout name (`bottom-right`) or its ordinal (`8`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(ordinal) = s.parse::<usize>() {
            return Self::from_ordinal(ordinal)
                .ok_or_else(|| format!("layout ordinal {ordinal} out of range 0-10"));
        }
        Self::ALL
            .into_iter()
            .find(|mode| mode.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown layout '{s}'"))
    }
}

/// Placement parameters read fresh on every recompute.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlacementParams {
    /// Footprint width as a fraction of the canvas width.
    pub width_ratio: f64,
    pub offset_x: f64,
    pub offset_y: f64,
    /// Clockwise, in degrees.
    pub rotation_deg: f64,
    /// Inset that shrinks the drawn watermark inside its footprint. Also the
    /// edge margin for anchored layouts.
    pub padding: f64,
    pub layout: LayoutMode,
}

impl Default for PlacementParams {
    fn default() -> Self {
        Self {
            width_ratio: 0.2,
            offset_x: 0.0,
            offset_y: 0.0,
            rotation_deg: 0.0,
            padding: 20.0,
            layout: LayoutMode::Center,
        }
    }
}

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(90)
    }
}

/// Encoder chosen by destination extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Jpeg(Quality),
    Bmp,
    /// Lossless default for every other extension, `.png` included.
    Png,
}

impl OutputFormat {
    pub fn for_path(path: &Path, quality: Quality) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        match ext.as_str() {
            "jpg" | "jpeg" => OutputFormat::Jpeg(quality),
            "bmp" => OutputFormat::Bmp,
            _ => OutputFormat::Png,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_clamps_to_valid_range() {
        assert_eq!(Quality::new(0).value(), 1);
        assert_eq!(Quality::new(50).value(), 50);
        assert_eq!(Quality::new(150).value(), 100);
    }

    #[test]
    fn quality_default_is_90() {
        assert_eq!(Quality::default().value(), 90);
    }

    #[test]
    fn layout_ordinals_follow_declaration_order() {
        for (i, mode) in LayoutMode::ALL.iter().enumerate() {
            assert_eq!(mode.ordinal(), i);
            assert_eq!(LayoutMode::from_ordinal(i), Some(*mode));
        }
        assert_eq!(LayoutMode::from_ordinal(11), None);
    }

    #[test]
    fn layout_parses_names_and_ordinals() {
        assert_eq!("bottom-right".parse::<LayoutMode>(), Ok(LayoutMode::BottomRight));
        assert_eq!("Staggered-Tiled".parse::<LayoutMode>(), Ok(LayoutMode::StaggeredTiled));
        assert_eq!("4".parse::<LayoutMode>(), Ok(LayoutMode::Center));
        assert!("12".parse::<LayoutMode>().is_err());
        assert!("diagonal".parse::<LayoutMode>().is_err());
    }

    #[test]
    fn layout_serializes_kebab_case() {
        let json = serde_json::to_string(&LayoutMode::MidRight).unwrap();
        assert_eq!(json, "\"mid-right\"");
    }

    #[test]
    fn output_format_from_extension() {
        let q = Quality::new(75);
        assert_eq!(OutputFormat::for_path(Path::new("a.jpg"), q), OutputFormat::Jpeg(q));
        assert_eq!(OutputFormat::for_path(Path::new("a.JPEG"), q), OutputFormat::Jpeg(q));
        assert_eq!(OutputFormat::for_path(Path::new("a.bmp"), q), OutputFormat::Bmp);
        assert_eq!(OutputFormat::for_path(Path::new("a.png"), q), OutputFormat::Png);
        assert_eq!(OutputFormat::for_path(Path::new("a.webp"), q), OutputFormat::Png);
        assert_eq!(OutputFormat::for_path(Path::new("noext"), q), OutputFormat::Png);
    }

    #[test]
    fn default_placement_matches_stock_settings() {
        let p = PlacementParams::default();
        assert_eq!(p.width_ratio, 0.2);
        assert_eq!(p.padding, 20.0);
        assert_eq!(p.layout, LayoutMode::Center);
    }
}
