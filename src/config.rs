//! Persistent settings.
//!
//! Handles loading, validating and saving `watermarker.toml`, and the
//! key/value [`SettingsStore`] the command line edits it through. The file is
//! sparse: stock defaults are the base layer and the file overrides only the
//! keys it names.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! # watermark_path = "logo.png"  # Watermark image (unset by default)
//! watermark_position = "center"   # Layout name or its ordinal (0-10)
//! watermark_width_ratio = 0.2     # Watermark width / image width, in (0, 1]
//! offset_x = 0.0                  # Pixels; tile spacing for tiled layouts
//! offset_y = 0.0
//! rotation_angle = 0.0            # Degrees, clockwise
//! image_padding = 20.0            # Pixels, >= 0
//! output_quality = 90             # JPEG quality (0-100)
//!
//! [processing]
//! # max_threads = 4               # Blend workers (omit for auto = CPU cores)
//! ```
//!
//! Unknown keys are rejected to catch typos early.
//!
//! ## Change notification
//!
//! Every successful [`SettingsStore::set`] writes the file and then sends a
//! [`SettingsChange`] to each subscriber. Consumers re-read the value they
//! care about; the engine itself only ever sees plain [`PlacementParams`].

use crate::imaging::{LayoutMode, PlacementParams, Quality};
use serde::{Deserialize, Deserializer, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use thiserror::Error;

/// Settings file used when none is given on the command line.
pub const DEFAULT_SETTINGS_FILE: &str = "watermarker.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML write error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
    #[error("unknown setting '{0}'")]
    UnknownKey(String),
    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

/// Watermark settings loaded from `watermarker.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watermark_path: Option<PathBuf>,
    #[serde(deserialize_with = "layout_name_or_ordinal")]
    pub watermark_position: LayoutMode,
    pub watermark_width_ratio: f64,
    pub offset_x: f64,
    pub offset_y: f64,
    pub rotation_angle: f64,
    pub image_padding: f64,
    pub output_quality: u32,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
}

impl Default for Settings {
    fn default() -> Self {
        let placement = PlacementParams::default();
        Self {
            watermark_path: None,
            watermark_position: placement.layout,
            watermark_width_ratio: placement.width_ratio,
            offset_x: placement.offset_x,
            offset_y: placement.offset_y,
            rotation_angle: placement.rotation_deg,
            image_padding: placement.padding,
            output_quality: Quality::default().value(),
            processing: ProcessingConfig::default(),
        }
    }
}

impl Settings {
    /// Validate values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ratio = self.watermark_width_ratio;
        if !(ratio.is_finite() && ratio > 0.0 && ratio <= 1.0) {
            return Err(ConfigError::Validation(
                "watermark_width_ratio must be greater than 0 and at most 1".into(),
            ));
        }
        if !(self.image_padding.is_finite() && self.image_padding >= 0.0) {
            return Err(ConfigError::Validation(
                "image_padding must be a non-negative number".into(),
            ));
        }
        for (key, value) in [
            ("offset_x", self.offset_x),
            ("offset_y", self.offset_y),
            ("rotation_angle", self.rotation_angle),
        ] {
            if !value.is_finite() {
                return Err(ConfigError::Validation(format!("{key} must be finite")));
            }
        }
        if self.output_quality > 100 {
            return Err(ConfigError::Validation(
                "output_quality must be 0-100".into(),
            ));
        }
        Ok(())
    }

    /// Placement values for the engine.
    pub fn placement(&self) -> PlacementParams {
        PlacementParams {
            width_ratio: self.watermark_width_ratio,
            offset_x: self.offset_x,
            offset_y: self.offset_y,
            rotation_deg: self.rotation_angle,
            padding: self.image_padding,
            layout: self.watermark_position,
        }
    }

    pub fn quality(&self) -> Quality {
        Quality::new(self.output_quality)
    }
}

fn layout_name_or_ordinal<'de, D>(deserializer: D) -> Result<LayoutMode, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Ordinal(i64),
        Name(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Ordinal(n) => usize::try_from(n)
            .ok()
            .and_then(LayoutMode::from_ordinal)
            .ok_or_else(|| serde::de::Error::custom(format!("layout ordinal {n} out of range 0-10"))),
        Raw::Name(name) => name.parse().map_err(serde::de::Error::custom),
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of blend worker threads.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_threads: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_threads
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

/// Returns the stock default settings as a `toml::Value::Table`.
///
/// This is the base layer user files are merged on top of.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(Settings::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Merge an optional overlay onto the stock defaults, then deserialize and
/// validate.
pub fn resolve_settings(overlay: Option<toml::Value>) -> Result<Settings, ConfigError> {
    let base = stock_defaults_value()?;
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let settings: Settings = merged.try_into()?;
    settings.validate()?;
    Ok(settings)
}

/// Load settings from `path`.
///
/// A missing file yields the stock defaults. A present file is merged over
/// them, with unknown keys rejected and values validated.
pub fn load_settings(path: &Path) -> Result<Settings, ConfigError> {
    if !path.exists() {
        return resolve_settings(None);
    }
    let content = fs::read_to_string(path)?;
    let overlay: toml::Value = toml::from_str(&content)?;
    resolve_settings(Some(overlay))
}

/// Keys accepted by [`SettingsStore::get`] and [`SettingsStore::set`].
pub const SETTING_KEYS: [&str; 9] = [
    "watermark_path",
    "watermark_position",
    "watermark_width_ratio",
    "offset_x",
    "offset_y",
    "rotation_angle",
    "image_padding",
    "output_quality",
    "processing.max_threads",
];

/// Sent to subscribers after a setting was changed and saved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsChange {
    pub key: String,
    pub value: String,
}

/// Settings file plus a flat key/value view of it.
pub struct SettingsStore {
    path: PathBuf,
    settings: Settings,
    subscribers: Vec<mpsc::Sender<SettingsChange>>,
}

impl SettingsStore {
    /// Load the store from `path`; the file need not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let settings = load_settings(&path)?;
        Ok(Self {
            path,
            settings,
            subscribers: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Current value of `key`, formatted the way `set` accepts it.
    pub fn get(&self, key: &str) -> Result<String, ConfigError> {
        let s = &self.settings;
        Ok(match key {
            "watermark_path" => s
                .watermark_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            "watermark_position" => s.watermark_position.to_string(),
            "watermark_width_ratio" => s.watermark_width_ratio.to_string(),
            "offset_x" => s.offset_x.to_string(),
            "offset_y" => s.offset_y.to_string(),
            "rotation_angle" => s.rotation_angle.to_string(),
            "image_padding" => s.image_padding.to_string(),
            "output_quality" => s.output_quality.to_string(),
            "processing.max_threads" => s
                .processing
                .max_threads
                .map(|n| n.to_string())
                .unwrap_or_default(),
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        })
    }

    /// Every key with its current value, in [`SETTING_KEYS`] order.
    pub fn list(&self) -> Vec<(&'static str, String)> {
        SETTING_KEYS
            .iter()
            .filter_map(|&key| self.get(key).ok().map(|value| (key, value)))
            .collect()
    }

    /// Parse, validate, save and announce a new value for `key`.
    ///
    /// An empty value clears the optional keys (`watermark_path`,
    /// `processing.max_threads`). Nothing is saved if validation fails.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut next = self.settings.clone();
        let value = value.trim();
        let invalid = |reason: String| ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason,
        };
        let number = |v: &str| v.parse::<f64>().map_err(|e| invalid(e.to_string()));

        match key {
            "watermark_path" => {
                next.watermark_path = (!value.is_empty()).then(|| PathBuf::from(value));
            }
            "watermark_position" => {
                next.watermark_position = value.parse().map_err(invalid)?;
            }
            "watermark_width_ratio" => next.watermark_width_ratio = number(value)?,
            "offset_x" => next.offset_x = number(value)?,
            "offset_y" => next.offset_y = number(value)?,
            "rotation_angle" => next.rotation_angle = number(value)?,
            "image_padding" => next.image_padding = number(value)?,
            "output_quality" => {
                next.output_quality = value.parse().map_err(|e| invalid(format!("{e}")))?;
            }
            "processing.max_threads" => {
                next.processing.max_threads = if value.is_empty() {
                    None
                } else {
                    Some(value.parse().map_err(|e| invalid(format!("{e}")))?)
                };
            }
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }
        next.validate()?;

        self.settings = next;
        self.save()?;
        tracing::debug!(key, value, path = %self.path.display(), "setting saved");

        let change = SettingsChange {
            key: key.to_string(),
            value: self.get(key)?,
        };
        // Receivers that hung up are dropped.
        self.subscribers.retain(|tx| tx.send(change.clone()).is_ok());
        Ok(())
    }

    /// Receive a [`SettingsChange`] for every successful `set`.
    pub fn subscribe(&mut self) -> mpsc::Receiver<SettingsChange> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    /// Write the full settings to the store's file.
    pub fn save(&self) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, toml::to_string_pretty(&self.settings)?)?;
        Ok(())
    }
}

/// Returns a fully-commented stock `watermarker.toml` with all keys and
/// explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Watermarker Configuration
# =========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Unknown keys will cause an error.

# Watermark image applied to every photo. Usually a PNG with transparency.
# watermark_path = "logo.png"

# Where the watermark goes. One of:
#   top-left, top-center, top-right,
#   mid-left, center, mid-right,
#   bottom-left, bottom-center, bottom-right,
#   tiled, staggered-tiled
# The numeric position (0-10, in the order above) is accepted too.
watermark_position = "center"

# Watermark width as a fraction of the photo width, in (0, 1].
watermark_width_ratio = 0.2

# Pixel offsets. For single positions they nudge the watermark (it never
# leaves the photo); for tiled layouts they set the gap between tiles
# (negative values overlap tiles).
offset_x = 0.0
offset_y = 0.0

# Rotation in degrees, clockwise, about the watermark's center.
rotation_angle = 0.0

# Pixels trimmed from each side of the watermark, and the margin kept from
# the photo edge for corner and edge positions.
image_padding = 20.0

# JPEG encoding quality (0 = worst, 100 = best). Other formats are lossless.
output_quality = 90

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum threads used to blend watermarks.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_threads = 4
"##
}
