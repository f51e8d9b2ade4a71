//! # Watermarker
//!
//! Batch watermarking for photographs. One watermark image is stamped onto
//! every source photo, anchored to one of nine positions or repeated across
//! the whole frame, optionally rotated, and written to a destination folder
//! in the format its extension names.
//!
//! # Architecture: Plan, Composite, Encode
//!
//! Every image, previewed or exported, goes through the same three steps:
//!
//! ```text
//! 1. Plan        canvas size + watermark size + params  →  GeometryPlan
//! 2. Composite   canvas + watermark + plan              →  CompositeResult
//! 3. Encode      CompositeResult                        →  JPEG / PNG / BMP file
//! ```
//!
//! Planning is pure arithmetic, so layout rules are tested without a single
//! pixel. Compositing is pure in-memory pixel work. Only decoding and
//! encoding touch the filesystem, and they sit behind the
//! [`ImageBackend`](imaging::ImageBackend) trait so the pipelines above them
//! run against an in-memory mock in tests.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`imaging`] | Layout math, compositing, and the `image`-crate codec backend |
//! | [`export`] | Batch pipeline: ordered items, progress, cancellation, per-item failures |
//! | [`preview`] | Single-flight live preview: only the latest parameter change is published |
//! | [`cache`] | Decoded watermark reused across items while the file is unchanged |
//! | [`config`] | `watermarker.toml` loading, validation, and the key/value settings store |
//! | [`scan`] | Expands directories given on the command line to their image files |
//! | [`sink`] | The trait results, progress, and notices are handed to |
//! | [`output`] | CLI output formatting and the terminal sink |
//!
//! # Design Decisions
//!
//! ## Settings Are Values, Not Globals
//!
//! The engine never reads settings itself. Callers build a
//! [`PlacementParams`](imaging::PlacementParams) from the
//! [`SettingsStore`](config::SettingsStore) at the moment a preview or export
//! starts, so a run is unaffected by edits made while it is in progress.
//!
//! ## Keep Going on Bad Files
//!
//! A photo that fails to decode or encode is reported and skipped; the rest of
//! the batch is still written. Only problems that would fail every item (no
//! watermark, no destination) stop a run.
//!
//! ## Latest Preview Wins
//!
//! Dragging a slider produces changes faster than images composite. Each
//! change cancels the one before it, and a single render lock keeps at most
//! one composite in flight, so the sink only ever sees the newest result.

pub mod cache;
pub mod config;
pub mod export;
pub mod imaging;
pub mod output;
pub mod preview;
pub mod scan;
pub mod sink;

#[cfg(test)]
pub(crate) mod test_helpers;
