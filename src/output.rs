//! CLI output formatting.
//!
//! # Information-First Display
//!
//! Every listing leads with a positional index and the source's file name;
//! full paths and failure details follow as indented context lines.
//!
//! # Output Format
//!
//! ## Apply
//!
//! ```text
//! Exported 2 of 3 images → out/
//!     001 dawn.jpg → out/dawn.jpg
//!     002 dusk.png
//!         Failed: cannot decode /in/dusk.png: ...
//!     003 noon.jpg → out/noon.jpg
//! ```
//!
//! ## Plan
//!
//! ```text
//! tiled: 40 cells (5 × 8 grid, step 200 × 100)
//!     001 at (0, 0) drawn 200 × 100
//!     002 at (200, 0) drawn 200 × 100
//!     ...
//! ```
//!
//! # Architecture
//!
//! Each report has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure. [`ConsoleSink`] is the terminal's
//! [`PresentationSink`]: it prints progress and notices as they arrive and
//! keeps the latest preview for the caller to save.

use crate::export::{ExportReport, ItemStatus};
use crate::imaging::{CompositeResult, GeometryPlan, LayoutMode, PlacementCell};
use crate::sink::{Notification, PresentationSink};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

/// Cells listed by [`format_plan`] before the rest is summarized.
pub const PLAN_CELL_LIMIT: usize = 20;

// ============================================================================
// Shared display helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Whole numbers without decimals, everything else to one decimal.
fn format_px(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{:.1}", value)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

// ============================================================================
// Apply
// ============================================================================

/// Format the summary of a batch export.
pub fn format_export_report(report: &ExportReport, destination: &Path) -> Vec<String> {
    let mut lines = vec![format!(
        "Exported {} of {} images → {}",
        report.written(),
        report.items.len(),
        destination.display()
    )];

    for (i, item) in report.items.iter().enumerate() {
        let header = format!("{}{} {}", indent(1), format_index(i + 1), file_name(&item.source));
        match &item.status {
            ItemStatus::Written { output } => {
                lines.push(format!("{} → {}", header, output.display()));
            }
            ItemStatus::Failed { message } => {
                lines.push(header);
                lines.push(format!("{}Failed: {}", indent(2), message));
            }
            ItemStatus::Cancelled => {
                lines.push(format!("{} (cancelled)", header));
            }
        }
    }
    lines
}

/// Print the summary of a batch export to stdout.
pub fn print_export_report(report: &ExportReport, destination: &Path) {
    for line in format_export_report(report, destination) {
        println!("{}", line);
    }
}

// ============================================================================
// Plan
// ============================================================================

fn cell_line(index: usize, cell: &PlacementCell) -> String {
    let mut line = format!(
        "{}{} at ({}, {}) drawn {} × {}",
        indent(1),
        format_index(index),
        format_px(cell.top_left.x),
        format_px(cell.top_left.y),
        format_px(cell.drawn_width),
        format_px(cell.drawn_height),
    );
    if cell.rotation_deg != 0.0 {
        line.push_str(&format!(", rotated {}°", format_px(cell.rotation_deg)));
    }
    line
}

/// Format a geometry plan: a header, then one line per cell up to
/// [`PLAN_CELL_LIMIT`].
pub fn format_plan(plan: &GeometryPlan, layout: LayoutMode) -> Vec<String> {
    let noun = if plan.len() == 1 { "cell" } else { "cells" };
    let mut header = format!("{}: {} {}", layout, plan.len(), noun);
    if let Some(grid) = plan.grid {
        header.push_str(&format!(
            " ({} × {} grid, step {} × {})",
            grid.cols,
            grid.rows,
            format_px(grid.step_x),
            format_px(grid.step_y)
        ));
    }

    let mut lines = vec![header];
    lines.extend(
        plan.cells
            .iter()
            .take(PLAN_CELL_LIMIT)
            .enumerate()
            .map(|(i, cell)| cell_line(i + 1, cell)),
    );
    if plan.len() > PLAN_CELL_LIMIT {
        lines.push(format!(
            "{}... {} more",
            indent(1),
            plan.len() - PLAN_CELL_LIMIT
        ));
    }
    lines
}

pub fn print_plan(plan: &GeometryPlan, layout: LayoutMode) {
    for line in format_plan(plan, layout) {
        println!("{}", line);
    }
}

// ============================================================================
// Settings
// ============================================================================

/// Format `key = value` pairs, aligned, with unset values shown as `(unset)`.
pub fn format_settings(entries: &[(&str, String)]) -> Vec<String> {
    let width = entries.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
    entries
        .iter()
        .map(|(key, value)| {
            let shown = if value.is_empty() { "(unset)" } else { value.as_str() };
            format!("{:<width$} = {}", key, shown)
        })
        .collect()
}

pub fn print_settings(entries: &[(&str, String)]) {
    for line in format_settings(entries) {
        println!("{}", line);
    }
}

// ============================================================================
// Live sink
// ============================================================================

/// Format one notification as display lines.
pub fn format_notification(notification: &Notification) -> Vec<String> {
    match notification {
        Notification::MissingInput(missing) => vec![format!("Cannot start: {}", missing)],
        Notification::ItemFailed { source, message } => vec![
            format!("{}{}", indent(1), source.display()),
            format!("{}Failed: {}", indent(2), message),
        ],
        Notification::RunFailed { message } => vec![format!("Export failed: {}", message)],
        Notification::RunFinished {
            written,
            failed,
            cancelled,
        } => {
            let mut line = format!("Done: {} written, {} failed", written, failed);
            if *cancelled > 0 {
                line.push_str(&format!(", {} cancelled", cancelled));
            }
            vec![line]
        }
    }
}

/// Format a progress tick; `None` for the idle tick that ends a run.
pub fn format_progress(count: usize, total: usize, running: bool) -> Option<String> {
    (running && count > 0).then(|| format!("[{}/{}]", count, total))
}

/// Terminal [`PresentationSink`].
///
/// Progress and notices go to stdout unless the sink is quiet (used when the
/// report itself is printed as JSON). Previews are kept, not printed.
pub struct ConsoleSink {
    total: usize,
    quiet: bool,
    preview: Mutex<Option<CompositeResult>>,
}

impl ConsoleSink {
    /// A sink for a run over `total` sources.
    pub fn new(total: usize) -> Self {
        Self {
            total,
            quiet: false,
            preview: Mutex::new(None),
        }
    }

    pub fn quiet(total: usize) -> Self {
        Self {
            quiet: true,
            ..Self::new(total)
        }
    }

    /// Take the most recently published preview.
    pub fn take_preview(&self) -> Option<CompositeResult> {
        self.preview
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

impl PresentationSink for ConsoleSink {
    fn publish_preview(&self, result: CompositeResult) {
        *self.preview.lock().unwrap_or_else(PoisonError::into_inner) = Some(result);
    }

    fn progress(&self, count: usize, running: bool) {
        if self.quiet {
            return;
        }
        if let Some(line) = format_progress(count, self.total, running) {
            println!("{}", line);
        }
    }

    fn notify(&self, notification: Notification) {
        if self.quiet {
            return;
        }
        for line in format_notification(&notification) {
            println!("{}", line);
        }
    }
}
