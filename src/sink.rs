//! Where the engine hands its results.
//!
//! The engine never talks to a screen or a terminal directly. Preview
//! renders, progress ticks and user-facing notices all go through a
//! [`PresentationSink`]; the command line implements it in
//! [`output`](crate::output), tests implement it with a recorder.

use crate::imaging::CompositeResult;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// A required input that was not set when a run was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingInput {
    Sources,
    Watermark,
    Destination,
}

impl fmt::Display for MissingInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MissingInput::Sources => "no source images selected",
            MissingInput::Watermark => "no watermark image selected",
            MissingInput::Destination => "no destination folder selected",
        })
    }
}

/// User-facing notices raised while exporting.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    MissingInput(MissingInput),
    /// One item failed; the run carries on with the next.
    ItemFailed { source: PathBuf, message: String },
    /// The run stopped before processing any item.
    RunFailed { message: String },
    RunFinished {
        written: usize,
        failed: usize,
        cancelled: usize,
    },
}

/// Receives previews, progress and notifications.
///
/// Implementations must tolerate calls from worker threads.
pub trait PresentationSink: Send + Sync {
    fn publish_preview(&self, result: CompositeResult);

    /// `count` items started so far; `running` is false once a run ends.
    fn progress(&self, count: usize, running: bool);

    fn notify(&self, notification: Notification);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_input_messages() {
        assert_eq!(
            MissingInput::Watermark.to_string(),
            "no watermark image selected"
        );
        assert_eq!(
            serde_json::to_string(&MissingInput::Destination).unwrap(),
            "\"destination\""
        );
    }
}
