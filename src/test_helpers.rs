//! Shared test utilities for the watermarker test suite.
//!
//! Provides a recording [`PresentationSink`] and a few accessors over what
//! the sink saw.
//!
//! # Usage
//!
//! ```ignore
//! use crate::test_helpers::*;
//!
//! let sink = RecordingSink::default();
//! run(&job, &backend, &AssetCache::new(), &state, &sink, &CancelToken::new()).unwrap();
//!
//! assert_eq!(sink.failed_sources(), vec![PathBuf::from("/in/broken.jpg")]);
//! assert_eq!(sink.last_progress(), Some((0, false)));
//! ```

use std::path::PathBuf;
use std::sync::Mutex;

use crate::imaging::CompositeResult;
use crate::sink::{Notification, PresentationSink};

// =========================================================================
// Recording sink
// =========================================================================

/// Everything a sink was told, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    Preview { width: u32, height: u32 },
    Progress { count: usize, running: bool },
    Notify(Notification),
}

/// Records every call so tests can assert on order and content.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SinkEvent>>,
    previews: Mutex<Vec<CompositeResult>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn previews(&self) -> Vec<CompositeResult> {
        self.previews.lock().unwrap().clone()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SinkEvent::Notify(n) => Some(n),
                _ => None,
            })
            .collect()
    }

    pub fn progress_events(&self) -> Vec<(usize, bool)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SinkEvent::Progress { count, running } => Some((count, running)),
                _ => None,
            })
            .collect()
    }

    pub fn last_progress(&self) -> Option<(usize, bool)> {
        self.progress_events().last().copied()
    }

    /// Sources named by `ItemFailed` notifications.
    pub fn failed_sources(&self) -> Vec<PathBuf> {
        self.notifications()
            .into_iter()
            .filter_map(|n| match n {
                Notification::ItemFailed { source, .. } => Some(source),
                _ => None,
            })
            .collect()
    }
}

impl PresentationSink for RecordingSink {
    fn publish_preview(&self, result: CompositeResult) {
        self.events.lock().unwrap().push(SinkEvent::Preview {
            width: result.width(),
            height: result.height(),
        });
        self.previews.lock().unwrap().push(result);
    }

    fn progress(&self, count: usize, running: bool) {
        self.events
            .lock()
            .unwrap()
            .push(SinkEvent::Progress { count, running });
    }

    fn notify(&self, notification: Notification) {
        self.events
            .lock()
            .unwrap()
            .push(SinkEvent::Notify(notification));
    }
}
