//! Batch export: watermark every source image into a destination folder.
//!
//! ## Flow
//!
//! ```text
//! check inputs ─► decode watermark (cached) ─► for each source, in order:
//!                                                 progress += 1
//!                                                 decode ─► plan ─► composite ─► encode
//! ```
//!
//! Each output lands at `destination/<source file name>`, encoded by the
//! destination extension: `.jpg`/`.jpeg` as JPEG at the job quality, `.bmp`
//! as BMP, anything else as PNG.
//!
//! ## Failures
//!
//! A source that fails to decode, plan or encode is reported to the sink and
//! recorded in the [`ExportReport`]; the run moves on to the next source. A
//! watermark that fails to decode stops the run before any source is read.
//!
//! ## State
//!
//! [`ExportState`] carries the running flag and the started-item counter.
//! Whatever way [`run`] exits, including a panic inside a codec, a drop guard
//! clears the flag, zeroes the counter and tells the sink.

use crate::cache::AssetCache;
use crate::imaging::{
    BackendError, GeometryError, ImageBackend, OutputFormat, PlacementParams, Quality,
    WatermarkAsset, composite, compute_plan,
};
use crate::sink::{MissingInput, Notification, PresentationSink};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("cannot start export: {0}")]
    MissingInput(MissingInput),
    #[error("watermark could not be loaded: {0}")]
    Watermark(#[source] BackendError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a single source failed.
#[derive(Error, Debug)]
pub enum ItemError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("invalid placement: {0}")]
    Geometry(#[from] GeometryError),
    #[error("source path has no file name: {0}")]
    NoFileName(PathBuf),
}

/// One export request.
///
/// Paths are optional because they come from user selection; a run with a
/// missing one does not start.
#[derive(Debug, Clone, Default)]
pub struct ExportJob {
    pub sources: Vec<PathBuf>,
    pub destination_dir: Option<PathBuf>,
    pub watermark: Option<PathBuf>,
    pub quality: Quality,
    pub placement: PlacementParams,
}

impl ExportJob {
    /// The first missing input, in the order a user is asked for them.
    ///
    /// An empty path counts as missing.
    pub fn missing_input(&self) -> Option<MissingInput> {
        if self.sources.is_empty() {
            Some(MissingInput::Sources)
        } else if selected(&self.watermark).is_none() {
            Some(MissingInput::Watermark)
        } else if selected(&self.destination_dir).is_none() {
            Some(MissingInput::Destination)
        } else {
            None
        }
    }
}

/// `path` if it is set and non-empty.
pub(crate) fn selected(path: &Option<PathBuf>) -> Option<&Path> {
    path.as_deref().filter(|p| !p.as_os_str().is_empty())
}

/// Cooperative cancellation flag, cheap to clone and share across threads.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Running flag and progress counter of the export, readable from any thread.
#[derive(Debug, Default)]
pub struct ExportState {
    running: AtomicBool,
    progress: AtomicUsize,
}

impl ExportState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Items started in the current run; 0 when idle.
    pub fn progress(&self) -> usize {
        self.progress.load(Ordering::SeqCst)
    }

    fn begin(&self) {
        self.progress.store(0, Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);
    }

    fn advance(&self) -> usize {
        self.progress.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn reset(&self) {
        self.progress.store(0, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
    }
}

/// Resets [`ExportState`] and publishes it when a run ends, however it ends.
struct RunGuard<'a> {
    state: &'a ExportState,
    sink: &'a dyn PresentationSink,
}

impl<'a> RunGuard<'a> {
    fn start(state: &'a ExportState, sink: &'a dyn PresentationSink) -> Self {
        state.begin();
        sink.progress(0, true);
        Self { state, sink }
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.state.reset();
        self.sink.progress(0, false);
    }
}

/// Per-source result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemStatus {
    Written { output: PathBuf },
    Failed { message: String },
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemOutcome {
    pub source: PathBuf,
    #[serde(flatten)]
    pub status: ItemStatus,
}

/// What happened to every source of a run, in input order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExportReport {
    pub items: Vec<ItemOutcome>,
}

impl ExportReport {
    pub fn written(&self) -> usize {
        self.count(|s| matches!(s, ItemStatus::Written { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, ItemStatus::Failed { .. }))
    }

    pub fn cancelled(&self) -> usize {
        self.count(|s| matches!(s, ItemStatus::Cancelled))
    }

    fn count(&self, pred: impl Fn(&ItemStatus) -> bool) -> usize {
        self.items.iter().filter(|i| pred(&i.status)).count()
    }
}

/// Output path for `source`: same file name, inside `destination_dir`.
pub fn output_path_for(destination_dir: &Path, source: &Path) -> Option<PathBuf> {
    source.file_name().map(|name| destination_dir.join(name))
}

/// Run a batch export.
///
/// Sources are processed strictly in order on the calling thread; blending
/// inside each composite uses the rayon pool. Call from a blocking context.
pub fn run<B: ImageBackend + ?Sized>(
    job: &ExportJob,
    backend: &B,
    assets: &AssetCache,
    state: &ExportState,
    sink: &dyn PresentationSink,
    cancel: &CancelToken,
) -> Result<ExportReport, ExportError> {
    if let Some(missing) = job.missing_input() {
        tracing::warn!(%missing, "export not started");
        sink.notify(Notification::MissingInput(missing));
        return Err(ExportError::MissingInput(missing));
    }
    let (Some(destination_dir), Some(watermark_path)) =
        (selected(&job.destination_dir), selected(&job.watermark))
    else {
        return Err(ExportError::MissingInput(MissingInput::Destination));
    };

    let _guard = RunGuard::start(state, sink);
    tracing::info!(
        sources = job.sources.len(),
        destination = %destination_dir.display(),
        "export started"
    );

    if let Err(e) = std::fs::create_dir_all(destination_dir) {
        sink.notify(Notification::RunFailed {
            message: format!("cannot create {}: {e}", destination_dir.display()),
        });
        return Err(e.into());
    }

    let watermark = match assets.watermark(backend, watermark_path) {
        Ok(asset) => asset,
        Err(e) => {
            tracing::warn!(error = %e, "export aborted");
            sink.notify(Notification::RunFailed {
                message: e.to_string(),
            });
            return Err(ExportError::Watermark(e));
        }
    };

    let mut report = ExportReport::default();
    for (index, source) in job.sources.iter().enumerate() {
        if cancel.is_cancelled() {
            tracing::info!(remaining = job.sources.len() - index, "export cancelled");
            report
                .items
                .extend(job.sources[index..].iter().map(|s| ItemOutcome {
                    source: s.clone(),
                    status: ItemStatus::Cancelled,
                }));
            break;
        }

        sink.progress(state.advance(), true);

        let status = match export_one(job, backend, &watermark, destination_dir, source) {
            Ok(output) => {
                tracing::debug!(source = %source.display(), output = %output.display(), "written");
                ItemStatus::Written { output }
            }
            Err(e) => {
                tracing::warn!(source = %source.display(), error = %e, "item failed");
                sink.notify(Notification::ItemFailed {
                    source: source.clone(),
                    message: e.to_string(),
                });
                ItemStatus::Failed {
                    message: e.to_string(),
                }
            }
        };
        report.items.push(ItemOutcome {
            source: source.clone(),
            status,
        });
    }

    tracing::info!(
        written = report.written(),
        failed = report.failed(),
        cancelled = report.cancelled(),
        "export finished"
    );
    sink.notify(Notification::RunFinished {
        written: report.written(),
        failed: report.failed(),
        cancelled: report.cancelled(),
    });
    Ok(report)
}

fn export_one<B: ImageBackend + ?Sized>(
    job: &ExportJob,
    backend: &B,
    watermark: &WatermarkAsset,
    destination_dir: &Path,
    source: &Path,
) -> Result<PathBuf, ItemError> {
    let output = output_path_for(destination_dir, source)
        .ok_or_else(|| ItemError::NoFileName(source.to_path_buf()))?;

    let canvas = backend.decode(source)?;
    let plan = compute_plan(
        canvas.width(),
        canvas.height(),
        watermark.width(),
        watermark.height(),
        &job.placement,
    )?;
    let result = composite(&canvas, watermark, &plan);
    drop(canvas);

    backend.encode(&result, &output, OutputFormat::for_path(&output, job.quality))?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::tests::{MockBackend, RecordedOp};
    use crate::imaging::{CompositeResult, LayoutMode, Raster};
    use crate::test_helpers::{RecordingSink, SinkEvent};
    use std::panic::{AssertUnwindSafe, catch_unwind};
    use tempfile::TempDir;

    const WATERMARK: &str = "/in/logo.png";

    fn job(dest: &Path, sources: &[&str]) -> ExportJob {
        ExportJob {
            sources: sources.iter().map(PathBuf::from).collect(),
            destination_dir: Some(dest.to_path_buf()),
            watermark: Some(PathBuf::from(WATERMARK)),
            quality: Quality::new(80),
            placement: PlacementParams {
                layout: LayoutMode::BottomRight,
                ..PlacementParams::default()
            },
        }
    }

    fn backend() -> MockBackend {
        MockBackend::new()
            .with_image(WATERMARK, 200, 100, [255, 255, 255, 128])
            .with_image("/in/a.jpg", 800, 600, [10, 10, 10, 255])
            .with_image("/in/b.png", 640, 480, [20, 20, 20, 255])
            .with_image("/in/c.bmp", 320, 240, [30, 30, 30, 255])
    }

    fn run_job(
        job: &ExportJob,
        backend: &MockBackend,
        state: &ExportState,
        sink: &RecordingSink,
        cancel: &CancelToken,
    ) -> Result<ExportReport, ExportError> {
        run(job, backend, &AssetCache::new(), state, sink, cancel)
    }

    // =========================================================================
    // Happy path
    // =========================================================================

    #[test]
    fn writes_every_source_in_order_with_format_by_extension() {
        let tmp = TempDir::new().unwrap();
        let backend = backend();
        let sink = RecordingSink::default();
        let state = ExportState::new();

        let report = run_job(
            &job(tmp.path(), &["/in/a.jpg", "/in/b.png", "/in/c.bmp"]),
            &backend,
            &state,
            &sink,
            &CancelToken::new(),
        )
        .unwrap();

        assert_eq!(report.written(), 3);
        let encodes: Vec<RecordedOp> = backend
            .get_operations()
            .into_iter()
            .filter(|op| matches!(op, RecordedOp::Encode { .. }))
            .collect();
        let dest = tmp.path();
        assert_eq!(
            encodes,
            vec![
                RecordedOp::Encode {
                    output: dest.join("a.jpg").to_string_lossy().to_string(),
                    format: OutputFormat::Jpeg(Quality::new(80)),
                    width: 800,
                    height: 600,
                },
                RecordedOp::Encode {
                    output: dest.join("b.png").to_string_lossy().to_string(),
                    format: OutputFormat::Png,
                    width: 640,
                    height: 480,
                },
                RecordedOp::Encode {
                    output: dest.join("c.bmp").to_string_lossy().to_string(),
                    format: OutputFormat::Bmp,
                    width: 320,
                    height: 240,
                },
            ]
        );
    }

    #[test]
    fn progress_counts_started_items_then_resets() {
        let tmp = TempDir::new().unwrap();
        let sink = RecordingSink::default();
        let state = ExportState::new();

        run_job(
            &job(tmp.path(), &["/in/a.jpg", "/in/b.png", "/in/c.bmp"]),
            &backend(),
            &state,
            &sink,
            &CancelToken::new(),
        )
        .unwrap();

        assert_eq!(
            sink.progress_events(),
            vec![(0, true), (1, true), (2, true), (3, true), (0, false)]
        );
        assert!(!state.is_running());
        assert_eq!(state.progress(), 0);
    }

    #[test]
    fn watermark_is_decoded_once_per_run() {
        let tmp = TempDir::new().unwrap();
        let backend = backend();

        run_job(
            &job(tmp.path(), &["/in/a.jpg", "/in/b.png", "/in/c.bmp"]),
            &backend,
            &ExportState::new(),
            &RecordingSink::default(),
            &CancelToken::new(),
        )
        .unwrap();

        let decodes: Vec<String> = backend
            .get_operations()
            .into_iter()
            .filter_map(|op| match op {
                RecordedOp::Decode(p) => Some(p),
                _ => None,
            })
            .collect();
        assert_eq!(decodes, vec![WATERMARK, "/in/a.jpg", "/in/b.png", "/in/c.bmp"]);
    }

    #[test]
    fn creates_missing_destination_directory() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("nested/out");
        let report = run_job(
            &job(&dest, &["/in/a.jpg"]),
            &backend(),
            &ExportState::new(),
            &RecordingSink::default(),
            &CancelToken::new(),
        )
        .unwrap();

        assert!(dest.is_dir());
        assert_eq!(
            report.items[0].status,
            ItemStatus::Written {
                output: dest.join("a.jpg")
            }
        );
    }

    // =========================================================================
    // Failures
    // =========================================================================

    #[test]
    fn one_unreadable_source_among_valid_ones() {
        let tmp = TempDir::new().unwrap();
        let backend = backend().with_image("/in/d.jpg", 100, 100, [0, 0, 0, 255]);
        let sink = RecordingSink::default();
        let state = ExportState::new();

        let report = run_job(
            &job(
                tmp.path(),
                &["/in/a.jpg", "/in/unreadable.jpg", "/in/b.png", "/in/d.jpg"],
            ),
            &backend,
            &state,
            &sink,
            &CancelToken::new(),
        )
        .unwrap();

        assert_eq!(backend.encoded_outputs().len(), 3);
        assert_eq!((report.written(), report.failed()), (3, 1));
        assert_eq!(sink.failed_sources(), vec![PathBuf::from("/in/unreadable.jpg")]);
        assert!(!state.is_running());
        assert_eq!(sink.last_progress(), Some((0, false)));
        assert!(sink.notifications().contains(&Notification::RunFinished {
            written: 3,
            failed: 1,
            cancelled: 0
        }));
    }

    #[test]
    fn encode_failure_is_per_item() {
        let tmp = TempDir::new().unwrap();
        let failing = tmp.path().join("a.jpg");
        let backend = backend().failing_encode(failing.to_str().unwrap());
        let sink = RecordingSink::default();

        let report = run_job(
            &job(tmp.path(), &["/in/a.jpg", "/in/b.png"]),
            &backend,
            &ExportState::new(),
            &sink,
            &CancelToken::new(),
        )
        .unwrap();

        assert!(matches!(&report.items[0].status, ItemStatus::Failed { message } if message.contains("disk full")));
        assert!(matches!(report.items[1].status, ItemStatus::Written { .. }));
    }

    #[test]
    fn bad_placement_fails_each_item_without_aborting() {
        let tmp = TempDir::new().unwrap();
        let mut job = job(tmp.path(), &["/in/a.jpg", "/in/b.png"]);
        job.placement.layout = LayoutMode::Tiled;
        job.placement.offset_x = -10_000.0;
        let sink = RecordingSink::default();

        let report = run_job(&job, &backend(), &ExportState::new(), &sink, &CancelToken::new())
            .unwrap();

        assert_eq!(report.failed(), 2);
        assert_eq!(sink.failed_sources().len(), 2);
    }

    #[test]
    fn watermark_failure_aborts_before_any_source() {
        let tmp = TempDir::new().unwrap();
        let mut job = job(tmp.path(), &["/in/a.jpg", "/in/b.png"]);
        job.watermark = Some(PathBuf::from("/in/missing-logo.png"));
        let backend = backend();
        let sink = RecordingSink::default();
        let state = ExportState::new();

        let result = run_job(&job, &backend, &state, &sink, &CancelToken::new());

        assert!(matches!(result, Err(ExportError::Watermark(_))));
        assert!(backend.encoded_outputs().is_empty());
        assert!(matches!(
            sink.notifications().as_slice(),
            [Notification::RunFailed { .. }]
        ));
        assert_eq!(sink.progress_events(), vec![(0, true), (0, false)]);
        assert!(!state.is_running());
    }

    #[test]
    fn missing_inputs_do_not_start_a_run() {
        let tmp = TempDir::new().unwrap();
        let cases = [
            (
                ExportJob {
                    sources: vec![],
                    ..job(tmp.path(), &[])
                },
                MissingInput::Sources,
            ),
            (
                ExportJob {
                    watermark: None,
                    ..job(tmp.path(), &["/in/a.jpg"])
                },
                MissingInput::Watermark,
            ),
            (
                ExportJob {
                    destination_dir: None,
                    ..job(tmp.path(), &["/in/a.jpg"])
                },
                MissingInput::Destination,
            ),
        ];

        for (job, expected) in cases {
            let sink = RecordingSink::default();
            let backend = backend();
            let result = run_job(&job, &backend, &ExportState::new(), &sink, &CancelToken::new());

            assert!(matches!(result, Err(ExportError::MissingInput(m)) if m == expected));
            assert_eq!(
                sink.events(),
                vec![SinkEvent::Notify(Notification::MissingInput(expected))]
            );
            assert!(backend.get_operations().is_empty());
        }
    }

    #[test]
    fn empty_paths_count_as_missing() {
        let tmp = TempDir::new().unwrap();
        let cases = [
            (
                ExportJob {
                    watermark: Some(PathBuf::new()),
                    ..job(tmp.path(), &["/in/a.jpg"])
                },
                MissingInput::Watermark,
            ),
            (
                ExportJob {
                    destination_dir: Some(PathBuf::new()),
                    ..job(tmp.path(), &["/in/a.jpg"])
                },
                MissingInput::Destination,
            ),
        ];

        for (job, expected) in cases {
            assert_eq!(job.missing_input(), Some(expected));

            let sink = RecordingSink::default();
            let backend = backend();
            let state = ExportState::new();
            let result = run_job(&job, &backend, &state, &sink, &CancelToken::new());

            assert!(matches!(result, Err(ExportError::MissingInput(m)) if m == expected));
            assert_eq!(
                sink.notifications(),
                vec![Notification::MissingInput(expected)]
            );
            assert!(backend.get_operations().is_empty());
            assert!(backend.encoded_outputs().is_empty());
            assert!(!state.is_running());
        }
    }

    /// Panics on every decode.
    struct PanickingBackend;

    impl ImageBackend for PanickingBackend {
        fn decode(&self, _path: &Path) -> Result<Raster, BackendError> {
            panic!("codec blew up");
        }

        fn encode(
            &self,
            _image: &CompositeResult,
            _path: &Path,
            _format: OutputFormat,
        ) -> Result<(), BackendError> {
            unreachable!()
        }
    }

    #[test]
    fn state_resets_even_when_a_codec_panics() {
        let tmp = TempDir::new().unwrap();
        let sink = RecordingSink::default();
        let state = ExportState::new();
        let job = job(tmp.path(), &["/in/a.jpg"]);

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            run(
                &job,
                &PanickingBackend,
                &AssetCache::new(),
                &state,
                &sink,
                &CancelToken::new(),
            )
        }));

        assert!(outcome.is_err());
        assert!(!state.is_running());
        assert_eq!(sink.last_progress(), Some((0, false)));
    }

    // =========================================================================
    // Cancellation
    // =========================================================================

    #[test]
    fn pre_cancelled_run_marks_everything_cancelled() {
        let tmp = TempDir::new().unwrap();
        let backend = backend();
        let cancel = CancelToken::new();
        cancel.cancel();

        let report = run_job(
            &job(tmp.path(), &["/in/a.jpg", "/in/b.png"]),
            &backend,
            &ExportState::new(),
            &RecordingSink::default(),
            &cancel,
        )
        .unwrap();

        assert_eq!(report.cancelled(), 2);
        assert!(backend.encoded_outputs().is_empty());
    }

    /// Cancels the run once `after` items have started.
    struct CancellingSink {
        inner: RecordingSink,
        cancel: CancelToken,
        after: usize,
    }

    impl PresentationSink for CancellingSink {
        fn publish_preview(&self, result: CompositeResult) {
            self.inner.publish_preview(result);
        }

        fn progress(&self, count: usize, running: bool) {
            if count == self.after {
                self.cancel.cancel();
            }
            self.inner.progress(count, running);
        }

        fn notify(&self, notification: Notification) {
            self.inner.notify(notification);
        }
    }

    #[test]
    fn cancellation_is_checked_between_items() {
        let tmp = TempDir::new().unwrap();
        let backend = backend();
        let cancel = CancelToken::new();
        let sink = CancellingSink {
            inner: RecordingSink::default(),
            cancel: cancel.clone(),
            after: 1,
        };
        let state = ExportState::new();

        let report = run(
            &job(tmp.path(), &["/in/a.jpg", "/in/b.png", "/in/c.bmp"]),
            &backend,
            &AssetCache::new(),
            &state,
            &sink,
            &cancel,
        )
        .unwrap();

        // The item in flight finishes; the rest are skipped.
        assert_eq!(backend.encoded_outputs().len(), 1);
        assert_eq!((report.written(), report.cancelled()), (1, 2));
        assert!(!state.is_running());
    }

    // =========================================================================
    // Report
    // =========================================================================

    #[test]
    fn report_serializes_with_status_tags() {
        let report = ExportReport {
            items: vec![
                ItemOutcome {
                    source: PathBuf::from("/in/a.jpg"),
                    status: ItemStatus::Written {
                        output: PathBuf::from("/out/a.jpg"),
                    },
                },
                ItemOutcome {
                    source: PathBuf::from("/in/b.jpg"),
                    status: ItemStatus::Cancelled,
                },
            ],
        };
        let json: serde_json::Value = serde_json::to_value(&report).unwrap();
        assert_eq!(json["items"][0]["status"], "written");
        assert_eq!(json["items"][0]["output"], "/out/a.jpg");
        assert_eq!(json["items"][1]["status"], "cancelled");
        assert_eq!(json["items"][1]["source"], "/in/b.jpg");
    }

    #[test]
    fn output_path_keeps_file_name() {
        assert_eq!(
            output_path_for(Path::new("/out"), Path::new("/in/photos/IMG_1.JPG")),
            Some(PathBuf::from("/out/IMG_1.JPG"))
        );
        assert_eq!(output_path_for(Path::new("/out"), Path::new("/")), None);
    }
}
