//! Live preview: recompute on every parameter change, publish only the latest.
//!
//! A slider drag can fire many changes a second while one composite takes
//! tens of milliseconds. The controller keeps that under control with two
//! pieces:
//!
//! - a [`CancelToken`] per request. A new request cancels the previous one,
//!   so an outdated render is dropped instead of published.
//! - an async mutex around the decode/composite path, so at most one render
//!   is in flight and previews reach the sink one at a time.
//!
//! ```text
//! change ─► cancel previous token ─► spawn task(new token)
//!                                        │ lock
//!                                        ├─ cancelled? ──────────► Superseded
//!                                        ├─ path missing? ───────► Idle
//!                                        ├─ decode/plan/composite (blocking pool)
//!                                        │     └─ error ─────────► Failed
//!                                        ├─ cancelled? ──────────► Superseded
//!                                        └─ publish ─────────────► Published
//! ```

use crate::cache::AssetCache;
use crate::export::{CancelToken, selected};
use crate::imaging::{
    BackendError, CompositeResult, GeometryError, ImageBackend, PlacementParams, composite,
    compute_plan,
};
use crate::sink::PresentationSink;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::task::JoinHandle;

#[derive(Error, Debug)]
pub enum PreviewError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("invalid placement: {0}")]
    Geometry(#[from] GeometryError),
    #[error("preview worker stopped: {0}")]
    Worker(String),
}

/// Inputs read fresh at the moment a parameter changed.
#[derive(Debug, Clone, Default)]
pub struct PreviewRequest {
    pub source: Option<PathBuf>,
    pub watermark: Option<PathBuf>,
    pub params: PlacementParams,
}

/// How one preview request ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PreviewOutcome {
    Published,
    /// A newer request arrived first; nothing was published.
    Superseded,
    /// Source or watermark not chosen yet.
    Idle,
    Failed(String),
}

pub struct PreviewController<B: ImageBackend + 'static> {
    backend: Arc<B>,
    assets: Arc<AssetCache>,
    sink: Arc<dyn PresentationSink>,
    current: Mutex<CancelToken>,
    render_lock: Arc<tokio::sync::Mutex<()>>,
}

impl<B: ImageBackend + 'static> PreviewController<B> {
    pub fn new(backend: Arc<B>, assets: Arc<AssetCache>, sink: Arc<dyn PresentationSink>) -> Self {
        Self {
            backend,
            assets,
            sink,
            current: Mutex::new(CancelToken::new()),
            render_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Start a preview for `request`, superseding any earlier one.
    ///
    /// Must be called from within a tokio runtime.
    pub fn on_parameter_changed(&self, request: PreviewRequest) -> JoinHandle<PreviewOutcome> {
        let token = {
            let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
            current.cancel();
            *current = CancelToken::new();
            current.clone()
        };

        let backend = Arc::clone(&self.backend);
        let assets = Arc::clone(&self.assets);
        let sink = Arc::clone(&self.sink);
        let render_lock = Arc::clone(&self.render_lock);

        tokio::spawn(async move {
            let _guard = render_lock.lock().await;
            if token.is_cancelled() {
                tracing::debug!("preview superseded before rendering");
                return PreviewOutcome::Superseded;
            }

            let (Some(source), Some(watermark)) =
                (selected(&request.source), selected(&request.watermark))
            else {
                return PreviewOutcome::Idle;
            };
            let (source, watermark) = (source.to_path_buf(), watermark.to_path_buf());
            let params = request.params;

            let rendered = tokio::task::spawn_blocking(move || {
                render(&*backend, &assets, &source, &watermark, &params)
            })
            .await
            .map_err(|e| PreviewError::Worker(e.to_string()))
            .and_then(|r| r);

            let result = match rendered {
                Ok(result) => result,
                Err(e) => {
                    tracing::warn!(error = %e, "preview failed");
                    return PreviewOutcome::Failed(e.to_string());
                }
            };

            if token.is_cancelled() {
                tracing::debug!("preview superseded, discarding render");
                return PreviewOutcome::Superseded;
            }
            sink.publish_preview(result);
            PreviewOutcome::Published
        })
    }

    /// Cancel the in-flight preview, if any, without starting another.
    pub fn cancel(&self) {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
    }
}

fn render<B: ImageBackend + ?Sized>(
    backend: &B,
    assets: &AssetCache,
    source: &Path,
    watermark: &Path,
    params: &PlacementParams,
) -> Result<CompositeResult, PreviewError> {
    let canvas = backend.decode(source)?;
    let watermark = assets.watermark(backend, watermark)?;
    let plan = compute_plan(
        canvas.width(),
        canvas.height(),
        watermark.width(),
        watermark.height(),
        params,
    )?;
    Ok(composite(&canvas, &watermark, &plan))
}
