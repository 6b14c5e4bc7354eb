//! Background render loops.
//!
//! A [`Worker`] owns one loop bound to the display. What it shows comes from
//! a [`Job`]: the slideshow cycles through stored images, the image feed
//! polls a URL. Start/stop and rendering are shared.

pub mod arbiter;
pub mod image_feed;
pub mod slideshow;

pub use arbiter::{DisplayArbiter, DisplayLease};
pub use image_feed::ImageFeedWorker;
pub use slideshow::SlideshowWorker;

use crate::display::{DisplayAdapter, DisplayError, DisplayProvider};
use crate::image_proc::{indexed_to_base64, save_debug_frame, CodecError, DownloadError};
use crate::models::DisplaySettings;
use async_trait::async_trait;
use image::DynamicImage;
use parking_lot::Mutex;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Worker errors
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Display error: {0}")]
    Display(#[from] DisplayError),

    #[error("Image error: {0}")]
    Codec(#[from] CodecError),

    #[error("Download error: {0}")]
    Download(#[from] DownloadError),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Which mode a worker serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerKind {
    Slideshow,
    ImageFeed,
}

impl std::fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerKind::Slideshow => f.write_str("Slideshow Worker"),
            WorkerKind::ImageFeed => f.write_str("Image Feed Worker"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Last frame a worker pushed to the display
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedImage {
    /// Base64 encoded PNG
    pub image: String,
    /// RFC 3339
    pub rendered_at: String,
}

pub type CurrentImage = Arc<Mutex<Option<RenderedImage>>>;

/// Source of frames for a worker loop
#[async_trait]
pub trait Job: Send + 'static {
    /// Next image to show, `None` when there is nothing new
    async fn next_image(&mut self) -> Result<Option<DynamicImage>, WorkerError>;

    /// Pause between iterations
    fn delay(&self) -> Duration;

    /// The last image could not be rendered
    fn render_failed(&mut self) {}
}

/// A restartable render loop
pub struct Worker {
    kind: WorkerKind,
    provider: Arc<dyn DisplayProvider>,
    arbiter: Arc<DisplayArbiter>,
    debug_dir: Option<PathBuf>,
    current_image: CurrentImage,
    state: Arc<Mutex<WorkerState>>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl Worker {
    pub fn new(
        kind: WorkerKind,
        provider: Arc<dyn DisplayProvider>,
        arbiter: Arc<DisplayArbiter>,
        debug_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            kind,
            provider,
            arbiter,
            debug_dir,
            current_image: Arc::new(Mutex::new(None)),
            state: Arc::new(Mutex::new(WorkerState::Stopped)),
            cancel: CancellationToken::new(),
            task: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    #[allow(dead_code)]
    pub fn state(&self) -> WorkerState {
        if self.task.as_ref().is_some_and(|task| task.is_finished()) {
            return WorkerState::Stopped;
        }
        *self.state.lock()
    }

    /// Latest rendered frame as base64 PNG
    #[allow(dead_code)]
    pub fn get_current_image_in_base64(&self) -> Option<String> {
        self.current_image.lock().as_ref().map(|r| r.image.clone())
    }

    /// Start the loop, replacing any run in progress
    ///
    /// Binds the display, resolves the panel and applies the border before
    /// the loop is spawned.
    pub async fn start(
        &mut self,
        job: Box<dyn Job>,
        settings: &DisplaySettings,
    ) -> Result<(), WorkerError> {
        if self.is_running() {
            tracing::info!("{} is already running, restarting with latest settings...", self.kind);
        }
        self.stop().await;

        self.set_state(WorkerState::Starting);
        let cancel = CancellationToken::new();
        let lease = self
            .arbiter
            .bind(self.kind, cancel.clone(), self.current_image.clone())
            .await;

        let provider = Arc::clone(&self.provider);
        let display_settings = settings.clone();
        let resolved = tokio::task::spawn_blocking(move || {
            let mut adapter = DisplayAdapter::resolve(provider.as_ref(), &display_settings)?;
            adapter.apply_border(display_settings.border_colour);
            Ok::<_, DisplayError>(adapter)
        })
        .await;

        let adapter = match resolved {
            Ok(Ok(adapter)) => adapter,
            Ok(Err(e)) => {
                self.set_state(WorkerState::Stopped);
                return Err(e.into());
            }
            Err(e) => {
                self.set_state(WorkerState::Stopped);
                return Err(e.into());
            }
        };

        tracing::info!("Starting {}...", self.kind);
        let context = LoopContext {
            kind: self.kind,
            cancel: cancel.clone(),
            current_image: self.current_image.clone(),
            state: self.state.clone(),
            debug_dir: self.debug_dir.clone(),
        };
        self.cancel = cancel;
        self.task = Some(tokio::spawn(run_loop(job, adapter, lease, context)));
        Ok(())
    }

    /// Stop the loop and wait until it has exited
    ///
    /// The panel handle and the display lease are released before this
    /// returns.
    pub async fn stop(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };

        tracing::info!("Stopping {} thread...", self.kind);
        self.set_state(WorkerState::Stopping);
        self.cancel.cancel();

        if let Err(e) = task.await {
            tracing::error!("{} exited abnormally: {}", self.kind, e);
        }
        self.set_state(WorkerState::Stopped);
    }

    fn set_state(&self, state: WorkerState) {
        *self.state.lock() = state;
    }
}

struct LoopContext {
    kind: WorkerKind,
    cancel: CancellationToken,
    current_image: CurrentImage,
    state: Arc<Mutex<WorkerState>>,
    debug_dir: Option<PathBuf>,
}

async fn run_loop(
    mut job: Box<dyn Job>,
    adapter: DisplayAdapter,
    lease: DisplayLease,
    ctx: LoopContext,
) {
    *ctx.state.lock() = WorkerState::Running;
    let mut adapter = Some(adapter);

    while !ctx.cancel.is_cancelled() {
        match job.next_image().await {
            Ok(Some(image)) => {
                let Some(current) = adapter.take() else {
                    break;
                };
                let slot = ctx.current_image.clone();
                match render(current, image, slot, ctx.debug_dir.clone()).await {
                    Ok((returned, Ok(()))) => {
                        adapter = Some(returned);
                    }
                    Ok((returned, Err(e))) => {
                        adapter = Some(returned);
                        job.render_failed();
                        tracing::error!("{} failed to render image: {}", ctx.kind, e);
                    }
                    Err(e) => {
                        tracing::error!("{} lost its display: {}", ctx.kind, e);
                        break;
                    }
                }
            }
            Ok(None) => tracing::debug!("{}: nothing new to display", ctx.kind),
            Err(e) => tracing::warn!("{} could not produce an image: {}", ctx.kind, e),
        }

        tokio::select! {
            _ = ctx.cancel.cancelled() => break,
            _ = tokio::time::sleep(job.delay()) => {}
        }
    }

    // panel first, then the lease that lets the next worker open it
    drop(adapter);
    drop(lease);
    *ctx.state.lock() = WorkerState::Stopped;
    tracing::info!("{} stopped", ctx.kind);
}

/// Render on the blocking pool, handing the adapter back afterwards
///
/// The frame is published to `current_image` before the panel refresh
/// starts, so it is visible for the whole refresh.
async fn render(
    mut adapter: DisplayAdapter,
    image: DynamicImage,
    current_image: CurrentImage,
    debug_dir: Option<PathBuf>,
) -> Result<(DisplayAdapter, Result<(), WorkerError>), tokio::task::JoinError> {
    tokio::task::spawn_blocking(move || {
        let result = adapter
            .prepare(&image)
            .map_err(WorkerError::from)
            .and_then(|frame| {
                if let Some(dir) = &debug_dir {
                    save_debug_frame(dir, "result", &frame);
                }
                Ok(RenderedImage {
                    image: indexed_to_base64(&frame)?,
                    rendered_at: chrono::Utc::now().to_rfc3339(),
                })
            })
            .map(|rendered| {
                *current_image.lock() = Some(rendered);
                adapter.show();
            });
        (adapter, result)
    })
    .await
}
