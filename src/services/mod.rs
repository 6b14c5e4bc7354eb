//! Application services.
//!
//! [`Services`] wires the settings service, the two mode services and their
//! workers together, and is the only thing the HTTP layer talks to.

pub mod image_feed;
pub mod settings;
pub mod slideshow;

pub use image_feed::ImageFeedService;
pub use settings::SettingsService;
pub use slideshow::SlideshowService;

use crate::config::AppConfig;
use crate::display::{DetectionError, DisplayProvider};
use crate::image_proc::{base64_to_image, construct_palette, dither, indexed_to_base64, CodecError};
use crate::models::{
    DisplaySettings, DisplaySettingsUpdate, DisplayType, ImageDither, ImageFeedConfiguration,
    SlideshowConfiguration, ValidationError,
};
use crate::store::{Store, StoreError};
use crate::worker::{ImageFeedWorker, RenderedImage, SlideshowWorker};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{RwLock, RwLockReadGuard};

/// Service errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Image error: {0}")]
    Codec(#[from] CodecError),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Shutting down")]
    ShuttingDown,
}

pub struct Services {
    settings: Arc<SettingsService>,
    slideshow: Arc<SlideshowService>,
    image_feed: Arc<ImageFeedService>,
    /// `true` once `shutdown()` ran, updates hold a read guard while they run
    closed: RwLock<bool>,
}

impl Services {
    /// Build every service and resume the stored mode
    ///
    /// The slideshow subscribes first, so on a mode switch it is told before
    /// the image feed.
    pub async fn start(
        config: &AppConfig,
        store: Arc<dyn Store>,
        provider: Arc<dyn DisplayProvider>,
    ) -> Result<Self, ServiceError> {
        let settings = Arc::new(SettingsService::new(store.clone(), provider).await?);

        let slideshow_worker = SlideshowWorker::new(
            settings.provider(),
            settings.arbiter(),
            config.debug_output_dir.clone(),
        );
        let slideshow =
            SlideshowService::new(settings.clone(), store.clone(), slideshow_worker).await?;

        let image_feed_worker = ImageFeedWorker::new(
            settings.provider(),
            settings.arbiter(),
            config.debug_output_dir.clone(),
            config.feed_timeout(),
        );
        let image_feed = ImageFeedService::new(settings.clone(), store, image_feed_worker).await?;

        Ok(Self {
            settings,
            slideshow,
            image_feed,
            closed: RwLock::new(false),
        })
    }

    /// Guard for operations that may start a worker
    async fn open(&self) -> Result<RwLockReadGuard<'_, bool>, ServiceError> {
        let closed = self.closed.read().await;
        if *closed {
            return Err(ServiceError::ShuttingDown);
        }
        Ok(closed)
    }

    pub async fn get_display_settings(&self) -> DisplaySettings {
        self.settings.display_settings().await
    }

    pub async fn update_display_settings(
        &self,
        update: DisplaySettingsUpdate,
    ) -> Result<DisplaySettings, ServiceError> {
        let _open = self.open().await?;
        self.settings.update_settings(update).await
    }

    pub async fn detect_display(&self) -> Result<Option<DisplayType>, DetectionError> {
        let panel = self.settings.detect_display().await?;
        Ok(panel.map(|p| p.display_type))
    }

    pub fn get_current_rendered_image(&self) -> Option<RenderedImage> {
        self.settings.get_current_rendered_image()
    }

    pub async fn get_slideshow_configuration(&self) -> SlideshowConfiguration {
        self.slideshow.get_configuration().await
    }

    pub async fn update_slideshow_configuration(
        &self,
        configuration: SlideshowConfiguration,
    ) -> Result<(), ServiceError> {
        let _open = self.open().await?;
        self.slideshow.update_slideshow(configuration).await
    }

    pub async fn get_image_feed_configuration(&self) -> Option<ImageFeedConfiguration> {
        self.image_feed.get_configuration().await
    }

    pub async fn update_image_feed_configuration(
        &self,
        configuration: ImageFeedConfiguration,
    ) -> Result<(), ServiceError> {
        let _open = self.open().await?;
        self.image_feed.update_image_feed(configuration).await
    }

    /// Dither an image with the configured display's palette
    ///
    /// Returns a base64 PNG with the source dimensions, nothing is cropped or
    /// sent to the display.
    pub async fn dither(&self, request: ImageDither) -> Result<String, ServiceError> {
        request.validate()?;
        let settings = self.settings.display_settings().await;
        let palette = construct_palette(settings.display_type, settings.colour_palette);

        let dithered = tokio::task::spawn_blocking(move || {
            let image = base64_to_image(&request.image)?;
            tracing::debug!("Dithering {}x{} image", image.width(), image.height());
            indexed_to_base64(&dither(&image, &palette))
        })
        .await??;

        Ok(dithered)
    }

    /// Stop every worker, releasing the display
    ///
    /// Waits for updates in flight. Later updates fail with
    /// [`ServiceError::ShuttingDown`], so no worker restarts afterwards.
    pub async fn shutdown(&self) {
        let mut closed = self.closed.write().await;
        *closed = true;
        tracing::info!("Stopping all workers...");
        self.slideshow.stop().await;
        self.image_feed.stop().await;
    }
}
