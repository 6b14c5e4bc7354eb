//! Image feed mode.

use super::settings::{SettingsService, SettingsSubscriber};
use super::ServiceError;
use crate::models::{DisplayMode, DisplaySettings, DisplaySettingsUpdate, ImageFeedConfiguration};
use crate::store::{self, Store, FEED_KEY};
use crate::worker::{ImageFeedWorker, WorkerState};
use async_trait::async_trait;
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;

struct FeedState {
    configuration: Option<ImageFeedConfiguration>,
    worker: ImageFeedWorker,
}

pub struct ImageFeedService {
    settings_service: Arc<SettingsService>,
    store: Arc<dyn Store>,
    state: Mutex<FeedState>,
}

impl ImageFeedService {
    pub async fn new(
        settings_service: Arc<SettingsService>,
        store: Arc<dyn Store>,
        worker: ImageFeedWorker,
    ) -> Result<Arc<Self>, ServiceError> {
        tracing::info!("Created ImageFeedService");

        let configuration = match store::load::<ImageFeedConfiguration>(store.as_ref(), FEED_KEY) {
            Ok(Some(configuration)) => {
                tracing::info!("Image feed configuration was restored");
                Some(configuration)
            }
            Ok(None) => {
                tracing::info!("No image feed configuration found...");
                None
            }
            Err(e) => {
                tracing::warn!("Ignoring stored image feed configuration: {}", e);
                None
            }
        };

        let service = Arc::new(Self {
            settings_service: settings_service.clone(),
            store,
            state: Mutex::new(FeedState {
                configuration,
                worker,
            }),
        });

        let weak = Arc::downgrade(&service);
        let subscriber: Weak<dyn SettingsSubscriber> = weak;
        settings_service.subscribe(subscriber);

        let settings = settings_service.display_settings().await;
        if settings.mode == DisplayMode::ImageFeed {
            let mut state = service.state.lock().await;
            start(&mut state, &settings).await;
        }

        Ok(service)
    }

    pub async fn get_configuration(&self) -> Option<ImageFeedConfiguration> {
        self.state.lock().await.configuration.clone()
    }

    /// Replace the feed and restart it when image feed mode is active
    pub async fn update_image_feed(
        &self,
        configuration: ImageFeedConfiguration,
    ) -> Result<(), ServiceError> {
        configuration.validate()?;

        tracing::info!("Attempting to store image feed configuration...");
        store::save(self.store.as_ref(), FEED_KEY, &configuration)?;

        let settings = self.settings_service.display_settings().await;
        let mut state = self.state.lock().await;
        state.configuration = Some(configuration);

        if settings.mode == DisplayMode::ImageFeed {
            start(&mut state, &settings).await;
        }
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        self.state.lock().await.worker.is_running()
    }

    #[allow(dead_code)]
    pub async fn worker_state(&self) -> WorkerState {
        self.state.lock().await.worker.state()
    }

    pub async fn stop(&self) {
        self.state.lock().await.worker.stop().await;
    }
}

#[async_trait]
impl SettingsSubscriber for ImageFeedService {
    async fn on_settings_update(&self, update: &DisplaySettingsUpdate) {
        tracing::info!("Settings have changed: {:?}", update);
        let settings = self.settings_service.display_settings().await;
        let mut state = self.state.lock().await;

        match (settings.mode, state.configuration.is_some()) {
            (DisplayMode::ImageFeed, true) => {
                tracing::info!("Image feed mode is active, restart image feed");
                start(&mut state, &settings).await;
            }
            (DisplayMode::ImageFeed, false) => {
                tracing::info!("Image feed mode is active but no configuration found");
                state.worker.stop().await;
            }
            _ if state.worker.is_running() => {
                tracing::info!("Image feed mode has been disabled, stop image feed");
                state.worker.stop().await;
            }
            _ => {}
        }
    }
}

async fn start(state: &mut FeedState, settings: &DisplaySettings) {
    let Some(configuration) = &state.configuration else {
        tracing::info!("Image feed could not be started, no image feed configuration found");
        return;
    };

    tracing::info!(
        "Attempting to start image feed on {} ({})",
        settings.display_type,
        settings.colour_palette
    );
    if let Err(e) = state.worker.start_image_feed(configuration, settings).await {
        tracing::error!("Failed to start image feed: {}", e);
    }
}
