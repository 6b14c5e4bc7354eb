//! Slideshow mode.

use super::settings::{SettingsService, SettingsSubscriber};
use super::ServiceError;
use crate::image_proc::generate_place_holder_image;
use crate::models::{
    DisplayMode, DisplaySettings, DisplaySettingsUpdate, DisplayType, SlideshowConfiguration,
};
use crate::store::{self, Store, SLIDESHOW_KEY};
use crate::worker::{SlideshowWorker, WorkerState};
use async_trait::async_trait;
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;

struct SlideshowState {
    configuration: SlideshowConfiguration,
    worker: SlideshowWorker,
    // display the current configuration was prepared for
    display_type: DisplayType,
}

pub struct SlideshowService {
    settings_service: Arc<SettingsService>,
    store: Arc<dyn Store>,
    state: Mutex<SlideshowState>,
}

impl SlideshowService {
    /// Restore the slideshow, subscribe to settings and start if active
    pub async fn new(
        settings_service: Arc<SettingsService>,
        store: Arc<dyn Store>,
        worker: SlideshowWorker,
    ) -> Result<Arc<Self>, ServiceError> {
        tracing::info!("Created SlideshowService");
        let settings = settings_service.display_settings().await;

        let mut configuration = match store::load::<SlideshowConfiguration>(store.as_ref(), SLIDESHOW_KEY) {
            Ok(Some(configuration)) => {
                tracing::info!("Slideshow configuration was restored");
                configuration
            }
            Ok(None) => {
                tracing::info!("No slideshow configuration found...");
                SlideshowConfiguration::default()
            }
            Err(e) => {
                tracing::warn!("Ignoring stored slideshow configuration: {}", e);
                SlideshowConfiguration::default()
            }
        };

        if configuration.images.is_empty() || settings_service.resolution_changed_at_boot() {
            configuration = with_place_holder(&configuration, &settings)?;
            store::save(store.as_ref(), SLIDESHOW_KEY, &configuration)?;
        }

        let service = Arc::new(Self {
            settings_service: settings_service.clone(),
            store,
            state: Mutex::new(SlideshowState {
                configuration,
                worker,
                display_type: settings.display_type,
            }),
        });

        let weak = Arc::downgrade(&service);
        let subscriber: Weak<dyn SettingsSubscriber> = weak;
        settings_service.subscribe(subscriber);

        if settings.mode == DisplayMode::Slideshow {
            let mut state = service.state.lock().await;
            start(&mut state, &settings).await;
        }

        Ok(service)
    }

    pub async fn get_configuration(&self) -> SlideshowConfiguration {
        self.state.lock().await.configuration.clone()
    }

    /// Replace the slideshow and restart it when slideshow mode is active
    pub async fn update_slideshow(
        &self,
        configuration: SlideshowConfiguration,
    ) -> Result<(), ServiceError> {
        configuration.validate()?;
        let settings = self.settings_service.display_settings().await;

        let configuration = if configuration.images.is_empty() {
            with_place_holder(&configuration, &settings)?
        } else {
            configuration
        };

        tracing::info!("Attempting to store slideshow configuration...");
        store::save(self.store.as_ref(), SLIDESHOW_KEY, &configuration)?;

        let mut state = self.state.lock().await;
        state.configuration = configuration;
        state.display_type = settings.display_type;

        if settings.mode == DisplayMode::Slideshow {
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
impl SettingsSubscriber for SlideshowService {
    async fn on_settings_update(&self, update: &DisplaySettingsUpdate) {
        tracing::info!("Settings have changed: {:?}", update);
        let settings = self.settings_service.display_settings().await;
        let mut state = self.state.lock().await;

        if settings.display_type.resolution() != state.display_type.resolution() {
            tracing::info!("Display has changed, clearing slideshow configuration");
            match with_place_holder(&state.configuration, &settings) {
                Ok(configuration) => {
                    if let Err(e) = store::save(self.store.as_ref(), SLIDESHOW_KEY, &configuration) {
                        tracing::error!("Failed to store slideshow configuration: {}", e);
                    }
                    state.configuration = configuration;
                }
                Err(e) => tracing::error!("Failed to generate placeholder image: {}", e),
            }
        }
        state.display_type = settings.display_type;

        if settings.mode == DisplayMode::Slideshow {
            tracing::info!("Slideshow mode is active, restart slideshow");
            start(&mut state, &settings).await;
        } else if state.worker.is_running() {
            tracing::info!("Slideshow mode has been disabled, stop slideshow");
            state.worker.stop().await;
        }
    }
}

async fn start(state: &mut SlideshowState, settings: &DisplaySettings) {
    tracing::info!(
        "Attempting to start slideshow on {} ({})",
        settings.display_type,
        settings.colour_palette
    );
    if let Err(e) = state
        .worker
        .start_slideshow(&state.configuration, settings)
        .await
    {
        tracing::error!("Failed to start slideshow: {}", e);
    }
}

fn with_place_holder(
    configuration: &SlideshowConfiguration,
    settings: &DisplaySettings,
) -> Result<SlideshowConfiguration, ServiceError> {
    tracing::info!("Defaulting slideshow to placeholder image");
    Ok(SlideshowConfiguration {
        change_delay: configuration.change_delay,
        images: vec![generate_place_holder_image(settings)?],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::{MockProvider, MockRecorder};
    use crate::image_proc::base64_to_image;
    use crate::models::{BorderColour, ColourPalette};
    use crate::store::MemoryStore;
    use crate::worker::test_support::wait_for;
    use image::GenericImageView;

    async fn setup(
        store: Arc<dyn Store>,
    ) -> (Arc<SettingsService>, Arc<SlideshowService>, MockRecorder) {
        let recorder = MockRecorder::new();
        let settings_service = Arc::new(
            SettingsService::new(store.clone(), Arc::new(MockProvider::new(recorder.clone())))
                .await
                .unwrap(),
        );
        let worker = SlideshowWorker::new(
            settings_service.provider(),
            settings_service.arbiter(),
            None,
        );
        let service = SlideshowService::new(settings_service.clone(), store, worker)
            .await
            .unwrap();
        (settings_service, service, recorder)
    }

    #[tokio::test]
    async fn empty_slideshow_gets_a_placeholder() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let (_, service, recorder) = setup(store.clone()).await;

        let configuration = service.get_configuration().await;
        assert_eq!(configuration.images.len(), 1);
        let placeholder = base64_to_image(&configuration.images[0]).unwrap();
        assert_eq!(placeholder.dimensions(), (212, 104));

        let persisted: SlideshowConfiguration =
            store::load(store.as_ref(), SLIDESHOW_KEY).unwrap().unwrap();
        assert_eq!(persisted, configuration);

        assert!(wait_for(|| recorder.show_count() > 0).await);
        service.stop().await;
    }

    #[tokio::test]
    async fn partial_update_keeps_slideshow_running() {
        let (settings_service, service, recorder) = setup(Arc::new(MemoryStore::new())).await;
        assert!(wait_for(|| recorder.show_count() == 1).await);

        settings_service
            .update_settings(DisplaySettingsUpdate {
                border_colour: Some(BorderColour::Black),
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(service.is_running().await);
        assert_eq!(recorder.border(), Some(1));
        service.stop().await;
    }

    #[tokio::test]
    async fn leaving_slideshow_mode_stops_the_worker() {
        let (settings_service, service, recorder) = setup(Arc::new(MemoryStore::new())).await;
        assert!(wait_for(|| recorder.show_count() == 1).await);

        settings_service
            .update_settings(DisplaySettingsUpdate {
                mode: Some(DisplayMode::ImageFeed),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(service.worker_state().await, WorkerState::Stopped);
        assert_eq!(recorder.open_handles(), 0);
    }

    #[tokio::test]
    async fn resolution_change_replaces_images() {
        let (settings_service, service, _) = setup(Arc::new(MemoryStore::new())).await;

        settings_service
            .update_settings(DisplaySettingsUpdate {
                display_type: Some(DisplayType::Spectra480),
                colour_palette: Some(ColourPalette::Spectra),
                ..Default::default()
            })
            .await
            .unwrap();

        let configuration = service.get_configuration().await;
        let placeholder = base64_to_image(&configuration.images[0]).unwrap();
        assert_eq!(placeholder.dimensions(), (800, 480));
        service.stop().await;
    }

    #[tokio::test]
    async fn invalid_slideshow_is_rejected() {
        let (_, service, _) = setup(Arc::new(MemoryStore::new())).await;
        let before = service.get_configuration().await;

        let result = service
            .update_slideshow(SlideshowConfiguration {
                change_delay: 10,
                images: Vec::new(),
            })
            .await;

        assert!(matches!(result, Err(ServiceError::Validation(_))));
        assert_eq!(service.get_configuration().await, before);
        service.stop().await;
    }
}
