//! Display settings and mode coordination.
//!
//! The settings service owns the current [`DisplaySettings`], persists every
//! change and tells the mode services about it. It never starts or stops a
//! worker itself: each mode service decides for its own worker.

use super::ServiceError;
use crate::display::{DetectionError, DisplayProvider, PanelInfo};
use crate::models::{BorderColour, DisplaySettings, DisplaySettingsUpdate};
use crate::store::{self, Store, SETTINGS_KEY};
use crate::worker::{DisplayArbiter, RenderedImage};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tokio::sync::RwLock;

/// Receives every settings update, in subscription order
#[async_trait]
pub trait SettingsSubscriber: Send + Sync {
    async fn on_settings_update(&self, update: &DisplaySettingsUpdate);
}

pub struct SettingsService {
    store: Arc<dyn Store>,
    provider: Arc<dyn DisplayProvider>,
    arbiter: Arc<DisplayArbiter>,
    settings: RwLock<DisplaySettings>,
    subscribers: Mutex<Vec<Weak<dyn SettingsSubscriber>>>,
    // serializes merge, persist and fan-out of concurrent updates
    update_lock: tokio::sync::Mutex<()>,
    resolution_changed_at_boot: bool,
}

impl SettingsService {
    /// Restore the stored settings and reconcile them with the attached board
    pub async fn new(
        store: Arc<dyn Store>,
        provider: Arc<dyn DisplayProvider>,
    ) -> Result<Self, ServiceError> {
        tracing::info!("Created SettingsService");

        let stored = match store::load::<DisplaySettings>(store.as_ref(), SETTINGS_KEY) {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!("Ignoring stored display settings: {}", e);
                None
            }
        };
        match &stored {
            Some(settings) => tracing::info!("Settings were restored: {:?}", settings),
            None => tracing::info!("No stored settings, using defaults"),
        }

        let detected = detect(provider.clone()).await;
        let mut settings = stored.clone().unwrap_or_default();
        let mut resolution_changed_at_boot = false;

        if let Ok(Some(panel)) = detected {
            let matches_stored = stored.as_ref().is_some_and(|s| {
                s.display_type == panel.display_type && s.colour_palette == panel.colour_palette
            });

            if !matches_stored {
                tracing::info!(
                    "Detected display of {} ({}). Updating display settings...",
                    panel.display_type,
                    panel.colour_palette
                );
                resolution_changed_at_boot = stored.as_ref().is_some_and(|s| {
                    s.display_type.resolution() != panel.display_type.resolution()
                });
                settings = DisplaySettings {
                    display_type: panel.display_type,
                    colour_palette: panel.colour_palette,
                    border_colour: BorderColour::White,
                    mode: settings.mode,
                };
                store::save(store.as_ref(), SETTINGS_KEY, &settings)?;
            }
        } else if stored.is_none() {
            tracing::info!("Unable to detect display, using default settings");
        }

        Ok(Self {
            store,
            provider,
            arbiter: Arc::new(DisplayArbiter::new()),
            settings: RwLock::new(settings),
            subscribers: Mutex::new(Vec::new()),
            update_lock: tokio::sync::Mutex::new(()),
            resolution_changed_at_boot,
        })
    }

    pub async fn display_settings(&self) -> DisplaySettings {
        self.settings.read().await.clone()
    }

    /// Whether boot-time detection replaced a display of another resolution
    pub fn resolution_changed_at_boot(&self) -> bool {
        self.resolution_changed_at_boot
    }

    pub fn provider(&self) -> Arc<dyn DisplayProvider> {
        self.provider.clone()
    }

    pub fn arbiter(&self) -> Arc<DisplayArbiter> {
        self.arbiter.clone()
    }

    pub fn subscribe(&self, subscriber: Weak<dyn SettingsSubscriber>) {
        self.subscribers.lock().push(subscriber);
    }

    /// Merge, persist, then notify every subscriber with `update`
    pub async fn update_settings(
        &self,
        update: DisplaySettingsUpdate,
    ) -> Result<DisplaySettings, ServiceError> {
        let _serialized = self.update_lock.lock().await;

        let merged = {
            let mut current = self.settings.write().await;
            let merged = current.merged(&update);
            merged.validate()?;

            tracing::info!("Attempting to store settings...");
            store::save(self.store.as_ref(), SETTINGS_KEY, &merged)?;
            *current = merged.clone();
            merged
        };
        tracing::info!("Settings stored");

        self.emit_settings_update(&update).await;
        Ok(merged)
    }

    async fn emit_settings_update(&self, update: &DisplaySettingsUpdate) {
        let subscribers: Vec<Arc<dyn SettingsSubscriber>> = {
            let mut subscribers = self.subscribers.lock();
            subscribers.retain(|s| s.strong_count() > 0);
            subscribers.iter().filter_map(Weak::upgrade).collect()
        };

        for subscriber in subscribers {
            subscriber.on_settings_update(update).await;
        }
    }

    /// Probe the attached board
    pub async fn detect_display(&self) -> Result<Option<PanelInfo>, DetectionError> {
        detect(self.provider.clone()).await
    }

    /// Latest frame of whichever worker last held the display
    pub fn get_current_rendered_image(&self) -> Option<RenderedImage> {
        self.arbiter.current_image()
    }
}

async fn detect(provider: Arc<dyn DisplayProvider>) -> Result<Option<PanelInfo>, DetectionError> {
    let detected = tokio::task::spawn_blocking(move || provider.detect()).await;
    match detected {
        Ok(Err(e)) => {
            tracing::error!("{}", e);
            Err(e)
        }
        Ok(result) => result,
        Err(e) => {
            tracing::error!("Could not auto detect Inky device: {}", e);
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::{MockProvider, MockRecorder};
    use crate::models::{ColourPalette, DisplayMode, DisplayType};
    use crate::store::MemoryStore;

    fn stored(settings: &DisplaySettings) -> Arc<dyn Store> {
        let store = MemoryStore::new();
        store::save(&store, SETTINGS_KEY, settings).unwrap();
        Arc::new(store)
    }

    fn no_hardware() -> Arc<dyn DisplayProvider> {
        Arc::new(MockProvider::new(MockRecorder::new()))
    }

    fn detecting(display_type: DisplayType, colour_palette: ColourPalette) -> Arc<dyn DisplayProvider> {
        Arc::new(
            MockProvider::new(MockRecorder::new()).with_detected(Ok(Some(PanelInfo {
                display_type,
                colour_palette,
            }))),
        )
    }

    struct Recording {
        name: &'static str,
        log: Arc<Mutex<Vec<(&'static str, DisplaySettingsUpdate)>>>,
    }

    #[async_trait]
    impl SettingsSubscriber for Recording {
        async fn on_settings_update(&self, update: &DisplaySettingsUpdate) {
            self.log.lock().push((self.name, update.clone()));
        }
    }

    #[tokio::test]
    async fn defaults_without_store_or_hardware() {
        let service = SettingsService::new(Arc::new(MemoryStore::new()), no_hardware())
            .await
            .unwrap();

        assert_eq!(service.display_settings().await, DisplaySettings::default());
        assert!(!service.resolution_changed_at_boot());
    }

    #[tokio::test]
    async fn merge_is_field_local() {
        let initial = DisplaySettings {
            display_type: DisplayType::Phat122,
            colour_palette: ColourPalette::Red,
            border_colour: BorderColour::White,
            mode: DisplayMode::Slideshow,
        };
        let store = stored(&initial);
        let service = SettingsService::new(store.clone(), no_hardware()).await.unwrap();

        let merged = service
            .update_settings(DisplaySettingsUpdate {
                border_colour: Some(BorderColour::Black),
                ..Default::default()
            })
            .await
            .unwrap();

        let expected = DisplaySettings {
            border_colour: BorderColour::Black,
            ..initial
        };
        assert_eq!(merged, expected);
        assert_eq!(service.display_settings().await, expected);
        let persisted: DisplaySettings = store::load(store.as_ref(), SETTINGS_KEY).unwrap().unwrap();
        assert_eq!(persisted, expected);
    }

    #[tokio::test]
    async fn detected_hardware_overrides_stored_but_keeps_mode() {
        let initial = DisplaySettings {
            display_type: DisplayType::Phat104,
            colour_palette: ColourPalette::Red,
            border_colour: BorderColour::Black,
            mode: DisplayMode::ImageFeed,
        };
        let store = stored(&initial);
        let service = SettingsService::new(
            store.clone(),
            detecting(DisplayType::Spectra480, ColourPalette::Spectra),
        )
        .await
        .unwrap();

        let expected = DisplaySettings {
            display_type: DisplayType::Spectra480,
            colour_palette: ColourPalette::Spectra,
            border_colour: BorderColour::White,
            mode: DisplayMode::ImageFeed,
        };
        assert_eq!(service.display_settings().await, expected);
        assert!(service.resolution_changed_at_boot());
        let persisted: DisplaySettings = store::load(store.as_ref(), SETTINGS_KEY).unwrap().unwrap();
        assert_eq!(persisted, expected);
    }

    #[tokio::test]
    async fn matching_hardware_keeps_stored_settings() {
        let initial = DisplaySettings {
            display_type: DisplayType::Phat104,
            colour_palette: ColourPalette::Yellow,
            border_colour: BorderColour::Black,
            mode: DisplayMode::Slideshow,
        };
        let service = SettingsService::new(
            stored(&initial),
            detecting(DisplayType::Phat104, ColourPalette::Yellow),
        )
        .await
        .unwrap();

        assert_eq!(service.display_settings().await, initial);
        assert!(!service.resolution_changed_at_boot());
    }

    #[tokio::test]
    async fn subscribers_get_the_update_in_order() {
        let service = SettingsService::new(Arc::new(MemoryStore::new()), no_hardware())
            .await
            .unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));
        let first: Arc<dyn SettingsSubscriber> = Arc::new(Recording {
            name: "first",
            log: log.clone(),
        });
        let second: Arc<dyn SettingsSubscriber> = Arc::new(Recording {
            name: "second",
            log: log.clone(),
        });
        let dropped: Arc<dyn SettingsSubscriber> = Arc::new(Recording {
            name: "dropped",
            log: log.clone(),
        });
        service.subscribe(Arc::downgrade(&first));
        service.subscribe(Arc::downgrade(&dropped));
        service.subscribe(Arc::downgrade(&second));
        drop(dropped);

        let update = DisplaySettingsUpdate {
            mode: Some(DisplayMode::ImageFeed),
            ..Default::default()
        };
        service.update_settings(update.clone()).await.unwrap();

        let log = log.lock();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0], ("first", update.clone()));
        assert_eq!(log[1], ("second", update));
    }

    #[tokio::test]
    async fn unsupported_palette_is_rejected_and_not_stored() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let service = SettingsService::new(store.clone(), no_hardware()).await.unwrap();

        let result = service
            .update_settings(DisplaySettingsUpdate {
                display_type: Some(DisplayType::Impression448),
                ..Default::default()
            })
            .await;

        assert!(matches!(result, Err(ServiceError::Validation(_))));
        assert_eq!(service.display_settings().await, DisplaySettings::default());
        assert!(store.get(SETTINGS_KEY).unwrap().is_none());
    }

    #[tokio::test]
    async fn unsupported_board_is_reported() {
        let provider: Arc<dyn DisplayProvider> = Arc::new(
            MockProvider::new(MockRecorder::new())
                .with_detected(Err(DetectionError::Unsupported("Inky wHAT".into()))),
        );
        let service = SettingsService::new(Arc::new(MemoryStore::new()), provider)
            .await
            .unwrap();

        assert!(matches!(
            service.detect_display().await,
            Err(DetectionError::Unsupported(_))
        ));
        assert_eq!(service.display_settings().await, DisplaySettings::default());
    }
}
