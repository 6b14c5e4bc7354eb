//! Display capability layer.
//!
//! Workers never talk to a panel driver directly. They resolve a
//! [`DisplayAdapter`] through a [`DisplayProvider`], which either detects the
//! attached Inky board or builds the panel described by the stored settings.

pub mod eeprom;
pub mod gpio;
pub mod hardware;
pub mod mock;
pub mod panel;
pub mod spi;

pub use hardware::HardwareProvider;
pub use mock::{MockProvider, MockRecorder};

use crate::image_proc::{construct_palette, render_for_display, IndexedImage, Palette};
use crate::models::{BorderColour, ColourPalette, DisplaySettings, DisplayType};
use gpio::GpioError;
use image::DynamicImage;
use spi::SpiError;
use thiserror::Error;

/// Display driver errors
#[derive(Error, Debug)]
pub enum DisplayError {
    #[error("GPIO error: {0}")]
    Gpio(#[from] GpioError),

    #[error("SPI error: {0}")]
    Spi(#[from] SpiError),

    #[error("No driver available for display type {0}")]
    NoDriver(DisplayType),

    #[error("No image has been set")]
    NoImage,

    #[error("Image is {actual:?}, display expects {expected:?}")]
    ResolutionMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("Display I/O failed: {0}")]
    Io(String),
}

/// Hardware detection errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DetectionError {
    #[error("Unsupported display: {0}")]
    Unsupported(String),
}

/// What a detected (or configured) board is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanelInfo {
    pub display_type: DisplayType,
    pub colour_palette: ColourPalette,
}

impl From<&DisplaySettings> for PanelInfo {
    fn from(settings: &DisplaySettings) -> Self {
        Self {
            display_type: settings.display_type,
            colour_palette: settings.colour_palette,
        }
    }
}

/// A live panel handle
///
/// Implementations own their hardware lines and release them on drop.
pub trait Display: Send {
    fn resolution(&self) -> (u32, u32);

    /// Colour capability of the panel
    fn colour(&self) -> ColourPalette;

    fn set_border(&mut self, border: u8);

    /// Stage a frame, `image` must match [`Display::resolution`]
    fn set_image(&mut self, image: &IndexedImage) -> Result<(), DisplayError>;

    /// Push the staged frame to the panel
    fn show(&mut self) -> Result<(), DisplayError>;
}

/// Source of panel handles
pub trait DisplayProvider: Send + Sync {
    /// Probe for an attached board
    ///
    /// `Ok(None)` means nothing was found.
    fn detect(&self) -> Result<Option<PanelInfo>, DetectionError>;

    fn open(&self, panel: &PanelInfo) -> Result<Box<dyn Display>, DisplayError>;
}

/// Border register value for a display family
///
/// pHAT panels invert the polarity of every other board.
pub fn border_value(display_type: DisplayType, border_colour: BorderColour) -> u8 {
    match (display_type.is_phat(), border_colour) {
        (true, BorderColour::Black) => 1,
        (true, BorderColour::White) => 0,
        (false, BorderColour::Black) => 0,
        (false, BorderColour::White) => 1,
    }
}

/// A resolved panel plus the palette frames are quantized to
pub struct DisplayAdapter {
    display: Box<dyn Display>,
    display_type: DisplayType,
    palette: Palette,
}

impl std::fmt::Debug for DisplayAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DisplayAdapter")
            .field("display_type", &self.display_type)
            .field("resolution", &self.display.resolution())
            .finish()
    }
}

impl DisplayAdapter {
    /// Detect the attached board, falling back to the stored settings
    pub fn resolve(
        provider: &dyn DisplayProvider,
        settings: &DisplaySettings,
    ) -> Result<Self, DisplayError> {
        let panel = match provider.detect() {
            Ok(Some(panel)) => {
                tracing::debug!("Detected {} ({})", panel.display_type, panel.colour_palette);
                panel
            }
            Ok(None) => {
                tracing::info!("No display detected, initialising from settings");
                PanelInfo::from(settings)
            }
            Err(e) => {
                tracing::warn!("{}, initialising from settings", e);
                PanelInfo::from(settings)
            }
        };

        let display = provider.open(&panel)?;
        let palette = construct_palette(panel.display_type, display.colour());

        Ok(Self {
            display,
            display_type: panel.display_type,
            palette,
        })
    }

    pub fn display_type(&self) -> DisplayType {
        self.display_type
    }

    pub fn resolution(&self) -> (u32, u32) {
        self.display.resolution()
    }

    #[allow(dead_code)]
    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    pub fn apply_border(&mut self, border_colour: BorderColour) {
        let value = border_value(self.display_type, border_colour);
        tracing::debug!("Setting border colour to {:?}({})", border_colour, value);
        self.display.set_border(value);
    }

    /// Quantize and fit a frame, then stage it on the panel
    pub fn prepare(&mut self, image: &DynamicImage) -> Result<IndexedImage, DisplayError> {
        let frame = render_for_display(image, self.display.resolution(), &self.palette);
        self.display.set_image(&frame)?;
        Ok(frame)
    }

    /// Refresh the panel with the staged frame, failures are logged
    pub fn show(&mut self) {
        if let Err(e) = self.display.show() {
            tracing::error!("Failed to update {} display: {}", self.display_type, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DisplayMode;
    use image::{Rgb, RgbImage};

    fn settings(display_type: DisplayType, colour_palette: ColourPalette) -> DisplaySettings {
        DisplaySettings {
            display_type,
            colour_palette,
            border_colour: BorderColour::Black,
            mode: DisplayMode::Slideshow,
        }
    }

    #[test]
    fn phat_border_polarity_is_inverted() {
        assert_eq!(border_value(DisplayType::Phat104, BorderColour::Black), 1);
        assert_eq!(border_value(DisplayType::Phat104, BorderColour::White), 0);
        assert_eq!(border_value(DisplayType::Phat122, BorderColour::Black), 1);
        assert_eq!(border_value(DisplayType::Impression448, BorderColour::Black), 0);
        assert_eq!(border_value(DisplayType::Spectra480, BorderColour::White), 1);
    }

    #[test]
    fn resolve_falls_back_to_settings() {
        let recorder = MockRecorder::new();
        let provider = MockProvider::new(recorder.clone());

        let mut adapter =
            DisplayAdapter::resolve(&provider, &settings(DisplayType::Phat104, ColourPalette::Red))
                .unwrap();
        adapter.apply_border(BorderColour::Black);

        assert_eq!(adapter.display_type(), DisplayType::Phat104);
        assert_eq!(adapter.resolution(), (212, 104));
        assert_eq!(adapter.palette().len(), 3);
        assert_eq!(recorder.border(), Some(1));
    }

    #[test]
    fn detected_board_wins_over_settings() {
        let recorder = MockRecorder::new();
        let provider = MockProvider::new(recorder.clone()).with_detected(Ok(Some(PanelInfo {
            display_type: DisplayType::Spectra480,
            colour_palette: ColourPalette::Spectra,
        })));

        let mut adapter =
            DisplayAdapter::resolve(&provider, &settings(DisplayType::Phat104, ColourPalette::Red))
                .unwrap();
        adapter.apply_border(BorderColour::Black);

        assert_eq!(adapter.resolution(), (800, 480));
        assert_eq!(adapter.palette().len(), 6);
        assert_eq!(recorder.border(), Some(0));
    }

    #[test]
    fn unsupported_detection_falls_back_to_settings() {
        let provider = MockProvider::new(MockRecorder::new()).with_detected(Err(
            DetectionError::Unsupported("Inky wHAT".into()),
        ));

        let adapter =
            DisplayAdapter::resolve(&provider, &settings(DisplayType::Phat122, ColourPalette::Black))
                .unwrap();

        assert_eq!(adapter.display_type(), DisplayType::Phat122);
    }

    #[test]
    fn staged_frame_survives_show_failure() {
        let recorder = MockRecorder::new();
        recorder.fail_show(true);
        let provider = MockProvider::new(recorder.clone());
        let mut adapter =
            DisplayAdapter::resolve(&provider, &settings(DisplayType::Phat104, ColourPalette::Red))
                .unwrap();

        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(50, 50, Rgb([255, 0, 0])));
        let frame = adapter.prepare(&image).unwrap();
        adapter.show();

        assert_eq!(frame.dimensions(), (212, 104));
        assert_eq!(recorder.show_count(), 0);
    }
}
