//! Data model shared by the services, workers and the HTTP layer.
//!
//! Also holds the boundary validation for every configuration record. The
//! workers never see an unvalidated record.

use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Base64 prefix of a PNG file header
const PNG_HEADER: &str = "iVBORw0KGg";

/// Base64 prefix of a JPEG file header
const JPEG_HEADER: &str = "/9j/";

/// Upper bound for a slideshow image (decoded estimate, KiB)
pub const SLIDESHOW_IMAGE_LIMIT_KB: usize = 1100;

/// Upper bound for an image sent to the dither endpoint (decoded estimate, KiB)
pub const DITHER_IMAGE_LIMIT_KB: usize = 15100;

/// Boundary validation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid base64 string: {0}")]
    InvalidBase64(String),

    #[error("Image is not in PNG or JPG/JPEG format")]
    UnsupportedImageFormat,

    #[error("Image is larger than {0}KB")]
    ImageTooLarge(usize),

    #[error("{field} must be between {min} and {max} seconds")]
    OutOfRange {
        field: &'static str,
        min: u64,
        max: u64,
    },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Colour palette {palette} is not supported by display {display}")]
    UnsupportedPalette {
        display: DisplayType,
        palette: ColourPalette,
    },
}

/// Supported Inky display types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayType {
    /// 2.13" pHAT, original controller
    Phat104,
    /// 2.13" pHAT, SSD1608 controller
    Phat122,
    /// 4" Impression
    Impression400,
    /// 5.7" Impression
    Impression448,
    /// 7.3" Impression
    Impression480,
    /// 7.3" Impression, 2025 edition
    Spectra480,
    /// 13.3" Impression
    Spectra1200,
}

impl DisplayType {
    /// Native panel resolution (width, height)
    pub fn resolution(&self) -> (u32, u32) {
        match self {
            DisplayType::Phat104 => (212, 104),
            DisplayType::Phat122 => (250, 122),
            DisplayType::Impression400 => (640, 400),
            DisplayType::Impression448 => (600, 448),
            DisplayType::Impression480 => (800, 480),
            DisplayType::Spectra480 => (800, 480),
            DisplayType::Spectra1200 => (1600, 1200),
        }
    }

    /// Small two/three colour panels
    pub fn is_phat(&self) -> bool {
        matches!(self, DisplayType::Phat104 | DisplayType::Phat122)
    }

    /// Whether this panel can render the given palette
    pub fn supports(&self, palette: ColourPalette) -> bool {
        match self {
            DisplayType::Phat104 | DisplayType::Phat122 => matches!(
                palette,
                ColourPalette::Red | ColourPalette::Yellow | ColourPalette::Black
            ),
            DisplayType::Impression400
            | DisplayType::Impression448
            | DisplayType::Impression480 => palette == ColourPalette::SevenColour,
            DisplayType::Spectra480 | DisplayType::Spectra1200 => {
                palette == ColourPalette::Spectra
            }
        }
    }

    /// The palette multi-colour panels are fixed to
    pub fn native_palette(&self) -> Option<ColourPalette> {
        match self {
            DisplayType::Phat104 | DisplayType::Phat122 => None,
            DisplayType::Impression400
            | DisplayType::Impression448
            | DisplayType::Impression480 => Some(ColourPalette::SevenColour),
            DisplayType::Spectra480 | DisplayType::Spectra1200 => Some(ColourPalette::Spectra),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DisplayType::Phat104 => "phat104",
            DisplayType::Phat122 => "phat122",
            DisplayType::Impression400 => "impression400",
            DisplayType::Impression448 => "impression448",
            DisplayType::Impression480 => "impression480",
            DisplayType::Spectra480 => "spectra480",
            DisplayType::Spectra1200 => "spectra1200",
        }
    }
}

impl std::fmt::Display for DisplayType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Colour capability of a panel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColourPalette {
    #[serde(rename = "red")]
    Red,
    #[serde(rename = "yellow")]
    Yellow,
    #[serde(rename = "black")]
    Black,
    #[serde(rename = "7Colour")]
    SevenColour,
    #[serde(rename = "spectra")]
    Spectra,
}

impl std::fmt::Display for ColourPalette {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ColourPalette::Red => "red",
            ColourPalette::Yellow => "yellow",
            ColourPalette::Black => "black",
            ColourPalette::SevenColour => "7Colour",
            ColourPalette::Spectra => "spectra",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BorderColour {
    White,
    Black,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayMode {
    #[default]
    Slideshow,
    ImageFeed,
}

/// Current display hardware settings and active mode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplaySettings {
    #[serde(rename = "type")]
    pub display_type: DisplayType,
    pub colour_palette: ColourPalette,
    pub border_colour: BorderColour,
    #[serde(default)]
    pub mode: DisplayMode,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            display_type: DisplayType::Phat104,
            colour_palette: ColourPalette::Red,
            border_colour: BorderColour::White,
            mode: DisplayMode::Slideshow,
        }
    }
}

impl DisplaySettings {
    /// Field-level merge: only fields present in `update` overwrite
    pub fn merged(&self, update: &DisplaySettingsUpdate) -> DisplaySettings {
        DisplaySettings {
            display_type: update.display_type.unwrap_or(self.display_type),
            colour_palette: update.colour_palette.unwrap_or(self.colour_palette),
            border_colour: update.border_colour.unwrap_or(self.border_colour),
            mode: update.mode.unwrap_or(self.mode),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.display_type.supports(self.colour_palette) {
            return Err(ValidationError::UnsupportedPalette {
                display: self.display_type,
                palette: self.colour_palette,
            });
        }
        Ok(())
    }
}

/// Partial settings update, absent fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplaySettingsUpdate {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub display_type: Option<DisplayType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colour_palette: Option<ColourPalette>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub border_colour: Option<BorderColour>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<DisplayMode>,
}

/// Slideshow content: base64 encoded PNG/JPEG images shown in order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlideshowConfiguration {
    /// Delay between each image change in seconds
    pub change_delay: u64,
    pub images: Vec<String>,
}

impl Default for SlideshowConfiguration {
    fn default() -> Self {
        Self {
            change_delay: 1800,
            images: Vec::new(),
        }
    }
}

impl SlideshowConfiguration {
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_range("change_delay", self.change_delay, 300, 86_400)?;
        for image in &self.images {
            validate_image_payload(image, SLIDESHOW_IMAGE_LIMIT_KB)?;
        }
        Ok(())
    }
}

/// Remote image feed polled at a fixed interval
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageFeedConfiguration {
    /// Interval between each request to the feed URL in seconds
    pub polling_interval: u64,
    pub image_feed_url: String,
}

impl ImageFeedConfiguration {
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_range("polling_interval", self.polling_interval, 60, 86_400)?;

        let url = reqwest::Url::parse(self.image_feed_url.trim())
            .map_err(|_| ValidationError::InvalidUrl(self.image_feed_url.clone()))?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(ValidationError::InvalidUrl(self.image_feed_url.clone()));
        }
        Ok(())
    }
}

/// Request body of the dither preview endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct ImageDither {
    pub image: String,
}

impl ImageDither {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_image_payload(&self.image, DITHER_IMAGE_LIMIT_KB)
    }
}

fn check_range(field: &'static str, value: u64, min: u64, max: u64) -> Result<(), ValidationError> {
    if value < min || value > max {
        return Err(ValidationError::OutOfRange { field, min, max });
    }
    Ok(())
}

/// Check a base64 image: decodable, PNG or JPEG header, within the size limit
pub fn validate_image_payload(base64_image: &str, limit_kb: usize) -> Result<(), ValidationError> {
    base64::engine::general_purpose::STANDARD
        .decode(base64_image)
        .map_err(|e| ValidationError::InvalidBase64(e.to_string()))?;

    if !base64_image.starts_with(PNG_HEADER) && !base64_image.starts_with(JPEG_HEADER) {
        return Err(ValidationError::UnsupportedImageFormat);
    }

    let byte_estimate = (base64_image.len() * 3 / 4).saturating_sub(2);
    if byte_estimate >= limit_kb * 1024 {
        return Err(ValidationError::ImageTooLarge(limit_kb));
    }

    Ok(())
}
