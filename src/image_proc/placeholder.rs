//! Placeholder frame shown when the slideshow has nothing to display.

use super::codec::{indexed_to_base64, CodecError};
use super::indexed::IndexedImage;
use super::palette::construct_palette;
use crate::models::DisplaySettings;

/// Build the placeholder for the configured display, as base64 PNG
///
/// A white canvas at the panel resolution with a black frame and a centred
/// block in the accent colour (black on two colour panels).
pub fn generate_place_holder_image(settings: &DisplaySettings) -> Result<String, CodecError> {
    tracing::info!("Generating a placeholder image for {}", settings.display_type);
    let image = place_holder_frame(settings);
    indexed_to_base64(&image)
}

pub fn place_holder_frame(settings: &DisplaySettings) -> IndexedImage {
    let (width, height) = settings.display_type.resolution();
    let palette = construct_palette(settings.display_type, settings.colour_palette);
    let white = palette.white_index();
    let black = palette.index_of(super::palette::BLACK).unwrap_or(1);
    let accent = if palette.len() > 2 { 2 } else { black };

    let mut frame = IndexedImage::filled(width, height, white, palette);

    let border = if settings.display_type.is_phat() { 4 } else { 12 };
    frame.fill_rect(0, 0, width, border, black);
    frame.fill_rect(0, height - border, width, border, black);
    frame.fill_rect(0, 0, border, height, black);
    frame.fill_rect(width - border, 0, border, height, black);

    let block_w = width / 3;
    let block_h = height / 3;
    frame.fill_rect((width - block_w) / 2, (height - block_h) / 2, block_w, block_h, accent);

    frame
}
