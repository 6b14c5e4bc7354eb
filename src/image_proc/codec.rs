//! Base64 and PNG conversions for images crossing the API boundary.

use super::indexed::IndexedImage;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Invalid base64 image: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Image decode/encode failed: {0}")]
    Image(#[from] image::ImageError),
}

/// Decode encoded image bytes, guessing the format from the content
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, CodecError> {
    let reader = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(image::ImageError::IoError)?;
    Ok(reader.decode()?)
}

pub fn base64_to_image(base64_image: &str) -> Result<DynamicImage, CodecError> {
    let bytes = STANDARD.decode(base64_image.trim())?;
    decode_image(&bytes)
}

pub fn image_to_png(image: &DynamicImage) -> Result<Vec<u8>, CodecError> {
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Png)?;
    Ok(buffer.into_inner())
}

pub fn image_to_base64(image: &DynamicImage) -> Result<String, CodecError> {
    Ok(STANDARD.encode(image_to_png(image)?))
}

/// PNG of the palette image expanded to RGB
pub fn indexed_to_png(image: &IndexedImage) -> Result<Vec<u8>, CodecError> {
    image_to_png(&DynamicImage::ImageRgb8(image.to_rgb()))
}

pub fn indexed_to_base64(image: &IndexedImage) -> Result<String, CodecError> {
    Ok(STANDARD.encode(indexed_to_png(image)?))
}
