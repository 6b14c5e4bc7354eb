//! Image processing module.
//!
//! Turns an arbitrary decoded image into a palette-indexed raster that
//! matches a display's resolution and colours.

pub mod codec;
pub mod dither;
pub mod download;
pub mod indexed;
pub mod palette;
pub mod placeholder;
pub mod transform;

pub use codec::{base64_to_image, decode_image, indexed_to_base64, CodecError};
pub use dither::dither;
pub use download::{fetch_bytes, DownloadError};
pub use indexed::IndexedImage;
pub use palette::{construct_palette, Palette};
pub use placeholder::generate_place_holder_image;
pub use transform::fit_to_resolution;

use image::DynamicImage;
use std::path::Path;

/// Full pipeline
///
/// 1. Dither to the palette (skipped when the pixels already match it)
/// 2. Centre-crop oversized axes
/// 3. Pad undersized axes with white
///
/// The result is always exactly `target_resolution`.
pub fn render_for_display(
    image: &DynamicImage,
    target_resolution: (u32, u32),
    palette: &Palette,
) -> IndexedImage {
    let indexed = dither(image, palette);
    let fitted = fit_to_resolution(indexed, target_resolution);
    debug_assert_eq!(fitted.dimensions(), target_resolution);
    fitted
}

/// Write a rendered frame to disk for inspection
///
/// Failures are logged, a debug dump never affects rendering.
pub fn save_debug_frame(dir: &Path, name: &str, image: &IndexedImage) {
    let path = dir.join(format!("{name}.png"));
    let result = std::fs::create_dir_all(dir)
        .map_err(|e| e.to_string())
        .and_then(|_| codec::indexed_to_png(image).map_err(|e| e.to_string()))
        .and_then(|png| std::fs::write(&path, png).map_err(|e| e.to_string()));

    match result {
        Ok(()) => tracing::debug!("Saved debug frame to {}", path.display()),
        Err(e) => tracing::warn!("Failed to save debug frame {}: {}", path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ColourPalette, DisplayType};
    use image::{Rgb, RgbImage};

    #[test]
    fn output_matches_target_for_larger_and_smaller_sources() {
        let palette = construct_palette(DisplayType::Phat104, ColourPalette::Red);
        let target = DisplayType::Phat104.resolution();

        for (w, h) in [(300, 200), (100, 50), (300, 50), (100, 200), (212, 104)] {
            let img = DynamicImage::ImageRgb8(RgbImage::from_fn(w, h, |x, y| {
                Rgb([(x % 256) as u8, (y % 256) as u8, 90])
            }));
            let out = render_for_display(&img, target, &palette);
            assert_eq!(out.dimensions(), target, "source {w}x{h}");
        }
    }

    #[test]
    fn padding_uses_white_index() {
        let palette = construct_palette(DisplayType::Spectra480, ColourPalette::Spectra);
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(10, 10, Rgb([0, 0, 0])));

        let out = render_for_display(&img, (20, 20), &palette);

        assert_eq!(out.get(0, 0), 0);
        assert_eq!(out.get(10, 10), 1);
    }

    #[test]
    fn debug_frame_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let palette = construct_palette(DisplayType::Phat122, ColourPalette::Black);
        let frame = IndexedImage::filled(4, 4, 1, palette);

        save_debug_frame(&dir.path().join("frames"), "result", &frame);

        assert!(dir.path().join("frames/result.png").exists());
    }
}
