//! Floyd-Steinberg dithering onto a display palette.
//!
//! Uses the row-by-row approach that only keeps 2 rows of error accumulation
//! in memory at a time, which matters on the Pi Zero W's limited RAM.

use super::indexed::IndexedImage;
use super::palette::Palette;
use image::{DynamicImage, RgbImage};

/// Quantize an image to the palette
///
/// Images whose pixels already all sit on the palette are indexed directly.
/// Everything else goes through error diffusion. Dimensions are preserved.
pub fn dither(image: &DynamicImage, palette: &Palette) -> IndexedImage {
    let rgb = image.to_rgb8();

    if let Some(indexed) = IndexedImage::from_exact_colours(&rgb, palette) {
        tracing::debug!("Image already uses the display palette, skipping dithering");
        return indexed;
    }

    dither_rgb(&rgb, palette)
}

/// Apply Floyd-Steinberg error diffusion to an RGB image
///
/// Errors are kept as i16 (range -255 to +255). Memory: 2 * width * 6 bytes.
pub fn dither_rgb(img: &RgbImage, palette: &Palette) -> IndexedImage {
    let (width, height) = img.dimensions();
    let width_usize = width as usize;
    let height_usize = height as usize;

    tracing::info!(
        "Applying Floyd-Steinberg dithering ({}x{}, {} colours)",
        width,
        height,
        palette.len()
    );

    let mut curr_row: Vec<(i16, i16, i16)> = vec![(0, 0, 0); width_usize];
    let mut next_row: Vec<(i16, i16, i16)> = vec![(0, 0, 0); width_usize];

    let mut indices = vec![0u8; width_usize * height_usize];

    for y in 0..height_usize {
        // Load current row pixels and add accumulated error from previous row
        for x in 0..width_usize {
            let p = img.get_pixel(x as u32, y as u32);
            curr_row[x].0 += p[0] as i16;
            curr_row[x].1 += p[1] as i16;
            curr_row[x].2 += p[2] as i16;
        }

        for x in 0..width_usize {
            let (r, g, b) = curr_row[x];

            let r = r.clamp(0, 255);
            let g = g.clamp(0, 255);
            let b = b.clamp(0, 255);

            let index = palette.nearest(r, g, b);
            let [pr, pg, pb] = palette.get(index).unwrap_or([255, 255, 255]);

            let err_r = r - pr as i16;
            let err_g = g - pg as i16;
            let err_b = b - pb as i16;

            // Right: 7/16
            if x + 1 < width_usize {
                curr_row[x + 1].0 += err_r * 7 / 16;
                curr_row[x + 1].1 += err_g * 7 / 16;
                curr_row[x + 1].2 += err_b * 7 / 16;
            }

            if y + 1 < height_usize {
                // Bottom-left: 3/16
                if x > 0 {
                    next_row[x - 1].0 += err_r * 3 / 16;
                    next_row[x - 1].1 += err_g * 3 / 16;
                    next_row[x - 1].2 += err_b * 3 / 16;
                }

                // Bottom: 5/16
                next_row[x].0 += err_r * 5 / 16;
                next_row[x].1 += err_g * 5 / 16;
                next_row[x].2 += err_b * 5 / 16;

                // Bottom-right: 1/16
                if x + 1 < width_usize {
                    next_row[x + 1].0 += err_r / 16;
                    next_row[x + 1].1 += err_g / 16;
                    next_row[x + 1].2 += err_b / 16;
                }
            }

            indices[y * width_usize + x] = index;
        }

        std::mem::swap(&mut curr_row, &mut next_row);
        next_row.iter_mut().for_each(|p| *p = (0, 0, 0));
    }

    IndexedImage::from_indices(width, height, indices, palette.clone())
        .unwrap_or_else(|| IndexedImage::filled(width, height, palette.white_index(), palette.clone()))
}
