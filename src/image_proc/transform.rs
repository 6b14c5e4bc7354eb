//! Fitting a palette image onto the display.
//!
//! Oversized axes are centre-cropped, undersized axes are centred on a white
//! canvas. No scaling is applied.

use super::indexed::IndexedImage;

/// Centre-crop the width down to the target width
pub fn crop_image_width(image: &IndexedImage, target: (u32, u32)) -> IndexedImage {
    let target_width = target.0.min(image.width());
    let left_crop = (image.width() - target_width) / 2;
    image.sub_image(left_crop, 0, target_width, image.height())
}

/// Centre-crop the height down to the target height
pub fn crop_image_height(image: &IndexedImage, target: (u32, u32)) -> IndexedImage {
    let target_height = target.1.min(image.height());
    let top_crop = (image.height() - target_height) / 2;
    image.sub_image(0, top_crop, image.width(), target_height)
}

/// Centre the image on a canvas of the target size filled with white
///
/// The source palette is kept. Axes already larger than the target are left to
/// the crop functions and are clipped here.
pub fn pad_image(target: (u32, u32), image: &IndexedImage) -> IndexedImage {
    let (target_width, target_height) = target;
    let pad_left = target_width.saturating_sub(image.width()) / 2;
    let pad_top = target_height.saturating_sub(image.height()) / 2;

    let white = image.palette().white_index();
    let mut canvas = IndexedImage::filled(target_width, target_height, white, image.palette().clone());
    canvas.paste(image, pad_left, pad_top);
    canvas
}

/// Crop and pad so the result is exactly the target resolution
pub fn fit_to_resolution(image: IndexedImage, target: (u32, u32)) -> IndexedImage {
    let mut image = image;

    if image.width() > target.0 {
        tracing::info!(
            "Image is wider than display width ({} > {}), cropping image",
            image.width(),
            target.0
        );
        image = crop_image_width(&image, target);
    }

    if image.height() > target.1 {
        tracing::info!(
            "Image is higher than display height ({} > {}), cropping image",
            image.height(),
            target.1
        );
        image = crop_image_height(&image, target);
    }

    if image.width() < target.0 || image.height() < target.1 {
        tracing::info!(
            "Image is below target resolution ({}x{}), padding image",
            image.width(),
            image.height()
        );
        image = pad_image(target, &image);
    }

    image
}
