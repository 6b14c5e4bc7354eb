//! Palette-indexed raster, the output of dithering and the input of the
//! display drivers.

use super::palette::Palette;
use image::{Rgb, RgbImage};

/// An image stored as palette indices with its own palette
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedImage {
    width: u32,
    height: u32,
    indices: Vec<u8>,
    palette: Palette,
}

impl IndexedImage {
    /// Canvas filled with a single palette index
    pub fn filled(width: u32, height: u32, index: u8, palette: Palette) -> Self {
        Self {
            width,
            height,
            indices: vec![index; width as usize * height as usize],
            palette,
        }
    }

    pub fn from_indices(width: u32, height: u32, indices: Vec<u8>, palette: Palette) -> Option<Self> {
        if indices.len() != width as usize * height as usize {
            return None;
        }
        Some(Self {
            width,
            height,
            indices,
            palette,
        })
    }

    /// Index an RGB image whose pixels all match a palette entry exactly
    ///
    /// Returns `None` as soon as one pixel has no exact match.
    pub fn from_exact_colours(image: &RgbImage, palette: &Palette) -> Option<Self> {
        let mut indices = Vec::with_capacity(image.width() as usize * image.height() as usize);
        for pixel in image.pixels() {
            indices.push(palette.index_of(pixel.0)?);
        }
        Some(Self {
            width: image.width(),
            height: image.height(),
            indices,
            palette: palette.clone(),
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    /// Row-major palette indices
    pub fn indices(&self) -> &[u8] {
        &self.indices
    }

    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.indices[y as usize * self.width as usize + x as usize]
    }

    pub fn set(&mut self, x: u32, y: u32, index: u8) {
        let width = self.width as usize;
        self.indices[y as usize * width + x as usize] = index;
    }

    /// Fill a rectangle, clipped to the canvas
    pub fn fill_rect(&mut self, x: u32, y: u32, width: u32, height: u32, index: u8) {
        let x_end = x.saturating_add(width).min(self.width);
        let y_end = y.saturating_add(height).min(self.height);
        for row in y..y_end {
            for col in x..x_end {
                self.set(col, row, index);
            }
        }
    }

    /// Copy a region into a new image sharing this palette
    pub fn sub_image(&self, x: u32, y: u32, width: u32, height: u32) -> IndexedImage {
        let mut indices = Vec::with_capacity(width as usize * height as usize);
        for row in y..y + height {
            let start = row as usize * self.width as usize + x as usize;
            indices.extend_from_slice(&self.indices[start..start + width as usize]);
        }
        IndexedImage {
            width,
            height,
            indices,
            palette: self.palette.clone(),
        }
    }

    /// Paste another image at an offset, clipped to the canvas
    pub fn paste(&mut self, source: &IndexedImage, x: u32, y: u32) {
        for row in 0..source.height {
            let dst_y = y + row;
            if dst_y >= self.height {
                break;
            }
            for col in 0..source.width {
                let dst_x = x + col;
                if dst_x >= self.width {
                    break;
                }
                self.set(dst_x, dst_y, source.get(col, row));
            }
        }
    }

    /// Expand to RGB using the palette
    pub fn to_rgb(&self) -> RgbImage {
        RgbImage::from_fn(self.width, self.height, |x, y| {
            Rgb(self.palette.get(self.get(x, y)).unwrap_or([255, 255, 255]))
        })
    }
}
