//! Colour palettes for each supported display.
//!
//! Index order matters: quantization maps a pixel to an index in this order
//! and the panel drivers map the same index to their controller colour codes.
//! Index 0 is always white and index 1 always black.

use crate::models::{ColourPalette, DisplayType};

pub type Rgb = [u8; 3];

pub const WHITE: Rgb = [255, 255, 255];
pub const BLACK: Rgb = [0, 0, 0];
pub const RED: Rgb = [255, 0, 0];
pub const YELLOW: Rgb = [255, 255, 0];

/// Blend factor between the saturated and desaturated reference tables
pub const DEFAULT_SATURATION: f32 = 0.5;

/// 7-colour panels: white, black, green, blue, red, yellow, orange
const SEVEN_COLOUR_SATURATED: [Rgb; 7] = [
    [255, 255, 255],
    [0, 0, 0],
    [58, 91, 70],
    [61, 59, 94],
    [156, 72, 75],
    [208, 190, 71],
    [177, 106, 73],
];

const SEVEN_COLOUR_DESATURATED: [Rgb; 7] = [
    [255, 255, 255],
    [0, 0, 0],
    [0, 255, 0],
    [0, 0, 255],
    [255, 0, 0],
    [255, 255, 0],
    [255, 140, 0],
];

/// Spectra 6 panels: white, black, yellow, red, blue, green
const SPECTRA_SATURATED: [Rgb; 6] = [
    [255, 255, 255],
    [0, 0, 0],
    [208, 178, 46],
    [160, 32, 32],
    [29, 66, 113],
    [58, 91, 70],
];

const SPECTRA_DESATURATED: [Rgb; 6] = [
    [255, 255, 255],
    [0, 0, 0],
    [255, 255, 0],
    [255, 0, 0],
    [0, 0, 255],
    [0, 255, 0],
];

/// Ordered set of colours a display can render
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    colours: Vec<Rgb>,
}

impl Palette {
    pub fn new(colours: Vec<Rgb>) -> Self {
        Self { colours }
    }

    pub fn colours(&self) -> &[Rgb] {
        &self.colours
    }

    pub fn len(&self) -> usize {
        self.colours.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colours.is_empty()
    }

    pub fn get(&self, index: u8) -> Option<Rgb> {
        self.colours.get(index as usize).copied()
    }

    /// First index holding pure white, 0 if there is none
    pub fn white_index(&self) -> u8 {
        self.index_of(WHITE).unwrap_or(0)
    }

    /// First index holding exactly this colour
    pub fn index_of(&self, colour: Rgb) -> Option<u8> {
        self.colours
            .iter()
            .position(|c| *c == colour)
            .map(|i| i as u8)
    }

    /// Closest palette entry by euclidean distance in RGB space
    #[inline]
    pub fn nearest(&self, r: i16, g: i16, b: i16) -> u8 {
        self.colours
            .iter()
            .enumerate()
            .min_by_key(|(_, [pr, pg, pb])| {
                let dr = (r - *pr as i16) as i32;
                let dg = (g - *pg as i16) as i32;
                let db = (b - *pb as i16) as i32;
                dr * dr + dg * dg + db * db
            })
            .map(|(i, _)| i as u8)
            .unwrap_or(0)
    }
}

/// Build the palette for a display
pub fn construct_palette(display_type: DisplayType, palette_source: ColourPalette) -> Palette {
    match display_type {
        DisplayType::Phat104 | DisplayType::Phat122 => construct_phat_palette(palette_source),
        DisplayType::Impression400 | DisplayType::Impression448 | DisplayType::Impression480 => {
            construct_seven_colour_palette(DEFAULT_SATURATION)
        }
        DisplayType::Spectra480 | DisplayType::Spectra1200 => {
            construct_spectra_palette(DEFAULT_SATURATION)
        }
    }
}

/// White and black, plus the accent of a three colour pHAT
pub fn construct_phat_palette(palette_source: ColourPalette) -> Palette {
    let mut colours = vec![WHITE, BLACK];
    match palette_source {
        ColourPalette::Red => colours.push(RED),
        ColourPalette::Yellow => colours.push(YELLOW),
        _ => {}
    }
    Palette::new(colours)
}

/// 7-colour panels, with the trailing white the controller expects
pub fn construct_seven_colour_palette(saturation: f32) -> Palette {
    let mut colours = blend(&SEVEN_COLOUR_SATURATED, &SEVEN_COLOUR_DESATURATED, saturation);
    colours.push(WHITE);
    Palette::new(colours)
}

pub fn construct_spectra_palette(saturation: f32) -> Palette {
    Palette::new(blend(&SPECTRA_SATURATED, &SPECTRA_DESATURATED, saturation))
}

// Truncates toward zero to reproduce the panel calibration tables.
fn blend(saturated: &[Rgb], desaturated: &[Rgb], saturation: f32) -> Vec<Rgb> {
    saturated
        .iter()
        .zip(desaturated)
        .map(|(s, d)| {
            let mut out = [0u8; 3];
            for channel in 0..3 {
                let value =
                    s[channel] as f32 * saturation + d[channel] as f32 * (1.0 - saturation);
                out[channel] = value as u8;
            }
            out
        })
        .collect()
}
