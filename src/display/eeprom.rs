//! Inky ID EEPROM.
//!
//! Every Inky board carries a small I2C EEPROM describing the panel fitted
//! to it. Layout of the record (little endian):
//!
//! | offset | size | field           |
//! |--------|------|-----------------|
//! | 0      | 2    | width           |
//! | 2      | 2    | height          |
//! | 4      | 1    | colour          |
//! | 5      | 1    | pcb variant     |
//! | 6      | 1    | display variant |
//! | 7      | 22   | write time      |

use super::{DetectionError, PanelInfo};
use crate::models::{ColourPalette, DisplayType};
use rppal::i2c::I2c;

pub const I2C_BUS: u8 = 1;
pub const EEPROM_ADDRESS: u16 = 0x50;
pub const RECORD_LEN: usize = 29;

/// Read the ID record, `None` when no EEPROM answers
pub fn read_record() -> Option<[u8; RECORD_LEN]> {
    let result = (|| -> Result<[u8; RECORD_LEN], rppal::i2c::Error> {
        let mut i2c = I2c::with_bus(I2C_BUS)?;
        i2c.set_slave_address(EEPROM_ADDRESS)?;
        i2c.write(&[0x00, 0x00])?;
        let mut record = [0u8; RECORD_LEN];
        i2c.read(&mut record)?;
        Ok(record)
    })();

    match result {
        Ok(record) => Some(record),
        Err(e) => {
            tracing::debug!("No Inky EEPROM found: {}", e);
            None
        }
    }
}

/// Decode an ID record into a supported panel
pub fn parse_record(record: &[u8]) -> Result<Option<PanelInfo>, DetectionError> {
    if record.len() < 7 {
        tracing::warn!("Inky EEPROM record too short ({} bytes)", record.len());
        return Ok(None);
    }

    let width = u16::from_le_bytes([record[0], record[1]]);
    let height = u16::from_le_bytes([record[2], record[3]]);
    let colour = record[4];
    let variant = record[6];

    let display_type = match variant {
        1 | 4 | 5 => DisplayType::Phat104,
        10 | 11 | 12 => DisplayType::Phat122,
        14 => DisplayType::Impression448,
        15 | 16 => DisplayType::Impression400,
        20 => DisplayType::Impression480,
        21 => DisplayType::Spectra1200,
        22 => DisplayType::Spectra480,
        2 | 3 | 6 | 7 | 8 | 17 | 18 | 19 => {
            return Err(DetectionError::Unsupported(format!(
                "Inky wHAT ({width}x{height}) is not a supported display type"
            )));
        }
        0 => return Ok(None),
        other => {
            return Err(DetectionError::Unsupported(format!(
                "unknown display variant {other} ({width}x{height})"
            )));
        }
    };

    let colour_palette = match display_type.native_palette() {
        Some(palette) => palette,
        None => match colour {
            2 => ColourPalette::Red,
            3 => ColourPalette::Yellow,
            _ => ColourPalette::Black,
        },
    };

    if display_type.resolution() != (width as u32, height as u32) {
        tracing::debug!(
            "EEPROM reports {}x{} for {}, using catalogue resolution",
            width,
            height,
            display_type
        );
    }

    Ok(Some(PanelInfo {
        display_type,
        colour_palette,
    }))
}
