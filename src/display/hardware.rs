//! Provider backed by the real Inky board.

use super::panel::SpiPanel;
use super::{eeprom, DetectionError, Display, DisplayError, DisplayProvider, PanelInfo};

#[derive(Debug, Default)]
pub struct HardwareProvider;

impl HardwareProvider {
    pub fn new() -> Self {
        Self
    }
}

impl DisplayProvider for HardwareProvider {
    fn detect(&self) -> Result<Option<PanelInfo>, DetectionError> {
        match eeprom::read_record() {
            Some(record) => eeprom::parse_record(&record),
            None => Ok(None),
        }
    }

    fn open(&self, panel: &PanelInfo) -> Result<Box<dyn Display>, DisplayError> {
        let panel = SpiPanel::open(panel.display_type)?;
        Ok(Box::new(panel))
    }
}
