//! Driver for the 4-bit colour Inky panels.
//!
//! Two controllers share the same wiring and pixel packing (2 pixels per
//! byte) but differ in their init sequence:
//! - UC8159: Impression 4" (640x400) and 5.7" (600x448), 7 colours
//! - E673: Impression 7.3" 2025 edition (800x480), Spectra 6
//!
//! Based on the Pimoroni inky drivers and the Waveshare EPD7IN3E sequence.

use super::gpio::GpioController;
use super::spi::SpiDisplay;
use super::{Display, DisplayError};
use crate::image_proc::IndexedImage;
use crate::models::{ColourPalette, DisplayType};
use std::thread;
use std::time::Duration;

/// UC8159 commands
#[allow(dead_code)]
mod uc8159 {
    pub const PSR: u8 = 0x00;
    pub const PWR: u8 = 0x01;
    pub const POF: u8 = 0x02;
    pub const PFS: u8 = 0x03;
    pub const PON: u8 = 0x04;
    pub const DSLP: u8 = 0x07;
    pub const DTM1: u8 = 0x10;
    pub const DRF: u8 = 0x12;
    pub const PLL: u8 = 0x30;
    pub const TSE: u8 = 0x41;
    pub const CDI: u8 = 0x50;
    pub const TCON: u8 = 0x60;
    pub const TRES: u8 = 0x61;
    pub const DAM: u8 = 0x65;
    pub const PWS: u8 = 0xE3;
}

/// E673 commands
#[allow(dead_code)]
mod e673 {
    pub const CMDH: u8 = 0xAA;
    pub const PANEL_SETTING: u8 = 0x00;
    pub const POWER_SETTING: u8 = 0x01;
    pub const POWER_OFF: u8 = 0x02;
    pub const INPUT_DATA: u8 = 0x03;
    pub const POWER_ON: u8 = 0x04;
    pub const BOOSTER_SOFT_START1: u8 = 0x05;
    pub const BOOSTER_SOFT_START2: u8 = 0x06;
    pub const DEEP_SLEEP: u8 = 0x07;
    pub const BOOSTER_SOFT_START3: u8 = 0x08;
    pub const DATA_START: u8 = 0x10;
    pub const DISPLAY_REFRESH: u8 = 0x12;
    pub const PLL_CONTROL: u8 = 0x30;
    pub const VCOM_DATA_INTERVAL: u8 = 0x50;
    pub const TCON_SETTING: u8 = 0x60;
    pub const RESOLUTION_SETTING: u8 = 0x61;
    pub const UNKNOWN_84: u8 = 0x84;
    pub const POWER_SAVING: u8 = 0xE3;
}

/// Controller colour code for each palette index
///
/// Palette order: white, black, green, blue, red, yellow, orange, white.
const UC8159_CODES: [u8; 8] = [1, 0, 2, 3, 4, 5, 6, 1];

/// Palette order: white, black, yellow, red, blue, green.
const E673_CODES: [u8; 6] = [1, 0, 2, 3, 5, 6];

const WHITE_CODE: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Controller {
    Uc8159,
    E673,
}

impl Controller {
    /// Controller driving a display type, if there is a driver for it
    pub fn for_display(display_type: DisplayType) -> Option<Self> {
        match display_type {
            DisplayType::Impression400 | DisplayType::Impression448 => Some(Controller::Uc8159),
            DisplayType::Spectra480 => Some(Controller::E673),
            _ => None,
        }
    }

    fn colour_codes(&self) -> &'static [u8] {
        match self {
            Controller::Uc8159 => &UC8159_CODES,
            Controller::E673 => &E673_CODES,
        }
    }

    fn refresh_timeout(&self) -> Duration {
        match self {
            Controller::Uc8159 => Duration::from_secs(32),
            Controller::E673 => Duration::from_secs(45),
        }
    }
}

/// Pack palette indices into controller codes, 2 pixels per byte
pub fn pack_frame(image: &IndexedImage, controller: Controller) -> Vec<u8> {
    let codes = controller.colour_codes();
    let code = |index: u8| codes.get(index as usize).copied().unwrap_or(WHITE_CODE);

    image
        .indices()
        .chunks(2)
        .map(|pair| {
            let high = code(pair[0]);
            let low = pair.get(1).map(|i| code(*i)).unwrap_or(WHITE_CODE);
            (high << 4) | low
        })
        .collect()
}

/// A 4-bit SPI panel
pub struct SpiPanel {
    gpio: GpioController,
    spi: SpiDisplay,
    controller: Controller,
    display_type: DisplayType,
    border: u8,
    buffer: Option<Vec<u8>>,
    initialized: bool,
}

impl SpiPanel {
    /// Claim GPIO and SPI for a display type
    pub fn open(display_type: DisplayType) -> Result<Self, DisplayError> {
        let controller =
            Controller::for_display(display_type).ok_or(DisplayError::NoDriver(display_type))?;

        let gpio = GpioController::new()?;
        let spi = SpiDisplay::new()?;

        tracing::info!(
            "Opened {} panel ({:?} controller)",
            display_type,
            controller
        );

        Ok(Self {
            gpio,
            spi,
            controller,
            display_type,
            border: WHITE_CODE,
            buffer: None,
            initialized: false,
        })
    }

    fn init(&mut self) -> Result<(), DisplayError> {
        let (width, height) = self.display_type.resolution();
        tracing::info!("Initializing {} display ({}x{})", self.display_type, width, height);

        self.gpio.reset();
        self.gpio.wait_busy(Duration::from_secs(1))?;

        match self.controller {
            Controller::Uc8159 => self.init_uc8159(width, height)?,
            Controller::E673 => self.init_e673()?,
        }

        self.initialized = true;
        Ok(())
    }

    fn init_uc8159(&mut self, width: u32, height: u32) -> Result<(), DisplayError> {
        let resolution_setting: u8 = if (width, height) == (640, 400) { 0b10 } else { 0b11 };

        self.send_command_data(
            uc8159::TRES,
            &[(width >> 8) as u8, width as u8, (height >> 8) as u8, height as u8],
        )?;
        self.send_command_data(uc8159::PSR, &[(resolution_setting << 6) | 0b10_1111, 0x08])?;
        self.send_command_data(uc8159::PWR, &[0x37, 0x00, 0x23, 0x23])?;
        self.send_command_data(uc8159::PLL, &[0x3C])?;
        self.send_command_data(uc8159::TSE, &[0x00])?;
        // border colour lives in the top bits of CDI
        self.send_command_data(uc8159::CDI, &[(self.border << 5) | 0x17])?;
        self.send_command_data(uc8159::TCON, &[0x22])?;
        self.send_command_data(uc8159::DAM, &[0x00])?;
        self.send_command_data(uc8159::PWS, &[0xAA])?;
        self.send_command_data(uc8159::PFS, &[0x00])?;
        Ok(())
    }

    fn init_e673(&mut self) -> Result<(), DisplayError> {
        thread::sleep(Duration::from_millis(30));

        self.send_command_data(e673::CMDH, &[0x49, 0x55, 0x20, 0x08, 0x09, 0x18])?;
        self.send_command_data(e673::POWER_SETTING, &[0x3F])?;
        self.send_command_data(e673::PANEL_SETTING, &[0x5F, 0x69])?;
        self.send_command_data(e673::INPUT_DATA, &[0x00, 0x54, 0x00, 0x44])?;
        self.send_command_data(e673::BOOSTER_SOFT_START1, &[0x40, 0x1F, 0x1F, 0x2C])?;
        self.send_command_data(e673::BOOSTER_SOFT_START2, &[0x6F, 0x1F, 0x17, 0x49])?;
        self.send_command_data(e673::BOOSTER_SOFT_START3, &[0x6F, 0x1F, 0x1F, 0x22])?;
        self.send_command_data(e673::PLL_CONTROL, &[0x03])?;
        self.send_command_data(e673::VCOM_DATA_INTERVAL, &[0x3F])?;
        self.send_command_data(e673::TCON_SETTING, &[0x02, 0x00])?;
        // 800 x 480 = 0x0320 x 0x01E0
        self.send_command_data(e673::RESOLUTION_SETTING, &[0x03, 0x20, 0x01, 0xE0])?;
        self.send_command_data(e673::UNKNOWN_84, &[0x01])?;
        self.send_command_data(e673::POWER_SAVING, &[0x2F])?;

        self.send_command(e673::POWER_ON)?;
        self.gpio.wait_busy(Duration::from_secs(5))?;
        Ok(())
    }

    /// Push the buffer and run the refresh cycle
    fn refresh(&mut self, buffer: &[u8]) -> Result<(), DisplayError> {
        let timeout = self.controller.refresh_timeout();
        match self.controller {
            Controller::Uc8159 => {
                self.send_command_data(uc8159::DTM1, buffer)?;
                self.send_command(uc8159::PON)?;
                self.gpio.wait_busy(Duration::from_millis(200))?;
                self.send_command(uc8159::DRF)?;
                tracing::info!("Waiting for display refresh to complete...");
                self.gpio.wait_busy(timeout)?;
                self.send_command(uc8159::POF)?;
                self.gpio.wait_busy(Duration::from_millis(200))?;
            }
            Controller::E673 => {
                self.send_command_data(e673::DATA_START, buffer)?;
                self.send_command(e673::POWER_ON)?;
                self.gpio.wait_busy(Duration::from_secs(5))?;
                self.send_command_data(e673::DISPLAY_REFRESH, &[0x00])?;
                tracing::info!("Waiting for display refresh to complete...");
                self.gpio.wait_busy(timeout)?;
                self.send_command_data(e673::POWER_OFF, &[0x00])?;
                self.gpio.wait_busy(Duration::from_secs(5))?;
            }
        }
        Ok(())
    }

    /// Put the controller into deep sleep
    fn sleep(&mut self) -> Result<(), DisplayError> {
        tracing::info!("Putting display to sleep");
        match self.controller {
            Controller::Uc8159 => self.send_command_data(uc8159::DSLP, &[0xA5])?,
            Controller::E673 => self.send_command_data(e673::DEEP_SLEEP, &[0xA5])?,
        }
        self.initialized = false;
        Ok(())
    }

    fn send_command(&mut self, cmd: u8) -> Result<(), DisplayError> {
        self.spi.write_command(&mut self.gpio, cmd)?;
        Ok(())
    }

    fn send_command_data(&mut self, cmd: u8, data: &[u8]) -> Result<(), DisplayError> {
        self.spi.write_command_data(&mut self.gpio, cmd, data)?;
        Ok(())
    }
}

impl Display for SpiPanel {
    fn resolution(&self) -> (u32, u32) {
        self.display_type.resolution()
    }

    fn colour(&self) -> ColourPalette {
        self.display_type
            .native_palette()
            .unwrap_or(ColourPalette::Black)
    }

    fn set_border(&mut self, border: u8) {
        self.border = border & 0x07;
        // takes effect with the next init
        self.initialized = false;
    }

    fn set_image(&mut self, image: &IndexedImage) -> Result<(), DisplayError> {
        let expected = self.resolution();
        if image.dimensions() != expected {
            return Err(DisplayError::ResolutionMismatch {
                expected,
                actual: image.dimensions(),
            });
        }
        self.buffer = Some(pack_frame(image, self.controller));
        Ok(())
    }

    fn show(&mut self) -> Result<(), DisplayError> {
        let buffer = self.buffer.take().ok_or(DisplayError::NoImage)?;

        if !self.initialized {
            self.init()?;
        }

        tracing::info!("Sending image data to display ({} bytes)", buffer.len());
        let result = self.refresh(&buffer);
        self.buffer = Some(buffer);
        result
    }
}

impl Drop for SpiPanel {
    fn drop(&mut self) {
        if self.initialized {
            let _ = self.sleep();
        }
    }
}
