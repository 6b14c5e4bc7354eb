//! SPI communication wrapper for e-paper panels.
//!
//! Uses SPI0 with CE0 (Chip Enable 0). Inky panels accept up to 3 MHz.

use super::gpio::GpioController;
use rppal::spi::{Bus, Mode, SlaveSelect, Spi};
use thiserror::Error;

/// SPI clock speed in Hz
pub const CLOCK_SPEED: u32 = 3_000_000;

/// Transfer chunk size, spidev rejects larger writes by default
const CHUNK_SIZE: usize = 4096;

/// SPI-related errors
#[derive(Error, Debug)]
pub enum SpiError {
    #[error("SPI initialization failed: {0}")]
    InitError(#[from] rppal::spi::Error),

    #[error("SPI write failed: {0}")]
    WriteError(String),
}

/// SPI panel interface
pub struct SpiDisplay {
    spi: Spi,
}

impl SpiDisplay {
    /// Open SPI0, CE0, Mode 0 (CPOL=0, CPHA=0)
    pub fn new() -> Result<Self, SpiError> {
        let spi = Spi::new(Bus::Spi0, SlaveSelect::Ss0, CLOCK_SPEED, Mode::Mode0)?;

        tracing::debug!(
            "SPI initialized: Bus=SPI0, SS=CE0, Speed={}Hz, Mode=0",
            CLOCK_SPEED
        );

        Ok(Self { spi })
    }

    /// Send a command byte (DC low)
    pub fn write_command(&mut self, gpio: &mut GpioController, cmd: u8) -> Result<(), SpiError> {
        gpio.dc_low();
        self.spi
            .write(&[cmd])
            .map_err(|e| SpiError::WriteError(e.to_string()))?;
        Ok(())
    }

    /// Send data bytes (DC high), chunked for bulk transfers
    pub fn write_data(&mut self, gpio: &mut GpioController, data: &[u8]) -> Result<(), SpiError> {
        gpio.dc_high();

        for chunk in data.chunks(CHUNK_SIZE) {
            self.spi
                .write(chunk)
                .map_err(|e| SpiError::WriteError(e.to_string()))?;
        }

        Ok(())
    }

    /// Send command followed by data bytes
    pub fn write_command_data(
        &mut self,
        gpio: &mut GpioController,
        cmd: u8,
        data: &[u8],
    ) -> Result<(), SpiError> {
        self.write_command(gpio, cmd)?;
        if !data.is_empty() {
            self.write_data(gpio, data)?;
        }
        Ok(())
    }
}
