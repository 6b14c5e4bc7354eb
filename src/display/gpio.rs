//! GPIO lines used by Inky e-paper panels.
//!
//! - RST (Reset): GPIO 27
//! - DC (Data/Command): GPIO 22
//! - BUSY: GPIO 17
//!
//! The pins are handed back to the kernel when the controller is dropped, so
//! the next worker can claim them.

use rppal::gpio::{Gpio, InputPin, Level, OutputPin};
use std::thread;
use std::time::Duration;
use thiserror::Error;

/// GPIO pin assignments (BCM numbering)
pub mod pins {
    pub const RST: u8 = 27;
    pub const DC: u8 = 22;
    pub const BUSY: u8 = 17;
}

/// GPIO-related errors
#[derive(Error, Debug)]
pub enum GpioError {
    #[error("GPIO initialization failed: {0}")]
    InitError(#[from] rppal::gpio::Error),

    #[error("Busy timeout: display did not respond within {0}ms")]
    BusyTimeout(u64),
}

/// GPIO controller for an e-paper panel
pub struct GpioController {
    rst: OutputPin,
    dc: OutputPin,
    busy: InputPin,
}

impl GpioController {
    /// Claim and initialize the control pins
    pub fn new() -> Result<Self, GpioError> {
        let gpio = Gpio::new()?;

        let mut rst = gpio.get(pins::RST)?.into_output();
        let mut dc = gpio.get(pins::DC)?.into_output();
        let busy = gpio.get(pins::BUSY)?.into_input();

        rst.set_high();
        dc.set_low();

        tracing::debug!(
            "GPIO initialized: RST={}, DC={}, BUSY={}",
            pins::RST,
            pins::DC,
            pins::BUSY
        );

        Ok(Self { rst, dc, busy })
    }

    /// Perform hardware reset sequence
    pub fn reset(&mut self) {
        tracing::debug!("Performing hardware reset");

        self.rst.set_low();
        thread::sleep(Duration::from_millis(100));

        self.rst.set_high();
        thread::sleep(Duration::from_millis(100));
    }

    /// Wait for display to become ready (BUSY pin goes high)
    ///
    /// The panel signals busy state by pulling the BUSY pin LOW.
    pub fn wait_busy(&self, timeout: Duration) -> Result<(), GpioError> {
        let start = std::time::Instant::now();
        let poll_interval = Duration::from_millis(10);

        while self.busy.read() == Level::Low {
            if start.elapsed() > timeout {
                return Err(GpioError::BusyTimeout(timeout.as_millis() as u64));
            }
            thread::sleep(poll_interval);
        }

        let elapsed = start.elapsed();
        if elapsed.as_millis() > 100 {
            tracing::debug!("BUSY wait completed after {:?}", elapsed);
        }

        Ok(())
    }

    /// Set DC pin low (command mode)
    #[inline]
    pub fn dc_low(&mut self) {
        self.dc.set_low();
    }

    /// Set DC pin high (data mode)
    #[inline]
    pub fn dc_high(&mut self) {
        self.dc.set_high();
    }
}

impl Drop for GpioController {
    fn drop(&mut self) {
        tracing::debug!("GPIO controller dropped, pins released");
    }
}
