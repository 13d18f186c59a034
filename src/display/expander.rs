//! CH422G I/O expander driving the backlight and reset lines.
//!
//! - EXIO1: touch controller reset
//! - EXIO2: DISP (backlight enable)
//! - EXIO3: LCD reset

use rppal::i2c::I2c;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Output register of the expander
pub const REG_OUT: u8 = 0x02;

/// Output bits
pub mod exio {
    pub const TOUCH_RST: u8 = 1 << 0;
    pub const DISP: u8 = 1 << 1;
    pub const LCD_RST: u8 = 1 << 2;
}

/// Bus timeout in milliseconds
const BUS_TIMEOUT_MS: u32 = 1000;

/// Expander-related errors
#[derive(Error, Debug)]
pub enum ExpanderError {
    #[error("I2C error: {0}")]
    I2c(#[from] rppal::i2c::Error),

    #[error("Short write: {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },
}

/// Backlight wiring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacklightConfig {
    /// Drive the expander at all
    pub enabled: bool,
    /// I2C bus number
    pub bus: u8,
    /// 7-bit expander address
    pub address: u16,
}

impl Default for BacklightConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bus: 0,
            address: 0x24,
        }
    }
}

/// Output value that enables the backlight. The reset lines are held high
/// so neither controller sits in reset.
pub const fn backlight_on() -> u8 {
    exio::TOUCH_RST | exio::DISP | exio::LCD_RST
}

/// CH422G expander on an I2C bus
pub struct Ch422g {
    i2c: I2c,
}

impl Ch422g {
    /// Open the bus and address the expander
    pub fn new(config: &BacklightConfig) -> Result<Self, ExpanderError> {
        let mut i2c = I2c::with_bus(config.bus)?;
        i2c.set_slave_address(config.address)?;
        i2c.set_timeout(BUS_TIMEOUT_MS)?;

        tracing::debug!(
            "I2C master initialized (bus={}, addr={:#04x}, {} Hz)",
            config.bus,
            config.address,
            i2c.clock_speed().unwrap_or_default()
        );

        Ok(Self { i2c })
    }

    /// Write the output register
    pub fn write_outputs(&mut self, value: u8) -> Result<(), ExpanderError> {
        let buf = [REG_OUT, value];
        let written = self.i2c.write(&buf)?;
        if written != buf.len() {
            return Err(ExpanderError::ShortWrite {
                written,
                expected: buf.len(),
            });
        }
        Ok(())
    }

    pub fn enable_backlight(&mut self) -> Result<(), ExpanderError> {
        tracing::info!("Enabling backlight via CH422G EXIO2");
        self.write_outputs(backlight_on())?;
        tracing::info!("Backlight enabled");
        Ok(())
    }
}

/// Turn the backlight on if configured. The panel works without it, so
/// failures are only logged.
pub fn try_enable_backlight(config: &BacklightConfig) -> bool {
    if !config.enabled {
        tracing::debug!("Backlight control disabled");
        return false;
    }

    match Ch422g::new(config).and_then(|mut expander| expander.enable_backlight()) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("Failed to enable backlight ({}), display may be dark", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backlight_bits() {
        assert_eq!(backlight_on(), 0b111);
        assert_ne!(backlight_on() & exio::DISP, 0);
    }

    #[test]
    fn test_disabled_backlight_skips_bus() {
        let config = BacklightConfig {
            enabled: false,
            ..BacklightConfig::default()
        };
        assert!(!try_enable_backlight(&config));
    }
}
