/*
 *  display/factory.rs
 *
 *  LySpec - worth the squeeze
 *  (c) 2020-26 Stuart Hunter
 *
 *  Pick the panel driver from command line options
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use crate::constants::{DISPLAY_HEIGHT, DISPLAY_WIDTH};
use crate::display::drivers::mock::MockDriver;
use crate::display::error::DisplayError;
use crate::display::traits::DisplayDriver;
use log::info;

#[cfg(feature = "driver-ssd1306")]
use crate::display::drivers::ssd1306::Ssd1306Driver;

/// Type alias for boxed display driver trait objects
pub type BoxedDriver = Box<dyn DisplayDriver>;

/// Where frames should go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelOptions {
    /// Render into memory only
    pub headless: bool,
    pub i2c_bus: String,
    pub i2c_address: u8,
}

impl Default for PanelOptions {
    fn default() -> Self {
        Self { headless: false, i2c_bus: "/dev/i2c-1".to_string(), i2c_address: 0x3C }
    }
}

/// Factory for creating display drivers from configuration
pub struct DisplayDriverFactory;

impl DisplayDriverFactory {
    /// Build the driver `options` ask for. The returned driver is not yet initialized.
    pub fn create(options: &PanelOptions) -> Result<BoxedDriver, DisplayError> {
        if options.headless {
            info!("Headless mode - rendering to memory ({}x{})", DISPLAY_WIDTH, DISPLAY_HEIGHT);
            return Ok(Box::new(MockDriver::new_with_size(DISPLAY_WIDTH, DISPLAY_HEIGHT)));
        }
        Self::create_hardware(options)
    }

    #[cfg(feature = "driver-ssd1306")]
    fn create_hardware(options: &PanelOptions) -> Result<BoxedDriver, DisplayError> {
        Ok(Box::new(Ssd1306Driver::new_i2c(&options.i2c_bus, options.i2c_address)?))
    }

    #[cfg(not(feature = "driver-ssd1306"))]
    fn create_hardware(_options: &PanelOptions) -> Result<BoxedDriver, DisplayError> {
        Err(DisplayError::InvalidConfiguration(
            "SSD1306 driver not enabled. Enable with --features driver-ssd1306 or run --headless"
                .to_string(),
        ))
    }
}
