/*
 *  display/drivers/ssd1306.rs
 *
 *  LySpec - worth the squeeze
 *  (c) 2020-26 Stuart Hunter
 *
 *  SSD1306 128x64 I2C panel
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

use linux_embedded_hal::I2cdev;
use ssd1306::{
    mode::BufferedGraphicsMode,
    prelude::*,
    size::DisplaySize128x64,
    I2CDisplayInterface,
    Ssd1306,
};

use crate::display::error::DisplayError;
use crate::display::framebuffer::for_each_packed_pixel;
use crate::display::traits::{DisplayCapabilities, DisplayDriver};

use log::{debug, info};

type Panel = Ssd1306<I2CInterface<I2cdev>, DisplaySize128x64, BufferedGraphicsMode<DisplaySize128x64>>;

/// SSD1306 display driver wrapper
pub struct Ssd1306Driver {
    display: Panel,
    capabilities: DisplayCapabilities,
}

impl Ssd1306Driver {
    /// Open `i2c_bus_path` and talk to the controller at `address` (0x3C or 0x3D).
    ///
    /// The controller is not touched until [`DisplayDriver::init`].
    pub fn new_i2c(i2c_bus_path: &str, address: u8) -> Result<Self, DisplayError> {
        info!("Opening SSD1306 on {} at address 0x{:02X}", i2c_bus_path, address);

        let i2c = I2cdev::new(i2c_bus_path)
            .map_err(|e| DisplayError::I2cError(format!("Failed to open {}: {}", i2c_bus_path, e)))?;

        let interface = I2CDisplayInterface::new_custom_address(i2c, address);
        let display = Ssd1306::new(interface, DisplaySize128x64, DisplayRotation::Rotate0)
            .into_buffered_graphics_mode();

        let capabilities = DisplayCapabilities {
            width: 128,
            height: 64,
            max_fps: 20, // full 1K frame over 400kHz I2C
        };

        Ok(Self { display, capabilities })
    }
}

impl DisplayDriver for Ssd1306Driver {
    fn capabilities(&self) -> &DisplayCapabilities {
        &self.capabilities
    }

    fn init(&mut self) -> Result<(), DisplayError> {
        self.display
            .init()
            .map_err(|e| DisplayError::InitializationFailed(format!("{:?}", e)))?;
        self.clear()?;
        info!("SSD1306 initialized successfully (128x64)");
        Ok(())
    }

    fn write_buffer(&mut self, buffer: &[u8]) -> Result<(), DisplayError> {
        let expected = self.buffer_len();
        if buffer.len() != expected {
            return Err(DisplayError::BufferSizeMismatch { expected, actual: buffer.len() });
        }

        let (w, h) = self.dimensions();
        let display = &mut self.display;
        display.clear_buffer();
        for_each_packed_pixel(buffer, w, h, |x, y, on| {
            if on {
                display.set_pixel(x, y, true);
            }
        });
        display.flush()?;
        Ok(())
    }

    fn clear(&mut self) -> Result<(), DisplayError> {
        debug!("SSD1306 clear");
        self.display.clear_buffer();
        self.display.flush()?;
        Ok(())
    }
}
