/*
 *  display/drivers/mock.rs
 *
 *  LySpec - worth the squeeze
 *  (c) 2020-26 Stuart Hunter
 *
 *  In-memory panel for headless runs and tests
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

use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::display::error::DisplayError;
use crate::display::framebuffer::{for_each_packed_pixel, Frame};
use crate::display::traits::{DisplayCapabilities, DisplayDriver};

/// Panel without hardware.
///
/// Every presented frame lands in shared state, so a clone of [`MockDriver::state`]
/// taken before the driver is handed to the render loop can inspect it later.
#[derive(Debug, Clone)]
pub struct MockDriver {
    capabilities: DisplayCapabilities,
    state: Arc<Mutex<MockDriverState>>,
}

/// Internal state for the mock driver (shared for inspection in tests)
#[derive(Debug)]
pub struct MockDriverState {
    /// Number of times init() was called
    pub init_count: usize,

    /// Frames presented through write_buffer()
    pub flush_count: usize,

    /// Number of times clear() was called
    pub clear_count: usize,

    /// Total bytes written via write_buffer
    pub bytes_written: usize,

    /// What the panel currently shows
    pub panel: Frame,

    /// Simulate failures (for error testing)
    pub simulate_flush_failure: bool,
    pub simulate_init_failure: bool,
}

impl MockDriver {
    pub fn new_with_size(width: u32, height: u32) -> Self {
        let capabilities = DisplayCapabilities { width, height, max_fps: 60 };
        let state = MockDriverState {
            init_count: 0,
            flush_count: 0,
            clear_count: 0,
            bytes_written: 0,
            panel: Frame::new(width, height),
            simulate_flush_failure: false,
            simulate_init_failure: false,
        };
        Self { capabilities, state: Arc::new(Mutex::new(state)) }
    }

    /// Get reference to state for inspection in tests
    pub fn state(&self) -> Arc<Mutex<MockDriverState>> {
        Arc::clone(&self.state)
    }

    fn lock(&self) -> Result<MutexGuard<'_, MockDriverState>, DisplayError> {
        self.state
            .lock()
            .map_err(|_| DisplayError::Other("mock panel state poisoned".to_string()))
    }
}

impl DisplayDriver for MockDriver {
    fn capabilities(&self) -> &DisplayCapabilities {
        &self.capabilities
    }

    fn init(&mut self) -> Result<(), DisplayError> {
        let mut state = self.lock()?;
        if state.simulate_init_failure {
            return Err(DisplayError::InitializationFailed("Simulated init failure".to_string()));
        }
        state.init_count += 1;
        Ok(())
    }

    fn write_buffer(&mut self, buffer: &[u8]) -> Result<(), DisplayError> {
        let expected = self.buffer_len();
        if buffer.len() != expected {
            return Err(DisplayError::BufferSizeMismatch { expected, actual: buffer.len() });
        }

        let (w, h) = self.dimensions();
        let mut state = self.lock()?;
        if state.simulate_flush_failure {
            return Err(DisplayError::Other("Simulated flush failure".to_string()));
        }

        let mut panel = Frame::new(w, h);
        for_each_packed_pixel(buffer, w, h, |x, y, on| {
            if on {
                let _ = Pixel(Point::new(x as i32, y as i32), BinaryColor::On).draw(&mut panel);
            }
        });
        state.panel = panel;
        state.bytes_written += buffer.len();
        state.flush_count += 1;
        Ok(())
    }

    fn clear(&mut self) -> Result<(), DisplayError> {
        let (w, h) = self.dimensions();
        let mut state = self.lock()?;
        state.panel = Frame::new(w, h);
        state.clear_count += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_driver_creation() {
        let driver = MockDriver::new_with_size(128, 64);
        assert_eq!(driver.dimensions(), (128, 64));
        assert_eq!(driver.buffer_len(), 1024);
        assert_eq!(driver.state().lock().unwrap().panel.count_on(), 0);
    }

    #[test]
    fn test_mock_driver_init() {
        let mut driver = MockDriver::new_with_size(128, 64);
        let state = driver.state();
        driver.init().unwrap();
        assert_eq!(state.lock().unwrap().init_count, 1);

        state.lock().unwrap().simulate_init_failure = true;
        assert!(driver.init().is_err());
    }

    #[test]
    fn test_mock_driver_write_buffer() {
        let mut driver = MockDriver::new_with_size(128, 64);
        driver.write_buffer(&vec![0xFF; 1024]).unwrap();

        let state = driver.state();
        let state = state.lock().unwrap();
        assert_eq!(state.panel.count_on(), 128 * 64);
        assert_eq!(state.bytes_written, 1024);
        assert_eq!(state.flush_count, 1);
    }

    #[test]
    fn test_mock_driver_clear() {
        let mut driver = MockDriver::new_with_size(128, 64);
        driver.write_buffer(&vec![0xFF; 1024]).unwrap();
        driver.clear().unwrap();

        let state = driver.state();
        let state = state.lock().unwrap();
        assert_eq!(state.panel.count_on(), 0);
        assert_eq!(state.clear_count, 1);
    }

    #[test]
    fn test_mock_driver_buffer_size_mismatch() {
        let mut driver = MockDriver::new_with_size(128, 64);
        let err = driver.write_buffer(&vec![0xFF; 512]).unwrap_err();
        assert!(matches!(err, DisplayError::BufferSizeMismatch { expected: 1024, actual: 512 }));
    }

    #[test]
    fn test_mock_driver_simulated_failure() {
        let mut driver = MockDriver::new_with_size(128, 64);
        driver.state().lock().unwrap().simulate_flush_failure = true;
        assert!(driver.write_buffer(&vec![0; 1024]).is_err());

        driver.state().lock().unwrap().simulate_flush_failure = false;
        assert!(driver.write_buffer(&vec![0; 1024]).is_ok());
    }
}
