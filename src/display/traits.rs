/*
 *  display/traits.rs
 *
 *  LySpec - worth the squeeze
 *  (c) 2020-26 Stuart Hunter
 *
 *  Core trait definitions for display driver abstraction
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

use crate::display::error::DisplayError;

/// Panel geometry and limits
#[derive(Debug, Clone)]
pub struct DisplayCapabilities {
    /// Display width in pixels
    pub width: u32,

    /// Display height in pixels
    pub height: u32,

    /// Maximum recommended frame rate
    pub max_fps: u32,
}

/// What the render loop needs from a monochrome panel.
///
/// Frames arrive packed, row-major, 8 pixels per byte LSB first, exactly
/// `width * height / 8` bytes.
pub trait DisplayDriver: Send {
    /// Returns the capabilities of this display
    fn capabilities(&self) -> &DisplayCapabilities;

    /// Returns the display dimensions as (width, height)
    fn dimensions(&self) -> (u32, u32) {
        let caps = self.capabilities();
        (caps.width, caps.height)
    }

    /// Bring the controller up; called once before the first frame.
    fn init(&mut self) -> Result<(), DisplayError>;

    /// Replace the panel contents with `buffer` and present it.
    fn write_buffer(&mut self, buffer: &[u8]) -> Result<(), DisplayError>;

    /// Blank the panel
    fn clear(&mut self) -> Result<(), DisplayError>;

    /// Expected `write_buffer` length for this panel.
    fn buffer_len(&self) -> usize {
        let (w, h) = self.dimensions();
        ((w * h + 7) / 8) as usize
    }
}
