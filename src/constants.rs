//! This module contains global constants used across the display and other modules.

/// The total width of the OLED display in pixels.
pub const DISPLAY_WIDTH: u32 = 128;
/// The total height of the OLED display in pixels.
pub const DISPLAY_HEIGHT: u32 = 64;

/// Rows reserved at the top of the panel for the scrolling track line.
pub const HEADER_BAND_HEIGHT: u32 = 16;
/// Top of the track text inside the header band.
pub const HEADER_TEXT_Y: i32 = 3;

/// Pixels the track text moves left per frame.
pub const SCROLL_STEP: i32 = 1;
