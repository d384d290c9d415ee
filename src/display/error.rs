/*
 *  display/error.rs
 *
 *  LySpec - worth the squeeze
 *  (c) 2020-26 Stuart Hunter
 *
 *  Unified error types for display subsystem
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

use std::error::Error;
use std::fmt;

/// Anything that can go wrong between a composed frame and the glass.
#[derive(Debug)]
pub enum DisplayError {
    /// The controller refused its init sequence
    InitializationFailed(String),

    /// The I2C device could not be opened
    I2cError(String),

    /// Asked for a panel this build cannot drive
    InvalidConfiguration(String),

    /// A frame of the wrong size was handed to the driver
    BufferSizeMismatch { expected: usize, actual: usize },

    /// Transfer to the controller failed
    InterfaceError(display_interface::DisplayError),

    Other(String),
}

impl fmt::Display for DisplayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisplayError::InitializationFailed(msg) => write!(f, "panel init failed: {}", msg),
            DisplayError::I2cError(msg) => write!(f, "I2C error: {}", msg),
            DisplayError::InvalidConfiguration(msg) => write!(f, "invalid panel setup: {}", msg),
            DisplayError::BufferSizeMismatch { expected, actual } => {
                write!(f, "frame is {} bytes, panel takes {}", actual, expected)
            }
            DisplayError::InterfaceError(err) => write!(f, "panel transfer failed: {:?}", err),
            DisplayError::Other(msg) => f.write_str(msg),
        }
    }
}

// display_interface::DisplayError is not a std error, so there is no source to expose
impl Error for DisplayError {}

impl From<display_interface::DisplayError> for DisplayError {
    fn from(err: display_interface::DisplayError) -> Self {
        DisplayError::InterfaceError(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let e = DisplayError::BufferSizeMismatch { expected: 1024, actual: 512 };
        assert_eq!(e.to_string(), "frame is 512 bytes, panel takes 1024");

        let e: DisplayError = display_interface::DisplayError::BusWriteError.into();
        assert!(matches!(e, DisplayError::InterfaceError(_)));
        assert_eq!(e.to_string(), "panel transfer failed: BusWriteError");
    }
}
