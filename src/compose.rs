/*
 *  compose.rs
 *
 *  LySpec - worth the squeeze
 *  (c) 2020-26 Stuart Hunter
 *
 *  Spectrum bars plus the scrolling track line, one frame at a time
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

use core::convert::Infallible;
use embedded_graphics::{
    mono_font::{iso_8859_13::FONT_6X10, MonoFont, MonoTextStyle, MonoTextStyleBuilder},
    pixelcolor::BinaryColor,
    prelude::*,
    primitives::{PrimitiveStyle, Rectangle},
    text::{renderer::TextRenderer, Baseline, Text},
};

use crate::config::Config;
use crate::constants::{HEADER_BAND_HEIGHT, HEADER_TEXT_Y, SCROLL_STEP};
use crate::display::framebuffer::Frame;
use crate::ingest::SAMPLE_FULL_SCALE;

/// Horizontal bar layout, straight from the config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarGeometry {
    pub bar_width: u32,
    pub bar_spacing: u32,
}

impl BarGeometry {
    /// Left edge of bar `i`, `None` once it no longer fits in pixel coordinates.
    pub fn x(&self, i: usize) -> Option<i32> {
        let pitch = u64::from(self.bar_width) + u64::from(self.bar_spacing);
        (i as u64).checked_mul(pitch).and_then(|x| i32::try_from(x).ok())
    }
}

impl From<&Config> for BarGeometry {
    fn from(cfg: &Config) -> Self {
        Self { bar_width: cfg.bar_width, bar_spacing: cfg.bar_spacing }
    }
}

/// Horizontal position of the header text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollState {
    offset: i32,
    text_extent_px: u32,
    panel_width_px: u32,
}

impl ScrollState {
    pub fn new(panel_width_px: u32) -> Self {
        Self { offset: 0, text_extent_px: 0, panel_width_px }
    }

    pub fn offset(&self) -> i32 {
        self.offset
    }

    pub fn text_extent(&self) -> u32 {
        self.text_extent_px
    }

    pub fn reset(&mut self) {
        self.offset = 0;
    }

    /// Step one frame for text `text_extent_px` wide and return the new offset.
    ///
    /// Text that fits stays at 0. Wider text moves left and re-enters from
    /// the right edge once it has fully left the panel.
    pub fn advance(&mut self, text_extent_px: u32) -> i32 {
        self.text_extent_px = text_extent_px;
        if text_extent_px <= self.panel_width_px {
            self.offset = 0;
        } else {
            self.offset -= SCROLL_STEP;
            if self.offset <= -(text_extent_px as i32) {
                self.offset = self.panel_width_px as i32;
            }
        }
        self.offset
    }
}

/// Height in pixels of a bar for `amplitude`, out of `avail` rows.
pub fn bar_height(amplitude: f32, avail: u32) -> u32 {
    if !amplitude.is_finite() || amplitude <= 0.0 {
        return 0;
    }
    let h = (amplitude / SAMPLE_FULL_SCALE * avail as f32).round();
    (h as u32).min(avail)
}

/// Turns the latest spectrum and track text into a [`Frame`].
pub struct FrameComposer {
    width: u32,
    height: u32,
    geometry: BarGeometry,
    font: &'static MonoFont<'static>,
    scroll: ScrollState,
    last_text: String,
}

impl FrameComposer {
    pub fn new(width: u32, height: u32, geometry: BarGeometry) -> Self {
        Self {
            width,
            height,
            geometry,
            font: &FONT_6X10,
            scroll: ScrollState::new(width),
            last_text: String::new(),
        }
    }

    pub fn geometry(&self) -> BarGeometry {
        self.geometry
    }

    pub fn set_geometry(&mut self, geometry: BarGeometry) {
        self.geometry = geometry;
    }

    pub fn scroll(&self) -> &ScrollState {
        &self.scroll
    }

    /// Rows below the header band that bars may use.
    pub fn available_height(&self) -> u32 {
        self.height.saturating_sub(HEADER_BAND_HEIGHT)
    }

    fn style(&self) -> MonoTextStyle<'static, BinaryColor> {
        MonoTextStyleBuilder::new().font(self.font).text_color(BinaryColor::On).build()
    }

    /// Width in pixels of `text` in the header font.
    pub fn measure_text(&self, text: &str) -> u32 {
        self.style()
            .measure_string(text, Point::zero(), Baseline::Top)
            .bounding_box
            .size
            .width
    }

    /// Draw one frame onto `target`, advancing the scroll by one step.
    pub fn render<D>(&mut self, target: &mut D, spectrum: &[f32], text: &str) -> Result<(), D::Error>
    where
        D: DrawTarget<Color = BinaryColor>,
    {
        if text != self.last_text {
            self.last_text = text.to_string();
            self.scroll.reset();
        }
        let extent = self.measure_text(text);
        let offset = self.scroll.advance(extent);

        target.clear(BinaryColor::Off)?;
        Text::with_baseline(text, Point::new(offset, HEADER_TEXT_Y), self.style(), Baseline::Top)
            .draw(target)?;

        let avail = self.available_height();
        let fill = PrimitiveStyle::with_fill(BinaryColor::On);
        // bars are laid out left to right, the first one off the panel ends the row
        let bar_width = self.geometry.bar_width.min(self.width);
        for (i, &amp) in spectrum.iter().enumerate() {
            let x = match self.geometry.x(i) {
                Some(x) if x < self.width as i32 => x,
                _ => break,
            };
            let h = bar_height(amp, avail);
            if h == 0 {
                continue;
            }
            Rectangle::new(
                Point::new(x, (self.height - h) as i32),
                Size::new(bar_width, h),
            )
            .into_styled(fill)
            .draw(target)?;
        }
        Ok(())
    }

    /// Compose a fresh frame.
    pub fn compose(&mut self, spectrum: &[f32], text: &str) -> Frame {
        let mut frame = Frame::new(self.width, self.height);
        let drawn: Result<(), Infallible> = self.render(&mut frame, spectrum, text);
        match drawn {
            Ok(()) => frame,
            Err(never) => match never {},
        }
    }
}
