/*
 *  display/framebuffer.rs
 *
 *  LySpec - worth the squeeze
 *  (c) 2020-26 Stuart Hunter
 *
 *  Runtime-sized monochrome frame for embedded-graphics
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
use embedded_graphics::geometry::{OriginDimensions, Size};
use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::Rectangle;

/// One composed panel image. Anything drawn outside the panel is clipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    buf: Vec<BinaryColor>,
    w: usize,
    h: usize,
}

impl Frame {
    pub fn new(width: u32, height: u32) -> Self {
        let (w, h) = (width as usize, height as usize);
        Self { buf: vec![BinaryColor::Off; w * h], w, h }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<BinaryColor> {
        self.idx(Point::new(x as i32, y as i32)).map(|i| self.buf[i])
    }

    pub fn count_on(&self) -> usize {
        self.buf.iter().filter(|p| p.is_on()).count()
    }

    /// Lit pixels in column `x` between rows `y0..y1`.
    pub fn column_on(&self, x: u32, y0: u32, y1: u32) -> usize {
        (y0..y1.min(self.h as u32))
            .filter(|&y| self.pixel(x, y) == Some(BinaryColor::On))
            .count()
    }

    /// Row-major, 8 pixels per byte, LSB first - what `DisplayDriver::write_buffer` takes.
    pub fn to_packed_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; (self.buf.len() + 7) / 8];
        for (i, pixel) in self.buf.iter().enumerate() {
            if pixel.is_on() {
                bytes[i / 8] |= 1 << (i % 8);
            }
        }
        bytes
    }

    /// Map (x,y) to linear index; returns None if out of bounds
    #[inline]
    fn idx(&self, p: Point) -> Option<usize> {
        if p.x >= 0 && p.y >= 0 {
            let (x, y) = (p.x as usize, p.y as usize);
            if x < self.w && y < self.h {
                return Some(y * self.w + x);
            }
        }
        None
    }
}

/// Unpack `bytes` (as produced by [`Frame::to_packed_bytes`]) into `(x, y, on)` visits.
pub fn for_each_packed_pixel<F>(bytes: &[u8], width: u32, height: u32, mut visit: F)
where
    F: FnMut(u32, u32, bool),
{
    let total = (width * height) as usize;
    for (byte_idx, &byte) in bytes.iter().enumerate() {
        for bit in 0..8 {
            let i = byte_idx * 8 + bit;
            if i >= total {
                return;
            }
            visit(i as u32 % width, i as u32 / width, byte & (1 << bit) != 0);
        }
    }
}

impl OriginDimensions for Frame {
    fn size(&self) -> Size {
        Size::new(self.w as u32, self.h as u32)
    }
}

impl DrawTarget for Frame {
    type Color = BinaryColor;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(p, c) in pixels {
            if let Some(i) = self.idx(p) {
                self.buf[i] = c;
            }
        }
        Ok(())
    }

    fn clear(&mut self, color: Self::Color) -> Result<(), Self::Error> {
        self.buf.fill(color);
        Ok(())
    }

    fn fill_solid(&mut self, area: &Rectangle, color: Self::Color) -> Result<(), Self::Error> {
        // fast path for the bars, clipped to the panel
        let area = area.intersection(&self.bounding_box());
        let Some(bottom_right) = area.bottom_right() else { return Ok(()) };
        let (x0, x1) = (area.top_left.x as usize, bottom_right.x as usize);
        for y in area.top_left.y as usize..=bottom_right.y as usize {
            let row = y * self.w;
            self.buf[row + x0..=row + x1].fill(color);
        }
        Ok(())
    }
}
