/*
 *  pacer.rs
 *
 *  LySpec - worth the squeeze
 *  (c) 2020-26 Stuart Hunter
 *
 *  Fixed-cadence frame pacing for the render loop
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
use std::time::Duration;
use tokio::time::Instant;

use crate::config::{MAX_FRAME_RATE, MIN_FRAME_RATE};

pub struct Pacer {
    next_deadline: Instant,
    frame: Duration,
    fps: u32,
}

// I²C tops out around 20fps for a full 128x64 frame, so that is the ceiling
impl Pacer {
    pub fn new(target_fps: u32) -> Self {
        let fps = Self::clamp(target_fps);
        Self { next_deadline: Instant::now(), frame: Self::period(fps), fps }
    }

    #[inline]
    fn clamp(fps: u32) -> u32 {
        fps.clamp(MIN_FRAME_RATE, MAX_FRAME_RATE)
    }

    #[inline]
    fn period(fps: u32) -> Duration {
        Duration::from_micros((1_000_000u32 / fps.max(1)) as u64)
    }

    #[inline]
    pub fn set_fps(&mut self, fps: u32) {
        self.fps = Self::clamp(fps);
        self.frame = Self::period(self.fps);
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    pub fn frame(&self) -> Duration {
        self.frame
    }

    /// Sleep until the next tick is due, then schedule the one after.
    ///
    /// A loop that overran its slot starts the next frame immediately
    /// instead of trying to catch up.
    pub async fn wait(&mut self) {
        tokio::time::sleep_until(self.next_deadline).await;
        let now = Instant::now();
        self.next_deadline = (self.next_deadline + self.frame).max(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_is_clamped() {
        assert_eq!(Pacer::new(60).fps(), 20);
        assert_eq!(Pacer::new(0).fps(), 1);
        assert_eq!(Pacer::new(20).frame(), Duration::from_millis(50));

        let mut pacer = Pacer::new(20);
        pacer.set_fps(5);
        assert_eq!(pacer.frame(), Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_wait_keeps_cadence() {
        let start = Instant::now();
        let mut pacer = Pacer::new(10);
        pacer.wait().await; // first tick is immediate
        assert!(start.elapsed() < Duration::from_millis(50));
        pacer.wait().await;
        pacer.wait().await;
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(200));
        assert!(elapsed < Duration::from_secs(1));
    }
}
