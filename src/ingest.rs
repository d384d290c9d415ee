/*
 *  ingest.rs
 *
 *  LySpec - worth the squeeze
 *  (c) 2020-26 Stuart Hunter
 *
 *  Raw cava frames in, smoothed spectrum out
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

use log::{debug, info, warn};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::watch;

/// Bytes per sample on the wire (i16 little endian).
pub const SAMPLE_WIDTH_BYTES: usize = 2;

/// Weight of the previous smoothed value, time constant ~2 frames.
pub const ALPHA: f32 = 0.5;

/// Full scale of a raw sample.
pub const SAMPLE_FULL_SCALE: f32 = 32768.0;

/// One amplitude per bar, in the raw sample domain.
pub type SpectrumVector = Vec<f32>;

/// Publishing side of the latest-spectrum cell, shared across ingestor restarts.
pub type SpectrumSlot = Arc<watch::Sender<SpectrumVector>>;

/// Why an ingestion loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestExit {
    /// The producer closed its end.
    EndOfStream,
    /// Asked to stop.
    Stopped,
    /// The read itself failed.
    ReadError,
}

/// Decode the complete samples in `bytes`, a dangling odd byte is dropped.
pub fn decode_samples(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(SAMPLE_WIDTH_BYTES)
        .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32)
        .collect()
}

/// Force `raw` to exactly `bar_count` values: truncate, or pad with silence.
pub fn reconcile(mut raw: Vec<f32>, bar_count: usize) -> Vec<f32> {
    raw.resize(bar_count, 0.0);
    raw
}

/// Exponential moving average per bar.
#[derive(Debug, Clone)]
pub struct Smoother {
    alpha: f32,
    state: Vec<f32>,
}

impl Smoother {
    pub fn new(bar_count: usize) -> Self {
        Self { alpha: ALPHA, state: vec![0.0; bar_count] }
    }

    /// Fold one raw frame in; `raw` must already be reconciled to the bar count.
    pub fn apply(&mut self, raw: &[f32]) -> &[f32] {
        for (s, r) in self.state.iter_mut().zip(raw) {
            *s = self.alpha * *s + (1.0 - self.alpha) * *r;
        }
        &self.state
    }

    pub fn values(&self) -> &[f32] {
        &self.state
    }
}

/// Fill `buf` from `reader`, stopping early only at end of stream.
async fn read_frame<R>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Reads fixed width frames off the analysis stream and publishes the
/// smoothed result into a single slot, newest value wins.
pub struct SpectrumIngestor<R> {
    reader: R,
    bar_count: usize,
    smoother: Smoother,
    frames: u64,
}

impl<R> SpectrumIngestor<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(reader: R, bar_count: usize) -> Self {
        let bar_count = bar_count.max(1);
        Self { reader, bar_count, smoother: Smoother::new(bar_count), frames: 0 }
    }

    /// Run until the stream ends or `stop` turns true (or its sender goes away).
    pub async fn run(
        mut self,
        slot: SpectrumSlot,
        mut stop: watch::Receiver<bool>,
    ) -> IngestExit {
        let mut buf = vec![0u8; self.bar_count * SAMPLE_WIDTH_BYTES];
        info!("spectrum ingest started, {} bars", self.bar_count);

        let exit = loop {
            if *stop.borrow() {
                break IngestExit::Stopped;
            }

            let read = tokio::select! {
                r = read_frame(&mut self.reader, &mut buf) => r,
                _ = stop.changed() => break IngestExit::Stopped,
            };

            let n = match read {
                Ok(0) => break IngestExit::EndOfStream,
                Ok(n) => n,
                Err(e) => {
                    warn!("spectrum stream read failed: {}", e);
                    break IngestExit::ReadError;
                }
            };
            if n < buf.len() {
                debug!("short spectrum frame: {} of {} bytes", n, buf.len());
            }

            let raw = reconcile(decode_samples(&buf[..n]), self.bar_count);
            let smoothed = self.smoother.apply(&raw).to_vec();
            slot.send_replace(smoothed);
            self.frames += 1;
        };

        info!("spectrum ingest ended ({:?}) after {} frames", exit, self.frames);
        exit
    }
}
