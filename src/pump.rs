/*
 *  pump.rs
 *
 *  LySpec - worth the squeeze
 *  (c) 2020-26 Stuart Hunter
 *
 *  The render loop: compose at a fixed cadence and push to the panel
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
use tokio::sync::watch;

use crate::compose::{BarGeometry, FrameComposer};
use crate::config::Config;
use crate::display::{BoxedDriver, DisplayError};
use crate::ingest::SpectrumVector;
use crate::pacer::Pacer;
use crate::track::TrackInfoPoller;

/// Counters reported when the loop ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpStats {
    pub frames: u64,
    pub failures: u64,
}

pub struct DisplayPump {
    driver: BoxedDriver,
    composer: FrameComposer,
    poller: TrackInfoPoller,
    pacer: Pacer,
    spectrum: watch::Receiver<SpectrumVector>,
    config: watch::Receiver<Config>,
    stats: PumpStats,
}

impl DisplayPump {
    /// `driver` must already be initialized.
    pub fn new(
        driver: BoxedDriver,
        poller: TrackInfoPoller,
        spectrum: watch::Receiver<SpectrumVector>,
        mut config: watch::Receiver<Config>,
    ) -> Self {
        let cfg = config.borrow_and_update().clone();
        let (w, h) = driver.dimensions();
        let composer = FrameComposer::new(w, h, BarGeometry::from(&cfg));
        let pacer = Pacer::new(cfg.frame_rate.min(driver.capabilities().max_fps));
        Self { driver, composer, poller, pacer, spectrum, config, stats: PumpStats::default() }
    }

    pub fn fps(&self) -> u32 {
        self.pacer.fps()
    }

    pub fn geometry(&self) -> BarGeometry {
        self.composer.geometry()
    }

    pub fn stats(&self) -> PumpStats {
        self.stats
    }

    /// Take on a new config: bar geometry and pace.
    pub fn apply_config(&mut self, cfg: &Config) {
        self.composer.set_geometry(BarGeometry::from(cfg));
        self.pacer.set_fps(cfg.frame_rate.min(self.driver.capabilities().max_fps));
        info!(
            "display: {} - {} bars {}px +{}px at {} fps",
            cfg.header_text,
            cfg.bar_count,
            cfg.bar_width,
            cfg.bar_spacing,
            self.pacer.fps()
        );
    }

    /// One frame: pick up config, poll the track line, compose, transfer.
    pub async fn tick(&mut self) -> Result<(), DisplayError> {
        if matches!(self.config.has_changed(), Ok(true)) {
            let cfg = self.config.borrow_and_update().clone();
            self.apply_config(&cfg);
        }

        let text = self.poller.poll().await.to_string();
        let spectrum = self.spectrum.borrow().clone();
        let frame = self.composer.compose(&spectrum, &text);

        let result = self.driver.write_buffer(&frame.to_packed_bytes());
        match result {
            Ok(()) => self.stats.frames += 1,
            Err(_) => self.stats.failures += 1,
        }
        result
    }

    /// Tick at the configured pace until `shutdown` turns true, then blank the panel.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> PumpStats {
        info!("display pump started at {} fps", self.pacer.fps());

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = self.pacer.wait() => {}
                _ = shutdown.changed() => break,
            }
            let result = tokio::select! {
                r = self.tick() => r,
                _ = shutdown.changed() => break,
            };
            if let Err(e) = result {
                // one line per burst of failures, not per frame
                if self.stats.failures == 1 || self.stats.failures % 100 == 0 {
                    warn!("frame transfer failed ({} so far): {}", self.stats.failures, e);
                } else {
                    debug!("frame transfer failed: {}", e);
                }
            }
        }

        if let Err(e) = self.driver.clear() {
            warn!("failed to blank panel on exit: {}", e);
        }
        info!(
            "display pump stopped after {} frames ({} failed)",
            self.stats.frames, self.stats.failures
        );
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::MockDriver;
    use crate::track::{TrackCommand, ERROR_TEXT};
    use std::time::Duration;

    fn pump_with(
        mock: &MockDriver,
        cfg: Config,
        track: &str,
    ) -> (DisplayPump, watch::Sender<SpectrumVector>, watch::Sender<Config>) {
        let (spectrum_tx, spectrum_rx) = watch::channel(vec![0.0; cfg.bar_count]);
        let (config_tx, config_rx) = watch::channel(cfg);
        let poller = TrackInfoPoller::new(TrackCommand::shell(track));
        let pump = DisplayPump::new(Box::new(mock.clone()), poller, spectrum_rx, config_rx);
        (pump, spectrum_tx, config_tx)
    }

    #[tokio::test]
    async fn test_tick_pushes_latest_spectrum() {
        let mock = MockDriver::new_with_size(128, 64);
        let (mut pump, spectrum_tx, _config_tx) = pump_with(&mock, Config::default(), "echo 'A - B'");

        spectrum_tx.send_replace(vec![32768.0; 16]);
        pump.tick().await.unwrap();

        let state = mock.state();
        let state = state.lock().unwrap();
        assert_eq!(state.flush_count, 1);
        // 16 bars of 8px fill the panel width below the header band
        assert_eq!(state.panel.column_on(0, 16, 64), 48);
        assert_eq!(state.panel.column_on(127, 16, 64), 48);
        assert_eq!(pump.stats().frames, 1);
    }

    #[tokio::test]
    async fn test_config_change_is_picked_up() {
        let mock = MockDriver::new_with_size(128, 64);
        let (mut pump, _spectrum_tx, config_tx) = pump_with(&mock, Config::default(), "echo x");
        assert_eq!(pump.fps(), 20);

        let cfg = Config { bar_width: 4, bar_spacing: 2, frame_rate: 5, ..Config::default() };
        config_tx.send_replace(cfg);
        pump.tick().await.unwrap();

        assert_eq!(pump.geometry(), BarGeometry { bar_width: 4, bar_spacing: 2 });
        assert_eq!(pump.fps(), 5);
    }

    #[tokio::test]
    async fn test_failed_transfer_is_counted() {
        let mock = MockDriver::new_with_size(128, 64);
        let (mut pump, _s, _c) = pump_with(&mock, Config::default(), "echo x");

        mock.state().lock().unwrap().simulate_flush_failure = true;
        assert!(pump.tick().await.is_err());
        mock.state().lock().unwrap().simulate_flush_failure = false;
        assert!(pump.tick().await.is_ok());

        assert_eq!(pump.stats(), PumpStats { frames: 1, failures: 1 });
    }

    #[tokio::test]
    async fn test_run_survives_failures_and_stops_on_shutdown() {
        let mock = MockDriver::new_with_size(128, 64);
        let (pump, _s, _c) = pump_with(&mock, Config::default(), "exit 1");
        mock.state().lock().unwrap().simulate_flush_failure = true;

        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(pump.run(stop_rx));

        tokio::time::sleep(Duration::from_millis(300)).await;
        mock.state().lock().unwrap().simulate_flush_failure = false;
        tokio::time::sleep(Duration::from_millis(300)).await;
        stop_tx.send_replace(true);

        let stats = tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
        assert!(stats.failures > 0);
        assert!(stats.frames > 0);

        let state = mock.state();
        let state = state.lock().unwrap();
        assert_eq!(state.clear_count, 1);
        assert_eq!(state.panel.count_on(), 0);
    }

    #[tokio::test]
    async fn test_error_sentinel_reaches_panel() {
        let mock = MockDriver::new_with_size(128, 64);
        let (mut pump, _s, _c) = pump_with(&mock, Config::default(), "exit 2");
        pump.tick().await.unwrap();
        assert_eq!(pump.poller.text(), ERROR_TEXT);

        let state = mock.state();
        let state = state.lock().unwrap();
        let header: usize = (0..128).map(|x| state.panel.column_on(x, 0, 16)).sum();
        assert!(header > 0);
    }
}
