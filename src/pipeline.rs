/*
 *  pipeline.rs
 *
 *  LySpec - worth the squeeze
 *  (c) 2020-26 Stuart Hunter
 *
 *  Wires config, cava, ingest and the render loop together
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

use log::{debug, error, info, warn};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::analysis::{default_cava_config_path, AnalysisProcess};
use crate::config::{Cli, Config, ConfigStore, ConfigWatcher};
use crate::display::BoxedDriver;
use crate::ingest::{IngestExit, SpectrumIngestor, SpectrumSlot, SpectrumVector};
use crate::pump::{DisplayPump, PumpStats};
use crate::track::{TrackCommand, TrackInfoPoller, POLL_INTERVAL, QUERY_TIMEOUT};

/// Editors tend to write a file in several steps; let them finish.
const RELOAD_SETTLE: Duration = Duration::from_millis(100);

/// Everything the pipeline needs that is not in the config document.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub config_path: PathBuf,
    pub cava_program: String,
    /// Placed before `-p <config>` on the cava command line.
    pub cava_args: Vec<String>,
    pub cava_config_path: PathBuf,
    pub track_command: TrackCommand,
    pub track_interval: Duration,
    pub track_timeout: Duration,
}

impl PipelineOptions {
    pub fn from_cli(cli: &Cli) -> Self {
        Self {
            config_path: cli.config.clone(),
            cava_program: cli.cava.clone(),
            cava_args: Vec::new(),
            cava_config_path: cli.cava_config.clone().unwrap_or_else(default_cava_config_path),
            track_command: cli
                .track_cmd
                .as_deref()
                .map(TrackCommand::shell)
                .unwrap_or_default(),
            track_interval: POLL_INTERVAL,
            track_timeout: QUERY_TIMEOUT,
        }
    }
}

struct IngestTask {
    stop: watch::Sender<bool>,
    handle: JoinHandle<IngestExit>,
}

/// Owns every moving part and the cells between them.
pub struct Pipeline {
    store: ConfigStore,
    config: watch::Sender<Config>,
    spectrum: SpectrumSlot,
    analysis: AnalysisProcess,
    ingest: Option<IngestTask>,
    pump: Option<JoinHandle<PumpStats>>,
    shutdown: watch::Sender<bool>,
    watcher: Option<ConfigWatcher>,
    reload_rx: mpsc::Receiver<()>,
}

impl Pipeline {
    /// Load the config and bring everything up. Must run inside a tokio runtime.
    ///
    /// Only the panel is essential: a broken config, a missing cava or a
    /// failed watcher are logged and the pipeline runs on without them.
    pub fn start(options: PipelineOptions, driver: BoxedDriver) -> Self {
        let store = ConfigStore::new(&options.config_path);
        let cfg = store.load_or_default();
        info!(
            "config: {} bars {}px +{}px at {} fps",
            cfg.bar_count, cfg.bar_width, cfg.bar_spacing, cfg.frame_rate
        );

        let (config_tx, config_rx) = watch::channel(cfg.clone());
        let (spectrum_tx, spectrum_rx) = watch::channel(vec![0.0; cfg.bar_count]);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (reload_tx, reload_rx) = mpsc::channel(8);

        let poller = TrackInfoPoller::new(options.track_command)
            .with_timing(options.track_interval, options.track_timeout);
        let pump = DisplayPump::new(driver, poller, spectrum_rx, config_rx);
        let pump = tokio::spawn(pump.run(shutdown_rx));

        let analysis = AnalysisProcess::new(options.cava_program, options.cava_config_path)
            .with_args(options.cava_args);

        let watcher = match store.watch(move || {
            // full means a reload is already pending
            let _ = reload_tx.try_send(());
        }) {
            Ok(w) => Some(w),
            Err(e) => {
                warn!("config changes will not be picked up: {}", e);
                None
            }
        };

        let mut pipeline = Self {
            store,
            config: config_tx,
            spectrum: Arc::new(spectrum_tx),
            analysis,
            ingest: None,
            pump: Some(pump),
            shutdown: shutdown_tx,
            watcher,
            reload_rx,
        };
        pipeline.launch_analysis(&cfg);
        pipeline
    }

    /// The config currently in effect.
    pub fn config(&self) -> Config {
        self.config.borrow().clone()
    }

    /// Watch the smoothed spectrum.
    pub fn spectrum(&self) -> watch::Receiver<SpectrumVector> {
        self.spectrum.subscribe()
    }

    pub fn analysis_pid(&self) -> Option<u32> {
        self.analysis.pid()
    }

    pub fn is_watching(&self) -> bool {
        self.watcher.as_ref().is_some_and(ConfigWatcher::is_active)
    }

    /// True while the last launched analysis process is alive.
    pub fn analysis_running(&mut self) -> bool {
        self.analysis.is_running()
    }

    fn launch_analysis(&mut self, cfg: &Config) {
        match self.analysis.start(cfg) {
            Ok(()) => self.spawn_ingest(cfg.bar_count),
            Err(e) => error!("spectrum source unavailable: {}", e),
        }
    }

    fn spawn_ingest(&mut self, bar_count: usize) {
        let Some(stream) = self.analysis.output_stream() else {
            warn!("analysis process has no output stream");
            return;
        };
        let (stop, stop_rx) = watch::channel(false);
        let ingestor = SpectrumIngestor::new(stream, bar_count);
        let handle = tokio::spawn(ingestor.run(Arc::clone(&self.spectrum), stop_rx));
        self.ingest = Some(IngestTask { stop, handle });
    }

    async fn stop_ingest(&mut self) {
        if let Some(task) = self.ingest.take() {
            task.stop.send_replace(true);
            match task.handle.await {
                Ok(exit) => debug!("ingest task finished: {:?}", exit),
                Err(e) => warn!("ingest task failed: {}", e),
            }
        }
    }

    /// Re-read the config document and apply it.
    ///
    /// Returns true when a new config took effect. A broken document keeps
    /// the current one. cava is relaunched when its own parameters moved or
    /// when it is no longer running.
    pub async fn reload(&mut self) -> bool {
        let cfg = match self.store.load() {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!("config reload failed, keeping current: {}", e);
                return false;
            }
        };
        let current = self.config();
        if cfg == current {
            debug!("config unchanged");
            return false;
        }

        info!("config reloaded from {}", self.store.path().display());
        let relaunch = cfg.analysis_differs(&current) || !self.analysis.is_running();
        self.config.send_replace(cfg.clone());

        if relaunch {
            self.stop_ingest().await;
            self.spectrum.send_replace(vec![0.0; cfg.bar_count]);
            match self.analysis.restart(&cfg).await {
                Ok(()) => self.spawn_ingest(cfg.bar_count),
                Err(e) => error!("spectrum source unavailable after reload: {}", e),
            }
        }
        true
    }

    /// Serve reload requests until `stop` completes.
    pub async fn run_until<F>(&mut self, stop: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(stop);
        loop {
            tokio::select! {
                _ = &mut stop => break,
                Some(()) = self.reload_rx.recv() => {
                    tokio::time::sleep(RELOAD_SETTLE).await;
                    while self.reload_rx.try_recv().is_ok() {}
                    self.reload().await;
                }
            }
        }
    }

    /// Ordered teardown: ingest, render loop, cava, watcher.
    pub async fn shutdown(mut self) -> Option<PumpStats> {
        info!("shutting down pipeline");
        self.stop_ingest().await;

        self.shutdown.send_replace(true);
        let stats = match self.pump.take() {
            Some(handle) => match handle.await {
                Ok(stats) => Some(stats),
                Err(e) => {
                    warn!("display task failed: {}", e);
                    None
                }
            },
            None => None,
        };

        self.analysis.stop().await;
        if let Some(mut watcher) = self.watcher.take() {
            watcher.stop();
        }
        stats
    }
}
