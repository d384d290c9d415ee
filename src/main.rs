/*
 *  main.rs
 *
 *  LySpec - worth the squeeze
 *  (c) 2020-26 Stuart Hunter
 *
 *  cava spectrum and now playing text on a 128x64 OLED
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

use anyhow::Context;
use clap::Parser;
use env_logger::Env;
use log::info;
use tokio::signal::unix::{signal, Signal, SignalKind};

use lyspec::config::{dump, Cli, ConfigStore};
use lyspec::display::{DisplayDriverFactory, PanelOptions};
use lyspec::pipeline::{Pipeline, PipelineOptions};

include!(concat!(env!("OUT_DIR"), "/build_info.rs"));

/// SIGINT, SIGTERM and SIGHUP, hooked up front so none is missed during startup.
struct ShutdownSignals {
    sigint: Signal,
    sigterm: Signal,
    sighup: Signal,
}

impl ShutdownSignals {
    fn hook() -> std::io::Result<Self> {
        Ok(Self {
            sigint: signal(SignalKind::interrupt())?,
            sigterm: signal(SignalKind::terminate())?,
            sighup: signal(SignalKind::hangup())?,
        })
    }

    /// All three mean shut down.
    async fn recv(mut self) {
        tokio::select! {
            _ = self.sigint.recv() => {
                info!("SIGINT received. Initiating graceful shutdown.");
            }
            _ = self.sigterm.recv() => {
                info!("SIGTERM received. Initiating graceful shutdown.");
            }
            _ = self.sighup.recv() => {
                info!("SIGHUP received. Initiating graceful shutdown.");
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::from_env(Env::default().default_filter_or(if cli.debug { "debug" } else { "info" }))
        .format_timestamp_secs()
        .init();

    if cli.dump_config {
        let cfg = ConfigStore::new(&cli.config).load_or_default();
        print!("{}", dump(&cfg)?);
        return Ok(());
    }

    info!("This {} worth the Squeeze", env!("CARGO_PKG_NAME"));
    info!("v.{} built {}", env!("CARGO_PKG_VERSION"), BUILD_DATE);

    let panel = PanelOptions {
        headless: cli.headless,
        i2c_bus: cli.i2c_bus.clone(),
        i2c_address: cli.i2c_address,
    };
    let mut driver = DisplayDriverFactory::create(&panel).context("no display to render to")?;
    driver.init().context("display initialization failed")?;

    let signals = ShutdownSignals::hook().context("failed to install signal handlers")?;
    let mut pipeline = Pipeline::start(PipelineOptions::from_cli(&cli), driver);

    pipeline.run_until(signals.recv()).await;

    if let Some(stats) = pipeline.shutdown().await {
        info!("{} frames shown, {} dropped", stats.frames, stats.failures);
    }
    info!("Exited cleanly.");
    Ok(())
}
