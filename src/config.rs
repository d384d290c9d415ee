/*
 *  config.rs
 *
 *  LySpec - worth the squeeze
 *  (c) 2020-26 Stuart Hunter
 *
 *  Spectrum config document, command line, and change notification
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

use clap::{ArgAction, Parser, ValueHint};
use log::{debug, info, warn};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::{fs, path::{Path, PathBuf}};
use thiserror::Error;

/// Config document looked up in the working directory unless `--config` says otherwise.
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// Display refresh ceiling, I²C panels tear above this.
pub const MAX_FRAME_RATE: u32 = 20;
pub const MIN_FRAME_RATE: u32 = 1;

/// Error type for config loading/validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),
}

/// The persisted, flat spectrum configuration.
///
/// Older documents used `spectrum_bars` / `spectrum_fps`, both are still read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(alias = "spectrum_bars")]
    pub bar_count: usize,
    pub bar_width: u32,
    pub bar_spacing: u32,
    #[serde(alias = "spectrum_fps")]
    pub frame_rate: u32,
    /// Persisted but not rendered, the header band shows the track text.
    pub header_text: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bar_count: 16,
            bar_width: 8,
            bar_spacing: 0,
            frame_rate: 20,
            header_text: "YouTube Spectrum".to_string(),
        }
    }
}

impl Config {
    /// True when the analysis process has to be relaunched to honour `other`.
    pub fn analysis_differs(&self, other: &Config) -> bool {
        self.bar_count != other.bar_count || self.frame_rate != other.frame_rate
    }
}

/// Check invariants and clamp the frame rate into the safe window.
pub fn validate(mut cfg: Config) -> Result<Config, ConfigError> {
    if cfg.bar_count == 0 {
        return Err(ConfigError::Validation("bar_count must be > 0".into()));
    }
    if cfg.bar_width == 0 {
        return Err(ConfigError::Validation("bar_width must be > 0".into()));
    }
    let clamped = cfg.frame_rate.clamp(MIN_FRAME_RATE, MAX_FRAME_RATE);
    if clamped != cfg.frame_rate {
        debug!("frame_rate {} clamped to {}", cfg.frame_rate, clamped);
        cfg.frame_rate = clamped;
    }
    Ok(cfg)
}

/// Owns the location of the config document.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and validate the document; a missing document is seeded with the defaults.
    pub fn load(&self) -> Result<Config, ConfigError> {
        if !self.path.exists() {
            let cfg = Config::default();
            match self.save(&cfg) {
                Ok(()) => info!("Wrote default config to {}", self.path.display()),
                Err(e) => warn!("Could not write default config {}: {}", self.path.display(), e),
            }
            return Ok(cfg);
        }
        let s = fs::read_to_string(&self.path)?;
        let cfg: Config = serde_json::from_str(&s)?;
        validate(cfg)
    }

    /// `load`, but never fails: a broken document yields the defaults.
    pub fn load_or_default(&self) -> Config {
        self.load().unwrap_or_else(|e| {
            warn!("Config {} unusable ({}), using defaults", self.path.display(), e);
            Config::default()
        })
    }

    pub fn save(&self, cfg: &Config) -> Result<(), ConfigError> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }
        let s = serde_json::to_string_pretty(cfg)?;
        fs::write(&self.path, s)?;
        Ok(())
    }

    /// Call `on_change` every time the document is observed to change.
    ///
    /// Delivery happens on the notifier's own thread and is at-least-once: a
    /// single save can produce several calls, so callers should re-load rather
    /// than apply deltas. The parent directory is watched so that editors
    /// which save by rename are still seen.
    pub fn watch<F>(&self, on_change: F) -> Result<ConfigWatcher, ConfigError>
    where
        F: Fn() + Send + 'static,
    {
        let name: OsString = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .ok_or_else(|| ConfigError::Validation(format!("{} is not a file path", self.path.display())))?;
        let dir = match self.path.parent() {
            Some(d) if !d.as_os_str().is_empty() => d.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let touched = matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_))
                        && event.paths.iter().any(|p| p.file_name() == Some(name.as_os_str()));
                    if touched {
                        on_change();
                    }
                }
                Err(e) => warn!("Config watcher error: {}", e),
            },
            notify::Config::default(),
        )?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        info!("Watching {} for changes", self.path.display());

        Ok(ConfigWatcher { watcher: Some(watcher), path: self.path.clone() })
    }
}

/// Live registration returned by [`ConfigStore::watch`]; dropping it unregisters.
pub struct ConfigWatcher {
    watcher: Option<RecommendedWatcher>,
    path: PathBuf,
}

impl ConfigWatcher {
    pub fn stop(&mut self) {
        if self.watcher.take().is_some() {
            info!("Stopped watching {}", self.path.display());
        }
    }

    pub fn is_active(&self) -> bool {
        self.watcher.is_some()
    }
}

/// Command line. The config document only carries the spectrum shape,
/// everything about the surroundings comes from here.
#[derive(Debug, Parser, Clone)]
#[command(name = "LySpec", version, about = "cava spectrum and now playing on an OLED panel")]
pub struct Cli {
    /// Path to the JSON config document (created with defaults if missing)
    #[arg(short = 'c', long, default_value = DEFAULT_CONFIG_FILE, value_hint = ValueHint::FilePath)]
    pub config: PathBuf,
    /// cava executable
    #[arg(long, default_value = "cava", value_hint = ValueHint::CommandName)]
    pub cava: String,
    /// Where the derived cava config is written [default: ~/.config/cava/config]
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub cava_config: Option<PathBuf>,
    /// Shell command printing "artist - title" [default: playerctl metadata]
    #[arg(long)]
    pub track_cmd: Option<String>,
    /// I2C bus device path for the OLED panel
    #[arg(long, default_value = "/dev/i2c-1", value_hint = ValueHint::FilePath)]
    pub i2c_bus: String,
    /// I2C address of the OLED panel (e.g. 0x3C)
    #[arg(long, default_value = "0x3C", value_parser = parse_address)]
    pub i2c_address: u8,
    /// Render to an in-memory panel, no hardware required
    #[arg(long, action = ArgAction::SetTrue)]
    pub headless: bool,
    /// Enable debug log level
    #[arg(short = 'v', long, alias = "verbose", action = ArgAction::SetTrue)]
    pub debug: bool,
    /// dump the effective config and exit
    #[arg(long, action = ArgAction::SetTrue)]
    pub dump_config: bool,
}

fn parse_address(s: &str) -> Result<u8, String> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse::<u8>(),
    };
    parsed.map_err(|e| format!("invalid I2C address '{s}': {e}"))
}

/// Pretty YAML of the effective config (nice for debugging)
pub fn dump(cfg: &Config) -> Result<String, ConfigError> {
    Ok(serde_yaml::to_string(cfg)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    #[test]
    fn test_missing_document_is_seeded_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("config.json"));

        let cfg = store.load().unwrap();
        assert_eq!(cfg, Config::default());
        assert!(store.path().exists());

        // the seeded document reads back identically
        assert_eq!(store.load().unwrap(), Config::default());
    }

    #[test]
    fn test_legacy_field_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"spectrum_bars": 24, "bar_width": 4, "bar_spacing": 1,
                             "spectrum_fps": 15, "header_text": "hi"}"#).unwrap();

        let cfg = ConfigStore::new(&path).load().unwrap();
        assert_eq!(cfg.bar_count, 24);
        assert_eq!(cfg.bar_width, 4);
        assert_eq!(cfg.bar_spacing, 1);
        assert_eq!(cfg.frame_rate, 15);
        assert_eq!(cfg.header_text, "hi");
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"bar_count": 32}"#).unwrap();

        let cfg = ConfigStore::new(&path).load().unwrap();
        assert_eq!(cfg.bar_count, 32);
        assert_eq!(cfg.bar_width, Config::default().bar_width);
    }

    #[test]
    fn test_malformed_document_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ bar_count: ").unwrap();

        let store = ConfigStore::new(&path);
        assert!(matches!(store.load(), Err(ConfigError::Json(_))));
        assert_eq!(store.load_or_default(), Config::default());
    }

    #[test]
    fn test_validation() {
        let zero_bars = Config { bar_count: 0, ..Config::default() };
        assert!(matches!(validate(zero_bars), Err(ConfigError::Validation(_))));

        let zero_width = Config { bar_width: 0, ..Config::default() };
        assert!(matches!(validate(zero_width), Err(ConfigError::Validation(_))));

        let fast = validate(Config { frame_rate: 60, ..Config::default() }).unwrap();
        assert_eq!(fast.frame_rate, MAX_FRAME_RATE);

        let stopped = validate(Config { frame_rate: 0, ..Config::default() }).unwrap();
        assert_eq!(stopped.frame_rate, MIN_FRAME_RATE);
    }

    #[test]
    fn test_save_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("nested/config.json"));
        let cfg = Config { bar_count: 8, bar_width: 16, bar_spacing: 2, frame_rate: 10, header_text: "x".into() };

        store.save(&cfg).unwrap();
        assert_eq!(store.load().unwrap(), cfg);
    }

    #[test]
    fn test_analysis_differs() {
        let a = Config::default();
        assert!(!a.analysis_differs(&Config { bar_width: 3, ..a.clone() }));
        assert!(a.analysis_differs(&Config { bar_count: 8, ..a.clone() }));
        assert!(a.analysis_differs(&Config { frame_rate: 10, ..a.clone() }));
    }

    #[test]
    fn test_parse_address() {
        assert_eq!(parse_address("0x3C"), Ok(0x3C));
        assert_eq!(parse_address("0x3d"), Ok(0x3D));
        assert_eq!(parse_address("60"), Ok(60));
        assert!(parse_address("0x1FF").is_err());
    }

    #[test]
    fn test_dump_is_yaml() {
        let s = dump(&Config::default()).unwrap();
        assert!(s.contains("bar_count: 16"));
    }

    #[test]
    fn test_watch_reports_changes() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("config.json"));
        store.load().unwrap();

        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let mut watcher = store.watch(move || { counter.fetch_add(1, Ordering::SeqCst); }).unwrap();
        assert!(watcher.is_active());

        store.save(&Config { bar_count: 4, ..Config::default() }).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while hits.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
        }
        assert!(hits.load(Ordering::SeqCst) >= 1);

        watcher.stop();
        assert!(!watcher.is_active());
    }

    #[test]
    fn test_watch_ignores_sibling_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("config.json"));
        store.load().unwrap();

        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let _watcher = store.watch(move || { counter.fetch_add(1, Ordering::SeqCst); }).unwrap();

        fs::write(dir.path().join("other.json"), "{}").unwrap();
        std::thread::sleep(Duration::from_millis(300));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
