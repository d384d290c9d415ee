/*
 *  analysis.rs
 *
 *  LySpec - worth the squeeze
 *  (c) 2020-26 Stuart Hunter
 *
 *  cava subprocess lifecycle and derived cava configuration
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
//! cava does the audio capture and the FFT, we only ever see its raw output:
//! `bar_count` little endian i16 per frame on stdout.

use dirs_next::home_dir;
use log::{debug, info, warn};
use std::fs;
use std::path::PathBuf;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::{Child, ChildStdout, Command};
use tokio::time::{timeout, Duration};

use crate::config::Config;

/// How long cava gets to honour SIGTERM before it is killed outright.
const TERMINATE_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to write analysis config {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to start {program}: {source}")]
    Start {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{0} started without a stdout pipe")]
    NoStdout(String),
}

/// `~/.config/cava/config`, falling back to the working directory without a home.
pub fn default_cava_config_path() -> PathBuf {
    match home_dir() {
        Some(home) => home.join(".config/cava/config"),
        None => PathBuf::from("cava.conf"),
    }
}

/// The cava config derived from ours: raw mono 16 bit straight to stdout.
pub fn render_cava_config(cfg: &Config) -> String {
    format!(
        "\n[general]\n\
         bars = {}\n\
         framerate = {}\n\
         autosens = 1\n\
         \n\
         [output]\n\
         method = raw\n\
         channels = mono\n\
         raw_target = /dev/stdout\n\
         bit_format = 16bit\n",
        cfg.bar_count, cfg.frame_rate
    )
}

/// Owns the running analysis process and its stdout until someone takes it.
pub struct AnalysisProcess {
    program: String,
    args: Vec<String>,
    config_path: PathBuf,
    child: Option<Child>,
    stdout: Option<ChildStdout>,
}

impl AnalysisProcess {
    pub fn new(program: impl Into<String>, config_path: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            config_path: config_path.into(),
            child: None,
            stdout: None,
        }
    }

    /// Leading arguments placed before `-p <config>`, for wrappers such as `sh script`.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn write_config(&self, cfg: &Config) -> Result<(), ProcessError> {
        let wrap = |source| ProcessError::Config { path: self.config_path.clone(), source };
        if let Some(dir) = self.config_path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir).map_err(wrap)?;
            }
        }
        fs::write(&self.config_path, render_cava_config(cfg)).map_err(wrap)?;
        debug!("cava config written to {}", self.config_path.display());
        Ok(())
    }

    /// Write the derived config and launch the process.
    pub fn start(&mut self, cfg: &Config) -> Result<(), ProcessError> {
        self.write_config(cfg)?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg("-p")
            .arg(&self.config_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProcessError::Start { program: self.program.clone(), source })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ProcessError::NoStdout(self.program.clone()))?;

        info!(
            "{} started (pid {}), {} bars at {} fps",
            self.program,
            child.id().unwrap_or_default(),
            cfg.bar_count,
            cfg.frame_rate
        );
        self.child = Some(child);
        self.stdout = Some(stdout);
        Ok(())
    }

    /// Stop whatever is running and start again with `cfg`.
    pub async fn restart(&mut self, cfg: &Config) -> Result<(), ProcessError> {
        self.stop().await;
        self.start(cfg)
    }

    /// Terminate the process and drop every handle. Safe to call repeatedly.
    pub async fn stop(&mut self) {
        self.stdout = None;
        if let Some(mut child) = self.child.take() {
            terminate(&self.program, &mut child).await;
        }
    }

    /// The byte stream of the current process, handed out once per start.
    pub fn output_stream(&mut self) -> Option<ChildStdout> {
        self.stdout.take()
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(|c| c.id())
    }

    /// True while the last started process has not exited.
    pub fn is_running(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }
}

/// SIGTERM, a short grace period, then SIGKILL.
async fn terminate(program: &str, child: &mut Child) {
    if let Some(pid) = child.id() {
        // SAFETY: pid is our own child which has not been reaped yet
        let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
        if rc != 0 {
            warn!("SIGTERM to {} (pid {}) failed: {}", program, pid, std::io::Error::last_os_error());
        }
    }

    match timeout(TERMINATE_GRACE, child.wait()).await {
        Ok(Ok(status)) => info!("{} exited: {}", program, status),
        Ok(Err(e)) => warn!("waiting on {} failed: {}", program, e),
        Err(_) => {
            warn!("{} ignored SIGTERM, killing", program);
            if let Err(e) = child.kill().await {
                warn!("kill {} failed: {}", program, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tokio::io::AsyncReadExt;

    fn script(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("fake-cava.sh");
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_render_cava_config() {
        let cfg = Config { bar_count: 24, frame_rate: 15, ..Config::default() };
        let text = render_cava_config(&cfg);
        assert!(text.contains("[general]"));
        assert!(text.contains("bars = 24\n"));
        assert!(text.contains("framerate = 15\n"));
        assert!(text.contains("method = raw\n"));
        assert!(text.contains("channels = mono\n"));
        assert!(text.contains("raw_target = /dev/stdout\n"));
        assert!(text.contains("bit_format = 16bit\n"));
    }

    #[tokio::test]
    async fn test_missing_executable() {
        let dir = tempfile::tempdir().unwrap();
        let mut proc = AnalysisProcess::new("/nonexistent/cava", dir.path().join("cava/config"));

        let err = proc.start(&Config::default()).unwrap_err();
        assert!(matches!(err, ProcessError::Start { .. }));
        assert!(proc.output_stream().is_none());
        assert!(!proc.is_running());
        // the derived config is written even though the launch failed
        assert!(dir.path().join("cava/config").exists());
    }

    #[tokio::test]
    async fn test_stream_ends_when_process_exits() {
        let dir = tempfile::tempdir().unwrap();
        let body = "printf '\\001\\000\\002\\000'\n";
        let mut proc = AnalysisProcess::new("sh", dir.path().join("config"))
            .with_args([script(dir.path(), body).to_string_lossy().to_string()]);

        proc.start(&Config { bar_count: 2, ..Config::default() }).unwrap();
        let mut out = proc.output_stream().unwrap();
        assert!(proc.output_stream().is_none());

        let mut bytes = Vec::new();
        out.read_to_end(&mut bytes).await.unwrap();
        assert_eq!(bytes, vec![1, 0, 2, 0]);
        proc.stop().await;
    }

    #[tokio::test]
    async fn test_stop_terminates_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let body = "while :; do sleep 1; done\n";
        let mut proc = AnalysisProcess::new("sh", dir.path().join("config"))
            .with_args([script(dir.path(), body).to_string_lossy().to_string()]);

        proc.start(&Config::default()).unwrap();
        assert!(proc.is_running());
        assert!(proc.pid().is_some());

        proc.stop().await;
        assert!(!proc.is_running());
        assert!(proc.pid().is_none());
        proc.stop().await;
    }

    #[tokio::test]
    async fn test_restart_rewrites_config() {
        let dir = tempfile::tempdir().unwrap();
        let cfg_path = dir.path().join("config");
        let body = "while :; do sleep 1; done\n";
        let mut proc = AnalysisProcess::new("sh", &cfg_path)
            .with_args([script(dir.path(), body).to_string_lossy().to_string()]);

        proc.start(&Config { bar_count: 4, ..Config::default() }).unwrap();
        let first = proc.pid();
        proc.restart(&Config { bar_count: 6, ..Config::default() }).await.unwrap();

        assert_ne!(proc.pid(), first);
        assert!(fs::read_to_string(&cfg_path).unwrap().contains("bars = 6\n"));
        assert!(proc.output_stream().is_some());
        proc.stop().await;
    }
}
