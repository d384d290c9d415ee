/*
 *  track.rs
 *
 *  LySpec - worth the squeeze
 *  (c) 2020-26 Stuart Hunter
 *
 *  Debounced "artist - title" lookup via playerctl
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

use log::{debug, info};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;

/// Minimum spacing between two metadata queries.
pub const POLL_INTERVAL: Duration = Duration::from_secs(2);
/// Upper bound on a single query, the render loop waits on it.
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(4);

pub const LOADING_TEXT: &str = "Loading...";
pub const NO_MEDIA_TEXT: &str = "No music playing";
pub const ERROR_TEXT: &str = "Error reading track";

#[derive(Debug, Error)]
pub enum MetadataQueryError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} exited with {status}")]
    Status { program: String, status: ExitStatus },
    #[error("{program} gave no answer within {limit:?}")]
    Timeout { program: String, limit: Duration },
}

/// The external command that prints the current track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl TrackCommand {
    /// `playerctl metadata --format "{{artist}} - {{title}}"`
    pub fn playerctl() -> Self {
        Self {
            program: "playerctl".to_string(),
            args: vec![
                "metadata".to_string(),
                "--format".to_string(),
                "{{artist}} - {{title}}".to_string(),
            ],
        }
    }

    /// Run `cmd` through `sh -c`.
    pub fn shell(cmd: &str) -> Self {
        Self { program: "sh".to_string(), args: vec!["-c".to_string(), cmd.to_string()] }
    }

    /// One bounded query; trimmed stdout on success.
    pub async fn query(&self, limit: Duration) -> Result<String, MetadataQueryError> {
        let child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(limit, child).await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => {
                return Err(MetadataQueryError::Spawn { program: self.program.clone(), source })
            }
            Err(_) => {
                return Err(MetadataQueryError::Timeout { program: self.program.clone(), limit })
            }
        };

        if !output.status.success() {
            return Err(MetadataQueryError::Status {
                program: self.program.clone(),
                status: output.status,
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl Default for TrackCommand {
    fn default() -> Self {
        Self::playerctl()
    }
}

/// Displayed text plus when it was last refreshed.
#[derive(Debug, Clone)]
pub struct TrackText {
    pub text: String,
    pub refreshed: Option<Instant>,
}

/// Caches the now-playing line and refreshes it at most every [`POLL_INTERVAL`].
///
/// Failures never escape: they become [`ERROR_TEXT`] on the panel.
pub struct TrackInfoPoller {
    command: TrackCommand,
    interval: Duration,
    limit: Duration,
    current: TrackText,
}

impl TrackInfoPoller {
    pub fn new(command: TrackCommand) -> Self {
        Self {
            command,
            interval: POLL_INTERVAL,
            limit: QUERY_TIMEOUT,
            current: TrackText { text: LOADING_TEXT.to_string(), refreshed: None },
        }
    }

    pub fn with_timing(mut self, interval: Duration, limit: Duration) -> Self {
        self.interval = interval;
        self.limit = limit;
        self
    }

    pub fn text(&self) -> &str {
        &self.current.text
    }

    pub fn last_refresh(&self) -> Option<Instant> {
        self.current.refreshed
    }

    pub async fn poll(&mut self) -> &str {
        self.poll_at(Instant::now()).await
    }

    /// Refresh if the interval has elapsed as of `now`, then return the cached text.
    pub async fn poll_at(&mut self, now: Instant) -> &str {
        let due = match self.current.refreshed {
            None => true,
            Some(last) => now.saturating_duration_since(last) > self.interval,
        };
        if due {
            let text = match self.command.query(self.limit).await {
                Ok(s) if !s.is_empty() => s,
                Ok(_) => NO_MEDIA_TEXT.to_string(),
                Err(e) => {
                    debug!("track query failed: {}", e);
                    ERROR_TEXT.to_string()
                }
            };
            if text != self.current.text {
                info!("now playing: {}", text);
            }
            self.current = TrackText { text, refreshed: Some(now) };
        }
        &self.current.text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_output_is_cached_verbatim() {
        let mut poller = TrackInfoPoller::new(TrackCommand::shell("echo 'Daft Punk - Veridis Quo'"));
        assert_eq!(poller.text(), LOADING_TEXT);
        assert_eq!(poller.poll().await, "Daft Punk - Veridis Quo");
        assert!(poller.last_refresh().is_some());
    }

    #[tokio::test]
    async fn test_empty_output_means_no_media() {
        let mut poller = TrackInfoPoller::new(TrackCommand::shell("printf ''"));
        assert_eq!(poller.poll().await, NO_MEDIA_TEXT);
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_error_text() {
        let mut poller = TrackInfoPoller::new(TrackCommand::shell("echo partial; exit 3"));
        let started = Instant::now();
        assert_eq!(poller.poll().await, ERROR_TEXT);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_missing_program_is_error_text() {
        let cmd = TrackCommand { program: "/nonexistent/playerctl".into(), args: vec![] };
        let mut poller = TrackInfoPoller::new(cmd);
        assert_eq!(poller.poll().await, ERROR_TEXT);
    }

    #[tokio::test]
    async fn test_hung_command_times_out() {
        let mut poller = TrackInfoPoller::new(TrackCommand::shell("sleep 10"))
            .with_timing(POLL_INTERVAL, Duration::from_millis(200));
        let started = Instant::now();
        assert_eq!(poller.poll().await, ERROR_TEXT);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_debounce() {
        let dir = tempfile::tempdir().unwrap();
        let counter = dir.path().join("count");
        let cmd = format!("echo x >> '{}'; echo 'A - B'", counter.display());
        let mut poller = TrackInfoPoller::new(TrackCommand::shell(&cmd));

        let t0 = Instant::now();
        poller.poll_at(t0).await;
        poller.poll_at(t0 + Duration::from_millis(500)).await;
        poller.poll_at(t0 + POLL_INTERVAL).await;
        let runs = || std::fs::read_to_string(&counter).unwrap().lines().count();
        assert_eq!(runs(), 1);

        poller.poll_at(t0 + POLL_INTERVAL + Duration::from_millis(1)).await;
        assert_eq!(runs(), 2);
    }

    #[test]
    fn test_playerctl_default() {
        let cmd = TrackCommand::default();
        assert_eq!(cmd.program, "playerctl");
        assert_eq!(cmd.args, vec!["metadata", "--format", "{{artist}} - {{title}}"]);
    }
}
