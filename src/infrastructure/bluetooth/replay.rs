//! Replay Scanner
//!
//! Plays back recorded scan windows, one per line:
//!
//! ```text
//! # comments and blank lines are skipped
//! [{"address": "30:BB:7D:4C:3E:5C", "name": "Pixel", "signal_strength": -61}]
//! []
//! ```
//!
//! Each line is a JSON array of the devices heard in that window; `[]` means
//! nothing was heard.

use crate::domain::models::ScannedDevice;
use crate::infrastructure::bluetooth::DeviceScanner;
use anyhow::{Context, Result};
use std::path::Path;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines};
use tracing::info;

pub struct ReplayScanner<R> {
    lines: Lines<BufReader<R>>,
    line_number: usize,
}

impl ReplayScanner<File> {
    pub async fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .await
            .with_context(|| format!("Failed to open replay file {}", path.display()))?;
        info!("Replaying scans from {}", path.display());
        Ok(Self::new(file))
    }
}

impl<R: AsyncRead + Unpin> ReplayScanner<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: BufReader::new(reader).lines(),
            line_number: 0,
        }
    }

    async fn next_window(&mut self) -> Result<Option<Vec<ScannedDevice>>> {
        while let Some(line) = self.lines.next_line().await? {
            self.line_number += 1;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let devices = serde_json::from_str(line)
                .with_context(|| format!("Invalid replay line {}", self.line_number))?;
            return Ok(Some(devices));
        }
        Ok(None)
    }
}

impl<R: AsyncRead + Unpin> DeviceScanner for ReplayScanner<R> {
    async fn scan(&mut self, window: Duration) -> Result<Option<Vec<ScannedDevice>>> {
        tokio::time::sleep(window).await;
        self.next_window().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_replays_windows_in_order() {
        let data = b"# recorded\n\
            [{\"address\":\"30:BB:7D:4C:3E:5C\",\"signal_strength\":-61}]\n\
            \n\
            []\n" as &[u8];
        let mut scanner = ReplayScanner::new(data);
        let window = Duration::from_secs(1);

        let first = scanner.scan(window).await.unwrap().unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].signal_strength, -61);
        assert_eq!(first[0].name, "Unknown");

        let second = scanner.scan(window).await.unwrap().unwrap();
        assert!(second.is_empty());

        assert!(scanner.scan(window).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_waits_for_window() {
        let mut scanner = ReplayScanner::new(b"[]\n" as &[u8]);
        let start = tokio::time::Instant::now();
        scanner.scan(Duration::from_millis(1500)).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reports_bad_line_number() {
        let mut scanner = ReplayScanner::new(b"[]\n{oops\n" as &[u8]);
        let window = Duration::from_millis(10);

        scanner.scan(window).await.unwrap();
        let err = scanner.scan(window).await.unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }
}
