//! Bluetooth Module
//!
//! Supplies the poll loop with the devices heard during each scan window.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                    PresenceMonitor                    │
//! │        (one scan per poll cycle, owns the tracker)    │
//! └──────────────────────────┬───────────────────────────┘
//!                            │ DeviceScanner::scan(window)
//!              ┌─────────────┴─────────────┐
//!              ▼                           ▼
//!      ┌──────────────┐           ┌────────────────┐
//!      │  BleScanner  │           │ ReplayScanner  │
//!      │              │           │                │
//!      │ - WinRT adv. │           │ - JSON lines   │
//!      │   watcher    │           │ - dry runs     │
//!      │ (Windows)    │           │ - tests        │
//!      └──────────────┘           └────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`scanner`] - live advertisement watcher (Windows only)
//! - [`replay`] - recorded scan windows read from a file

pub mod replay;
#[cfg(windows)]
pub mod scanner;

use crate::domain::models::ScannedDevice;
use anyhow::Result;
use std::time::Duration;

pub use replay::ReplayScanner;
#[cfg(windows)]
pub use scanner::BleScanner;

/// Source of scan results for the poll loop.
pub trait DeviceScanner {
    /// Listen for `window` and return every advertisement heard.
    ///
    /// `Ok(None)` means the source is exhausted and the loop should stop.
    /// Errors are treated by the caller as "nothing seen this cycle".
    async fn scan(&mut self, window: Duration) -> Result<Option<Vec<ScannedDevice>>>;
}
