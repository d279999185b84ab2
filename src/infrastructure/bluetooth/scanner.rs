//! BLE Scanner Module
//!
//! Listens for Bluetooth LE advertisements and reports their signal strength.

use crate::domain::address::BluetoothAddress;
use crate::domain::models::ScannedDevice;
use crate::infrastructure::bluetooth::DeviceScanner;
use anyhow::Result;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use windows::Devices::Bluetooth::Advertisement::{
    BluetoothLEAdvertisementReceivedEventArgs, BluetoothLEAdvertisementWatcher,
    BluetoothLEAdvertisementWatcherStatus, BluetoothLEScanningMode,
};
use windows::Foundation::TypedEventHandler;

/// BLE advertisement scanner
///
/// The watcher runs continuously once started; each [`DeviceScanner::scan`]
/// call collects what arrived during its window.
pub struct BleScanner {
    watcher: Option<BluetoothLEAdvertisementWatcher>,
    sender: mpsc::UnboundedSender<ScannedDevice>,
    receiver: mpsc::UnboundedReceiver<ScannedDevice>,
}

impl BleScanner {
    /// Create a new scanner
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            watcher: None,
            sender,
            receiver,
        }
    }

    /// Start the advertisement watcher in active mode
    pub fn start(&mut self) -> Result<()> {
        // Stop any existing watcher
        self.stop()?;

        info!("Starting BLE advertisement watcher");

        let watcher = BluetoothLEAdvertisementWatcher::new()?;
        watcher.SetScanningMode(BluetoothLEScanningMode::Active)?;

        let sender = self.sender.clone();
        let handler = TypedEventHandler::new(
            move |_: windows::core::Ref<BluetoothLEAdvertisementWatcher>,
                  args: windows::core::Ref<BluetoothLEAdvertisementReceivedEventArgs>| {
                if let Some(args) = args.as_ref() {
                    let name = args.Advertisement()?.LocalName()?.to_string();
                    let address = args.BluetoothAddress()?;
                    let rssi = args.RawSignalStrengthInDBm()?;

                    let device = ScannedDevice {
                        name: if name.is_empty() {
                            "Unknown".to_string()
                        } else {
                            name
                        },
                        address: BluetoothAddress::from_raw(address),
                        signal_strength: rssi,
                    };

                    let _ = sender.send(device);
                }
                Ok(())
            },
        );

        watcher.Received(&handler)?;
        watcher.Start()?;
        self.watcher = Some(watcher);

        Ok(())
    }

    /// Stop the watcher
    pub fn stop(&mut self) -> Result<()> {
        if let Some(watcher) = self.watcher.take() {
            info!("Stopping BLE advertisement watcher");
            watcher.Stop()?;
        }
        Ok(())
    }

    /// Start the watcher, or recreate it if the radio stopped or aborted it
    fn ensure_running(&mut self) -> Result<()> {
        let status = match &self.watcher {
            Some(watcher) => watcher.Status()?,
            None => return self.start(),
        };
        if needs_restart(status) {
            warn!("Advertisement watcher is {:?}, restarting it", status);
            // A stopped or aborted watcher cannot be stopped again
            self.watcher = None;
            self.start()?;
        }
        Ok(())
    }
}

/// Anything but `Started` means no more advertisements will arrive.
fn needs_restart(status: BluetoothLEAdvertisementWatcherStatus) -> bool {
    status != BluetoothLEAdvertisementWatcherStatus::Started
}

impl DeviceScanner for BleScanner {
    async fn scan(&mut self, window: Duration) -> Result<Option<Vec<ScannedDevice>>> {
        self.ensure_running()?;

        // Only advertisements heard inside this window count
        while self.receiver.try_recv().is_ok() {}

        tokio::time::sleep(window).await;

        let mut devices = Vec::new();
        while let Ok(device) = self.receiver.try_recv() {
            devices.push(device);
        }
        debug!("Heard {} advertisements", devices.len());

        Ok(Some(devices))
    }
}

impl Drop for BleScanner {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_started_watcher_is_kept() {
        assert!(!needs_restart(BluetoothLEAdvertisementWatcherStatus::Started));
        assert!(needs_restart(BluetoothLEAdvertisementWatcherStatus::Stopped));
        assert!(needs_restart(BluetoothLEAdvertisementWatcherStatus::Aborted));
        assert!(needs_restart(BluetoothLEAdvertisementWatcherStatus::Stopping));
        assert!(needs_restart(BluetoothLEAdvertisementWatcherStatus::Created));
    }
}
