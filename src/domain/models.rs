use crate::domain::address::BluetoothAddress;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

/// One poll cycle's reading for the tracked device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    /// Advertisement RSSI in dBm, `None` if the device was not seen this cycle
    pub rssi: Option<i16>,
    pub timestamp: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransitionEvent {
    /// Presence asserted; carries the smoothed RSSI that crossed the enter threshold
    BecamePresent { rssi: f64 },
    BecameAbsent,
}

/// Diagnostic view of the tracker after a cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PresenceSnapshot {
    pub present: bool,
    /// Time since the device was last seen, `None` if it never was
    pub seen_age: Option<Duration>,
    pub smoothed_rssi: Option<f64>,
}

impl fmt::Display for PresenceSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "present={}  seen=", self.present)?;
        match self.seen_age {
            Some(age) => write!(f, "{}s", age.as_secs())?,
            None => write!(f, "never")?,
        }
        match self.smoothed_rssi {
            Some(rssi) => write!(f, "  rssi={}", rssi as i32),
            None => write!(f, "  rssi=none"),
        }
    }
}

/// A device heard during a scan window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScannedDevice {
    #[serde(default = "default_device_name")]
    pub name: String,
    pub address: BluetoothAddress,
    pub signal_strength: i16,
}

pub(crate) fn default_device_name() -> String {
    "Unknown".to_string()
}
