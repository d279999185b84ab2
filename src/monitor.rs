//! Presence Monitor
//!
//! The poll loop: one scan per cycle, one observation per scan, and at most
//! one action per observation, in emission order.

use crate::domain::address::BluetoothAddress;
use crate::domain::error::ConfigError;
use crate::domain::models::{Observation, PresenceSnapshot, ScannedDevice, TransitionEvent};
use crate::domain::presence::{PresenceConfig, PresenceTracker};
use crate::infrastructure::actions::PresenceAction;
use crate::infrastructure::bluetooth::DeviceScanner;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub target: BluetoothAddress,
    pub presence: PresenceConfig,
    /// How long each scan listens for advertisements
    pub scan_window: Duration,
    /// Pause between the end of one scan and the start of the next
    pub poll_interval: Duration,
}

/// What a finished run did.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorSummary {
    pub cycles: u64,
    pub entered: u64,
    pub exited: u64,
    pub final_state: PresenceSnapshot,
}

pub struct PresenceMonitor<S> {
    target: BluetoothAddress,
    tracker: PresenceTracker,
    scanner: S,
    action: Box<dyn PresenceAction + Send>,
    scan_window: Duration,
    poll_interval: Duration,
}

impl<S: DeviceScanner> PresenceMonitor<S> {
    pub fn new(
        config: MonitorConfig,
        scanner: S,
        action: Box<dyn PresenceAction + Send>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            target: config.target,
            tracker: PresenceTracker::new(config.presence)?,
            scanner,
            action,
            scan_window: config.scan_window,
            poll_interval: config.poll_interval,
        })
    }

    /// Poll until `shutdown` resolves or the scanner is exhausted.
    ///
    /// Pending debounce state is dropped on return.
    pub async fn run<F: Future<Output = ()>>(mut self, shutdown: F) -> MonitorSummary {
        tokio::pin!(shutdown);

        info!("Tracking {}", self.target);
        let mut cycles = 0;
        let mut entered = 0;
        let mut exited = 0;

        loop {
            let scanned = tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                scanned = self.scanner.scan(self.scan_window) => scanned,
            };

            let rssi = match scanned {
                Ok(Some(devices)) => reading_for(&devices, self.target),
                Ok(None) => {
                    info!("Scanner exhausted, stopping");
                    break;
                }
                Err(e) => {
                    warn!("Scan failed, treating as not seen: {:#}", e);
                    None
                }
            };

            let now = Instant::now().into_std();
            cycles += 1;
            match self.tracker.observe(Observation { rssi, timestamp: now }) {
                Some(event @ TransitionEvent::BecamePresent { .. }) => {
                    entered += 1;
                    self.dispatch(event);
                }
                Some(event @ TransitionEvent::BecameAbsent) => {
                    exited += 1;
                    self.dispatch(event);
                }
                None => {}
            }
            debug!("{}", self.tracker.snapshot(now));

            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        MonitorSummary {
            cycles,
            entered,
            exited,
            final_state: self.tracker.snapshot(Instant::now().into_std()),
        }
    }

    fn dispatch(&mut self, event: TransitionEvent) {
        let result = match event {
            TransitionEvent::BecamePresent { rssi } => {
                info!("{} became present (RSSI={:.1})", self.target, rssi);
                self.action.turn_on(Some(rssi))
            }
            TransitionEvent::BecameAbsent => {
                info!("{} became absent", self.target);
                self.action.turn_off()
            }
        };
        if let Err(e) = result {
            error!("Presence action failed: {:#}", e);
        }
    }
}

/// Strongest reading of `target` among the scanned devices.
pub fn reading_for(devices: &[ScannedDevice], target: BluetoothAddress) -> Option<i16> {
    devices
        .iter()
        .filter(|device| device.address == target)
        .map(|device| device.signal_strength)
        .max()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::bluetooth::ReplayScanner;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    const PHONE: &str = "30:BB:7D:4C:3E:5C";

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        On(Option<f64>),
        Off,
    }

    #[derive(Clone, Default)]
    struct RecordingAction {
        calls: Arc<Mutex<Vec<Call>>>,
        fail: bool,
    }

    impl PresenceAction for RecordingAction {
        fn turn_on(&mut self, rssi: Option<f64>) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push(Call::On(rssi));
            if self.fail {
                anyhow::bail!("relay unreachable");
            }
            Ok(())
        }

        fn turn_off(&mut self) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push(Call::Off);
            if self.fail {
                anyhow::bail!("relay unreachable");
            }
            Ok(())
        }
    }

    /// Hands out a fixed script of scan results, then reports exhaustion.
    struct ScriptedScanner {
        script: VecDeque<anyhow::Result<Vec<ScannedDevice>>>,
    }

    impl DeviceScanner for ScriptedScanner {
        async fn scan(&mut self, window: Duration) -> anyhow::Result<Option<Vec<ScannedDevice>>> {
            tokio::time::sleep(window).await;
            match self.script.pop_front() {
                Some(result) => result.map(Some),
                None => Ok(None),
            }
        }
    }

    fn phone(rssi: i16) -> ScannedDevice {
        ScannedDevice {
            name: "Pixel".to_string(),
            address: PHONE.parse().unwrap(),
            signal_strength: rssi,
        }
    }

    fn stranger(rssi: i16) -> ScannedDevice {
        ScannedDevice {
            name: "Speaker".to_string(),
            address: "AA:BB:CC:DD:EE:FF".parse().unwrap(),
            signal_strength: rssi,
        }
    }

    fn config() -> MonitorConfig {
        MonitorConfig {
            target: PHONE.parse().unwrap(),
            presence: PresenceConfig::default(),
            scan_window: Duration::from_secs(1),
            poll_interval: Duration::from_millis(200),
        }
    }

    #[test]
    fn test_reading_picks_strongest_target_sample() {
        let target = PHONE.parse().unwrap();
        let devices = vec![phone(-80), stranger(-30), phone(-72)];
        assert_eq!(reading_for(&devices, target), Some(-72));
        assert_eq!(reading_for(&[stranger(-30)], target), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_replay_enter_then_leave() {
        // Cycles complete every 1.2s; the phone is heard in the first three
        let mut replay = String::new();
        for _ in 0..3 {
            replay.push_str(r#"[{"address":"30:bb:7d:4c:3e:5c","signal_strength":-60}]"#);
            replay.push('\n');
        }
        for _ in 0..12 {
            replay.push_str("[]\n");
        }

        let action = RecordingAction::default();
        let calls = action.calls.clone();
        let scanner = ReplayScanner::new(std::io::Cursor::new(replay.into_bytes()));
        let monitor = PresenceMonitor::new(config(), scanner, Box::new(action)).unwrap();

        let summary = monitor.run(std::future::pending()).await;

        assert_eq!(summary.cycles, 15);
        assert_eq!(summary.entered, 1);
        assert_eq!(summary.exited, 1);
        assert!(!summary.final_state.present);
        assert_eq!(summary.final_state.smoothed_rssi, Some(-60.0));
        assert_eq!(
            *calls.lock().unwrap(),
            vec![Call::On(Some(-60.0)), Call::Off]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_errors_count_as_not_seen() {
        let mut script: VecDeque<anyhow::Result<Vec<ScannedDevice>>> = VecDeque::new();
        script.push_back(Ok(vec![stranger(-40), phone(-65)]));
        for _ in 0..12 {
            script.push_back(Err(anyhow::anyhow!("adapter unavailable")));
        }

        let action = RecordingAction::default();
        let calls = action.calls.clone();
        let monitor =
            PresenceMonitor::new(config(), ScriptedScanner { script }, Box::new(action)).unwrap();

        let summary = monitor.run(std::future::pending()).await;

        // Last seen on cycle 0; cycle 9 is the first more than 10s later
        assert_eq!(summary.cycles, 13);
        assert_eq!(
            *calls.lock().unwrap(),
            vec![Call::On(Some(-65.0)), Call::Off]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_loop() {
        let script = (0..100).map(|_| Ok(vec![phone(-50)])).collect();
        let action = RecordingAction::default();
        let calls = action.calls.clone();
        let monitor =
            PresenceMonitor::new(config(), ScriptedScanner { script }, Box::new(action)).unwrap();

        let summary = monitor
            .run(tokio::time::sleep(Duration::from_secs(5)))
            .await;

        // Scans finish at 1.0s, 2.2s, 3.4s and 4.6s; the fifth is cut short
        assert_eq!(summary.cycles, 4);
        assert_eq!(summary.entered, 1);
        assert!(summary.final_state.present);
        assert_eq!(*calls.lock().unwrap(), vec![Call::On(Some(-50.0))]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_action_does_not_stop_tracking() {
        let mut script: VecDeque<anyhow::Result<Vec<ScannedDevice>>> = VecDeque::new();
        script.push_back(Ok(vec![phone(-60)]));
        for _ in 0..12 {
            script.push_back(Ok(vec![]));
        }
        script.push_back(Ok(vec![phone(-60)]));

        let action = RecordingAction {
            fail: true,
            ..RecordingAction::default()
        };
        let calls = action.calls.clone();
        let monitor =
            PresenceMonitor::new(config(), ScriptedScanner { script }, Box::new(action)).unwrap();

        let summary = monitor.run(std::future::pending()).await;

        assert_eq!(summary.entered, 2);
        assert_eq!(summary.exited, 1);
        assert_eq!(
            *calls.lock().unwrap(),
            vec![Call::On(Some(-60.0)), Call::Off, Call::On(Some(-60.0))]
        );
    }

    #[cfg(unix)]
    #[tokio::test(start_paused = true)]
    async fn test_slow_command_does_not_hold_up_loop() {
        use crate::infrastructure::actions::CommandAction;

        let script = (0..100).map(|_| Ok(vec![phone(-50)])).collect();
        let action = CommandAction::spawn(
            &["sleep".to_string(), "4".to_string()],
            &["true".to_string()],
            Duration::from_secs(30),
        )
        .unwrap();
        let config = MonitorConfig {
            scan_window: Duration::from_millis(100),
            poll_interval: Duration::from_millis(100),
            ..config()
        };
        let monitor =
            PresenceMonitor::new(config, ScriptedScanner { script }, Box::new(action)).unwrap();

        let started = std::time::Instant::now();
        let summary = monitor
            .run(tokio::time::sleep(Duration::from_millis(550)))
            .await;

        // ON fires on the first cycle; scans keep finishing at 300ms and 500ms
        // while it sleeps, and shutdown does not wait for it
        assert_eq!(summary.entered, 1);
        assert_eq!(summary.cycles, 3);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_rejects_misconfiguration() {
        let mut bad = config();
        bad.presence.smoothing_alpha = 2.0;
        let scanner = ScriptedScanner {
            script: VecDeque::new(),
        };
        let result = PresenceMonitor::new(bad, scanner, Box::new(RecordingAction::default()));
        assert!(matches!(result, Err(ConfigError::SmoothingAlpha(_))));
    }
}
