//! Presence Inference
//!
//! Reconciles noisy, intermittently missing RSSI readings for a single device
//! into a stable present/absent signal.
//!
//! ```text
//!                 fresh sighting && smoothed > enter
//!        Absent ─────────────────────────────────────► Present
//!          ▲                                             │
//!          │   unseen for > exit_debounce                │
//!          ├─────────────────────────────────────────────┤
//!          │   smoothed < exit held for > exit_debounce  │
//!          └─────────────────────────────────────────────┘
//! ```
//!
//! The two thresholds give hysteresis: while the smoothed RSSI sits between
//! them nothing changes. A weak-signal exit only fires after the signal stays
//! weak for the whole debounce window; any recovery restarts the window.

use crate::domain::error::ConfigError;
use crate::domain::models::{Observation, PresenceSnapshot, TransitionEvent};
use std::time::{Duration, Instant};
use tracing::debug;

/// Tuning for a [`PresenceTracker`].
#[derive(Debug, Clone, PartialEq)]
pub struct PresenceConfig {
    /// Smoothed RSSI (dBm) above which presence is asserted
    pub enter_rssi_threshold: f64,
    /// Smoothed RSSI (dBm) below which a weak-signal exit is considered
    pub exit_rssi_threshold: f64,
    /// How long the signal must stay weak, or the device unseen, before exiting
    pub exit_debounce: Duration,
    /// Maximum age of the last sighting that still counts as visible for entering
    pub seen_timeout: Duration,
    /// EMA weight given to each new sample, in (0, 1]
    pub smoothing_alpha: f64,
    /// Exit as soon as the device has been unseen longer than `exit_debounce`.
    /// When off, only the weak-signal path can exit.
    pub disappearance_exit: bool,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            enter_rssi_threshold: -85.0,
            exit_rssi_threshold: -88.0,
            exit_debounce: Duration::from_secs(10),
            seen_timeout: Duration::from_secs(2),
            smoothing_alpha: 0.3,
            disappearance_exit: true,
        }
    }
}

impl PresenceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("enter_rssi_threshold", self.enter_rssi_threshold),
            ("exit_rssi_threshold", self.exit_rssi_threshold),
            ("smoothing_alpha", self.smoothing_alpha),
        ] {
            if !value.is_finite() {
                return Err(ConfigError::NonFinite { name, value });
            }
        }

        if self.exit_rssi_threshold >= self.enter_rssi_threshold {
            return Err(ConfigError::ThresholdOrder {
                enter: self.enter_rssi_threshold,
                exit: self.exit_rssi_threshold,
            });
        }

        if self.smoothing_alpha <= 0.0 || self.smoothing_alpha > 1.0 {
            return Err(ConfigError::SmoothingAlpha(self.smoothing_alpha));
        }

        if self.seen_timeout.is_zero() {
            return Err(ConfigError::ZeroSeenTimeout);
        }

        // A sighting old enough to force an exit must not still count as fresh
        if self.disappearance_exit && self.seen_timeout > self.exit_debounce {
            return Err(ConfigError::SeenTimeoutExceedsDebounce {
                seen_timeout: self.seen_timeout.as_secs_f64(),
                exit_debounce: self.exit_debounce.as_secs_f64(),
            });
        }

        Ok(())
    }
}

/// Debounced presence state machine for one tracked device.
///
/// Pure with respect to time: every decision uses the timestamps carried by
/// the observations, so a scripted sequence always replays identically.
#[derive(Debug, Clone)]
pub struct PresenceTracker {
    config: PresenceConfig,

    // Exponentially smoothed RSSI, never reset once the device was seen
    smoothed_rssi: Option<f64>,
    last_seen_at: Option<Instant>,
    present: bool,

    // Start of the current weak-signal window; always None while absent
    exit_candidate_since: Option<Instant>,
}

impl PresenceTracker {
    /// Create a tracker, rejecting configurations that would oscillate.
    pub fn new(config: PresenceConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            smoothed_rssi: None,
            last_seen_at: None,
            present: false,
            exit_candidate_since: None,
        })
    }

    /// Feed one poll cycle and return the transition it caused, if any.
    pub fn observe(&mut self, obs: Observation) -> Option<TransitionEvent> {
        if let Some(rssi) = obs.rssi {
            self.record_sighting(f64::from(rssi), obs.timestamp);
        }

        let seen_age = self.seen_age(obs.timestamp);

        if self.present {
            self.evaluate_exit(obs.timestamp, seen_age)
        } else {
            self.evaluate_enter(seen_age)
        }
    }

    /// Diagnostic view as of `now`.
    pub fn snapshot(&self, now: Instant) -> PresenceSnapshot {
        PresenceSnapshot {
            present: self.present,
            seen_age: self.seen_age(now),
            smoothed_rssi: self.smoothed_rssi,
        }
    }

    fn record_sighting(&mut self, rssi: f64, at: Instant) {
        let alpha = self.config.smoothing_alpha;
        self.last_seen_at = Some(at);
        self.smoothed_rssi = Some(match self.smoothed_rssi {
            None => rssi,
            Some(previous) => previous * (1.0 - alpha) + rssi * alpha,
        });
    }

    /// `None` means the device was never seen (infinitely old).
    fn seen_age(&self, now: Instant) -> Option<Duration> {
        self.last_seen_at.map(|seen| now.saturating_duration_since(seen))
    }

    fn evaluate_enter(&mut self, seen_age: Option<Duration>) -> Option<TransitionEvent> {
        let fresh = matches!(seen_age, Some(age) if age < self.config.seen_timeout);
        match self.smoothed_rssi {
            Some(rssi) if fresh && rssi > self.config.enter_rssi_threshold => {
                self.present = true;
                self.exit_candidate_since = None;
                Some(TransitionEvent::BecamePresent { rssi })
            }
            _ => None,
        }
    }

    fn evaluate_exit(
        &mut self,
        now: Instant,
        seen_age: Option<Duration>,
    ) -> Option<TransitionEvent> {
        let disappeared = seen_age.map_or(true, |age| age > self.config.exit_debounce);
        if self.config.disappearance_exit && disappeared {
            return Some(self.become_absent());
        }

        let weak = matches!(
            self.smoothed_rssi,
            Some(rssi) if rssi < self.config.exit_rssi_threshold
        );
        if !weak {
            if self.exit_candidate_since.take().is_some() {
                debug!("Signal recovered, exit debounce cancelled");
            }
            return None;
        }

        match self.exit_candidate_since {
            None => {
                debug!("Signal weak, exit debounce started");
                self.exit_candidate_since = Some(now);
                None
            }
            Some(since) if now.saturating_duration_since(since) > self.config.exit_debounce => {
                Some(self.become_absent())
            }
            Some(_) => None,
        }
    }

    fn become_absent(&mut self) -> TransitionEvent {
        self.present = false;
        self.exit_candidate_since = None;
        TransitionEvent::BecameAbsent
    }
}
