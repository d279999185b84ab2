use thiserror::Error;

/// Rejected presence configuration.
///
/// Raised when building a [`PresenceConfig`](crate::domain::presence::PresenceConfig)
/// so that a bad tuning fails at startup instead of oscillating at runtime.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("exit threshold ({exit} dBm) must be below enter threshold ({enter} dBm)")]
    ThresholdOrder { enter: f64, exit: f64 },

    #[error("smoothing alpha must be in (0, 1], got {0}")]
    SmoothingAlpha(f64),

    #[error("{name} must be a finite number, got {value}")]
    NonFinite { name: &'static str, value: f64 },

    #[error("{name} must be a non-negative number of seconds, got {value}")]
    InvalidDuration { name: &'static str, value: f64 },

    #[error("seen timeout must be greater than zero")]
    ZeroSeenTimeout,

    #[error("seen timeout ({seen_timeout}s) must not exceed exit debounce ({exit_debounce}s)")]
    SeenTimeoutExceedsDebounce { seen_timeout: f64, exit_debounce: f64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressParseError {
    #[error("bluetooth address must have 6 octets, got {0}")]
    OctetCount(usize),

    #[error("invalid octet '{0}' in bluetooth address")]
    InvalidOctet(String),
}
