//! Bus reconnection policy and connection state.
//!
//! Provides:
//! - **Exponential Backoff**: increasing delays between reconnection attempts
//! - **Jitter**: variation so a fleet of dashboards does not reconnect in lockstep
//! - **Keepalive**: ping interval and optional idle timeout
//!
//! There is deliberately no retry limit: a dashboard keeps trying for as long
//! as its session is open.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for bus reconnection behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectionConfig {
    /// Initial delay before first reconnection attempt (default: 1s)
    #[serde(with = "duration_millis")]
    pub initial_delay: Duration,
    /// Maximum delay between reconnection attempts (default: 30s)
    #[serde(with = "duration_millis")]
    pub max_delay: Duration,
    /// Backoff multiplier (default: 2.0)
    pub backoff_multiplier: f64,
    /// Jitter factor (0.0-1.0, default: 0.2 = ±10% around the base delay)
    pub jitter_factor: f64,
    /// Interval between transport keepalive pings (default: 30s)
    #[serde(with = "duration_millis")]
    pub ping_interval: Duration,
    /// Treat the connection as lost if nothing arrives for this long (default: off)
    #[serde(with = "option_duration_millis")]
    pub idle_timeout: Option<Duration>,
}

impl Default for ReconnectionConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter_factor: 0.2,
            ping_interval: Duration::from_secs(30),
            idle_timeout: None,
        }
    }
}

impl ReconnectionConfig {
    /// Delay before reconnection attempt `attempt` (0-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        calculate_backoff_delay(
            attempt,
            self.initial_delay,
            self.max_delay,
            self.backoff_multiplier,
            self.jitter_factor,
        )
    }
}

/// Bus connection state as seen by presentation.
///
/// Transitions are driven only by the connection manager. A lost connection
/// always goes to `Reconnecting`; `Disconnected` means the session closed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// First connection attempt in progress
    #[default]
    Connecting,
    /// Connected and subscribed
    Connected,
    /// Lost (or never established); retrying with backoff
    Reconnecting,
    /// Closed by the owner; no further attempts
    Disconnected,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        self == ConnectionState::Connected
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Reconnecting => write!(f, "reconnecting"),
            ConnectionState::Disconnected => write!(f, "disconnected"),
        }
    }
}

/// Calculate exponential backoff delay with jitter.
///
/// # Arguments
/// - `attempt`: Current attempt number (0-based)
/// - `initial`: Initial delay
/// - `max`: Maximum delay cap
/// - `multiplier`: Backoff multiplier (typically 2.0)
/// - `jitter`: Jitter factor (0.0-1.0, e.g., 0.2 for ±10%)
pub fn calculate_backoff_delay(
    attempt: u32,
    initial: Duration,
    max: Duration,
    multiplier: f64,
    jitter: f64,
) -> Duration {
    // Clamp the exponent; the cap is reached long before this matters
    let exponent = attempt.min(32) as i32;
    let base_secs = initial.as_secs_f64() * multiplier.powi(exponent);
    let capped_secs = base_secs.min(max.as_secs_f64());

    // Deterministic alternation keeps tests reproducible
    let jitter_factor = if attempt % 2 == 0 {
        1.0 + jitter * 0.5
    } else {
        1.0 - jitter * 0.5
    };
    let jittered_secs = capped_secs * jitter_factor;

    Duration::from_secs_f64(jittered_secs.max(0.0))
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

mod option_duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        // TOML has no null; zero means "off"
        s.serialize_u64(d.map(|d| d.as_millis() as u64).unwrap_or(0))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<Option<Duration>, D::Error> {
        let millis = u64::deserialize(d)?;
        Ok((millis > 0).then(|| Duration::from_millis(millis)))
    }
}
