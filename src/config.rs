//! TOML application configuration.
//!
//! Every section is optional and falls back to its defaults, so an empty
//! file (or no file at all) is a valid local setup.
//!
//! ```toml
//! [bus]
//! url = "ws://localhost:9001/bus"
//!
//! [identity]
//! exercise = "demo"
//! team = "team-1"
//! role = "team"
//! variant = "satcom"
//!
//! [reconnect]
//! initial_delay = 1000
//! max_delay = 30000
//!
//! [lifecycle]
//! assume_running = true
//!
//! [logging]
//! level = "info"
//! format = "pretty"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    consts::LOCAL_BUS_URL,
    exercise::{DashboardVariant, LifecycleConfig, SessionConfig},
    logging::LogConfig,
    prelude::*,
    ws::{DashboardRole, ExerciseIdentity, ReconnectionConfig},
    Error,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// WebSocket endpoint of the exercise bus
    pub url: String,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            url: LOCAL_BUS_URL.to_string(),
        }
    }
}

/// Who this dashboard is. Fixed for the life of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    pub exercise: String,
    pub team: String,
    pub role: DashboardRole,
    pub variant: DashboardVariant,
    /// Follow the turn-based status topic
    pub include_status: bool,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            exercise: "demo".to_string(),
            team: "team-1".to_string(),
            role: DashboardRole::default(),
            variant: DashboardVariant::default(),
            include_status: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub bus: BusConfig,
    pub identity: IdentityConfig,
    pub reconnect: ReconnectionConfig,
    pub lifecycle: LifecycleConfig,
    pub logging: LogConfig,
}

impl AppConfig {
    /// Load from `path`, or defaults if the file does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
            .map_err(|e| Error::config(format!("{}: {e}", path.display())))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::config(e.to_string()))
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::config(e.to_string()))
    }

    /// Reject settings a session cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !(self.bus.url.starts_with("ws://") || self.bus.url.starts_with("wss://")) {
            return Err(Error::config(format!(
                "bus.url must be a ws:// or wss:// URL, got '{}'",
                self.bus.url
            )));
        }
        for (field, value) in [
            ("identity.exercise", &self.identity.exercise),
            ("identity.team", &self.identity.team),
        ] {
            if value.trim().is_empty() {
                return Err(Error::config(format!("{field} must not be empty")));
            }
            if value.contains('/') {
                return Err(Error::config(format!(
                    "{field} must not contain '/', got '{value}'"
                )));
            }
        }

        let reconnect = &self.reconnect;
        if reconnect.backoff_multiplier < 1.0 {
            return Err(Error::config(format!(
                "reconnect.backoff_multiplier must be >= 1.0, got {}",
                reconnect.backoff_multiplier
            )));
        }
        if !(0.0..=1.0).contains(&reconnect.jitter_factor) {
            return Err(Error::config(format!(
                "reconnect.jitter_factor must be within 0.0..=1.0, got {}",
                reconnect.jitter_factor
            )));
        }
        if reconnect.initial_delay.is_zero() {
            return Err(Error::config("reconnect.initial_delay must be greater than zero"));
        }
        if reconnect.initial_delay > reconnect.max_delay {
            return Err(Error::config(
                "reconnect.initial_delay must not exceed reconnect.max_delay",
            ));
        }
        Ok(())
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            url: self.bus.url.clone(),
            identity: ExerciseIdentity::new(&self.identity.exercise, &self.identity.team),
            role: self.identity.role,
            variant: self.identity.variant,
            include_status: self.identity.include_status,
            reconnect: self.reconnect.clone(),
            lifecycle: self.lifecycle.clone(),
        }
    }
}
