//! Derived domain entities built up by the command fold engine.
//!
//! Presentation code only ever reads these. They are created on the first
//! command that addresses them, updated in place by later commands with the
//! same key, and never removed during a session.

use serde::{Deserialize, Serialize};

/// Link status of one satellite, keyed by `name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SatelliteStatus {
    pub name: String,
    pub status: String,
    /// Signal strength, 0-100
    pub signal_strength: f64,
    /// Downlink frequency in MHz
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orbit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elevation: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub azimuth: Option<f64>,
    pub jammed: bool,
    /// Exercise time of the last command that touched this satellite
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_update: Option<f64>,
}

impl SatelliteStatus {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: "operational".to_string(),
            signal_strength: 100.0,
            frequency: None,
            orbit: None,
            elevation: None,
            azimuth: None,
            jammed: false,
            last_update: None,
        }
    }
}

/// Ground station, keyed by `name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroundStation {
    pub name: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_quality: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected_satellite: Option<String>,
}

impl GroundStation {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: "online".to_string(),
            location: None,
            link_quality: None,
            connected_satellite: None,
        }
    }
}

/// One sample of the signal-strength time series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalHistoryPoint {
    /// Exercise time in seconds
    pub time: f64,
    pub strength: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub satellite: Option<String>,
}

/// One bar of the RF spectrum display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpectrumBar {
    /// Centre frequency in MHz
    pub frequency: f64,
    /// Power in dBm
    pub power: f64,
    pub interference: bool,
}

/// RF spectrum table with the noise floor it was built around.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Spectrum {
    /// Baseline power in dBm for bars without interference
    pub noise_floor: f64,
    /// Ascending by frequency
    pub bars: Vec<SpectrumBar>,
}

/// Current threat classification. Every field is merged independently.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreatData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threat_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threat_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Current emitter geolocation fix.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeolocationData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    /// Radius of uncertainty in metres
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Deployed countermeasure, keyed by `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Countermeasure {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effectiveness: Option<f64>,
}

impl Countermeasure {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            kind: None,
            status: "active".to_string(),
            target: None,
            effectiveness: None,
        }
    }
}
