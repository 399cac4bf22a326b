//! Satellite communications commands.

use super::{push_signal_sample, upsert, CommandParams, DerivedState, FoldFn};
use crate::types::{GroundStation, SatelliteStatus};

pub(super) const COMMANDS: &[(&str, FoldFn)] = &[
    ("update_satellite_status", update_satellite_status),
    ("satellite_jamming", satellite_jamming),
    ("update_ground_station", update_ground_station),
    ("record_signal_strength", record_signal_strength),
];

const SATELLITE_KEYS: &[&str] = &["satellite", "name", "satellite_name", "satelliteName"];
const STRENGTH_KEYS: &[&str] = &["signal_strength", "signalStrength"];

fn strength(value: f64) -> f64 {
    value.clamp(0.0, 100.0)
}

pub(super) fn update_satellite_status(state: &mut DerivedState, params: &CommandParams<'_>) {
    let Some(name) = params.str(SATELLITE_KEYS) else {
        return;
    };
    let time = params.time();
    let signal = params.f64(STRENGTH_KEYS).map(strength);

    let satellite = upsert(
        &mut state.satellites,
        |s| s.name == name,
        || SatelliteStatus::new(name.as_str()),
    );
    if let Some(status) = params.str(&["status"]) {
        satellite.status = status;
    }
    if let Some(signal) = signal {
        satellite.signal_strength = signal;
    }
    if let Some(frequency) = params.f64(&["frequency"]) {
        satellite.frequency = Some(frequency);
    }
    if let Some(orbit) = params.str(&["orbit"]) {
        satellite.orbit = Some(orbit);
    }
    if let Some(elevation) = params.f64(&["elevation"]) {
        satellite.elevation = Some(elevation);
    }
    if let Some(azimuth) = params.f64(&["azimuth"]) {
        satellite.azimuth = Some(azimuth);
    }
    satellite.last_update = Some(time);

    if let Some(signal) = signal {
        push_signal_sample(state, time, signal, Some(name));
    }
}

pub(super) fn satellite_jamming(state: &mut DerivedState, params: &CommandParams<'_>) {
    let Some(name) = params.str(SATELLITE_KEYS) else {
        return;
    };
    let jammed = params.bool(&["jammed", "active", "enabled"]).unwrap_or(true);
    let time = params.time();
    let signal = params.f64(STRENGTH_KEYS).map(strength);

    let satellite = upsert(
        &mut state.satellites,
        |s| s.name == name,
        || SatelliteStatus::new(name.as_str()),
    );
    satellite.jammed = jammed;
    if jammed {
        satellite.status = "jammed".to_string();
    } else if satellite.status == "jammed" {
        satellite.status = "operational".to_string();
    }
    if let Some(signal) = signal {
        satellite.signal_strength = signal;
    }
    satellite.last_update = Some(time);

    if let Some(signal) = signal {
        push_signal_sample(state, time, signal, Some(name));
    }
}

pub(super) fn update_ground_station(state: &mut DerivedState, params: &CommandParams<'_>) {
    let Some(name) = params.str(&["station", "name", "ground_station", "groundStation"]) else {
        return;
    };

    let station = upsert(
        &mut state.ground_stations,
        |g| g.name == name,
        || GroundStation::new(name.as_str()),
    );
    if let Some(status) = params.str(&["status"]) {
        station.status = status;
    }
    if let Some(location) = params.str(&["location"]) {
        station.location = Some(location);
    }
    if let Some(quality) = params.f64(&["link_quality", "linkQuality"]) {
        station.link_quality = Some(quality);
    }
    if let Some(satellite) = params.str(&["connected_satellite", "connectedSatellite", "satellite"])
    {
        station.connected_satellite = Some(satellite);
    }
}

/// Append a sample. A named satellite that already exists also takes the
/// new strength; unknown satellites are not created.
pub(super) fn record_signal_strength(state: &mut DerivedState, params: &CommandParams<'_>) {
    let Some(signal) = params
        .f64(&["strength", "value", "signal_strength", "signalStrength"])
        .map(strength)
    else {
        return;
    };
    let time = params.time();
    let satellite = params.str(SATELLITE_KEYS);

    if let Some(name) = &satellite {
        if let Some(existing) = state.satellites.iter_mut().find(|s| &s.name == name) {
            existing.signal_strength = signal;
            existing.last_update = Some(time);
        }
    }
    push_signal_sample(state, time, signal, satellite);
}

#[cfg(test)]
mod tests {
    use super::super::tests::params;
    use super::*;
    use crate::consts::SIGNAL_HISTORY_LIMIT;
    use serde_json::json;

    fn run(state: &mut DerivedState, fold: FoldFn, value: serde_json::Value, time: f64) {
        let map = params(value);
        fold(state, &CommandParams::new(Some(&map), time));
    }

    #[test]
    fn test_satellite_upsert_keeps_unmentioned_fields() {
        let mut state = DerivedState::default();
        run(
            &mut state,
            update_satellite_status,
            json!({"satellite": "SAT-1", "signal_strength": 42}),
            1.0,
        );
        assert_eq!(state.satellites.len(), 1);
        assert_eq!(state.satellite("SAT-1").unwrap().signal_strength, 42.0);

        run(
            &mut state,
            update_satellite_status,
            json!({"satellite": "SAT-1", "status": "degraded"}),
            2.0,
        );
        let sat = state.satellite("SAT-1").unwrap();
        assert_eq!(state.satellites.len(), 1);
        assert_eq!(sat.status, "degraded");
        assert_eq!(sat.signal_strength, 42.0);
        assert_eq!(sat.last_update, Some(2.0));

        // Only the command with a strength produced a sample
        assert_eq!(state.signal_history.len(), 1);
        assert_eq!(state.signal_history[0].time, 1.0);
    }

    #[test]
    fn test_camel_case_alias_and_clamp() {
        let mut state = DerivedState::default();
        run(
            &mut state,
            update_satellite_status,
            json!({"satelliteName": "SAT-2", "signalStrength": 140, "orbit": "GEO"}),
            0.0,
        );
        let sat = state.satellite("SAT-2").unwrap();
        assert_eq!(sat.signal_strength, 100.0);
        assert_eq!(sat.orbit.as_deref(), Some("GEO"));
    }

    #[test]
    fn test_missing_key_is_noop() {
        let mut state = DerivedState::default();
        run(
            &mut state,
            update_satellite_status,
            json!({"status": "degraded"}),
            0.0,
        );
        run(&mut state, update_ground_station, json!({}), 0.0);
        run(&mut state, record_signal_strength, json!({"satellite": "SAT-1"}), 0.0);
        assert_eq!(state, DerivedState::default());
    }

    #[test]
    fn test_history_keeps_newest_samples() {
        let mut state = DerivedState::default();
        for i in 0..25 {
            run(
                &mut state,
                record_signal_strength,
                json!({"strength": i}),
                i as f64,
            );
        }
        assert_eq!(state.signal_history.len(), SIGNAL_HISTORY_LIMIT);
        assert_eq!(state.signal_history.front().unwrap().strength, 5.0);
        assert_eq!(state.signal_history.back().unwrap().strength, 24.0);
    }

    #[test]
    fn test_time_parameter_overrides_delivery_time() {
        let mut state = DerivedState::default();
        run(
            &mut state,
            record_signal_strength,
            json!({"value": 55, "time": 90}),
            12.0,
        );
        assert_eq!(state.signal_history[0].time, 90.0);
    }

    #[test]
    fn test_record_does_not_create_satellite() {
        let mut state = DerivedState::default();
        run(
            &mut state,
            record_signal_strength,
            json!({"strength": 30, "satellite": "SAT-9"}),
            0.0,
        );
        assert!(state.satellites.is_empty());
        assert_eq!(state.signal_history[0].satellite.as_deref(), Some("SAT-9"));

        run(&mut state, update_satellite_status, json!({"satellite": "SAT-9"}), 1.0);
        run(
            &mut state,
            record_signal_strength,
            json!({"strength": 12, "satellite": "SAT-9"}),
            2.0,
        );
        assert_eq!(state.satellite("SAT-9").unwrap().signal_strength, 12.0);
    }

    #[test]
    fn test_jamming_toggle() {
        let mut state = DerivedState::default();
        run(
            &mut state,
            satellite_jamming,
            json!({"satellite": "SAT-1", "signal_strength": 15}),
            0.0,
        );
        let sat = state.satellite("SAT-1").unwrap();
        assert!(sat.jammed);
        assert_eq!(sat.status, "jammed");
        assert_eq!(sat.signal_strength, 15.0);

        run(
            &mut state,
            satellite_jamming,
            json!({"satellite": "SAT-1", "active": false}),
            1.0,
        );
        let sat = state.satellite("SAT-1").unwrap();
        assert!(!sat.jammed);
        assert_eq!(sat.status, "operational");
        assert_eq!(sat.signal_strength, 15.0);
    }

    #[test]
    fn test_ground_station_upsert() {
        let mut state = DerivedState::default();
        run(
            &mut state,
            update_ground_station,
            json!({"station": "GS-North", "location": "Thule"}),
            0.0,
        );
        run(
            &mut state,
            update_ground_station,
            json!({"name": "GS-North", "status": "offline", "linkQuality": 0.4}),
            1.0,
        );
        assert_eq!(state.ground_stations.len(), 1);
        let gs = state.ground_station("GS-North").unwrap();
        assert_eq!(gs.status, "offline");
        assert_eq!(gs.location.as_deref(), Some("Thule"));
        assert_eq!(gs.link_quality, Some(0.4));
    }
}
