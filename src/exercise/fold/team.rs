//! Team operations commands: threat picture, geolocation, countermeasures.

use super::{upsert, CommandParams, DerivedState, FoldFn};
use crate::types::{Countermeasure, GeolocationData, ThreatData};

pub(super) const COMMANDS: &[(&str, FoldFn)] = &[
    ("update_threat", update_threat),
    ("update_geolocation", update_geolocation),
    ("deploy_countermeasure", deploy_countermeasure),
    ("update_countermeasure", update_countermeasure),
];

fn merge<T>(target: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *target = value;
    }
}

pub(super) fn update_threat(state: &mut DerivedState, params: &CommandParams<'_>) {
    let update = ThreatData {
        threat_id: params.str(&["threat_id", "threatId", "id"]),
        classification: params.str(&["classification"]),
        confidence: params.f64(&["confidence"]),
        source: params.str(&["source"]),
        threat_type: params.str(&["threat_type", "threatType", "type"]),
        severity: params.str(&["severity", "level"]),
        description: params.str(&["description", "details"]),
    };
    if update == ThreatData::default() {
        return;
    }

    let threat = state.threat.get_or_insert_with(ThreatData::default);
    merge(&mut threat.threat_id, update.threat_id);
    merge(&mut threat.classification, update.classification);
    merge(&mut threat.confidence, update.confidence);
    merge(&mut threat.source, update.source);
    merge(&mut threat.threat_type, update.threat_type);
    merge(&mut threat.severity, update.severity);
    merge(&mut threat.description, update.description);
}

pub(super) fn update_geolocation(state: &mut DerivedState, params: &CommandParams<'_>) {
    let update = GeolocationData {
        latitude: params.f64(&["latitude", "lat"]),
        longitude: params.f64(&["longitude", "lon", "lng"]),
        accuracy: params.f64(&["accuracy", "uncertainty"]),
        altitude: params.f64(&["altitude", "alt"]),
        label: params.str(&["label", "name"]),
        source: params.str(&["source"]),
    };
    if update == GeolocationData::default() {
        return;
    }

    let fix = state.geolocation.get_or_insert_with(GeolocationData::default);
    merge(&mut fix.latitude, update.latitude);
    merge(&mut fix.longitude, update.longitude);
    merge(&mut fix.accuracy, update.accuracy);
    merge(&mut fix.altitude, update.altitude);
    merge(&mut fix.label, update.label);
    merge(&mut fix.source, update.source);
}

fn upsert_countermeasure<'a>(
    state: &'a mut DerivedState,
    params: &CommandParams<'_>,
) -> Option<&'a mut Countermeasure> {
    let name = params.str(&["name", "countermeasure"]);
    let id = params
        .str(&["id", "countermeasure_id", "countermeasureId"])
        .or_else(|| name.clone())?;

    let countermeasure = upsert(
        &mut state.countermeasures,
        |c| c.id == id,
        || Countermeasure::new(id.as_str()),
    );
    if let Some(name) = name {
        countermeasure.name = name;
    }
    merge(&mut countermeasure.kind, params.str(&["type", "kind"]));
    merge(&mut countermeasure.target, params.str(&["target"]));
    merge(
        &mut countermeasure.effectiveness,
        params.f64(&["effectiveness"]),
    );
    Some(countermeasure)
}

/// Deploying (re)activates unless an explicit status is given.
pub(super) fn deploy_countermeasure(state: &mut DerivedState, params: &CommandParams<'_>) {
    if let Some(countermeasure) = upsert_countermeasure(state, params) {
        countermeasure.status = params
            .str(&["status"])
            .unwrap_or_else(|| "active".to_string());
    }
}

pub(super) fn update_countermeasure(state: &mut DerivedState, params: &CommandParams<'_>) {
    if let Some(countermeasure) = upsert_countermeasure(state, params) {
        if let Some(status) = params.str(&["status"]) {
            countermeasure.status = status;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::params;
    use super::*;
    use serde_json::json;

    fn run(state: &mut DerivedState, fold: FoldFn, value: serde_json::Value) {
        let map = params(value);
        fold(state, &CommandParams::new(Some(&map), 0.0));
    }

    #[test]
    fn test_threat_partial_merge() {
        let mut state = DerivedState::default();
        run(
            &mut state,
            update_threat,
            json!({"classification": "hostile", "confidence": 0.6}),
        );
        run(
            &mut state,
            update_threat,
            json!({"confidence": 0.9, "threatType": "jammer"}),
        );

        let threat = state.threat.unwrap();
        assert_eq!(threat.classification.as_deref(), Some("hostile"));
        assert_eq!(threat.confidence, Some(0.9));
        assert_eq!(threat.threat_type.as_deref(), Some("jammer"));
        assert!(threat.severity.is_none());
    }

    #[test]
    fn test_irrelevant_parameters_create_nothing() {
        let mut state = DerivedState::default();
        run(&mut state, update_threat, json!({"unrelated": 1}));
        run(&mut state, update_geolocation, json!({}));
        run(&mut state, deploy_countermeasure, json!({"status": "active"}));
        assert_eq!(state, DerivedState::default());
    }

    #[test]
    fn test_geolocation_aliases() {
        let mut state = DerivedState::default();
        run(
            &mut state,
            update_geolocation,
            json!({"lat": 51.5, "lng": -0.12, "accuracy": 250}),
        );
        run(&mut state, update_geolocation, json!({"accuracy": 80}));

        let fix = state.geolocation.unwrap();
        assert_eq!(fix.latitude, Some(51.5));
        assert_eq!(fix.longitude, Some(-0.12));
        assert_eq!(fix.accuracy, Some(80.0));
    }

    #[test]
    fn test_countermeasure_lifecycle() {
        let mut state = DerivedState::default();
        run(
            &mut state,
            deploy_countermeasure,
            json!({"id": "cm-1", "name": "Frequency hop", "type": "ecm"}),
        );
        let cm = state.countermeasure("cm-1").unwrap();
        assert_eq!(cm.status, "active");
        assert_eq!(cm.name, "Frequency hop");

        run(
            &mut state,
            update_countermeasure,
            json!({"id": "cm-1", "effectiveness": 0.75}),
        );
        let cm = state.countermeasure("cm-1").unwrap();
        assert_eq!(cm.status, "active");
        assert_eq!(cm.effectiveness, Some(0.75));
        assert_eq!(cm.kind.as_deref(), Some("ecm"));

        run(
            &mut state,
            update_countermeasure,
            json!({"countermeasureId": "cm-1", "status": "withdrawn"}),
        );
        assert_eq!(state.countermeasure("cm-1").unwrap().status, "withdrawn");

        // Redeploy reactivates
        run(&mut state, deploy_countermeasure, json!({"id": "cm-1"}));
        assert_eq!(state.countermeasures.len(), 1);
        assert_eq!(state.countermeasure("cm-1").unwrap().status, "active");
    }

    #[test]
    fn test_countermeasure_keyed_by_name_without_id() {
        let mut state = DerivedState::default();
        run(&mut state, deploy_countermeasure, json!({"name": "Decoy"}));
        run(
            &mut state,
            update_countermeasure,
            json!({"countermeasure": "Decoy", "target": "SAT-1"}),
        );
        assert_eq!(state.countermeasures.len(), 1);
        let cm = state.countermeasure("Decoy").unwrap();
        assert_eq!(cm.target.as_deref(), Some("SAT-1"));
    }
}
