//! Command fold engine.
//!
//! Trigger injects carry a command name and a parameter object. Each command
//! name maps to a fold function that merges the parameters into the derived
//! domain state. The mapping is a plain table so that the satcom, sdr and
//! team dashboards share one engine and differ only in which commands they
//! register.
//!
//! Fold rules every command follows:
//! - **Upsert by key**: an entity named by the command is updated if it
//!   exists, appended otherwise. Never duplicated.
//! - **Partial merge**: only fields present in the parameters change.
//! - **Bounded history**: time series keep the newest
//!   [`SIGNAL_HISTORY_LIMIT`] samples.
//! - **Initialization on absence**: targeted updates to a table that does
//!   not exist yet build a baseline table first.
//! - **Degrade, don't fail**: unknown commands and missing parameters give a
//!   no-op or partial update. Nothing here returns an error.

mod satcom;
mod sdr;
mod team;

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::{
    consts::SIGNAL_HISTORY_LIMIT,
    logging::targets,
    types::{
        CommandInject, Countermeasure, GeolocationData, GroundStation, SatelliteStatus,
        SignalHistoryPoint, Spectrum, ThreatData,
    },
};

/// All state derived from command injects.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedState {
    pub satellites: Vec<SatelliteStatus>,
    pub ground_stations: Vec<GroundStation>,
    /// Oldest first
    pub signal_history: VecDeque<SignalHistoryPoint>,
    pub spectrum: Option<Spectrum>,
    pub threat: Option<ThreatData>,
    pub geolocation: Option<GeolocationData>,
    pub countermeasures: Vec<Countermeasure>,
}

impl DerivedState {
    pub fn satellite(&self, name: &str) -> Option<&SatelliteStatus> {
        self.satellites.iter().find(|s| s.name == name)
    }

    pub fn ground_station(&self, name: &str) -> Option<&GroundStation> {
        self.ground_stations.iter().find(|g| g.name == name)
    }

    pub fn countermeasure(&self, id: &str) -> Option<&Countermeasure> {
        self.countermeasures.iter().find(|c| c.id == id)
    }
}

/// Lenient accessor over a command's parameter object.
///
/// Every getter takes a list of accepted spellings and returns the first one
/// present with a usable value. Numbers given as strings are accepted.
#[derive(Debug, Clone, Copy)]
pub struct CommandParams<'a> {
    map: Option<&'a Map<String, Value>>,
    time: f64,
}

impl<'a> CommandParams<'a> {
    pub fn new(map: Option<&'a Map<String, Value>>, time: f64) -> Self {
        Self { map, time }
    }

    pub fn from_command(command: &CommandInject<'a>) -> Self {
        Self::new(command.parameters, command.time)
    }

    /// First alias holding something other than `null` or an empty string.
    fn value(&self, keys: &[&str]) -> Option<&'a Value> {
        let map = self.map?;
        keys.iter()
            .filter_map(|key| map.get(*key))
            .find(|value| match value {
                Value::Null => false,
                Value::String(s) => !s.is_empty(),
                _ => true,
            })
    }

    pub fn str(&self, keys: &[&str]) -> Option<String> {
        match self.value(keys)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn f64(&self, keys: &[&str]) -> Option<f64> {
        let value = match self.value(keys)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        };
        value.filter(|v| v.is_finite())
    }

    pub fn usize(&self, keys: &[&str]) -> Option<usize> {
        self.f64(keys)
            .filter(|v| *v >= 0.0)
            .map(|v| v.round() as usize)
    }

    pub fn bool(&self, keys: &[&str]) -> Option<bool> {
        match self.value(keys)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => match s.as_str() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
            Value::Number(n) => n.as_f64().map(|v| v != 0.0),
            _ => None,
        }
    }

    /// Exercise time of the command: an explicit `time` parameter, else the
    /// inject's delivery time.
    pub fn time(&self) -> f64 {
        self.f64(&["time", "timestamp"]).unwrap_or(self.time)
    }
}

/// A fold function: merge one command's parameters into the state.
pub type FoldFn = fn(&mut DerivedState, &CommandParams<'_>);

/// Which dashboard a fold table serves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DashboardVariant {
    /// Satellite communications: satellites, ground stations, signal history
    Satcom,
    /// Software-defined radio: spectrum, signal history, threat picture
    Sdr,
    /// Team operations: threat, geolocation, countermeasures
    Team,
    /// Every registered command
    #[default]
    Full,
}

impl std::str::FromStr for DashboardVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "satcom" => Ok(DashboardVariant::Satcom),
            "sdr" => Ok(DashboardVariant::Sdr),
            "team" => Ok(DashboardVariant::Team),
            "full" => Ok(DashboardVariant::Full),
            other => Err(format!(
                "Unknown dashboard variant '{other}'. Use: satcom, sdr, team, full"
            )),
        }
    }
}

/// Command name → fold function.
#[derive(Debug, Clone, Default)]
pub struct FoldTable {
    folds: BTreeMap<&'static str, FoldFn>,
}

impl FoldTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_variant(variant: DashboardVariant) -> Self {
        let mut table = Self::new();
        match variant {
            DashboardVariant::Satcom => table.register_all(satcom::COMMANDS),
            DashboardVariant::Sdr => {
                table.register_all(sdr::COMMANDS);
                table.register_all(team::COMMANDS);
                table.register("record_signal_strength", satcom::record_signal_strength);
            }
            DashboardVariant::Team => table.register_all(team::COMMANDS),
            DashboardVariant::Full => {
                table.register_all(satcom::COMMANDS);
                table.register_all(sdr::COMMANDS);
                table.register_all(team::COMMANDS);
            }
        }
        table
    }

    /// Register (or replace) the fold for `name`.
    pub fn register(&mut self, name: &'static str, fold: FoldFn) -> &mut Self {
        self.folds.insert(name, fold);
        self
    }

    fn register_all(&mut self, commands: &[(&'static str, FoldFn)]) {
        for (name, fold) in commands {
            self.register(name, *fold);
        }
    }

    pub fn get(&self, name: &str) -> Option<FoldFn> {
        self.folds.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.folds.contains_key(name)
    }

    /// Registered command names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.folds.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.folds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.folds.is_empty()
    }
}

/// Applies commands through a [`FoldTable`].
#[derive(Debug, Clone, Default)]
pub struct FoldEngine {
    table: FoldTable,
}

impl FoldEngine {
    pub fn new(table: FoldTable) -> Self {
        Self { table }
    }

    pub fn for_variant(variant: DashboardVariant) -> Self {
        Self::new(FoldTable::for_variant(variant))
    }

    pub fn table(&self) -> &FoldTable {
        &self.table
    }

    /// Produce the next snapshot from `current` and one command.
    ///
    /// `current` is left untouched. Unknown commands return an equal copy.
    pub fn fold(
        &self,
        name: &str,
        params: &CommandParams<'_>,
        current: &DerivedState,
    ) -> DerivedState {
        let mut next = current.clone();
        self.apply(name, params, &mut next);
        next
    }

    /// Fold in place. Returns whether `name` is a registered command.
    pub fn apply(&self, name: &str, params: &CommandParams<'_>, state: &mut DerivedState) -> bool {
        match self.table.get(name) {
            Some(fold) => {
                fold(state, params);
                debug!(target: targets::FOLD, command = name, "Folded command");
                true
            }
            None => {
                debug!(target: targets::FOLD, command = name, "Ignoring unknown command");
                false
            }
        }
    }
}

/// Update the entry matching `key`, or append one built by `create`.
pub(crate) fn upsert<'a, T>(
    items: &'a mut Vec<T>,
    matches: impl Fn(&T) -> bool,
    create: impl FnOnce() -> T,
) -> &'a mut T {
    let index = match items.iter().position(matches) {
        Some(index) => index,
        None => {
            items.push(create());
            items.len() - 1
        }
    };
    &mut items[index]
}

/// Append a sample, dropping the oldest beyond `limit`.
pub(crate) fn push_bounded<T>(history: &mut VecDeque<T>, item: T, limit: usize) {
    history.push_back(item);
    while history.len() > limit {
        history.pop_front();
    }
}

pub(crate) fn push_signal_sample(
    state: &mut DerivedState,
    time: f64,
    strength: f64,
    satellite: Option<String>,
) {
    push_bounded(
        &mut state.signal_history,
        SignalHistoryPoint {
            time,
            strength,
            satellite,
        },
        SIGNAL_HISTORY_LIMIT,
    );
}
