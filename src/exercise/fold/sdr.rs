//! Software-defined radio spectrum commands.

use super::{CommandParams, DerivedState, FoldFn};
use crate::{
    consts::{
        DEFAULT_NOISE_FLOOR_DBM, DEFAULT_SPECTRUM_BINS, DEFAULT_SPECTRUM_END_MHZ,
        DEFAULT_SPECTRUM_START_MHZ,
    },
    types::{Spectrum, SpectrumBar},
};

pub(super) const COMMANDS: &[(&str, FoldFn)] = &[
    ("initialize_spectrum", initialize_spectrum),
    ("inject_interference", inject_interference),
    ("clear_interference", clear_interference),
];

const MAX_BINS: usize = 2048;
/// Interference power when the command gives none, dBm
const DEFAULT_INTERFERENCE_DBM: f64 = -40.0;
/// Interference bandwidth when the command gives none, MHz
const DEFAULT_BANDWIDTH_MHZ: f64 = 5.0;

const FREQUENCY_KEYS: &[&str] = &["frequency", "center_frequency", "centerFrequency"];

/// Evenly spaced bars from `start` to `end` inclusive, all at the noise floor.
fn baseline(start: f64, end: f64, bins: usize, noise_floor: f64) -> Spectrum {
    let (start, end) = if end > start {
        (start, end)
    } else {
        (DEFAULT_SPECTRUM_START_MHZ, DEFAULT_SPECTRUM_END_MHZ)
    };
    let bins = bins.clamp(1, MAX_BINS);
    let last = bins.saturating_sub(1).max(1) as f64;
    let bars = (0..bins)
        .map(|i| SpectrumBar {
            frequency: start + (end - start) * i as f64 / last,
            power: noise_floor,
            interference: false,
        })
        .collect();
    Spectrum { noise_floor, bars }
}

fn default_baseline() -> Spectrum {
    baseline(
        DEFAULT_SPECTRUM_START_MHZ,
        DEFAULT_SPECTRUM_END_MHZ,
        DEFAULT_SPECTRUM_BINS,
        DEFAULT_NOISE_FLOOR_DBM,
    )
}

/// Indices of bars within `center ± bandwidth / 2`, or the nearest bar when
/// the band falls between bars.
fn bars_in_band(bars: &[SpectrumBar], center: f64, bandwidth: f64) -> Vec<usize> {
    let half = bandwidth.abs() / 2.0;
    let hits: Vec<usize> = bars
        .iter()
        .enumerate()
        .filter(|(_, bar)| (bar.frequency - center).abs() <= half)
        .map(|(i, _)| i)
        .collect();
    if !hits.is_empty() {
        return hits;
    }
    bars.iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| {
            (a.frequency - center)
                .abs()
                .total_cmp(&(b.frequency - center).abs())
        })
        .map(|(i, _)| vec![i])
        .unwrap_or_default()
}

/// Rebuild the baseline. Replaces any existing table.
pub(super) fn initialize_spectrum(state: &mut DerivedState, params: &CommandParams<'_>) {
    state.spectrum = Some(baseline(
        params
            .f64(&["start_frequency", "startFrequency"])
            .unwrap_or(DEFAULT_SPECTRUM_START_MHZ),
        params
            .f64(&["end_frequency", "endFrequency"])
            .unwrap_or(DEFAULT_SPECTRUM_END_MHZ),
        params.usize(&["bins"]).unwrap_or(DEFAULT_SPECTRUM_BINS),
        params
            .f64(&["noise_floor", "noiseFloor"])
            .unwrap_or(DEFAULT_NOISE_FLOOR_DBM),
    ));
}

/// Builds the default baseline first if no spectrum exists yet.
pub(super) fn inject_interference(state: &mut DerivedState, params: &CommandParams<'_>) {
    let spectrum = state.spectrum.get_or_insert_with(default_baseline);
    let Some(center) = params.f64(FREQUENCY_KEYS) else {
        return;
    };
    let bandwidth = params
        .f64(&["bandwidth"])
        .unwrap_or(DEFAULT_BANDWIDTH_MHZ);
    let power = params
        .f64(&["power", "amplitude", "strength"])
        .unwrap_or(DEFAULT_INTERFERENCE_DBM);

    for index in bars_in_band(&spectrum.bars, center, bandwidth) {
        let bar = &mut spectrum.bars[index];
        bar.power = bar.power.max(power);
        bar.interference = true;
    }
}

/// Reset bars in the band, or every bar without a `frequency`. No-op before
/// the spectrum exists.
pub(super) fn clear_interference(state: &mut DerivedState, params: &CommandParams<'_>) {
    let Some(spectrum) = state.spectrum.as_mut() else {
        return;
    };
    let noise_floor = spectrum.noise_floor;
    let indices: Vec<usize> = match params.f64(FREQUENCY_KEYS) {
        Some(center) => {
            let bandwidth = params
                .f64(&["bandwidth"])
                .unwrap_or(DEFAULT_BANDWIDTH_MHZ);
            bars_in_band(&spectrum.bars, center, bandwidth)
        }
        None => (0..spectrum.bars.len()).collect(),
    };
    for index in indices {
        let bar = &mut spectrum.bars[index];
        bar.power = noise_floor;
        bar.interference = false;
    }
}
