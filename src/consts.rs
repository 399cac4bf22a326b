/// Default bus endpoint for a locally running exercise broker.
pub const LOCAL_BUS_URL: &str = "ws://localhost:9001/bus";

/// Signal-strength samples retained by the fold engine.
pub const SIGNAL_HISTORY_LIMIT: usize = 20;

/// Baseline spectrum synthesized when an interference command arrives first.
pub const DEFAULT_SPECTRUM_START_MHZ: f64 = 2400.0;
pub const DEFAULT_SPECTRUM_END_MHZ: f64 = 2500.0;
pub const DEFAULT_SPECTRUM_BINS: usize = 50;
pub const DEFAULT_NOISE_FLOOR_DBM: f64 = -90.0;

/// Inject type that marks a command inject.
pub const TRIGGER_INJECT_TYPE: &str = "trigger";
