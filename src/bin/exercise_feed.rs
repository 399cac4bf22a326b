//! Exercise dashboard feed.
//!
//! Connects to the exercise bus as one team's dashboard and prints every
//! state change:
//! - CLI arguments and TOML config file support
//! - Satcom, SDR and team command folds
//! - Structured logging with tracing
//! - Operator command publishing

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{Map, Value};
use tokio::sync::watch;
use tracing::{info, warn};

use exercise_feed::{
    init_logging, AppConfig, DashboardRole, DashboardSession, DashboardVariant, LogFormat,
    Snapshot,
};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser)]
#[command(name = "exercise_feed")]
#[command(version, about = "Live exercise dashboard feed", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "exercise_feed.toml")]
    config: PathBuf,

    /// Override bus URL
    #[arg(long, env = "EXERCISE_BUS_URL")]
    url: Option<String>,

    /// Override exercise id
    #[arg(long)]
    exercise: Option<String>,

    /// Override team id
    #[arg(long)]
    team: Option<String>,

    /// Override dashboard role (team, public_feed)
    #[arg(long)]
    role: Option<DashboardRole>,

    /// Override dashboard variant (satcom, sdr, team, full)
    #[arg(long)]
    variant: Option<DashboardVariant>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Log format (pretty, json, compact)
    #[arg(long)]
    log_format: Option<LogFormat>,

    /// Directory for a daily-rolling JSON log file
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// How snapshots are printed
    #[arg(long, value_enum, default_value_t = Output::Summary)]
    output: Output,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a sample config file
    GenerateConfig {
        /// Output file path
        #[arg(short, long, default_value = "exercise_feed.toml")]
        output: PathBuf,
    },
    /// Validate config without connecting
    ValidateConfig,
    /// Publish one command inject onto the team feed and exit
    Publish {
        /// Command name, e.g. update_satellite_status
        command: String,
        /// Parameters as a JSON object
        #[arg(long, default_value = "{}")]
        params: String,
        /// Seconds to wait for the bus connection
        #[arg(long, default_value_t = 10)]
        timeout: u64,
    },
    /// Follow the feed and print snapshots (default)
    Run,
}

#[derive(Clone, Copy, ValueEnum)]
enum Output {
    /// One line per change
    Summary,
    /// Full snapshot as JSON, one per line
    Json,
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match &cli.command {
        Some(Commands::GenerateConfig { output }) => {
            generate_sample_config(output)?;
            return Ok(());
        }
        Some(Commands::ValidateConfig) => {
            let config = load_config(&cli)?;
            config.validate()?;
            println!("Configuration is valid:\n{:#?}", config);
            return Ok(());
        }
        Some(Commands::Publish { .. }) | Some(Commands::Run) | None => {}
    }

    let config = load_config(&cli)?;
    config.validate()?;

    let mut logging = config.logging.clone();
    if let Some(level) = &cli.log_level {
        logging.level = level.clone();
    }
    if let Some(format) = cli.log_format {
        logging.format = format;
    }
    if let Some(dir) = &cli.log_dir {
        logging.log_dir = Some(dir.clone());
    }
    // Held for the life of the program so buffered file output is flushed
    let _log_guard = init_logging(&logging, None)?;

    print_startup_banner(&config);

    match &cli.command {
        Some(Commands::Publish {
            command,
            params,
            timeout,
        }) => publish(&config, command, params, Duration::from_secs(*timeout)).await,
        _ => run(&config, cli.output).await,
    }
}

// ============================================================================
// Commands
// ============================================================================

async fn run(config: &AppConfig, output: Output) -> Result<(), Box<dyn std::error::Error>> {
    let session = DashboardSession::open(config.session_config());
    let mut snapshots = session.subscribe();

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    warn!("Read model closed");
                    break;
                }
                let snapshot = Arc::clone(&snapshots.borrow_and_update());
                print_snapshot(&snapshot, output)?;
            }
            _ = &mut shutdown => {
                info!("Shutdown requested");
                break;
            }
        }
    }

    session.close().await;
    Ok(())
}

async fn publish(
    config: &AppConfig,
    command: &str,
    params: &str,
    timeout: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let parameters: Map<String, Value> = match serde_json::from_str(params)? {
        Value::Object(map) => map,
        other => return Err(format!("--params must be a JSON object, got {other}").into()),
    };

    let session = DashboardSession::open(config.session_config());
    let mut snapshots = session.subscribe();
    if tokio::time::timeout(timeout, wait_connected(&mut snapshots))
        .await
        .is_err()
    {
        session.close().await;
        return Err(format!("No bus connection within {}s", timeout.as_secs()).into());
    }

    let inject = session.publish_command(command, parameters)?;
    println!("Published {} ({})", inject.id, command);
    session.close().await;
    Ok(())
}

async fn wait_connected(snapshots: &mut watch::Receiver<Arc<Snapshot>>) {
    loop {
        if snapshots.borrow_and_update().connection.is_connected() {
            return;
        }
        if snapshots.changed().await.is_err() {
            return;
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn load_config(cli: &Cli) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let mut config = AppConfig::load(&cli.config)?;

    // CLI args override config
    if let Some(url) = &cli.url {
        config.bus.url = url.clone();
    }
    if let Some(exercise) = &cli.exercise {
        config.identity.exercise = exercise.clone();
    }
    if let Some(team) = &cli.team {
        config.identity.team = team.clone();
    }
    if let Some(role) = cli.role {
        config.identity.role = role;
    }
    if let Some(variant) = cli.variant {
        config.identity.variant = variant;
    }
    Ok(config)
}

fn generate_sample_config(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let content = AppConfig::default().to_toml_string()?;

    let with_comments = format!(
        r#"# Exercise Feed Configuration
# See: exercise_feed --help
#
# Durations under [reconnect] are milliseconds; idle_timeout = 0 disables it.

{}"#,
        content
    );

    std::fs::write(path, with_comments)?;
    println!("Sample config written to: {}", path.display());
    Ok(())
}

fn print_startup_banner(config: &AppConfig) {
    let version = env!("CARGO_PKG_VERSION");
    info!(
        version,
        url = %config.bus.url,
        exercise = %config.identity.exercise,
        team = %config.identity.team,
        role = ?config.identity.role,
        variant = ?config.identity.variant,
        "Exercise feed starting"
    );
}

fn print_snapshot(snapshot: &Snapshot, output: Output) -> Result<(), Box<dyn std::error::Error>> {
    match output {
        Output::Json => println!("{}", serde_json::to_string(snapshot)?),
        Output::Summary => println!("{}", summary_line(snapshot)),
    }
    Ok(())
}

fn summary_line(snapshot: &Snapshot) -> String {
    let derived = &snapshot.derived;
    let mut line = format!(
        "[{:>4}] {} {:<8} {:<12} injects={}",
        snapshot.revision,
        snapshot.timer_text(),
        snapshot.exercise_state.to_string(),
        snapshot.connection.to_string(),
        snapshot.visible_injects().count(),
    );
    if let Some(status) = &snapshot.status {
        if let (Some(current), Some(total)) = (status.current_turn, status.total_turns) {
            line.push_str(&format!(" turn={current}/{total}"));
        }
    }
    if !derived.satellites.is_empty() {
        line.push_str(&format!(" satellites={}", derived.satellites.len()));
    }
    if let Some(latest) = derived.signal_history.back() {
        line.push_str(&format!(" signal={:.0}", latest.strength));
    }
    if let Some(spectrum) = &derived.spectrum {
        let hot = spectrum.bars.iter().filter(|b| b.interference).count();
        line.push_str(&format!(" interference={hot}/{}", spectrum.bars.len()));
    }
    if let Some(class) = derived.threat.as_ref().and_then(|t| t.classification.as_deref()) {
        line.push_str(&format!(" threat={class}"));
    }
    if !derived.countermeasures.is_empty() {
        line.push_str(&format!(" countermeasures={}", derived.countermeasures.len()));
    }
    line
}
