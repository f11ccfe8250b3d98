//! HVAC Dashboard - live zone telemetry in the terminal.
//!
//! Run with: `cargo run -p hvac-dashboard -- --url http://localhost:8000`

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use hvac_core::{ApiClient, Engine, ZoneApi, validate_setpoint};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use hvac_dashboard::render::render_snapshot;
use hvac_dashboard::{Config, DEFAULT_ACTIVITY_ROWS, default_config_path, format_notification};

/// HVAC Dashboard - live zone telemetry in the terminal.
#[derive(Parser, Debug)]
#[command(name = "hvac-dashboard")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// API base URL (overrides config).
    #[arg(short, long, global = true, env = "HVAC_API_URL")]
    url: Option<String>,

    /// Push channel URL (overrides config; derived from the API URL by default).
    #[arg(long, global = true)]
    ws_url: Option<String>,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Follow the live dashboard until Ctrl-C (default behavior).
    Watch {
        /// Seconds between full dashboard renders.
        #[arg(short, long, default_value_t = 10)]
        interval: u64,

        /// Print snapshots as JSON lines instead of text.
        #[arg(long)]
        json: bool,

        /// Activity rows shown per render.
        #[arg(long, default_value_t = DEFAULT_ACTIVITY_ROWS)]
        activity: usize,
    },

    /// List zones known to the API server.
    Zones,

    /// Change a zone's setpoint (15.0-28.0 °C in 0.5 °C steps).
    SetSetpoint {
        /// Zone id.
        zone: String,
        /// New setpoint in °C.
        value: f64,
    },

    /// Switch a zone between adaptive and manual control.
    SetAdaptive {
        /// Zone id.
        zone: String,
        /// Enable (true) or disable (false) adaptive control.
        #[arg(action = clap::ArgAction::Set)]
        enabled: bool,
    },

    /// Write the effective configuration to the config file.
    InitConfig {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format)?;

    let config = load_config(&args)?;

    match args.command {
        Some(Command::Watch {
            interval,
            json,
            activity,
        }) => watch(config, Duration::from_secs(interval.max(1)), json, activity).await,
        None => watch(config, Duration::from_secs(10), false, DEFAULT_ACTIVITY_ROWS).await,
        Some(Command::Zones) => list_zones(&config).await,
        Some(Command::SetSetpoint { zone, value }) => set_setpoint(&config, &zone, value).await,
        Some(Command::SetAdaptive { zone, enabled }) => {
            set_adaptive(&config, &zone, enabled).await
        }
        Some(Command::InitConfig { force }) => {
            init_config(&config, args.config.unwrap_or_else(default_config_path), force)
        }
    }
}

fn init_tracing(format: LogFormat) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new("warn")
            .add_directive("hvac_core=info".parse()?)
            .add_directive("hvac_dashboard=info".parse()?),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
    Ok(())
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        // init-config may target a file that does not exist yet
        Some(path) if !path.exists() && matches!(args.command, Some(Command::InitConfig { .. })) => {
            Config::default()
        }
        Some(path) => Config::load(path)?,
        None => Config::load_default().unwrap_or_else(|e| {
            warn!("Ignoring default config file: {}", e);
            Config::default()
        }),
    };

    // Override config with CLI args
    if let Some(url) = &args.url {
        config.api.base_url = url.clone();
    }
    if let Some(ws_url) = &args.ws_url {
        config.api.ws_url = Some(ws_url.clone());
    }

    config.validate()?;
    Ok(config)
}

async fn watch(
    config: Config,
    interval: Duration,
    json: bool,
    activity_rows: usize,
) -> anyhow::Result<()> {
    let engine = Engine::builder(config.engine_config())
        .start()
        .await
        .context("Failed to start engine")?;
    info!(base_url = %config.api.base_url, "Watching dashboard (Ctrl-C to stop)");

    let mut notifications = engine.subscribe_notifications();
    let mut connection = engine.connection_state();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                eprintln!("\nShutting down...");
                break;
            }
            _ = ticker.tick() => {
                let snapshot = engine.snapshot();
                if json {
                    println!("{}", serde_json::to_string(&snapshot)?);
                } else {
                    println!("{}", render_snapshot(&snapshot, activity_rows));
                }
            }
            received = notifications.recv() => match received {
                Ok(notification) => {
                    if json {
                        println!("{}", serde_json::to_string(&notification)?);
                    } else {
                        println!("{}", format_notification(&notification));
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Notification output fell behind");
                }
                Err(RecvError::Closed) => break,
            },
            changed = connection.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *connection.borrow_and_update();
                info!(?state, "Push channel state changed");
            }
        }
    }

    engine.shutdown().await;
    Ok(())
}

fn api_client(config: &Config) -> anyhow::Result<ApiClient> {
    Ok(ApiClient::with_timeout(
        &config.api.base_url,
        Duration::from_secs(config.api.timeout_secs),
    )?)
}

async fn list_zones(config: &Config) -> anyhow::Result<()> {
    let client = api_client(config)?;
    let zones = client.zones().await?;
    if zones.is_empty() {
        println!("No zones configured");
    }
    for zone in zones {
        let mode = if zone.adaptive_mode { "adaptive" } else { "manual" };
        let current = match client.latest_reading(&zone.id).await {
            Ok(reading) => reading
                .temperature
                .map_or_else(|| "—".to_string(), |t| format!("{t:.1} °C")),
            Err(e) => {
                warn!(zone_id = %zone.id, error = %e, "No latest reading");
                "—".to_string()
            }
        };
        println!(
            "{:<20} {:<24} setpoint {:>5.1} °C  now {:>8}  {}",
            zone.id, zone.name, zone.setpoint, current, mode
        );
    }
    Ok(())
}

async fn set_setpoint(config: &Config, zone_id: &str, value: f64) -> anyhow::Result<()> {
    validate_setpoint(value)?;
    let zone = api_client(config)?.set_setpoint(zone_id, value).await?;
    println!("{}: setpoint is now {:.1} °C", zone.name, zone.setpoint);
    Ok(())
}

async fn set_adaptive(config: &Config, zone_id: &str, enabled: bool) -> anyhow::Result<()> {
    let zone = api_client(config)?
        .set_adaptive_mode(zone_id, enabled)
        .await?;
    let mode = if zone.adaptive_mode { "adaptive" } else { "manual" };
    println!("{}: control mode is now {}", zone.name, mode);
    Ok(())
}

fn init_config(config: &Config, path: PathBuf, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "Config file {} already exists (use --force to overwrite)",
            path.display()
        );
    }
    config.save(&path)?;
    println!("Wrote {}", path.display());
    Ok(())
}
