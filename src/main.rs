//! hmip-valve-switch - Main Entry Point
//!
//! Connects to the HomematicIP cloud, resolves the switched outlet by label and
//! keeps it in line with the floor-heating valves until SIGINT/SIGTERM.

use hmip_valve_switch::{
    client::{DeviceStateClient, HmipClient, HmipSwitch},
    config::{ConfigOverrides, DEFAULT_CONFIG_FILE},
    error::ValveSwitchError,
    logging::{init_logging, LogConfig},
    services::{Dispatcher, Reconciler},
    Result, SwitchConfig,
};

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use url::Url;

/// Valve-driven heating switch
#[derive(Parser, Debug)]
#[command(name = "hmip-valve-switch")]
#[command(about = "Switches a HomematicIP outlet while any floor-heating valve is open")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// INI configuration file with the [AUTH] section
    #[arg(short, long, env = "HMIP_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Auth token, overrides the file
    #[arg(long, env = "HMIP_AUTHTOKEN", hide_env_values = true)]
    authtoken: Option<String>,

    /// Access point id, overrides the file
    #[arg(long, env = "HMIP_ACCESSPOINT")]
    accesspoint: Option<String>,

    /// Label of the switched outlet
    #[arg(long, env = "HMIP_PLUG_LABEL")]
    plug_label: Option<String>,

    /// Device type of the monitored valves
    #[arg(long, env = "HMIP_VALVE_TYPE")]
    valve_type: Option<String>,

    /// Seconds between full syncs
    #[arg(long, env = "HMIP_SYNC_INTERVAL_SECS")]
    sync_interval_secs: Option<u64>,

    /// Skip the full sync before listening for events
    #[arg(long)]
    no_startup_sync: bool,

    /// Endpoint lookup service
    #[arg(long, env = "HMIP_LOOKUP_URL")]
    lookup_url: Option<Url>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Also log to this file (rotated daily)
    #[arg(long, env = "HMIP_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Log JSON lines
    #[arg(long)]
    json_logs: bool,
}

impl Cli {
    fn log_config(&self) -> LogConfig {
        let mut log = LogConfig::from_env();
        if self.debug {
            log.level = tracing::Level::DEBUG;
        }
        if let Some(path) = &self.log_file {
            log.file_path = Some(path.clone());
        }
        log.json |= self.json_logs;
        log
    }

    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            authtoken: self.authtoken.clone(),
            accesspoint: self.accesspoint.clone(),
            plug_label: self.plug_label.clone(),
            valve_device_type: self.valve_type.clone(),
            sync_interval: self.sync_interval_secs.map(Duration::from_secs),
            sync_on_startup: self.no_startup_sync.then_some(false),
            lookup_url: self.lookup_url.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.log_config()) {
        eprintln!("Failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!(error_type = e.error_type(), "❌ {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    info!("🚀 Starting hmip-valve-switch v{}", env!("CARGO_PKG_VERSION"));

    let mut config = SwitchConfig::load(&cli.config)?;
    config.apply_overrides(cli.overrides());
    config.validate()?;

    let client = Arc::new(HmipClient::connect(&config).await?);
    client.refresh_snapshot().await?;

    let snapshot = client.snapshot().await;
    let Some(plug) = snapshot.find_by_label(&config.switch.plug_label) else {
        let not_found = ValveSwitchError::ActuatorNotFound {
            label: config.switch.plug_label.clone(),
            available: snapshot.labels(),
        };
        error!("❌ {}. Known devices:", not_found);
        for label in snapshot.labels() {
            error!("  - {}", label);
        }
        return Ok(ExitCode::FAILURE);
    };
    info!(
        "🔌 Switching '{}' ({}) for {} valves",
        plug.label, plug.id, config.switch.valve_device_type
    );

    let switch = Arc::new(HmipSwitch::new(
        client.clone(),
        plug.id.clone(),
        plug.label.clone(),
        config.switch.channel_index,
    ));
    let reconciler = Arc::new(Reconciler::new(switch));
    let dispatcher = Arc::new(
        Dispatcher::new(
            client.clone(),
            reconciler.clone(),
            &config.switch.valve_device_type,
            config.switch.sync_interval,
        )
        .with_startup_sync(config.switch.sync_on_startup),
    );

    let events = client.enable_events().await?;
    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    let outcome = dispatcher.run(events, cancel).await;

    if let Err(e) = client.close().await {
        warn!("Failed to close push connection: {}", e);
    }
    outcome?;

    let stats = reconciler.stats().await;
    info!(
        commands = stats.commands_issued,
        failed = stats.commands_failed,
        state = %reconciler.current_state().await,
        "🛑 Stopped"
    );
    Ok(ExitCode::SUCCESS)
}

/// Cancel on Ctrl-C or SIGTERM
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
    cancel.cancel();
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_environment_overrides() {
        temp_env::with_vars(
            [
                ("HMIP_AUTHTOKEN", Some("ENVTOKEN")),
                ("HMIP_PLUG_LABEL", Some("Pumpe")),
                ("HMIP_SYNC_INTERVAL_SECS", Some("60")),
                ("HMIP_ACCESSPOINT", None),
                ("HMIP_CONFIG", None),
            ],
            || {
                let cli = Cli::try_parse_from(["hmip-valve-switch"]).unwrap();
                assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_FILE));

                let overrides = cli.overrides();
                assert_eq!(overrides.authtoken.as_deref(), Some("ENVTOKEN"));
                assert_eq!(overrides.plug_label.as_deref(), Some("Pumpe"));
                assert_eq!(overrides.sync_interval, Some(Duration::from_secs(60)));
                assert_eq!(overrides.accesspoint, None);
                assert_eq!(overrides.sync_on_startup, None);
            },
        );
    }

    #[test]
    #[serial]
    fn test_flags_win_over_environment() {
        temp_env::with_vars([("HMIP_PLUG_LABEL", Some("Pumpe"))], || {
            let cli = Cli::try_parse_from([
                "hmip-valve-switch",
                "--plug-label",
                "Zirkulation",
                "--no-startup-sync",
                "--config",
                "/tmp/hmip.ini",
            ])
            .unwrap();

            let overrides = cli.overrides();
            assert_eq!(overrides.plug_label.as_deref(), Some("Zirkulation"));
            assert_eq!(overrides.sync_on_startup, Some(false));
            assert_eq!(cli.config, PathBuf::from("/tmp/hmip.ini"));
        });
    }

    #[test]
    #[serial]
    fn test_debug_flag_raises_log_level() {
        temp_env::with_vars_unset(["RUST_LOG", "HMIP_LOG_FILE", "HMIP_LOG_JSON"], || {
            let cli = Cli::try_parse_from(["hmip-valve-switch", "--debug", "--json-logs"]).unwrap();
            let log = cli.log_config();
            assert_eq!(log.level, tracing::Level::DEBUG);
            assert!(log.json);
        });
    }
}
