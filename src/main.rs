//! wallbridge - Main Entry Point
//!
//! Loads configuration, resolves the node identity and runs the bridge under
//! the restart supervisor until SIGINT/SIGTERM.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use wallbridge::bridge::Bridge;
use wallbridge::config::BridgeConfig;
use wallbridge::control::EngineControl;
use wallbridge::identity::NodeIdentity;
use wallbridge::observability::{init_default_logging, metrics, HealthServer};
use wallbridge::protocol::{TopicBuilder, PAYLOAD_OFFLINE};
use wallbridge::supervisor::{run_with_restarts, RestartPolicy};
use wallbridge::transport::mqtt::{LastWillSpec, MqttClient};

/// Configuration files tried when `--config` is not given
const DEFAULT_CONFIG_PATHS: [&str; 2] = ["wallbridge.toml", "config/wallbridge.toml"];

/// Wallpaper Engine to Home Assistant MQTT bridge
#[derive(Parser)]
#[command(name = "wallbridge")]
#[command(about = "Expose Wallpaper Engine controls to Home Assistant over MQTT")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose logging (sets LOG_LEVEL=DEBUG unless LOG_LEVEL is set)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bridge
    Run,
    /// Validate configuration
    Config {
        /// Print the effective configuration
        #[arg(long)]
        show: bool,
    },
    /// Print the resolved node address and id
    Identity,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.verbose > 0 && std::env::var("LOG_LEVEL").is_err() {
        std::env::set_var("LOG_LEVEL", if cli.verbose > 1 { "TRACE" } else { "DEBUG" });
    }
    init_default_logging();

    info!("Starting wallbridge v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run => run_bridge(config).await,
        Commands::Config { show } => handle_config_command(&config, show),
        Commands::Identity => {
            print_identity(&config);
            Ok(())
        }
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }

    info!("Application shutdown complete");
}

fn load_configuration(config_path: Option<&Path>) -> Result<BridgeConfig, Box<dyn std::error::Error>> {
    if let Some(path) = config_path {
        info!("Loading configuration from: {}", path.display());
        return Ok(BridgeConfig::load_from_file(path)?);
    }

    for path_str in DEFAULT_CONFIG_PATHS {
        let path = PathBuf::from(path_str);
        if path.exists() {
            info!("Loading configuration from: {}", path.display());
            return Ok(BridgeConfig::load_from_file(&path)?);
        }
    }

    Err("No configuration file found. Provide one with -c/--config or create wallbridge.toml".into())
}

async fn run_bridge(config: BridgeConfig) -> Result<(), Box<dyn std::error::Error>> {
    let identity = NodeIdentity::resolve(&config.bridge.subnet_prefix);
    if identity.is_loopback() {
        warn!("No usable network address found, falling back to loopback");
    }
    info!(node = %identity, "Resolved node identity");

    let collector = metrics();
    collector.set_bridge_state("initializing");

    if let Some(port) = config.health.port {
        let health_server = Arc::new(HealthServer::new(
            identity.node_id().to_string(),
            port,
            config.bridge.refresh_interval_secs,
        ));
        tokio::spawn(health_server.start());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let topics = TopicBuilder::new(
        config.mqtt.discovery_prefix.clone(),
        config.mqtt.state_prefix.clone(),
        identity.node_id(),
    );
    let policy = RestartPolicy::from(&config.supervisor);

    let supervised = run_with_restarts(&policy, shutdown_rx.clone(), |attempt| {
        let config = config.clone();
        let identity = identity.clone();
        let will = LastWillSpec::new(topics.status(), PAYLOAD_OFFLINE);
        let shutdown = shutdown_rx.clone();
        async move {
            if attempt > 0 {
                info!(attempt, "Restarting bridge");
            }
            let transport = MqttClient::new(identity.node_id(), config.mqtt.clone(), will)?;
            let control = EngineControl::new(&config.engine);
            let mut bridge = Bridge::new(&config, &identity, transport, control);
            bridge.run(shutdown).await
        }
    })
    .await;

    match supervised {
        Ok(()) => {
            collector.set_bridge_state("stopped");
            Ok(())
        }
        Err(e) => {
            collector.set_bridge_state("error");
            Err(e.into())
        }
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut sigint, mut sigterm) = match (
        signal(SignalKind::interrupt()),
        signal(SignalKind::terminate()),
    ) {
        (Ok(sigint), Ok(sigterm)) => (sigint, sigterm),
        _ => {
            warn!("Failed to install signal handlers, falling back to ctrl-c");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = sigint.recv() => info!("Received SIGINT, shutting down gracefully..."),
        _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully..."),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Received ctrl-c, shutting down gracefully...");
    }
}

fn handle_config_command(config: &BridgeConfig, show: bool) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("Current configuration:");
        println!("{}", toml::to_string_pretty(config)?);
    }

    info!("Configuration validation complete");
    Ok(())
}

fn print_identity(config: &BridgeConfig) {
    let identity = NodeIdentity::resolve(&config.bridge.subnet_prefix);
    println!("address: {}", identity.address());
    println!("node_id: {}", identity.node_id());
}
