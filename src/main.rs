use clap::Parser;
use count_bridge::bridge::Bridge;
use count_bridge::debug_log::DebugLogger;
use count_bridge::{config, now_ms, planner, transport};
use log::{debug, error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::{interval, Duration};

/// Standalone player-count bridge service. Loads config.yml from the data
/// directory, starts the enabled transports, and serves until Ctrl+C.
/// The push-message transport has no standalone source and is exposed to
/// embedding hosts through the library API instead.
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Directory holding config.yml and the logs/ directory
    #[clap(short, long, default_value = ".")]
    data_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let config = match config::load(&args.data_dir) {
        Ok(config) => Arc::new(config),
        Err(error) => {
            error!("Failed to load config.yml; bridge disabled. {error}");
            std::process::exit(1);
        }
    };

    let debug_log = match DebugLogger::create(&args.data_dir.join("logs")) {
        Ok(logger) => {
            info!(
                "Bridge debug logs will be written to {}.",
                logger.path().display()
            );
            Some(logger)
        }
        Err(error) => {
            warn!("Failed to initialize bridge debug log file; continuing without file logging: {error}");
            None
        }
    };

    let bridge = Arc::new(Bridge::new(Arc::clone(&config), debug_log));
    if let Some(fault) = config.startup_fault() {
        error!("{fault} Bridge disabled until configured.");
    } else {
        info!(
            "Player count bridge initialized on channel {}.",
            config.channel
        );
        bridge.trace_startup();
    }

    let socket_path = config.socket.enabled.then(|| config.socket.path.clone());
    if bridge.is_enabled() {
        #[cfg(unix)]
        if let Some(path) = socket_path.clone() {
            let bridge = Arc::clone(&bridge);
            tokio::spawn(async move {
                if let Err(error) = transport::socket::run(bridge, path).await {
                    error!("Socket transport failed: {error}");
                }
            });
        }
        if config.polling.enabled {
            tokio::spawn(transport::poll::run(Arc::clone(&bridge)));
        }
        if config.planner_api.enabled {
            let bridge = Arc::clone(&bridge);
            tokio::spawn(async move {
                if let Err(error) = planner::run(bridge).await {
                    error!("Planner API failed: {error}");
                }
            });
        }
        tokio::spawn(status_loop(Arc::clone(&bridge)));
    }

    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl+C, shutting down.");
    #[cfg(unix)]
    if let Some(path) = socket_path {
        transport::socket::cleanup(&path);
    }
    Ok(())
}

/// Periodic heartbeat mirroring what a ping handler would read.
async fn status_loop(bridge: Arc<Bridge>) {
    let mut ticker = interval(Duration::from_secs(60));
    // The first tick fires immediately; skip it.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        if let Some(result) = bridge.ping_values(now_ms()) {
            debug!(
                "Aggregate status: online_total={} max_players={:?} backends={}",
                result.online_total,
                result.max_players,
                bridge.store().len()
            );
        }
    }
}
