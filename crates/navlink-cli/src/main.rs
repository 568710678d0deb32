//! `navlink` – gateway bridge daemon.
//!
//! This binary is the stack's entry point.  It:
//!
//! 1. Initialises structured logging plus the optional OTLP exporter.
//! 2. Loads `~/.navlink/config.toml`, writing the defaults on first run.
//! 3. Spawns the bridge task, queues the configured subscriptions and
//!    connects to the gateway.
//! 4. Logs every typed event the bridge emits until **Ctrl-C**, then
//!    disconnects cleanly.

mod config;
mod telemetry;

use navlink_bridge::spawn;
use navlink_types::{BridgeError, BridgePayload};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

fn main() {
    // The guard must outlive the runtime so pending spans flush on exit.
    let _guard = telemetry::init_tracing("navlink");

    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            info!(path = %config::config_path().display(), "config loaded");
            cfg
        }
        Ok(None) => {
            let cfg = config::Config::default();
            match config::save(&cfg) {
                Ok(()) => info!(
                    path = %config::config_path().display(),
                    "no config found, defaults written"
                ),
                Err(e) => warn!(error = %e, "could not write default config"),
            }
            cfg
        }
        Err(e) => {
            warn!(error = %e, "config unreadable, using defaults");
            config::Config::default()
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to start the async runtime");
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run(cfg)) {
        error!(error = %e, "bridge loop failed");
        std::process::exit(1);
    }
}

async fn run(cfg: config::Config) -> Result<(), BridgeError> {
    let handle = spawn(cfg.bridge());
    let mut events = handle.events();

    // Queue subscriptions before connecting; the active set is replayed as
    // soon as the socket opens.
    for sub in &cfg.subscriptions {
        handle.subscribe(&sub.topic, &sub.message_type, sub.kind).await?;
    }
    handle.connect().await?;
    info!(
        endpoint = %cfg.bridge().endpoint(),
        subscriptions = cfg.subscriptions.len(),
        "bridge started"
    );

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    error!(error = %e, "Ctrl-C handler failed");
                }
                info!("Ctrl-C received, disconnecting");
                handle.disconnect().await?;
                break;
            }
            event = events.recv() => match event {
                Ok(event) => log_event(&event.payload),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event consumer lagged, events dropped");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
    Ok(())
}

/// Map one bridge event onto a structured log line.
fn log_event(payload: &BridgePayload) {
    match payload {
        BridgePayload::Connected => info!("gateway connected"),
        BridgePayload::Disconnected => warn!("gateway disconnected"),
        BridgePayload::Error { message } => error!(%message, "transport error"),
        BridgePayload::Map(grid) => info!(
            width = grid.info.width,
            height = grid.info.height,
            resolution = grid.info.resolution,
            "occupancy grid received"
        ),
        BridgePayload::Laser(scan) => debug!(beams = scan.ranges.len(), "laser scan received"),
        BridgePayload::Odometry { topic, odom } => debug!(
            topic,
            x = odom.pose.pose.position.x,
            y = odom.pose.pose.position.y,
            "odometry received"
        ),
        BridgePayload::Transform(pair) => debug!(
            map_odom_x = pair.map_odom.transform.translation.x,
            odom_base_x = pair.odom_base.transform.translation.x,
            "transform pair received"
        ),
        BridgePayload::PlanarPose { topic, pose } => debug!(
            topic,
            x = pose.x,
            y = pose.y,
            theta = pose.theta,
            "planar pose received"
        ),
        BridgePayload::Topic { topic, payload } => {
            debug!(topic, payload = %payload, "raw topic payload")
        }
        BridgePayload::Service { kind, outcome } => {
            info!(kind = %kind, outcome = ?outcome, "service response")
        }
    }
}
