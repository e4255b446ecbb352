//! Heartsync daemon entry point.

use std::sync::Arc;

use log::{error, info};
use tokio::signal;

use heartsync::config::{Config, Role};
use heartsync::server::{run_server, HeartbeatResponder, WorkerTable};
use heartsync::transport::HttpTransport;
use heartsync::worker::{run_heartbeat_loop, HeartbeatClient};
use heartsync::{select_codec, ManagedFileSet, WorkerStatus};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::init();

    // Load configuration
    let cfg = Config::load()?;
    info!("Starting heartsync with config: {:?}", cfg);

    let files = ManagedFileSet::new(cfg.managed_files.iter().cloned())?;
    let codec = select_codec(cfg.run_mode, cfg.encrypt_key.as_deref());

    let handle = match cfg.role {
        Role::Server => {
            let bind_addr = cfg.bind_addr()?;
            let worker_max_age = cfg.worker_max_age();
            let responder = Arc::new(HeartbeatResponder::new(
                codec,
                files,
                cfg.root_path.clone(),
                WorkerTable::new(),
            ));
            tokio::spawn(async move {
                if let Err(e) = run_server(bind_addr, responder, worker_max_age).await {
                    error!("Heartbeat server failed: {}", e);
                }
            })
        }
        Role::Worker => {
            let transport = Arc::new(HttpTransport::new(cfg.request_timeout())?);
            let client = HeartbeatClient::from_config(&cfg, transport, codec, files);
            let status = WorkerStatus::new(cfg.worker_name.clone());
            let period = cfg.heartbeat_interval();
            tokio::spawn(run_heartbeat_loop(client, status, period))
        }
    };

    // Graceful Shutdown
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Received Ctrl+C, shutting down...");
        }
        Err(err) => {
            error!("Unable to listen for shutdown signal: {}", err);
        }
    }

    handle.abort();

    info!("Shutdown complete.");
    Ok(())
}
