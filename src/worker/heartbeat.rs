use std::time::Duration;

use log::{debug, info, warn};
use tokio::time::{interval, MissedTickBehavior};

use super::client::HeartbeatClient;
use crate::types::WorkerStatus;

/// Send a heartbeat every `period`, forever.
///
/// The first heartbeat goes out immediately. A failed heartbeat is logged
/// and simply retried on the next tick; ticks missed while a slow request
/// was in flight are skipped rather than bunched up.
pub async fn run_heartbeat_loop(client: HeartbeatClient, mut status: WorkerStatus, period: Duration) {
    info!(
        "Worker {} sending heartbeats to {} every {:?}",
        status.worker_name,
        client.url(),
        period
    );
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        status.heartbeat_count += 1;
        if client.send_heartbeat(&mut status).await {
            debug!("Heartbeat #{} acknowledged", status.heartbeat_count);
        } else {
            warn!(
                "Heartbeat #{} failed, retrying in {:?}",
                status.heartbeat_count, period
            );
        }
    }
}
