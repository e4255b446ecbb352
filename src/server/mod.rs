//! HTTP surface of the server role.
//!
//! * `POST /worker-alive`: heartbeat exchange, body passed through the codec.
//! * `GET /worker-list`: workers heard from recently, as plain JSON.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use log::info;
use tokio::net::TcpListener;

pub mod responder;
pub mod workers;

pub use responder::{build_updates, HeartbeatResponder};
pub use workers::{WorkerRecord, WorkerTable};

use crate::transport::HEARTBEAT_PATH;

#[derive(Clone)]
struct ServerState {
    responder: Arc<HeartbeatResponder>,
    worker_max_age: Duration,
}

/// Routes of the heartbeat server. `worker_max_age` bounds how long a silent
/// worker stays in `/worker-list`.
pub fn router(responder: Arc<HeartbeatResponder>, worker_max_age: Duration) -> Router {
    Router::new()
        .route(HEARTBEAT_PATH, post(worker_alive))
        .route("/worker-list", get(worker_list))
        .with_state(ServerState {
            responder,
            worker_max_age,
        })
}

async fn worker_alive(State(state): State<ServerState>, body: Bytes) -> Vec<u8> {
    state.responder.handle(&body).await
}

async fn worker_list(State(state): State<ServerState>) -> Json<Vec<WorkerRecord>> {
    Json(state.responder.workers().alive_workers(state.worker_max_age).await)
}

/// Serve heartbeats on `bind_addr` until the task is aborted.
pub async fn run_server(
    bind_addr: SocketAddr,
    responder: Arc<HeartbeatResponder>,
    worker_max_age: Duration,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(bind_addr).await?;
    info!("Heartbeat server listening on {}", listener.local_addr()?);
    axum::serve(listener, router(responder, worker_max_age)).await?;
    Ok(())
}
