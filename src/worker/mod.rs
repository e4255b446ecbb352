//! Worker role: report liveness and mirror managed files from the server.

pub mod client;
pub mod heartbeat;

pub use client::{apply_updates, heartbeat_url, resolve_server_host, HeartbeatClient, HeartbeatOutcome};
pub use heartbeat::run_heartbeat_loop;
