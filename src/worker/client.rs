//! Worker side of the heartbeat exchange.

use std::net::Ipv6Addr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use log::{debug, error, info, warn};

use crate::codec::PayloadCodec;
use crate::config::{Config, RunMode};
use crate::error::{HeartbeatError, Result};
use crate::registry::{resolve, write_atomic, ManagedFileSet};
use crate::transport::{Transport, HEARTBEAT_PATH};
use crate::types::{HeartbeatRequest, HeartbeatResponse, UpdateMap, WorkerStatus};

const LOOPBACK: &str = "127.0.0.1";

/// Host a worker should dial to reach the server.
///
/// Debug deployments always talk to loopback. Otherwise the configured host
/// is used unless it is empty or a wildcard bind address, which a
/// co-located worker cannot dial.
pub fn resolve_server_host(mode: RunMode, host: &str) -> String {
    if mode == RunMode::Debug {
        return LOOPBACK.to_string();
    }
    match host.trim() {
        "" | "0.0.0.0" | "::" | "[::]" => LOOPBACK.to_string(),
        other => other.to_string(),
    }
}

/// Heartbeat endpoint URL for `host`. IPv6 literals are bracketed.
pub fn heartbeat_url(host: &str, port: u16) -> String {
    let host = match host.parse::<Ipv6Addr>() {
        Ok(_) => format!("[{}]", host),
        Err(_) => host.to_string(),
    };
    format!("http://{}:{}{}", host, port, HEARTBEAT_PATH)
}

/// What a successful heartbeat did locally.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HeartbeatOutcome {
    /// Files overwritten from the server's copy.
    pub applied: Vec<String>,
    /// Files the server pushed that could not be written.
    pub failed: Vec<String>,
    /// The update map in the response could not be parsed.
    pub malformed_updates: bool,
}

pub struct HeartbeatClient {
    transport: Arc<dyn Transport>,
    codec: Arc<dyn PayloadCodec>,
    files: ManagedFileSet,
    root: PathBuf,
    url: String,
}

impl HeartbeatClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        codec: Arc<dyn PayloadCodec>,
        files: ManagedFileSet,
        root: impl Into<PathBuf>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            codec,
            files,
            root: root.into(),
            url: url.into(),
        }
    }

    /// Client aimed at the server described by `config`.
    pub fn from_config(
        config: &Config,
        transport: Arc<dyn Transport>,
        codec: Arc<dyn PayloadCodec>,
        files: ManagedFileSet,
    ) -> Self {
        let host = resolve_server_host(config.run_mode, &config.host);
        let url = heartbeat_url(&host, config.port);
        Self::new(transport, codec, files, config.root_path.clone(), url)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Send one heartbeat and apply any files the server pushes back.
    ///
    /// Returns `false` on transport, codec or protocol failure. Retrying is
    /// up to the caller.
    pub async fn send_heartbeat(&self, status: &mut WorkerStatus) -> bool {
        match self.try_heartbeat(status).await {
            Ok(outcome) => {
                if !outcome.applied.is_empty() {
                    info!("Synced managed files from server: {:?}", outcome.applied);
                }
                true
            }
            Err(HeartbeatError::Protocol(msg)) => {
                error!("Keep alive rejected by server: {}", msg);
                false
            }
            Err(e) => {
                error!("Keep alive failed: {}", e);
                false
            }
        }
    }

    /// Like [`send_heartbeat`](Self::send_heartbeat) but reports what happened.
    pub async fn try_heartbeat(&self, status: &mut WorkerStatus) -> Result<HeartbeatOutcome> {
        status.update_time = Utc::now();
        let request = self.build_request(status).await;

        let body = serde_json::to_vec(&request)?;
        let wire = self.transport.post(&self.url, self.codec.secure(&body)).await?;
        let response: HeartbeatResponse = serde_json::from_slice(&self.codec.unsecure(&wire)?)?;

        if !response.is_success() {
            return Err(HeartbeatError::Protocol(response.msg));
        }

        let updates = match response.updates() {
            Ok(updates) => updates,
            Err(e) => {
                warn!("Ignoring malformed file updates from server: {}", e);
                return Ok(HeartbeatOutcome {
                    malformed_updates: true,
                    ..Default::default()
                });
            }
        };
        debug!("Heartbeat acknowledged with {} file update(s)", updates.len());
        Ok(apply_updates(&self.files, &self.root, &updates).await)
    }

    async fn build_request(&self, status: &WorkerStatus) -> HeartbeatRequest {
        let custom_files = self
            .files
            .fingerprint_all(&self.root)
            .await
            .into_iter()
            .map(|(id, fp)| (id, fp.to_hex()))
            .collect();
        HeartbeatRequest {
            worker_status: status.clone(),
            custom_files,
        }
    }
}

/// Overwrite local managed files with the content pushed by the server.
///
/// Only ids in `files` with non-empty content are written. Ids missing from
/// `updates` are already current and stay untouched; nothing is deleted.
/// A failed write is logged and the remaining files are still processed.
pub async fn apply_updates(
    files: &ManagedFileSet,
    root: &Path,
    updates: &UpdateMap,
) -> HeartbeatOutcome {
    let mut outcome = HeartbeatOutcome::default();
    for id in files.iter() {
        let content = match updates.get(id) {
            Some(content) if !content.is_empty() => content,
            _ => continue,
        };
        match write_atomic(&resolve(root, id), content.as_bytes()).await {
            Ok(()) => outcome.applied.push(id.to_string()),
            Err(e) => {
                error!("Failed to sync managed file {}: {}", id, e);
                outcome.failed.push(id.to_string());
            }
        }
    }
    for id in updates.keys().filter(|id| !files.contains(id)) {
        debug!("Ignoring update for unmanaged file {}", id);
    }
    outcome
}
