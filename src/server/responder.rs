//! Server side of the heartbeat exchange.
//!
//! Each request is handled on its own: decode, record the worker's status,
//! diff its fingerprints against the authoritative files under the server's
//! root and answer with the files that drifted.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::fs;

use super::workers::WorkerTable;
use crate::codec::PayloadCodec;
use crate::error::HeartbeatError;
use crate::fingerprint::fingerprint;
use crate::registry::{resolve, ManagedFileSet};
use crate::types::{FingerprintMap, HeartbeatRequest, HeartbeatResponse, UpdateMap};

/// Sent when a response cannot be serialized.
const ENCODE_FAILURE_BODY: &[u8] = br#"{"status":"fail","msg":"server failed to encode response"}"#;

/// Compute the files a worker needs.
///
/// A file is included only when the worker reported a non-empty fingerprint
/// for it, the server can read a non-empty copy, and the fingerprints differ.
/// Files the worker did not ask about are never pushed.
pub async fn build_updates(
    files: &ManagedFileSet,
    root: &Path,
    reported: &FingerprintMap,
) -> UpdateMap {
    let mut updates = UpdateMap::new();
    for id in files.iter() {
        let worker_fp = match reported.get(id) {
            Some(fp) if !fp.is_empty() => fp,
            _ => continue,
        };

        let path = resolve(root, id);
        let content = match fs::read(&path).await {
            Ok(content) if !content.is_empty() => content,
            Ok(_) => {
                error!("Load custom file {} fail: file is empty", id);
                continue;
            }
            Err(e) => {
                error!("Load custom file {} fail: {}", id, e);
                continue;
            }
        };

        if fingerprint(&content).matches(worker_fp) {
            continue;
        }

        match String::from_utf8(content) {
            Ok(text) => {
                updates.insert(id.to_string(), text);
            }
            Err(_) => warn!("Custom file {} is not valid UTF-8, not pushing it", id),
        }
    }
    updates
}

pub struct HeartbeatResponder {
    codec: Arc<dyn PayloadCodec>,
    files: ManagedFileSet,
    root: PathBuf,
    workers: WorkerTable,
}

impl HeartbeatResponder {
    pub fn new(
        codec: Arc<dyn PayloadCodec>,
        files: ManagedFileSet,
        root: impl Into<PathBuf>,
        workers: WorkerTable,
    ) -> Self {
        Self {
            codec,
            files,
            root: root.into(),
            workers,
        }
    }

    pub fn workers(&self) -> &WorkerTable {
        &self.workers
    }

    /// Handle a decoded request.
    pub async fn respond(&self, request: HeartbeatRequest) -> HeartbeatResponse {
        let worker = request.worker_status.worker_name.clone();
        self.workers.record(request.worker_status).await;

        let updates = build_updates(&self.files, &self.root, &request.custom_files).await;
        if !updates.is_empty() {
            info!(
                "Pushing {} custom file(s) to worker {}: {:?}",
                updates.len(),
                worker,
                updates.keys().collect::<Vec<_>>()
            );
        }
        HeartbeatResponse::success(&updates).unwrap_or_else(|e| {
            error!("Failed to encode custom file updates: {}", e);
            HeartbeatResponse::fail(format!("encode updates: {}", e))
        })
    }

    /// Handle raw wire bytes and produce the wire bytes to send back.
    pub async fn handle(&self, wire: &[u8]) -> Vec<u8> {
        let response = match self.decode(wire) {
            Ok(request) => self.respond(request).await,
            Err(e) => {
                warn!("Rejecting malformed heartbeat: {}", e);
                HeartbeatResponse::fail(e.to_string())
            }
        };
        let body = match serde_json::to_vec(&response) {
            Ok(body) => body,
            Err(e) => {
                error!("Failed to encode heartbeat response: {}", e);
                ENCODE_FAILURE_BODY.to_vec()
            }
        };
        debug!("Heartbeat response: {} bytes", body.len());
        self.codec.secure(&body)
    }

    fn decode(&self, wire: &[u8]) -> Result<HeartbeatRequest, HeartbeatError> {
        let body = self.codec.unsecure(wire)?;
        Ok(serde_json::from_slice(&body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::PlainCodec;
    use crate::types::{Outcome, WorkerStatus};

    fn setup() -> (tempfile::TempDir, ManagedFileSet) {
        let dir = tempfile::tempdir().unwrap();
        let files = ManagedFileSet::new(["same.txt", "drift.txt", "empty.txt", "missing.txt", "unasked.txt"]).unwrap();
        std::fs::write(dir.path().join("same.txt"), b"same").unwrap();
        std::fs::write(dir.path().join("drift.txt"), b"server copy").unwrap();
        std::fs::write(dir.path().join("empty.txt"), b"").unwrap();
        std::fs::write(dir.path().join("unasked.txt"), b"never sent").unwrap();
        (dir, files)
    }

    #[tokio::test]
    async fn diff_contains_only_drifted_available_requested_files() {
        let (dir, files) = setup();
        let mut reported = FingerprintMap::new();
        reported.insert("same.txt".into(), fingerprint(b"same").to_hex());
        reported.insert("drift.txt".into(), fingerprint(b"worker copy").to_hex());
        reported.insert("empty.txt".into(), fingerprint(b"old").to_hex());
        reported.insert("missing.txt".into(), fingerprint(b"old").to_hex());
        reported.insert("unasked.txt".into(), String::new());
        reported.insert("unmanaged.txt".into(), fingerprint(b"x").to_hex());

        let updates = build_updates(&files, dir.path(), &reported).await;

        let mut expected = UpdateMap::new();
        expected.insert("drift.txt".into(), "server copy".into());
        assert_eq!(updates, expected);
    }

    #[tokio::test]
    async fn same_request_same_answer() {
        let (dir, files) = setup();
        let mut reported = FingerprintMap::new();
        reported.insert("drift.txt".into(), fingerprint(b"").to_hex());
        let first = build_updates(&files, dir.path(), &reported).await;
        let second = build_updates(&files, dir.path(), &reported).await;
        assert_eq!(first, second);
        assert_eq!(first.len(), 1);
    }

    #[tokio::test]
    async fn malformed_body_gets_fail_response() {
        let (dir, files) = setup();
        let responder = HeartbeatResponder::new(Arc::new(PlainCodec), files, dir.path(), WorkerTable::new());

        let wire = responder.handle(b"not json").await;
        let response: HeartbeatResponse = serde_json::from_slice(&wire).unwrap();
        assert_eq!(response.status, Outcome::Fail);
        assert!(!response.msg.is_empty());
        assert!(responder.workers().snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn accepted_heartbeat_is_recorded() {
        let (dir, files) = setup();
        let responder = HeartbeatResponder::new(Arc::new(PlainCodec), files, dir.path(), WorkerTable::new());

        let request = HeartbeatRequest {
            worker_status: WorkerStatus::new("w1"),
            custom_files: FingerprintMap::new(),
        };
        let response = responder.respond(request).await;
        assert!(response.is_success());
        assert!(response.msg.is_empty());
        assert!(responder.workers().snapshot().await.contains_key("w1"));
    }

    #[tokio::test]
    async fn ids_missing_from_request_are_never_pushed() {
        let (dir, files) = setup();
        let mut reported = FingerprintMap::new();
        reported.insert("drift.txt".into(), fingerprint(b"worker copy").to_hex());

        let updates = build_updates(&files, dir.path(), &reported).await;

        assert!(!updates.contains_key("unasked.txt"));
        assert!(!updates.contains_key("same.txt"));
        assert_eq!(updates.keys().collect::<Vec<_>>(), vec!["drift.txt"]);
    }

    #[tokio::test]
    async fn non_utf8_server_file_is_not_pushed() {
        let dir = tempfile::tempdir().unwrap();
        let files = ManagedFileSet::new(["binary.cache", "text.txt"]).unwrap();
        std::fs::write(dir.path().join("binary.cache"), [0xff, 0xfe, 0x00, 0x80]).unwrap();
        std::fs::write(dir.path().join("text.txt"), b"server text").unwrap();

        let mut reported = FingerprintMap::new();
        reported.insert("binary.cache".into(), fingerprint(b"old").to_hex());
        reported.insert("text.txt".into(), fingerprint(b"old").to_hex());

        let updates = build_updates(&files, dir.path(), &reported).await;

        assert_eq!(updates.keys().collect::<Vec<_>>(), vec!["text.txt"]);
    }

    #[test]
    fn encode_failure_body_is_a_fail_response() {
        let response: HeartbeatResponse = serde_json::from_slice(ENCODE_FAILURE_BODY).unwrap();
        assert_eq!(response.status, Outcome::Fail);
        assert!(!response.msg.is_empty());
    }
}
