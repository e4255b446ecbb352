//! Wire types of the heartbeat exchange.
//!
//! A worker posts a [`HeartbeatRequest`] carrying its status and a
//! fingerprint per managed file. The server answers with a
//! [`HeartbeatResponse`]; on success its `msg` is either empty or a JSON
//! object mapping drifted file ids to their full content.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// File id → full file content pushed from the server.
pub type UpdateMap = BTreeMap<String, String>;

/// File id → hex fingerprint reported by a worker.
pub type FingerprintMap = BTreeMap<String, String>;

/// Status a worker reports about itself.
///
/// The protocol only cares that it serializes and that `update_time` is
/// stamped right before sending. Unknown fields survive a round trip
/// through `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerStatus {
    pub worker_name: String,
    pub create_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
    #[serde(default)]
    pub heartbeat_count: u64,
    #[serde(default)]
    pub task_started_number: u64,
    #[serde(default)]
    pub task_executed_number: u64,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl WorkerStatus {
    pub fn new(worker_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            worker_name: worker_name.into(),
            create_time: now,
            update_time: now,
            heartbeat_count: 0,
            task_started_number: 0,
            task_executed_number: 0,
            extra: serde_json::Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub worker_status: WorkerStatus,
    #[serde(default)]
    pub custom_files: FingerprintMap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    pub status: Outcome,
    #[serde(default)]
    pub msg: String,
}

impl HeartbeatResponse {
    /// A success response carrying `updates`, or an empty `msg` when there
    /// is nothing to push.
    pub fn success(updates: &UpdateMap) -> Result<Self, serde_json::Error> {
        let msg = if updates.is_empty() {
            String::new()
        } else {
            serde_json::to_string(updates)?
        };
        Ok(Self {
            status: Outcome::Success,
            msg,
        })
    }

    pub fn fail(msg: impl Into<String>) -> Self {
        Self {
            status: Outcome::Fail,
            msg: msg.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Outcome::Success
    }

    /// Parse the pushed file map out of a success response.
    pub fn updates(&self) -> Result<UpdateMap, serde_json::Error> {
        if self.msg.is_empty() {
            return Ok(UpdateMap::new());
        }
        serde_json::from_str(&self.msg)
    }
}
