//! Liveness table of workers that have checked in.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::info;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::types::WorkerStatus;

#[derive(Debug, Clone, Serialize)]
pub struct WorkerRecord {
    pub status: WorkerStatus,
    /// Server clock when the last heartbeat arrived.
    pub last_seen: DateTime<Utc>,
}

/// Shared map of worker name → last reported status.
#[derive(Debug, Clone, Default)]
pub struct WorkerTable {
    inner: Arc<RwLock<HashMap<String, WorkerRecord>>>,
}

impl WorkerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, status: WorkerStatus) {
        let name = status.worker_name.clone();
        let record = WorkerRecord {
            status,
            last_seen: Utc::now(),
        };
        let mut map = self.inner.write().await;
        if map.insert(name.clone(), record).is_none() {
            info!("Worker {} checked in for the first time", name);
        }
    }

    pub async fn snapshot(&self) -> HashMap<String, WorkerRecord> {
        self.inner.read().await.clone()
    }

    /// Workers whose last heartbeat is no older than `max_age`, by name.
    pub async fn alive_workers(&self, max_age: Duration) -> Vec<WorkerRecord> {
        let max_age = chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX);
        let cutoff = Utc::now()
            .checked_sub_signed(max_age)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let map = self.inner.read().await;
        let mut alive: Vec<_> = map
            .values()
            .filter(|r| r.last_seen >= cutoff)
            .cloned()
            .collect();
        alive.sort_by(|a, b| a.status.worker_name.cmp(&b.status.worker_name));
        alive
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn latest_status_wins() {
        let table = WorkerTable::new();
        let mut status = WorkerStatus::new("w1");
        table.record(status.clone()).await;
        status.heartbeat_count = 7;
        table.record(status).await;

        let snap = table.snapshot().await;
        assert_eq!(snap.len(), 1);
        assert_eq!(snap["w1"].status.heartbeat_count, 7);
    }

    #[tokio::test]
    async fn stale_workers_are_not_alive() {
        let table = WorkerTable::new();
        table.record(WorkerStatus::new("b")).await;
        table.record(WorkerStatus::new("a")).await;
        table.inner.write().await.get_mut("b").unwrap().last_seen = Utc::now() - chrono::Duration::minutes(10);

        let alive = table.alive_workers(Duration::from_secs(180)).await;
        let names: Vec<_> = alive.iter().map(|r| r.status.worker_name.as_str()).collect();
        assert_eq!(names, vec!["a"]);
    }
}
