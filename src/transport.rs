//! The request/response channel a worker uses to reach the server.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};

use crate::error::HeartbeatError;

/// Path of the heartbeat endpoint on the server.
pub const HEARTBEAT_PATH: &str = "/worker-alive";

/// One synchronous POST round trip carrying opaque bytes.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post(&self, url: &str, body: Vec<u8>) -> Result<Vec<u8>, HeartbeatError>;
}

/// HTTP transport backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, HeartbeatError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(&self, url: &str, body: Vec<u8>) -> Result<Vec<u8>, HeartbeatError> {
        let response = self
            .client
            .post(url)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(HeartbeatError::Transport(format!(
                "server answered {} for {}",
                status, url
            )));
        }
        Ok(response.bytes().await?.to_vec())
    }
}
