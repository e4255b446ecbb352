use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::registry::DEFAULT_MANAGED_FILES;

/// Which side of the heartbeat exchange this process plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Server,
    Worker,
}

/// Deployment mode. Encryption is only ever enabled in `Release`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Debug,
    Release,
}

#[derive(Clone, Deserialize, Serialize)]
pub struct Config {
    pub role: Role,
    pub run_mode: RunMode,
    /// Server bind host, and the host workers dial.
    pub host: String,
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypt_key: Option<String>,
    /// Root every managed file path is resolved under.
    pub root_path: PathBuf,
    pub managed_files: Vec<String>,
    pub worker_name: String,
    pub heartbeat_interval_secs: u64,
    pub request_timeout_secs: u64,
    /// Workers silent for longer than this drop out of the worker list.
    pub worker_max_age_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            role: Role::Worker,
            run_mode: RunMode::Release,
            host: "0.0.0.0".into(),
            port: 5000,
            encrypt_key: None,
            root_path: PathBuf::from("."),
            managed_files: DEFAULT_MANAGED_FILES.iter().map(|s| s.to_string()).collect(),
            worker_name: "worker".into(),
            heartbeat_interval_secs: 60,
            request_timeout_secs: 10,
            worker_max_age_secs: 180,
        }
    }
}

// The secret must not end up in startup logs.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("role", &self.role)
            .field("run_mode", &self.run_mode)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("encrypt_key", &self.encrypt_key.as_ref().map(|_| "<redacted>"))
            .field("root_path", &self.root_path)
            .field("managed_files", &self.managed_files)
            .field("worker_name", &self.worker_name)
            .field("heartbeat_interval_secs", &self.heartbeat_interval_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("worker_max_age_secs", &self.worker_max_age_secs)
            .finish()
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let mut config = Self::figment()
            .extract::<Config>()
            .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

        // Support Docker-style secrets
        if let Ok(secret_file) = std::env::var("HEARTSYNC_ENCRYPT_KEY_FILE") {
            config.encrypt_key = Some(std::fs::read_to_string(secret_file)?.trim().to_string());
        }

        if config.worker_name == Config::default().worker_name {
            if let Ok(hostname) = std::env::var("HOSTNAME") {
                config.worker_name = hostname;
            }
        }

        if config.heartbeat_interval_secs == 0 {
            anyhow::bail!("heartbeat_interval_secs must be greater than zero");
        }

        Ok(config)
    }

    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file("heartsync.toml"))
            .merge(Json::file("heartsync.json"))
            .merge(Env::prefixed("HEARTSYNC_").ignore(&["encrypt_key_file"]))
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn worker_max_age(&self) -> Duration {
        Duration::from_secs(self.worker_max_age_secs)
    }

    /// Address the server listens on. An empty host binds every IPv4
    /// interface; IPv6 literals may be given with or without brackets.
    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        let host = self.host.trim();
        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);
        let ip = if host.is_empty() {
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        } else {
            host.parse::<IpAddr>()
                .map_err(|e| anyhow::anyhow!("Invalid bind host {:?}: {}", self.host, e))?
        };
        Ok(SocketAddr::new(ip, self.port))
    }
}
