//! Configuration for revealpoll components

use crate::common::{Error, Result, StorageKind, VoteOption};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment prefix, e.g. `REVEALPOLL__CLIENT__SERVER_URL`
pub const ENV_PREFIX: &str = "REVEALPOLL";

/// Global configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub client: ClientConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub reveal: RevealConfig,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load from an optional TOML file, then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        } else {
            builder = builder.add_source(config::File::with_name("revealpoll").required(false));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__"),
        );

        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.client.init_attempts == 0 {
            return Err(Error::InvalidConfig(
                "client.init_attempts must be at least 1".into(),
            ));
        }
        if let Some(url) = &self.client.server_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(Error::InvalidConfig(format!(
                    "client.server_url must be http(s): {}",
                    url
                )));
            }
        }
        if self.server.watch_capacity == 0 {
            return Err(Error::InvalidConfig(
                "server.watch_capacity must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Client (voter) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the shared store; `None` means local-only
    #[serde(default)]
    pub server_url: Option<String>,

    /// Directory for the client-local state file
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Attempts to reach the shared store during init
    #[serde(default = "default_init_attempts")]
    pub init_attempts: u32,

    #[serde(default = "default_init_retry_delay")]
    pub init_retry_delay_ms: u64,

    /// Per-attempt deadline during init
    #[serde(default = "default_init_timeout")]
    pub init_timeout_ms: u64,

    /// Consecutive live-subscription reconnects before giving up
    #[serde(default = "default_reconnect_attempts")]
    pub reconnect_attempts: u32,
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("./revealpoll-state")
}
fn default_request_timeout() -> u64 {
    3_000
}
fn default_init_attempts() -> u32 {
    3
}
fn default_init_retry_delay() -> u64 {
    200
}
fn default_init_timeout() -> u64 {
    2_000
}
fn default_reconnect_attempts() -> u32 {
    5
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: None,
            state_dir: default_state_dir(),
            request_timeout_ms: default_request_timeout(),
            init_attempts: default_init_attempts(),
            init_retry_delay_ms: default_init_retry_delay(),
            init_timeout_ms: default_init_timeout(),
            reconnect_attempts: default_reconnect_attempts(),
        }
    }
}

impl ClientConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn init_timeout(&self) -> Duration {
        Duration::from_millis(self.init_timeout_ms)
    }

    /// File holding the vote flag and the cached tally
    pub fn state_file(&self) -> PathBuf {
        self.state_dir.join("client.json")
    }
}

/// Shared store server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address for HTTP
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,

    #[serde(default)]
    pub storage: StorageKind,

    #[serde(default = "default_data_path")]
    pub data_path: PathBuf,

    /// Refuse writes that would decrement a counter
    #[serde(default = "default_true")]
    pub reject_regressions: bool,

    /// Buffered change events per slow subscriber
    #[serde(default = "default_watch_capacity")]
    pub watch_capacity: usize,

    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}
fn default_data_path() -> PathBuf {
    PathBuf::from("./revealpoll-data/tally.json")
}
fn default_true() -> bool {
    true
}
fn default_watch_capacity() -> usize {
    100
}
fn default_max_body_bytes() -> usize {
    4096
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            storage: StorageKind::default(),
            data_path: default_data_path(),
            reject_regressions: true,
            watch_capacity: default_watch_capacity(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

/// Scripted reveal settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevealConfig {
    #[serde(default = "default_countdown_secs")]
    pub countdown_secs: u64,

    /// The option revealed when the countdown ends
    #[serde(default = "default_reveal_result")]
    pub result: VoteOption,

    /// Optional display name announced with the reveal
    #[serde(default)]
    pub name: Option<String>,
}

fn default_countdown_secs() -> u64 {
    5
}
fn default_reveal_result() -> VoteOption {
    VoteOption::A
}

impl Default for RevealConfig {
    fn default() -> Self {
        Self {
            countdown_secs: default_countdown_secs(),
            result: default_reveal_result(),
            name: None,
        }
    }
}
