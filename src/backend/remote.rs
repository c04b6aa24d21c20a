//! HTTP/WebSocket client for the shared store server

use super::{Backend, BackendMode, Subscription, TallyCallback};
use crate::common::{
    join_path, websocket_url, ClientConfig, Error, Result, RetryPolicy, Tally, TallyEvent,
};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use reqwest::StatusCode;
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

pub const TALLY_PATH: &str = "/tally";
pub const WATCH_WS_PATH: &str = "/tally/watch/ws";

pub struct RemoteBackend {
    base_url: String,
    http: reqwest::Client,
    reconnect: RetryPolicy,
}

impl RemoteBackend {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .connect_timeout(request_timeout)
            .build()
            .map_err(|e| Error::InvalidConfig(format!("http client: {}", e)))?;
        Ok(Self {
            base_url: base_url.into(),
            http,
            reconnect: RetryPolicy::new(5, Duration::from_millis(250)),
        })
    }

    /// Remote backend for `config.server_url`, if one is configured
    pub fn from_config(config: &ClientConfig) -> Result<Option<Self>> {
        match &config.server_url {
            Some(url) => {
                let backend = Self::new(url.clone(), config.request_timeout())?
                    .with_reconnect(RetryPolicy::new(
                        config.reconnect_attempts,
                        Duration::from_millis(config.init_retry_delay_ms),
                    ));
                Ok(Some(backend))
            }
            None => Ok(None),
        }
    }

    /// Reconnection policy for the live subscription
    pub fn with_reconnect(mut self, policy: RetryPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn tally_url(&self) -> String {
        join_path(&self.base_url, TALLY_PATH)
    }

    /// Liveness probe against `/health`
    pub async fn health(&self) -> Result<()> {
        let response = self
            .http
            .get(join_path(&self.base_url, "/health"))
            .send()
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Error::BackendUnavailable(format!(
                "health check returned {}",
                response.status()
            )))
        }
    }
}

/// Classify a non-success response the way the coordinator needs it.
async fn status_error(response: reqwest::Response) -> Error {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if status.is_server_error() {
        Error::BackendUnavailable(format!("{}: {}", status, body))
    } else if status.is_client_error() {
        Error::BackendWriteRejected(format!("{}: {}", status, body))
    } else {
        Error::Other(format!("unexpected status {}: {}", status, body))
    }
}

#[async_trait]
impl Backend for RemoteBackend {
    fn mode(&self) -> BackendMode {
        BackendMode::Remote
    }

    async fn read(&self) -> Result<Option<Tally>> {
        let response = self.http.get(self.tally_url()).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.json::<Tally>().await?)),
            status if status.is_server_error() => Err(status_error(response).await),
            status => Err(Error::Other(format!("read returned {}", status))),
        }
    }

    async fn write(&self, tally: Tally) -> Result<()> {
        let response = self.http.put(self.tally_url()).json(&tally).send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(status_error(response).await)
        }
    }

    fn subscribe(&self, on_change: TallyCallback) -> Result<Subscription> {
        let url = websocket_url(&self.base_url, WATCH_WS_PATH)?;
        let policy = self.reconnect.clone();
        let task = tokio::spawn(run_subscription(url, on_change, policy));
        Ok(Subscription::from_task(task))
    }
}

/// Read change events until the socket closes, then reconnect with backoff.
/// Gives up after `policy.max_attempts` consecutive failed connects.
async fn run_subscription(url: String, on_change: TallyCallback, policy: RetryPolicy) {
    let mut failures: u32 = 0;

    loop {
        match tokio_tungstenite::connect_async(url.as_str()).await {
            Ok((stream, _response)) => {
                failures = 0;
                info!(url = %url, "live tally subscription connected");
                let (mut write, mut read) = stream.split();

                while let Some(message) = read.next().await {
                    match message {
                        Ok(Message::Text(text)) => match serde_json::from_str::<TallyEvent>(&text) {
                            Ok(event) => on_change(event.tally),
                            Err(e) => warn!(error = %e, "ignoring malformed tally event"),
                        },
                        Ok(Message::Ping(data)) => {
                            let _ = write.send(Message::Pong(data)).await;
                        }
                        Ok(Message::Close(_)) => {
                            debug!(url = %url, "server closed live subscription");
                            break;
                        }
                        Ok(_) => {}
                        Err(e) => {
                            warn!(url = %url, error = %e, "live subscription read error");
                            break;
                        }
                    }
                }
            }
            Err(e) => {
                failures += 1;
                warn!(url = %url, attempt = failures, error = %e, "live subscription connect failed");
                if failures >= policy.max_attempts {
                    warn!(url = %url, "giving up on live tally updates");
                    return;
                }
            }
        }

        tokio::time::sleep(policy.delay_for(failures.max(1))).await;
    }
}
