//! HTTP client for a messaging relay sidecar.
//!
//! The relay owns the chat connection for each logged-in credential and
//! exposes it over a small JSON API:
//!
//! - `POST   /sessions`                      `{token, channel_id}` -> `{session_id, identity}`
//! - `GET    /sessions/{id}/commands/{kind}` -> `CommandHandle` (404 when unavailable)
//! - `POST   /sessions/{id}/commands`        `{handle_id, command}`; 429 + `Retry-After`
//!   when rate limited
//! - `GET    /sessions/{id}/replies?cursor=` -> `{replies, cursor}`; without a cursor only
//!   a fresh cursor is returned
//! - `GET    /sessions/{id}/history?limit=`  -> `[Reply]`, newest first
//! - `DELETE /sessions/{id}`

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::account::Credential;
use crate::config::RelayConfig;
use crate::error::TransportError;
use crate::transport::{
    AccountLink, Command, CommandHandle, CommandKind, Reply, ReplyStream, Transport,
};

const REPLY_BUFFER: usize = 64;

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    token: &'a str,
    channel_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    session_id: String,
    identity: String,
}

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    handle_id: &'a str,
    command: &'a Command,
}

#[derive(Debug, Deserialize)]
struct ReplyPage {
    #[serde(default)]
    replies: Vec<Reply>,
    cursor: String,
}

/// Transport backed by a relay sidecar.
pub struct RelayTransport {
    client: Client,
    base_url: String,
    channel_id: String,
    poll_interval: Duration,
}

impl RelayTransport {
    pub fn new(
        config: &RelayConfig,
        channel_id: impl Into<String>,
    ) -> Result<Self, TransportError> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.as_str().trim_end_matches('/').to_string(),
            channel_id: channel_id.into(),
            poll_interval: config.poll_interval,
        })
    }
}

#[async_trait]
impl Transport for RelayTransport {
    async fn connect(
        &self,
        credential: &Credential,
    ) -> Result<Arc<dyn AccountLink>, TransportError> {
        let response = self
            .client
            .post(format!("{}/sessions", self.base_url))
            .json(&LoginRequest {
                token: credential.secret().expose_secret(),
                channel_id: &self.channel_id,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Connect {
                reason: format!("relay answered HTTP {}", status.as_u16()),
            });
        }
        let login: LoginResponse = response.json().await?;
        tracing::debug!(
            account = %credential.label(),
            identity = %login.identity,
            "relay session opened"
        );

        Ok(Arc::new(RelayLink {
            client: self.client.clone(),
            session_url: format!("{}/sessions/{}", self.base_url, login.session_id),
            identity: login.identity,
            poll_interval: self.poll_interval,
            closed: Arc::new(AtomicBool::new(false)),
        }))
    }
}

struct RelayLink {
    client: Client,
    session_url: String,
    identity: String,
    poll_interval: Duration,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl AccountLink for RelayLink {
    fn identity(&self) -> &str {
        &self.identity
    }

    async fn resolve_command(&self, kind: CommandKind) -> Result<CommandHandle, TransportError> {
        let response = self
            .client
            .get(format!("{}/commands/{}", self.session_url, kind.as_str()))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(TransportError::CommandUnavailable {
                command: kind.to_string(),
            });
        }
        Ok(response.error_for_status()?.json().await?)
    }

    async fn send_command(
        &self,
        handle: &CommandHandle,
        command: &Command,
    ) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let response = self
            .client
            .post(format!("{}/commands", self.session_url))
            .json(&SendRequest {
                handle_id: &handle.id,
                command,
            })
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(TransportError::RateLimited {
                retry_after: retry_after(response.headers()),
            });
        }
        if !status.is_success() {
            return Err(TransportError::SendFailed {
                command: command.kind().to_string(),
                reason: format!("relay answered HTTP {}", status.as_u16()),
            });
        }
        Ok(())
    }

    fn subscribe(&self) -> ReplyStream {
        let (tx, rx) = mpsc::channel(REPLY_BUFFER);
        let client = self.client.clone();
        let url = format!("{}/replies", self.session_url);
        let closed = Arc::clone(&self.closed);
        let poll_interval = self.poll_interval;

        tokio::spawn(async move {
            let mut cursor: Option<String> = None;
            let mut ticker = tokio::time::interval(poll_interval);
            loop {
                ticker.tick().await;
                if closed.load(Ordering::SeqCst) || tx.is_closed() {
                    break;
                }
                match poll_replies(&client, &url, cursor.as_deref()).await {
                    Ok(page) => {
                        cursor = Some(page.cursor);
                        for reply in page.replies {
                            if tx.send(reply).await.is_err() {
                                return;
                            }
                        }
                    }
                    Err(e) => tracing::debug!(error = %e, "reply poll failed"),
                }
            }
        });

        ReceiverStream::new(rx).boxed()
    }

    async fn fetch_recent_history(&self, limit: usize) -> Result<Vec<Reply>, TransportError> {
        let response = self
            .client
            .get(format!("{}/history", self.session_url))
            .query(&[("limit", limit)])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::History {
                reason: format!("relay answered HTTP {}", status.as_u16()),
            });
        }
        Ok(response.json().await?)
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.client
            .delete(&self.session_url)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

async fn poll_replies(
    client: &Client,
    url: &str,
    cursor: Option<&str>,
) -> Result<ReplyPage, TransportError> {
    let mut request = client.get(url);
    if let Some(cursor) = cursor {
        request = request.query(&[("cursor", cursor)]);
    }
    Ok(request.send().await?.error_for_status()?.json().await?)
}

/// `Retry-After` in (possibly fractional) seconds.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64)
}
