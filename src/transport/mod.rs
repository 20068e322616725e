//! Messaging transport abstraction.
//!
//! A [`Transport`] logs a credential in and hands back an [`AccountLink`]:
//! the per-account handle used to send remote commands, watch the shared
//! reply channel and read recent history.
//!
//! Two implementations ship with the crate:
//! - [`relay::RelayTransport`]: HTTP client for a messaging relay sidecar.
//! - [`memory::MemoryTransport`]: scripted in-process bus for tests and
//!   dry runs.

pub mod memory;
pub mod relay;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::account::Credential;
use crate::classifier::ReplyBody;
use crate::error::TransportError;

/// Lazy, unbounded stream of replies seen on the channel.
pub type ReplyStream = BoxStream<'static, Reply>;

/// Structured part of a reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Embed {
    #[serde(default)]
    pub author_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// One message observed on the channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub id: String,
    pub author_id: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub embeds: Vec<Embed>,
}

impl Reply {
    pub fn plain(
        id: impl Into<String>,
        author_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            author_id: author_id.into(),
            content: content.into(),
            embeds: Vec::new(),
        }
    }

    pub fn embed(
        id: impl Into<String>,
        author_id: impl Into<String>,
        embed_author: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            author_id: author_id.into(),
            content: String::new(),
            embeds: vec![Embed {
                author_name: Some(embed_author.into()),
                description: Some(description.into()),
            }],
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    /// Readable bodies: the first embed (when it has an author and a
    /// description), then the plain content.
    pub fn bodies(&self) -> impl Iterator<Item = ReplyBody<'_>> {
        let embed = self.embeds.first().and_then(|embed| {
            match (embed.author_name.as_deref(), embed.description.as_deref()) {
                (Some(author), Some(description)) => Some(ReplyBody::Embed {
                    author,
                    description,
                }),
                _ => None,
            }
        });
        let plain = (!self.content.trim().is_empty()).then_some(ReplyBody::Plain(&self.content));
        embed.into_iter().chain(plain)
    }
}

/// Remote command families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Work,
    Collect,
    Deposit,
    Pay,
}

impl CommandKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Work => "work",
            Self::Collect => "collect",
            Self::Deposit => "deposit",
            Self::Pay => "pay",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sessions always sweep the whole cash balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepositAmount {
    All,
}

/// A remote command with its parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Command {
    Work,
    Collect,
    Deposit { amount: DepositAmount },
    Pay { target: String, amount: u64 },
}

impl Command {
    pub fn deposit_all() -> Self {
        Self::Deposit {
            amount: DepositAmount::All,
        }
    }

    pub fn kind(&self) -> CommandKind {
        match self {
            Self::Work => CommandKind::Work,
            Self::Collect => CommandKind::Collect,
            Self::Deposit { .. } => CommandKind::Deposit,
            Self::Pay { .. } => CommandKind::Pay,
        }
    }
}

/// Transport-side identifier of a resolved remote command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandHandle {
    pub kind: CommandKind,
    pub id: String,
}

/// Logs credentials in.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(
        &self,
        credential: &Credential,
    ) -> Result<Arc<dyn AccountLink>, TransportError>;
}

/// A logged-in account on the shared channel.
#[async_trait]
pub trait AccountLink: Send + Sync {
    /// Name the service uses when addressing this account.
    fn identity(&self) -> &str;

    async fn resolve_command(&self, kind: CommandKind) -> Result<CommandHandle, TransportError>;

    /// Send one command. `TransportError::RateLimited` is the transient
    /// signal; any other error is a hard failure for this attempt.
    async fn send_command(
        &self,
        handle: &CommandHandle,
        command: &Command,
    ) -> Result<(), TransportError>;

    /// Replies posted to the channel from now on, by any author.
    fn subscribe(&self) -> ReplyStream;

    /// Up to `limit` past replies, newest first.
    async fn fetch_recent_history(&self, limit: usize) -> Result<Vec<Reply>, TransportError>;

    async fn close(&self) -> Result<(), TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bodies_yield_embed_then_content() {
        let reply = Reply::embed("1", "bot", "me", "desc").with_content("text");
        let bodies: Vec<ReplyBody<'_>> = reply.bodies().collect();
        assert_eq!(
            bodies,
            vec![
                ReplyBody::Embed {
                    author: "me",
                    description: "desc"
                },
                ReplyBody::Plain("text"),
            ]
        );
    }

    #[test]
    fn embed_without_author_is_skipped() {
        let mut reply = Reply::plain("1", "bot", "   ");
        reply.embeds.push(Embed {
            author_name: None,
            description: Some("desc".to_string()),
        });
        assert_eq!(reply.bodies().count(), 0);
    }

    #[test]
    fn command_wire_shape() {
        let json = serde_json::to_value(Command::deposit_all()).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "deposit", "amount": "all"}));

        let pay = Command::Pay {
            target: "42".to_string(),
            amount: 3_000,
        };
        assert_eq!(pay.kind(), CommandKind::Pay);
        let json = serde_json::to_value(&pay).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "pay", "target": "42", "amount": 3000}));
    }
}
