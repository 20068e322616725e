//! Scripted in-process transport.
//!
//! Every link shares one broadcast bus, like a real chat channel: each
//! session sees the replies addressed to every other session. Per-account
//! scripts decide how each command is answered.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use secrecy::ExposeSecret;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::account::Credential;
use crate::error::TransportError;
use crate::transport::{
    AccountLink, Command, CommandHandle, CommandKind, Reply, ReplyStream, Transport,
};

const BUS_CAPACITY: usize = 256;

/// How a scripted send attempt resolves.
#[derive(Debug, Clone, PartialEq)]
pub enum SendResult {
    Accepted,
    RateLimited(Option<Duration>),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ScriptedReply {
    Embed(String),
    Plain(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    Live,
    HistoryOnly,
}

/// Scripted answer to one send attempt.
#[derive(Debug, Clone)]
pub struct Step {
    result: SendResult,
    reply: Option<ScriptedReply>,
    delay: Duration,
    delivery: Delivery,
}

impl Step {
    /// Accepted, no reply.
    pub fn ok() -> Self {
        Self {
            result: SendResult::Accepted,
            reply: None,
            delay: Duration::ZERO,
            delivery: Delivery::Live,
        }
    }

    /// Accepted; the service answers with an embed addressed to the account.
    pub fn embed(description: impl Into<String>) -> Self {
        Self {
            reply: Some(ScriptedReply::Embed(description.into())),
            ..Self::ok()
        }
    }

    /// Accepted; the service answers with plain text, verbatim.
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            reply: Some(ScriptedReply::Plain(text.into())),
            ..Self::ok()
        }
    }

    pub fn rate_limited(retry_after: Option<Duration>) -> Self {
        Self {
            result: SendResult::RateLimited(retry_after),
            ..Self::ok()
        }
    }

    pub fn fail(reason: impl Into<String>) -> Self {
        Self {
            result: SendResult::Failed(reason.into()),
            ..Self::ok()
        }
    }

    /// Post the reply after `delay`.
    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Record the reply in channel history without delivering it live.
    pub fn history_only(mut self) -> Self {
        self.delivery = Delivery::HistoryOnly;
        self
    }
}

/// Behaviour of one scripted account.
#[derive(Debug, Clone)]
pub struct AccountScript {
    secret: String,
    identity: String,
    steps: HashMap<CommandKind, VecDeque<Step>>,
    unavailable: HashSet<CommandKind>,
    login_error: Option<String>,
}

impl AccountScript {
    pub fn new(secret: impl Into<String>, identity: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            identity: identity.into(),
            steps: HashMap::new(),
            unavailable: HashSet::new(),
            login_error: None,
        }
    }

    /// Queue the answer for the next unanswered `kind` attempt. Attempts
    /// beyond the queue are accepted without a reply.
    pub fn on(mut self, kind: CommandKind, step: Step) -> Self {
        self.steps.entry(kind).or_default().push_back(step);
        self
    }

    pub fn without_command(mut self, kind: CommandKind) -> Self {
        self.unavailable.insert(kind);
        self
    }

    pub fn failing_login(mut self, reason: impl Into<String>) -> Self {
        self.login_error = Some(reason.into());
        self
    }
}

/// A send attempt observed by the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct SentCommand {
    pub identity: String,
    pub command: Command,
    pub result: SendResult,
}

struct Bus {
    tx: broadcast::Sender<Reply>,
    history: Mutex<Vec<Reply>>,
    accounts: Mutex<HashMap<String, AccountScript>>,
    sent: Mutex<Vec<SentCommand>>,
    closed: Mutex<Vec<String>>,
    next_id: AtomicU64,
    service_author: String,
}

impl Bus {
    fn next_id(&self) -> String {
        self.next_id.fetch_add(1, Ordering::Relaxed).to_string()
    }

    fn deliver(&self, reply: Reply, delivery: Delivery) {
        self.history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(reply.clone());
        if delivery == Delivery::Live {
            // No subscribers is fine: nobody is listening yet.
            let _ = self.tx.send(reply);
        }
    }
}

/// Scripted transport sharing one in-process channel.
#[derive(Clone)]
pub struct MemoryTransport {
    bus: Arc<Bus>,
}

impl MemoryTransport {
    pub fn new(service_author: impl Into<String>) -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self {
            bus: Arc::new(Bus {
                tx,
                history: Mutex::new(Vec::new()),
                accounts: Mutex::new(HashMap::new()),
                sent: Mutex::new(Vec::new()),
                closed: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
                service_author: service_author.into(),
            }),
        }
    }

    pub fn register(&self, script: AccountScript) {
        self.bus
            .accounts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(script.secret.clone(), script);
    }

    /// Post a reply live (and into history).
    pub fn publish(&self, reply: Reply) {
        self.bus.deliver(reply, Delivery::Live);
    }

    pub fn sent_commands(&self) -> Vec<SentCommand> {
        self.bus
            .sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Identities whose links were closed, in close order.
    pub fn closed_identities(&self) -> Vec<String> {
        self.bus
            .closed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn connect(
        &self,
        credential: &Credential,
    ) -> Result<Arc<dyn AccountLink>, TransportError> {
        let script = self
            .bus
            .accounts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(credential.secret().expose_secret())
            .ok_or_else(|| TransportError::Connect {
                reason: format!("unknown credential {}", credential.label()),
            })?;

        if let Some(reason) = script.login_error {
            return Err(TransportError::Connect { reason });
        }

        Ok(Arc::new(MemoryLink {
            identity: script.identity,
            steps: Mutex::new(script.steps),
            unavailable: script.unavailable,
            bus: Arc::clone(&self.bus),
            closed: AtomicBool::new(false),
        }))
    }
}

struct MemoryLink {
    identity: String,
    steps: Mutex<HashMap<CommandKind, VecDeque<Step>>>,
    unavailable: HashSet<CommandKind>,
    bus: Arc<Bus>,
    closed: AtomicBool,
}

impl MemoryLink {
    fn next_step(&self, kind: CommandKind) -> Step {
        self.steps
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get_mut(&kind)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(Step::ok)
    }

    fn build_reply(&self, scripted: ScriptedReply) -> Reply {
        let id = self.bus.next_id();
        match scripted {
            ScriptedReply::Embed(description) => {
                Reply::embed(id, &self.bus.service_author, &self.identity, description)
            }
            ScriptedReply::Plain(text) => Reply::plain(id, &self.bus.service_author, text),
        }
    }
}

#[async_trait]
impl AccountLink for MemoryLink {
    fn identity(&self) -> &str {
        &self.identity
    }

    async fn resolve_command(&self, kind: CommandKind) -> Result<CommandHandle, TransportError> {
        if self.unavailable.contains(&kind) {
            return Err(TransportError::CommandUnavailable {
                command: kind.to_string(),
            });
        }
        Ok(CommandHandle {
            kind,
            id: format!("memory:{kind}"),
        })
    }

    async fn send_command(
        &self,
        handle: &CommandHandle,
        command: &Command,
    ) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        debug_assert_eq!(handle.kind, command.kind());

        let step = self.next_step(command.kind());
        self.bus
            .sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(SentCommand {
                identity: self.identity.clone(),
                command: command.clone(),
                result: step.result.clone(),
            });

        match step.result {
            SendResult::Accepted => {}
            SendResult::RateLimited(retry_after) => {
                return Err(TransportError::RateLimited { retry_after });
            }
            SendResult::Failed(reason) => {
                return Err(TransportError::SendFailed {
                    command: command.kind().to_string(),
                    reason,
                });
            }
        }

        if let Some(scripted) = step.reply {
            let reply = self.build_reply(scripted);
            if step.delay.is_zero() {
                self.bus.deliver(reply, step.delivery);
            } else {
                let bus = Arc::clone(&self.bus);
                let (delay, delivery) = (step.delay, step.delivery);
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    bus.deliver(reply, delivery);
                });
            }
        }
        Ok(())
    }

    fn subscribe(&self) -> ReplyStream {
        BroadcastStream::new(self.bus.tx.subscribe())
            .filter_map(|item| futures::future::ready(item.ok()))
            .boxed()
    }

    async fn fetch_recent_history(&self, limit: usize) -> Result<Vec<Reply>, TransportError> {
        let history = self
            .bus
            .history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(history.iter().rev().take(limit).cloned().collect())
    }

    async fn close(&self) -> Result<(), TransportError> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.bus
                .closed
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .push(self.identity.clone());
        }
        Ok(())
    }
}
