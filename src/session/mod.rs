//! Per-account session state machine.
//!
//! ```text
//! Start -> AwaitWork -> AwaitCollect -> Commission -> Deposit -> Done
//!    \________________________ Failed ___________________________/
//! ```
//!
//! A session owns its transport link for its whole lifetime and always
//! closes it, whatever the outcome. Every failure is folded into the
//! returned [`AccountResult`]; nothing escapes to the coordinator.

pub mod feed;
pub mod gate;
pub mod recovery;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::account::{CommissionRates, Credential};
use crate::classifier::{ReplyOutcome, format_amount};
use crate::error::SessionError;
use crate::executor::CommandExecutor;
use crate::tally::{AccountResult, CooldownReport, TallyHandle};
use crate::transport::{AccountLink, Command, CommandKind, Transport};

pub use feed::ReplyFeed;
pub use gate::{CommissionGate, CommissionTicket};
pub use recovery::{Recovered, recover_from_history};

/// Timing and routing shared by every session of a run.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Pause between consecutive commands.
    pub settle_delay: Duration,
    pub work_reply_timeout: Duration,
    pub collect_reply_timeout: Duration,
    /// Whole-session deadline.
    pub account_budget: Duration,
    /// Replies scanned by history recovery.
    pub history_limit: usize,
    /// Commission recipient.
    pub beneficiary: Option<String>,
    /// Only replies from this author are considered; `None` accepts all.
    pub service_author: Option<String>,
    pub rates: CommissionRates,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_secs(2),
            work_reply_timeout: Duration::from_secs(10),
            collect_reply_timeout: Duration::from_secs(5),
            account_budget: Duration::from_secs(120),
            history_limit: 10,
            beneficiary: None,
            service_author: None,
            rates: CommissionRates::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Start,
    AwaitWork,
    AwaitCollect,
    Commission,
    Deposit,
    Done,
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Start => "start",
            Self::AwaitWork => "await_work",
            Self::AwaitCollect => "await_collect",
            Self::Commission => "commission",
            Self::Deposit => "deposit",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// What a session learned before it ended; survives a budget overrun.
#[derive(Debug)]
struct Progress {
    state: SessionState,
    collected: u64,
    commission: u64,
}

impl Progress {
    fn new() -> Self {
        Self {
            state: SessionState::Start,
            collected: 0,
            commission: 0,
        }
    }

    fn enter(&mut self, account: &str, state: SessionState) {
        tracing::debug!(account, from = %self.state, to = %state, "session transition");
        self.state = state;
    }
}

pub struct AccountSession {
    credential: Credential,
    transport: Arc<dyn Transport>,
    executor: CommandExecutor,
    settings: Arc<SessionSettings>,
    tally: TallyHandle,
    gate: CommissionGate,
    ticket: Option<CommissionTicket>,
}

impl AccountSession {
    pub fn new(
        credential: Credential,
        transport: Arc<dyn Transport>,
        executor: CommandExecutor,
        settings: Arc<SessionSettings>,
        tally: TallyHandle,
        gate: CommissionGate,
    ) -> Self {
        Self {
            credential,
            transport,
            executor,
            settings,
            tally,
            gate,
            ticket: None,
        }
    }

    /// Attach the gate ticket this session releases after its commission step.
    pub fn with_ticket(mut self, ticket: CommissionTicket) -> Self {
        self.ticket = Some(ticket);
        self
    }

    /// Drive the account to completion. Never fails; the outcome is recorded
    /// in the tally and returned.
    pub async fn run(mut self) -> AccountResult {
        let label = self.credential.label().to_string();
        let tier = self.credential.tier();
        let budget = self.settings.account_budget;
        let ticket = self.ticket.take();

        let mut link: Option<Arc<dyn AccountLink>> = None;
        let mut progress = Progress::new();

        let outcome =
            match tokio::time::timeout(budget, self.drive(&mut link, &mut progress, ticket)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(SessionError::Timeout { budget }),
            };

        if let Some(link) = link.take()
            && let Err(e) = link.close().await
        {
            tracing::debug!(account = %label, error = %e, "closing transport failed");
        }

        let result = match outcome {
            Ok(()) => {
                tracing::info!(
                    account = %label,
                    collected = progress.collected,
                    commission = progress.commission,
                    "session complete"
                );
                AccountResult {
                    account: label,
                    tier,
                    succeeded: true,
                    collected_amount: progress.collected,
                    commission: progress.commission,
                    error_message: None,
                }
            }
            Err(e) => {
                let message = e.to_string();
                tracing::warn!(
                    account = %label,
                    state = %progress.state,
                    error = %message,
                    "session failed"
                );
                progress.enter(&label, SessionState::Failed);
                self.tally.failure(label.clone(), message.clone());
                AccountResult {
                    account: label,
                    tier,
                    succeeded: false,
                    collected_amount: progress.collected,
                    commission: progress.commission,
                    error_message: Some(message),
                }
            }
        };

        self.tally.finished(result.clone());
        result
    }

    async fn drive(
        &self,
        slot: &mut Option<Arc<dyn AccountLink>>,
        progress: &mut Progress,
        ticket: Option<CommissionTicket>,
    ) -> Result<(), SessionError> {
        let label = self.credential.label();
        let tier = self.credential.tier();

        let link = self.transport.connect(&self.credential).await?;
        *slot = Some(Arc::clone(&link));
        let identity = link.identity().to_string();
        tracing::info!(account = %label, identity = %identity, tier = %tier, "logged in");

        let work = link.resolve_command(CommandKind::Work).await?;
        let collect = link.resolve_command(CommandKind::Collect).await?;
        let deposit = link.resolve_command(CommandKind::Deposit).await?;

        // Subscribe before the first send so no reply is missed.
        let mut feed = ReplyFeed::new(
            link.subscribe(),
            identity.as_str(),
            self.settings.service_author.clone(),
        );
        self.settle().await;

        progress.enter(label, SessionState::AwaitWork);
        if self.executor.execute(link.as_ref(), &work, &Command::Work).await {
            match feed
                .next_outcome(self.settings.work_reply_timeout, ReplyOutcome::is_related)
                .await
            {
                Some(ReplyOutcome::WorkCooldown {
                    ready_at: Some(ready_at),
                }) => {
                    tracing::info!(account = %label, ready_at = %ready_at, "work on cooldown")
                }
                Some(outcome) => {
                    tracing::debug!(account = %label, outcome = outcome.name(), "work reply")
                }
                None => tracing::info!(account = %label, "no work reply before timeout"),
            }
        } else {
            tracing::warn!(account = %label, "work command failed, continuing");
        }

        self.settle().await;
        progress.enter(label, SessionState::AwaitCollect);
        let collected = if self
            .executor
            .execute(link.as_ref(), &collect, &Command::Collect)
            .await
        {
            self.await_collect(link.as_ref(), &mut feed).await
        } else {
            tracing::warn!(account = %label, "collect command failed, continuing");
            0
        };
        progress.collected = collected;

        if collected > 0 && tier.pays_commission() {
            progress.enter(label, SessionState::Commission);
            progress.commission = self.pay_commission(link.as_ref(), collected).await;
        }
        if let Some(ticket) = ticket {
            ticket.release();
        }

        if collected > 0 && !tier.pays_commission() && self.gate.pending() > 0 {
            tracing::info!(
                account = %label,
                pending = self.gate.pending(),
                "waiting for commission accounts before depositing"
            );
            self.gate.settled().await;
            self.settle().await;
        }

        progress.enter(label, SessionState::Deposit);
        if !self
            .executor
            .execute(link.as_ref(), &deposit, &Command::deposit_all())
            .await
        {
            return Err(SessionError::DepositFailed);
        }
        match feed
            .next_outcome(self.settings.collect_reply_timeout, |outcome| {
                matches!(
                    outcome,
                    ReplyOutcome::DepositConfirmed { .. } | ReplyOutcome::DepositEmpty
                )
            })
            .await
        {
            Some(ReplyOutcome::DepositConfirmed {
                amount: Some(amount),
            }) => tracing::info!(account = %label, amount, "deposited"),
            Some(ReplyOutcome::DepositEmpty) => {
                tracing::info!(account = %label, "nothing to deposit")
            }
            _ => tracing::debug!(account = %label, "deposit sent, no confirmation seen"),
        }

        progress.enter(label, SessionState::Done);
        Ok(())
    }

    async fn settle(&self) {
        tokio::time::sleep(self.settings.settle_delay).await;
    }

    async fn await_collect(&self, link: &dyn AccountLink, feed: &mut ReplyFeed) -> u64 {
        let label = self.credential.label();
        match feed
            .next_outcome(
                self.settings.collect_reply_timeout,
                ReplyOutcome::is_collect_result,
            )
            .await
        {
            Some(ReplyOutcome::CollectSuccess {
                total_amount,
                per_role_amounts,
            }) => {
                tracing::info!(
                    account = %label,
                    total = total_amount,
                    roles = per_role_amounts.len(),
                    "income collected"
                );
                total_amount
            }
            Some(ReplyOutcome::CollectCooldown { cooldowns }) => {
                tracing::info!(account = %label, entries = cooldowns.len(), "collect on cooldown");
                self.tally.cooldown(CooldownReport {
                    account: label.to_string(),
                    cooldowns,
                });
                0
            }
            Some(other) => {
                tracing::debug!(
                    account = %label,
                    outcome = other.name(),
                    "unexpected collect reply"
                );
                0
            }
            None => self.recover(link, feed.subject()).await,
        }
    }

    async fn recover(&self, link: &dyn AccountLink, subject: &str) -> u64 {
        let label = self.credential.label();
        tracing::info!(account = %label, "no collect reply, scanning recent history");
        let history = match link.fetch_recent_history(self.settings.history_limit).await {
            Ok(history) => history,
            Err(e) => {
                tracing::warn!(account = %label, error = %e, "history unavailable");
                return 0;
            }
        };
        let Some(recovered) =
            recover_from_history(&history, subject, self.settings.service_author.as_deref())
        else {
            tracing::info!(account = %label, "nothing recoverable in history");
            return 0;
        };
        let amount = recovered.amount();
        match recovered {
            Recovered::Collected(_) => {
                tracing::info!(account = %label, amount, "recovered collection from history")
            }
            Recovered::EstimatedFromDeposit(_) => {
                tracing::info!(account = %label, amount, "estimated collection from deposit")
            }
        }
        amount
    }

    /// Returns the commission actually paid.
    async fn pay_commission(&self, link: &dyn AccountLink, collected: u64) -> u64 {
        let label = self.credential.label();
        let amount = self
            .settings
            .rates
            .commission(self.credential.tier(), collected);
        if amount == 0 {
            return 0;
        }
        let Some(beneficiary) = self.settings.beneficiary.as_deref() else {
            tracing::warn!(account = %label, amount, "no commission recipient configured");
            self.tally.failure(
                label,
                format!("commission of {} skipped: no recipient", format_amount(amount)),
            );
            return 0;
        };

        let handle = match link.resolve_command(CommandKind::Pay).await {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!(account = %label, error = %e, "pay command unavailable");
                self.tally.failure(
                    label,
                    format!("commission of {} failed: {e}", format_amount(amount)),
                );
                return 0;
            }
        };

        let command = Command::Pay {
            target: beneficiary.to_string(),
            amount,
        };
        let paid = self.executor.execute(link, &handle, &command).await;
        self.settle().await;
        if paid {
            tracing::info!(account = %label, amount, "commission paid");
            amount
        } else {
            tracing::warn!(account = %label, amount, "commission transfer failed");
            self.tally
                .failure(label, format!("commission of {} failed", format_amount(amount)));
            0
        }
    }
}
