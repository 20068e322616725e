//! Run coordinator: one concurrent session per credential.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::time::Instant;
use uuid::Uuid;

use crate::account::Credential;
use crate::error::{ConfigError, SessionError};
use crate::executor::{CommandExecutor, RetryPolicy};
use crate::report::ReportSink;
use crate::session::{AccountSession, CommissionGate, SessionSettings};
use crate::tally::{AccountResult, RunTally, TallyHandle, spawn_aggregator};
use crate::transport::Transport;

/// State owned by one run, created at its start and consumed at its end.
pub struct RunContext {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    started: Instant,
    tally: TallyHandle,
    gate: CommissionGate,
}

impl RunContext {
    fn new(tally: TallyHandle) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            started: Instant::now(),
            tally,
            gate: CommissionGate::new(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// What a completed run hands to the report sink.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub tally: RunTally,
}

impl RunSummary {
    /// Average wall time per account.
    pub fn per_account(&self) -> Duration {
        match u32::try_from(self.tally.total()) {
            Ok(0) | Err(_) => Duration::ZERO,
            Ok(n) => self.elapsed / n,
        }
    }

    /// Success rate in percent.
    pub fn success_rate(&self) -> f64 {
        let total = self.tally.total();
        if total == 0 {
            return 0.0;
        }
        self.tally.succeeded() as f64 * 100.0 / total as f64
    }
}

pub struct Coordinator {
    transport: Arc<dyn Transport>,
    settings: Arc<SessionSettings>,
    executor: CommandExecutor,
    report: Arc<dyn ReportSink>,
}

impl Coordinator {
    pub fn new(
        transport: Arc<dyn Transport>,
        settings: Arc<SessionSettings>,
        retry: RetryPolicy,
        report: Arc<dyn ReportSink>,
    ) -> Self {
        Self {
            transport,
            settings,
            executor: CommandExecutor::new(retry),
            report,
        }
    }

    /// Run every credential to completion and report the tally.
    ///
    /// Only an empty credential list or a repeated label is an error;
    /// per-account failures are part of the returned summary.
    pub async fn run_all(&self, credentials: &[Credential]) -> Result<RunSummary, ConfigError> {
        if credentials.is_empty() {
            return Err(ConfigError::NoCredentials);
        }
        let mut labels = HashSet::new();
        if let Some(duplicate) = credentials
            .iter()
            .find(|credential| !labels.insert(credential.label()))
        {
            return Err(ConfigError::DuplicateCredential {
                label: duplicate.label().to_string(),
            });
        }

        let (tally, aggregator) = spawn_aggregator();
        let context = RunContext::new(tally);
        tracing::info!(
            run_id = %context.run_id,
            accounts = credentials.len(),
            "starting run"
        );

        // Tickets are issued before any session starts so a fast master
        // cannot observe an empty gate.
        let sessions: Vec<AccountSession> = credentials
            .iter()
            .map(|credential| {
                let session = AccountSession::new(
                    credential.clone(),
                    Arc::clone(&self.transport),
                    self.executor,
                    Arc::clone(&self.settings),
                    context.tally.clone(),
                    context.gate.clone(),
                );
                if credential.tier().pays_commission() {
                    session.with_ticket(context.gate.ticket())
                } else {
                    session
                }
            })
            .collect();

        let handles: Vec<_> = sessions
            .into_iter()
            .map(|session| tokio::spawn(session.run()))
            .collect();

        for (credential, joined) in credentials.iter().zip(join_all(handles).await) {
            if let Err(e) = joined {
                let reason = SessionError::Aborted {
                    reason: e.to_string(),
                };
                tracing::error!(
                    account = %credential.label(),
                    error = %reason,
                    "session task died"
                );
                context.tally.finished(AccountResult::failed(
                    credential.label(),
                    credential.tier(),
                    reason.to_string(),
                ));
            }
        }

        let elapsed = context.elapsed();
        let RunContext {
            run_id,
            started_at,
            tally,
            ..
        } = context;
        drop(tally);
        let tally = aggregator.await.unwrap_or_else(|e| {
            tracing::error!(error = %e, "tally aggregator failed");
            RunTally::default()
        });

        let summary = RunSummary {
            run_id,
            started_at,
            elapsed,
            tally,
        };
        tracing::info!(
            run_id = %summary.run_id,
            succeeded = summary.tally.succeeded(),
            total = summary.tally.total(),
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "run complete"
        );

        if let Err(e) = self.report.deliver(&summary).await {
            tracing::warn!(error = %e, "report delivery failed");
        }
        Ok(summary)
    }
}
