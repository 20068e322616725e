//! Command execution with bounded retries.

use std::time::Duration;

use crate::transport::{AccountLink, Command, CommandHandle};

/// Retry bounds for one remote command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, rate-limited ones included.
    pub max_retries: u32,
    /// Linear backoff unit after a hard failure.
    pub base_delay: Duration,
    /// Added to the transport's retry-after hint.
    pub rate_limit_margin: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
            rate_limit_margin: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Wait after the `attempt`-th (1-based) hard failure.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }

    /// Wait after a rate-limit signal.
    pub fn rate_limit_wait(&self, retry_after: Option<Duration>) -> Duration {
        retry_after
            .unwrap_or(self.base_delay)
            .saturating_add(self.rate_limit_margin)
    }
}

/// Sends commands, absorbing transient transport failures.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandExecutor {
    policy: RetryPolicy,
}

impl CommandExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Send `command`, retrying per policy. Returns whether the transport
    /// accepted it; failures never propagate.
    pub async fn execute(
        &self,
        link: &dyn AccountLink,
        handle: &CommandHandle,
        command: &Command,
    ) -> bool {
        let max = self.policy.max_retries;
        for attempt in 1..=max {
            match link.send_command(handle, command).await {
                Ok(()) => {
                    tracing::debug!(command = %command.kind(), attempt, "command accepted");
                    return true;
                }
                Err(crate::error::TransportError::RateLimited { retry_after }) => {
                    let wait = self.policy.rate_limit_wait(retry_after);
                    tracing::warn!(
                        command = %command.kind(),
                        attempt,
                        wait_ms = wait.as_millis() as u64,
                        "rate limited"
                    );
                    if attempt < max {
                        tokio::time::sleep(wait).await;
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        command = %command.kind(),
                        attempt,
                        error = %e,
                        "command failed"
                    );
                    if attempt < max {
                        tokio::time::sleep(self.policy.backoff(attempt)).await;
                    }
                }
            }
        }
        tracing::warn!(command = %command.kind(), attempts = max, "giving up on command");
        false
    }
}
