//! Run reports.
//!
//! A [`ReportSink`] receives the [`RunSummary`] once the coordinator has
//! joined every session. Delivery errors are logged by the caller and never
//! change the run outcome.

pub mod webhook;

use std::time::Duration;

use async_trait::async_trait;

use crate::classifier::format_amount;
use crate::coordinator::RunSummary;
use crate::error::ReportError;

pub use webhook::WebhookReport;

#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn deliver(&self, summary: &RunSummary) -> Result<(), ReportError>;
}

/// Writes the report through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReport;

#[async_trait]
impl ReportSink for LogReport {
    async fn deliver(&self, summary: &RunSummary) -> Result<(), ReportError> {
        for line in render_lines(summary) {
            tracing::info!(run_id = %summary.run_id, "{line}");
        }
        Ok(())
    }
}

/// `1m 05s`, `42s`, `850ms`.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs == 0 {
        return format!("{}ms", duration.as_millis());
    }
    if secs < 60 {
        return format!("{secs}s");
    }
    format!("{}m {:02}s", secs / 60, secs % 60)
}

/// Human-readable report, one line per fact.
pub fn render_lines(summary: &RunSummary) -> Vec<String> {
    let tally = &summary.tally;
    let mut lines = vec![
        format!(
            "Accounts: {}/{} succeeded ({:.1}%)",
            tally.succeeded(),
            tally.total(),
            summary.success_rate()
        ),
        format!(
            "Duration: {} ({} per account)",
            format_duration(summary.elapsed),
            format_duration(summary.per_account())
        ),
        format!(
            "Collected: {} | Commission: {}",
            format_amount(tally.collected()),
            format_amount(tally.commission())
        ),
    ];

    for (tier, totals) in tally.tier_totals() {
        lines.push(format!(
            "{tier}: {}/{} ok, collected {}, commission {}",
            totals.succeeded,
            totals.accounts,
            format_amount(totals.collected),
            format_amount(totals.commission)
        ));
    }
    for report in tally.cooldowns() {
        for line in report.lines() {
            lines.push(format!("{} cooldown: {line}", report.account));
        }
    }
    for failure in tally.failures() {
        lines.push(format!("{} failed: {}", failure.account, failure.reason));
    }
    for (account, message) in tally.errors() {
        lines.push(format!("{account} error: {message}"));
    }
    lines
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    use super::*;
    use crate::account::Tier;
    use crate::tally::{AccountResult, RunTally, TallyEvent};

    pub(crate) fn sample_summary() -> RunSummary {
        let mut tally = RunTally::default();
        tally.apply(TallyEvent::Finished(AccountResult {
            account: "tier_a#1".to_string(),
            tier: Tier::TierA,
            succeeded: true,
            collected_amount: 12_000,
            commission: 3_000,
            error_message: None,
        }));
        tally.apply(TallyEvent::Finished(AccountResult::failed(
            "tier_b#1",
            Tier::TierB,
            "deposit command failed",
        )));
        tally.apply(TallyEvent::Failure(crate::tally::FailureReport {
            account: "tier_b#1".to_string(),
            reason: "commission of 1,000 failed".to_string(),
        }));
        tally.apply(TallyEvent::Failure(crate::tally::FailureReport {
            account: "tier_b#1".to_string(),
            reason: "deposit command failed".to_string(),
        }));
        RunSummary {
            run_id: Uuid::nil(),
            started_at: Utc::now(),
            elapsed: Duration::from_secs(65),
            tally,
        }
    }

    #[test]
    fn durations_render_compactly() {
        assert_eq!(format_duration(Duration::from_millis(850)), "850ms");
        assert_eq!(format_duration(Duration::from_secs(42)), "42s");
        assert_eq!(format_duration(Duration::from_secs(65)), "1m 05s");
    }

    #[test]
    fn lines_cover_totals_tiers_and_failures() {
        let lines = render_lines(&sample_summary());
        assert_eq!(lines[0], "Accounts: 1/2 succeeded (50.0%)");
        assert_eq!(lines[1], "Duration: 1m 05s (32s per account)");
        assert_eq!(lines[2], "Collected: 12,000 | Commission: 3,000");
        assert!(lines.contains(&"tier_a: 1/1 ok, collected 12,000, commission 3,000".to_string()));
        assert_eq!(
            lines[lines.len() - 3..],
            [
                "tier_b#1 failed: commission of 1,000 failed".to_string(),
                "tier_b#1 failed: deposit command failed".to_string(),
                "tier_b#1 error: deposit command failed".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn log_report_never_fails() {
        assert!(LogReport.deliver(&sample_summary()).await.is_ok());
    }
}
