//! Run-wide aggregation of session results.
//!
//! Sessions never touch shared counters. They send [`TallyEvent`]s through a
//! [`TallyHandle`]; one aggregator task owns the [`RunTally`] and applies each
//! event in arrival order.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::account::Tier;
use crate::classifier::CooldownEntry;

/// Final outcome of one account session. Written exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountResult {
    pub account: String,
    pub tier: Tier,
    pub succeeded: bool,
    pub collected_amount: u64,
    pub commission: u64,
    pub error_message: Option<String>,
}

impl AccountResult {
    pub fn failed(account: impl Into<String>, tier: Tier, message: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            tier,
            succeeded: false,
            collected_amount: 0,
            commission: 0,
            error_message: Some(message.into()),
        }
    }
}

/// Cooldowns reported by one account's collect attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CooldownReport {
    pub account: String,
    pub cooldowns: Vec<CooldownEntry>,
}

impl CooldownReport {
    /// Rendered cooldown lines, in reply order.
    pub fn lines(&self) -> Vec<String> {
        self.cooldowns.iter().map(ToString::to_string).collect()
    }
}

/// A failed step that did not necessarily end the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureReport {
    pub account: String,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TierTotals {
    pub accounts: usize,
    pub succeeded: usize,
    pub collected: u64,
    pub commission: u64,
}

/// Everything a run produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunTally {
    results: BTreeMap<String, AccountResult>,
    cooldowns: BTreeMap<String, CooldownReport>,
    failures: BTreeMap<String, Vec<FailureReport>>,
}

impl RunTally {
    pub fn results(&self) -> impl Iterator<Item = &AccountResult> {
        self.results.values()
    }

    pub fn result(&self, account: &str) -> Option<&AccountResult> {
        self.results.get(account)
    }

    pub fn cooldowns(&self) -> impl Iterator<Item = &CooldownReport> {
        self.cooldowns.values()
    }

    /// Every failure note, grouped by account in the order it was reported.
    pub fn failures(&self) -> impl Iterator<Item = &FailureReport> {
        self.failures.values().flatten()
    }

    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn succeeded(&self) -> usize {
        self.results.values().filter(|r| r.succeeded).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.succeeded()
    }

    pub fn collected(&self) -> u64 {
        self.results.values().map(|r| r.collected_amount).sum()
    }

    pub fn commission(&self) -> u64 {
        self.results.values().map(|r| r.commission).sum()
    }

    /// Totals per tier, derived from the finished results.
    pub fn tier_totals(&self) -> BTreeMap<Tier, TierTotals> {
        let mut totals: BTreeMap<Tier, TierTotals> = BTreeMap::new();
        for result in self.results.values() {
            let entry = totals.entry(result.tier).or_default();
            entry.accounts += 1;
            entry.succeeded += usize::from(result.succeeded);
            entry.collected += result.collected_amount;
            entry.commission += result.commission;
        }
        totals
    }

    /// Error messages of failed sessions, by account.
    pub fn errors(&self) -> impl Iterator<Item = (&str, &str)> {
        self.results.values().filter_map(|r| {
            r.error_message
                .as_deref()
                .map(|message| (r.account.as_str(), message))
        })
    }

    /// Apply one event. Each account contributes at most one result and one
    /// cooldown report, later duplicates are dropped. Failure notes
    /// accumulate.
    pub fn apply(&mut self, event: TallyEvent) {
        match event {
            TallyEvent::Cooldown(report) => {
                insert_once(&mut self.cooldowns, report.account.clone(), report, "cooldown")
            }
            TallyEvent::Failure(report) => self
                .failures
                .entry(report.account.clone())
                .or_default()
                .push(report),
            TallyEvent::Finished(result) => {
                insert_once(&mut self.results, result.account.clone(), result, "result")
            }
        }
    }
}

fn insert_once<T>(map: &mut BTreeMap<String, T>, account: String, value: T, category: &str) {
    match map.entry(account) {
        Entry::Vacant(slot) => {
            slot.insert(value);
        }
        Entry::Occupied(slot) => {
            tracing::warn!(account = %slot.key(), category, "duplicate tally entry dropped");
        }
    }
}

#[derive(Debug, Clone)]
pub enum TallyEvent {
    Cooldown(CooldownReport),
    Failure(FailureReport),
    Finished(AccountResult),
}

/// Sending side of the aggregator, cloned into every session.
#[derive(Debug, Clone)]
pub struct TallyHandle {
    tx: mpsc::UnboundedSender<TallyEvent>,
}

impl TallyHandle {
    fn send(&self, event: TallyEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("tally aggregator already stopped");
        }
    }

    pub fn cooldown(&self, report: CooldownReport) {
        self.send(TallyEvent::Cooldown(report));
    }

    pub fn failure(&self, account: impl Into<String>, reason: impl Into<String>) {
        self.send(TallyEvent::Failure(FailureReport {
            account: account.into(),
            reason: reason.into(),
        }));
    }

    pub fn finished(&self, result: AccountResult) {
        self.send(TallyEvent::Finished(result));
    }
}

/// Spawn the aggregator. The task ends, yielding the tally, once every
/// handle has been dropped.
pub fn spawn_aggregator() -> (TallyHandle, JoinHandle<RunTally>) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(async move {
        let mut tally = RunTally::default();
        while let Some(event) = rx.recv().await {
            tally.apply(event);
        }
        tally
    });
    (TallyHandle { tx }, task)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::classifier::ReadyAt;

    fn result(account: &str, tier: Tier, collected: u64, commission: u64) -> AccountResult {
        AccountResult {
            account: account.to_string(),
            tier,
            succeeded: true,
            collected_amount: collected,
            commission,
            error_message: None,
        }
    }

    #[tokio::test]
    async fn aggregates_events_from_many_handles() {
        let (handle, task) = spawn_aggregator();
        let workers: Vec<_> = (0..8)
            .map(|i| {
                let handle = handle.clone();
                tokio::spawn(async move {
                    handle.finished(result(&format!("tier_a#{i}"), Tier::TierA, 1_000, 250));
                })
            })
            .collect();
        for worker in workers {
            worker.await.unwrap();
        }
        drop(handle);

        let tally = task.await.unwrap();
        assert_eq!(tally.total(), 8);
        assert_eq!(tally.collected(), 8_000);
        let totals = tally.tier_totals();
        assert_eq!(
            totals[&Tier::TierA],
            TierTotals {
                accounts: 8,
                succeeded: 8,
                collected: 8_000,
                commission: 2_000,
            }
        );
    }

    #[test]
    fn results_are_kept_once_and_failure_notes_accumulate() {
        let mut tally = RunTally::default();
        tally.apply(TallyEvent::Finished(result("a", Tier::Master, 10, 0)));
        tally.apply(TallyEvent::Finished(result("a", Tier::Master, 99, 0)));
        tally.apply(TallyEvent::Failure(FailureReport {
            account: "a".to_string(),
            reason: "first".to_string(),
        }));
        tally.apply(TallyEvent::Failure(FailureReport {
            account: "a".to_string(),
            reason: "second".to_string(),
        }));

        assert_eq!(tally.total(), 1);
        assert_eq!(tally.result("a").unwrap().collected_amount, 10);
        let reasons: Vec<&str> = tally.failures().map(|f| f.reason.as_str()).collect();
        assert_eq!(reasons, vec!["first", "second"]);
    }

    #[test]
    fn tier_totals_match_results() {
        let mut tally = RunTally::default();
        tally.apply(TallyEvent::Finished(result("m", Tier::Master, 0, 0)));
        tally.apply(TallyEvent::Finished(result("a", Tier::TierA, 12_000, 3_000)));
        tally.apply(TallyEvent::Finished(AccountResult::failed(
            "b",
            Tier::TierB,
            "deposit command failed",
        )));

        assert_eq!(tally.succeeded(), 2);
        assert_eq!(tally.failed(), 1);
        let totals = tally.tier_totals();
        for (tier, totals) in &totals {
            let expected: u64 = tally
                .results()
                .filter(|r| r.tier == *tier)
                .map(|r| r.collected_amount)
                .sum();
            assert_eq!(totals.collected, expected);
        }
        assert_eq!(
            tally.errors().collect::<Vec<_>>(),
            vec![("b", "deposit command failed")]
        );
    }

    #[test]
    fn cooldown_lines_render_in_order() {
        let report = CooldownReport {
            account: "m".to_string(),
            cooldowns: vec![
                CooldownEntry {
                    label: "general".to_string(),
                    amount: None,
                    ready_at: ReadyAt::After("3 hours".to_string()),
                },
                CooldownEntry {
                    label: "<@&42>".to_string(),
                    amount: Some(12_000),
                    ready_at: ReadyAt::After("5 hours".to_string()),
                },
            ],
        };
        assert_eq!(
            report.lines(),
            vec![
                "General Cooldown: 3 hours".to_string(),
                "<@&42> - 12,000 available in 5 hours".to_string(),
            ]
        );
    }
}
