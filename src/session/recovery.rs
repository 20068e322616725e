//! History-based recovery for a collect reply that never arrived live.

use crate::classifier::{ReplyOutcome, classify_reply};
use crate::transport::Reply;

/// What the history revealed about a missed collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovered {
    /// A collect success addressed to the account.
    Collected(u64),
    /// No collect success, but a deposit confirmation stated an amount.
    EstimatedFromDeposit(u64),
}

impl Recovered {
    pub fn amount(self) -> u64 {
        match self {
            Self::Collected(amount) | Self::EstimatedFromDeposit(amount) => amount,
        }
    }
}

/// Scan `history` (newest first) for evidence of a collection by `subject`.
///
/// The first collect success with at least one role line wins; otherwise the
/// first deposit confirmation with a positive amount is used as an estimate.
pub fn recover_from_history(
    history: &[Reply],
    subject: &str,
    service_author: Option<&str>,
) -> Option<Recovered> {
    let outcomes: Vec<ReplyOutcome> = history
        .iter()
        .filter(|reply| service_author.is_none_or(|author| reply.author_id == author))
        .map(|reply| classify_reply(reply, subject))
        .filter(ReplyOutcome::is_related)
        .collect();

    let collected = outcomes.iter().find_map(|outcome| match outcome {
        ReplyOutcome::CollectSuccess {
            total_amount,
            per_role_amounts,
        } if !per_role_amounts.is_empty() => Some(Recovered::Collected(*total_amount)),
        _ => None,
    });

    collected.or_else(|| {
        outcomes.iter().find_map(|outcome| match outcome {
            ReplyOutcome::DepositConfirmed {
                amount: Some(amount),
            } if *amount > 0 => Some(Recovered::EstimatedFromDeposit(*amount)),
            _ => None,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUCCESS: &str = "Role income successfully collected!\n\
        1 - <@&42> 4,000 (cash)\n\
        2 - <@&43> 1,500 (cash)";

    #[test]
    fn collect_success_wins_over_newer_deposit() {
        let history = vec![
            Reply::embed("3", "bot", "alice", "Deposited 9,999 cash to your bank!"),
            Reply::embed("2", "bot", "alice", SUCCESS),
        ];
        assert_eq!(
            recover_from_history(&history, "alice", Some("bot")),
            Some(Recovered::Collected(5_500))
        );
    }

    #[test]
    fn deposit_amount_is_an_estimate() {
        let history = vec![
            Reply::embed("2", "bot", "bob", SUCCESS),
            Reply::embed("1", "bot", "alice", "Deposited 2,000 cash to your bank!"),
        ];
        let recovered = recover_from_history(&history, "alice", None).unwrap();
        assert_eq!(recovered, Recovered::EstimatedFromDeposit(2_000));
        assert_eq!(recovered.amount(), 2_000);
    }

    #[test]
    fn success_without_roles_is_not_evidence() {
        let history = vec![Reply::embed(
            "1",
            "bot",
            "alice",
            "Role income successfully collected!",
        )];
        assert_eq!(recover_from_history(&history, "alice", None), None);
    }

    #[test]
    fn foreign_authors_are_ignored() {
        let history = vec![Reply::embed("1", "someone", "alice", SUCCESS)];
        assert_eq!(recover_from_history(&history, "alice", Some("bot")), None);
        assert!(recover_from_history(&[], "alice", None).is_none());
    }
}
