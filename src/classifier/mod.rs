//! Reply classification.
//!
//! Maps one reply body to a [`ReplyOutcome`]. Replies that do not name the
//! account being driven are [`ReplyOutcome::Unrelated`]; the channel is shared
//! by every concurrent session. Marker rules are evaluated in a fixed order
//! (see [`rules::RULES`]) and the first match wins.
//!
//! Classification is pure: the same text and subject always produce the same
//! outcome.

pub mod extract;
pub mod rules;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::transport::Reply;

pub use extract::format_amount;

/// When a cooldown ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ReadyAt {
    /// Absolute instant from `<t:UNIX>` markup.
    At(DateTime<Utc>),
    /// Free-form relative description ("3 hours").
    After(String),
}

impl fmt::Display for ReadyAt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::At(at) => write!(f, "{}", at.format("%Y-%m-%d %H:%M:%S UTC")),
            Self::After(text) => f.write_str(text),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CooldownEntry {
    pub label: String,
    pub amount: Option<u64>,
    pub ready_at: ReadyAt,
}

impl CooldownEntry {
    pub fn is_general(&self) -> bool {
        self.label == extract::GENERAL_COOLDOWN_LABEL
    }
}

impl fmt::Display for CooldownEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_general() {
            return write!(f, "General Cooldown: {}", self.ready_at);
        }
        match self.amount {
            Some(amount) => write!(
                f,
                "{} - {} available in {}",
                self.label,
                format_amount(amount),
                self.ready_at
            ),
            None => write!(f, "{} available in {}", self.label, self.ready_at),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleAmount {
    pub label: Option<String>,
    pub amount: u64,
}

/// Semantic outcome of one reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReplyOutcome {
    WorkCooldown {
        ready_at: Option<ReadyAt>,
    },
    CollectCooldown {
        cooldowns: Vec<CooldownEntry>,
    },
    /// `total_amount` is always the sum of `per_role_amounts`.
    CollectSuccess {
        total_amount: u64,
        per_role_amounts: Vec<RoleAmount>,
    },
    PaymentConfirmed,
    DepositConfirmed {
        amount: Option<u64>,
    },
    DepositEmpty,
    Unrelated,
    Unrecognized {
        raw_text: String,
    },
}

impl ReplyOutcome {
    pub fn name(&self) -> &'static str {
        match self {
            Self::WorkCooldown { .. } => "work_cooldown",
            Self::CollectCooldown { .. } => "collect_cooldown",
            Self::CollectSuccess { .. } => "collect_success",
            Self::PaymentConfirmed => "payment_confirmed",
            Self::DepositConfirmed { .. } => "deposit_confirmed",
            Self::DepositEmpty => "deposit_empty",
            Self::Unrelated => "unrelated",
            Self::Unrecognized { .. } => "unrecognized",
        }
    }

    pub fn is_related(&self) -> bool {
        !matches!(self, Self::Unrelated)
    }

    /// Outcomes that answer a collect command.
    pub fn is_collect_result(&self) -> bool {
        matches!(
            self,
            Self::CollectCooldown { .. } | Self::CollectSuccess { .. }
        )
    }
}

/// One readable body of a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyBody<'a> {
    /// Structured message: the author header names the account.
    Embed {
        author: &'a str,
        description: &'a str,
    },
    /// Plain text: the account name appears somewhere in the text.
    Plain(&'a str),
}

impl<'a> ReplyBody<'a> {
    pub fn text(&self) -> &'a str {
        match self {
            Self::Embed { description, .. } => description,
            Self::Plain(text) => text,
        }
    }

    pub fn addresses(&self, subject: &str) -> bool {
        let subject = subject.trim();
        if subject.is_empty() {
            return false;
        }
        match self {
            Self::Embed { author, .. } => author.trim() == subject,
            Self::Plain(text) => names(text, subject),
        }
    }
}

fn is_word(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// `subject` appears in `text` as a whole name, not inside a longer word.
fn names(text: &str, subject: &str) -> bool {
    text.match_indices(subject).any(|(start, _)| {
        let before = text[..start].chars().next_back();
        let after = text[start + subject.len()..].chars().next();
        !(subject.starts_with(is_word) && before.is_some_and(is_word))
            && !(subject.ends_with(is_word) && after.is_some_and(is_word))
    })
}

/// Classify one body for `subject`.
pub fn classify(body: ReplyBody<'_>, subject: &str) -> ReplyOutcome {
    if !body.addresses(subject) {
        return ReplyOutcome::Unrelated;
    }
    let text = body.text();
    rules::RULES
        .iter()
        .find(|rule| (rule.matches)(text))
        .map(|rule| (rule.build)(text))
        .unwrap_or_else(|| ReplyOutcome::Unrecognized {
            raw_text: text.to_string(),
        })
}

/// Classify plain text for `subject`.
pub fn classify_text(text: &str, subject: &str) -> ReplyOutcome {
    classify(ReplyBody::Plain(text), subject)
}

/// Classify a whole reply: the first body addressed to `subject` decides.
pub fn classify_reply(reply: &Reply, subject: &str) -> ReplyOutcome {
    reply
        .bodies()
        .map(|body| classify(body, subject))
        .find(ReplyOutcome::is_related)
        .unwrap_or(ReplyOutcome::Unrelated)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    use super::*;

    const ME: &str = "farmer#0001";

    fn embed<'a>(author: &'a str, description: &'a str) -> ReplyBody<'a> {
        ReplyBody::Embed {
            author,
            description,
        }
    }

    #[test]
    fn other_accounts_are_unrelated() {
        let body = embed("someone#9999", "Role income successfully collected!");
        assert_eq!(classify(body, ME), ReplyOutcome::Unrelated);

        let text = "someone#9999 You can collect income again in 2 hours";
        assert_eq!(classify_text(text, ME), ReplyOutcome::Unrelated);
    }

    #[test]
    fn plain_text_must_name_the_whole_subject() {
        let longer = "Farmer AB You can collect income again in 2 hours";
        assert_eq!(classify_text(longer, "Farmer A"), ReplyOutcome::Unrelated);

        let exact = "Farmer A, Deposited 1,000 cash to your bank!";
        assert!(classify_text(exact, "Farmer A").is_related());
        assert!(classify_text("@farmer#0001: Successfully transferred", ME).is_related());
    }

    #[test]
    fn empty_subject_never_matches() {
        let body = embed("", "Deposited 10 to your bank");
        assert_eq!(classify(body, ""), ReplyOutcome::Unrelated);
    }

    #[test]
    fn work_cooldown_with_time() {
        let body = embed(ME, "<:stopwatch:630927808043647006> You can next work <t:1700000000:R>.");
        assert_eq!(
            classify(body, ME),
            ReplyOutcome::WorkCooldown {
                ready_at: Some(ReadyAt::At(Utc.timestamp_opt(1_700_000_000, 0).unwrap())),
            }
        );
    }

    #[test]
    fn collect_success_new_format() {
        let description = "<:check:1> Role income successfully collected!\n\
            `1` - <@&111> <:europa_rp:1144393670053875772>25,000 (cash)\n\
            `2` - <@&222> <:europa_rp:1144393670053875772>5,000 (cash)";
        let outcome = classify(embed(ME, description), ME);
        let ReplyOutcome::CollectSuccess {
            total_amount,
            per_role_amounts,
        } = outcome
        else {
            panic!("expected collect success, got {outcome:?}");
        };
        assert_eq!(total_amount, 30_000);
        assert_eq!(per_role_amounts.len(), 2);
        assert_eq!(per_role_amounts[0].label.as_deref(), Some("<@&111>"));
    }

    #[test]
    fn collect_success_mixed_and_malformed_lines() {
        let description = "Role income successfully collected!\n\
            1 - @Farmer :europa_rp~2:12,000 (cash)\n\
            garbage line with 999 but no marker\n\
            2 - @Broken (cash)\n\
            \n\
            3 - @Plain 3000 (cash)\n\
            4 - @Banked 7,000 (bank)";
        let outcome = classify(embed(ME, description), ME);
        let ReplyOutcome::CollectSuccess {
            total_amount,
            per_role_amounts,
        } = outcome
        else {
            panic!("expected collect success, got {outcome:?}");
        };
        let amounts: Vec<u64> = per_role_amounts.iter().map(|r| r.amount).collect();
        assert_eq!(amounts, vec![12_000, 0, 3_000]);
        assert_eq!(total_amount, amounts.iter().sum::<u64>());
    }

    #[test]
    fn collect_success_without_role_lines_is_zero() {
        let outcome = classify(embed(ME, "Role income successfully collected!"), ME);
        assert_eq!(
            outcome,
            ReplyOutcome::CollectSuccess {
                total_amount: 0,
                per_role_amounts: vec![],
            }
        );
    }

    #[test]
    fn collect_cooldown_embed() {
        let description = "<:xmark:1> You can collect income again <t:1700003600:R>\n\
            `1` - <@&111> :europa_rp~2:25,000 (cash) in <t:1700003600:R>\n\
            `2` - <@&222> :europa_rp~2:5,000 (cash) in <t:1700007200:R>\n\
            `3` - <@&333> unreadable (cash)";
        let ReplyOutcome::CollectCooldown { cooldowns } = classify(embed(ME, description), ME)
        else {
            panic!("expected collect cooldown");
        };
        assert_eq!(cooldowns.len(), 3);
        assert!(cooldowns[0].is_general());
        assert_eq!(cooldowns[1].label, "<@&111>");
        assert_eq!(cooldowns[1].amount, Some(25_000));
        assert_eq!(
            cooldowns[2].ready_at,
            ReadyAt::At(Utc.timestamp_opt(1_700_007_200, 0).unwrap())
        );
    }

    #[test]
    fn collect_cooldown_plain_text() {
        let text = "farmer#0001 You can collect income again in 3 hours\n\
            1 - @Farmer 12,000 (cash) in 3 hours\n\
            2 - @Miner (cash) in 45 minutes";
        let ReplyOutcome::CollectCooldown { cooldowns } = classify_text(text, ME) else {
            panic!("expected collect cooldown");
        };
        let rendered: Vec<String> = cooldowns.iter().map(ToString::to_string).collect();
        assert_eq!(
            rendered,
            vec![
                "General Cooldown: 3 hours".to_string(),
                "@Farmer - 12,000 available in 3 hours".to_string(),
                "@Miner available in 45 minutes".to_string(),
            ]
        );
    }

    #[test]
    fn cooldown_marker_wins_over_later_markers() {
        let description = "You can collect income again in 1 hour. Deposited 5 to your bank";
        assert_eq!(
            classify(embed(ME, description), ME).name(),
            "collect_cooldown"
        );
    }

    #[test]
    fn deposit_outcomes() {
        assert_eq!(
            classify(embed(ME, "<:check:1> Deposited <:europa_rp:2>9,000 to your bank!"), ME),
            ReplyOutcome::DepositConfirmed { amount: Some(9_000) }
        );
        assert_eq!(
            classify(embed(ME, "<:xmark:1> You don't have any money to deposit!"), ME),
            ReplyOutcome::DepositEmpty
        );
    }

    #[test]
    fn payment_confirmation() {
        let outcome = classify(embed(ME, "<:check:1> Successfully transferred 3,000 to <@5>"), ME);
        assert_eq!(outcome, ReplyOutcome::PaymentConfirmed);
    }

    #[test]
    fn addressed_reply_without_marker_is_unrecognized() {
        let outcome = classify(embed(ME, "You worked hard and earned 400"), ME);
        assert_eq!(
            outcome,
            ReplyOutcome::Unrecognized {
                raw_text: "You worked hard and earned 400".to_string(),
            }
        );
    }

    #[test]
    fn classification_is_deterministic() {
        let description = "Role income successfully collected!\n\
            1 - @A 1,000 (cash)\n\
            2 - @B 2,500 (cash)";
        let first = classify(embed(ME, description), ME);
        let second = classify(embed(ME, description), ME);
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn whole_reply_prefers_the_addressed_body() {
        let reply = Reply::embed(
            "1",
            "bot",
            ME,
            "<:check:1> Deposited 500 to your bank!",
        )
        .with_content("someone#2 says hi");
        assert_eq!(
            classify_reply(&reply, ME),
            ReplyOutcome::DepositConfirmed { amount: Some(500) }
        );
        assert_eq!(classify_reply(&reply, "nobody#0"), ReplyOutcome::Unrelated);
    }
}
