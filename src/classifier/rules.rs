//! Ordered marker rules. The first rule whose predicate matches builds the
//! outcome; each predicate and constructor is a pure function of the text.

use super::extract;
use super::{CooldownEntry, ReplyOutcome, RoleAmount};

pub const WORK_COOLDOWN_MARKER: &str = "You can next work";
pub const COLLECT_COOLDOWN_MARKER: &str = "You can collect income again";
pub const COLLECT_SUCCESS_MARKER: &str = "Role income successfully collected";
pub const PAYMENT_MARKER: &str = "Successfully transferred";
pub const DEPOSIT_EMPTY_MARKER: &str = "have any money to deposit";
pub const DEPOSIT_MARKER: &str = "Deposited";

pub struct Rule {
    pub name: &'static str,
    pub matches: fn(&str) -> bool,
    pub build: fn(&str) -> ReplyOutcome,
}

pub static RULES: &[Rule] = &[
    Rule {
        name: "work_cooldown",
        matches: is_work_cooldown,
        build: work_cooldown,
    },
    Rule {
        name: "collect_cooldown",
        matches: is_collect_cooldown,
        build: collect_cooldown,
    },
    Rule {
        name: "collect_success",
        matches: is_collect_success,
        build: collect_success,
    },
    Rule {
        name: "payment_confirmed",
        matches: is_payment,
        build: payment_confirmed,
    },
    Rule {
        name: "deposit_empty",
        matches: is_deposit_empty,
        build: deposit_empty,
    },
    Rule {
        name: "deposit_confirmed",
        matches: is_deposit,
        build: deposit_confirmed,
    },
];

fn is_work_cooldown(text: &str) -> bool {
    text.contains(WORK_COOLDOWN_MARKER)
}

fn is_collect_cooldown(text: &str) -> bool {
    text.contains(COLLECT_COOLDOWN_MARKER)
}

fn is_collect_success(text: &str) -> bool {
    text.contains(COLLECT_SUCCESS_MARKER)
}

fn is_payment(text: &str) -> bool {
    text.contains(PAYMENT_MARKER)
}

fn is_deposit_empty(text: &str) -> bool {
    text.contains(DEPOSIT_EMPTY_MARKER)
}

fn is_deposit(text: &str) -> bool {
    text.contains(DEPOSIT_MARKER)
}

/// Text following the first occurrence of `marker`.
fn after<'a>(text: &'a str, marker: &str) -> &'a str {
    text.find(marker)
        .map(|idx| &text[idx + marker.len()..])
        .unwrap_or("")
}

fn work_cooldown(text: &str) -> ReplyOutcome {
    let tail = after(text, WORK_COOLDOWN_MARKER);
    let first_line = tail.lines().next().unwrap_or("");
    ReplyOutcome::WorkCooldown {
        ready_at: extract::parse_ready_at(first_line),
    }
}

fn collect_cooldown(text: &str) -> ReplyOutcome {
    let mut cooldowns: Vec<CooldownEntry> = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.contains(COLLECT_COOLDOWN_MARKER) {
            if let Some(entry) = extract::general_cooldown(after(line, COLLECT_COOLDOWN_MARKER)) {
                cooldowns.push(entry);
            }
            continue;
        }
        match extract::role_cooldown(line) {
            Some(entry) => cooldowns.push(entry),
            None => tracing::trace!(line, "skipping unreadable cooldown line"),
        }
    }
    ReplyOutcome::CollectCooldown { cooldowns }
}

fn collect_success(text: &str) -> ReplyOutcome {
    let per_role_amounts: Vec<RoleAmount> = text
        .lines()
        .filter(|line| !line.contains(COLLECT_SUCCESS_MARKER))
        .filter_map(extract::role_amount)
        .collect();
    let total_amount = per_role_amounts
        .iter()
        .fold(0u64, |sum, role| sum.saturating_add(role.amount));
    ReplyOutcome::CollectSuccess {
        total_amount,
        per_role_amounts,
    }
}

fn payment_confirmed(_text: &str) -> ReplyOutcome {
    ReplyOutcome::PaymentConfirmed
}

fn deposit_empty(_text: &str) -> ReplyOutcome {
    ReplyOutcome::DepositEmpty
}

fn deposit_confirmed(text: &str) -> ReplyOutcome {
    ReplyOutcome::DepositConfirmed {
        amount: extract::first_amount(after(text, DEPOSIT_MARKER)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_names_are_unique_and_ordered() {
        let names: Vec<&str> = RULES.iter().map(|r| r.name).collect();
        assert_eq!(
            names,
            vec![
                "work_cooldown",
                "collect_cooldown",
                "collect_success",
                "payment_confirmed",
                "deposit_empty",
                "deposit_confirmed",
            ]
        );
    }

    #[test]
    fn empty_deposit_is_not_a_confirmation() {
        let text = "<:xmark:1> You don't have any money to deposit!";
        assert!(is_deposit_empty(text));
        assert!(!is_deposit(text));
        let curly = "You don\u{2019}t have any money to deposit!";
        assert!(is_deposit_empty(curly));
    }

    #[test]
    fn each_predicate_matches_its_marker() {
        assert!(is_work_cooldown("<:stopwatch:1> You can next work in 2 hours."));
        assert!(is_collect_cooldown("You can collect income again in 3h"));
        assert!(is_collect_success("Role income successfully collected!"));
        assert!(is_payment("Successfully transferred 500 to <@1>"));
        assert!(!is_payment("Deposited 500 to your bank"));
    }

    #[test]
    fn deposit_amount_is_read_after_marker() {
        let outcome = deposit_confirmed("<:check:123> Deposited :europa_rp~2:12,345 to your bank!");
        assert_eq!(outcome, ReplyOutcome::DepositConfirmed { amount: Some(12_345) });

        let outcome = deposit_confirmed("Deposited everything");
        assert_eq!(outcome, ReplyOutcome::DepositConfirmed { amount: None });
    }
}
