//! Field extractors for reply text.
//!
//! Every extractor returns `Option`: a line the heuristics cannot read is
//! skipped by the caller, never reported as an error.

use std::sync::LazyLock;

use chrono::DateTime;
use regex::Regex;

use super::{CooldownEntry, ReadyAt, RoleAmount};

/// Label used for the header line of a collect-cooldown reply.
pub const GENERAL_COOLDOWN_LABEL: &str = "general";

const CASH_MARKER: &str = "(cash)";

/// Digits with optional thousands separators.
static AMOUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{1,3}(?:,\d{3})+|\d+").expect("amount pattern"));

/// Angle-bracket markup: custom emoji, user/role/channel mentions, timestamps.
static ANGLE_MARKUP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<a?:[A-Za-z0-9_~]+:\d+>|<@[!&]?\d+>|<#\d+>|<t:-?\d+(?::[A-Za-z])?>")
        .expect("markup pattern")
});

/// Emoji shortcodes such as `:europa_rp~2:`.
static SHORTCODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r":[A-Za-z0-9_~]+:").expect("shortcode pattern"));

static ROLE_MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<@&\d+>").expect("role mention pattern"));

static TIMESTAMP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<t:(-?\d+)(?::[A-Za-z])?>").expect("timestamp pattern"));

/// Remove chat markup so embedded ids are never read as amounts.
pub fn strip_markup(text: &str) -> String {
    let without_angles = ANGLE_MARKUP.replace_all(text, " ");
    SHORTCODE
        .replace_all(&without_angles, " ")
        .replace('`', "")
}

/// Convert an amount token, stripping thousands separators.
pub fn parse_amount(token: &str) -> Option<u64> {
    token.replace(',', "").parse().ok()
}

/// First amount in `text`, ignoring markup.
pub fn first_amount(text: &str) -> Option<u64> {
    let cleaned = strip_markup(text);
    AMOUNT
        .find_iter(&cleaned)
        .find_map(|m| parse_amount(m.as_str()))
}

/// Last amount in `text`, ignoring markup.
pub fn last_amount(text: &str) -> Option<u64> {
    let cleaned = strip_markup(text);
    AMOUNT
        .find_iter(&cleaned)
        .filter_map(|m| parse_amount(m.as_str()))
        .last()
}

/// Render an amount with thousands separators (`12345` -> `12,345`).
pub fn format_amount(amount: u64) -> String {
    let digits = amount.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Read the time at which a cooldown ends.
///
/// Prefers `<t:UNIX>` markup; falls back to the free text after `in`.
pub fn parse_ready_at(text: &str) -> Option<ReadyAt> {
    if let Some(caps) = TIMESTAMP.captures(text) {
        let secs: i64 = caps[1].parse().ok()?;
        return DateTime::from_timestamp(secs, 0).map(ReadyAt::At);
    }

    let trimmed = text.trim();
    let relative = if let Some(rest) = trimmed.strip_prefix("in ") {
        rest
    } else {
        let idx = trimmed.rfind(" in ")?;
        &trimmed[idx + 4..]
    };

    let relative = relative.trim().trim_end_matches(['.', '!']).trim();
    if relative.is_empty() {
        None
    } else {
        Some(ReadyAt::After(relative.to_string()))
    }
}

/// Split a role line at the cash marker: `(before, after)`.
fn split_cash(line: &str) -> Option<(&str, &str)> {
    let idx = line.find(CASH_MARKER)?;
    Some((&line[..idx], &line[idx + CASH_MARKER.len()..]))
}

/// Drop a leading list index (`1 - `, `` `1` - ``).
fn role_segment(head: &str) -> &str {
    head.split_once(" - ").map(|(_, rest)| rest).unwrap_or(head)
}

fn role_label(segment: &str) -> Option<String> {
    if let Some(mention) = ROLE_MENTION.find(segment) {
        return Some(mention.as_str().to_string());
    }

    let cleaned = strip_markup(segment);
    let without_amount = match AMOUNT.find_iter(&cleaned).last() {
        Some(m) => format!("{}{}", &cleaned[..m.start()], &cleaned[m.end()..]),
        None => cleaned,
    };
    let label = without_amount.split_whitespace().collect::<Vec<_>>().join(" ");
    let label = label.trim_matches(|c: char| c == '-' || c == ':' || c.is_whitespace());
    (!label.is_empty()).then(|| label.to_string())
}

/// One `N - role amount (cash)` line of a successful collection.
///
/// Lines without the cash marker are not role lines. A role line with no
/// readable amount contributes 0.
pub fn role_amount(line: &str) -> Option<RoleAmount> {
    let (head, _) = split_cash(line)?;
    let segment = role_segment(head);
    Some(RoleAmount {
        label: role_label(segment),
        amount: last_amount(segment).unwrap_or(0),
    })
}

/// One `N - role amount (cash) in <time>` line of a collect cooldown.
pub fn role_cooldown(line: &str) -> Option<CooldownEntry> {
    let (head, tail) = split_cash(line)?;
    let ready_at = parse_ready_at(tail)?;
    let segment = role_segment(head);
    Some(CooldownEntry {
        label: role_label(segment).unwrap_or_else(|| "role".to_string()),
        amount: last_amount(segment),
        ready_at,
    })
}

/// The cooldown header line (`You can collect income again in ...`).
pub fn general_cooldown(tail: &str) -> Option<CooldownEntry> {
    Some(CooldownEntry {
        label: GENERAL_COOLDOWN_LABEL.to_string(),
        amount: None,
        ready_at: parse_ready_at(tail).or_else(|| {
            let cleaned = strip_markup(tail);
            let text = cleaned.trim().trim_end_matches(['.', '!']).trim();
            (!text.is_empty()).then(|| ReadyAt::After(text.to_string()))
        })?,
    })
}
