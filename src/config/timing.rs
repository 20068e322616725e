use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;

use crate::account::CommissionRates;
use crate::config::helpers::{optional_env, parse_env_or, positive_env_or};
use crate::error::ConfigError;
use crate::executor::RetryPolicy;
use crate::settings::Settings;

/// Session pacing and deadlines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingConfig {
    pub settle_delay: Duration,
    pub work_reply_timeout: Duration,
    pub collect_reply_timeout: Duration,
    pub account_budget: Duration,
    pub history_limit: usize,
}

impl TimingConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let timing = &settings.timing;
        let history_limit =
            parse_env_or("HISTORY_LIMIT", timing.history_limit, "a positive integer")?;
        if history_limit == 0 {
            return Err(ConfigError::InvalidValue {
                key: "HISTORY_LIMIT".to_string(),
                message: "must be > 0".to_string(),
            });
        }

        Ok(Self {
            settle_delay: Duration::from_millis(parse_env_or(
                "SETTLE_DELAY_MS",
                timing.settle_delay_ms,
                "a non-negative integer",
            )?),
            work_reply_timeout: Duration::from_millis(positive_env_or(
                "WORK_REPLY_TIMEOUT_MS",
                timing.work_reply_timeout_ms,
            )?),
            collect_reply_timeout: Duration::from_millis(positive_env_or(
                "COLLECT_REPLY_TIMEOUT_MS",
                timing.collect_reply_timeout_ms,
            )?),
            account_budget: Duration::from_secs(positive_env_or(
                "ACCOUNT_TIMEOUT_SECS",
                timing.account_timeout_secs,
            )?),
            history_limit,
        })
    }
}

pub(crate) fn resolve_retry(settings: &Settings) -> Result<RetryPolicy, ConfigError> {
    let timing = &settings.timing;
    let max_retries = parse_env_or(
        "COMMAND_MAX_RETRIES",
        timing.command_max_retries,
        "a positive integer",
    )?;
    if max_retries == 0 {
        return Err(ConfigError::InvalidValue {
            key: "COMMAND_MAX_RETRIES".to_string(),
            message: "must be > 0".to_string(),
        });
    }

    Ok(RetryPolicy {
        max_retries,
        base_delay: Duration::from_millis(positive_env_or(
            "COMMAND_RETRY_BASE_DELAY_MS",
            timing.command_retry_base_delay_ms,
        )?),
        rate_limit_margin: Duration::from_millis(parse_env_or(
            "RATE_LIMIT_MARGIN_MS",
            timing.rate_limit_margin_ms,
            "a non-negative integer",
        )?),
    })
}

fn parse_rate(key: &str, fallback: &str) -> Result<Decimal, ConfigError> {
    let raw = optional_env(key)?.unwrap_or_else(|| fallback.to_string());
    let rate = Decimal::from_str(raw.trim()).map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("must be a decimal: {e}"),
    })?;
    if rate < Decimal::ZERO || rate > Decimal::ONE {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("must be between 0 and 1, got {rate}"),
        });
    }
    Ok(rate)
}

pub(crate) fn resolve_rates(settings: &Settings) -> Result<CommissionRates, ConfigError> {
    let commission = &settings.commission;
    Ok(CommissionRates::new(
        parse_rate("TIER_A_RATE", &commission.tier_a_rate)?,
        parse_rate("TIER_B_RATE", &commission.tier_b_rate)?,
        parse_rate("TIER_C_RATE", &commission.tier_c_rate)?,
    ))
}
