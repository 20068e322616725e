use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use crate::config::helpers::{first_non_empty_env, optional_env, positive_env_or};
use crate::error::ConfigError;
use crate::settings::Settings;

/// Where commands are issued and who the replies come from.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub channel_id: String,
    /// Commission recipient. Required once any commission account exists.
    pub beneficiary_id: Option<String>,
    /// Author id of the economy service; `None` accepts every author.
    pub service_bot_id: Option<String>,
}

/// Messaging relay sidecar.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub base_url: Url,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
}

/// Report destination.
#[derive(Debug, Clone, Default)]
pub struct ReportConfig {
    /// Webhook receiving the run report. Logged locally when unset.
    pub webhook_url: Option<SecretString>,
}

impl ChannelConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let channel_id = first_non_empty_env(&["CHANNEL_ID"])?
            .or_else(|| settings.channel_id.clone())
            .ok_or_else(|| ConfigError::MissingRequired {
                key: "CHANNEL_ID".to_string(),
                hint: "Set CHANNEL_ID or channel_id in config.toml".to_string(),
            })?;

        Ok(Self {
            channel_id,
            beneficiary_id: first_non_empty_env(&["COMMISSION_USER_ID"])?
                .or_else(|| settings.commission_user_id.clone()),
            service_bot_id: first_non_empty_env(&["SERVICE_BOT_ID"])?
                .or_else(|| settings.service_bot_id.clone()),
        })
    }
}

impl RelayConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let raw =
            first_non_empty_env(&["RELAY_URL"])?.unwrap_or_else(|| settings.relay.url.clone());
        let base_url = Url::parse(&raw).map_err(|e| ConfigError::InvalidValue {
            key: "RELAY_URL".to_string(),
            message: format!("must be an absolute URL: {e}"),
        })?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidValue {
                key: "RELAY_URL".to_string(),
                message: format!("unsupported scheme '{}'", base_url.scheme()),
            });
        }

        Ok(Self {
            base_url,
            poll_interval: Duration::from_millis(positive_env_or(
                "RELAY_POLL_INTERVAL_MS",
                settings.relay.poll_interval_ms,
            )?),
            request_timeout: Duration::from_secs(positive_env_or(
                "RELAY_TIMEOUT_SECS",
                settings.relay.request_timeout_secs,
            )?),
        })
    }
}

impl ReportConfig {
    pub(crate) fn resolve() -> Result<Self, ConfigError> {
        let webhook_url = optional_env("WEBHOOK_URL")?
            .map(|raw| crate::config::helpers::normalize_env_value(&raw))
            .filter(|url| !url.is_empty());
        if let Some(url) = webhook_url.as_deref() {
            Url::parse(url).map_err(|e| ConfigError::InvalidValue {
                key: "WEBHOOK_URL".to_string(),
                // The URL itself is a secret; only the parse error is shown.
                message: format!("must be an absolute URL: {e}"),
            })?;
        }
        Ok(Self {
            webhook_url: webhook_url.map(SecretString::from),
        })
    }
}
