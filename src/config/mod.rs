//! Configuration for Farmhand.
//!
//! Settings are loaded with priority: env var > TOML file > default.
//! Secrets (account tokens, webhook URL) come from the environment only,
//! typically via `./.env` or `~/.farmhand/.env` (loaded with dotenvy early
//! in startup).

mod accounts;
mod channels;
pub(crate) mod helpers;
mod timing;

use std::path::Path;
use std::sync::Arc;

use crate::account::CommissionRates;
use crate::error::ConfigError;
use crate::executor::RetryPolicy;
use crate::session::SessionSettings;
use crate::settings::Settings;

pub use self::accounts::AccountsConfig;
pub use self::channels::{ChannelConfig, RelayConfig, ReportConfig};
pub use self::timing::TimingConfig;

/// Resolved configuration, loaded once and immutable afterwards.
#[derive(Debug, Clone)]
pub struct Config {
    pub accounts: AccountsConfig,
    pub channel: ChannelConfig,
    pub relay: RelayConfig,
    pub report: ReportConfig,
    pub timing: TimingConfig,
    pub retry: RetryPolicy,
    pub rates: CommissionRates,
}

impl Config {
    /// Load from env with an optional TOML config file overlay.
    ///
    /// Loads both `./.env` (standard, higher priority) and
    /// `~/.farmhand/.env` (lower priority) via dotenvy, which never
    /// overwrites existing vars.
    pub fn from_env_with_toml(toml_path: Option<&Path>) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        crate::bootstrap::load_farmhand_env();

        let mut settings = Settings::default();
        Self::apply_toml_overlay(&mut settings, toml_path)?;

        Self::build(&settings)
    }

    /// Load a TOML config file over `settings`.
    ///
    /// If `explicit_path` is `Some`, loads from that path (errors are fatal).
    /// If `None`, tries the default path `~/.farmhand/config.toml` (missing
    /// file is silently ignored).
    fn apply_toml_overlay(
        settings: &mut Settings,
        explicit_path: Option<&Path>,
    ) -> Result<(), ConfigError> {
        let path = explicit_path
            .map(Path::to_path_buf)
            .unwrap_or_else(Settings::default_toml_path);

        match Settings::load_toml(&path) {
            Ok(Some(toml_settings)) => {
                *settings = toml_settings;
                tracing::debug!("Loaded TOML config from {}", path.display());
            }
            Ok(None) => {
                if explicit_path.is_some() {
                    return Err(ConfigError::ParseError(format!(
                        "Config file not found: {}",
                        path.display()
                    )));
                }
            }
            Err(e) => {
                if explicit_path.is_some() {
                    return Err(ConfigError::ParseError(format!(
                        "Failed to load config file {}: {}",
                        path.display(),
                        e
                    )));
                }
                tracing::warn!("Failed to load default config file: {}", e);
            }
        }
        Ok(())
    }

    /// Resolve every section from env vars over `settings`.
    pub fn build(settings: &Settings) -> Result<Self, ConfigError> {
        let accounts = AccountsConfig::resolve()?;
        let channel = ChannelConfig::resolve(settings)?;
        if accounts.has_commission_accounts() && channel.beneficiary_id.is_none() {
            return Err(ConfigError::MissingRequired {
                key: "COMMISSION_USER_ID".to_string(),
                hint: "Commission accounts are configured but no recipient is set".to_string(),
            });
        }

        Ok(Self {
            accounts,
            channel,
            relay: RelayConfig::resolve(settings)?,
            report: ReportConfig::resolve()?,
            timing: TimingConfig::resolve(settings)?,
            retry: timing::resolve_retry(settings)?,
            rates: timing::resolve_rates(settings)?,
        })
    }

    /// Settings shared by every session of a run.
    pub fn session_settings(&self) -> Arc<SessionSettings> {
        Arc::new(SessionSettings {
            settle_delay: self.timing.settle_delay,
            work_reply_timeout: self.timing.work_reply_timeout,
            collect_reply_timeout: self.timing.collect_reply_timeout,
            account_budget: self.timing.account_budget,
            history_limit: self.timing.history_limit,
            beneficiary: self.channel.beneficiary_id.clone(),
            service_author: self.channel.service_bot_id.clone(),
            rates: self.rates,
        })
    }
}

/// Serializes tests that mutate process env vars.
#[cfg(test)]
pub(crate) static ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::account::Tier;

    const KEYS: [&str; 14] = [
        "MASTER_TOKENS",
        "MASTER_TOKEN",
        "TIER_A_TOKENS",
        "TOKEN_5K",
        "TIER_B_TOKENS",
        "TOKEN_15K",
        "TIER_C_TOKENS",
        "TOKEN_30K",
        "CHANNEL_ID",
        "COMMISSION_USER_ID",
        "SERVICE_BOT_ID",
        "RELAY_URL",
        "WEBHOOK_URL",
        "SETTLE_DELAY_MS",
    ];

    fn clear_config_env() {
        // SAFETY: Guarded by ENV_MUTEX in tests.
        unsafe {
            for key in KEYS {
                std::env::remove_var(key);
            }
        }
    }

    #[test]
    fn build_resolves_accounts_and_session_settings() {
        let _guard = ENV_MUTEX.lock().expect("env mutex poisoned");
        clear_config_env();

        // SAFETY: Guarded by ENV_MUTEX in tests.
        unsafe {
            std::env::set_var("MASTER_TOKEN", "m1");
            std::env::set_var("TOKEN_5K", "a1,a2");
            std::env::set_var("CHANNEL_ID", "chan");
            std::env::set_var("COMMISSION_USER_ID", "boss");
            std::env::set_var("SERVICE_BOT_ID", "bot");
            std::env::set_var("SETTLE_DELAY_MS", "250");
        }

        let config = Config::build(&Settings::default()).expect("config build");
        assert_eq!(config.accounts.count(Tier::Master), 1);
        assert_eq!(config.accounts.count(Tier::TierA), 2);
        assert!(config.report.webhook_url.is_none());

        let session = config.session_settings();
        assert_eq!(session.settle_delay, Duration::from_millis(250));
        assert_eq!(session.beneficiary.as_deref(), Some("boss"));
        assert_eq!(session.service_author.as_deref(), Some("bot"));

        clear_config_env();
    }

    #[test]
    fn commission_accounts_need_a_recipient() {
        let _guard = ENV_MUTEX.lock().expect("env mutex poisoned");
        clear_config_env();

        // SAFETY: Guarded by ENV_MUTEX in tests.
        unsafe {
            std::env::set_var("TIER_C_TOKENS", "c1");
            std::env::set_var("CHANNEL_ID", "chan");
        }
        match Config::build(&Settings::default()).unwrap_err() {
            ConfigError::MissingRequired { key, .. } => assert_eq!(key, "COMMISSION_USER_ID"),
            other => panic!("unexpected error: {other}"),
        }

        // Master-only runs need no recipient.
        // SAFETY: Guarded by ENV_MUTEX in tests.
        unsafe {
            std::env::remove_var("TIER_C_TOKENS");
            std::env::set_var("MASTER_TOKENS", "m1");
        }
        assert!(Config::build(&Settings::default()).is_ok());

        clear_config_env();
    }

    #[test]
    fn no_tokens_is_a_config_error() {
        let _guard = ENV_MUTEX.lock().expect("env mutex poisoned");
        clear_config_env();

        assert!(matches!(
            Config::build(&Settings::default()),
            Err(ConfigError::NoCredentials)
        ));
    }

    #[test]
    fn explicit_missing_toml_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::default();
        let missing = dir.path().join("missing.toml");
        assert!(matches!(
            Config::apply_toml_overlay(&mut settings, Some(&missing)),
            Err(ConfigError::ParseError(_))
        ));

        let present = dir.path().join("config.toml");
        std::fs::write(&present, "channel_id = \"c\"\n").unwrap();
        Config::apply_toml_overlay(&mut settings, Some(&present)).unwrap();
        assert_eq!(settings.channel_id.as_deref(), Some("c"));
    }
}
