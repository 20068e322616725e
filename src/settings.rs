//! Farmhand settings file.
//!
//! Optional TOML file at `~/.farmhand/config.toml` (or `--config <path>`).
//! Every value can be overridden by its env var; secrets (tokens, webhook
//! URL) are only read from the environment.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Channel the commands are issued in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    /// Commission recipient.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commission_user_id: Option<String>,
    /// Author id of the economy service; replies from anyone else are ignored.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_bot_id: Option<String>,
    pub relay: RelaySettings,
    pub timing: TimingSettings,
    pub commission: CommissionSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaySettings {
    pub url: String,
    pub poll_interval_ms: u64,
    pub request_timeout_secs: u64,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8787".to_string(),
            poll_interval_ms: 500,
            request_timeout_secs: 15,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingSettings {
    pub settle_delay_ms: u64,
    pub work_reply_timeout_ms: u64,
    pub collect_reply_timeout_ms: u64,
    pub account_timeout_secs: u64,
    pub history_limit: usize,
    pub command_max_retries: u32,
    pub command_retry_base_delay_ms: u64,
    pub rate_limit_margin_ms: u64,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            settle_delay_ms: 2_000,
            work_reply_timeout_ms: 10_000,
            collect_reply_timeout_ms: 5_000,
            account_timeout_secs: 120,
            history_limit: 10,
            command_max_retries: 3,
            command_retry_base_delay_ms: 2_000,
            rate_limit_margin_ms: 1_000,
        }
    }
}

/// Commission rates as decimal strings (`"0.25"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommissionSettings {
    pub tier_a_rate: String,
    pub tier_b_rate: String,
    pub tier_c_rate: String,
}

impl Default for CommissionSettings {
    fn default() -> Self {
        Self {
            tier_a_rate: "0.25".to_string(),
            tier_b_rate: "0.3333".to_string(),
            tier_c_rate: "0.30".to_string(),
        }
    }
}

impl Settings {
    /// Default TOML config file path (~/.farmhand/config.toml).
    pub fn default_toml_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".farmhand")
            .join("config.toml")
    }

    /// Load settings from a TOML file.
    ///
    /// Returns `None` if the file doesn't exist. Returns an error only
    /// if the file exists but can't be parsed.
    pub fn load_toml(path: &Path) -> Result<Option<Self>, String> {
        let data = match std::fs::read_to_string(path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(format!("failed to read {}: {}", path.display(), e)),
        };

        let settings: Self = toml::from_str(&data)
            .map_err(|e| format!("invalid TOML in {}: {}", path.display(), e))?;
        Ok(Some(settings))
    }
}
