use std::collections::HashSet;

use crate::account::{Credential, Tier};
use crate::config::helpers::{first_non_empty_env, normalize_env_value};
use crate::error::ConfigError;

/// Env keys holding each tier's comma-separated token list, canonical first.
const TOKEN_KEYS: [(Tier, &[&str]); 4] = [
    (Tier::Master, &["MASTER_TOKENS", "MASTER_TOKEN"]),
    (Tier::TierA, &["TIER_A_TOKENS", "TOKEN_5K"]),
    (Tier::TierB, &["TIER_B_TOKENS", "TOKEN_15K"]),
    (Tier::TierC, &["TIER_C_TOKENS", "TOKEN_30K"]),
];

/// Credentials to drive, in tier order.
#[derive(Debug, Clone)]
pub struct AccountsConfig {
    pub credentials: Vec<Credential>,
}

impl AccountsConfig {
    pub(crate) fn resolve() -> Result<Self, ConfigError> {
        let mut lists = Vec::with_capacity(TOKEN_KEYS.len());
        for (tier, keys) in TOKEN_KEYS {
            lists.push((tier, first_non_empty_env(keys)?.unwrap_or_default()));
        }
        Self::from_lists(lists.iter().map(|(tier, raw)| (*tier, raw.as_str())))
    }

    /// Build from `(tier, "tok1,tok2")` pairs.
    pub fn from_lists<'a>(
        lists: impl IntoIterator<Item = (Tier, &'a str)>,
    ) -> Result<Self, ConfigError> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut credentials = Vec::new();

        for (tier, raw) in lists {
            let tokens = raw
                .split(',')
                .map(normalize_env_value)
                .filter(|token| !token.is_empty());
            for (index, token) in tokens.enumerate() {
                let label = format!("{tier}#{}", index + 1);
                if !seen.insert(token.clone()) {
                    return Err(ConfigError::DuplicateCredential { label });
                }
                credentials.push(Credential::new(token, tier, label));
            }
        }

        if credentials.is_empty() {
            return Err(ConfigError::NoCredentials);
        }
        Ok(Self { credentials })
    }

    /// Whether any account owes commission.
    pub fn has_commission_accounts(&self) -> bool {
        self.credentials
            .iter()
            .any(|credential| credential.tier().pays_commission())
    }

    pub fn count(&self, tier: Tier) -> usize {
        self.credentials
            .iter()
            .filter(|credential| credential.tier() == tier)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;

    #[test]
    fn labels_are_numbered_per_tier() {
        let accounts = AccountsConfig::from_lists([
            (Tier::Master, "m1"),
            (Tier::TierA, " a1 , 'a2',, "),
            (Tier::TierB, ""),
        ])
        .unwrap();

        let labels: Vec<&str> = accounts.credentials.iter().map(Credential::label).collect();
        assert_eq!(labels, vec!["master#1", "tier_a#1", "tier_a#2"]);
        assert_eq!(accounts.credentials[2].secret().expose_secret(), "a2");
        assert_eq!(accounts.count(Tier::TierA), 2);
        assert!(accounts.has_commission_accounts());
    }

    #[test]
    fn duplicate_tokens_are_rejected_across_tiers() {
        let err = AccountsConfig::from_lists([(Tier::Master, "same"), (Tier::TierC, "other,same")])
            .unwrap_err();
        match err {
            ConfigError::DuplicateCredential { label } => assert_eq!(label, "tier_c#2"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn empty_lists_mean_no_credentials() {
        assert!(matches!(
            AccountsConfig::from_lists([(Tier::Master, " , ")]),
            Err(ConfigError::NoCredentials)
        ));
    }
}
