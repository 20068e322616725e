//! Accounts, tiers and commission rates.

use std::fmt;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal_macros::dec;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// Commission class of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Master,
    TierA,
    TierB,
    TierC,
}

impl Tier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Master => "master",
            Self::TierA => "tier_a",
            Self::TierB => "tier_b",
            Self::TierC => "tier_c",
        }
    }

    /// Master accounts never pay commission.
    pub fn pays_commission(self) -> bool {
        !matches!(self, Self::Master)
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Commission rate per tier, as a fraction of collected income.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommissionRates {
    tier_a: Decimal,
    tier_b: Decimal,
    tier_c: Decimal,
}

impl Default for CommissionRates {
    fn default() -> Self {
        Self {
            tier_a: dec!(0.25),
            tier_b: dec!(0.3333),
            tier_c: dec!(0.30),
        }
    }
}

impl CommissionRates {
    pub fn new(tier_a: Decimal, tier_b: Decimal, tier_c: Decimal) -> Self {
        Self {
            tier_a,
            tier_b,
            tier_c,
        }
    }

    pub fn rate(&self, tier: Tier) -> Decimal {
        match tier {
            Tier::Master => Decimal::ZERO,
            Tier::TierA => self.tier_a,
            Tier::TierB => self.tier_b,
            Tier::TierC => self.tier_c,
        }
    }

    /// `floor(collected * rate)`; never rounds up.
    pub fn commission(&self, tier: Tier, collected: u64) -> u64 {
        (Decimal::from(collected) * self.rate(tier))
            .floor()
            .to_u64()
            .unwrap_or(0)
    }
}

/// One set of login secrets driving one session.
///
/// The secret is opaque; logs identify the account by its `label`.
#[derive(Debug, Clone)]
pub struct Credential {
    secret: SecretString,
    tier: Tier,
    label: String,
}

impl Credential {
    pub fn new(secret: impl Into<String>, tier: Tier, label: impl Into<String>) -> Self {
        Self {
            secret: SecretString::from(secret.into()),
            tier,
            label: label.into(),
        }
    }

    pub fn secret(&self) -> &SecretString {
        &self.secret
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}
