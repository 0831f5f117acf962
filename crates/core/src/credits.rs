//! Credit reasons, pricing, and affordability rules.
//!
//! The balance itself lives in the ledger store; this module only holds the
//! pure rules the ledger service and orchestrator apply around it.

use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Reason codes
// ---------------------------------------------------------------------------

/// Why a ledger entry exists. Stored as upper-case text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CreditReason {
    Usage,
    Refund,
    Bonus,
    Correction,
    AutoRenewal,
    Purchase,
}

impl CreditReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Usage => "USAGE",
            Self::Refund => "REFUND",
            Self::Bonus => "BONUS",
            Self::Correction => "CORRECTION",
            Self::AutoRenewal => "AUTO_RENEWAL",
            Self::Purchase => "PURCHASE",
        }
    }

    /// `true` for reasons that take credits away from the owner.
    pub fn is_debit(self) -> bool {
        matches!(self, Self::Usage)
    }
}

impl std::fmt::Display for CreditReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CreditReason {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "USAGE" => Ok(Self::Usage),
            "REFUND" => Ok(Self::Refund),
            "BONUS" => Ok(Self::Bonus),
            "CORRECTION" => Ok(Self::Correction),
            "AUTO_RENEWAL" => Ok(Self::AutoRenewal),
            "PURCHASE" => Ok(Self::Purchase),
            other => Err(CoreError::Validation(format!(
                "Unknown credit reason: {other}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Amounts and affordability
// ---------------------------------------------------------------------------

/// Result of comparing a balance against a required amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Affordability {
    pub can_afford: bool,
    pub available: i64,
}

/// Compare `available` against `required`.
pub fn check_affordability(available: i64, required: i64) -> Affordability {
    Affordability {
        can_afford: available >= required,
        available,
    }
}

/// Ledger operations take strictly positive magnitudes; the sign is implied
/// by the operation (debit or credit).
pub fn validate_amount(amount: i64) -> Result<(), CoreError> {
    if amount <= 0 {
        return Err(CoreError::Validation(format!(
            "Credit amount must be positive, got {amount}"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Pricing
// ---------------------------------------------------------------------------

/// Cost applied to models missing from the table.
pub const DEFAULT_MODEL_CREDITS: i64 = 10;

/// Credits charged per generated image for each model.
#[derive(Debug, Clone)]
pub struct PricingTable {
    prices: HashMap<String, i64>,
    default_credits: i64,
}

impl PricingTable {
    /// An empty table where every model costs `default_credits`.
    pub fn new(default_credits: i64) -> Self {
        Self {
            prices: HashMap::new(),
            default_credits,
        }
    }

    /// Set the price of one model.
    pub fn with_price(mut self, model: impl Into<String>, credits: i64) -> Self {
        self.prices.insert(model.into(), credits);
        self
    }

    /// Credits for a single image of `model`.
    pub fn credits_for(&self, model: &str) -> i64 {
        self.prices
            .get(model)
            .copied()
            .unwrap_or(self.default_credits)
    }

    /// Credits for a request producing `batch_size` images of `model`.
    pub fn cost(&self, model: &str, batch_size: u32) -> i64 {
        self.credits_for(model) * i64::from(batch_size.max(1))
    }
}

impl Default for PricingTable {
    fn default() -> Self {
        Self::new(DEFAULT_MODEL_CREDITS)
            .with_price("flux-pro", 10)
            .with_price("flux-max", 20)
            .with_price("gpt-image", 30)
            .with_price("midjourney", 25)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
