//! Pricing collaborator port
//!
//! How a gross amount and credit split are computed from a chargeable's
//! fields is outside this core: rate tables, member discounts and
//! per-entity rules all live with the pricing collaborator. The lifecycle
//! only consumes the resulting triple.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use core_kernel::{Blocks, CreditType, Money, UserId};

use crate::chargeable::Chargeable;

/// Result of one pricing calculation
///
/// Integers only: `amount`/`net_amount` are minor currency units,
/// `credits_applied` is whole blocks per credit type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingResult {
    /// Gross amount before credits
    pub amount: Money,
    /// Amount still due after credit value is subtracted
    pub net_amount: Money,
    /// Blocks consumed per credit type; absent types count as zero
    pub credits_applied: BTreeMap<CreditType, Blocks>,
}

impl PricingResult {
    /// A free result: nothing owed, no credits consumed
    pub fn free() -> Self {
        Self {
            amount: Money::ZERO,
            net_amount: Money::ZERO,
            credits_applied: BTreeMap::new(),
        }
    }

    /// Returns true if credit value covers the whole gross amount
    pub fn fully_covered(&self) -> bool {
        self.net_amount.is_zero()
    }
}

/// The external pricing collaborator failed
#[derive(Debug, Error)]
#[error("pricing calculation failed: {0}")]
pub struct PricingError(pub String);

/// Computes `{amount, net_amount, credits_applied}` for a chargeable
#[async_trait]
pub trait PricingCalculator<C: Chargeable>: Send + Sync {
    async fn calculate(&self, chargeable: &C, user_id: UserId)
        -> Result<PricingResult, PricingError>;
}

/// Signed per-type difference between two credit splits
///
/// The union of both key sets is diffed; a type absent from one side
/// counts as zero, so dropping a credit type entirely still produces its
/// full negative delta (and thus a refund). Zero differences are omitted.
pub fn credit_diff(
    old: &BTreeMap<CreditType, Blocks>,
    new: &BTreeMap<CreditType, Blocks>,
) -> BTreeMap<CreditType, Blocks> {
    let mut diff = BTreeMap::new();
    for credit_type in old.keys().chain(new.keys()) {
        if diff.contains_key(credit_type) {
            continue;
        }
        let before = old.get(credit_type).copied().unwrap_or(Blocks::ZERO);
        let after = new.get(credit_type).copied().unwrap_or(Blocks::ZERO);
        let delta = after - before;
        if !delta.is_zero() {
            diff.insert(*credit_type, delta);
        }
    }
    diff
}
