//! Ledger transactions - the immutable audit log
//!
//! Every balance mutation appends exactly one row here, snapshotting the
//! resulting balance at write time. Rows are never updated or deleted;
//! refunds are new transactions with the opposite sign.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{Blocks, ChargeId, CreditType, LedgerTransactionId, UserId};

/// Well-known provenance tags recorded in [`LedgerTransaction::source`]
pub mod sources {
    /// Credits spent against a newly created or confirmed charge
    pub const CHARGE_USAGE: &str = "charge_usage";
    /// Delta applied when a chargeable's pricing was recomputed
    pub const CHARGE_UPDATE: &str = "charge_update";
    /// Refund issued when a chargeable was cancelled
    pub const CHARGE_CANCELLATION: &str = "charge_cancellation";
    /// Periodic overwrite of a non-rollover balance
    pub const MONTHLY_RESET: &str = "monthly_reset";
    /// Periodic grant into a rollover balance
    pub const MONTHLY_ALLOCATION: &str = "monthly_allocation";
}

/// One immutable balance change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTransaction {
    /// Unique identifier
    pub id: LedgerTransactionId,
    /// Account owner
    pub user_id: UserId,
    /// Account credit type
    pub credit_type: CreditType,
    /// Signed movement: positive = grant, negative = spend
    pub amount: Blocks,
    /// Balance immediately after this movement was applied
    pub balance_after: Blocks,
    /// Free-text provenance tag, see [`sources`]
    pub source: String,
    /// Charge this movement belongs to, when charge-driven
    pub source_id: Option<ChargeId>,
    /// Human-readable note
    pub description: Option<String>,
    /// Append time
    pub created_at: DateTime<Utc>,
}

impl LedgerTransaction {
    /// Records a new movement
    pub fn record(
        user_id: UserId,
        credit_type: CreditType,
        amount: Blocks,
        balance_after: Blocks,
        source: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: LedgerTransactionId::new_v7(),
            user_id,
            credit_type,
            amount,
            balance_after,
            source: source.into(),
            source_id: None,
            description: None,
            created_at,
        }
    }

    /// Attaches the owning charge
    pub fn with_source_id(mut self, source_id: ChargeId) -> Self {
        self.source_id = Some(source_id);
        self
    }

    /// Attaches a description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Returns true if this movement granted credits
    pub fn is_grant(&self) -> bool {
        self.amount.is_positive()
    }

    /// Returns true if this movement spent credits
    pub fn is_spend(&self) -> bool {
        self.amount.is_negative()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_builders() {
        let user = UserId::new();
        let charge = ChargeId::new_v7();
        let txn = LedgerTransaction::record(
            user,
            CreditType::FreeHours,
            Blocks::new(-4),
            Blocks::new(6),
            sources::CHARGE_USAGE,
            Utc::now(),
        )
        .with_source_id(charge)
        .with_description("practice room reservation");

        assert_eq!(txn.user_id, user);
        assert_eq!(txn.source, "charge_usage");
        assert_eq!(txn.source_id, Some(charge));
        assert!(txn.is_spend());
        assert!(!txn.is_grant());
    }
}
