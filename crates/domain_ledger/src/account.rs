//! Ledger account - the current-balance row for one (user, credit type)
//!
//! Accounts are created lazily on the first movement and never deleted.
//! The balance column is only ever written through transaction-producing
//! ledger operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{Blocks, CreditType, CreditTypeDefaults, UserId};

/// Current balance of one credit type for one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerAccount {
    /// Owning user
    pub user_id: UserId,
    /// Credit domain this balance belongs to
    pub credit_type: CreditType,
    /// Current balance in blocks, never negative
    pub balance: Blocks,
    /// Balance cap, if the type is capped
    pub max_balance: Option<Blocks>,
    /// Whether unspent balance carries over at allocation time
    pub rollover_enabled: bool,
    /// When the balance stops being spendable; expired accounts read as zero
    pub expires_at: Option<DateTime<Utc>>,
    /// When the account row was created
    pub created_at: DateTime<Utc>,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
}

impl LedgerAccount {
    /// Opens a zero-balance account with the credit type's defaults
    ///
    /// Called on the first `add`/`deduct` touching a (user, credit type)
    /// pair that has no row yet.
    pub fn open(
        user_id: UserId,
        credit_type: CreditType,
        defaults: CreditTypeDefaults,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            credit_type,
            balance: Blocks::ZERO,
            max_balance: defaults.max_balance,
            rollover_enabled: defaults.rollover_enabled,
            expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns true if the account's credits have expired
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(expiry) if expiry <= now)
    }

    /// Returns the spendable balance: zero once expired, without zeroing
    /// the stored balance
    pub fn effective_balance(&self, now: DateTime<Utc>) -> Blocks {
        if self.is_expired(now) {
            Blocks::ZERO
        } else {
            self.balance
        }
    }

    /// Remaining headroom below the cap, if any cap is set
    pub fn headroom(&self) -> Option<Blocks> {
        self.max_balance.map(|cap| cap - self.balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use core_kernel::CreditTypeDefaults;

    fn account(expires_at: Option<DateTime<Utc>>) -> LedgerAccount {
        let now = Utc::now();
        let mut account = LedgerAccount::open(
            UserId::new(),
            CreditType::FreeHours,
            CreditTypeDefaults { max_balance: None, rollover_enabled: false },
            now,
        );
        account.balance = Blocks::new(10);
        account.expires_at = expires_at;
        account
    }

    #[test]
    fn test_open_applies_defaults() {
        let now = Utc::now();
        let account = LedgerAccount::open(
            UserId::new(),
            CreditType::EquipmentCredits,
            CreditTypeDefaults { max_balance: Some(Blocks::new(250)), rollover_enabled: true },
            now,
        );
        assert_eq!(account.balance, Blocks::ZERO);
        assert_eq!(account.max_balance, Some(Blocks::new(250)));
        assert!(account.rollover_enabled);
        assert!(account.expires_at.is_none());
    }

    #[test]
    fn test_effective_balance_unexpired() {
        let now = Utc::now();
        let account = account(Some(now + Duration::days(30)));
        assert_eq!(account.effective_balance(now), Blocks::new(10));
    }

    #[test]
    fn test_effective_balance_expired_reads_zero() {
        let now = Utc::now();
        let account = account(Some(now - Duration::days(1)));
        assert!(account.is_expired(now));
        assert_eq!(account.effective_balance(now), Blocks::ZERO);
        // The stored balance is untouched
        assert_eq!(account.balance, Blocks::new(10));
    }

    #[test]
    fn test_headroom() {
        let mut account = account(None);
        assert_eq!(account.headroom(), None);
        account.max_balance = Some(Blocks::new(25));
        assert_eq!(account.headroom(), Some(Blocks::new(15)));
    }
}
