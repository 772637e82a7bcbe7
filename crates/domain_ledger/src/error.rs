//! Ledger domain errors

use core_kernel::{Blocks, CreditType};
use thiserror::Error;

/// Errors that can occur in the credit ledger domain
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Balance too low for the requested spend
    ///
    /// Carries the current balance and the requested amount so callers can
    /// present a precise message or fall back to requiring payment.
    #[error("insufficient {credit_type} credits: balance={balance}, requested={requested}")]
    InsufficientCredits {
        credit_type: CreditType,
        balance: Blocks,
        requested: Blocks,
    },

    /// Operation called with a non-positive or otherwise invalid amount
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Defensive check failed: a balance would have gone negative despite
    /// the account lock. Treated as fatal and aborted.
    #[error("ledger invariant violated: {0}")]
    InvariantViolation(String),

    /// Underlying storage failure
    #[error("storage error: {0}")]
    Storage(String),
}

impl LedgerError {
    /// Returns true if this error is a recoverable balance shortfall
    pub fn is_insufficient_credits(&self) -> bool {
        matches!(self, LedgerError::InsufficientCredits { .. })
    }
}
