//! Billing domain errors

use core_kernel::ChargeableKey;
use thiserror::Error;

use domain_ledger::LedgerError;

use crate::charge::ChargeStatus;
use crate::pricing::PricingError;

/// Errors that can occur in the chargeable billing domain
#[derive(Debug, Error)]
pub enum ChargeError {
    /// Ledger failure; `InsufficientCredits` inside this variant is the
    /// recoverable shortfall callers may want to match on
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// The external pricing collaborator failed; aborts the whole
    /// operation before any write
    #[error(transparent)]
    Pricing(#[from] PricingError),

    /// No billing record exists where one was expected
    #[error("no charge recorded for {0}")]
    ChargeNotFound(ChargeableKey),

    /// Disallowed status transition
    #[error("invalid charge status transition from {from} to {to}")]
    InvalidTransition {
        from: ChargeStatus,
        to: ChargeStatus,
    },

    /// Underlying storage failure
    #[error("storage error: {0}")]
    Storage(String),
}

impl ChargeError {
    /// Returns true if this error is a recoverable credit shortfall
    pub fn is_insufficient_credits(&self) -> bool {
        matches!(self, ChargeError::Ledger(err) if err.is_insufficient_credits())
    }
}
