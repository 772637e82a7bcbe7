//! The charge record and its status state machine
//!
//! One row per chargeable entity, storing the gross amount, the credits
//! applied per type, and the net amount still due after credit value is
//! subtracted. Rows are never deleted - cancellation flips the status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use core_kernel::{Blocks, ChargeId, ChargeableKey, CreditType, Money, UserId};

use crate::error::ChargeError;
use crate::pricing::PricingResult;

/// Billing status of a charge
///
/// `Pending → Paid | Comped | Cancelled | Refunded`; `Paid` and `Comped`
/// can still become `Refunded` on cancellation. The only re-entry into
/// `Pending` is a charge paid entirely with credits whose recomputed net
/// amount rose above zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeStatus {
    /// Awaiting payment
    Pending,
    /// Paid, by money or entirely by credits
    Paid,
    /// Marked free by staff
    Comped,
    /// Credits or money returned
    Refunded,
    /// Never paid; chargeable cancelled before payment
    Cancelled,
}

impl ChargeStatus {
    /// Returns the stable storage tag for this status
    pub fn as_str(&self) -> &'static str {
        match self {
            ChargeStatus::Pending => "pending",
            ChargeStatus::Paid => "paid",
            ChargeStatus::Comped => "comped",
            ChargeStatus::Refunded => "refunded",
            ChargeStatus::Cancelled => "cancelled",
        }
    }

    /// Returns true if this status still demands payment
    pub fn demands_payment(&self) -> bool {
        matches!(self, ChargeStatus::Pending)
    }

    /// Whether the state machine allows moving to `to`
    pub fn can_transition(&self, to: ChargeStatus) -> bool {
        use ChargeStatus::*;
        matches!(
            (self, to),
            (Pending, Paid)
                | (Pending, Comped)
                | (Pending, Refunded)
                | (Pending, Cancelled)
                | (Paid, Refunded)
                | (Paid, Pending)
                | (Comped, Refunded)
        )
    }
}

impl fmt::Display for ChargeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ChargeStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ChargeStatus::Pending),
            "paid" => Ok(ChargeStatus::Paid),
            "comped" => Ok(ChargeStatus::Comped),
            "refunded" => Ok(ChargeStatus::Refunded),
            "cancelled" => Ok(ChargeStatus::Cancelled),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Error for an unrecognized status tag
#[derive(Debug, thiserror::Error)]
#[error("unknown charge status: {0}")]
pub struct UnknownStatus(pub String);

/// How a charge was settled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Fully covered by credit value
    Credits,
    Card,
    Cash,
    BankTransfer,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Credits => "credits",
            PaymentMethod::Card => "card",
            PaymentMethod::Cash => "cash",
            PaymentMethod::BankTransfer => "bank_transfer",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = UnknownPaymentMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "credits" => Ok(PaymentMethod::Credits),
            "card" => Ok(PaymentMethod::Card),
            "cash" => Ok(PaymentMethod::Cash),
            "bank_transfer" => Ok(PaymentMethod::BankTransfer),
            other => Err(UnknownPaymentMethod(other.to_string())),
        }
    }
}

/// Error for an unrecognized payment method tag
#[derive(Debug, thiserror::Error)]
#[error("unknown payment method: {0}")]
pub struct UnknownPaymentMethod(pub String);

/// Money owed for one chargeable entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Charge {
    /// Unique identifier
    pub id: ChargeId,
    /// Billed user
    pub user_id: UserId,
    /// Owning chargeable entity; unique per charge
    pub chargeable: ChargeableKey,
    /// Gross amount in minor units
    pub amount: Money,
    /// Blocks consumed per credit type; may be empty
    pub credits_applied: BTreeMap<CreditType, Blocks>,
    /// Amount still due after credit value is subtracted
    pub net_amount: Money,
    /// True while credits are reserved in `credits_applied` but not yet
    /// deducted from the ledger (spending deferred until confirmation)
    pub credits_deferred: bool,
    /// Billing status
    pub status: ChargeStatus,
    /// Set when the charge was settled
    pub payment_method: Option<PaymentMethod>,
    /// Settlement time
    pub paid_at: Option<DateTime<Utc>>,
    /// External payment reference (gateway id, receipt number)
    pub external_reference: Option<String>,
    /// Staff notes
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Charge {
    /// Creates a pending charge from a pricing result
    pub fn new(
        user_id: UserId,
        chargeable: ChargeableKey,
        pricing: &PricingResult,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ChargeId::new_v7(),
            user_id,
            chargeable,
            amount: pricing.amount,
            credits_applied: pricing.credits_applied.clone(),
            net_amount: pricing.net_amount,
            credits_deferred: false,
            status: ChargeStatus::Pending,
            payment_method: None,
            paid_at: None,
            external_reference: None,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// True only when the status demands payment AND money is actually due
    ///
    /// A charge fully covered by credits never requires payment even
    /// though no money changed hands.
    pub fn requires_payment(&self) -> bool {
        self.status.demands_payment() && self.net_amount.is_positive()
    }

    /// Returns true if the charge was settled entirely with credits
    pub fn paid_with_credits(&self) -> bool {
        self.status == ChargeStatus::Paid && self.payment_method == Some(PaymentMethod::Credits)
    }

    /// Overwrites amount, credits applied and net amount from a recomputed
    /// pricing result
    pub fn apply_pricing(&mut self, pricing: &PricingResult, now: DateTime<Utc>) {
        self.amount = pricing.amount;
        self.credits_applied = pricing.credits_applied.clone();
        self.net_amount = pricing.net_amount;
        self.updated_at = now;
    }

    /// Marks the charge settled
    pub fn mark_paid(
        &mut self,
        method: PaymentMethod,
        now: DateTime<Utc>,
    ) -> Result<(), ChargeError> {
        self.transition(ChargeStatus::Paid, now)?;
        self.payment_method = Some(method);
        self.paid_at = Some(now);
        Ok(())
    }

    /// Marks the charge free of payment by staff decision
    pub fn mark_comped(&mut self, now: DateTime<Utc>) -> Result<(), ChargeError> {
        self.transition(ChargeStatus::Comped, now)
    }

    /// Marks credits/money returned
    pub fn mark_refunded(&mut self, now: DateTime<Utc>) -> Result<(), ChargeError> {
        self.transition(ChargeStatus::Refunded, now)
    }

    /// Marks a never-paid charge cancelled
    pub fn mark_cancelled(&mut self, now: DateTime<Utc>) -> Result<(), ChargeError> {
        self.transition(ChargeStatus::Cancelled, now)
    }

    /// The one backward transition: a charge settled entirely with credits
    /// whose recomputed net amount requires payment again
    pub fn reopen_pending(&mut self, now: DateTime<Utc>) -> Result<(), ChargeError> {
        if !self.paid_with_credits() {
            return Err(ChargeError::InvalidTransition {
                from: self.status,
                to: ChargeStatus::Pending,
            });
        }
        self.transition(ChargeStatus::Pending, now)?;
        self.payment_method = None;
        self.paid_at = None;
        Ok(())
    }

    fn transition(&mut self, to: ChargeStatus, now: DateTime<Utc>) -> Result<(), ChargeError> {
        if !self.status.can_transition(to) {
            return Err(ChargeError::InvalidTransition { from: self.status, to });
        }
        self.status = to;
        self.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::ChargeableKind;

    fn pricing(amount: i64, net: i64, blocks: i64) -> PricingResult {
        let mut credits_applied = BTreeMap::new();
        if blocks != 0 {
            credits_applied.insert(CreditType::FreeHours, Blocks::new(blocks));
        }
        PricingResult {
            amount: Money::from_minor(amount),
            net_amount: Money::from_minor(net),
            credits_applied,
        }
    }

    fn charge(net: i64) -> Charge {
        Charge::new(
            UserId::new(),
            ChargeableKey::new(ChargeableKind::Reservation, 7),
            &pricing(4000, net, 4),
            Utc::now(),
        )
    }

    #[test]
    fn test_new_charge_is_pending() {
        let charge = charge(4000);
        assert_eq!(charge.status, ChargeStatus::Pending);
        assert!(charge.requires_payment());
        assert_eq!(charge.credits_applied.len(), 1);
    }

    #[test]
    fn test_zero_net_never_requires_payment() {
        let mut charge = charge(0);
        assert!(!charge.requires_payment());
        charge.mark_paid(PaymentMethod::Credits, Utc::now()).unwrap();
        assert!(!charge.requires_payment());
        assert!(charge.paid_with_credits());
    }

    #[test]
    fn test_paid_to_refunded() {
        let mut charge = charge(4000);
        charge.mark_paid(PaymentMethod::Card, Utc::now()).unwrap();
        charge.mark_refunded(Utc::now()).unwrap();
        assert_eq!(charge.status, ChargeStatus::Refunded);
    }

    #[test]
    fn test_refunded_is_terminal() {
        let mut charge = charge(4000);
        charge.mark_refunded(Utc::now()).unwrap();
        let err = charge.mark_paid(PaymentMethod::Card, Utc::now()).unwrap_err();
        assert!(matches!(err, ChargeError::InvalidTransition { .. }));
    }

    #[test]
    fn test_cancelled_only_from_pending() {
        let mut charge = charge(4000);
        charge.mark_paid(PaymentMethod::Card, Utc::now()).unwrap();
        assert!(charge.mark_cancelled(Utc::now()).is_err());
    }

    #[test]
    fn test_reopen_pending_only_for_credit_paid() {
        let mut by_card = charge(4000);
        by_card.mark_paid(PaymentMethod::Card, Utc::now()).unwrap();
        assert!(by_card.reopen_pending(Utc::now()).is_err());

        let mut by_credits = charge(0);
        by_credits.mark_paid(PaymentMethod::Credits, Utc::now()).unwrap();
        by_credits.reopen_pending(Utc::now()).unwrap();
        assert_eq!(by_credits.status, ChargeStatus::Pending);
        assert!(by_credits.payment_method.is_none());
        assert!(by_credits.paid_at.is_none());
    }

    #[test]
    fn test_comped_to_refunded() {
        let mut charge = charge(4000);
        charge.mark_comped(Utc::now()).unwrap();
        charge.mark_refunded(Utc::now()).unwrap();
        assert_eq!(charge.status, ChargeStatus::Refunded);
    }

    #[test]
    fn test_status_roundtrip() {
        for status in [
            ChargeStatus::Pending,
            ChargeStatus::Paid,
            ChargeStatus::Comped,
            ChargeStatus::Refunded,
            ChargeStatus::Cancelled,
        ] {
            let parsed: ChargeStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }
}
