//! Chargeable Billing Domain
//!
//! One [`Charge`] row tracks the money owed for one chargeable entity
//! (reservation, event, equipment loan). The [`ChargeableLifecycle`]
//! orchestrator keeps that row and the credit ledger in lock-step as the
//! entity is created, edited, confirmed and cancelled: every operation
//! composes pricing input, the charge record and ledger movements inside
//! one unit of work, so a charge can never exist without its matching
//! credit movement or vice versa.

pub mod charge;
pub mod chargeable;
pub mod error;
pub mod lifecycle;
pub mod notify;
pub mod ports;
pub mod pricing;

pub use charge::{Charge, ChargeStatus, PaymentMethod};
pub use chargeable::Chargeable;
pub use error::ChargeError;
pub use lifecycle::ChargeableLifecycle;
pub use notify::{NoopDispatcher, NotificationDispatcher, NotificationError};
pub use ports::{BillingStore, BillingUnitOfWork};
pub use pricing::{credit_diff, PricingCalculator, PricingError, PricingResult};
