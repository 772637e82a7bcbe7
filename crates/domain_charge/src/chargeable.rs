//! The chargeable capability
//!
//! Any domain entity that can own a charge - a reservation, a ticketed
//! event, an equipment loan - satisfies this trait. The billing core only
//! ever depends on this seam, never on the concrete entity types.

use core_kernel::{ChargeableKey, UserId};

use crate::pricing::PricingResult;

/// Capability of a domain entity that can be billed
pub trait Chargeable: Send + Sync {
    /// The user billed for this entity
    fn billable_user(&self) -> UserId;

    /// Stable identity used to look up the charge row
    fn charge_key(&self) -> ChargeableKey;

    /// Whether the given entity state reserves pricing without spending
    /// credits yet (e.g. a reservation that is merely "reserved")
    ///
    /// Consulted on cancellation: credits were never deducted for a
    /// deferring state, so no refund is issued for it.
    fn state_defers_credits(&self, state: &str) -> bool;

    /// Writes pricing-derived display fields back onto the entity (e.g.
    /// free-hours-used)
    ///
    /// This is a quiet update: implementations must not re-enter the
    /// billing lifecycle from here.
    fn apply_derived_fields(&mut self, pricing: &PricingResult);
}
