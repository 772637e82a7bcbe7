//! Core Kernel - Foundational types for the member credit ledger
//!
//! This crate provides the fundamental building blocks used across all domain modules:
//! - Integer money and credit-block units (no floating point anywhere near a balance)
//! - Strongly-typed identifiers and the polymorphic chargeable key
//! - Credit type definitions and the explicit ledger configuration struct

pub mod config;
pub mod credit;
pub mod identifiers;
pub mod units;

pub use config::{CreditTypeDefaults, LedgerConfig};
pub use credit::CreditType;
pub use identifiers::{
    AllocationId, ChargeId, ChargeableKey, ChargeableKind, LedgerTransactionId, UserId,
};
pub use units::{Blocks, Money, UnitError};
