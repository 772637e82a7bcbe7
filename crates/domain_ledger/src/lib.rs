//! Credit Ledger Domain
//!
//! This crate tracks a member's prepaid usage allowances ("credits") as a
//! current-balance table plus an immutable transaction log, and guarantees
//! the two never drift apart.
//!
//! # Invariants
//!
//! - An account balance is never negative
//! - Every balance mutation appends exactly one transaction in the same
//!   unit of work; replaying a account's transactions reproduces its balance
//! - Transactions are never updated or deleted - refunds are new rows
//!
//! # Example
//!
//! ```rust,ignore
//! use domain_ledger::{CreditLedger, sources};
//!
//! let ledger = CreditLedger::new(store, LedgerConfig::default());
//! ledger.add(user, Blocks::new(10), CreditType::FreeHours,
//!            sources::MONTHLY_ALLOCATION, None, None, None).await?;
//! let txn = ledger.deduct(user, Blocks::new(4), CreditType::FreeHours,
//!                         sources::CHARGE_USAGE, Some(charge_id)).await?;
//! assert_eq!(txn.balance_after, Blocks::new(6));
//! ```

pub mod account;
pub mod allocation;
pub mod error;
pub mod ledger;
pub mod ops;
pub mod ports;
pub mod transaction;

pub use account::LedgerAccount;
pub use allocation::{
    AllocationFrequency, AllocationReport, AllocationScheduler, CreditAllocation,
};
pub use error::LedgerError;
pub use ledger::CreditLedger;
pub use ports::{LedgerStore, LedgerUnitOfWork};
pub use transaction::{sources, LedgerTransaction};
