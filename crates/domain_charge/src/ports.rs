//! Storage ports for the billing domain
//!
//! A billing unit of work extends the ledger unit of work with charge-row
//! access, so one atomic batch spans the charge write and its matching
//! credit movements. Charge rows carry no lock of their own: they are only
//! mutated from a unit of work that already holds the relevant account
//! lock(s).

use async_trait::async_trait;

use core_kernel::ChargeableKey;

use domain_ledger::LedgerUnitOfWork;

use crate::charge::Charge;
use crate::error::ChargeError;

/// One atomic batch of charge and ledger writes
#[async_trait]
pub trait BillingUnitOfWork: LedgerUnitOfWork {
    /// Fetches the charge row for a chargeable, if one exists
    async fn find_charge(&mut self, key: ChargeableKey) -> Result<Option<Charge>, ChargeError>;

    /// Inserts a new charge row; fails if the chargeable is already billed
    async fn insert_charge(&mut self, charge: &Charge) -> Result<(), ChargeError>;

    /// Writes back a mutated charge row
    async fn update_charge(&mut self, charge: &Charge) -> Result<(), ChargeError>;
}

/// Handle to billing storage
#[async_trait]
pub trait BillingStore: Send + Sync {
    type Uow: BillingUnitOfWork;

    /// Opens a new unit of work
    async fn begin(&self) -> Result<Self::Uow, ChargeError>;

    /// Reads a charge row without locking, for display paths
    async fn find_charge(&self, key: ChargeableKey) -> Result<Option<Charge>, ChargeError>;
}
