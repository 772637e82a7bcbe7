//! Storage ports for the ledger domain
//!
//! The ledger mutates state through a unit of work: every public operation
//! begins one, performs its paired balance-write and transaction-append
//! inside it, and commits. Dropping an uncommitted unit of work discards
//! all of its writes - adapters map this onto a database transaction
//! rollback.
//!
//! Adapters must acquire a pessimistic per-account lock in `lock_account`
//! (e.g. `SELECT ... FOR UPDATE`), held until commit or drop, so that
//! concurrent spenders against one balance are strictly serialized.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use core_kernel::{ChargeId, CreditType, UserId};

use crate::account::LedgerAccount;
use crate::allocation::CreditAllocation;
use crate::error::LedgerError;
use crate::transaction::LedgerTransaction;

/// One atomic batch of ledger writes
#[async_trait]
pub trait LedgerUnitOfWork: Send {
    /// Fetches the account row under an exclusive lock, or None if the
    /// account does not exist yet
    async fn lock_account(
        &mut self,
        user_id: UserId,
        credit_type: CreditType,
    ) -> Result<Option<LedgerAccount>, LedgerError>;

    /// Inserts a newly opened account row
    async fn insert_account(&mut self, account: &LedgerAccount) -> Result<(), LedgerError>;

    /// Writes back a mutated account row
    async fn update_account(&mut self, account: &LedgerAccount) -> Result<(), LedgerError>;

    /// Appends one immutable transaction row
    async fn insert_transaction(
        &mut self,
        transaction: &LedgerTransaction,
    ) -> Result<(), LedgerError>;

    /// Returns the transactions recorded against a charge with the given
    /// provenance tag, in creation order
    async fn transactions_for_charge(
        &mut self,
        source: &str,
        charge_id: ChargeId,
    ) -> Result<Vec<LedgerTransaction>, LedgerError>;

    /// Inserts a new allocation record
    async fn insert_allocation(&mut self, allocation: &CreditAllocation)
        -> Result<(), LedgerError>;

    /// Writes back a mutated allocation record
    async fn update_allocation(&mut self, allocation: &CreditAllocation)
        -> Result<(), LedgerError>;

    /// Commits every write in this unit of work
    async fn commit(self) -> Result<(), LedgerError>
    where
        Self: Sized;
}

/// Handle to ledger storage
///
/// Read methods run outside any unit of work and take no locks.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    type Uow: LedgerUnitOfWork;

    /// Opens a new unit of work
    async fn begin(&self) -> Result<Self::Uow, LedgerError>;

    /// Reads an account row without locking it
    async fn find_account(
        &self,
        user_id: UserId,
        credit_type: CreditType,
    ) -> Result<Option<LedgerAccount>, LedgerError>;

    /// Returns an account's full transaction history in creation order
    async fn account_transactions(
        &self,
        user_id: UserId,
        credit_type: CreditType,
    ) -> Result<Vec<LedgerTransaction>, LedgerError>;

    /// Returns active allocations whose next run is due at or before `now`
    async fn due_allocations(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<CreditAllocation>, LedgerError>;
}
