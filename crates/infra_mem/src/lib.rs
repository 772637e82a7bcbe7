//! In-memory store adapter
//!
//! Implements both the ledger and billing store ports against a single
//! mutex-guarded state map. A unit of work clones the state at begin and
//! mutates the clone; commit writes the clone back, dropping without
//! commit discards it - the same all-or-nothing semantics the PostgreSQL
//! adapter gets from a transaction rollback.
//!
//! The one mutex is coarser than a per-account row lock, but it preserves
//! the guarantee the domain relies on: all mutations against one account
//! are strictly serialized.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use core_kernel::{AllocationId, ChargeId, ChargeableKey, CreditType, UserId};
use domain_charge::{BillingStore, BillingUnitOfWork, Charge, ChargeError};
use domain_ledger::{
    CreditAllocation, LedgerAccount, LedgerError, LedgerStore, LedgerTransaction,
    LedgerUnitOfWork,
};

#[derive(Debug, Default, Clone)]
struct State {
    accounts: HashMap<(UserId, CreditType), LedgerAccount>,
    transactions: Vec<LedgerTransaction>,
    charges: HashMap<ChargeableKey, Charge>,
    allocations: HashMap<AllocationId, CreditAllocation>,
}

/// In-memory ledger and billing storage
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a unit of work; inherent so callers with both store traits in
    /// scope do not hit method ambiguity
    pub async fn begin(&self) -> MemoryUnitOfWork {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let work = guard.clone();
        MemoryUnitOfWork { guard, work }
    }

    /// Total number of recorded transactions, for assertions in tests
    pub async fn transaction_count(&self) -> usize {
        self.state.lock().await.transactions.len()
    }
}

/// Copy-on-begin unit of work over the shared state
pub struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<State>,
    work: State,
}

#[async_trait]
impl LedgerUnitOfWork for MemoryUnitOfWork {
    async fn lock_account(
        &mut self,
        user_id: UserId,
        credit_type: CreditType,
    ) -> Result<Option<LedgerAccount>, LedgerError> {
        Ok(self.work.accounts.get(&(user_id, credit_type)).cloned())
    }

    async fn insert_account(&mut self, account: &LedgerAccount) -> Result<(), LedgerError> {
        let key = (account.user_id, account.credit_type);
        if self.work.accounts.contains_key(&key) {
            return Err(LedgerError::Storage(format!(
                "account already exists for {}/{}",
                account.user_id, account.credit_type
            )));
        }
        self.work.accounts.insert(key, account.clone());
        Ok(())
    }

    async fn update_account(&mut self, account: &LedgerAccount) -> Result<(), LedgerError> {
        let key = (account.user_id, account.credit_type);
        match self.work.accounts.get_mut(&key) {
            Some(existing) => {
                *existing = account.clone();
                Ok(())
            }
            None => Err(LedgerError::Storage(format!(
                "no account row for {}/{}",
                account.user_id, account.credit_type
            ))),
        }
    }

    async fn insert_transaction(
        &mut self,
        transaction: &LedgerTransaction,
    ) -> Result<(), LedgerError> {
        self.work.transactions.push(transaction.clone());
        Ok(())
    }

    async fn transactions_for_charge(
        &mut self,
        source: &str,
        charge_id: ChargeId,
    ) -> Result<Vec<LedgerTransaction>, LedgerError> {
        Ok(self
            .work
            .transactions
            .iter()
            .filter(|t| t.source == source && t.source_id == Some(charge_id))
            .cloned()
            .collect())
    }

    async fn insert_allocation(
        &mut self,
        allocation: &CreditAllocation,
    ) -> Result<(), LedgerError> {
        self.work.allocations.insert(allocation.id, allocation.clone());
        Ok(())
    }

    async fn update_allocation(
        &mut self,
        allocation: &CreditAllocation,
    ) -> Result<(), LedgerError> {
        match self.work.allocations.get_mut(&allocation.id) {
            Some(existing) => {
                *existing = allocation.clone();
                Ok(())
            }
            None => Err(LedgerError::Storage(format!(
                "no allocation row for {}",
                allocation.id
            ))),
        }
    }

    async fn commit(self) -> Result<(), LedgerError> {
        let MemoryUnitOfWork { mut guard, work } = self;
        *guard = work;
        Ok(())
    }
}

#[async_trait]
impl BillingUnitOfWork for MemoryUnitOfWork {
    async fn find_charge(&mut self, key: ChargeableKey) -> Result<Option<Charge>, ChargeError> {
        Ok(self.work.charges.get(&key).cloned())
    }

    async fn insert_charge(&mut self, charge: &Charge) -> Result<(), ChargeError> {
        if self.work.charges.contains_key(&charge.chargeable) {
            return Err(ChargeError::Storage(format!(
                "charge already exists for {}",
                charge.chargeable
            )));
        }
        self.work.charges.insert(charge.chargeable, charge.clone());
        Ok(())
    }

    async fn update_charge(&mut self, charge: &Charge) -> Result<(), ChargeError> {
        match self.work.charges.get_mut(&charge.chargeable) {
            Some(existing) => {
                *existing = charge.clone();
                Ok(())
            }
            None => Err(ChargeError::Storage(format!(
                "no charge row for {}",
                charge.chargeable
            ))),
        }
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    type Uow = MemoryUnitOfWork;

    async fn begin(&self) -> Result<Self::Uow, LedgerError> {
        Ok(MemoryStore::begin(self).await)
    }

    async fn find_account(
        &self,
        user_id: UserId,
        credit_type: CreditType,
    ) -> Result<Option<LedgerAccount>, LedgerError> {
        Ok(self.state.lock().await.accounts.get(&(user_id, credit_type)).cloned())
    }

    async fn account_transactions(
        &self,
        user_id: UserId,
        credit_type: CreditType,
    ) -> Result<Vec<LedgerTransaction>, LedgerError> {
        Ok(self
            .state
            .lock()
            .await
            .transactions
            .iter()
            .filter(|t| t.user_id == user_id && t.credit_type == credit_type)
            .cloned()
            .collect())
    }

    async fn due_allocations(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<CreditAllocation>, LedgerError> {
        let mut due: Vec<CreditAllocation> = self
            .state
            .lock()
            .await
            .allocations
            .values()
            .filter(|a| a.active && a.next_allocation_at <= now)
            .cloned()
            .collect();
        due.sort_by_key(|a| a.next_allocation_at);
        Ok(due)
    }
}

#[async_trait]
impl BillingStore for MemoryStore {
    type Uow = MemoryUnitOfWork;

    async fn begin(&self) -> Result<Self::Uow, ChargeError> {
        Ok(MemoryStore::begin(self).await)
    }

    async fn find_charge(&self, key: ChargeableKey) -> Result<Option<Charge>, ChargeError> {
        Ok(self.state.lock().await.charges.get(&key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use core_kernel::{Blocks, CreditType, CreditTypeDefaults};

    fn account(user: UserId) -> LedgerAccount {
        LedgerAccount::open(
            user,
            CreditType::FreeHours,
            CreditTypeDefaults { max_balance: None, rollover_enabled: false },
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_commit_publishes_writes() {
        let store = MemoryStore::new();
        let user = UserId::new();

        let mut uow = store.begin().await;
        uow.insert_account(&account(user)).await.unwrap();
        uow.commit().await.unwrap();

        let found = LedgerStore::find_account(&store, user, CreditType::FreeHours)
            .await
            .unwrap();
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn test_drop_discards_writes() {
        let store = MemoryStore::new();
        let user = UserId::new();

        {
            let mut uow = store.begin().await;
            uow.insert_account(&account(user)).await.unwrap();
            // dropped without commit
        }

        let found = LedgerStore::find_account(&store, user, CreditType::FreeHours)
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_account_rejected() {
        let store = MemoryStore::new();
        let row = account(UserId::new());

        let mut uow = store.begin().await;
        uow.insert_account(&row).await.unwrap();
        let err = uow.insert_account(&row).await.unwrap_err();
        assert!(matches!(err, LedgerError::Storage(_)));
    }

    #[tokio::test]
    async fn test_update_requires_existing_row() {
        let store = MemoryStore::new();
        let mut row = account(UserId::new());

        let mut uow = store.begin().await;
        row.balance = Blocks::new(5);
        let err = uow.update_account(&row).await.unwrap_err();
        assert!(matches!(err, LedgerError::Storage(_)));
    }
}
