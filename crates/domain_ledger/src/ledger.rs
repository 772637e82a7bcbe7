//! The credit ledger service
//!
//! The only component allowed to mutate a [`LedgerAccount`]. Every public
//! operation opens one unit of work, takes the account lock before reading
//! the balance, performs its paired balance-write and transaction-append,
//! and commits - so a failure anywhere leaves neither a dangling
//! transaction nor an unexplained balance change.

use chrono::{DateTime, Utc};
use tracing::instrument;

use core_kernel::{Blocks, ChargeId, CreditType, LedgerConfig, UserId};

use crate::error::LedgerError;
use crate::ops;
use crate::ports::{LedgerStore, LedgerUnitOfWork};
use crate::transaction::LedgerTransaction;

/// Service front-end over ledger storage
#[derive(Debug, Clone)]
pub struct CreditLedger<S> {
    store: S,
    config: LedgerConfig,
}

impl<S: LedgerStore> CreditLedger<S> {
    /// Creates a ledger over the given store
    pub fn new(store: S, config: LedgerConfig) -> Self {
        Self { store, config }
    }

    /// Returns the spendable balance: 0 for missing or expired accounts
    pub async fn get_balance(
        &self,
        user_id: UserId,
        credit_type: CreditType,
    ) -> Result<Blocks, LedgerError> {
        self.get_balance_at(user_id, credit_type, Utc::now()).await
    }

    /// Like [`get_balance`](Self::get_balance) with an explicit clock
    pub async fn get_balance_at(
        &self,
        user_id: UserId,
        credit_type: CreditType,
        now: DateTime<Utc>,
    ) -> Result<Blocks, LedgerError> {
        let account = self.store.find_account(user_id, credit_type).await?;
        Ok(account.map(|a| a.effective_balance(now)).unwrap_or(Blocks::ZERO))
    }

    /// Grants credits and returns the appended transaction
    #[allow(clippy::too_many_arguments)]
    #[instrument(skip(self, description), fields(user = %user_id, %credit_type, %amount))]
    pub async fn add(
        &self,
        user_id: UserId,
        amount: Blocks,
        credit_type: CreditType,
        source: &str,
        source_id: Option<ChargeId>,
        description: Option<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<LedgerTransaction, LedgerError> {
        let now = Utc::now();
        let mut uow = self.store.begin().await?;
        let transaction = ops::add(
            &mut uow,
            &self.config,
            user_id,
            amount,
            credit_type,
            source,
            source_id,
            description,
            expires_at,
            now,
        )
        .await?;
        uow.commit().await?;
        Ok(transaction)
    }

    /// Spends credits, failing with
    /// [`LedgerError::InsufficientCredits`] when the balance is too low
    #[instrument(skip(self), fields(user = %user_id, %credit_type, %amount))]
    pub async fn deduct(
        &self,
        user_id: UserId,
        amount: Blocks,
        credit_type: CreditType,
        source: &str,
        source_id: Option<ChargeId>,
    ) -> Result<LedgerTransaction, LedgerError> {
        let now = Utc::now();
        let mut uow = self.store.begin().await?;
        let transaction = ops::deduct(
            &mut uow,
            &self.config,
            user_id,
            amount,
            credit_type,
            source,
            source_id,
            now,
        )
        .await?;
        uow.commit().await?;
        Ok(transaction)
    }

    /// Applies a signed delta: positive grants, negative spends
    #[instrument(skip(self, description), fields(user = %user_id, %credit_type, %delta))]
    pub async fn adjust(
        &self,
        user_id: UserId,
        delta: Blocks,
        credit_type: CreditType,
        source: &str,
        source_id: Option<ChargeId>,
        description: Option<String>,
    ) -> Result<LedgerTransaction, LedgerError> {
        let now = Utc::now();
        let mut uow = self.store.begin().await?;
        let transaction = ops::adjust(
            &mut uow,
            &self.config,
            user_id,
            delta,
            credit_type,
            source,
            source_id,
            description,
            now,
        )
        .await?;
        uow.commit().await?;
        Ok(transaction)
    }

    /// The configuration this ledger was constructed with
    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// The underlying store handle
    pub fn store(&self) -> &S {
        &self.store
    }
}
