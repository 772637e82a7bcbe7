//! PostgreSQL store adapter
//!
//! `PgStore` implements the ledger and billing store ports over a
//! connection pool; `PgUnitOfWork` wraps one database transaction.
//! Account rows are locked with `SELECT ... FOR UPDATE`, so concurrent
//! spenders against one balance queue up on the row lock and the
//! balance-check-then-deduct sequence cannot race.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::{Postgres, Transaction};
use tracing::instrument;

use core_kernel::{ChargeId, ChargeableKey, CreditType, UserId};
use domain_charge::{BillingStore, BillingUnitOfWork, Charge, ChargeError};
use domain_ledger::{
    CreditAllocation, LedgerAccount, LedgerError, LedgerStore, LedgerTransaction,
    LedgerUnitOfWork,
};

use crate::rows::{account_from_row, allocation_from_row, charge_from_row, transaction_from_row};

fn storage_ledger(err: sqlx::Error) -> LedgerError {
    LedgerError::Storage(err.to_string())
}

fn storage_charge(err: sqlx::Error) -> ChargeError {
    ChargeError::Storage(err.to_string())
}

/// PostgreSQL-backed ledger and billing storage
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn begin_tx(&self) -> Result<PgUnitOfWork, sqlx::Error> {
        Ok(PgUnitOfWork { tx: self.pool.begin().await? })
    }
}

/// One database transaction's worth of ledger and charge writes
pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerUnitOfWork for PgUnitOfWork {
    async fn lock_account(
        &mut self,
        user_id: UserId,
        credit_type: CreditType,
    ) -> Result<Option<LedgerAccount>, LedgerError> {
        let row = sqlx::query(
            r#"
            SELECT user_id, credit_type, balance, max_balance, rollover_enabled,
                   expires_at, created_at, updated_at
            FROM ledger_accounts
            WHERE user_id = $1 AND credit_type = $2
            FOR UPDATE
            "#,
        )
        .bind(*user_id.as_uuid())
        .bind(credit_type.as_str())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(storage_ledger)?;

        row.as_ref().map(account_from_row).transpose()
    }

    async fn insert_account(&mut self, account: &LedgerAccount) -> Result<(), LedgerError> {
        sqlx::query(
            r#"
            INSERT INTO ledger_accounts (
                user_id, credit_type, balance, max_balance, rollover_enabled,
                expires_at, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(*account.user_id.as_uuid())
        .bind(account.credit_type.as_str())
        .bind(account.balance.value())
        .bind(account.max_balance.map(|b| b.value()))
        .bind(account.rollover_enabled)
        .bind(account.expires_at)
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(storage_ledger)?;
        Ok(())
    }

    async fn update_account(&mut self, account: &LedgerAccount) -> Result<(), LedgerError> {
        sqlx::query(
            r#"
            UPDATE ledger_accounts
            SET balance = $3, max_balance = $4, rollover_enabled = $5,
                expires_at = $6, updated_at = $7
            WHERE user_id = $1 AND credit_type = $2
            "#,
        )
        .bind(*account.user_id.as_uuid())
        .bind(account.credit_type.as_str())
        .bind(account.balance.value())
        .bind(account.max_balance.map(|b| b.value()))
        .bind(account.rollover_enabled)
        .bind(account.expires_at)
        .bind(account.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(storage_ledger)?;
        Ok(())
    }

    async fn insert_transaction(
        &mut self,
        transaction: &LedgerTransaction,
    ) -> Result<(), LedgerError> {
        sqlx::query(
            r#"
            INSERT INTO ledger_transactions (
                id, user_id, credit_type, amount, balance_after,
                source, source_id, description, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(*transaction.id.as_uuid())
        .bind(*transaction.user_id.as_uuid())
        .bind(transaction.credit_type.as_str())
        .bind(transaction.amount.value())
        .bind(transaction.balance_after.value())
        .bind(transaction.source.as_str())
        .bind(transaction.source_id.map(|c| *c.as_uuid()))
        .bind(transaction.description.as_deref())
        .bind(transaction.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(storage_ledger)?;
        Ok(())
    }

    async fn transactions_for_charge(
        &mut self,
        source: &str,
        charge_id: ChargeId,
    ) -> Result<Vec<LedgerTransaction>, LedgerError> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, credit_type, amount, balance_after,
                   source, source_id, description, created_at
            FROM ledger_transactions
            WHERE source = $1 AND source_id = $2
            ORDER BY created_at, id
            "#,
        )
        .bind(source)
        .bind(*charge_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(storage_ledger)?;

        rows.iter().map(transaction_from_row).collect()
    }

    async fn insert_allocation(
        &mut self,
        allocation: &CreditAllocation,
    ) -> Result<(), LedgerError> {
        sqlx::query(
            r#"
            INSERT INTO credit_allocations (
                id, user_id, credit_type, amount, frequency,
                next_allocation_at, last_period, active, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(*allocation.id.as_uuid())
        .bind(*allocation.user_id.as_uuid())
        .bind(allocation.credit_type.as_str())
        .bind(allocation.amount.value())
        .bind(allocation.frequency.as_str())
        .bind(allocation.next_allocation_at)
        .bind(allocation.last_period.as_deref())
        .bind(allocation.active)
        .bind(allocation.created_at)
        .bind(allocation.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(storage_ledger)?;
        Ok(())
    }

    async fn update_allocation(
        &mut self,
        allocation: &CreditAllocation,
    ) -> Result<(), LedgerError> {
        sqlx::query(
            r#"
            UPDATE credit_allocations
            SET next_allocation_at = $2, last_period = $3, active = $4, updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(*allocation.id.as_uuid())
        .bind(allocation.next_allocation_at)
        .bind(allocation.last_period.as_deref())
        .bind(allocation.active)
        .bind(allocation.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(storage_ledger)?;
        Ok(())
    }

    async fn commit(self) -> Result<(), LedgerError> {
        self.tx.commit().await.map_err(storage_ledger)
    }
}

#[async_trait]
impl BillingUnitOfWork for PgUnitOfWork {
    async fn find_charge(&mut self, key: ChargeableKey) -> Result<Option<Charge>, ChargeError> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, chargeable_kind, chargeable_id, amount,
                   credits_applied, net_amount, credits_deferred, status,
                   payment_method, paid_at, external_reference, notes,
                   created_at, updated_at
            FROM charges
            WHERE chargeable_kind = $1 AND chargeable_id = $2
            "#,
        )
        .bind(key.kind.as_str())
        .bind(key.id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(storage_charge)?;

        row.as_ref().map(charge_from_row).transpose()
    }

    async fn insert_charge(&mut self, charge: &Charge) -> Result<(), ChargeError> {
        let credits_applied = serde_json::to_value(&charge.credits_applied)
            .map_err(|e| ChargeError::Storage(format!("encoding credits_applied: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO charges (
                id, user_id, chargeable_kind, chargeable_id, amount,
                credits_applied, net_amount, credits_deferred, status,
                payment_method, paid_at, external_reference, notes,
                created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(*charge.id.as_uuid())
        .bind(*charge.user_id.as_uuid())
        .bind(charge.chargeable.kind.as_str())
        .bind(charge.chargeable.id)
        .bind(charge.amount.minor_units())
        .bind(credits_applied)
        .bind(charge.net_amount.minor_units())
        .bind(charge.credits_deferred)
        .bind(charge.status.as_str())
        .bind(charge.payment_method.map(|m| m.as_str()))
        .bind(charge.paid_at)
        .bind(charge.external_reference.as_deref())
        .bind(charge.notes.as_deref())
        .bind(charge.created_at)
        .bind(charge.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(storage_charge)?;
        Ok(())
    }

    async fn update_charge(&mut self, charge: &Charge) -> Result<(), ChargeError> {
        let credits_applied = serde_json::to_value(&charge.credits_applied)
            .map_err(|e| ChargeError::Storage(format!("encoding credits_applied: {e}")))?;

        sqlx::query(
            r#"
            UPDATE charges
            SET amount = $2, credits_applied = $3, net_amount = $4,
                credits_deferred = $5, status = $6, payment_method = $7,
                paid_at = $8, external_reference = $9, notes = $10, updated_at = $11
            WHERE id = $1
            "#,
        )
        .bind(*charge.id.as_uuid())
        .bind(charge.amount.minor_units())
        .bind(credits_applied)
        .bind(charge.net_amount.minor_units())
        .bind(charge.credits_deferred)
        .bind(charge.status.as_str())
        .bind(charge.payment_method.map(|m| m.as_str()))
        .bind(charge.paid_at)
        .bind(charge.external_reference.as_deref())
        .bind(charge.notes.as_deref())
        .bind(charge.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(storage_charge)?;
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for PgStore {
    type Uow = PgUnitOfWork;

    async fn begin(&self) -> Result<Self::Uow, LedgerError> {
        self.begin_tx().await.map_err(storage_ledger)
    }

    #[instrument(skip(self), fields(user = %user_id, %credit_type))]
    async fn find_account(
        &self,
        user_id: UserId,
        credit_type: CreditType,
    ) -> Result<Option<LedgerAccount>, LedgerError> {
        let row = sqlx::query(
            r#"
            SELECT user_id, credit_type, balance, max_balance, rollover_enabled,
                   expires_at, created_at, updated_at
            FROM ledger_accounts
            WHERE user_id = $1 AND credit_type = $2
            "#,
        )
        .bind(*user_id.as_uuid())
        .bind(credit_type.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_ledger)?;

        row.as_ref().map(account_from_row).transpose()
    }

    #[instrument(skip(self), fields(user = %user_id, %credit_type))]
    async fn account_transactions(
        &self,
        user_id: UserId,
        credit_type: CreditType,
    ) -> Result<Vec<LedgerTransaction>, LedgerError> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, credit_type, amount, balance_after,
                   source, source_id, description, created_at
            FROM ledger_transactions
            WHERE user_id = $1 AND credit_type = $2
            ORDER BY created_at, id
            "#,
        )
        .bind(*user_id.as_uuid())
        .bind(credit_type.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(storage_ledger)?;

        rows.iter().map(transaction_from_row).collect()
    }

    #[instrument(skip(self))]
    async fn due_allocations(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<CreditAllocation>, LedgerError> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, credit_type, amount, frequency,
                   next_allocation_at, last_period, active, created_at, updated_at
            FROM credit_allocations
            WHERE active AND next_allocation_at <= $1
            ORDER BY next_allocation_at
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_ledger)?;

        rows.iter().map(allocation_from_row).collect()
    }
}

#[async_trait]
impl BillingStore for PgStore {
    type Uow = PgUnitOfWork;

    async fn begin(&self) -> Result<Self::Uow, ChargeError> {
        self.begin_tx().await.map_err(storage_charge)
    }

    #[instrument(skip(self), fields(chargeable = %key))]
    async fn find_charge(&self, key: ChargeableKey) -> Result<Option<Charge>, ChargeError> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, chargeable_kind, chargeable_id, amount,
                   credits_applied, net_amount, credits_deferred, status,
                   payment_method, paid_at, external_reference, notes,
                   created_at, updated_at
            FROM charges
            WHERE chargeable_kind = $1 AND chargeable_id = $2
            "#,
        )
        .bind(key.kind.as_str())
        .bind(key.id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_charge)?;

        row.as_ref().map(charge_from_row).transpose()
    }
}
