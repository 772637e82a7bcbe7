//! In-transaction ledger movements
//!
//! These are the building blocks behind [`CreditLedger`](crate::CreditLedger):
//! each function runs against an already-open unit of work so that callers
//! (the charge lifecycle in particular) can compose several movements with
//! their own writes in one atomic batch. The account lock is always taken
//! first, before the balance is read.

use chrono::{DateTime, Utc};
use tracing::{debug, error};

use core_kernel::{Blocks, ChargeId, CreditType, LedgerConfig, UserId};

use crate::account::LedgerAccount;
use crate::error::LedgerError;
use crate::ports::LedgerUnitOfWork;
use crate::transaction::LedgerTransaction;

/// Locks the account row, creating it with the credit type's defaults when
/// this is the first movement for the (user, credit type) pair
pub async fn lock_or_open_account<U: LedgerUnitOfWork>(
    uow: &mut U,
    config: &LedgerConfig,
    user_id: UserId,
    credit_type: CreditType,
    now: DateTime<Utc>,
) -> Result<LedgerAccount, LedgerError> {
    match uow.lock_account(user_id, credit_type).await? {
        Some(account) => Ok(account),
        None => {
            let account =
                LedgerAccount::open(user_id, credit_type, config.defaults_for(credit_type), now);
            uow.insert_account(&account).await?;
            Ok(account)
        }
    }
}

/// Grants credits: increments the balance and appends the matching
/// transaction with the post-increment balance snapshot
///
/// No cap is enforced here; callers that need capping (allocation)
/// pre-compute the allowed amount. A provided `expires_at` overwrites the
/// account's expiry.
#[allow(clippy::too_many_arguments)]
pub async fn add<U: LedgerUnitOfWork>(
    uow: &mut U,
    config: &LedgerConfig,
    user_id: UserId,
    amount: Blocks,
    credit_type: CreditType,
    source: &str,
    source_id: Option<ChargeId>,
    description: Option<String>,
    expires_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<LedgerTransaction, LedgerError> {
    require_positive(amount, "add")?;

    let mut account = lock_or_open_account(uow, config, user_id, credit_type, now).await?;
    account.balance = account
        .balance
        .checked_add(amount)
        .map_err(|_| LedgerError::InvalidAmount(format!("grant of {amount} overflows balance")))?;
    if expires_at.is_some() {
        account.expires_at = expires_at;
    }
    account.updated_at = now;

    let mut transaction = LedgerTransaction::record(
        user_id,
        credit_type,
        amount,
        account.balance,
        source,
        now,
    );
    if let Some(charge_id) = source_id {
        transaction = transaction.with_source_id(charge_id);
    }
    if let Some(description) = description {
        transaction = transaction.with_description(description);
    }

    uow.update_account(&account).await?;
    uow.insert_transaction(&transaction).await?;

    debug!(user = %user_id, %credit_type, %amount, balance = %account.balance, source, "credits granted");
    Ok(transaction)
}

/// Spends credits: fails with `InsufficientCredits` when the effective
/// balance (zero once expired) is below `amount`
#[allow(clippy::too_many_arguments)]
pub async fn deduct<U: LedgerUnitOfWork>(
    uow: &mut U,
    config: &LedgerConfig,
    user_id: UserId,
    amount: Blocks,
    credit_type: CreditType,
    source: &str,
    source_id: Option<ChargeId>,
    now: DateTime<Utc>,
) -> Result<LedgerTransaction, LedgerError> {
    require_positive(amount, "deduct")?;

    let mut account = lock_or_open_account(uow, config, user_id, credit_type, now).await?;
    let available = account.effective_balance(now);
    if available < amount {
        return Err(LedgerError::InsufficientCredits {
            credit_type,
            balance: available,
            requested: amount,
        });
    }

    account.balance = account.balance - amount;
    account.updated_at = now;
    if account.balance.is_negative() {
        // Unreachable while the lock ordering holds; abort loudly if not.
        error!(user = %user_id, %credit_type, balance = %account.balance, "balance went negative under lock");
        return Err(LedgerError::InvariantViolation(format!(
            "balance for {user_id}/{credit_type} would become {}",
            account.balance
        )));
    }

    let mut transaction = LedgerTransaction::record(
        user_id,
        credit_type,
        -amount,
        account.balance,
        source,
        now,
    );
    if let Some(charge_id) = source_id {
        transaction = transaction.with_source_id(charge_id);
    }

    uow.update_account(&account).await?;
    uow.insert_transaction(&transaction).await?;

    debug!(user = %user_id, %credit_type, %amount, balance = %account.balance, source, "credits spent");
    Ok(transaction)
}

/// Applies a signed delta: positive grants, negative spends the absolute
/// value
///
/// Used when reconciling a recomputed `credits_applied` diff without the
/// caller branching. A zero delta is rejected - callers skip no-op diffs.
#[allow(clippy::too_many_arguments)]
pub async fn adjust<U: LedgerUnitOfWork>(
    uow: &mut U,
    config: &LedgerConfig,
    user_id: UserId,
    delta: Blocks,
    credit_type: CreditType,
    source: &str,
    source_id: Option<ChargeId>,
    description: Option<String>,
    now: DateTime<Utc>,
) -> Result<LedgerTransaction, LedgerError> {
    if delta.is_zero() {
        return Err(LedgerError::InvalidAmount("adjust called with zero delta".to_string()));
    }

    if delta.is_positive() {
        add(uow, config, user_id, delta, credit_type, source, source_id, description, None, now)
            .await
    } else {
        deduct(uow, config, user_id, delta.abs(), credit_type, source, source_id, now).await
    }
}

fn require_positive(amount: Blocks, operation: &str) -> Result<(), LedgerError> {
    if amount.is_positive() {
        Ok(())
    } else {
        Err(LedgerError::InvalidAmount(format!("{operation} requires a positive amount, got {amount}")))
    }
}
