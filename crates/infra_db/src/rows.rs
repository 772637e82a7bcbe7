//! Row decoding into domain types
//!
//! Queries are runtime-bound, so each table gets one decoding function
//! that pulls typed columns off the row and parses the stored enum tags.

use sqlx::postgres::PgRow;
use sqlx::Row;
use std::collections::BTreeMap;
use uuid::Uuid;

use core_kernel::{
    AllocationId, Blocks, ChargeId, ChargeableKey, ChargeableKind, CreditType,
    LedgerTransactionId, Money, UserId,
};
use domain_charge::{Charge, ChargeError, ChargeStatus, PaymentMethod};
use domain_ledger::{
    AllocationFrequency, CreditAllocation, LedgerAccount, LedgerError, LedgerTransaction,
};

fn decode_ledger(err: sqlx::Error) -> LedgerError {
    LedgerError::Storage(err.to_string())
}

fn parse_ledger<T: std::str::FromStr>(tag: &str, column: &str) -> Result<T, LedgerError>
where
    T::Err: std::fmt::Display,
{
    tag.parse()
        .map_err(|e: T::Err| LedgerError::Storage(format!("bad {column} tag {tag:?}: {e}")))
}

pub(crate) fn account_from_row(row: &PgRow) -> Result<LedgerAccount, LedgerError> {
    let credit_type: String = row.try_get("credit_type").map_err(decode_ledger)?;
    Ok(LedgerAccount {
        user_id: UserId::from_uuid(row.try_get("user_id").map_err(decode_ledger)?),
        credit_type: parse_ledger(&credit_type, "credit_type")?,
        balance: Blocks::new(row.try_get("balance").map_err(decode_ledger)?),
        max_balance: row
            .try_get::<Option<i64>, _>("max_balance")
            .map_err(decode_ledger)?
            .map(Blocks::new),
        rollover_enabled: row.try_get("rollover_enabled").map_err(decode_ledger)?,
        expires_at: row.try_get("expires_at").map_err(decode_ledger)?,
        created_at: row.try_get("created_at").map_err(decode_ledger)?,
        updated_at: row.try_get("updated_at").map_err(decode_ledger)?,
    })
}

pub(crate) fn transaction_from_row(row: &PgRow) -> Result<LedgerTransaction, LedgerError> {
    let credit_type: String = row.try_get("credit_type").map_err(decode_ledger)?;
    Ok(LedgerTransaction {
        id: LedgerTransactionId::from_uuid(row.try_get("id").map_err(decode_ledger)?),
        user_id: UserId::from_uuid(row.try_get("user_id").map_err(decode_ledger)?),
        credit_type: parse_ledger(&credit_type, "credit_type")?,
        amount: Blocks::new(row.try_get("amount").map_err(decode_ledger)?),
        balance_after: Blocks::new(row.try_get("balance_after").map_err(decode_ledger)?),
        source: row.try_get("source").map_err(decode_ledger)?,
        source_id: row
            .try_get::<Option<Uuid>, _>("source_id")
            .map_err(decode_ledger)?
            .map(ChargeId::from_uuid),
        description: row.try_get("description").map_err(decode_ledger)?,
        created_at: row.try_get("created_at").map_err(decode_ledger)?,
    })
}

pub(crate) fn allocation_from_row(row: &PgRow) -> Result<CreditAllocation, LedgerError> {
    let credit_type: String = row.try_get("credit_type").map_err(decode_ledger)?;
    let frequency: String = row.try_get("frequency").map_err(decode_ledger)?;
    Ok(CreditAllocation {
        id: AllocationId::from_uuid(row.try_get("id").map_err(decode_ledger)?),
        user_id: UserId::from_uuid(row.try_get("user_id").map_err(decode_ledger)?),
        credit_type: parse_ledger(&credit_type, "credit_type")?,
        amount: Blocks::new(row.try_get("amount").map_err(decode_ledger)?),
        frequency: parse_ledger::<AllocationFrequency>(&frequency, "frequency")?,
        next_allocation_at: row.try_get("next_allocation_at").map_err(decode_ledger)?,
        last_period: row.try_get("last_period").map_err(decode_ledger)?,
        active: row.try_get("active").map_err(decode_ledger)?,
        created_at: row.try_get("created_at").map_err(decode_ledger)?,
        updated_at: row.try_get("updated_at").map_err(decode_ledger)?,
    })
}

fn decode_charge(err: sqlx::Error) -> ChargeError {
    ChargeError::Storage(err.to_string())
}

fn parse_charge<T: std::str::FromStr>(tag: &str, column: &str) -> Result<T, ChargeError>
where
    T::Err: std::fmt::Display,
{
    tag.parse()
        .map_err(|e: T::Err| ChargeError::Storage(format!("bad {column} tag {tag:?}: {e}")))
}

pub(crate) fn charge_from_row(row: &PgRow) -> Result<Charge, ChargeError> {
    let kind: String = row.try_get("chargeable_kind").map_err(decode_charge)?;
    let status: String = row.try_get("status").map_err(decode_charge)?;
    let payment_method: Option<String> =
        row.try_get("payment_method").map_err(decode_charge)?;
    let credits_applied: serde_json::Value =
        row.try_get("credits_applied").map_err(decode_charge)?;
    let credits_applied: BTreeMap<CreditType, Blocks> = serde_json::from_value(credits_applied)
        .map_err(|e| ChargeError::Storage(format!("bad credits_applied json: {e}")))?;

    Ok(Charge {
        id: ChargeId::from_uuid(row.try_get("id").map_err(decode_charge)?),
        user_id: UserId::from_uuid(row.try_get("user_id").map_err(decode_charge)?),
        chargeable: ChargeableKey::new(
            parse_charge::<ChargeableKind>(&kind, "chargeable_kind")?,
            row.try_get("chargeable_id").map_err(decode_charge)?,
        ),
        amount: Money::from_minor(row.try_get("amount").map_err(decode_charge)?),
        credits_applied,
        net_amount: Money::from_minor(row.try_get("net_amount").map_err(decode_charge)?),
        credits_deferred: row.try_get("credits_deferred").map_err(decode_charge)?,
        status: parse_charge::<ChargeStatus>(&status, "status")?,
        payment_method: payment_method
            .map(|m| parse_charge::<PaymentMethod>(&m, "payment_method"))
            .transpose()?,
        paid_at: row.try_get("paid_at").map_err(decode_charge)?,
        external_reference: row.try_get("external_reference").map_err(decode_charge)?,
        notes: row.try_get("notes").map_err(decode_charge)?,
        created_at: row.try_get("created_at").map_err(decode_charge)?,
        updated_at: row.try_get("updated_at").map_err(decode_charge)?,
    })
}
