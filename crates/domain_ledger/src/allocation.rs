//! Recurring credit allocation
//!
//! A periodic job grants members their recurring credit allotments. Two
//! strategies exist, keyed by the account's rollover flag:
//!
//! - non-rollover types (free hours) are *reset*: the balance is
//!   overwritten to the allotment, logged as one transaction carrying the
//!   signed delta from old to new
//! - rollover types (equipment credits) are *topped up*: the grant is
//!   clamped to the remaining headroom below the cap and skipped entirely
//!   when the account is already full
//!
//! A period guard makes reruns within the same period no-ops, so a crashed
//! and restarted job cannot double-allocate.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{info, warn};

use core_kernel::{AllocationId, Blocks, CreditType, LedgerConfig, UserId};

use crate::account::LedgerAccount;
use crate::error::LedgerError;
use crate::ops;
use crate::ports::{LedgerStore, LedgerUnitOfWork};
use crate::transaction::{sources, LedgerTransaction};

/// How often an allocation recurs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationFrequency {
    Monthly,
    Weekly,
    OneTime,
}

impl AllocationFrequency {
    /// Returns the stable storage tag for this frequency
    pub fn as_str(&self) -> &'static str {
        match self {
            AllocationFrequency::Monthly => "monthly",
            AllocationFrequency::Weekly => "weekly",
            AllocationFrequency::OneTime => "one_time",
        }
    }

    /// The idempotency-guard key for the period containing `now`
    ///
    /// One allocation per user/type/period: reruns inside the same period
    /// compare equal and are skipped.
    pub fn period_key(&self, now: DateTime<Utc>) -> String {
        match self {
            AllocationFrequency::Monthly => now.format("%Y-%m").to_string(),
            AllocationFrequency::Weekly => now.format("%G-W%V").to_string(),
            AllocationFrequency::OneTime => "once".to_string(),
        }
    }
}

impl fmt::Display for AllocationFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AllocationFrequency {
    type Err = UnknownFrequency;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "monthly" => Ok(AllocationFrequency::Monthly),
            "weekly" => Ok(AllocationFrequency::Weekly),
            "one_time" => Ok(AllocationFrequency::OneTime),
            other => Err(UnknownFrequency(other.to_string())),
        }
    }
}

/// Error for an unrecognized frequency tag
#[derive(Debug, thiserror::Error)]
#[error("unknown allocation frequency: {0}")]
pub struct UnknownFrequency(pub String);

/// A member's recurring credit allotment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditAllocation {
    pub id: AllocationId,
    pub user_id: UserId,
    pub credit_type: CreditType,
    /// Blocks granted (rollover) or reset to (non-rollover) each period
    pub amount: Blocks,
    pub frequency: AllocationFrequency,
    /// When this allocation next becomes due
    pub next_allocation_at: DateTime<Utc>,
    /// Period key of the last run, the idempotency guard
    pub last_period: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CreditAllocation {
    /// Creates an active allocation first due at `next_allocation_at`
    pub fn new(
        user_id: UserId,
        credit_type: CreditType,
        amount: Blocks,
        frequency: AllocationFrequency,
        next_allocation_at: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: AllocationId::new_v7(),
            user_id,
            credit_type,
            amount,
            frequency,
            next_allocation_at,
            last_period: None,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Records a completed run: stamps the period guard and advances the
    /// next due time per frequency
    pub fn mark_run(&mut self, now: DateTime<Utc>) {
        self.last_period = Some(self.frequency.period_key(now));
        self.updated_at = now;
        match self.frequency {
            AllocationFrequency::Monthly => {
                self.next_allocation_at = start_of_next_month(now);
            }
            AllocationFrequency::Weekly => {
                self.next_allocation_at = now + Duration::days(7);
            }
            AllocationFrequency::OneTime => {
                self.active = false;
            }
        }
    }
}

/// First instant of the month after `now`
fn start_of_next_month(now: DateTime<Utc>) -> DateTime<Utc> {
    let (year, month) = if now.month() == 12 {
        (now.year() + 1, 1)
    } else {
        (now.year(), now.month() + 1)
    };
    let first = NaiveDate::from_ymd_opt(year, month, 1)
        .expect("first of month is always a valid date")
        .and_hms_opt(0, 0, 0)
        .expect("midnight is always a valid time");
    Utc.from_utc_datetime(&first)
}

/// Counters from one scheduler pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocationReport {
    /// Allocations that produced a transaction
    pub granted: usize,
    /// Allocations skipped (same period, at cap, or no balance change)
    pub skipped: usize,
    /// Allocations that failed; their units of work rolled back
    pub failed: usize,
}

enum RunOutcome {
    Granted,
    Skipped,
}

/// Periodic job granting recurring credit allotments
#[derive(Debug, Clone)]
pub struct AllocationScheduler<S> {
    store: S,
    config: LedgerConfig,
}

impl<S: LedgerStore> AllocationScheduler<S> {
    pub fn new(store: S, config: LedgerConfig) -> Self {
        Self { store, config }
    }

    /// Processes every active allocation due at or before `now`, each in
    /// its own unit of work, and reports the counts
    pub async fn run_due(&self, now: DateTime<Utc>) -> Result<AllocationReport, LedgerError> {
        let due = self.store.due_allocations(now).await?;
        let mut report = AllocationReport::default();

        for mut allocation in due {
            match self.run_one(&mut allocation, now).await {
                Ok(RunOutcome::Granted) => report.granted += 1,
                Ok(RunOutcome::Skipped) => report.skipped += 1,
                Err(err) => {
                    warn!(allocation = %allocation.id, user = %allocation.user_id, %err,
                          "allocation run failed, rolled back");
                    report.failed += 1;
                }
            }
        }

        info!(granted = report.granted, skipped = report.skipped, failed = report.failed,
              "allocation pass complete");
        Ok(report)
    }

    async fn run_one(
        &self,
        allocation: &mut CreditAllocation,
        now: DateTime<Utc>,
    ) -> Result<RunOutcome, LedgerError> {
        let period = allocation.frequency.period_key(now);
        if allocation.last_period.as_deref() == Some(period.as_str()) {
            // Job rerun inside the same period
            return Ok(RunOutcome::Skipped);
        }

        let mut uow = self.store.begin().await?;
        let account = ops::lock_or_open_account(
            &mut uow,
            &self.config,
            allocation.user_id,
            allocation.credit_type,
            now,
        )
        .await?;

        let outcome = if account.rollover_enabled {
            self.top_up(&mut uow, &account, allocation, now).await?
        } else {
            self.reset(&mut uow, account, allocation, now).await?
        };

        allocation.mark_run(now);
        uow.update_allocation(allocation).await?;
        uow.commit().await?;
        Ok(outcome)
    }

    /// Rollover strategy: grant up to the cap, skip when already full
    async fn top_up<U: LedgerUnitOfWork>(
        &self,
        uow: &mut U,
        account: &LedgerAccount,
        allocation: &CreditAllocation,
        now: DateTime<Utc>,
    ) -> Result<RunOutcome, LedgerError> {
        let grant = match account.headroom() {
            Some(headroom) => allocation.amount.min(headroom.max(Blocks::ZERO)),
            None => allocation.amount,
        };
        if !grant.is_positive() {
            return Ok(RunOutcome::Skipped);
        }

        let capped = grant < allocation.amount;
        let description = if capped {
            format!("{} allocation (cap reached)", allocation.frequency)
        } else {
            format!("{} allocation", allocation.frequency)
        };
        ops::add(
            uow,
            &self.config,
            allocation.user_id,
            grant,
            allocation.credit_type,
            sources::MONTHLY_ALLOCATION,
            None,
            Some(description),
            None,
            now,
        )
        .await?;
        Ok(RunOutcome::Granted)
    }

    /// Reset strategy: overwrite the balance to the allotment, logging the
    /// signed delta in one transaction
    async fn reset<U: LedgerUnitOfWork>(
        &self,
        uow: &mut U,
        mut account: LedgerAccount,
        allocation: &CreditAllocation,
        now: DateTime<Utc>,
    ) -> Result<RunOutcome, LedgerError> {
        let delta = allocation.amount - account.balance;
        if delta.is_zero() {
            return Ok(RunOutcome::Skipped);
        }

        account.balance = allocation.amount;
        account.updated_at = now;

        let transaction = LedgerTransaction::record(
            allocation.user_id,
            allocation.credit_type,
            delta,
            account.balance,
            sources::MONTHLY_RESET,
            now,
        )
        .with_description(format!("{} reset", allocation.frequency));

        uow.update_account(&account).await?;
        uow.insert_transaction(&transaction).await?;
        Ok(RunOutcome::Granted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 9, 30, 0).unwrap()
    }

    #[test]
    fn test_period_keys() {
        let now = at(2026, 8, 7);
        assert_eq!(AllocationFrequency::Monthly.period_key(now), "2026-08");
        assert_eq!(AllocationFrequency::OneTime.period_key(now), "once");
        // ISO week of 2026-08-07
        assert_eq!(AllocationFrequency::Weekly.period_key(now), "2026-W32");
    }

    #[test]
    fn test_start_of_next_month_rolls_year() {
        assert_eq!(
            start_of_next_month(at(2026, 12, 15)),
            Utc.with_ymd_and_hms(2027, 1, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_mark_run_monthly() {
        let mut allocation = CreditAllocation::new(
            UserId::new(),
            CreditType::FreeHours,
            Blocks::new(10),
            AllocationFrequency::Monthly,
            at(2026, 8, 1),
        );
        allocation.mark_run(at(2026, 8, 7));
        assert_eq!(allocation.last_period.as_deref(), Some("2026-08"));
        assert_eq!(allocation.next_allocation_at, start_of_next_month(at(2026, 8, 7)));
        assert!(allocation.active);
    }

    #[test]
    fn test_mark_run_one_time_deactivates() {
        let mut allocation = CreditAllocation::new(
            UserId::new(),
            CreditType::EquipmentCredits,
            Blocks::new(50),
            AllocationFrequency::OneTime,
            at(2026, 8, 1),
        );
        allocation.mark_run(at(2026, 8, 7));
        assert!(!allocation.active);
    }
}
