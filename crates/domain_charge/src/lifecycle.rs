//! The chargeable billing lifecycle
//!
//! Four transitions keep a chargeable's charge row and the credit ledger
//! in lock-step. Each one computes pricing first (a pricing failure aborts
//! before any write), then performs every charge and ledger write in one
//! unit of work, and only after commit dispatches notifications -
//! best-effort, never rolled back into the financial operation.

use chrono::Utc;
use tracing::{instrument, warn};

use core_kernel::{ChargeableKey, LedgerConfig};

use domain_ledger::{ops, sources, LedgerUnitOfWork};

use crate::charge::{Charge, ChargeStatus, PaymentMethod};
use crate::chargeable::Chargeable;
use crate::error::ChargeError;
use crate::notify::NotificationDispatcher;
use crate::ports::{BillingStore, BillingUnitOfWork};
use crate::pricing::{credit_diff, PricingCalculator};

/// Orchestrates charge creation, update, confirmation and cancellation
#[derive(Debug, Clone)]
pub struct ChargeableLifecycle<S, P, N> {
    store: S,
    config: LedgerConfig,
    pricing: P,
    notifier: N,
}

impl<S, P, N> ChargeableLifecycle<S, P, N>
where
    S: BillingStore,
    N: NotificationDispatcher,
{
    pub fn new(store: S, config: LedgerConfig, pricing: P, notifier: N) -> Self {
        Self { store, config, pricing, notifier }
    }

    /// Bills a newly created chargeable
    ///
    /// Creates the charge row (immediately `Paid` via credits when the net
    /// amount is zero), quietly updates the entity's derived fields, and -
    /// unless `defer_credits` - spends each applied credit entry. A credit
    /// shortfall aborts the whole creation.
    #[instrument(skip(self, chargeable), fields(chargeable = %chargeable.charge_key()))]
    pub async fn on_created<C>(
        &self,
        chargeable: &mut C,
        defer_credits: bool,
    ) -> Result<Charge, ChargeError>
    where
        C: Chargeable,
        P: PricingCalculator<C>,
    {
        let user_id = chargeable.billable_user();
        let pricing = self.pricing.calculate(chargeable, user_id).await?;
        let now = Utc::now();

        let mut uow = self.store.begin().await?;

        let mut charge = Charge::new(user_id, chargeable.charge_key(), &pricing, now);
        charge.credits_deferred = defer_credits;
        if pricing.fully_covered() {
            charge.mark_paid(PaymentMethod::Credits, now)?;
        }
        uow.insert_charge(&charge).await?;

        chargeable.apply_derived_fields(&pricing);

        if !defer_credits {
            self.spend_applied_credits(&mut uow, &charge, now).await?;
        }

        uow.commit().await?;

        if let Err(err) = self.notifier.charge_created(&charge).await {
            warn!(charge = %charge.id, %err, "charge-created notification failed");
        }
        Ok(charge)
    }

    /// Spends credits that were deferred at creation
    ///
    /// Idempotent: a no-op when no charge exists or when usage
    /// transactions already reference the charge, so a double confirmation
    /// deducts exactly once.
    #[instrument(skip(self, chargeable), fields(chargeable = %chargeable.charge_key()))]
    pub async fn on_confirmed<C>(&self, chargeable: &C) -> Result<(), ChargeError>
    where
        C: Chargeable,
    {
        let now = Utc::now();
        let mut uow = self.store.begin().await?;

        let Some(mut charge) = uow.find_charge(chargeable.charge_key()).await? else {
            return Ok(());
        };
        let usage = uow
            .transactions_for_charge(sources::CHARGE_USAGE, charge.id)
            .await?;
        if !usage.is_empty() {
            return Ok(());
        }

        self.spend_applied_credits(&mut uow, &charge, now).await?;

        charge.credits_deferred = false;
        charge.updated_at = now;
        uow.update_charge(&charge).await?;
        uow.commit().await?;
        Ok(())
    }

    /// Re-bills a chargeable after its billable quantity changed
    ///
    /// Delegates to [`on_created`](Self::on_created) when no charge exists
    /// yet. Otherwise reconciles the ledger with the per-type difference
    /// between the old and new credit splits, updates the charge, and
    /// corrects its status in both directions (newly covered by credits,
    /// or payment required again).
    #[instrument(skip(self, chargeable), fields(chargeable = %chargeable.charge_key()))]
    pub async fn on_updated<C>(&self, chargeable: &mut C) -> Result<Charge, ChargeError>
    where
        C: Chargeable,
        P: PricingCalculator<C>,
    {
        let user_id = chargeable.billable_user();
        let pricing = self.pricing.calculate(chargeable, user_id).await?;
        let now = Utc::now();

        let mut uow = self.store.begin().await?;

        let Some(mut charge) = uow.find_charge(chargeable.charge_key()).await? else {
            // Late-arriving billable entity: bill it from scratch
            drop(uow);
            return self.on_created(chargeable, false).await;
        };

        if charge.credits_deferred {
            // Nothing was spent yet; confirmation will use the new split
            charge.apply_pricing(&pricing, now);
        } else {
            let diff = credit_diff(&charge.credits_applied, &pricing.credits_applied);
            for (credit_type, delta) in diff {
                ops::adjust(
                    &mut uow,
                    &self.config,
                    user_id,
                    delta,
                    credit_type,
                    sources::CHARGE_UPDATE,
                    Some(charge.id),
                    None,
                    now,
                )
                .await?;
            }
            charge.apply_pricing(&pricing, now);
        }

        if charge.net_amount.is_zero() && charge.status == ChargeStatus::Pending {
            charge.mark_paid(PaymentMethod::Credits, now)?;
        } else if charge.net_amount.is_positive() && charge.paid_with_credits() {
            charge.reopen_pending(now)?;
        }

        uow.update_charge(&charge).await?;
        chargeable.apply_derived_fields(&pricing);
        uow.commit().await?;

        if let Err(err) = self.notifier.charge_updated(&charge).await {
            warn!(charge = %charge.id, %err, "charge-updated notification failed");
        }
        Ok(charge)
    }

    /// Settles the books for a cancelled chargeable
    ///
    /// No-op without a charge row or when the charge is already closed.
    /// When credits were actually spent for `original_state` (states that
    /// defer credits never removed balance), every recorded usage
    /// deduction is re-granted with source `charge_cancellation`.
    #[instrument(skip(self, chargeable), fields(chargeable = %chargeable.charge_key()))]
    pub async fn on_cancelled<C>(
        &self,
        chargeable: &C,
        original_state: &str,
    ) -> Result<(), ChargeError>
    where
        C: Chargeable,
    {
        let now = Utc::now();
        let mut uow = self.store.begin().await?;

        let Some(mut charge) = uow.find_charge(chargeable.charge_key()).await? else {
            return Ok(());
        };
        if matches!(charge.status, ChargeStatus::Refunded | ChargeStatus::Cancelled) {
            return Ok(());
        }

        let mut refunded = false;
        let refund_applies = !chargeable.state_defers_credits(original_state);
        if refund_applies && !charge.credits_applied.is_empty() {
            let usage = uow
                .transactions_for_charge(sources::CHARGE_USAGE, charge.id)
                .await?;
            for spend in usage.iter().filter(|t| t.is_spend()) {
                ops::add(
                    &mut uow,
                    &self.config,
                    spend.user_id,
                    spend.amount.abs(),
                    spend.credit_type,
                    sources::CHARGE_CANCELLATION,
                    Some(charge.id),
                    None,
                    None,
                    now,
                )
                .await?;
                refunded = true;
            }
        }

        match charge.status {
            ChargeStatus::Pending if !refunded => charge.mark_cancelled(now)?,
            _ => charge.mark_refunded(now)?,
        }

        uow.update_charge(&charge).await?;
        uow.commit().await?;

        if let Err(err) = self.notifier.charge_cancelled(&charge).await {
            warn!(charge = %charge.id, %err, "charge-cancelled notification failed");
        }
        Ok(())
    }

    /// Reads the charge for a chargeable, for display paths
    pub async fn charge_for(&self, key: ChargeableKey) -> Result<Charge, ChargeError> {
        self.store
            .find_charge(key)
            .await?
            .ok_or(ChargeError::ChargeNotFound(key))
    }

    /// Deducts every positive entry of the charge's credit split, tagged
    /// as charge usage
    async fn spend_applied_credits(
        &self,
        uow: &mut S::Uow,
        charge: &Charge,
        now: chrono::DateTime<Utc>,
    ) -> Result<(), ChargeError> {
        for (credit_type, blocks) in &charge.credits_applied {
            if !blocks.is_positive() {
                continue;
            }
            ops::deduct(
                uow,
                &self.config,
                charge.user_id,
                *blocks,
                *credit_type,
                sources::CHARGE_USAGE,
                Some(charge.id),
                now,
            )
            .await?;
        }
        Ok(())
    }
}
