//! Integration tests for the credit ledger service over the in-memory store

use chrono::{Duration, Utc};

use core_kernel::{Blocks, CreditType, LedgerConfig, UserId};
use domain_ledger::{sources, CreditLedger, LedgerError, LedgerStore};
use infra_mem::MemoryStore;

fn ledger() -> CreditLedger<MemoryStore> {
    CreditLedger::new(MemoryStore::new(), LedgerConfig::default())
}

// ============================================================================
// Account creation
// ============================================================================

mod account_tests {
    use super::*;

    #[tokio::test]
    async fn test_first_add_opens_account_with_defaults() {
        let ledger = ledger();
        let user = UserId::new();

        ledger
            .add(user, Blocks::new(10), CreditType::FreeHours, "signup_grant", None, None, None)
            .await
            .unwrap();

        let account = ledger
            .store()
            .find_account(user, CreditType::FreeHours)
            .await
            .unwrap()
            .expect("account should exist after first add");
        assert_eq!(account.balance, Blocks::new(10));
        assert_eq!(account.max_balance, None);
        assert!(!account.rollover_enabled);
    }

    #[tokio::test]
    async fn test_equipment_account_gets_cap_and_rollover() {
        let ledger = ledger();
        let user = UserId::new();

        ledger
            .add(user, Blocks::new(5), CreditType::EquipmentCredits, "signup_grant", None, None, None)
            .await
            .unwrap();

        let account = ledger
            .store()
            .find_account(user, CreditType::EquipmentCredits)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(account.max_balance, Some(Blocks::new(250)));
        assert!(account.rollover_enabled);
    }

    #[tokio::test]
    async fn test_balance_of_missing_account_is_zero() {
        let ledger = ledger();
        let balance = ledger
            .get_balance(UserId::new(), CreditType::FreeHours)
            .await
            .unwrap();
        assert_eq!(balance, Blocks::ZERO);
    }
}

// ============================================================================
// Add / Deduct / Adjust
// ============================================================================

mod movement_tests {
    use super::*;

    #[tokio::test]
    async fn test_add_snapshots_balance_after() {
        let ledger = ledger();
        let user = UserId::new();

        let first = ledger
            .add(user, Blocks::new(10), CreditType::FreeHours, "signup_grant", None, None, None)
            .await
            .unwrap();
        assert_eq!(first.amount, Blocks::new(10));
        assert_eq!(first.balance_after, Blocks::new(10));

        let second = ledger
            .add(
                user,
                Blocks::new(5),
                CreditType::FreeHours,
                sources::MONTHLY_ALLOCATION,
                None,
                Some("august top-up".to_string()),
                None,
            )
            .await
            .unwrap();
        assert_eq!(second.balance_after, Blocks::new(15));
        assert_eq!(second.source, "monthly_allocation");
        assert_eq!(second.description.as_deref(), Some("august top-up"));
    }

    #[tokio::test]
    async fn test_add_rejects_non_positive_amount() {
        let ledger = ledger();
        let user = UserId::new();

        for amount in [Blocks::ZERO, Blocks::new(-3)] {
            let err = ledger
                .add(user, amount, CreditType::FreeHours, "signup_grant", None, None, None)
                .await
                .unwrap_err();
            assert!(matches!(err, LedgerError::InvalidAmount(_)));
        }
    }

    #[tokio::test]
    async fn test_deduct_decrements_and_logs_negative_amount() {
        let ledger = ledger();
        let user = UserId::new();
        ledger
            .add(user, Blocks::new(10), CreditType::FreeHours, "signup_grant", None, None, None)
            .await
            .unwrap();

        let spend = ledger
            .deduct(user, Blocks::new(4), CreditType::FreeHours, sources::CHARGE_USAGE, None)
            .await
            .unwrap();
        assert_eq!(spend.amount, Blocks::new(-4));
        assert_eq!(spend.balance_after, Blocks::new(6));
        assert!(spend.is_spend());

        let balance = ledger.get_balance(user, CreditType::FreeHours).await.unwrap();
        assert_eq!(balance, Blocks::new(6));
    }

    #[tokio::test]
    async fn test_deduct_insufficient_carries_balance_and_request() {
        let ledger = ledger();
        let user = UserId::new();
        ledger
            .add(user, Blocks::new(3), CreditType::FreeHours, "signup_grant", None, None, None)
            .await
            .unwrap();

        let err = ledger
            .deduct(user, Blocks::new(4), CreditType::FreeHours, sources::CHARGE_USAGE, None)
            .await
            .unwrap_err();
        match err {
            LedgerError::InsufficientCredits { credit_type, balance, requested } => {
                assert_eq!(credit_type, CreditType::FreeHours);
                assert_eq!(balance, Blocks::new(3));
                assert_eq!(requested, Blocks::new(4));
            }
            other => panic!("expected InsufficientCredits, got {other:?}"),
        }

        // The failed spend left no trace
        assert_eq!(
            ledger.get_balance(user, CreditType::FreeHours).await.unwrap(),
            Blocks::new(3)
        );
        assert_eq!(ledger.store().transaction_count().await, 1);
    }

    #[tokio::test]
    async fn test_deduct_from_empty_account_fails_with_zero_balance() {
        let ledger = ledger();
        let err = ledger
            .deduct(UserId::new(), Blocks::new(1), CreditType::FreeHours, sources::CHARGE_USAGE, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientCredits { balance, .. } if balance == Blocks::ZERO
        ));
    }

    #[tokio::test]
    async fn test_adjust_dispatches_on_sign() {
        let ledger = ledger();
        let user = UserId::new();
        ledger
            .add(user, Blocks::new(10), CreditType::FreeHours, "signup_grant", None, None, None)
            .await
            .unwrap();

        let spend = ledger
            .adjust(user, Blocks::new(-2), CreditType::FreeHours, sources::CHARGE_UPDATE, None, None)
            .await
            .unwrap();
        assert_eq!(spend.amount, Blocks::new(-2));

        let grant = ledger
            .adjust(user, Blocks::new(3), CreditType::FreeHours, sources::CHARGE_UPDATE, None, None)
            .await
            .unwrap();
        assert_eq!(grant.amount, Blocks::new(3));
        assert_eq!(grant.balance_after, Blocks::new(11));
    }

    #[tokio::test]
    async fn test_adjust_rejects_zero_delta() {
        let ledger = ledger();
        let err = ledger
            .adjust(UserId::new(), Blocks::ZERO, CreditType::FreeHours, sources::CHARGE_UPDATE, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount(_)));
    }
}

// ============================================================================
// Expiry
// ============================================================================

mod expiry_tests {
    use super::*;

    #[tokio::test]
    async fn test_expired_account_reads_zero_without_losing_the_row() {
        let ledger = ledger();
        let user = UserId::new();
        let now = Utc::now();

        ledger
            .add(
                user,
                Blocks::new(10),
                CreditType::FreeHours,
                "signup_grant",
                None,
                None,
                Some(now + Duration::hours(1)),
            )
            .await
            .unwrap();

        // Inside the window the balance is spendable
        let live = ledger
            .get_balance_at(user, CreditType::FreeHours, now)
            .await
            .unwrap();
        assert_eq!(live, Blocks::new(10));

        // Past expiry it reads zero, and spends fail, but the row survives
        let later = now + Duration::hours(2);
        let expired = ledger
            .get_balance_at(user, CreditType::FreeHours, later)
            .await
            .unwrap();
        assert_eq!(expired, Blocks::ZERO);

        let account = ledger
            .store()
            .find_account(user, CreditType::FreeHours)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(account.balance, Blocks::new(10));
    }

    #[tokio::test]
    async fn test_add_overwrites_expiry() {
        let ledger = ledger();
        let user = UserId::new();
        let now = Utc::now();

        ledger
            .add(
                user,
                Blocks::new(10),
                CreditType::FreeHours,
                "signup_grant",
                None,
                None,
                Some(now + Duration::days(1)),
            )
            .await
            .unwrap();
        ledger
            .add(
                user,
                Blocks::new(5),
                CreditType::FreeHours,
                sources::MONTHLY_ALLOCATION,
                None,
                None,
                Some(now + Duration::days(40)),
            )
            .await
            .unwrap();

        let account = ledger
            .store()
            .find_account(user, CreditType::FreeHours)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(account.expires_at, Some(now + Duration::days(40)));
    }
}

// ============================================================================
// Ledger invariant and concurrency
// ============================================================================

mod invariant_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// Replaying all transactions in order reproduces the balance, and
        /// every snapshot matches the running sum at its point in time.
        #[test]
        fn replay_reproduces_balance(ops in proptest::collection::vec((any::<bool>(), 1i64..20), 1..40)) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async {
                let ledger = ledger();
                let user = UserId::new();

                for (is_add, amount) in ops {
                    let amount = Blocks::new(amount);
                    if is_add {
                        ledger
                            .add(user, amount, CreditType::FreeHours, "signup_grant", None, None, None)
                            .await
                            .unwrap();
                    } else {
                        // Shortfalls are fine; they must simply leave no trace
                        let _ = ledger
                            .deduct(user, amount, CreditType::FreeHours, sources::CHARGE_USAGE, None)
                            .await;
                    }
                }

                let balance = ledger.get_balance(user, CreditType::FreeHours).await.unwrap();
                let transactions = ledger
                    .store()
                    .account_transactions(user, CreditType::FreeHours)
                    .await
                    .unwrap();

                let mut running = Blocks::ZERO;
                for transaction in &transactions {
                    running += transaction.amount;
                    assert_eq!(transaction.balance_after, running);
                }
                assert_eq!(running, balance);
                assert!(!balance.is_negative());
            });
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_deducts_never_double_spend() {
        let ledger = ledger();
        let user = UserId::new();
        ledger
            .add(user, Blocks::new(10), CreditType::FreeHours, "signup_grant", None, None, None)
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger
                    .deduct(user, Blocks::new(3), CreditType::FreeHours, sources::CHARGE_USAGE, None)
                    .await
            }));
        }

        let mut successes = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(err) => assert!(err.is_insufficient_credits()),
            }
        }

        // floor(10 / 3) spenders win, the rest fail cleanly
        assert_eq!(successes, 3);
        let balance = ledger.get_balance(user, CreditType::FreeHours).await.unwrap();
        assert_eq!(balance, Blocks::new(1));
    }
}
