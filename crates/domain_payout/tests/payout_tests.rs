//! Payout processor integration tests

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use rust_decimal_macros::dec;

use core_kernel::{Currency, Money};
use domain_events::{AuditLog, MemoryAuditStore};
use domain_payout::{
    BatchPayoutRequest, BatchStatus, FraudScreen, MemoryPayoutStore, MockRail, PayoutError,
    PayoutProcessor, PayoutRow, PayoutStatus, PayoutStore, SinglePayoutRequest,
};

fn usdc(amount: rust_decimal::Decimal) -> Money {
    Money::new(amount, Currency::USDC)
}

struct Harness {
    processor: PayoutProcessor,
    store: Arc<MemoryPayoutStore>,
    rail: Arc<MockRail>,
    audit_store: Arc<MemoryAuditStore>,
}

fn harness(balance: rust_decimal::Decimal) -> Harness {
    let store = Arc::new(MemoryPayoutStore::new());
    let rail = Arc::new(MockRail::with_balance(usdc(balance)));
    let audit_store = Arc::new(MemoryAuditStore::new());
    let processor = PayoutProcessor::new(
        store.clone(),
        rail.clone(),
        Arc::new(AuditLog::new(audit_store.clone())),
        FraudScreen::default(),
        usdc(dec!(0.5)),
        2,
        Duration::from_millis(0),
    );
    Harness {
        processor,
        store,
        rail,
        audit_store,
    }
}

fn request(amount: rust_decimal::Decimal) -> SinglePayoutRequest {
    SinglePayoutRequest {
        destination: "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin".to_string(),
        amount: usdc(amount),
        verified: true,
        approved: true,
        scheduled_for: None,
    }
}

#[tokio::test]
async fn test_single_payout_deducts_fee_and_completes() {
    let h = harness(dec!(1000));

    let payout = h
        .processor
        .single_payout("admin", request(dec!(100)), Utc::now())
        .await
        .unwrap();

    assert_eq!(payout.status, PayoutStatus::Completed);
    assert_eq!(payout.net, usdc(dec!(99.5)));
    assert!(payout.tx_ref.is_some());
    assert_eq!(h.rail.transfer_count().await, 1);
}

#[tokio::test]
async fn test_gates_reject_before_any_write() {
    let h = harness(dec!(1000));

    let mut unverified = request(dec!(100));
    unverified.verified = false;
    let err = h
        .processor
        .single_payout("admin", unverified, Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, PayoutError::UnverifiedRecipient(_)));

    let mut unapproved = request(dec!(100));
    unapproved.approved = false;
    let err = h
        .processor
        .single_payout("admin", unapproved, Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, PayoutError::NotApproved(_)));

    let err = h
        .processor
        .single_payout("admin", request(dec!(5000)), Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, PayoutError::InsufficientBalance { .. }));

    // None of the rejected requests left a record
    assert!(h.store.all_payouts().await.is_empty());
    assert_eq!(h.rail.transfer_count().await, 0);
}

#[tokio::test]
async fn test_anomalous_payout_is_flagged_and_persisted() {
    let h = harness(dec!(100000));
    for amount in [dec!(10), dec!(11), dec!(9), dec!(12), dec!(8)] {
        h.processor
            .single_payout("admin", request(amount), Utc::now())
            .await
            .unwrap();
    }

    let err = h
        .processor
        .single_payout("admin", request(dec!(50000)), Utc::now())
        .await
        .unwrap_err();

    let payout_id = match err {
        PayoutError::FraudFlagged { payout_id } => payout_id,
        other => panic!("expected FraudFlagged, got {other}"),
    };

    let all = h.store.all_payouts().await;
    let flagged = all.iter().find(|p| p.id == payout_id).unwrap();
    assert_eq!(flagged.status, PayoutStatus::Flagged);
    // No transfer beyond the five seed payouts
    assert_eq!(h.rail.transfer_count().await, 5);

    let actions: Vec<String> = h
        .audit_store
        .records()
        .await
        .iter()
        .map(|r| r.action.clone())
        .collect();
    assert!(actions.contains(&"payout_flagged".to_string()));
}

#[tokio::test]
async fn test_transient_rail_failure_retries_with_same_key() {
    let h = harness(dec!(1000));
    h.rail.fail_next_transfers(2);

    let payout = h
        .processor
        .single_payout("admin", request(dec!(100)), Utc::now())
        .await
        .unwrap();

    assert_eq!(payout.status, PayoutStatus::Completed);
    // Two timeouts then one success, all under one idempotency key
    assert_eq!(h.rail.transfer_count().await, 1);
}

#[tokio::test]
async fn test_retry_exhaustion_persists_failed_payout() {
    let h = harness(dec!(1000));
    h.rail.fail_next_transfers(10);

    let err = h
        .processor
        .single_payout("admin", request(dec!(100)), Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, PayoutError::RailTransfer(_)));

    let all = h.store.all_payouts().await;
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].status, PayoutStatus::Failed);
}

#[tokio::test]
async fn test_batch_with_unverified_rows_transfers_nothing() {
    let h = harness(dec!(1000));

    let err = h
        .processor
        .batch_payout(
            "admin",
            BatchPayoutRequest {
                rows: vec![
                    PayoutRow {
                        destination: "addr-1".to_string(),
                        amount: usdc(dec!(10)),
                    },
                    PayoutRow {
                        destination: "addr-2".to_string(),
                        amount: usdc(dec!(20)),
                    },
                ],
                verified_all: false,
                approved_all: true,
                scheduled_for: None,
            },
            Utc::now(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, PayoutError::UnverifiedRecipient(_)));
    assert_eq!(h.rail.transfer_count().await, 0);
    assert!(h.store.all_payouts().await.is_empty());
}

#[tokio::test]
async fn test_batch_total_over_balance_rejected_whole() {
    let h = harness(dec!(25));

    let err = h
        .processor
        .batch_payout(
            "admin",
            BatchPayoutRequest {
                rows: vec![
                    PayoutRow {
                        destination: "addr-1".to_string(),
                        amount: usdc(dec!(15)),
                    },
                    PayoutRow {
                        destination: "addr-2".to_string(),
                        amount: usdc(dec!(15)),
                    },
                ],
                verified_all: true,
                approved_all: true,
                scheduled_for: None,
            },
            Utc::now(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, PayoutError::InsufficientBalance { .. }));
    assert_eq!(h.rail.transfer_count().await, 0);
}

#[tokio::test]
async fn test_healthy_batch_completes_every_row() {
    let h = harness(dec!(1000));

    let batch = h
        .processor
        .batch_payout(
            "admin",
            BatchPayoutRequest {
                rows: vec![
                    PayoutRow {
                        destination: "addr-1".to_string(),
                        amount: usdc(dec!(10)),
                    },
                    PayoutRow {
                        destination: "addr-2".to_string(),
                        amount: usdc(dec!(11)),
                    },
                    PayoutRow {
                        destination: "addr-3".to_string(),
                        amount: usdc(dec!(9)),
                    },
                ],
                verified_all: true,
                approved_all: true,
                scheduled_for: None,
            },
            Utc::now(),
        )
        .await
        .unwrap();

    assert_eq!(batch.status, BatchStatus::Completed);
    assert!(batch.failed_payouts.is_empty());
    assert_eq!(h.rail.transfer_count().await, 3);
}

#[tokio::test]
async fn test_future_dated_batch_waits_for_scheduled_pass() {
    let h = harness(dec!(1000));
    let now = Utc::now();

    let batch = h
        .processor
        .batch_payout(
            "admin",
            BatchPayoutRequest {
                rows: vec![
                    PayoutRow {
                        destination: "addr-1".to_string(),
                        amount: usdc(dec!(10)),
                    },
                    PayoutRow {
                        destination: "addr-2".to_string(),
                        amount: usdc(dec!(11)),
                    },
                ],
                verified_all: true,
                approved_all: true,
                scheduled_for: Some(now + ChronoDuration::days(3)),
            },
            now,
        )
        .await
        .unwrap();

    // nothing moves until the schedule comes due
    assert_eq!(batch.status, BatchStatus::Processing);
    assert_eq!(h.rail.transfer_count().await, 0);
    for payout in h.store.list_by_batch(batch.id).await.unwrap() {
        assert_eq!(payout.status, PayoutStatus::Pending);
    }

    let later = now + ChronoDuration::days(3) + ChronoDuration::hours(1);
    let executed = h.processor.run_scheduled("system", later).await.unwrap();
    assert_eq!(executed.len(), 2);
    assert_eq!(h.rail.transfer_count().await, 2);
}

#[tokio::test]
async fn test_scheduled_payout_waits_then_executes() {
    let h = harness(dec!(1000));
    let now = Utc::now();

    let mut scheduled = request(dec!(100));
    scheduled.scheduled_for = Some(now + ChronoDuration::hours(6));
    let payout = h
        .processor
        .single_payout("admin", scheduled, now)
        .await
        .unwrap();
    assert_eq!(payout.status, PayoutStatus::Pending);
    assert_eq!(h.rail.transfer_count().await, 0);

    // Not due yet
    let executed = h.processor.run_scheduled("system", now).await.unwrap();
    assert!(executed.is_empty());

    let later = now + ChronoDuration::hours(7);
    let executed = h.processor.run_scheduled("system", later).await.unwrap();
    assert_eq!(executed.len(), 1);
    assert_eq!(executed[0].status, PayoutStatus::Completed);
    assert_eq!(h.rail.transfer_count().await, 1);

    // Already executed; a re-run does nothing
    let executed = h.processor.run_scheduled("system", later).await.unwrap();
    assert!(executed.is_empty());
}

#[tokio::test]
async fn test_approve_flagged_requeues_for_next_pass() {
    let h = harness(dec!(100000));
    for amount in [dec!(10), dec!(11), dec!(9), dec!(12), dec!(8)] {
        h.processor
            .single_payout("admin", request(amount), Utc::now())
            .await
            .unwrap();
    }
    let err = h
        .processor
        .single_payout("admin", request(dec!(50000)), Utc::now())
        .await
        .unwrap_err();
    let payout_id = match err {
        PayoutError::FraudFlagged { payout_id } => payout_id,
        other => panic!("expected FraudFlagged, got {other}"),
    };

    let now = Utc::now();
    let approved = h
        .processor
        .approve_flagged("admin", payout_id, now)
        .await
        .unwrap();
    assert_eq!(approved.status, PayoutStatus::Pending);

    let executed = h.processor.run_scheduled("system", now).await.unwrap();
    assert_eq!(executed.len(), 1);
    assert_eq!(executed[0].id, payout_id);
    assert_eq!(executed[0].status, PayoutStatus::Completed);
}
