//! Events domain integration tests

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::json;

use domain_events::{
    AuditLog, MemoryAuditStore, MemoryNotifier, MemoryOutboxStore, Outbox, OutboxDispatcher,
    OutboxStatus, OutboxStore, WebhookRegistration,
};

fn dispatcher(
    store: Arc<MemoryOutboxStore>,
    notifier: Arc<MemoryNotifier>,
    max_attempts: u32,
) -> OutboxDispatcher {
    OutboxDispatcher::new(
        store,
        notifier,
        vec![
            WebhookRegistration {
                event: "sub_cancel".to_string(),
                url: "https://listener.example/cancel".to_string(),
            },
            WebhookRegistration {
                event: "sub_cancel".to_string(),
                url: "https://other.example/hooks".to_string(),
            },
        ],
        max_attempts,
        Duration::minutes(1),
    )
}

fn at_noon(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, day, 12, 0, 0).unwrap()
}

#[tokio::test]
async fn test_due_entry_is_delivered_to_every_registration() {
    let store = Arc::new(MemoryOutboxStore::new());
    let notifier = Arc::new(MemoryNotifier::new());
    let outbox = Outbox::new(store.clone());
    // enqueue and dispatch both run on the caller's clock
    let now = at_noon(1);
    let entry = outbox
        .enqueue("sub_cancel", json!({"subscription_id": "SUB-1"}), now)
        .await
        .unwrap();
    assert_eq!(entry.next_attempt_at, now);

    let report = dispatcher(store.clone(), notifier.clone(), 3)
        .run_pass(now)
        .await
        .unwrap();

    assert_eq!(report.delivered, 1);
    assert_eq!(notifier.webhooks().await.len(), 2);
    assert_eq!(
        store.entry(entry.id).await.unwrap().status,
        OutboxStatus::Delivered
    );
}

#[tokio::test]
async fn test_failed_delivery_retries_with_backoff() {
    let store = Arc::new(MemoryOutboxStore::new());
    let notifier = Arc::new(MemoryNotifier::new());
    let outbox = Outbox::new(store.clone());
    let now = at_noon(1);
    let entry = outbox.enqueue("sub_cancel", json!({}), now).await.unwrap();
    notifier.fail_next(2);

    let d = dispatcher(store.clone(), notifier.clone(), 3);
    let report = d.run_pass(now).await.unwrap();
    assert_eq!(report.rescheduled, 1);

    let stored = store.entry(entry.id).await.unwrap();
    assert_eq!(stored.status, OutboxStatus::Pending);
    assert_eq!(stored.attempts, 1);
    assert!(stored.next_attempt_at > now);

    // Not due yet, so an immediate second pass does nothing
    let report = d.run_pass(now).await.unwrap();
    assert_eq!(report.delivered + report.rescheduled + report.dead_lettered, 0);

    // Once due again the delivery succeeds
    let later = stored.next_attempt_at + Duration::seconds(1);
    let report = d.run_pass(later).await.unwrap();
    assert_eq!(report.delivered, 1);
}

#[tokio::test]
async fn test_entry_dead_letters_after_budget_exhausted() {
    let store = Arc::new(MemoryOutboxStore::new());
    let notifier = Arc::new(MemoryNotifier::new());
    let outbox = Outbox::new(store.clone());
    let mut now = at_noon(1);
    let entry = outbox.enqueue("sub_cancel", json!({}), now).await.unwrap();
    notifier.fail_next(u32::MAX);

    let d = dispatcher(store.clone(), notifier.clone(), 2);
    d.run_pass(now).await.unwrap();
    now += Duration::hours(1);
    let report = d.run_pass(now).await.unwrap();

    assert_eq!(report.dead_lettered, 1);
    let stored = store.entry(entry.id).await.unwrap();
    assert_eq!(stored.status, OutboxStatus::Dead);
    assert_eq!(stored.attempts, 2);

    // Dead entries are surfaced, not dropped, and never redelivered
    assert_eq!(store.list_dead().await.unwrap().len(), 1);
    now += Duration::hours(1);
    let report = d.run_pass(now).await.unwrap();
    assert_eq!(report.delivered + report.rescheduled + report.dead_lettered, 0);
}

#[tokio::test]
async fn test_audit_records_are_append_only() {
    let store = Arc::new(MemoryAuditStore::new());
    let log = AuditLog::new(store.clone());

    log.record("admin", "initiated_dunning", "invoice INV-1")
        .await
        .unwrap();
    log.record("admin", "approved_payout", "payout PAY-1")
        .await
        .unwrap();

    let records = store.records().await;
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].action, "initiated_dunning");
    assert!(records[0].recorded_at <= records[1].recorded_at);
}
