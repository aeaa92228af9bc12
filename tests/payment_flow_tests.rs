// Payment flows: requesting a payment over completed entries and walking
// the status machine, with the store enforcing nothing; the service does.

mod common;

use common::{completed_entry, start_engine, to_value, ACTOR, RATE, T0};
use std::sync::Arc;
use time_tracking::application::errors::EngineError;
use time_tracking::application::payments::PaymentService;
use time_tracking::core::billing::DEFAULT_TAX_RATE;
use time_tracking::core::payment::PaymentStatus;
use time_tracking::core::ports::{DataStore, ManualClock};
use time_tracking::core::time_entry::{self, TaskCategory, MS_PER_MINUTE};

async fn service_for(
    engine: &common::TestEngine,
) -> PaymentService<time_tracking::adapters::in_memory::in_memory_store::InMemoryDataStore, ManualClock>
{
    PaymentService::new(
        engine.store.clone(),
        Arc::new(ManualClock::starting_at(T0)),
        ACTOR,
        DEFAULT_TAX_RATE,
    )
    .expect("payment service")
}

async fn seed_completed(engine: &common::TestEngine, id: &str, minutes: i64, category: TaskCategory) {
    let entry = completed_entry(id, ACTOR, "scope-1", T0 - minutes * MS_PER_MINUTE, minutes, category);
    engine
        .store
        .create(time_entry::COLLECTION, to_value(&entry))
        .await
        .expect("seed entry");
}

#[tokio::test]
async fn it_should_request_a_payment_over_completed_entries() {
    let engine = start_engine().await;
    let service = service_for(&engine).await;
    seed_completed(&engine, "te-dev", 60, TaskCategory::Development).await;
    seed_completed(&engine, "te-test", 30, TaskCategory::Testing).await;

    let breakdown = service
        .calculate(&["te-dev".to_string(), "te-test".to_string()])
        .await
        .expect("calculate");
    assert_eq!(breakdown.total_minutes, 90);
    assert_eq!(breakdown.subtotal, 90 * RATE);
    assert_eq!(breakdown.tax, 1_350);
    assert_eq!(breakdown.total, 8_100);

    let record = service
        .request_payment(
            "scope-1",
            "client-1",
            T0 - 7 * 86_400_000,
            T0,
            &["te-dev".to_string(), "te-test".to_string()],
        )
        .await
        .expect("request payment");
    assert_eq!(record.status, PaymentStatus::Pending);
    assert_eq!(record.amount, 6_750);
    assert_eq!(record.total_minutes, 90);
    assert_eq!(record.entry_ids.len(), 2);
    assert!(record.id.is_some());
}

#[tokio::test]
async fn it_should_not_let_an_entry_fund_two_live_payments() {
    let engine = start_engine().await;
    let service = service_for(&engine).await;
    seed_completed(&engine, "te-1", 60, TaskCategory::Development).await;

    service
        .request_payment("scope-1", "client-1", T0 - 86_400_000, T0, &["te-1".to_string()])
        .await
        .expect("first request");
    let second = service
        .request_payment("scope-1", "client-1", T0 - 86_400_000, T0, &["te-1".to_string()])
        .await;
    assert!(matches!(second, Err(EngineError::Conflict(_))));
}

#[tokio::test]
async fn it_should_free_entries_when_a_payment_is_cancelled() {
    let engine = start_engine().await;
    let service = service_for(&engine).await;
    seed_completed(&engine, "te-1", 60, TaskCategory::Development).await;

    let first = service
        .request_payment("scope-1", "client-1", T0 - 86_400_000, T0, &["te-1".to_string()])
        .await
        .expect("first request");
    service
        .cancel(first.id.as_deref().expect("id"))
        .await
        .expect("cancel");

    service
        .request_payment("scope-1", "client-1", T0 - 86_400_000, T0, &["te-1".to_string()])
        .await
        .expect("entry is claimable again");
}

#[tokio::test]
async fn it_should_reject_incomplete_or_foreign_entries() {
    let engine = start_engine().await;
    let service = service_for(&engine).await;

    engine
        .machine
        .start("scope-1", "live", TaskCategory::Development)
        .await
        .expect("start");
    let live_id = engine
        .machine
        .current()
        .await
        .and_then(|entry| entry.id)
        .expect("live id");
    let result = service
        .request_payment("scope-1", "client-1", T0 - 86_400_000, T0, &[live_id])
        .await;
    assert!(matches!(result, Err(EngineError::Validation(_))));

    let foreign = completed_entry("te-foreign", "actor-2", "scope-9", T0, 30, TaskCategory::Other);
    engine
        .store
        .create(time_entry::COLLECTION, to_value(&foreign))
        .await
        .expect("seed foreign");
    let result = service
        .request_payment("scope-1", "client-1", T0 - 86_400_000, T0, &["te-foreign".to_string()])
        .await;
    assert!(matches!(result, Err(EngineError::NotFound(_))));

    let result = service
        .request_payment("scope-1", "client-1", T0, T0 - 1, &[])
        .await;
    assert!(matches!(result, Err(EngineError::Validation(_))));
}

#[tokio::test]
async fn it_should_walk_the_status_machine_and_reject_illegal_jumps() {
    let engine = start_engine().await;
    let service = service_for(&engine).await;
    seed_completed(&engine, "te-1", 60, TaskCategory::Development).await;

    let record = service
        .request_payment("scope-1", "client-1", T0 - 86_400_000, T0, &["te-1".to_string()])
        .await
        .expect("request");
    let id = record.id.as_deref().expect("id").to_string();

    let validated = service.mark_validated(&id).await.expect("validate");
    assert_eq!(validated.status, PaymentStatus::Validated);

    let processing = service
        .record_processor_update(&id, PaymentStatus::Processing, T0 + 1_000)
        .await
        .expect("processing");
    assert_eq!(processing.status, PaymentStatus::Processing);

    let paid = service
        .record_processor_update(&id, PaymentStatus::Paid, T0 + 2_000)
        .await
        .expect("paid");
    assert_eq!(paid.status, PaymentStatus::Paid);
    assert_eq!(paid.status_changed_at, T0 + 2_000);

    // a paid record can neither go back to pending-side statuses nor cancel
    assert!(matches!(
        service.mark_validated(&id).await,
        Err(EngineError::Conflict(_))
    ));
    assert!(matches!(
        service.cancel(&id).await,
        Err(EngineError::Conflict(_))
    ));

    // but it can be disputed, with a reason
    assert!(matches!(
        service.dispute(&id, "   ").await,
        Err(EngineError::Validation(_))
    ));
    let disputed = service
        .dispute(&id, "duplicate billing")
        .await
        .expect("dispute");
    assert_eq!(disputed.status, PaymentStatus::Disputed);
    assert_eq!(disputed.dispute_reason.as_deref(), Some("duplicate billing"));
}

#[tokio::test]
async fn it_should_only_accept_processor_statuses_from_the_processor_path() {
    let engine = start_engine().await;
    let service = service_for(&engine).await;
    seed_completed(&engine, "te-1", 60, TaskCategory::Development).await;
    let record = service
        .request_payment("scope-1", "client-1", T0 - 86_400_000, T0, &["te-1".to_string()])
        .await
        .expect("request");
    let id = record.id.as_deref().expect("id").to_string();

    let result = service
        .record_processor_update(&id, PaymentStatus::Pending, T0 + 1_000)
        .await;
    assert!(matches!(result, Err(EngineError::Validation(_))));

    let result = service
        .record_processor_update(&id, PaymentStatus::Paid, T0 + 1_000)
        .await;
    // pending -> paid skips processing and must be rejected as a conflict
    assert!(matches!(result, Err(EngineError::Conflict(_))));
}
