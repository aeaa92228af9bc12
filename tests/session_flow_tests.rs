// End-to-end session flows over the in-memory store: the machine persists
// through the port, the reconciler mirrors the echoes, and the auto-persist
// task ticks on a real timer while the clock is driven by hand.

mod common;

use common::{completed_entry, eventually, start_engine, to_value, ACTOR, RATE, T0};
use std::time::Duration;
use time_tracking::application::errors::EngineError;
use time_tracking::core::ports::DataStore;
use time_tracking::core::time_entry::{self, EntryStatus, TaskCategory, MS_PER_MINUTE};

#[tokio::test]
async fn it_should_complete_a_session_with_wall_clock_duration() {
    let engine = start_engine().await;
    let started = engine
        .machine
        .start("scope-1", "billing rework", TaskCategory::Development)
        .await
        .expect("start");
    let entry_id = started.id.clone().expect("assigned id");
    assert_eq!(started.status, EntryStatus::Active);
    assert_eq!(started.started_at, T0);

    engine.clock.advance_minutes(125);
    let completed = engine.machine.stop().await.expect("stop");

    assert_eq!(completed.status, EntryStatus::Completed);
    assert_eq!(completed.duration_minutes, 125);
    assert_eq!(completed.amount, 125 * RATE);
    assert_eq!(completed.ended_at, Some(T0 + 125 * MS_PER_MINUTE));
    assert!(engine.machine.current().await.is_none());

    let row = engine
        .store
        .get(time_entry::COLLECTION, &entry_id)
        .await
        .expect("row");
    assert_eq!(row["status"], "completed");
    assert_eq!(row["duration_minutes"], 125);
}

#[tokio::test]
async fn it_should_stop_the_previous_session_when_starting_another() {
    let engine = start_engine().await;
    let first = engine
        .machine
        .start("scope-1", "first", TaskCategory::Development)
        .await
        .expect("start first");
    engine.clock.advance_minutes(30);

    let second = engine
        .machine
        .start("scope-2", "second", TaskCategory::Testing)
        .await
        .expect("start second");

    let first_row = engine
        .store
        .get(time_entry::COLLECTION, first.id.as_deref().unwrap())
        .await
        .expect("first row");
    assert_eq!(first_row["status"], "completed");
    assert_eq!(first_row["duration_minutes"], 30);

    let current = engine.machine.current().await.expect("current");
    assert_eq!(current.id, second.id);
    assert_eq!(current.scope_id, "scope-2");
}

#[tokio::test]
async fn it_should_keep_state_unchanged_when_persistence_fails() {
    let engine = start_engine().await;
    engine
        .machine
        .start("scope-1", "work", TaskCategory::Development)
        .await
        .expect("start");

    engine.store.set_offline(true);
    let result = engine.machine.pause().await;
    assert!(matches!(result, Err(EngineError::Store(_))));
    let current = engine.machine.current().await.expect("still tracking");
    assert_eq!(current.status, EntryStatus::Active, "no partial transition");

    let result = engine.machine.stop().await;
    assert!(matches!(result, Err(EngineError::Store(_))));
    assert!(engine.machine.current().await.is_some());

    engine.store.set_offline(false);
    engine.clock.advance_minutes(10);
    let completed = engine.machine.stop().await.expect("stop after recovery");
    assert_eq!(completed.duration_minutes, 10);
}

#[tokio::test]
async fn it_should_reject_transitions_that_do_not_apply() {
    let engine = start_engine().await;
    assert!(matches!(
        engine.machine.pause().await,
        Err(EngineError::Validation(_))
    ));
    assert!(matches!(
        engine.machine.stop().await,
        Err(EngineError::Validation(_))
    ));

    engine
        .machine
        .start("scope-1", "work", TaskCategory::Development)
        .await
        .expect("start");
    assert!(matches!(
        engine.machine.resume().await,
        Err(EngineError::Validation(_))
    ));
}

#[tokio::test]
async fn it_should_auto_persist_progress_only_while_active() {
    let engine = start_engine().await;
    let started = engine
        .machine
        .start("scope-1", "work", TaskCategory::Development)
        .await
        .expect("start");
    let entry_id = started.id.clone().expect("assigned id");

    engine.clock.advance_minutes(5);
    let store = engine.store.clone();
    let id = entry_id.clone();
    assert!(
        eventually(move || {
            let store = store.clone();
            let id = id.clone();
            async move {
                let row = store.get(time_entry::COLLECTION, &id).await.expect("row");
                row["duration_minutes"] == 5
            }
        })
        .await,
        "a tick should write the live duration"
    );

    engine.machine.pause().await.expect("pause");
    engine.clock.advance_minutes(10);
    tokio::time::sleep(Duration::from_millis(80)).await;
    let row = engine
        .store
        .get(time_entry::COLLECTION, &entry_id)
        .await
        .expect("row");
    assert_eq!(row["duration_minutes"], 5, "the timer halts while paused");
    assert_eq!(row["status"], "paused");

    engine.machine.resume().await.expect("resume");
    let store = engine.store.clone();
    let id = entry_id.clone();
    assert!(
        eventually(move || {
            let store = store.clone();
            let id = id.clone();
            async move {
                let row = store.get(time_entry::COLLECTION, &id).await.expect("row");
                row["duration_minutes"] == 15
            }
        })
        .await,
        "ticks resume with the session"
    );
}

#[tokio::test]
async fn it_should_never_let_a_late_tick_overwrite_a_completed_session() {
    let engine = start_engine().await;
    engine
        .machine
        .start("scope-1", "work", TaskCategory::Development)
        .await
        .expect("start");
    engine.clock.advance_minutes(7);
    let completed = engine.machine.stop().await.expect("stop");
    let entry_id = completed.id.clone().expect("id");

    // were a tick still alive it would write 27 minutes here
    engine.clock.advance_minutes(20);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let row = engine
        .store
        .get(time_entry::COLLECTION, &entry_id)
        .await
        .expect("row");
    assert_eq!(row["duration_minutes"], 7);
    assert_eq!(row["status"], "completed");
}

#[tokio::test]
async fn it_should_edit_descriptions_of_live_and_completed_entries() {
    let engine = start_engine().await;
    let started = engine
        .machine
        .start("scope-1", "draft", TaskCategory::Development)
        .await
        .expect("start");
    let live_id = started.id.clone().expect("id");

    let updated = engine
        .machine
        .update_description(&live_id, "reviewed wording")
        .await
        .expect("update live");
    assert_eq!(updated.description, "reviewed wording");
    assert_eq!(
        engine.machine.current().await.expect("current").description,
        "reviewed wording"
    );

    let old = completed_entry("te-old", ACTOR, "scope-1", T0 - 86_400_000, 60, TaskCategory::Testing);
    engine
        .store
        .create(time_entry::COLLECTION, to_value(&old))
        .await
        .expect("seed old entry");
    let updated = engine
        .machine
        .update_description("te-old", "amended")
        .await
        .expect("update completed");
    assert_eq!(updated.description, "amended");

    let foreign = completed_entry("te-foreign", "actor-2", "scope-9", T0, 30, TaskCategory::Other);
    engine
        .store
        .create(time_entry::COLLECTION, to_value(&foreign))
        .await
        .expect("seed foreign entry");
    assert!(matches!(
        engine.machine.update_description("te-foreign", "nope").await,
        Err(EngineError::NotFound(_))
    ));
}

#[tokio::test]
async fn it_should_delete_only_with_confirmation_and_clear_the_slot() {
    let engine = start_engine().await;
    let started = engine
        .machine
        .start("scope-1", "work", TaskCategory::Development)
        .await
        .expect("start");
    let entry_id = started.id.clone().expect("id");

    assert!(matches!(
        engine.machine.delete_record(&entry_id, false).await,
        Err(EngineError::Validation(_))
    ));
    assert!(engine.machine.current().await.is_some());

    engine
        .machine
        .delete_record(&entry_id, true)
        .await
        .expect("confirmed delete");
    assert!(engine.machine.current().await.is_none());
    assert!(matches!(
        engine.store.get(time_entry::COLLECTION, &entry_id).await,
        Err(time_tracking::core::ports::StoreError::NotFound { .. })
    ));
}

#[tokio::test]
async fn it_should_sum_today_and_week_including_the_live_session() {
    let engine = start_engine().await;
    let today = completed_entry("te-today", ACTOR, "scope-1", T0 - 3 * 60 * MS_PER_MINUTE, 60, TaskCategory::Development);
    engine
        .store
        .create(time_entry::COLLECTION, to_value(&today))
        .await
        .expect("seed today");

    let entries = engine.reconciler.entries();
    assert!(
        eventually(move || {
            let entries = entries.clone();
            async move { entries.len().await == 1 }
        })
        .await,
        "seeded entry reaches the mirror"
    );

    engine
        .machine
        .start("scope-1", "live", TaskCategory::Development)
        .await
        .expect("start");
    engine.clock.advance_minutes(30);

    assert_eq!(engine.machine.total_today().await, 90);
    assert_eq!(engine.machine.total_this_week().await, 90);
}
