// Shared harness for the integration flows: in-memory store, manual clock,
// reconciler, and a session machine with a fast auto-persist interval.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;
use time_tracking::adapters::in_memory::in_memory_store::InMemoryDataStore;
use time_tracking::application::reconcile::Reconciler;
use time_tracking::application::session::{SessionConfig, SessionMachine};
use time_tracking::core::ports::ManualClock;
use time_tracking::core::time_entry::{EntryStatus, TaskCategory, TimeEntry, MS_PER_MINUTE};

// 2023-11-14 22:13:20 UTC
pub const T0: i64 = 1_700_000_000_000;
pub const ACTOR: &str = "actor-1";
pub const RATE: i64 = 75;
pub const AUTOSAVE: Duration = Duration::from_millis(20);

pub struct TestEngine {
    pub store: Arc<InMemoryDataStore>,
    pub clock: Arc<ManualClock>,
    pub reconciler: Reconciler<InMemoryDataStore>,
    pub machine: SessionMachine<InMemoryDataStore, ManualClock>,
}

pub async fn start_engine() -> TestEngine {
    dotenvy::dotenv().ok();
    let store = Arc::new(InMemoryDataStore::new());
    let clock = Arc::new(ManualClock::starting_at(T0));
    let reconciler = Reconciler::spawn(store.clone(), ACTOR, T0)
        .await
        .expect("reconciler");
    let machine = SessionMachine::new(
        store.clone(),
        clock.clone(),
        reconciler.entries(),
        SessionConfig {
            actor_id: ACTOR.to_string(),
            rate_per_minute: RATE,
            autosave_interval: AUTOSAVE,
        },
    )
    .expect("machine");
    TestEngine {
        store,
        clock,
        reconciler,
        machine,
    }
}

/// Poll until the condition holds or a second passes.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// A completed entry owned by `actor`, ready to persist through the store.
pub fn completed_entry(
    id: &str,
    actor: &str,
    scope: &str,
    started_at: i64,
    minutes: i64,
    category: TaskCategory,
) -> TimeEntry {
    TimeEntry {
        id: Some(id.to_string()),
        actor_id: actor.to_string(),
        scope_id: scope.to_string(),
        description: "tracked work".to_string(),
        category,
        started_at,
        ended_at: Some(started_at + minutes * MS_PER_MINUTE),
        duration_minutes: minutes,
        rate_per_minute: RATE,
        amount: minutes * RATE,
        status: EntryStatus::Completed,
        updated_at: started_at + minutes * MS_PER_MINUTE,
    }
}

pub fn to_value<T: serde::Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).expect("serialize")
}
