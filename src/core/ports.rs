// Ports define what the core needs from the outside world, without implementing it.
//
// Purpose
// - Describe the data store and clock capabilities as traits (DataStore, Clock).
//
// Boundaries
// - No concrete input or output here. Adapters implement these traits in the adapters layer.
//
// Testing guidance
// - Use the in-memory implementations for tests and local development.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    #[error("backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

/// One push notification from the data store.
///
/// The payload carries the full record for created, a partial patch for
/// updated, and nothing for deleted. `occurred_at` is the store's write
/// timestamp and drives last-writer-wins merging downstream.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub id: String,
    pub occurred_at: i64,
    pub payload: Option<Value>,
}

/// Equality predicate scoping a subscription to one actor's rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeFilter {
    pub field: String,
    pub value: String,
}

impl ChangeFilter {
    pub fn equals(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn matches(&self, record: &Value) -> bool {
        record
            .get(&self.field)
            .and_then(Value::as_str)
            .is_some_and(|value| value == self.value)
    }
}

/// Owned handle on a change-notification stream.
///
/// Dropping the handle closes the channel, which releases the registration
/// with the store. Never stash one in a global: the owner that subscribed
/// must hold and release it.
#[derive(Debug)]
pub struct Subscription {
    receiver: mpsc::Receiver<ChangeEvent>,
}

impl Subscription {
    pub fn new(receiver: mpsc::Receiver<ChangeEvent>) -> Self {
        Self { receiver }
    }

    pub async fn next_event(&mut self) -> Option<ChangeEvent> {
        self.receiver.recv().await
    }

    pub fn close(&mut self) {
        self.receiver.close();
    }
}

/// Range filter over one numeric record field, bounds inclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeFilter {
    pub field: String,
    pub min: Option<i64>,
    pub max: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuerySpec {
    pub equals: Vec<(String, Value)>,
    pub range: Option<RangeFilter>,
    pub sort_field: String,
    pub sort_desc: bool,
    pub offset: u64,
    pub limit: u64,
}

impl Default for QuerySpec {
    fn default() -> Self {
        Self {
            equals: Vec::new(),
            range: None,
            sort_field: "updated_at".to_string(),
            sort_desc: true,
            offset: 0,
            limit: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageOut {
    pub items: Vec<Value>,
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
}

#[async_trait]
pub trait DataStore: Send + Sync {
    async fn create(&self, collection: &str, record: Value) -> Result<Value, StoreError>;
    async fn get(&self, collection: &str, id: &str) -> Result<Value, StoreError>;
    async fn update(&self, collection: &str, id: &str, patch: Value) -> Result<Value, StoreError>;
    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError>;
    async fn query(&self, collection: &str, spec: QuerySpec) -> Result<PageOut, StoreError>;
    async fn subscribe(
        &self,
        collection: &str,
        filter: ChangeFilter,
    ) -> Result<Subscription, StoreError>;
}

pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Hand-driven clock so tests control the wall clock explicitly.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: std::sync::atomic::AtomicI64,
}

impl ManualClock {
    pub fn starting_at(now_ms: i64) -> Self {
        Self {
            now_ms: std::sync::atomic::AtomicI64::new(now_ms),
        }
    }

    pub fn set(&self, now_ms: i64) {
        self.now_ms
            .store(now_ms, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn advance_ms(&self, delta_ms: i64) {
        self.now_ms
            .fetch_add(delta_ms, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn advance_minutes(&self, minutes: i64) {
        self.advance_ms(minutes * 60_000);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now_ms.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
mod ports_tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn it_should_match_records_on_the_filter_field() {
        let filter = ChangeFilter::equals("actor_id", "actor-1");
        assert!(filter.matches(&serde_json::json!({ "actor_id": "actor-1" })));
        assert!(!filter.matches(&serde_json::json!({ "actor_id": "actor-2" })));
        assert!(!filter.matches(&serde_json::json!({ "scope_id": "actor-1" })));
    }

    #[rstest]
    fn it_should_advance_the_manual_clock() {
        let clock = ManualClock::starting_at(1_700_000_000_000);
        clock.advance_minutes(125);
        assert_eq!(clock.now_ms(), 1_700_000_000_000 + 125 * 60_000);
    }
}
