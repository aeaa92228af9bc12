// Reconciliation layer: in-memory mirrors of the actor's store rows, kept
// consistent with change notifications that may echo our own writes, arrive
// twice, or arrive out of order.
//
// Responsibilities
// - Apply created/updated/deleted notifications through the field-wise merge
//   in core::merge; fetch full records for unknown-id updates.
// - Give the session machine an optimistic write path that shares the same
//   merge, so echoes replace in place instead of duplicating.
// - Own the subscriptions and apply-loop tasks; dropping the reconciler
//   releases both, so a scope change cannot bleed events across scopes.

use crate::application::errors::EngineError;
use crate::core::merge::{Applied, MergeSet};
use crate::core::ports::{
    ChangeEvent, ChangeFilter, ChangeKind, DataStore, QuerySpec, RangeFilter, Subscription,
};
use crate::core::time_entry::{day_window_ms, week_window_ms, TimeEntry};
use crate::core::{payment, time_entry};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

pub struct Mirror<TStore: DataStore + 'static> {
    store: Arc<TStore>,
    collection: &'static str,
    set: RwLock<MergeSet>,
    epoch: AtomicU64,
}

impl<TStore: DataStore + 'static> Mirror<TStore> {
    pub fn new(store: Arc<TStore>, collection: &'static str) -> Self {
        Self {
            store,
            collection,
            set: RwLock::new(MergeSet::new()),
            epoch: AtomicU64::new(0),
        }
    }

    /// Monotonic change counter; consumers cache derived views against it.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    fn bump(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }

    pub async fn apply(&self, event: ChangeEvent) {
        match event.kind {
            ChangeKind::Created => {
                let Some(payload) = as_object(event.payload.as_ref()) else {
                    tracing::warn!(
                        collection = self.collection,
                        id = %event.id,
                        "dropping malformed created event"
                    );
                    return;
                };
                self.set
                    .write()
                    .await
                    .apply_created(&event.id, event.occurred_at, payload);
                self.bump();
            }
            ChangeKind::Updated => {
                let Some(payload) = as_object(event.payload.as_ref()) else {
                    tracing::warn!(
                        collection = self.collection,
                        id = %event.id,
                        "dropping malformed updated event"
                    );
                    return;
                };
                let applied = self
                    .set
                    .write()
                    .await
                    .apply_updated(&event.id, event.occurred_at, payload);
                if applied == Applied::Unknown {
                    // an update outran its create; converge by fetching
                    self.fetch_and_merge(&event.id, event.occurred_at, payload)
                        .await;
                }
                self.bump();
            }
            ChangeKind::Deleted => {
                self.set
                    .write()
                    .await
                    .apply_deleted(&event.id, event.occurred_at);
                self.bump();
            }
        }
    }

    async fn fetch_and_merge(&self, id: &str, occurred_at: i64, patch: &Map<String, Value>) {
        match self.store.get(self.collection, id).await {
            Ok(full) => {
                let Some(full_map) = as_object(Some(&full)) else {
                    tracing::warn!(
                        collection = self.collection,
                        id = %id,
                        "fetched record is not an object"
                    );
                    return;
                };
                let base_written_at = full_map
                    .get("updated_at")
                    .and_then(Value::as_i64)
                    .unwrap_or(occurred_at);
                let mut set = self.set.write().await;
                set.upsert(id, base_written_at, full_map);
                set.apply_updated(id, occurred_at, patch);
            }
            Err(err) => {
                tracing::warn!(
                    collection = self.collection,
                    id = %id,
                    error = %err,
                    "could not fetch record for unknown-id update"
                );
            }
        }
    }

    /// Optimistic local write. The eventual echo merges over this in place.
    pub async fn upsert_local(&self, id: &str, written_at: i64, record: &Value) {
        let Some(payload) = as_object(Some(record)) else {
            tracing::warn!(collection = self.collection, id = %id, "local upsert is not an object");
            return;
        };
        self.set.write().await.upsert(id, written_at, payload);
        self.bump();
    }

    pub async fn remove_local(&self, id: &str, at: i64) {
        self.set.write().await.apply_deleted(id, at);
        self.bump();
    }

    pub async fn get(&self, id: &str) -> Option<Value> {
        self.set.read().await.get(id)
    }

    pub async fn records(&self) -> Vec<Value> {
        self.set.read().await.values()
    }

    pub async fn len(&self) -> usize {
        self.set.read().await.len()
    }

    /// Typed view over the merged records. Rows that do not deserialize yet
    /// (an update still waiting on its full record) are skipped, not errors.
    pub async fn snapshot<T: serde::de::DeserializeOwned>(&self) -> Vec<T> {
        self.set
            .read()
            .await
            .values()
            .into_iter()
            .filter_map(|value| match serde_json::from_value::<T>(value) {
                Ok(typed) => Some(typed),
                Err(err) => {
                    tracing::debug!(
                        collection = self.collection,
                        error = %err,
                        "skipping partially converged record"
                    );
                    None
                }
            })
            .collect()
    }
}

/// Entry rows the dashboard shows for one civil day, with minute sums.
pub async fn entries_between<TStore: DataStore + 'static>(
    mirror: &Mirror<TStore>,
    from_ms: i64,
    to_ms: i64,
) -> Vec<TimeEntry> {
    mirror
        .snapshot::<TimeEntry>()
        .await
        .into_iter()
        .filter(|entry| entry.started_at >= from_ms && entry.started_at < to_ms)
        .collect()
}

pub async fn entries_today<TStore: DataStore + 'static>(
    mirror: &Mirror<TStore>,
    now_ms: i64,
) -> Vec<TimeEntry> {
    let (from_ms, to_ms) = day_window_ms(now_ms);
    entries_between(mirror, from_ms, to_ms).await
}

pub async fn entries_this_week<TStore: DataStore + 'static>(
    mirror: &Mirror<TStore>,
    now_ms: i64,
) -> Vec<TimeEntry> {
    let (from_ms, to_ms) = week_window_ms(now_ms);
    entries_between(mirror, from_ms, to_ms).await
}

/// Owns the mirrors plus the subscriptions and apply loops feeding them.
pub struct Reconciler<TStore: DataStore + 'static> {
    entries: Arc<Mirror<TStore>>,
    payments: Arc<Mirror<TStore>>,
    tasks: Vec<JoinHandle<()>>,
}

impl<TStore: DataStore + 'static> Reconciler<TStore> {
    /// Subscribe first, then hydrate: anything written between the two lands
    /// through both paths and merges to the same record.
    pub async fn spawn(
        store: Arc<TStore>,
        actor_id: &str,
        now_ms: i64,
    ) -> Result<Self, EngineError> {
        if actor_id.trim().is_empty() {
            return Err(EngineError::Auth);
        }
        let entries = Arc::new(Mirror::new(store.clone(), time_entry::COLLECTION));
        let payments = Arc::new(Mirror::new(store.clone(), payment::COLLECTION));

        let entry_sub = store
            .subscribe(
                time_entry::COLLECTION,
                ChangeFilter::equals("actor_id", actor_id),
            )
            .await?;
        let payment_sub = store
            .subscribe(
                payment::COLLECTION,
                ChangeFilter::equals("payee_id", actor_id),
            )
            .await?;

        let tasks = vec![
            spawn_apply_loop(entries.clone(), entry_sub),
            spawn_apply_loop(payments.clone(), payment_sub),
        ];

        let reconciler = Self {
            entries,
            payments,
            tasks,
        };
        reconciler.hydrate(actor_id, now_ms).await?;
        Ok(reconciler)
    }

    async fn hydrate(&self, actor_id: &str, now_ms: i64) -> Result<(), EngineError> {
        let (week_start, _) = week_window_ms(now_ms);
        let entry_page = self
            .entries
            .store
            .query(
                time_entry::COLLECTION,
                QuerySpec {
                    equals: vec![("actor_id".to_string(), Value::String(actor_id.to_string()))],
                    range: Some(RangeFilter {
                        field: "started_at".to_string(),
                        min: Some(week_start),
                        max: None,
                    }),
                    sort_field: "started_at".to_string(),
                    sort_desc: true,
                    offset: 0,
                    limit: 500,
                },
            )
            .await?;
        seed(&self.entries, entry_page.items, now_ms).await;

        let payment_page = self
            .payments
            .store
            .query(
                payment::COLLECTION,
                QuerySpec {
                    equals: vec![("payee_id".to_string(), Value::String(actor_id.to_string()))],
                    ..QuerySpec::default()
                },
            )
            .await?;
        seed(&self.payments, payment_page.items, now_ms).await;
        Ok(())
    }

    pub fn entries(&self) -> Arc<Mirror<TStore>> {
        self.entries.clone()
    }

    pub fn payments(&self) -> Arc<Mirror<TStore>> {
        self.payments.clone()
    }

    /// Release the subscriptions and stop the apply loops.
    pub fn shutdown(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl<TStore: DataStore + 'static> Drop for Reconciler<TStore> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn seed<TStore: DataStore + 'static>(
    mirror: &Mirror<TStore>,
    items: Vec<Value>,
    now_ms: i64,
) {
    for item in items {
        let Some(id) = item.get("id").and_then(Value::as_str).map(str::to_string) else {
            continue;
        };
        let written_at = item
            .get("updated_at")
            .and_then(Value::as_i64)
            .unwrap_or(now_ms);
        mirror.upsert_local(&id, written_at, &item).await;
    }
}

fn spawn_apply_loop<TStore: DataStore + 'static>(
    mirror: Arc<Mirror<TStore>>,
    mut subscription: Subscription,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = subscription.next_event().await {
            mirror.apply(event).await;
        }
        // the sender side closed; dropping the subscription releases the
        // registration with the store
    })
}

fn as_object(value: Option<&Value>) -> Option<&Map<String, Value>> {
    value.and_then(Value::as_object)
}
