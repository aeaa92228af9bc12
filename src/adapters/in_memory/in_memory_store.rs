// In-memory implementation of the DataStore port.
//
// Purpose
// - Back the engine in tests and local development without a database.
//
// Responsibilities
// - Store records per collection, assign ids on create, and fan change
//   notifications out to filtered subscribers.
// - Emulate backend failures through an offline toggle so error paths are
//   testable.

use crate::core::ports::{
    ChangeEvent, ChangeFilter, ChangeKind, DataStore, PageOut, QuerySpec, StoreError, Subscription,
};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use tokio::sync::mpsc;
use tokio::sync::RwLock;

const SUBSCRIBER_BUFFER: usize = 64;

struct SubscriberEntry {
    filter: ChangeFilter,
    sender: mpsc::Sender<ChangeEvent>,
}

#[derive(Default)]
struct CollectionState {
    rows: HashMap<String, Value>,
    order: Vec<String>,
    subscribers: Vec<SubscriberEntry>,
}

impl CollectionState {
    fn publish(&mut self, matched_record: &Value, event: ChangeEvent) {
        self.subscribers.retain(|subscriber| {
            if !subscriber.filter.matches(matched_record) {
                return true;
            }
            match subscriber.sender.try_send(event.clone()) {
                Ok(()) => true,
                // receiver dropped: the registration is released here
                Err(mpsc::error::TrySendError::Closed(_)) => false,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!("subscriber lagging, dropping change event");
                    true
                }
            }
        });
    }
}

#[derive(Default)]
pub struct InMemoryDataStore {
    collections: RwLock<HashMap<String, CollectionState>>,
    offline: AtomicBool,
}

impl InMemoryDataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline
            .store(offline, std::sync::atomic::Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(StoreError::Backend("data store offline".to_string()));
        }
        Ok(())
    }
}

fn as_object_mut(value: &mut Value) -> Result<&mut Map<String, Value>, StoreError> {
    value
        .as_object_mut()
        .ok_or_else(|| StoreError::Backend("record must be a JSON object".to_string()))
}

fn write_timestamp(record: &Value) -> i64 {
    record
        .get("updated_at")
        .and_then(Value::as_i64)
        .unwrap_or_else(|| chrono::Utc::now().timestamp_millis())
}

fn compare_fields(a: &Value, b: &Value, field: &str) -> Ordering {
    let left = a.get(field);
    let right = b.get(field);
    match (left.and_then(Value::as_i64), right.and_then(Value::as_i64)) {
        (Some(l), Some(r)) => l.cmp(&r),
        _ => {
            let l = left.map(Value::to_string).unwrap_or_default();
            let r = right.map(Value::to_string).unwrap_or_default();
            l.cmp(&r)
        }
    }
}

#[async_trait::async_trait]
impl DataStore for InMemoryDataStore {
    async fn create(&self, collection: &str, mut record: Value) -> Result<Value, StoreError> {
        self.check_online()?;
        let object = as_object_mut(&mut record)?;
        let id = match object.get("id").and_then(Value::as_str) {
            Some(existing) => existing.to_string(),
            None => {
                let assigned = uuid::Uuid::now_v7().to_string();
                object.insert("id".to_string(), Value::String(assigned.clone()));
                assigned
            }
        };

        let mut collections = self.collections.write().await;
        let state = collections.entry(collection.to_string()).or_default();
        state.rows.insert(id.clone(), record.clone());
        state.order.insert(0, id.clone());
        state.publish(
            &record,
            ChangeEvent {
                kind: ChangeKind::Created,
                id,
                occurred_at: write_timestamp(&record),
                payload: Some(record.clone()),
            },
        );
        Ok(record)
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Value, StoreError> {
        self.check_online()?;
        let collections = self.collections.read().await;
        collections
            .get(collection)
            .and_then(|state| state.rows.get(id))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })
    }

    async fn update(&self, collection: &str, id: &str, patch: Value) -> Result<Value, StoreError> {
        self.check_online()?;
        let patch_object = match patch {
            Value::Object(map) => map,
            _ => return Err(StoreError::Backend("patch must be a JSON object".to_string())),
        };

        let mut collections = self.collections.write().await;
        let state = collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })?;
        let row = state.rows.get_mut(id).ok_or_else(|| StoreError::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        })?;
        let object = as_object_mut(row)?;
        for (field, value) in &patch_object {
            if field == "id" {
                continue;
            }
            object.insert(field.clone(), value.clone());
        }
        let updated = row.clone();
        state.publish(
            &updated,
            ChangeEvent {
                kind: ChangeKind::Updated,
                id: id.to_string(),
                occurred_at: write_timestamp(&updated),
                payload: Some(Value::Object(patch_object)),
            },
        );
        Ok(updated)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        self.check_online()?;
        let mut collections = self.collections.write().await;
        let state = collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })?;
        let removed = state.rows.remove(id).ok_or_else(|| StoreError::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        })?;
        state.order.retain(|known| known != id);
        state.publish(
            &removed,
            ChangeEvent {
                kind: ChangeKind::Deleted,
                id: id.to_string(),
                occurred_at: chrono::Utc::now().timestamp_millis(),
                payload: None,
            },
        );
        Ok(())
    }

    async fn query(&self, collection: &str, spec: QuerySpec) -> Result<PageOut, StoreError> {
        self.check_online()?;
        let collections = self.collections.read().await;
        let mut items: Vec<Value> = collections
            .get(collection)
            .map(|state| {
                state
                    .rows
                    .values()
                    .filter(|row| {
                        spec.equals
                            .iter()
                            .all(|(field, value)| row.get(field) == Some(value))
                    })
                    .filter(|row| match &spec.range {
                        Some(range) => {
                            let Some(actual) = row.get(&range.field).and_then(Value::as_i64)
                            else {
                                return false;
                            };
                            range.min.is_none_or(|min| actual >= min)
                                && range.max.is_none_or(|max| actual <= max)
                        }
                        None => true,
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        items.sort_by(|a, b| {
            let ordering = compare_fields(a, b, &spec.sort_field);
            if spec.sort_desc {
                ordering.reverse()
            } else {
                ordering
            }
        });

        let total = items.len() as u64;
        let start = (spec.offset as usize).min(items.len());
        let end = start.saturating_add(spec.limit as usize).min(items.len());
        Ok(PageOut {
            items: items[start..end].to_vec(),
            total,
            offset: spec.offset,
            limit: spec.limit,
        })
    }

    async fn subscribe(
        &self,
        collection: &str,
        filter: ChangeFilter,
    ) -> Result<Subscription, StoreError> {
        self.check_online()?;
        let (sender, receiver) = mpsc::channel(SUBSCRIBER_BUFFER);
        let mut collections = self.collections.write().await;
        let state = collections.entry(collection.to_string()).or_default();
        state.subscribers.push(SubscriberEntry { filter, sender });
        Ok(Subscription::new(receiver))
    }
}

#[cfg(test)]
mod in_memory_store_tests {
    use super::*;
    use rstest::{fixture, rstest};
    use serde_json::json;

    const COLLECTION: &str = "time_entries";

    #[fixture]
    fn store() -> InMemoryDataStore {
        InMemoryDataStore::new()
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_assign_an_id_on_create_and_load_it_back(store: InMemoryDataStore) {
        let created = store
            .create(COLLECTION, json!({ "description": "work", "updated_at": 100 }))
            .await
            .expect("create");
        let id = created["id"].as_str().expect("assigned id").to_string();
        assert!(!id.is_empty());

        let loaded = store.get(COLLECTION, &id).await.expect("get");
        assert_eq!(loaded, created);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_merge_patches_on_update(store: InMemoryDataStore) {
        let created = store
            .create(COLLECTION, json!({ "description": "draft", "duration_minutes": 0, "updated_at": 100 }))
            .await
            .expect("create");
        let id = created["id"].as_str().unwrap();

        let updated = store
            .update(COLLECTION, id, json!({ "duration_minutes": 5, "updated_at": 200 }))
            .await
            .expect("update");
        assert_eq!(updated["description"], "draft");
        assert_eq!(updated["duration_minutes"], 5);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_fail_on_unknown_ids(store: InMemoryDataStore) {
        let result = store.get(COLLECTION, "missing").await;
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
        let result = store.update(COLLECTION, "missing", json!({})).await;
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
        let result = store.delete(COLLECTION, "missing").await;
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_filter_sort_and_paginate_queries(store: InMemoryDataStore) {
        for (actor, started) in [("a", 100), ("a", 300), ("b", 200), ("a", 200)] {
            store
                .create(
                    COLLECTION,
                    json!({ "actor_id": actor, "started_at": started, "updated_at": started }),
                )
                .await
                .expect("create");
        }

        let page = store
            .query(
                COLLECTION,
                QuerySpec {
                    equals: vec![("actor_id".to_string(), json!("a"))],
                    range: None,
                    sort_field: "started_at".to_string(),
                    sort_desc: true,
                    offset: 0,
                    limit: 2,
                },
            )
            .await
            .expect("query");
        assert_eq!(page.total, 3);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0]["started_at"], 300);
        assert_eq!(page.items[1]["started_at"], 200);

        let rest = store
            .query(
                COLLECTION,
                QuerySpec {
                    equals: vec![("actor_id".to_string(), json!("a"))],
                    range: Some(crate::core::ports::RangeFilter {
                        field: "started_at".to_string(),
                        min: Some(150),
                        max: None,
                    }),
                    sort_field: "started_at".to_string(),
                    sort_desc: false,
                    offset: 0,
                    limit: 10,
                },
            )
            .await
            .expect("query");
        assert_eq!(rest.total, 2);
        assert_eq!(rest.items[0]["started_at"], 200);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_fan_out_changes_to_matching_subscribers_only(store: InMemoryDataStore) {
        let mut ours = store
            .subscribe(COLLECTION, ChangeFilter::equals("actor_id", "a"))
            .await
            .expect("subscribe");
        let mut theirs = store
            .subscribe(COLLECTION, ChangeFilter::equals("actor_id", "b"))
            .await
            .expect("subscribe");

        let created = store
            .create(COLLECTION, json!({ "actor_id": "a", "updated_at": 100 }))
            .await
            .expect("create");
        let id = created["id"].as_str().unwrap();
        store
            .update(COLLECTION, id, json!({ "duration_minutes": 1, "updated_at": 200 }))
            .await
            .expect("update");

        let event = ours.next_event().await.expect("created event");
        assert_eq!(event.kind, ChangeKind::Created);
        assert_eq!(event.occurred_at, 100);
        let event = ours.next_event().await.expect("updated event");
        assert_eq!(event.kind, ChangeKind::Updated);
        assert_eq!(event.payload.unwrap()["duration_minutes"], 1);

        theirs.close();
        assert!(theirs.next_event().await.is_none(), "no cross-actor bleed");
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_fail_every_call_while_offline(store: InMemoryDataStore) {
        store.set_offline(true);
        let result = store.create(COLLECTION, json!({})).await;
        match result {
            Err(StoreError::Backend(message)) => assert!(message.contains("offline")),
            other => panic!("expected backend error, got {other:?}"),
        }
        assert!(store.get(COLLECTION, "x").await.is_err());

        store.set_offline(false);
        assert!(store.create(COLLECTION, json!({ "updated_at": 1 })).await.is_ok());
    }
}
