// Query façade: paginated, filtered retrieval of the actor's records from
// the data store. Thin by design; the aggregator and the dashboard lists
// read through it on cold start, the mirrors take over once hydrated.

use crate::application::errors::EngineError;
use crate::core::payment::{self, PaymentRecord, PaymentStatus};
use crate::core::ports::{DataStore, QuerySpec, RangeFilter};
use crate::core::time_entry::{self, EntryStatus, TimeEntry};
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub offset: u64,
    pub limit: u64,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageOf<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntryFilter {
    pub scope_id: Option<String>,
    pub status: Option<EntryStatus>,
    pub started_after: Option<i64>,
    pub started_before: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaymentFilter {
    pub scope_id: Option<String>,
    pub status: Option<PaymentStatus>,
}

pub struct RecordQueries<TStore: DataStore + 'static> {
    store: Arc<TStore>,
    actor_id: String,
}

impl<TStore: DataStore + 'static> RecordQueries<TStore> {
    pub fn new(store: Arc<TStore>, actor_id: impl Into<String>) -> Result<Self, EngineError> {
        let actor_id = actor_id.into();
        if actor_id.trim().is_empty() {
            return Err(EngineError::Auth);
        }
        Ok(Self { store, actor_id })
    }

    pub async fn entries(
        &self,
        filter: EntryFilter,
        page: PageRequest,
    ) -> Result<PageOf<TimeEntry>, EngineError> {
        let mut equals = vec![(
            "actor_id".to_string(),
            Value::String(self.actor_id.clone()),
        )];
        if let Some(scope_id) = filter.scope_id {
            equals.push(("scope_id".to_string(), Value::String(scope_id)));
        }
        if let Some(status) = filter.status {
            equals.push(("status".to_string(), crate::application::errors::encode(&status)?));
        }
        let range = (filter.started_after.is_some() || filter.started_before.is_some()).then(|| {
            RangeFilter {
                field: "started_at".to_string(),
                min: filter.started_after,
                max: filter.started_before,
            }
        });

        let out = self
            .store
            .query(
                time_entry::COLLECTION,
                QuerySpec {
                    equals,
                    range,
                    sort_field: "started_at".to_string(),
                    sort_desc: true,
                    offset: page.offset,
                    limit: page.limit,
                },
            )
            .await?;
        Ok(decode_page(out))
    }

    pub async fn payments(
        &self,
        filter: PaymentFilter,
        page: PageRequest,
    ) -> Result<PageOf<PaymentRecord>, EngineError> {
        let mut equals = vec![(
            "payee_id".to_string(),
            Value::String(self.actor_id.clone()),
        )];
        if let Some(scope_id) = filter.scope_id {
            equals.push(("scope_id".to_string(), Value::String(scope_id)));
        }
        if let Some(status) = filter.status {
            equals.push(("status".to_string(), crate::application::errors::encode(&status)?));
        }

        let out = self
            .store
            .query(
                payment::COLLECTION,
                QuerySpec {
                    equals,
                    range: None,
                    sort_field: "period_end".to_string(),
                    sort_desc: true,
                    offset: page.offset,
                    limit: page.limit,
                },
            )
            .await?;
        Ok(decode_page(out))
    }
}

/// Rows that fail to deserialize are skipped with a warning; a corrupt row
/// must not take the whole listing down.
fn decode_page<T: serde::de::DeserializeOwned>(out: crate::core::ports::PageOut) -> PageOf<T> {
    let items = out
        .items
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<T>(value) {
            Ok(item) => Some(item),
            Err(err) => {
                tracing::warn!(error = %err, "skipping malformed store row");
                None
            }
        })
        .collect();
    PageOf {
        items,
        total: out.total,
        offset: out.offset,
        limit: out.limit,
    }
}
