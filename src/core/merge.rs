// Field-wise last-writer-wins merge for mirrored records.
//
// Purpose
// - Reconcile local optimistic writes with change notifications that arrive
//   at least once and out of order. Every operation is idempotent, and
//   applies in any order to the same converged result.
//
// Responsibilities
// - Keep one write timestamp per field; a field only moves forward in time.
// - Tombstone deletions so a stale create or update cannot resurrect a
//   removed record.
//
// Boundaries
// - Pure data structure, no input or output.

use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, PartialEq)]
struct FieldSlot {
    written_at: i64,
    value: Value,
}

/// One mirrored record with per-field write timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionedRecord {
    id: String,
    fields: BTreeMap<String, FieldSlot>,
}

impl VersionedRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Merge a full or partial payload written at `written_at`. A field is
    /// overwritten only by a strictly newer write; equal timestamps keep the
    /// larger encoding so replays commute.
    pub fn merge(&mut self, written_at: i64, payload: &Map<String, Value>) {
        for (field, incoming) in payload {
            if field == "id" {
                continue;
            }
            let replace = match self.fields.get(field) {
                Some(slot) if slot.written_at > written_at => false,
                Some(slot) if slot.written_at == written_at => {
                    incoming.to_string() > slot.value.to_string()
                }
                _ => true,
            };
            if replace {
                self.fields.insert(
                    field.clone(),
                    FieldSlot {
                        written_at,
                        value: incoming.clone(),
                    },
                );
            }
        }
    }

    /// Assemble the merged record, id included.
    pub fn value(&self) -> Value {
        let mut object = Map::new();
        object.insert("id".to_string(), Value::String(self.id.clone()));
        for (field, slot) in &self.fields {
            object.insert(field.clone(), slot.value.clone());
        }
        Value::Object(object)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Merged,
    Unknown,
    Stale,
}

/// A mirrored collection: merged records in display order plus tombstones.
#[derive(Debug, Default)]
pub struct MergeSet {
    records: HashMap<String, VersionedRecord>,
    order: Vec<String>,
    tombstones: HashMap<String, i64>,
}

impl MergeSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_tombstoned(&self, id: &str, written_at: i64) -> bool {
        self.tombstones
            .get(id)
            .is_some_and(|deleted_at| *deleted_at >= written_at)
    }

    /// A created notification. An already-known id is the echo of our own
    /// optimistic insert and merges in place; a new id is prepended.
    pub fn apply_created(&mut self, id: &str, occurred_at: i64, payload: &Map<String, Value>) -> Applied {
        self.upsert(id, occurred_at, payload)
    }

    /// An updated notification. Unknown ids are reported back so the caller
    /// can fetch the full record; they are never silently dropped.
    pub fn apply_updated(
        &mut self,
        id: &str,
        occurred_at: i64,
        payload: &Map<String, Value>,
    ) -> Applied {
        if self.is_tombstoned(id, occurred_at) {
            return Applied::Stale;
        }
        match self.records.get_mut(id) {
            Some(record) => {
                record.merge(occurred_at, payload);
                Applied::Merged
            }
            None => Applied::Unknown,
        }
    }

    /// A deleted notification. Unknown ids are a no-op apart from the
    /// tombstone that guards against late out-of-order writes.
    pub fn apply_deleted(&mut self, id: &str, occurred_at: i64) {
        let deleted_at = self.tombstones.entry(id.to_string()).or_insert(occurred_at);
        *deleted_at = (*deleted_at).max(occurred_at);
        if self.records.remove(id).is_some() {
            self.order.retain(|known| known != id);
        }
    }

    /// Insert-or-merge used by local optimistic writes, echoes, and fetched
    /// full records. Resurrects over a tombstone only with a newer write.
    pub fn upsert(&mut self, id: &str, written_at: i64, payload: &Map<String, Value>) -> Applied {
        if self.is_tombstoned(id, written_at) {
            return Applied::Stale;
        }
        self.tombstones.remove(id);
        match self.records.get_mut(id) {
            Some(record) => {
                record.merge(written_at, payload);
                Applied::Merged
            }
            None => {
                let mut record = VersionedRecord::new(id);
                record.merge(written_at, payload);
                self.records.insert(id.to_string(), record);
                self.order.insert(0, id.to_string());
                Applied::Merged
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<Value> {
        self.records.get(id).map(VersionedRecord::value)
    }

    /// Merged records, newest insertion first.
    pub fn values(&self) -> Vec<Value> {
        self.order
            .iter()
            .filter_map(|id| self.records.get(id).map(VersionedRecord::value))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
