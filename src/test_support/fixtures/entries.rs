// Shared test fixture for time entries.
//
// The defaults come from a golden JSON file so serde shape changes surface
// here first; setters override per test.

use crate::core::time_entry::{EntryStatus, TaskCategory, TimeEntry};
use std::fs;

pub struct TimeEntryBuilder {
    inner: TimeEntry,
}

impl Default for TimeEntryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[allow(dead_code)]
impl TimeEntryBuilder {
    pub fn new() -> Self {
        let json_str = fs::read_to_string("./src/test_support/fixtures/json/time_entry.json")
            .expect("time_entry fixture file");
        let inner: TimeEntry = serde_json::from_str(&json_str).expect("time_entry fixture json");
        Self { inner }
    }

    pub fn id(mut self, v: Option<String>) -> Self {
        self.inner.id = v;
        self
    }

    pub fn actor_id(mut self, v: impl Into<String>) -> Self {
        self.inner.actor_id = v.into();
        self
    }

    pub fn scope_id(mut self, v: impl Into<String>) -> Self {
        self.inner.scope_id = v.into();
        self
    }

    pub fn description(mut self, v: impl Into<String>) -> Self {
        self.inner.description = v.into();
        self
    }

    pub fn category(mut self, v: TaskCategory) -> Self {
        self.inner.category = v;
        self
    }

    pub fn started_at(mut self, v: i64) -> Self {
        self.inner.started_at = v;
        self
    }

    pub fn ended_at(mut self, v: Option<i64>) -> Self {
        self.inner.ended_at = v;
        self
    }

    pub fn duration_minutes(mut self, v: i64) -> Self {
        self.inner.duration_minutes = v;
        self
    }

    pub fn rate_per_minute(mut self, v: i64) -> Self {
        self.inner.rate_per_minute = v;
        self
    }

    pub fn amount(mut self, v: i64) -> Self {
        self.inner.amount = v;
        self
    }

    pub fn status(mut self, v: EntryStatus) -> Self {
        self.inner.status = v;
        self
    }

    pub fn updated_at(mut self, v: i64) -> Self {
        self.inner.updated_at = v;
        self
    }

    pub fn build(self) -> TimeEntry {
        self.inner
    }
}

#[cfg(test)]
mod time_entry_builder_tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn it_should_parse_the_golden_fixture() {
        let entry = TimeEntryBuilder::new().build();
        assert_eq!(entry.id.as_deref(), Some("te-fixed-0001"));
        assert_eq!(entry.actor_id, "actor-fixed-0001");
        assert_eq!(entry.category, TaskCategory::Development);
        assert_eq!(entry.status, EntryStatus::Completed);
        assert_eq!(entry.duration_minutes, 60);
        assert_eq!(entry.amount, 4_500);
    }

    #[rstest]
    fn it_should_override_fields_through_setters() {
        let entry = TimeEntryBuilder::new()
            .id(None)
            .scope_id("scope-2")
            .status(EntryStatus::Active)
            .ended_at(None)
            .duration_minutes(0)
            .build();
        assert_eq!(entry.id, None);
        assert_eq!(entry.scope_id, "scope-2");
        assert_eq!(entry.status, EntryStatus::Active);
        assert_eq!(entry.ended_at, None);
    }
}
