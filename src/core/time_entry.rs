// Domain record for one unit of tracked work.
//
// Purpose
// - Represent a time entry through its whole lifecycle: active, paused,
//   completed, cancelled.
//
// Notes
// - All i64 time values are epoch milliseconds; durations are whole minutes.
// - Money is in minor currency units; the rate is minor units per minute.
// - The id is absent until the data store assigns one on first persist.

use serde::{Deserialize, Serialize};

pub const COLLECTION: &str = "time_entries";

pub const MS_PER_MINUTE: i64 = 60_000;
pub const MS_PER_DAY: i64 = 86_400_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskCategory {
    Development,
    Design,
    Management,
    Testing,
    Documentation,
    Meeting,
    Research,
    Support,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Active,
    Paused,
    Completed,
    Cancelled,
}

impl EntryStatus {
    /// Active and paused entries hold the single tracking slot for an actor.
    pub fn is_live(self) -> bool {
        matches!(self, EntryStatus::Active | EntryStatus::Paused)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub actor_id: String,
    pub scope_id: String,
    pub description: String,
    pub category: TaskCategory,
    pub started_at: i64,
    #[serde(default)]
    pub ended_at: Option<i64>,
    pub duration_minutes: i64,
    pub rate_per_minute: i64,
    pub amount: i64,
    pub status: EntryStatus,
    pub updated_at: i64,
}

impl TimeEntry {
    /// Duration shown while the entry is still on the clock. Completed and
    /// cancelled entries report their persisted duration.
    pub fn live_duration_minutes(&self, now_ms: i64) -> i64 {
        if self.status.is_live() {
            duration_minutes_between(self.started_at, now_ms)
        } else {
            self.duration_minutes
        }
    }
}

/// Whole minutes between two timestamps, floored, never negative.
pub fn duration_minutes_between(start_ms: i64, end_ms: i64) -> i64 {
    (end_ms - start_ms).max(0) / MS_PER_MINUTE
}

/// UTC civil-day window containing `now_ms`, as [start, end).
pub fn day_window_ms(now_ms: i64) -> (i64, i64) {
    let day = now_ms.div_euclid(MS_PER_DAY);
    (day * MS_PER_DAY, (day + 1) * MS_PER_DAY)
}

/// UTC ISO week window containing `now_ms` (Monday start), as [start, end).
pub fn week_window_ms(now_ms: i64) -> (i64, i64) {
    use chrono::Datelike;
    let (day_start, _) = day_window_ms(now_ms);
    let days_from_monday = match chrono::DateTime::from_timestamp_millis(day_start) {
        Some(dt) => dt.weekday().num_days_from_monday() as i64,
        None => 0,
    };
    let week_start = day_start - days_from_monday * MS_PER_DAY;
    (week_start, week_start + 7 * MS_PER_DAY)
}
