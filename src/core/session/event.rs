// Root event enumeration for the tracking session and its versioned payloads.
//
// Versioning and evolution
// - Prefer additive changes. If a breaking change is needed, add a new
//   version and a new variant; do not change the meaning of historical
//   events.

pub mod v1 {
    use crate::core::time_entry::TimeEntry;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
    pub struct SessionStartedV1 {
        pub entry: TimeEntry,
    }

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
    pub struct SessionPausedV1 {
        pub entry_id: String,
        pub at: i64,
    }

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
    pub struct SessionResumedV1 {
        pub entry_id: String,
        pub at: i64,
    }

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
    pub struct SessionStoppedV1 {
        pub entry_id: String,
        pub at: i64,
        pub duration_minutes: i64,
        pub amount: i64,
    }

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
    pub struct SessionCancelledV1 {
        pub entry_id: String,
        pub at: i64,
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum SessionEvent {
    SessionStartedV1(v1::SessionStartedV1),
    SessionPausedV1(v1::SessionPausedV1),
    SessionResumedV1(v1::SessionResumedV1),
    SessionStoppedV1(v1::SessionStoppedV1),
    SessionCancelledV1(v1::SessionCancelledV1),
}

impl SessionEvent {
    pub fn entry_id(&self) -> Option<&str> {
        match self {
            SessionEvent::SessionStartedV1(event) => event.entry.id.as_deref(),
            SessionEvent::SessionPausedV1(event) => Some(&event.entry_id),
            SessionEvent::SessionResumedV1(event) => Some(&event.entry_id),
            SessionEvent::SessionStoppedV1(event) => Some(&event.entry_id),
            SessionEvent::SessionCancelledV1(event) => Some(&event.entry_id),
        }
    }
}
