// Pure decision function for the tracking session.
//
// Purpose
// - Validate a command against the current slot state and produce events on
//   success. Never perform input or output.
//
// Responsibilities
// - Enforce the single-slot rule: starting requires an empty slot (the
//   machine stops the previous session first, as its own observable
//   transition, before deciding a start).
// - Derive the final duration and amount on stop purely from timestamps.

use crate::core::session::command::SessionCommand;
use crate::core::session::event::{v1, SessionEvent};
use crate::core::session::state::SessionState;
use crate::core::time_entry::{duration_minutes_between, EntryStatus, TimeEntry};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DecideError {
    #[error("a session is already being tracked")]
    AlreadyTracking,

    #[error("no session is being tracked")]
    NotTracking,

    #[error("session is not active")]
    NotActive,

    #[error("session is not paused")]
    NotPaused,

    #[error("scope must not be empty")]
    MissingScope,
}

pub fn decide(
    state: &SessionState,
    command: SessionCommand,
) -> Result<Vec<SessionEvent>, DecideError> {
    match (state, command) {
        (
            SessionState::Idle,
            SessionCommand::Start {
                actor_id,
                scope_id,
                description,
                category,
                rate_per_minute,
                at,
            },
        ) => {
            if scope_id.trim().is_empty() {
                return Err(DecideError::MissingScope);
            }
            let entry = TimeEntry {
                id: None,
                actor_id,
                scope_id,
                description,
                category,
                started_at: at,
                ended_at: None,
                duration_minutes: 0,
                rate_per_minute,
                amount: 0,
                status: EntryStatus::Active,
                updated_at: at,
            };
            Ok(vec![SessionEvent::SessionStartedV1(v1::SessionStartedV1 {
                entry,
            })])
        }
        (_, SessionCommand::Start { .. }) => Err(DecideError::AlreadyTracking),

        (SessionState::Active { entry }, SessionCommand::Pause { at }) => {
            Ok(vec![SessionEvent::SessionPausedV1(v1::SessionPausedV1 {
                entry_id: entry.id.clone().unwrap_or_default(),
                at,
            })])
        }
        (SessionState::Paused { .. }, SessionCommand::Pause { .. }) => Err(DecideError::NotActive),
        (SessionState::Idle, SessionCommand::Pause { .. }) => Err(DecideError::NotTracking),

        (SessionState::Paused { entry }, SessionCommand::Resume { at }) => {
            Ok(vec![SessionEvent::SessionResumedV1(v1::SessionResumedV1 {
                entry_id: entry.id.clone().unwrap_or_default(),
                at,
            })])
        }
        (SessionState::Active { .. }, SessionCommand::Resume { .. }) => Err(DecideError::NotPaused),
        (SessionState::Idle, SessionCommand::Resume { .. }) => Err(DecideError::NotTracking),

        (
            SessionState::Active { entry } | SessionState::Paused { entry },
            SessionCommand::Stop { at },
        ) => {
            // Wall clock start to stop, paused intervals included. Pause
            // exclusion is a product decision that has not been taken.
            let duration_minutes = duration_minutes_between(entry.started_at, at);
            Ok(vec![SessionEvent::SessionStoppedV1(v1::SessionStoppedV1 {
                entry_id: entry.id.clone().unwrap_or_default(),
                at,
                duration_minutes,
                amount: duration_minutes * entry.rate_per_minute,
            })])
        }
        (SessionState::Idle, SessionCommand::Stop { .. }) => Err(DecideError::NotTracking),

        (
            SessionState::Active { entry } | SessionState::Paused { entry },
            SessionCommand::Cancel { at },
        ) => Ok(vec![SessionEvent::SessionCancelledV1(
            v1::SessionCancelledV1 {
                entry_id: entry.id.clone().unwrap_or_default(),
                at,
            },
        )]),
        (SessionState::Idle, SessionCommand::Cancel { .. }) => Err(DecideError::NotTracking),
    }
}
