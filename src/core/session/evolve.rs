// Evolve function: combine a prior state with an event to produce the next.
//
// Boundaries
// - No input or output. No side effects.
//
// Testing guidance
// - Folding a sequence of events should yield an expected state; events that
//   do not apply to the current state fall through unchanged.

use crate::core::session::event::SessionEvent;
use crate::core::session::state::SessionState;
use crate::core::time_entry::EntryStatus;

pub fn evolve(state: SessionState, event: SessionEvent) -> SessionState {
    match (state, event) {
        (SessionState::Idle, SessionEvent::SessionStartedV1(started)) => SessionState::Active {
            entry: started.entry,
        },
        (SessionState::Active { mut entry }, SessionEvent::SessionPausedV1(paused)) => {
            entry.status = EntryStatus::Paused;
            entry.updated_at = paused.at;
            SessionState::Paused { entry }
        }
        (SessionState::Paused { mut entry }, SessionEvent::SessionResumedV1(resumed)) => {
            entry.status = EntryStatus::Active;
            entry.updated_at = resumed.at;
            SessionState::Active { entry }
        }
        (
            SessionState::Active { .. } | SessionState::Paused { .. },
            SessionEvent::SessionStoppedV1(_) | SessionEvent::SessionCancelledV1(_),
        ) => SessionState::Idle,
        (state, _) => state,
    }
}
