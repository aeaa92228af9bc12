// The tracking-session slot after folding events.
//
// Purpose
// - Encode the lifecycle as explicit variants: nothing on the clock, an
//   active entry, or a paused one. Completion and cancellation empty the
//   slot; the finished entry lives on in the store and the mirrors.

use crate::core::time_entry::TimeEntry;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Active { entry: TimeEntry },
    Paused { entry: TimeEntry },
}

impl SessionState {
    pub fn is_live(&self) -> bool {
        !matches!(self, SessionState::Idle)
    }

    pub fn entry(&self) -> Option<&TimeEntry> {
        match self {
            SessionState::Idle => None,
            SessionState::Active { entry } | SessionState::Paused { entry } => Some(entry),
        }
    }

    pub fn entry_mut(&mut self) -> Option<&mut TimeEntry> {
        match self {
            SessionState::Idle => None,
            SessionState::Active { entry } | SessionState::Paused { entry } => Some(entry),
        }
    }
}

#[cfg(test)]
mod session_state_tests {
    use super::*;
    use crate::test_support::fixtures::entries::TimeEntryBuilder;
    use crate::core::time_entry::EntryStatus;
    use rstest::rstest;

    #[rstest]
    fn it_should_start_from_the_idle_state() {
        let state = SessionState::Idle;
        assert!(!state.is_live());
        assert!(state.entry().is_none());
    }

    #[rstest]
    fn it_should_expose_the_entry_of_a_live_state() {
        let entry = TimeEntryBuilder::new().status(EntryStatus::Active).build();
        let state = SessionState::Active {
            entry: entry.clone(),
        };
        assert!(state.is_live());
        assert_eq!(state.entry(), Some(&entry));

        let paused = SessionState::Paused { entry };
        assert!(paused.is_live());
    }
}
