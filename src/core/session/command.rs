// Caller intents for the tracking session.
//
// Responsibilities
// - Carry input data for the decider to validate and convert into events.
// - Be independent of transport details; timestamps come from the caller's
//   clock so the decider stays pure.

use crate::core::time_entry::TaskCategory;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    Start {
        actor_id: String,
        scope_id: String,
        description: String,
        category: TaskCategory,
        rate_per_minute: i64,
        at: i64,
    },
    Pause {
        at: i64,
    },
    Resume {
        at: i64,
    },
    Stop {
        at: i64,
    },
    Cancel {
        at: i64,
    },
}
