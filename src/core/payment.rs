// Domain record for a billing unit and its status state machine.
//
// Purpose
// - Represent a payment over a period of completed entries and encode which
//   status transitions are legal.
//
// Responsibilities
// - `pending -> validated -> processing -> paid` is the happy path; the side
//   branches are cancel (while not yet paid), dispute (with a reason),
//   `processing -> failed`, and `paid -> refunded`.
// - Reject everything else instead of silently applying it.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const COLLECTION: &str = "payments";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Validated,
    Processing,
    Paid,
    Failed,
    Disputed,
    Refunded,
    Cancelled,
}

impl PaymentStatus {
    pub const ALL: [PaymentStatus; 8] = [
        PaymentStatus::Pending,
        PaymentStatus::Validated,
        PaymentStatus::Processing,
        PaymentStatus::Paid,
        PaymentStatus::Failed,
        PaymentStatus::Disputed,
        PaymentStatus::Refunded,
        PaymentStatus::Cancelled,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(self, PaymentStatus::Refunded | PaymentStatus::Cancelled)
    }

    /// Statuses an external payment processor reports back; everything else
    /// is payee-initiated.
    pub fn is_processor_driven(self) -> bool {
        matches!(
            self,
            PaymentStatus::Processing
                | PaymentStatus::Paid
                | PaymentStatus::Failed
                | PaymentStatus::Refunded
        )
    }

    pub fn can_transition_to(self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, next),
            (Pending, Validated)
                | (Validated, Processing)
                | (Processing, Paid)
                | (Processing, Failed)
                | (Paid, Refunded)
                // processor retry after a failure, and dispute resolution
                | (Failed, Processing)
                | (Disputed, Processing)
                | (
                    Pending | Validated | Processing | Failed | Disputed,
                    Cancelled
                )
                | (Pending | Validated | Processing | Paid | Failed, Disputed)
        )
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("invalid payment transition: {from:?} -> {to:?}")]
    Invalid {
        from: PaymentStatus,
        to: PaymentStatus,
    },

    #[error("a dispute requires a reason")]
    MissingDisputeReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub scope_id: String,
    pub payer_id: String,
    pub payee_id: String,
    pub period_start: i64,
    pub period_end: i64,
    /// Sum of the referenced entries' rate x duration, in minor units.
    /// Snapshotted at creation; never recomputed when rates change later.
    pub amount: i64,
    pub total_minutes: i64,
    pub entry_ids: Vec<String>,
    pub status: PaymentStatus,
    pub status_changed_at: i64,
    #[serde(default)]
    pub dispute_reason: Option<String>,
    pub updated_at: i64,
}

impl PaymentRecord {
    pub fn transition(&mut self, next: PaymentStatus, at: i64) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError::Invalid {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.status_changed_at = at;
        self.updated_at = at;
        Ok(())
    }

    pub fn dispute(&mut self, reason: &str, at: i64) -> Result<(), TransitionError> {
        if reason.trim().is_empty() {
            return Err(TransitionError::MissingDisputeReason);
        }
        self.transition(PaymentStatus::Disputed, at)?;
        self.dispute_reason = Some(reason.trim().to_string());
        Ok(())
    }
}
