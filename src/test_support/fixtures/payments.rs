// Shared test fixture for payment records.

use crate::core::payment::{PaymentRecord, PaymentStatus};

pub struct PaymentRecordBuilder {
    inner: PaymentRecord,
}

impl Default for PaymentRecordBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[allow(dead_code)]
impl PaymentRecordBuilder {
    pub fn new() -> Self {
        Self {
            inner: PaymentRecord {
                id: Some("pay-fixed-0001".to_string()),
                scope_id: "scope-fixed-0001".to_string(),
                payer_id: "client-fixed-0001".to_string(),
                payee_id: "actor-fixed-0001".to_string(),
                period_start: 1_700_000_000_000,
                period_end: 1_700_600_000_000,
                amount: 4_500,
                total_minutes: 60,
                entry_ids: vec!["te-fixed-0001".to_string()],
                status: PaymentStatus::Pending,
                status_changed_at: 1_700_600_000_000,
                dispute_reason: None,
                updated_at: 1_700_600_000_000,
            },
        }
    }

    pub fn id(mut self, v: Option<String>) -> Self {
        self.inner.id = v;
        self
    }

    pub fn scope_id(mut self, v: impl Into<String>) -> Self {
        self.inner.scope_id = v.into();
        self
    }

    pub fn payer_id(mut self, v: impl Into<String>) -> Self {
        self.inner.payer_id = v.into();
        self
    }

    pub fn payee_id(mut self, v: impl Into<String>) -> Self {
        self.inner.payee_id = v.into();
        self
    }

    pub fn period(mut self, start: i64, end: i64) -> Self {
        self.inner.period_start = start;
        self.inner.period_end = end;
        self
    }

    pub fn amount(mut self, v: i64) -> Self {
        self.inner.amount = v;
        self
    }

    pub fn total_minutes(mut self, v: i64) -> Self {
        self.inner.total_minutes = v;
        self
    }

    pub fn entry_ids(mut self, v: Vec<String>) -> Self {
        self.inner.entry_ids = v;
        self
    }

    pub fn status(mut self, v: PaymentStatus) -> Self {
        self.inner.status = v;
        self
    }

    pub fn status_changed_at(mut self, v: i64) -> Self {
        self.inner.status_changed_at = v;
        self
    }

    pub fn updated_at(mut self, v: i64) -> Self {
        self.inner.updated_at = v;
        self
    }

    pub fn build(self) -> PaymentRecord {
        self.inner
    }
}
