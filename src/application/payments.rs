// Payment service: creation and status mutations for billing records.
//
// Responsibilities
// - Request a payment over a set of completed entries, snapshotting the
//   amount from their rates at creation time.
// - Enforce the status table from core::payment; an illegal transition
//   rejects and persists nothing.
// - Record processor-driven statuses (processing/paid/failed/refunded) as
//   reported, with their date; the engine never moves money itself.

use crate::application::errors::{decode, encode, EngineError};
use crate::core::billing;
use crate::core::payment::{self, PaymentRecord, PaymentStatus};
use crate::core::ports::{Clock, DataStore, QuerySpec};
use crate::core::time_entry::{self, EntryStatus, TimeEntry};
use serde_json::Value;
use std::sync::Arc;

pub struct PaymentService<TStore: DataStore + 'static, TClock: Clock + 'static> {
    store: Arc<TStore>,
    clock: Arc<TClock>,
    actor_id: String,
    tax_rate: f64,
}

impl<TStore: DataStore + 'static, TClock: Clock + 'static> PaymentService<TStore, TClock> {
    pub fn new(
        store: Arc<TStore>,
        clock: Arc<TClock>,
        actor_id: impl Into<String>,
        tax_rate: f64,
    ) -> Result<Self, EngineError> {
        let actor_id = actor_id.into();
        if actor_id.trim().is_empty() {
            return Err(EngineError::Auth);
        }
        Ok(Self {
            store,
            clock,
            actor_id,
            tax_rate,
        })
    }

    /// The billing breakdown for a set of owned entries; no record created.
    pub async fn calculate(&self, entry_ids: &[String]) -> Result<billing::PaymentBreakdown, EngineError> {
        let entries = self.load_owned_entries(entry_ids).await?;
        Ok(billing::calculate(&entries, self.tax_rate))
    }

    /// Create a pending payment over a period's completed entries. Every
    /// referenced entry contributes to the derived totals; an entry already
    /// funding another live payment rejects the whole request.
    pub async fn request_payment(
        &self,
        scope_id: impl Into<String>,
        payer_id: impl Into<String>,
        period_start: i64,
        period_end: i64,
        entry_ids: &[String],
    ) -> Result<PaymentRecord, EngineError> {
        if entry_ids.is_empty() {
            return Err(EngineError::Validation(
                "a payment needs at least one entry".to_string(),
            ));
        }
        if period_end < period_start {
            return Err(EngineError::Validation(
                "period end must not precede period start".to_string(),
            ));
        }

        let entries = self.load_owned_entries(entry_ids).await?;
        for entry in &entries {
            if entry.status != EntryStatus::Completed {
                return Err(EngineError::Validation(format!(
                    "entry {} is not completed",
                    entry.id.as_deref().unwrap_or("?")
                )));
            }
        }
        self.ensure_entries_unclaimed(entry_ids).await?;

        let breakdown = billing::calculate(&entries, self.tax_rate);
        let now = self.clock.now_ms();
        let record = PaymentRecord {
            id: None,
            scope_id: scope_id.into(),
            payer_id: payer_id.into(),
            payee_id: self.actor_id.clone(),
            period_start,
            period_end,
            amount: breakdown.subtotal,
            total_minutes: breakdown.total_minutes,
            entry_ids: entry_ids.to_vec(),
            status: PaymentStatus::Pending,
            status_changed_at: now,
            dispute_reason: None,
            updated_at: now,
        };
        let persisted = self
            .store
            .create(payment::COLLECTION, encode(&record)?)
            .await?;
        let persisted: PaymentRecord = decode(&persisted)?;
        tracing::info!(
            payment = ?persisted.id,
            amount = persisted.amount,
            minutes = persisted.total_minutes,
            "payment requested"
        );
        Ok(persisted)
    }

    /// Payee marks the payment ready for processing.
    pub async fn mark_validated(&self, payment_id: &str) -> Result<PaymentRecord, EngineError> {
        let mut record = self.load_owned_payment(payment_id).await?;
        record.transition(PaymentStatus::Validated, self.clock.now_ms())?;
        self.persist(payment_id, &record).await
    }

    /// Payee-initiated cancel; only legal while the payment is not yet paid.
    pub async fn cancel(&self, payment_id: &str) -> Result<PaymentRecord, EngineError> {
        let mut record = self.load_owned_payment(payment_id).await?;
        record.transition(PaymentStatus::Cancelled, self.clock.now_ms())?;
        self.persist(payment_id, &record).await
    }

    /// Payee-initiated dispute; the reason is mandatory.
    pub async fn dispute(
        &self,
        payment_id: &str,
        reason: &str,
    ) -> Result<PaymentRecord, EngineError> {
        let mut record = self.load_owned_payment(payment_id).await?;
        record.dispute(reason, self.clock.now_ms())?;
        self.persist(payment_id, &record).await
    }

    /// Record a status reported by the external payment processor.
    pub async fn record_processor_update(
        &self,
        payment_id: &str,
        status: PaymentStatus,
        at: i64,
    ) -> Result<PaymentRecord, EngineError> {
        if !status.is_processor_driven() {
            return Err(EngineError::Validation(format!(
                "{status:?} is not a processor status"
            )));
        }
        let value = self.store.get(payment::COLLECTION, payment_id).await?;
        let mut record: PaymentRecord = decode(&value)?;
        record.transition(status, at)?;
        self.persist(payment_id, &record).await
    }

    async fn load_owned_entries(&self, entry_ids: &[String]) -> Result<Vec<TimeEntry>, EngineError> {
        let mut entries = Vec::with_capacity(entry_ids.len());
        for entry_id in entry_ids {
            let value = self.store.get(time_entry::COLLECTION, entry_id).await?;
            let entry: TimeEntry = decode(&value)?;
            if entry.actor_id != self.actor_id {
                return Err(EngineError::NotFound(format!(
                    "{}/{entry_id}",
                    time_entry::COLLECTION
                )));
            }
            entries.push(entry);
        }
        Ok(entries)
    }

    async fn ensure_entries_unclaimed(&self, entry_ids: &[String]) -> Result<(), EngineError> {
        let page = self
            .store
            .query(
                payment::COLLECTION,
                QuerySpec {
                    equals: vec![(
                        "payee_id".to_string(),
                        Value::String(self.actor_id.clone()),
                    )],
                    limit: u64::MAX,
                    ..QuerySpec::default()
                },
            )
            .await?;
        for value in &page.items {
            let Ok(existing) = decode::<PaymentRecord>(value) else {
                tracing::warn!("skipping malformed payment row during claim check");
                continue;
            };
            if existing.status == PaymentStatus::Cancelled {
                continue;
            }
            if let Some(taken) = entry_ids
                .iter()
                .find(|entry_id| existing.entry_ids.contains(entry_id))
            {
                return Err(EngineError::Conflict(format!(
                    "entry {taken} is already referenced by payment {}",
                    existing.id.as_deref().unwrap_or("?")
                )));
            }
        }
        Ok(())
    }

    async fn load_owned_payment(&self, payment_id: &str) -> Result<PaymentRecord, EngineError> {
        let value = self.store.get(payment::COLLECTION, payment_id).await?;
        let record: PaymentRecord = decode(&value)?;
        if record.payee_id != self.actor_id {
            return Err(EngineError::NotFound(format!(
                "{}/{payment_id}",
                payment::COLLECTION
            )));
        }
        Ok(record)
    }

    async fn persist(
        &self,
        payment_id: &str,
        record: &PaymentRecord,
    ) -> Result<PaymentRecord, EngineError> {
        let persisted = self
            .store
            .update(payment::COLLECTION, payment_id, encode(record)?)
            .await?;
        tracing::info!(payment = %payment_id, status = ?record.status, "payment status recorded");
        decode(&persisted)
    }
}
