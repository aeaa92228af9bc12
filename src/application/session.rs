// Time session machine: the single tracking slot for one actor.
//
// Responsibilities
// - Run commands through the pure decider, persist the outcome, and only
//   then evolve the in-memory slot, so a store failure leaves state as it
//   was and the caller retries explicitly.
// - Own the auto-persist task through a handle held in the slot; ticks
//   re-check the slot state under its lock, so a late tick can never write
//   to a session that already completed.
// - Push optimistic writes into the entry mirror; the store's echo merges
//   over them in place.

use crate::application::errors::{decode, encode, EngineError};
use crate::application::reconcile::{entries_this_week, entries_today, Mirror};
use crate::core::ports::{Clock, DataStore};
use crate::core::session::command::SessionCommand;
use crate::core::session::decide::decide;
use crate::core::session::event::{v1, SessionEvent};
use crate::core::session::evolve::evolve;
use crate::core::session::state::SessionState;
use crate::core::time_entry::{
    self, duration_minutes_between, EntryStatus, TaskCategory, TimeEntry,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

pub const DEFAULT_AUTOSAVE_INTERVAL: Duration = Duration::from_secs(30);

/// Owned handle on the auto-persist task. Cancelling (or dropping) it aborts
/// the task; the slot owner holds exactly one while a session is active.
#[derive(Debug)]
pub struct AutosaveHandle {
    task: JoinHandle<()>,
}

impl AutosaveHandle {
    fn new(task: JoinHandle<()>) -> Self {
        Self { task }
    }

    pub fn cancel(&self) {
        self.task.abort();
    }
}

impl Drop for AutosaveHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub actor_id: String,
    pub rate_per_minute: i64,
    pub autosave_interval: Duration,
}

struct Slot {
    state: SessionState,
    autosave: Option<AutosaveHandle>,
}

pub struct SessionMachine<TStore: DataStore + 'static, TClock: Clock + 'static> {
    store: Arc<TStore>,
    clock: Arc<TClock>,
    mirror: Arc<Mirror<TStore>>,
    config: SessionConfig,
    slot: Arc<Mutex<Slot>>,
}

impl<TStore: DataStore + 'static, TClock: Clock + 'static> SessionMachine<TStore, TClock> {
    pub fn new(
        store: Arc<TStore>,
        clock: Arc<TClock>,
        mirror: Arc<Mirror<TStore>>,
        config: SessionConfig,
    ) -> Result<Self, EngineError> {
        if config.actor_id.trim().is_empty() {
            return Err(EngineError::Auth);
        }
        Ok(Self {
            store,
            clock,
            mirror,
            config,
            slot: Arc::new(Mutex::new(Slot {
                state: SessionState::Idle,
                autosave: None,
            })),
        })
    }

    pub async fn current(&self) -> Option<TimeEntry> {
        self.slot.lock().await.state.entry().cloned()
    }

    /// Start tracking. A live session is stopped first, as its own
    /// transition, so both writes are observable to callers and tests.
    pub async fn start(
        &self,
        scope_id: impl Into<String>,
        description: impl Into<String>,
        category: TaskCategory,
    ) -> Result<TimeEntry, EngineError> {
        let mut slot = self.slot.lock().await;
        if slot.state.is_live() {
            let stopped = self.stop_locked(&mut slot).await?;
            tracing::info!(
                entry = ?stopped.id,
                "stopped previous session before starting a new one"
            );
        }

        let now = self.clock.now_ms();
        let command = SessionCommand::Start {
            actor_id: self.config.actor_id.clone(),
            scope_id: scope_id.into(),
            description: description.into(),
            category,
            rate_per_minute: self.config.rate_per_minute,
            at: now,
        };
        let events = decide(&slot.state, command)?;
        let Some(SessionEvent::SessionStartedV1(started)) = events.into_iter().next() else {
            return Err(EngineError::Validation("start produced no event".to_string()));
        };

        let persisted_value = self
            .store
            .create(time_entry::COLLECTION, encode(&started.entry)?)
            .await?;
        let persisted: TimeEntry = decode(&persisted_value)?;
        let entry_id = persisted.id.clone().unwrap_or_default();

        slot.state = evolve(
            std::mem::replace(&mut slot.state, SessionState::Idle),
            SessionEvent::SessionStartedV1(v1::SessionStartedV1 {
                entry: persisted.clone(),
            }),
        );
        self.mirror
            .upsert_local(&entry_id, persisted.updated_at, &persisted_value)
            .await;
        slot.autosave = Some(self.spawn_autosave(entry_id.clone()));
        tracing::info!(entry = %entry_id, scope = %persisted.scope_id, "session started");
        Ok(persisted)
    }

    pub async fn pause(&self) -> Result<TimeEntry, EngineError> {
        let mut slot = self.slot.lock().await;
        let now = self.clock.now_ms();
        let events = decide(&slot.state, SessionCommand::Pause { at: now })?;
        let Some(SessionEvent::SessionPausedV1(paused)) = events.into_iter().next() else {
            return Err(EngineError::Validation("pause produced no event".to_string()));
        };

        let patch = json!({ "status": EntryStatus::Paused, "updated_at": paused.at });
        self.store
            .update(time_entry::COLLECTION, &paused.entry_id, patch.clone())
            .await?;

        // the timer halts while paused; no progress accrues
        if let Some(handle) = slot.autosave.take() {
            handle.cancel();
        }
        slot.state = evolve(
            std::mem::replace(&mut slot.state, SessionState::Idle),
            SessionEvent::SessionPausedV1(paused.clone()),
        );
        self.mirror
            .upsert_local(&paused.entry_id, paused.at, &patch)
            .await;
        tracing::info!(entry = %paused.entry_id, "session paused");
        self.current_or_invalid(&slot)
    }

    pub async fn resume(&self) -> Result<TimeEntry, EngineError> {
        let mut slot = self.slot.lock().await;
        let now = self.clock.now_ms();
        let events = decide(&slot.state, SessionCommand::Resume { at: now })?;
        let Some(SessionEvent::SessionResumedV1(resumed)) = events.into_iter().next() else {
            return Err(EngineError::Validation("resume produced no event".to_string()));
        };

        let patch = json!({ "status": EntryStatus::Active, "updated_at": resumed.at });
        self.store
            .update(time_entry::COLLECTION, &resumed.entry_id, patch.clone())
            .await?;

        slot.state = evolve(
            std::mem::replace(&mut slot.state, SessionState::Idle),
            SessionEvent::SessionResumedV1(resumed.clone()),
        );
        self.mirror
            .upsert_local(&resumed.entry_id, resumed.at, &patch)
            .await;
        slot.autosave = Some(self.spawn_autosave(resumed.entry_id.clone()));
        tracing::info!(entry = %resumed.entry_id, "session resumed");
        self.current_or_invalid(&slot)
    }

    pub async fn stop(&self) -> Result<TimeEntry, EngineError> {
        let mut slot = self.slot.lock().await;
        self.stop_locked(&mut slot).await
    }

    async fn stop_locked(&self, slot: &mut Slot) -> Result<TimeEntry, EngineError> {
        let now = self.clock.now_ms();
        let events = decide(&slot.state, SessionCommand::Stop { at: now })?;
        let Some(SessionEvent::SessionStoppedV1(stopped)) = events.into_iter().next() else {
            return Err(EngineError::Validation("stop produced no event".to_string()));
        };
        let Some(entry) = slot.state.entry() else {
            return Err(EngineError::Validation("no session is being tracked".to_string()));
        };

        // the final duration derives from wall clock, never from whatever
        // the last auto-persist tick managed to write
        let mut completed = entry.clone();
        completed.status = EntryStatus::Completed;
        completed.ended_at = Some(stopped.at);
        completed.duration_minutes = stopped.duration_minutes;
        completed.amount = stopped.amount;
        completed.updated_at = stopped.at;

        let persisted_value = self
            .store
            .update(time_entry::COLLECTION, &stopped.entry_id, encode(&completed)?)
            .await?;

        // we hold the slot lock, so no tick can interleave between the final
        // write above and the cancellation here
        if let Some(handle) = slot.autosave.take() {
            handle.cancel();
        }
        slot.state = evolve(
            std::mem::replace(&mut slot.state, SessionState::Idle),
            SessionEvent::SessionStoppedV1(stopped.clone()),
        );
        self.mirror
            .upsert_local(&stopped.entry_id, stopped.at, &persisted_value)
            .await;
        tracing::info!(
            entry = %stopped.entry_id,
            minutes = stopped.duration_minutes,
            "session stopped"
        );
        decode(&persisted_value)
    }

    /// Pure metadata edit: the live session or any completed entry owned by
    /// the same actor.
    pub async fn update_description(
        &self,
        entry_id: &str,
        text: impl Into<String>,
    ) -> Result<TimeEntry, EngineError> {
        let text = text.into();
        let mut slot = self.slot.lock().await;
        let now = self.clock.now_ms();

        let is_current = slot
            .state
            .entry()
            .and_then(|entry| entry.id.as_deref())
            .is_some_and(|id| id == entry_id);
        if !is_current {
            let current_value = self.store.get(time_entry::COLLECTION, entry_id).await?;
            let current: TimeEntry = decode(&current_value)?;
            if current.actor_id != self.config.actor_id {
                return Err(EngineError::NotFound(format!(
                    "{}/{entry_id}",
                    time_entry::COLLECTION
                )));
            }
        }

        let patch = json!({ "description": text, "updated_at": now });
        let persisted = self
            .store
            .update(time_entry::COLLECTION, entry_id, patch.clone())
            .await?;
        if is_current {
            if let Some(entry) = slot.state.entry_mut() {
                entry.description = text;
                entry.updated_at = now;
            }
        }
        self.mirror.upsert_local(entry_id, now, &patch).await;
        decode(&persisted)
    }

    /// Remove an entry. The confirmation boolean comes from the caller's own
    /// confirm step; it is never assumed.
    pub async fn delete_record(&self, entry_id: &str, confirmed: bool) -> Result<(), EngineError> {
        if !confirmed {
            return Err(EngineError::Validation(
                "deletion requires confirmation".to_string(),
            ));
        }
        let mut slot = self.slot.lock().await;
        self.store.delete(time_entry::COLLECTION, entry_id).await?;
        let is_current = slot
            .state
            .entry()
            .and_then(|entry| entry.id.as_deref())
            .is_some_and(|id| id == entry_id);
        if is_current {
            if let Some(handle) = slot.autosave.take() {
                handle.cancel();
            }
            slot.state = SessionState::Idle;
        }
        self.mirror.remove_local(entry_id, self.clock.now_ms()).await;
        tracing::info!(entry = %entry_id, "entry deleted");
        Ok(())
    }

    /// Minutes tracked today, the live session counted from the wall clock.
    pub async fn total_today(&self) -> i64 {
        let now = self.clock.now_ms();
        let window = crate::core::time_entry::day_window_ms(now);
        let entries = entries_today(&self.mirror, now).await;
        self.sum_with_live(entries, window, now).await
    }

    /// Minutes tracked this ISO week, the live session counted from the wall
    /// clock.
    pub async fn total_this_week(&self) -> i64 {
        let now = self.clock.now_ms();
        let window = crate::core::time_entry::week_window_ms(now);
        let entries = entries_this_week(&self.mirror, now).await;
        self.sum_with_live(entries, window, now).await
    }

    async fn sum_with_live(&self, entries: Vec<TimeEntry>, window: (i64, i64), now: i64) -> i64 {
        let slot = self.slot.lock().await;
        let live = slot.state.entry();
        let live_id = live.and_then(|entry| entry.id.as_deref());
        let mirrored: i64 = entries
            .iter()
            .filter(|entry| entry.status != EntryStatus::Cancelled)
            .filter(|entry| entry.id.as_deref() != live_id)
            .map(|entry| entry.duration_minutes)
            .sum();
        let live_minutes = match live {
            Some(entry) if entry.started_at >= window.0 && entry.started_at < window.1 => {
                entry.live_duration_minutes(now)
            }
            _ => 0,
        };
        mirrored + live_minutes
    }

    fn current_or_invalid(&self, slot: &Slot) -> Result<TimeEntry, EngineError> {
        slot.state
            .entry()
            .cloned()
            .ok_or_else(|| EngineError::Validation("no session is being tracked".to_string()))
    }

    fn spawn_autosave(&self, entry_id: String) -> AutosaveHandle {
        let store = Arc::clone(&self.store);
        let clock = Arc::clone(&self.clock);
        let slot = Arc::clone(&self.slot);
        let mirror = Arc::clone(&self.mirror);
        let interval = self.config.autosave_interval;
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // the first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let guard = slot.lock().await;
                let snapshot = match &guard.state {
                    SessionState::Active { entry }
                        if entry.id.as_deref() == Some(entry_id.as_str()) =>
                    {
                        entry.clone()
                    }
                    _ => break,
                };
                let now = clock.now_ms();
                let minutes = duration_minutes_between(snapshot.started_at, now);
                let patch = json!({ "duration_minutes": minutes, "updated_at": now });
                // the lock is held across the write: stop() cannot complete
                // underneath a tick, and a tick after stop() never runs
                let result = store
                    .update(time_entry::COLLECTION, &entry_id, patch.clone())
                    .await;
                drop(guard);
                match result {
                    Ok(_) => {
                        mirror.upsert_local(&entry_id, now, &patch).await;
                        tracing::debug!(entry = %entry_id, minutes, "auto-persisted progress");
                    }
                    Err(err) => {
                        // best effort: stop() recomputes from wall clock
                        tracing::warn!(entry = %entry_id, error = %err, "auto-persist tick failed");
                    }
                }
            }
        });
        AutosaveHandle::new(task)
    }
}
