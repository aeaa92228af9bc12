// Shared state handed to the HTTP handlers.

use crate::adapters::in_memory::in_memory_store::InMemoryDataStore;
use crate::application::payments::PaymentService;
use crate::application::queries::RecordQueries;
use crate::application::reconcile::Reconciler;
use crate::application::session::SessionMachine;
use crate::application::stats::StatsAggregator;
use crate::core::ports::SystemClock;
use std::sync::Arc;

pub type Store = InMemoryDataStore;

#[derive(Clone)]
pub struct AppState {
    pub machine: Arc<SessionMachine<Store, SystemClock>>,
    pub stats: Arc<StatsAggregator<Store, SystemClock>>,
    pub payments: Arc<PaymentService<Store, SystemClock>>,
    pub queries: Arc<RecordQueries<Store>>,
    // held so the subscriptions and apply loops live as long as the app
    pub reconciler: Arc<Reconciler<Store>>,
}
