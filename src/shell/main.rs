use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{fmt, EnvFilter};

use time_tracking::adapters::in_memory::in_memory_store::InMemoryDataStore;
use time_tracking::application::payments::PaymentService;
use time_tracking::application::queries::RecordQueries;
use time_tracking::application::reconcile::Reconciler;
use time_tracking::application::session::{SessionConfig, SessionMachine};
use time_tracking::application::stats::StatsAggregator;
use time_tracking::core::ports::{Clock, SystemClock};
use time_tracking::shell::config::AppConfig;
use time_tracking::shell::http::router;
use time_tracking::shell::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let config = AppConfig::from_env()?;

    // In-memory store for now; a remote-backed adapter plugs in here.
    let store = Arc::new(InMemoryDataStore::new());
    let clock = Arc::new(SystemClock);

    let reconciler = Arc::new(
        Reconciler::spawn(store.clone(), &config.actor_id, clock.now_ms()).await?,
    );
    let machine = Arc::new(SessionMachine::new(
        store.clone(),
        clock.clone(),
        reconciler.entries(),
        SessionConfig {
            actor_id: config.actor_id.clone(),
            rate_per_minute: config.rate_per_minute(),
            autosave_interval: config.autosave_interval,
        },
    )?);
    let stats = Arc::new(StatsAggregator::new(
        reconciler.entries(),
        reconciler.payments(),
        clock.clone(),
    ));
    let payments = Arc::new(PaymentService::new(
        store.clone(),
        clock,
        config.actor_id.as_str(),
        config.tax_rate,
    )?);
    let queries = Arc::new(RecordQueries::new(store, config.actor_id.as_str())?);

    let app = router(AppState {
        machine,
        stats,
        payments,
        queries,
        reconciler,
    })
    .layer(TraceLayer::new_for_http())
    .layer(CorsLayer::permissive());

    let addr: SocketAddr = config.bind_addr.parse()?;
    tracing::info!(actor = %config.actor_id, "engine listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
