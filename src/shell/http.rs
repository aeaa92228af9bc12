// HTTP surface over the engine, consumed by the dashboard.
//
// Thin handlers only: parse, call the application layer, map the error
// taxonomy onto status codes. Everything interesting happens below.

use crate::application::errors::EngineError;
use crate::application::queries::{EntryFilter, PageRequest, PaymentFilter};
use crate::core::payment::{PaymentRecord, PaymentStatus};
use crate::core::time_entry::{EntryStatus, TaskCategory, TimeEntry};
use crate::shell::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, patch, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/sessions/start", post(start_session))
        .route("/sessions/pause", post(pause_session))
        .route("/sessions/resume", post(resume_session))
        .route("/sessions/stop", post(stop_session))
        .route("/sessions/current", get(current_session))
        .route("/sessions/totals", get(session_totals))
        .route("/entries", get(list_entries))
        .route("/entries/{id}/description", patch(update_description))
        .route("/entries/{id}", delete(delete_entry))
        .route("/payments", get(list_payments))
        .route("/payments/request", post(request_payment))
        .route("/payments/{id}/validate", post(validate_payment))
        .route("/payments/{id}/cancel", post(cancel_payment))
        .route("/payments/{id}/dispute", post(dispute_payment))
        .route("/payments/{id}/processor", post(processor_update))
        .route("/stats", get(dashboard_stats))
        .route("/stats/top-payers", get(top_payers))
        .route("/stats/monthly", get(monthly_series))
        .route("/stats/moving-average", get(moving_average))
        .route("/stats/forecast", get(forecast))
        .with_state(state)
}

pub struct ApiError(EngineError);

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            EngineError::Validation(_) => (StatusCode::BAD_REQUEST, "validation"),
            EngineError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            EngineError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            EngineError::Auth => (StatusCode::UNAUTHORIZED, "auth"),
            EngineError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "store"),
        };
        let body = Json(json!({ "code": code, "message": self.0.to_string() }));
        (status, body).into_response()
    }
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
struct StartSessionBody {
    scope_id: String,
    #[serde(default)]
    description: String,
    category: TaskCategory,
}

async fn start_session(
    State(state): State<AppState>,
    Json(body): Json<StartSessionBody>,
) -> Result<Json<TimeEntry>, ApiError> {
    let entry = state
        .machine
        .start(body.scope_id, body.description, body.category)
        .await?;
    Ok(Json(entry))
}

async fn pause_session(State(state): State<AppState>) -> Result<Json<TimeEntry>, ApiError> {
    Ok(Json(state.machine.pause().await?))
}

async fn resume_session(State(state): State<AppState>) -> Result<Json<TimeEntry>, ApiError> {
    Ok(Json(state.machine.resume().await?))
}

async fn stop_session(State(state): State<AppState>) -> Result<Json<TimeEntry>, ApiError> {
    Ok(Json(state.machine.stop().await?))
}

#[derive(Debug, Serialize)]
struct CurrentSession {
    entry: Option<TimeEntry>,
    live_duration_minutes: Option<i64>,
}

async fn current_session(State(state): State<AppState>) -> Json<CurrentSession> {
    let entry = state.machine.current().await;
    let now = chrono::Utc::now().timestamp_millis();
    let live_duration_minutes = entry.as_ref().map(|entry| entry.live_duration_minutes(now));
    Json(CurrentSession {
        entry,
        live_duration_minutes,
    })
}

#[derive(Debug, Serialize)]
struct SessionTotals {
    today_minutes: i64,
    week_minutes: i64,
}

async fn session_totals(State(state): State<AppState>) -> Json<SessionTotals> {
    Json(SessionTotals {
        today_minutes: state.machine.total_today().await,
        week_minutes: state.machine.total_this_week().await,
    })
}

#[derive(Debug, Deserialize)]
struct EntryListParams {
    scope_id: Option<String>,
    status: Option<EntryStatus>,
    started_after: Option<i64>,
    started_before: Option<i64>,
    #[serde(default)]
    offset: u64,
    limit: Option<u64>,
}

#[derive(Debug, Serialize)]
struct ListResponse<T> {
    items: Vec<T>,
    total: u64,
    offset: u64,
    limit: u64,
}

async fn list_entries(
    State(state): State<AppState>,
    Query(params): Query<EntryListParams>,
) -> Result<Json<ListResponse<TimeEntry>>, ApiError> {
    let page = state
        .queries
        .entries(
            EntryFilter {
                scope_id: params.scope_id,
                status: params.status,
                started_after: params.started_after,
                started_before: params.started_before,
            },
            PageRequest {
                offset: params.offset,
                limit: params.limit.unwrap_or(50),
            },
        )
        .await?;
    Ok(Json(ListResponse {
        items: page.items,
        total: page.total,
        offset: page.offset,
        limit: page.limit,
    }))
}

#[derive(Debug, Deserialize)]
struct UpdateDescriptionBody {
    text: String,
}

async fn update_description(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UpdateDescriptionBody>,
) -> Result<Json<TimeEntry>, ApiError> {
    Ok(Json(state.machine.update_description(&id, body.text).await?))
}

#[derive(Debug, Deserialize)]
struct DeleteParams {
    #[serde(default)]
    confirmed: bool,
}

async fn delete_entry(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<DeleteParams>,
) -> Result<StatusCode, ApiError> {
    state.machine.delete_record(&id, params.confirmed).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct PaymentListParams {
    scope_id: Option<String>,
    status: Option<PaymentStatus>,
    #[serde(default)]
    offset: u64,
    limit: Option<u64>,
}

async fn list_payments(
    State(state): State<AppState>,
    Query(params): Query<PaymentListParams>,
) -> Result<Json<ListResponse<PaymentRecord>>, ApiError> {
    let page = state
        .queries
        .payments(
            PaymentFilter {
                scope_id: params.scope_id,
                status: params.status,
            },
            PageRequest {
                offset: params.offset,
                limit: params.limit.unwrap_or(50),
            },
        )
        .await?;
    Ok(Json(ListResponse {
        items: page.items,
        total: page.total,
        offset: page.offset,
        limit: page.limit,
    }))
}

#[derive(Debug, Deserialize)]
struct RequestPaymentBody {
    scope_id: String,
    payer_id: String,
    period_start: i64,
    period_end: i64,
    entry_ids: Vec<String>,
}

async fn request_payment(
    State(state): State<AppState>,
    Json(body): Json<RequestPaymentBody>,
) -> Result<Json<PaymentRecord>, ApiError> {
    let record = state
        .payments
        .request_payment(
            body.scope_id,
            body.payer_id,
            body.period_start,
            body.period_end,
            &body.entry_ids,
        )
        .await?;
    Ok(Json(record))
}

async fn validate_payment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PaymentRecord>, ApiError> {
    Ok(Json(state.payments.mark_validated(&id).await?))
}

async fn cancel_payment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PaymentRecord>, ApiError> {
    Ok(Json(state.payments.cancel(&id).await?))
}

#[derive(Debug, Deserialize)]
struct DisputeBody {
    reason: String,
}

async fn dispute_payment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<DisputeBody>,
) -> Result<Json<PaymentRecord>, ApiError> {
    Ok(Json(state.payments.dispute(&id, &body.reason).await?))
}

#[derive(Debug, Deserialize)]
struct ProcessorBody {
    status: PaymentStatus,
    at: Option<i64>,
}

async fn processor_update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<ProcessorBody>,
) -> Result<Json<PaymentRecord>, ApiError> {
    let at = body
        .at
        .unwrap_or_else(|| chrono::Utc::now().timestamp_millis());
    Ok(Json(
        state.payments.record_processor_update(&id, body.status, at).await?,
    ))
}

async fn dashboard_stats(
    State(state): State<AppState>,
) -> Json<crate::application::stats::DashboardStats> {
    Json(state.stats.stats().await)
}

#[derive(Debug, Deserialize)]
struct LimitParams {
    limit: Option<usize>,
}

async fn top_payers(
    State(state): State<AppState>,
    Query(params): Query<LimitParams>,
) -> Json<Vec<crate::application::stats::PayerEarnings>> {
    Json(state.stats.top_payers(params.limit.unwrap_or(5)).await)
}

#[derive(Debug, Deserialize)]
struct MonthsParams {
    months: Option<usize>,
}

async fn monthly_series(
    State(state): State<AppState>,
    Query(params): Query<MonthsParams>,
) -> Json<Vec<crate::application::stats::MonthlyEarnings>> {
    Json(state.stats.monthly_series(params.months.unwrap_or(6)).await)
}

#[derive(Debug, Deserialize)]
struct PeriodsParams {
    periods: Option<usize>,
}

async fn moving_average(
    State(state): State<AppState>,
    Query(params): Query<PeriodsParams>,
) -> Json<Vec<crate::application::stats::MovingAveragePoint>> {
    Json(state.stats.moving_average(params.periods.unwrap_or(3)).await)
}

async fn forecast(
    State(state): State<AppState>,
    Query(params): Query<MonthsParams>,
) -> Json<crate::application::stats::Forecast> {
    Json(state.stats.forecast(params.months.unwrap_or(3)).await)
}
