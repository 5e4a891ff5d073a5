//! Request Handlers
//!
//! Thin adapters from HTTP onto [`BingoHall`] operations.

use super::{errors::ApiError, middleware::RequestId, models::*};
use crate::bingo::types::{CardId, MarkOutcome, PlayerView, RoundSnapshot, SeatTicket, TableId};
use crate::errors::LedgerResult;
use crate::hall::{AdminSummary, BingoHall};
use crate::ledger::{PayoutOutcome, PlayerId, Wallet, WithdrawalId, WithdrawalRequest};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use std::sync::Arc;

/// Shared application state
pub struct AppState {
    pub hall: Arc<BingoHall>,
    /// `None` leaves the admin routes open
    pub admin_key: Option<String>,
    pub version: String,
}

type ApiResult<T> = Result<Json<T>, ApiError>;

fn parse_phone(request_id: &RequestId, phone: &str) -> Result<PlayerId, ApiError> {
    PlayerId::parse(phone).map_err(|e| ApiError::from_ledger(request_id.0.clone(), e))
}

/// Run a ledger operation on the blocking pool; the store may hit disk.
async fn ledger_call<T, F>(state: &AppState, request_id: &RequestId, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&BingoHall) -> LedgerResult<T> + Send + 'static,
{
    let hall = state.hall.clone();
    match tokio::task::spawn_blocking(move || f(&hall)).await {
        Ok(result) => result.map_err(|e| ApiError::from_ledger(request_id.0.clone(), e)),
        Err(e) => Err(ApiError::internal_error(
            request_id.0.clone(),
            format!("Ledger task failed: {}", e),
        )),
    }
}

fn parse_table_id(request_id: &RequestId, raw: &str) -> Result<TableId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::bad_request(request_id.0.clone(), format!("Invalid table id '{}'", raw)))
}

/// GET /health
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "Running".to_string(),
        version: state.version.clone(),
        tables: state.hall.list_tables().await.len(),
    })
}

/// GET /metrics
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> String {
    state.hall.metrics().render()
}

/// POST /players
pub async fn register_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Json(body): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<Wallet>), ApiError> {
    let wallet = ledger_call(&state, &request_id, move |hall| hall.register_player(&body.phone)).await?;
    Ok((StatusCode::OK, Json(wallet)))
}

/// GET /players/:phone/wallet
pub async fn wallet_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(phone): Path<String>,
) -> ApiResult<Wallet> {
    let player = parse_phone(&request_id, &phone)?;
    ledger_call(&state, &request_id, move |hall| hall.wallet(&player))
        .await
        .map(Json)
}

/// GET /players/:phone/seat
pub async fn seat_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(phone): Path<String>,
) -> ApiResult<PlayerView> {
    let player = parse_phone(&request_id, &phone)?;
    state
        .hall
        .player_view(&player)
        .await
        .map(Json)
        .map_err(|e| ApiError::from_round(request_id.0, e))
}

/// POST /players/:phone/join
pub async fn join_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(phone): Path<String>,
    Json(body): Json<JoinRequest>,
) -> ApiResult<SeatTicket> {
    let player = parse_phone(&request_id, &phone)?;
    state
        .hall
        .join_table(&player, body.tier)
        .await
        .map(Json)
        .map_err(|e| ApiError::from_round(request_id.0, e))
}

/// POST /players/:phone/mark
pub async fn mark_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(phone): Path<String>,
    Json(body): Json<MarkRequest>,
) -> ApiResult<MarkOutcome> {
    let player = parse_phone(&request_id, &phone)?;
    state
        .hall
        .mark_cell(&player, CardId(body.card_id), body.cell)
        .await
        .map(Json)
        .map_err(|e| ApiError::from_round(request_id.0, e))
}

/// POST /players/:phone/unmark
pub async fn unmark_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(phone): Path<String>,
    Json(body): Json<MarkRequest>,
) -> ApiResult<MarkOutcome> {
    let player = parse_phone(&request_id, &phone)?;
    state
        .hall
        .unmark_cell(&player, CardId(body.card_id), body.cell)
        .await
        .map(Json)
        .map_err(|e| ApiError::from_round(request_id.0, e))
}

/// POST /players/:phone/auto-mark
pub async fn auto_mark_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(phone): Path<String>,
    Json(body): Json<AutoMarkRequest>,
) -> ApiResult<AckResponse> {
    let player = parse_phone(&request_id, &phone)?;
    state
        .hall
        .set_auto_mark(&player, body.enabled)
        .await
        .map(|_| Json(AckResponse::ok()))
        .map_err(|e| ApiError::from_round(request_id.0, e))
}

/// POST /players/:phone/withdrawals
pub async fn withdrawal_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(phone): Path<String>,
    Json(body): Json<WithdrawalBody>,
) -> Result<(StatusCode, Json<WithdrawalRequest>), ApiError> {
    let player = parse_phone(&request_id, &phone)?;
    let request = ledger_call(&state, &request_id, move |hall| {
        hall.request_withdrawal(&player, body.amount, &body.destination)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(request)))
}

/// GET /tables
pub async fn tables_handler(State(state): State<Arc<AppState>>) -> Json<Vec<RoundSnapshot>> {
    Json(state.hall.list_tables().await)
}

/// GET /tables/:id
pub async fn table_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(table_id): Path<String>,
) -> ApiResult<RoundSnapshot> {
    let table_id = parse_table_id(&request_id, &table_id)?;
    state
        .hall
        .table_snapshot(&table_id)
        .await
        .map(Json)
        .map_err(|e| ApiError::from_round(request_id.0, e))
}

/// POST /admin/players/:phone/verify
pub async fn verify_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(phone): Path<String>,
) -> ApiResult<AckResponse> {
    let player = parse_phone(&request_id, &phone)?;
    state
        .hall
        .verify_player(&player)
        .await
        .map(|_| Json(AckResponse::ok()))
        .map_err(|e| ApiError::from_round(request_id.0, e))
}

/// POST /admin/players/:phone/revoke
pub async fn revoke_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(phone): Path<String>,
) -> ApiResult<AckResponse> {
    let player = parse_phone(&request_id, &phone)?;
    state
        .hall
        .revoke_verification(&player)
        .await
        .map(|_| Json(AckResponse::ok()))
        .map_err(|e| ApiError::from_round(request_id.0, e))
}

/// POST /admin/players/:phone/adjust
pub async fn adjust_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(phone): Path<String>,
    Json(body): Json<AdjustRequest>,
) -> ApiResult<Wallet> {
    let player = parse_phone(&request_id, &phone)?;
    let note = if body.note.is_empty() {
        "admin adjustment".to_string()
    } else {
        body.note
    };
    ledger_call(&state, &request_id, move |hall| hall.adjust_balance(&player, body.delta, &note))
        .await
        .map(Json)
}

/// POST /admin/tables/:id/reset
pub async fn reset_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(table_id): Path<String>,
) -> ApiResult<RoundSnapshot> {
    let table_id = parse_table_id(&request_id, &table_id)?;
    state
        .hall
        .reset_table(&table_id)
        .await
        .map(Json)
        .map_err(|e| ApiError::from_round(request_id.0, e))
}

/// POST /admin/withdrawals/:id/paid
///
/// Paying twice is not an error; the second call reports `already_paid`.
pub async fn mark_paid_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(withdrawal_id): Path<String>,
) -> ApiResult<PayoutResponse> {
    let id: WithdrawalId = withdrawal_id.parse().map_err(|_| {
        ApiError::bad_request(
            request_id.0.clone(),
            format!("Invalid withdrawal id '{}'", withdrawal_id),
        )
    })?;
    let outcome = ledger_call(&state, &request_id, move |hall| hall.mark_withdrawal_paid(&id)).await?;

    Ok(Json(match outcome {
        PayoutOutcome::Paid(withdrawal) => PayoutResponse {
            withdrawal,
            already_paid: false,
        },
        PayoutOutcome::AlreadyPaid(withdrawal) => PayoutResponse {
            withdrawal,
            already_paid: true,
        },
    }))
}

/// GET /admin/withdrawals
pub async fn list_withdrawals_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Query(query): Query<WithdrawalQuery>,
) -> ApiResult<Vec<WithdrawalRequest>> {
    ledger_call(&state, &request_id, move |hall| hall.list_withdrawals(query.status))
        .await
        .map(Json)
}

/// GET /admin/summary
pub async fn summary_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<AdminSummary> {
    state
        .hall
        .admin_summary()
        .await
        .map(Json)
        .map_err(|e| ApiError::from_ledger(request_id.0, e))
}
