//! Route Definitions
//!
//! Maps URLs to handlers with type-safe routing.

use super::{handlers::*, middleware::require_admin_key, websocket::websocket_handler};
use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Build the API router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    let admin = Router::new()
        .route("/players/:phone/verify", post(verify_handler))
        .route("/players/:phone/revoke", post(revoke_handler))
        .route("/players/:phone/adjust", post(adjust_handler))
        .route("/tables/:id/reset", post(reset_handler))
        .route("/withdrawals/:id/paid", post(mark_paid_handler))
        .route("/withdrawals", get(list_withdrawals_handler))
        .route("/summary", get(summary_handler))
        .route_layer(from_fn_with_state(state.clone(), require_admin_key));

    let mut router = Router::new().route("/health", get(health_handler));
    if state.hall.config().monitoring.enable_metrics {
        router = router.route("/metrics", get(metrics_handler));
    }

    router
        // Players
        .route("/players", post(register_handler))
        .route("/players/:phone/wallet", get(wallet_handler))
        .route("/players/:phone/seat", get(seat_handler))
        .route("/players/:phone/join", post(join_handler))
        .route("/players/:phone/mark", post(mark_handler))
        .route("/players/:phone/unmark", post(unmark_handler))
        .route("/players/:phone/auto-mark", post(auto_mark_handler))
        .route("/players/:phone/withdrawals", post(withdrawal_handler))
        // Tables
        .route("/tables", get(tables_handler))
        .route("/tables/:id", get(table_handler))
        // Live round events
        .route("/ws", get(websocket_handler))
        .nest("/admin", admin)
        .with_state(state)
}
