//! Axum router wiring.
//!
//! `/ws` answers 404 unless the bastion serves websocket consumers.

use axum::{
    routing::{get, post},
    Router,
};

use crate::{app_state::AppState, host, ops, transport::websocket};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/dispatch", post(host::dispatch))
        .route("/ws", get(websocket::ws_upgrade))
        .route("/healthz", get(ops::healthz))
        .with_state(state)
}
