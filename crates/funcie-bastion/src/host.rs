//! HTTP dispatch host.
//!
//! `POST /dispatch` takes a JSON message, runs it through the bastion's
//! message processor, and returns the JSON response.
//! - unparsable body: 400 `invalid request: ...`
//! - processor failure: 500 `internal server error: ...`
//! - a proxied failure (for example no active consumer) is still a 200
//!   with the error carried on the response.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

use funcie_core::Message;

use crate::app_state::AppState;

pub async fn dispatch(State(app): State<AppState>, body: Bytes) -> Response {
    let message = match Message::from_slice(&body) {
        Ok(m) => m,
        Err(e) => {
            tracing::debug!(error = %e, "rejecting dispatch body");
            return (StatusCode::BAD_REQUEST, format!("invalid request: {e}")).into_response();
        }
    };

    let id = message.id.clone();
    let kind = message.kind;
    let response = match app.processor().process_message(message).await {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(message_id = %id, kind = %kind, error = %e, "dispatch failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, format!("internal server error: {e}"))
                .into_response();
        }
    };

    match response.to_json() {
        Ok(json) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            json,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(message_id = %id, error = %e, "response encoding failed");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("internal server error: {e}")).into_response()
        }
    }
}
