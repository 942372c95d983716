//! Force-refresh endpoint: trigger cookie reconciliation on demand.

use crate::api::handlers::with_set_cookies;
use crate::api::state::AppState;
use crate::auth::error::AuthError;
use crate::auth::reconcile::{persist_session_refresh, ReconcileRequest};
use axum::{
    http::{header, HeaderMap},
    response::{IntoResponse, Json, Response},
    Extension,
};
use std::sync::Arc;
use tracing::warn;

#[utoipa::path(
    post,
    path = "/api/force-refresh",
    responses(
        (status = 200, description = "Whether the session cookies were refreshed")
    ),
    tag = "session"
)]
pub async fn force_refresh(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    let cookie_header = headers
        .get(header::COOKIE)
        .and_then(|value| value.to_str().ok());

    let outcome = persist_session_refresh(
        &state.http,
        ReconcileRequest {
            public_origin: &state.config.public_origin,
            local_base: &state.local_base,
            cookie_header,
            names: &state.names,
        },
    )
    .await;

    match outcome {
        Ok(outcome) => with_set_cookies(
            Json(serde_json::json!({
                "refreshed": true,
                "session": outcome.session,
            }))
            .into_response(),
            outcome.set_cookies,
        ),
        Err(err) => {
            warn!("Session persist failed: {err}");

            let debug_requested = headers
                .get("x-debug-force-refresh")
                .and_then(|value| value.to_str().ok())
                .is_some_and(|value| value == "1");
            if !debug_requested {
                return Json(serde_json::json!({ "refreshed": false })).into_response();
            }

            let (status, message) = match err {
                AuthError::UpstreamFetch { status, message } => (status, message),
                other => (None, other.to_string()),
            };
            Json(serde_json::json!({
                "refreshed": false,
                "error": "persist_failed",
                "debug": { "status": status, "message": message },
            }))
            .into_response()
        }
    }
}
