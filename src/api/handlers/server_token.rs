//! Server-token endpoint: the HTTP face of the request-scoped token cache.
//!
//! Server-side callers (and the page guard's test double) ask here for a
//! usable bundle. The response carries token material, so the route must
//! never be exposed past the same-origin CORS policy.

use crate::api::state::{now_ms, AppState};
use crate::auth::cache::{get_server_token, RequestContext};
use axum::{
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    Extension,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TokenRequest {
    #[serde(default)]
    pub force_refresh: bool,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub access_token: String,
    pub id_token: String,
    pub refresh_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_profile: Option<serde_json::Value>,
    /// Epoch seconds.
    pub expires_at: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TokenErrorResponse {
    pub error: String,
    pub message: String,
}

#[utoipa::path(
    post,
    path = "/api/server-token",
    responses(
        (status = 200, description = "A usable token bundle", body = TokenResponse),
        (status = 401, description = "No token available", body = TokenErrorResponse)
    ),
    tag = "session"
)]
pub async fn server_token(
    Extension(state): Extension<Arc<AppState>>,
    ctx: Option<Extension<RequestContext>>,
    headers: HeaderMap,
    body: Option<Json<TokenRequest>>,
) -> Response {
    let ctx = ctx.map_or_else(RequestContext::new, |Extension(ctx)| ctx);

    let forced_by_header = headers
        .get("x-auth-force-refresh")
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value == "1" || value.eq_ignore_ascii_case("true"));
    let forced_by_body = body.is_some_and(|Json(body)| body.force_refresh);
    if forced_by_header || forced_by_body {
        ctx.set_force_refresh();
    }

    let session = state.read_session(&headers);
    match get_server_token(&ctx, session.as_ref(), state.provider.as_ref(), now_ms()).await {
        Some(token) => Json(TokenResponse {
            access_token: token.access_token,
            id_token: token.id_token,
            refresh_token: token.refresh_token,
            full_profile: token.profile,
            expires_at: token.expires_at,
        })
        .into_response(),
        None => (
            StatusCode::UNAUTHORIZED,
            Json(TokenErrorResponse {
                error: "NoTokenAvailable".to_string(),
                message: "no usable token for this session".to_string(),
            }),
        )
            .into_response(),
    }
}
