//! Auth actions: login, logout-url, and register.

use crate::api::handlers::with_set_cookies;
use crate::api::state::AppState;
use crate::auth::cookies::set_cookie;
use crate::auth::redirect::{resolve_safe_redirect_path, RedirectCandidate};
use axum::{
    extract::Query,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Redirect, Response},
    Extension,
};
use base64ct::{Base64UrlUnpadded, Encoding};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;
use utoipa::ToSchema;

const STATE_COOKIE_MAX_AGE_SECS: i64 = 10 * 60;

#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    pub redirect: Option<String>,
}

#[utoipa::path(
    get,
    path = "/auth/login",
    params(("redirect" = Option<String>, Query, description = "Return path after sign-in")),
    responses(
        (status = 307, description = "Redirect to the sign-in page with a safe return path")
    ),
    tag = "auth"
)]
pub async fn login(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<LoginQuery>,
) -> Response {
    let safe = resolve_safe_redirect_path(
        &RedirectCandidate::from(query.redirect),
        &state.config.public_origin,
        "/",
    );
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("redirect", &safe)
        .finish();
    Redirect::temporary(&format!("/signin?{query}")).into_response()
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LogoutUrlResponse {
    pub logout_url: String,
    pub requires_server_logout: bool,
}

#[utoipa::path(
    get,
    path = "/auth/logout-url",
    responses(
        (status = 200, description = "Provider logout URL for this session", body = LogoutUrlResponse)
    ),
    tag = "auth"
)]
pub async fn logout_url(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    // The id token stays server-side; only the assembled URL leaves.
    let session = state.read_session(&headers);
    let id_token = session
        .map(|token| token.id_token)
        .filter(|id_token| !id_token.is_empty());

    let Some(id_token) = id_token else {
        return Json(LogoutUrlResponse {
            logout_url: "/signin".to_string(),
            requires_server_logout: false,
        })
        .into_response();
    };

    let post_logout = format!("{}/signin", state.config.public_origin);
    match state.provider.logout_url(&id_token, &post_logout) {
        Ok(logout_url) => Json(LogoutUrlResponse {
            logout_url,
            requires_server_logout: true,
        })
        .into_response(),
        Err(err) => {
            warn!("Failed to build logout URL: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to build logout URL".to_string(),
            )
                .into_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/auth/register",
    responses(
        (status = 307, description = "Redirect to the provider's sign-up variant")
    ),
    tag = "auth"
)]
pub async fn register(Extension(state): Extension<Arc<AppState>>) -> Response {
    let mut raw = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut raw);
    let check = Base64UrlUnpadded::encode_string(&raw);

    let redirect_uri = format!("{}/api/auth/callback", state.config.public_origin);
    match state
        .provider
        .authorize_url(&redirect_uri, &check, Some("signup"))
    {
        Ok(url) => with_set_cookies(
            Redirect::temporary(&url).into_response(),
            vec![set_cookie(
                &state.names.state,
                &check,
                state.config.production,
                STATE_COOKIE_MAX_AGE_SECS,
            )],
        ),
        Err(err) => {
            warn!("Failed to build authorize URL: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to start registration".to_string(),
            )
                .into_response()
        }
    }
}
