//! Provider round-trip legs of the auth catch-all: sign-in redirect,
//! authorization-code callback, and sign-out.

use crate::api::handlers::with_set_cookies;
use crate::api::state::{now_ms, AppState};
use crate::auth::callbacks::{jwt_callback, redirect_callback, SessionEvent};
use crate::auth::cookies::{
    clear_cookie, clear_session_cookies, cookie_value, session_set_cookies, set_cookie,
    set_session_scoped_cookie,
};
use crate::auth::redirect::{resolve_safe_redirect_path, RedirectCandidate};
use crate::auth::token::ProviderGrant;
use axum::{
    extract::Query,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Redirect, Response},
    Extension,
};
use base64ct::{Base64UrlUnpadded, Encoding};
use rand::RngCore;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

const STATE_COOKIE_MAX_AGE_SECS: i64 = 10 * 60;
const CALLBACK_COOKIE_MAX_AGE_SECS: i64 = 15 * 60;

fn random_token() -> String {
    let mut raw = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut raw);
    Base64UrlUnpadded::encode_string(&raw)
}

fn signin_error_redirect(error: &str) -> Response {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("error", error)
        .finish();
    Redirect::temporary(&format!("/signin?{query}")).into_response()
}

#[derive(Debug, Deserialize)]
pub struct SigninQuery {
    pub redirect: Option<String>,
}

/// Starts the authorization-code round trip for `GET /api/auth/signin`.
pub async fn signin(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<SigninQuery>,
) -> Response {
    let safe = resolve_safe_redirect_path(
        &RedirectCandidate::from(query.redirect),
        &state.config.public_origin,
        "/",
    );

    let check = random_token();
    let redirect_uri = format!("{}/api/auth/callback", state.config.public_origin);
    let url = match state.provider.authorize_url(&redirect_uri, &check, None) {
        Ok(url) => url,
        Err(err) => {
            warn!("Failed to build authorize URL: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to start sign-in".to_string(),
            )
                .into_response();
        }
    };

    let production = state.config.production;
    let (csrf_cookie, _) = state.codec.mint_csrf();
    with_set_cookies(
        Redirect::temporary(&url).into_response(),
        vec![
            set_cookie(&state.names.state, &check, production, STATE_COOKIE_MAX_AGE_SECS),
            set_cookie(
                &state.names.callback,
                &safe,
                production,
                CALLBACK_COOKIE_MAX_AGE_SECS,
            ),
            // The CSRF cookie must stay valid as long as the session does,
            // or the update and sign-out legs start rejecting mid-session.
            set_session_scoped_cookie(&state.names.csrf, &csrf_cookie, production),
        ],
    )
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// Completes the round trip on `GET /api/auth/callback`: checks the
/// `state` cookie, exchanges the code, mints the session, and lands on the
/// intended path.
pub async fn callback(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<CallbackQuery>,
) -> Response {
    if let Some(error) = query.error {
        debug!("Provider returned an error: {error}");
        return signin_error_redirect(&error);
    }

    let cookie_header = headers
        .get(header::COOKIE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    let expected = cookie_value(cookie_header, &state.names.state);
    if expected.is_none() || expected != query.state {
        warn!("State parameter does not match the state cookie");
        return (StatusCode::BAD_REQUEST, "State mismatch".to_string()).into_response();
    }

    let Some(code) = query.code else {
        return (StatusCode::BAD_REQUEST, "Missing code".to_string()).into_response();
    };

    let redirect_uri = format!("{}/api/auth/callback", state.config.public_origin);
    let bundle = match state.provider.exchange_code(&code, &redirect_uri).await {
        Ok(bundle) => bundle,
        Err(err) => {
            warn!("Authorization-code exchange failed: {err}");
            return signin_error_redirect("exchange_failed");
        }
    };

    // Profile claims are a nicety, not a requirement.
    let profile = match state.provider.userinfo(&bundle.access_token).await {
        Ok(claims) => Some(claims),
        Err(err) => {
            debug!("Skipping profile fetch: {err}");
            None
        }
    };
    let subject = profile
        .as_ref()
        .and_then(|claims| claims.get("sub"))
        .and_then(|sub| sub.as_str())
        .map(str::to_string);

    let grant = ProviderGrant {
        access_token: bundle.access_token,
        id_token: bundle.id_token,
        refresh_token: bundle.refresh_token,
        expires_at: bundle.expires_at,
        subject,
        profile,
    };

    let token = match jwt_callback(
        None,
        SessionEvent::SignIn(grant),
        now_ms(),
        state.provider.as_ref(),
    )
    .await
    {
        Ok(Some(token)) => token,
        Ok(None) | Err(_) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to mint session".to_string(),
            )
                .into_response();
        }
    };

    let encoded = match state.codec.encode(&token) {
        Ok(encoded) => encoded,
        Err(err) => {
            warn!("Failed to encode session: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to persist session".to_string(),
            )
                .into_response();
        }
    };

    let production = state.config.production;
    let mut cookies = session_set_cookies(&encoded, &state.names, production);
    cookies.push(clear_cookie(&state.names.state, production));
    cookies.push(clear_cookie(&state.names.callback, production));

    let intended = cookie_value(cookie_header, &state.names.callback).unwrap_or_default();
    let location = redirect_callback(&intended, &state.config.public_origin);

    with_set_cookies(Redirect::temporary(&location).into_response(), cookies)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignoutBody {
    #[serde(default)]
    pub csrf_token: String,
}

/// Clears every auth cookie on `POST /api/auth/signout`. CSRF-checked like
/// the update leg.
pub async fn signout(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    body: Option<Json<SignoutBody>>,
) -> Response {
    let body = body.map(|Json(body)| body).unwrap_or_default();

    let cookie_header = headers
        .get(header::COOKIE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    let submitted = headers
        .get("xsrf-token")
        .and_then(|value| value.to_str().ok())
        .map_or_else(|| body.csrf_token.clone(), str::to_string);

    let csrf_cookie = cookie_value(cookie_header, &state.names.csrf).unwrap_or_default();
    if !state.codec.verify_csrf(&csrf_cookie, &submitted) {
        return (StatusCode::FORBIDDEN, "Invalid CSRF token".to_string()).into_response();
    }

    with_set_cookies(
        Json(serde_json::json!({ "url": "/signin" })).into_response(),
        clear_session_cookies(&state.names, state.config.production),
    )
}
