//! Route guarding for the page namespace.
//!
//! Two middleware layers run on every page navigation. The primary guard
//! resolves the session exactly once per request (idempotency marker on the
//! request context), enforces restricted-route redirects, writes refreshed
//! cookies back, and publishes the [`SsrAuthInfo`] snapshot for downstream
//! handlers. The residual guard catches what the primary one cannot:
//! sign-in loops, OAuth error bounces, and unmatched routes.

use crate::api::state::{now_ms, AppState};
use crate::auth::cache::{get_server_token, RequestContext};
use crate::auth::cookies::{
    clear_session_cookies, cookie_value, session_set_cookies, set_cookie,
};
use crate::auth::redirect::{resolve_safe_redirect_path, RedirectCandidate};
use axum::extract::Request;
use axum::http::{header, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use axum::Extension;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

const CALLBACK_COOKIE_MAX_AGE_SECS: i64 = 15 * 60;

/// Per-navigation auth snapshot, written once by the guard.
///
/// The full form (with the access token) exists server-side only;
/// [`SsrAuthInfo::redacted`] is what may reach a client.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SsrAuthInfo {
    pub account_id: Option<String>,
    pub is_authenticated: bool,
    pub token_available: bool,
    pub token_expired: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
}

impl SsrAuthInfo {
    /// The client-safe variant: identical, minus the access token.
    #[must_use]
    pub fn redacted(&self) -> Self {
        Self {
            access_token: None,
            ..self.clone()
        }
    }
}

/// Paths the guard never touches: static assets and well-known browser
/// requests.
#[must_use]
pub fn is_ignored_path(path: &str) -> bool {
    path.starts_with("/_assets/")
        || path.starts_with("/.well-known/")
        || matches!(path, "/favicon.ico" | "/robots.txt" | "/sitemap.xml")
}

/// Primary guard layer. Applied to the page router only.
pub async fn auth_guard(
    Extension(state): Extension<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    if is_ignored_path(&path) || path == "/signin" {
        request.extensions_mut().insert(RequestContext::new());
        return next.run(request).await;
    }

    let ctx = request
        .extensions()
        .get::<RequestContext>()
        .cloned()
        .unwrap_or_default();
    if !ctx.mark_guarded() {
        return next.run(request).await;
    }
    request.extensions_mut().insert(ctx.clone());

    let restricted = state.config.is_restricted(&path);
    let session = state.read_session(request.headers());
    let structurally_present = state.has_session_cookie(request.headers());

    let Some(session_token) = session else {
        if structurally_present {
            // Cookie slots exist but do not decode: the session shape is
            // broken, not merely absent.
            warn!(%path, "Session cookie present but undecodable");
            if restricted {
                return with_cookies(
                    StatusCode::UNAUTHORIZED.into_response(),
                    clear_session_cookies(&state.names, state.config.production),
                );
            }
            let response = next.run(request).await;
            return with_cookies(
                response,
                clear_session_cookies(&state.names, state.config.production),
            );
        }

        if restricted {
            return redirect_to_signin(&state, &path);
        }
        request.extensions_mut().insert(SsrAuthInfo::default());
        return next.run(request).await;
    };

    // A provider-side refresh error on the session means the refresh token
    // is dead; sign the session out rather than looping on it.
    if session_token.has_error() {
        debug!(%path, "Session carries a refresh error, signing out");
        let cleared = clear_session_cookies(&state.names, state.config.production);
        if restricted {
            return with_cookies(redirect_to_signin(&state, &path), cleared);
        }
        request.extensions_mut().insert(SsrAuthInfo::default());
        let response = next.run(request).await;
        return with_cookies(response, cleared);
    }

    let now = now_ms();
    match get_server_token(&ctx, Some(&session_token), state.provider.as_ref(), now).await {
        Some(token) => {
            let refreshed = token != session_token;
            let info = SsrAuthInfo {
                account_id: token.subject.clone(),
                is_authenticated: true,
                token_available: true,
                token_expired: token.is_expired(now),
                access_token: Some(token.access_token.clone()),
            };
            request.extensions_mut().insert(info);

            let mut response = next.run(request).await;
            if refreshed {
                // Cookie catch-up: the browser's copy is now stale.
                if let Ok(encoded) = state.codec.encode(&token) {
                    response = with_cookies(
                        response,
                        session_set_cookies(&encoded, &state.names, state.config.production),
                    );
                }
            }
            response
        }
        None => {
            let cleared = clear_session_cookies(&state.names, state.config.production);
            if restricted {
                return with_cookies(redirect_to_signin(&state, &path), cleared);
            }
            request.extensions_mut().insert(SsrAuthInfo::default());
            let response = next.run(request).await;
            with_cookies(response, cleared)
        }
    }
}

/// Residual guard layer: sign-in loop breaking and unmatched-route
/// handling. Runs inside [`auth_guard`].
pub async fn residual_guard(
    Extension(state): Extension<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    if path == "/signin" {
        let query = request.uri().query().unwrap_or_default();
        let has_oauth_error = url::form_urlencoded::parse(query.as_bytes())
            .any(|(key, _)| key == "error");

        // An OAuth error bounced back to the sign-in page would loop
        // forever through the provider; break the loop with a forced
        // sign-out.
        if has_oauth_error {
            warn!("OAuth error on sign-in page, forcing sign-out");
            return with_cookies(
                Redirect::temporary("/signin").into_response(),
                clear_session_cookies(&state.names, state.config.production),
            );
        }

        let session = state.read_session(request.headers());
        if session.is_some_and(|token| !token.has_error()) {
            let intended = request
                .headers()
                .get(header::COOKIE)
                .and_then(|cookie| cookie.to_str().ok())
                .and_then(|cookie| cookie_value(cookie, &state.names.callback));
            let target = resolve_safe_redirect_path(
                &RedirectCandidate::from(intended),
                &state.config.public_origin,
                "/",
            );
            // Never bounce back onto the sign-in page itself.
            let target = if target.starts_with("/signin") {
                "/".to_string()
            } else {
                target
            };
            return Redirect::temporary(&target).into_response();
        }
    }

    let response = next.run(request).await;
    if response.status() == StatusCode::NOT_FOUND && path != "/not-found" {
        return Redirect::temporary("/not-found").into_response();
    }
    response
}

fn redirect_to_signin(state: &AppState, original_path: &str) -> Response {
    let safe = resolve_safe_redirect_path(
        &RedirectCandidate::Single(original_path.to_string()),
        &state.config.public_origin,
        "/",
    );
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("redirect", &safe)
        .finish();
    // Remember the intended landing path for restoration after sign-in.
    let callback = set_cookie(
        &state.names.callback,
        &safe,
        state.config.production,
        CALLBACK_COOKIE_MAX_AGE_SECS,
    );
    with_cookies(
        Redirect::temporary(&format!("/signin?{query}")).into_response(),
        vec![callback],
    )
}

fn with_cookies(mut response: Response, cookies: Vec<String>) -> Response {
    for cookie in cookies {
        if let Ok(value) = HeaderValue::from_str(&cookie) {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
    }
    response
}
