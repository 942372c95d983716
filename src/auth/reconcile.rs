//! Cookie reconciliation after a server-initiated refresh.
//!
//! The browser's session cookie only updates when the session endpoint
//! writes it. After this service refreshes a token outside that endpoint,
//! [`persist_session_refresh`] replays the refresh through the session
//! endpoint itself, with headers forged to look same-origin, and relays
//! every `Set-Cookie` the endpoint produces back to the original response.

use crate::auth::cookies::{build_auth_cookie_header, cookie_value, csrf_token_half, CookieNames};
use crate::auth::error::AuthError;
use reqwest::header::{HeaderMap, SET_COOKIE};
use serde_json::json;
use tracing::{info_span, Instrument};
use url::Url;

/// Inputs for one reconciliation pass, borrowed from the inbound request.
pub struct ReconcileRequest<'a> {
    /// The origin browsers see, e.g. `https://app.example`.
    pub public_origin: &'a str,
    /// Where this service actually listens, e.g. `http://127.0.0.1:8080`.
    pub local_base: &'a str,
    /// The inbound `Cookie` header, if any.
    pub cookie_header: Option<&'a str>,
    pub names: &'a CookieNames,
}

/// What the session endpoint answered: the updated session body and the
/// verbatim `Set-Cookie` headers to relay.
#[derive(Debug)]
pub struct ReconcileOutcome {
    pub session: serde_json::Value,
    pub set_cookies: Vec<String>,
}

/// Push a server-side refresh back into the browser-held session cookie.
///
/// # Errors
/// Any transport or non-success response surfaces as
/// [`AuthError::UpstreamFetch`]; the caller decides whether that is fatal
/// for its own operation.
pub async fn persist_session_refresh(
    http: &reqwest::Client,
    request: ReconcileRequest<'_>,
) -> Result<ReconcileOutcome, AuthError> {
    let cookie_header = build_auth_cookie_header(request.cookie_header, request.names);

    let csrf_token = cookie_value(&cookie_header, &request.names.csrf)
        .as_deref()
        .and_then(csrf_token_half)
        .map(str::to_string)
        .unwrap_or_default();

    let origin = Url::parse(request.public_origin).map_err(|err| AuthError::UpstreamFetch {
        status: None,
        message: format!("invalid public origin: {err}"),
    })?;
    let forged_host = origin.host_str().map(|host| match origin.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    });
    let forged_host = forged_host.unwrap_or_default();

    let url = format!(
        "{}/api/auth/session",
        request.local_base.trim_end_matches('/')
    );
    let body = json!({
        "csrfToken": csrf_token,
        "data": { "forceRefresh": true },
        "json": true,
    });

    let span = info_span!("session.reconcile", http.method = "POST", url = %url);
    let response = http
        .post(&url)
        .header(reqwest::header::HOST, forged_host.as_str())
        .header("x-forwarded-host", forged_host.as_str())
        .header("x-forwarded-proto", origin.scheme())
        .header(reqwest::header::ORIGIN, request.public_origin)
        .header(reqwest::header::REFERER, request.public_origin)
        .header(reqwest::header::COOKIE, cookie_header)
        .header("xsrf-token", csrf_token.as_str())
        .json(&body)
        .send()
        .instrument(span)
        .await
        .map_err(|err| AuthError::from_upstream(&err))?;

    let status = response.status();
    if !status.is_success() {
        return Err(AuthError::UpstreamFetch {
            status: Some(status.as_u16()),
            message: "session update rejected".to_string(),
        });
    }

    let set_cookies = collect_set_cookies(response.headers());

    let session = response
        .json()
        .await
        .map_err(|err| AuthError::UpstreamFetch {
            status: None,
            message: err.to_string(),
        })?;

    Ok(ReconcileOutcome {
        session,
        set_cookies,
    })
}

/// Every `Set-Cookie` value, in response order, exactly once each.
fn collect_set_cookies(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .map(str::to_string)
        .collect()
}
