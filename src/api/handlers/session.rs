//! The session endpoints of the auth catch-all.
//!
//! `GET /api/auth/session` is the ordinary read: the token runs through the
//! callback state machine and any refresh it performs is written back to
//! the cookies. `POST /api/auth/session` is the CSRF-checked update leg the
//! cookie reconciler calls with a force-refresh flag.

use crate::api::handlers::with_set_cookies;
use crate::api::state::{now_ms, AppState};
use crate::auth::callbacks::{jwt_callback, project_session, SessionEvent};
use crate::auth::cookies::{
    clear_session_cookies, cookie_value, session_set_cookies, set_session_scoped_cookie,
};
use crate::auth::token::SessionDescriptor;
use axum::{
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    Extension,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;
use utoipa::ToSchema;

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBody {
    #[serde(default)]
    pub csrf_token: String,
    #[serde(default)]
    pub data: UpdateData,
    #[serde(default)]
    pub json: bool,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateData {
    #[serde(default)]
    pub force_refresh: bool,
}

#[utoipa::path(
    get,
    path = "/api/auth/session",
    responses(
        (status = 200, description = "Current session projection", body = SessionDescriptor)
    ),
    tag = "session"
)]
pub async fn get_session(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    let session = state.read_session(&headers);
    let before = session.clone();

    // A new browser session keeps the long-lived session cookie but loses
    // the session-scoped CSRF cookie. Re-mint it here so the update and
    // sign-out legs stay usable.
    let cookie_header = headers
        .get(header::COOKIE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    let mut minted = Vec::new();
    if cookie_value(cookie_header, &state.names.csrf).is_none() {
        let (csrf_cookie, _) = state.codec.mint_csrf();
        minted.push(set_session_scoped_cookie(
            &state.names.csrf,
            &csrf_cookie,
            state.config.production,
        ));
    }

    let response =
        match jwt_callback(session, SessionEvent::Read, now_ms(), state.provider.as_ref()).await
        {
        Ok(Some(token)) => {
            let projection = Json(project_session(Some(&token))).into_response();
            if before.as_ref() == Some(&token) {
                projection
            } else {
                match state.codec.encode(&token) {
                    Ok(encoded) => with_set_cookies(
                        projection,
                        session_set_cookies(&encoded, &state.names, state.config.production),
                    ),
                    Err(err) => {
                        warn!("Failed to encode refreshed session: {err}");
                        projection
                    }
                }
            }
        }
        Ok(None) => Json(project_session(None)).into_response(),
        Err(err) => {
            // An ordinary read degrades rather than failing the request;
            // the dead session is cleared so the next read starts clean.
            warn!("Session read failed: {err}");
            with_set_cookies(
                Json(project_session(None)).into_response(),
                clear_session_cookies(&state.names, state.config.production),
            )
        }
    };

    with_set_cookies(response, minted)
}

#[utoipa::path(
    post,
    path = "/api/auth/session",
    responses(
        (status = 200, description = "Updated session projection", body = SessionDescriptor),
        (status = 403, description = "CSRF token mismatch"),
        (status = 401, description = "Forced refresh without a usable session")
    ),
    tag = "session"
)]
pub async fn update_session(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    body: Option<Json<UpdateBody>>,
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

    let session = state.read_session(&headers);
    let event = if body.data.force_refresh {
        SessionEvent::ForceRefresh
    } else {
        SessionEvent::Read
    };

    match jwt_callback(session, event, now_ms(), state.provider.as_ref()).await {
        Ok(Some(token)) => match state.codec.encode(&token) {
            Ok(encoded) => with_set_cookies(
                Json(project_session(Some(&token))).into_response(),
                session_set_cookies(&encoded, &state.names, state.config.production),
            ),
            Err(err) => {
                warn!("Failed to encode updated session: {err}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to persist session".to_string(),
                )
                    .into_response()
            }
        },
        Ok(None) => Json(project_session(None)).into_response(),
        Err(err) => {
            warn!("Session update failed: {err}");
            with_set_cookies(
                (StatusCode::UNAUTHORIZED, err.to_string()).into_response(),
                clear_session_cookies(&state.names, state.config.production),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::state::GatewayConfig;
    use crate::auth::cookies::{CookieNames, SessionCodec};
    use crate::auth::error::AuthError;
    use crate::auth::refresh::{BoxFuture, ProviderApi, RefreshedBundle};
    use crate::auth::token::SessionToken;
    use http_body_util::BodyExt;
    use secrecy::SecretString;

    struct StubProvider {
        fail: bool,
    }

    impl ProviderApi for StubProvider {
        fn refresh<'a>(
            &'a self,
            refresh_token: &'a str,
        ) -> BoxFuture<'a, Result<RefreshedBundle, AuthError>> {
            let fail = self.fail;
            let refresh_token = refresh_token.to_string();
            Box::pin(async move {
                if fail {
                    return Err(AuthError::RefreshAccessToken);
                }
                Ok(RefreshedBundle {
                    access_token: "refreshed-at".to_string(),
                    id_token: "refreshed-idt".to_string(),
                    refresh_token,
                    expires_at: 4_000_000_000,
                })
            })
        }

        fn userinfo<'a>(
            &'a self,
            _access_token: &'a str,
        ) -> BoxFuture<'a, Result<serde_json::Value, AuthError>> {
            Box::pin(async { Ok(serde_json::json!({"name": "Ada"})) })
        }

        fn exchange_code<'a>(
            &'a self,
            _code: &'a str,
            _redirect_uri: &'a str,
        ) -> BoxFuture<'a, Result<RefreshedBundle, AuthError>> {
            Box::pin(async { Err(AuthError::RefreshAccessToken) })
        }

        fn authorize_url(
            &self,
            _redirect_uri: &str,
            _state: &str,
            _screen_hint: Option<&str>,
        ) -> anyhow::Result<String> {
            Ok("https://stub/authorize".to_string())
        }

        fn logout_url(
            &self,
            _id_token_hint: &str,
            _post_logout_redirect_uri: &str,
        ) -> anyhow::Result<String> {
            Ok("https://stub/logout".to_string())
        }
    }

    fn state(fail_refresh: bool) -> Arc<AppState> {
        let config = GatewayConfig::new(
            "https://tenant.auth.example".to_string(),
            "client-id".to_string(),
            SecretString::from("client-secret".to_string()),
            "https://app.example".to_string(),
            SecretString::from("encryption-secret".to_string()),
        );
        Arc::new(AppState {
            names: CookieNames::for_env(false),
            codec: SessionCodec::new(SecretString::from("encryption-secret".to_string())),
            provider: Arc::new(StubProvider { fail: fail_refresh }),
            http: reqwest::Client::new(),
            local_base: "http://127.0.0.1:0".to_string(),
            config,
        })
    }

    fn token(expires_at: i64) -> SessionToken {
        SessionToken {
            access_token: "at".to_string(),
            id_token: "idt".to_string(),
            refresh_token: "rt".to_string(),
            expires_at,
            subject: Some("auth0|abc".to_string()),
            profile: None,
            error: None,
        }
    }

    fn headers_with_cookie(cookie: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, cookie.parse().unwrap());
        headers
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn set_cookies(response: &Response) -> Vec<String> {
        response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .map(str::to_string)
            .collect()
    }

    #[tokio::test]
    async fn get_without_session_returns_empty_projection() {
        let response = get_session(Extension(state(false)), HeaderMap::new()).await;
        assert_eq!(response.status(), StatusCode::OK);
        // Only the CSRF cookie gets minted; no session slot is touched.
        let cookies = set_cookies(&response);
        assert!(cookies.iter().all(|c| c.starts_with("pordisto.csrf-token=")));
        let json = body_json(response).await;
        assert_eq!(json, serde_json::json!({}));
    }

    #[tokio::test]
    async fn get_with_fresh_session_writes_no_cookies() {
        let st = state(true);
        let (csrf_cookie, _) = st.codec.mint_csrf();
        let far = now_ms() / 1000 + 86_400;
        let encoded = st.codec.encode(&token(far)).unwrap();
        let headers = headers_with_cookie(&format!(
            "pordisto.session-token={encoded}; pordisto.csrf-token={csrf_cookie}"
        ));

        let response = get_session(Extension(st), headers).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(set_cookies(&response).is_empty());
        let json = body_json(response).await;
        assert_eq!(json["sub"], "auth0|abc");
        assert!(json.get("accessToken").is_none());
    }

    #[tokio::test]
    async fn expired_csrf_cookie_is_reminted_and_refresh_recovers() {
        // A session far younger than its cookie: the CSRF cookie has
        // expired (absent), the session cookie has not. The read re-mints
        // the CSRF cookie, and the reminted value unlocks the update leg.
        let st = state(false);
        let far = now_ms() / 1000 + 86_400;
        let encoded = st.codec.encode(&token(far)).unwrap();
        let headers = headers_with_cookie(&format!("pordisto.session-token={encoded}"));

        let response = get_session(Extension(st.clone()), headers).await;
        assert_eq!(response.status(), StatusCode::OK);
        let reminted = set_cookies(&response)
            .into_iter()
            .find_map(|c| {
                c.strip_prefix("pordisto.csrf-token=")
                    .and_then(|rest| rest.split(';').next().map(str::to_string))
            })
            .expect("a reminted CSRF cookie");
        // Browser-session scoped, not back on a ten-minute timer.
        assert!(!reminted.is_empty());

        let csrf_token = reminted.split('|').next().unwrap_or_default().to_string();
        let headers = headers_with_cookie(&format!(
            "pordisto.session-token={encoded}; pordisto.csrf-token={reminted}"
        ));
        let body = UpdateBody {
            csrf_token,
            data: UpdateData {
                force_refresh: true,
            },
            json: true,
        };
        let response = update_session(Extension(st), headers, Some(Json(body))).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn get_with_expired_session_refreshes_and_sets_cookies() {
        let st = state(false);
        let encoded = st.codec.encode(&token(1_000)).unwrap();
        let headers = headers_with_cookie(&format!("pordisto.session-token={encoded}"));

        let response = get_session(Extension(st), headers).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(set_cookies(&response)
            .iter()
            .any(|c| c.starts_with("pordisto.session-token=")));
        let json = body_json(response).await;
        assert_eq!(json["expiresAt"], 4_000_000_000_i64);
    }

    #[tokio::test]
    async fn post_without_csrf_is_forbidden() {
        let response = update_session(
            Extension(state(false)),
            HeaderMap::new(),
            Some(Json(UpdateBody::default())),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn post_with_valid_csrf_forces_a_refresh() {
        let st = state(false);
        let (csrf_cookie, csrf_token) = st.codec.mint_csrf();
        let far = now_ms() / 1000 + 86_400;
        let encoded = st.codec.encode(&token(far)).unwrap();
        let headers = headers_with_cookie(&format!(
            "pordisto.session-token={encoded}; pordisto.csrf-token={csrf_cookie}"
        ));

        let body = UpdateBody {
            csrf_token,
            data: UpdateData {
                force_refresh: true,
            },
            json: true,
        };
        let response = update_session(Extension(st), headers, Some(Json(body))).await;
        assert_eq!(response.status(), StatusCode::OK);
        // Forced refresh ignores freshness and rewrites the cookie.
        assert!(set_cookies(&response)
            .iter()
            .any(|c| c.starts_with("pordisto.session-token=")));
        let json = body_json(response).await;
        assert_eq!(json["expiresAt"], 4_000_000_000_i64);
        assert_eq!(json["user"]["name"], "Ada");
    }

    #[tokio::test]
    async fn forced_refresh_without_session_is_unauthorized() {
        let st = state(false);
        let (csrf_cookie, csrf_token) = st.codec.mint_csrf();
        let headers = headers_with_cookie(&format!("pordisto.csrf-token={csrf_cookie}"));

        let body = UpdateBody {
            csrf_token,
            data: UpdateData {
                force_refresh: true,
            },
            json: true,
        };
        let response = update_session(Extension(st), headers, Some(Json(body))).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(!set_cookies(&response).is_empty());
    }

    #[tokio::test]
    async fn rejected_refresh_keeps_a_degraded_session() {
        let st = state(true);
        let (csrf_cookie, csrf_token) = st.codec.mint_csrf();
        let far = now_ms() / 1000 + 86_400;
        let encoded = st.codec.encode(&token(far)).unwrap();
        let headers = headers_with_cookie(&format!(
            "pordisto.session-token={encoded}; pordisto.csrf-token={csrf_cookie}"
        ));

        let body = UpdateBody {
            csrf_token,
            data: UpdateData {
                force_refresh: true,
            },
            json: true,
        };
        let response = update_session(Extension(st), headers, Some(Json(body))).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["error"], "RefreshAccessTokenError");
    }
}
