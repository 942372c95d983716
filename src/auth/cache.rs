//! Per-request token memoization.
//!
//! One [`RequestContext`] is created per inbound request (the guard stores
//! it in the request extensions) and threaded by argument everywhere a
//! token is needed. The slot guarantees at most one outbound refresh per
//! request no matter how many handlers ask.

use crate::auth::refresh::ProviderApi;
use crate::auth::token::SessionToken;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Request-scoped auth state: the force-refresh flag, the memoized token
/// slot, and the guard's idempotency marker. Clones share the same state.
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    force_refresh: Arc<AtomicBool>,
    slot: Arc<Mutex<Option<SessionToken>>>,
    guarded: Arc<AtomicBool>,
}

impl RequestContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_force_refresh(&self) {
        self.force_refresh.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn force_refresh(&self) -> bool {
        self.force_refresh.load(Ordering::SeqCst)
    }

    /// Mark this request as guarded. Returns `true` on the first call only,
    /// so repeated middleware passes short-circuit.
    #[must_use]
    pub fn mark_guarded(&self) -> bool {
        !self.guarded.swap(true, Ordering::SeqCst)
    }

    fn cached(&self) -> Option<SessionToken> {
        self.slot.lock().ok().and_then(|slot| slot.clone())
    }

    fn store(&self, token: &SessionToken) {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = Some(token.clone());
        }
    }
}

/// Resolve a usable token bundle for this request.
///
/// The memoized slot wins unconditionally. Otherwise the session's token is
/// returned as-is while fresh (one-minute buffer), refreshed when stale or
/// when the context carries a force-refresh flag. A failed refresh yields
/// `None`; the caller treats the request as unauthenticated.
pub async fn get_server_token(
    ctx: &RequestContext,
    session: Option<&SessionToken>,
    provider: &dyn ProviderApi,
    now_ms: i64,
) -> Option<SessionToken> {
    if let Some(cached) = ctx.cached() {
        debug!("Returning request-cached token");
        return Some(cached);
    }

    let token = session?;

    if token.is_fresh(now_ms) && !ctx.force_refresh() {
        ctx.store(token);
        return Some(token.clone());
    }

    match provider.refresh(&token.refresh_token).await {
        Ok(bundle) => {
            let refreshed = SessionToken {
                access_token: bundle.access_token,
                id_token: bundle.id_token,
                refresh_token: bundle.refresh_token,
                expires_at: bundle.expires_at,
                subject: token.subject.clone(),
                profile: token.profile.clone(),
                error: None,
            };
            ctx.store(&refreshed);
            Some(refreshed)
        }
        Err(err) => {
            warn!("Token refresh failed: {err}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::error::AuthError;
    use crate::auth::refresh::{BoxFuture, RefreshedBundle};
    use std::sync::atomic::AtomicUsize;

    struct CountingProvider {
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingProvider {
        fn new(fail: bool) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl ProviderApi for CountingProvider {
        fn refresh<'a>(
            &'a self,
            refresh_token: &'a str,
        ) -> BoxFuture<'a, Result<RefreshedBundle, AuthError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let fail = self.fail;
            let refresh_token = refresh_token.to_string();
            Box::pin(async move {
                if fail {
                    return Err(AuthError::RefreshAccessToken);
                }
                Ok(RefreshedBundle {
                    access_token: "new-at".to_string(),
                    id_token: "new-idt".to_string(),
                    refresh_token,
                    expires_at: 2_000_000_000,
                })
            })
        }

        fn userinfo<'a>(
            &'a self,
            _access_token: &'a str,
        ) -> BoxFuture<'a, Result<serde_json::Value, AuthError>> {
            Box::pin(async { Ok(serde_json::json!({})) })
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

    #[tokio::test]
    async fn no_session_yields_none() {
        let ctx = RequestContext::new();
        let provider = CountingProvider::new(false);
        assert!(get_server_token(&ctx, None, &provider, 0).await.is_none());
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn fresh_token_passes_through_without_refresh() {
        let ctx = RequestContext::new();
        let provider = CountingProvider::new(false);
        let session = token(1_000);
        // 939_999 ms is just inside the one-minute buffer.
        let got = get_server_token(&ctx, Some(&session), &provider, 939_999).await;
        assert_eq!(got, Some(session));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn buffer_boundary_triggers_refresh() {
        let ctx = RequestContext::new();
        let provider = CountingProvider::new(false);
        let session = token(1_000);
        let got = get_server_token(&ctx, Some(&session), &provider, 940_000).await;
        assert_eq!(provider.calls(), 1);
        let got = got.map(|t| t.access_token);
        assert_eq!(got.as_deref(), Some("new-at"));
    }

    #[tokio::test]
    async fn force_refresh_skips_buffer_check() {
        let ctx = RequestContext::new();
        ctx.set_force_refresh();
        let provider = CountingProvider::new(false);
        let session = token(i64::MAX / 1000);
        let got = get_server_token(&ctx, Some(&session), &provider, 0).await;
        assert_eq!(provider.calls(), 1);
        assert!(got.is_some());
    }

    #[tokio::test]
    async fn second_call_is_served_from_the_slot() {
        let ctx = RequestContext::new();
        let provider = CountingProvider::new(false);
        let session = token(1_000);

        let first = get_server_token(&ctx, Some(&session), &provider, 2_000_000).await;
        let second = get_server_token(&ctx, Some(&session), &provider, 2_000_000).await;

        assert_eq!(provider.calls(), 1);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn refreshed_bundle_keeps_subject_and_profile() {
        let ctx = RequestContext::new();
        let provider = CountingProvider::new(false);
        let mut session = token(1_000);
        session.profile = Some(serde_json::json!({"name": "Ada"}));

        let got = get_server_token(&ctx, Some(&session), &provider, 2_000_000)
            .await
            .map(|t| (t.subject, t.profile));
        assert_eq!(
            got,
            Some((
                Some("auth0|abc".to_string()),
                Some(serde_json::json!({"name": "Ada"}))
            ))
        );
    }

    #[tokio::test]
    async fn refresh_failure_degrades_to_none() {
        let ctx = RequestContext::new();
        let provider = CountingProvider::new(true);
        let session = token(1_000);
        let got = get_server_token(&ctx, Some(&session), &provider, 2_000_000).await;
        assert!(got.is_none());
        assert_eq!(provider.calls(), 1);
    }

    #[test]
    fn guard_marker_fires_once() {
        let ctx = RequestContext::new();
        assert!(ctx.mark_guarded());
        assert!(!ctx.mark_guarded());
        // Clones share the marker.
        assert!(!ctx.clone().mark_guarded());
    }
}
