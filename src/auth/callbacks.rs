//! Session callback state machine.
//!
//! Each session read runs through [`jwt_callback`] as a pure transform: the
//! current token value and the triggering event go in, a new token value
//! comes out. No stage mutates shared state; persisting the result is the
//! caller's job.

use crate::auth::error::AuthError;
use crate::auth::redirect::{resolve_safe_redirect_path, RedirectCandidate};
use crate::auth::refresh::ProviderApi;
use crate::auth::token::{ProviderGrant, SessionDescriptor, SessionToken};
use tracing::{debug, warn};

/// What triggered this session read.
#[derive(Debug)]
pub enum SessionEvent {
    /// Sign-in completed; the provider grant is fresh off the wire.
    SignIn(ProviderGrant),
    /// Ordinary session read.
    Read,
    /// Explicit update with the force-refresh flag set.
    ForceRefresh,
}

/// Advance the token through one session event.
///
/// `Ok(None)` means no session exists and the read proceeds
/// unauthenticated. A provider-rejected refresh is not an error here: the
/// token survives annotated, and the consumer decides whether to sign out.
///
/// # Errors
/// `MissingRefreshToken` when a forced or expired-token refresh finds no
/// refresh token, `NoTokenAvailable` when a forced refresh finds no session
/// at all. Both are fatal by design: the caller expected a token.
pub async fn jwt_callback(
    token: Option<SessionToken>,
    event: SessionEvent,
    now_ms: i64,
    provider: &dyn ProviderApi,
) -> Result<Option<SessionToken>, AuthError> {
    match event {
        SessionEvent::SignIn(grant) => Ok(Some(grant.into_session_token())),
        SessionEvent::ForceRefresh => {
            let token = token.ok_or(AuthError::NoTokenAvailable)?;
            refresh_token_state(token, provider).await.map(Some)
        }
        SessionEvent::Read => {
            let Some(token) = token else {
                return Ok(None);
            };
            if token.is_expired(now_ms) {
                refresh_token_state(token, provider).await.map(Some)
            } else {
                Ok(Some(token))
            }
        }
    }
}

/// The shared refresh leg of the forced and expired paths.
async fn refresh_token_state(
    token: SessionToken,
    provider: &dyn ProviderApi,
) -> Result<SessionToken, AuthError> {
    if token.refresh_token.is_empty() {
        return Err(AuthError::MissingRefreshToken);
    }

    let bundle = match provider.refresh(&token.refresh_token).await {
        Ok(bundle) => bundle,
        Err(err) => {
            warn!("Refresh rejected, keeping degraded session: {err}");
            return Ok(token.with_refresh_error());
        }
    };

    // Best effort: stale profile claims are acceptable, a failed userinfo
    // fetch never fails the refresh.
    let profile = match provider.userinfo(&bundle.access_token).await {
        Ok(claims) => Some(claims),
        Err(err) => {
            debug!("Skipping profile update: {err}");
            token.profile.clone()
        }
    };

    Ok(SessionToken {
        access_token: bundle.access_token,
        id_token: bundle.id_token,
        refresh_token: bundle.refresh_token,
        expires_at: bundle.expires_at,
        subject: token.subject,
        profile,
        error: None,
    })
}

/// Project the externally visible session from the token state. Token
/// material never crosses this boundary.
#[must_use]
pub fn project_session(token: Option<&SessionToken>) -> SessionDescriptor {
    let Some(token) = token else {
        return SessionDescriptor::default();
    };
    SessionDescriptor {
        sub: token.subject.clone(),
        user: token.profile.clone(),
        expires_at: Some(token.expires_at),
        error: token.error.clone(),
    }
}

/// Decide where a completed sign-in round trip may land: a same-origin
/// absolute URL stays, a clean relative path is joined onto the origin,
/// anything else collapses to the origin itself.
#[must_use]
pub fn redirect_callback(url: &str, origin: &str) -> String {
    let candidate = RedirectCandidate::Single(url.to_string());
    let path = resolve_safe_redirect_path(&candidate, origin, "/");
    format!("{}{path}", origin.trim_end_matches('/'))
}
