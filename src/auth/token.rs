//! Token bundle and session projection types.
//!
//! The identity provider reports expiry in epoch seconds and the session
//! cookie persists that unit unchanged. Internally every freshness
//! comparison goes through [`SessionToken::expires_at_ms`] so there is a
//! single place where the seconds-to-milliseconds conversion happens.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Refresh is attempted this long before the reported expiry.
pub const EXPIRY_BUFFER_MS: i64 = 60_000;

/// Marker surfaced on the session when a refresh exchange was rejected.
pub const REFRESH_ACCESS_TOKEN_ERROR: &str = "RefreshAccessTokenError";

/// The token bundle held inside the signed session cookie.
///
/// Never serialized into client-observable state; consumers see a
/// [`SessionDescriptor`] projection instead.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionToken {
    pub access_token: String,
    pub id_token: String,
    pub refresh_token: String,
    /// Provider wire unit: epoch seconds.
    pub expires_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Profile claims from the provider's userinfo endpoint, kept opaque.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SessionToken {
    /// Expiry in the canonical comparison unit (epoch milliseconds).
    #[must_use]
    pub fn expires_at_ms(&self) -> i64 {
        self.expires_at.saturating_mul(1000)
    }

    /// Whether the access token is still usable at `now_ms`, with the
    /// one-minute safety buffer applied.
    #[must_use]
    pub fn is_fresh(&self, now_ms: i64) -> bool {
        now_ms < self.expires_at_ms() - EXPIRY_BUFFER_MS
    }

    /// Whether the token has outlived its reported expiry (no buffer).
    #[must_use]
    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.expires_at > 0 && now_ms > self.expires_at_ms()
    }

    /// Return the same token annotated with a refresh error. The session
    /// survives in a degraded state; the consumer decides what to do.
    #[must_use]
    pub fn with_refresh_error(mut self) -> Self {
        self.error = Some(REFRESH_ACCESS_TOKEN_ERROR.to_string());
        self
    }

    #[must_use]
    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Token bundle returned by the provider on the authorization-code leg.
#[derive(Clone, Debug)]
pub struct ProviderGrant {
    pub access_token: String,
    pub id_token: String,
    pub refresh_token: String,
    /// Epoch seconds.
    pub expires_at: i64,
    pub subject: Option<String>,
    pub profile: Option<serde_json::Value>,
}

impl ProviderGrant {
    /// Mint a session token verbatim from the grant.
    #[must_use]
    pub fn into_session_token(self) -> SessionToken {
        SessionToken {
            access_token: self.access_token,
            id_token: self.id_token,
            refresh_token: self.refresh_token,
            expires_at: self.expires_at,
            subject: self.subject,
            profile: self.profile,
            error: None,
        }
    }
}

/// The externally visible session. Carries no token material.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<serde_json::Value>,
    /// Epoch seconds, matching the persisted unit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(expires_at: i64) -> SessionToken {
        SessionToken {
            access_token: "access".to_string(),
            id_token: "id".to_string(),
            refresh_token: "refresh".to_string(),
            expires_at,
            subject: Some("auth0|123".to_string()),
            profile: None,
            error: None,
        }
    }

    #[test]
    fn freshness_uses_millisecond_comparison_with_buffer() {
        let t = token(1_000);
        // Expiry is 1_000_000 ms; the buffer pulls the boundary to 940_000.
        assert!(t.is_fresh(939_999));
        assert!(!t.is_fresh(940_000));
        assert!(!t.is_fresh(1_000_001));
    }

    #[test]
    fn expired_ignores_zero_expiry() {
        let t = token(0);
        assert!(!t.is_expired(i64::MAX));
    }

    #[test]
    fn refresh_error_annotation_keeps_token_material() {
        let t = token(1_000).with_refresh_error();
        assert_eq!(t.error.as_deref(), Some(REFRESH_ACCESS_TOKEN_ERROR));
        assert_eq!(t.access_token, "access");
        assert_eq!(t.refresh_token, "refresh");
    }

    #[test]
    fn session_token_roundtrips_through_json() -> anyhow::Result<()> {
        let t = token(1_700_000_000);
        let json = serde_json::to_string(&t)?;
        assert!(json.contains("\"accessToken\""));
        let back: SessionToken = serde_json::from_str(&json)?;
        assert_eq!(back, t);
        Ok(())
    }

    #[test]
    fn descriptor_never_serializes_token_material() -> anyhow::Result<()> {
        let descriptor = SessionDescriptor {
            sub: Some("auth0|123".to_string()),
            user: None,
            expires_at: Some(1_700_000_000),
            error: None,
        };
        let json = serde_json::to_string(&descriptor)?;
        assert!(!json.contains("accessToken"));
        assert!(!json.contains("refreshToken"));
        assert!(!json.contains("idToken"));
        Ok(())
    }
}
