/// Closed set of auth failure kinds.
///
/// Network and provider failures are decoded into one of these variants at
/// the boundary of each component; only `InvalidSessionStructure` on a
/// restricted route is allowed to become a fatal request error.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum AuthError {
    /// A forced or expired-token refresh was requested without a refresh
    /// token in the session. Fatal: the caller expected a token.
    #[error("missing refresh token")]
    MissingRefreshToken,

    /// The identity provider rejected the refresh exchange. Recoverable:
    /// the session survives, annotated with the error, and the consumer
    /// decides whether to log out.
    #[error("access token refresh rejected by the identity provider")]
    RefreshAccessToken,

    /// No token bundle in the session store. Treated as unauthenticated.
    #[error("no token available")]
    NoTokenAvailable,

    /// The session is structurally present but unusable. Fatal (401) on
    /// restricted routes only.
    #[error("invalid session structure")]
    InvalidSessionStructure,

    /// An outbound call failed. Logged and degraded to unauthenticated.
    #[error("upstream fetch failed: {message}")]
    UpstreamFetch {
        status: Option<u16>,
        message: String,
    },
}

impl AuthError {
    /// Decode a reqwest failure once, at the network boundary.
    #[must_use]
    pub fn from_upstream(err: &reqwest::Error) -> Self {
        Self::UpstreamFetch {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_display_includes_message() {
        let err = AuthError::UpstreamFetch {
            status: Some(502),
            message: "bad gateway".to_string(),
        };
        assert_eq!(err.to_string(), "upstream fetch failed: bad gateway");
    }

    #[test]
    fn refresh_error_is_not_fatal_by_display() {
        assert_eq!(
            AuthError::RefreshAccessToken.to_string(),
            "access token refresh rejected by the identity provider"
        );
    }
}
