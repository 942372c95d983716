//! Shared gateway state and configuration.

use crate::auth::cookies::{has_session_slot, session_value, CookieNames, SessionCodec};
use crate::auth::refresh::{ProviderApi, ProviderClient};
use crate::auth::token::SessionToken;
use axum::http::HeaderMap;
use chrono::Utc;
use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

pub const DEFAULT_SCOPE: &str = "openid profile email offline_access";

/// Gateway configuration assembled from CLI flags and environment.
#[derive(Clone)]
pub struct GatewayConfig {
    pub issuer_base_url: String,
    pub client_id: String,
    pub client_secret: SecretString,
    pub public_origin: String,
    pub encryption_secret: SecretString,
    pub audience: String,
    pub scope: String,
    pub restricted_prefixes: Vec<String>,
    pub production: bool,
}

impl GatewayConfig {
    #[must_use]
    pub fn new(
        issuer_base_url: String,
        client_id: String,
        client_secret: SecretString,
        public_origin: String,
        encryption_secret: SecretString,
    ) -> Self {
        Self {
            issuer_base_url,
            client_id,
            client_secret,
            public_origin: public_origin.trim_end_matches('/').to_string(),
            encryption_secret,
            audience: String::new(),
            scope: DEFAULT_SCOPE.to_string(),
            restricted_prefixes: Vec::new(),
            production: false,
        }
    }

    #[must_use]
    pub fn with_audience(mut self, audience: String) -> Self {
        self.audience = audience;
        self
    }

    #[must_use]
    pub fn with_scope(mut self, scope: String) -> Self {
        if !scope.is_empty() {
            self.scope = scope;
        }
        self
    }

    #[must_use]
    pub fn with_restricted_prefixes(mut self, prefixes: Vec<String>) -> Self {
        self.restricted_prefixes = prefixes;
        self
    }

    #[must_use]
    pub fn with_production(mut self, production: bool) -> Self {
        self.production = production;
        self
    }

    /// Whether a path falls under a restricted prefix.
    #[must_use]
    pub fn is_restricted(&self, path: &str) -> bool {
        self.restricted_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }
}

/// Per-process state shared by every handler via `Extension`.
#[derive(Clone)]
pub struct AppState {
    pub config: GatewayConfig,
    pub names: CookieNames,
    pub codec: SessionCodec,
    pub provider: Arc<dyn ProviderApi>,
    pub http: reqwest::Client,
    /// Loopback base for the re-entrant session-update call.
    pub local_base: String,
}

impl AppState {
    /// # Errors
    /// Returns an error if the HTTP clients cannot be built.
    pub fn new(config: GatewayConfig, port: u16) -> anyhow::Result<Self> {
        let provider = ProviderClient::new(
            config.issuer_base_url.clone(),
            config.client_id.clone(),
            config.client_secret.clone(),
            config.audience.clone(),
            config.scope.clone(),
        )?;

        let http = reqwest::Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .timeout(HTTP_TIMEOUT)
            .build()?;

        Ok(Self {
            names: CookieNames::for_env(config.production),
            codec: SessionCodec::new(config.encryption_secret.clone()),
            provider: Arc::new(provider),
            http,
            local_base: format!("http://127.0.0.1:{port}"),
            config,
        })
    }

    /// Decode the session token from the inbound cookies, if any. Tampered
    /// cookies collapse to `None`; callers distinguish structural presence
    /// via [`Self::has_session_cookie`].
    #[must_use]
    pub fn read_session(&self, headers: &HeaderMap) -> Option<SessionToken> {
        let cookie = headers.get(axum::http::header::COOKIE)?.to_str().ok()?;
        let value = session_value(cookie, &self.names)?;
        self.codec.decode(&value)
    }

    /// Whether any session cookie slot is present, regardless of validity.
    /// An orphan split fragment counts: it must be cleared, not ignored.
    #[must_use]
    pub fn has_session_cookie(&self, headers: &HeaderMap) -> bool {
        headers
            .get(axum::http::header::COOKIE)
            .and_then(|cookie| cookie.to_str().ok())
            .is_some_and(|cookie| has_session_slot(cookie, &self.names))
    }
}

/// Current time in the canonical comparison unit.
#[must_use]
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
