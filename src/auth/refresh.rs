//! Identity-provider glue: token refresh, authorization-code exchange, and
//! userinfo fetch.
//!
//! Retry policy intentionally lives with callers; every function here makes
//! at most one outbound call with a fixed timeout.

use crate::auth::error::AuthError;
use chrono::Utc;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::{future::Future, pin::Pin, time::Duration};
use tracing::{info_span, warn, Instrument};
use url::Url;

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A freshly minted token bundle from the provider's token endpoint.
#[derive(Clone, Debug, PartialEq)]
pub struct RefreshedBundle {
    pub access_token: String,
    pub id_token: String,
    pub refresh_token: String,
    /// Epoch seconds.
    pub expires_at: i64,
}

/// Seam between the session state machine and the identity provider.
pub trait ProviderApi: Send + Sync {
    /// Exchange a refresh token for a new bundle.
    ///
    /// Fails closed: an empty input refresh token yields
    /// [`AuthError::RefreshAccessToken`] without a network call, as does any
    /// transport or provider failure. Never panics, never retries.
    fn refresh<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> BoxFuture<'a, Result<RefreshedBundle, AuthError>>;

    /// Fetch fresh profile claims for an access token.
    fn userinfo<'a>(
        &'a self,
        access_token: &'a str,
    ) -> BoxFuture<'a, Result<serde_json::Value, AuthError>>;

    /// Exchange an authorization code for a token bundle.
    ///
    /// Unlike `refresh`, failures here surface as
    /// [`AuthError::UpstreamFetch`] so the sign-in callback can report them.
    fn exchange_code<'a>(
        &'a self,
        code: &'a str,
        redirect_uri: &'a str,
    ) -> BoxFuture<'a, Result<RefreshedBundle, AuthError>>;

    /// Build the provider authorization URL for a sign-in round trip.
    /// `screen_hint` selects the provider's sign-up variant.
    ///
    /// # Errors
    /// Returns an error if the issuer base URL cannot be parsed.
    fn authorize_url(
        &self,
        redirect_uri: &str,
        state: &str,
        screen_hint: Option<&str>,
    ) -> anyhow::Result<String>;

    /// Build the provider's OIDC logout URL with an id-token hint.
    ///
    /// # Errors
    /// Returns an error if the issuer base URL cannot be parsed.
    fn logout_url(
        &self,
        id_token_hint: &str,
        post_logout_redirect_uri: &str,
    ) -> anyhow::Result<String>;
}

#[derive(Debug, Deserialize)]
struct TokenEndpointResponse {
    access_token: String,
    #[serde(default)]
    id_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    expires_in: i64,
}

/// Production [`ProviderApi`] implementation over the provider's OAuth
/// endpoints.
pub struct ProviderClient {
    http: Client,
    issuer_base_url: String,
    client_id: String,
    client_secret: SecretString,
    audience: String,
    scope: String,
}

impl ProviderClient {
    /// # Errors
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(
        issuer_base_url: String,
        client_id: String,
        client_secret: SecretString,
        audience: String,
        scope: String,
    ) -> anyhow::Result<Self> {
        let http = Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .timeout(HTTP_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            issuer_base_url: issuer_base_url.trim_end_matches('/').to_string(),
            client_id,
            client_secret,
            audience,
            scope,
        })
    }

    fn token_url(&self) -> String {
        format!("{}/oauth/token", self.issuer_base_url)
    }
}

impl ProviderApi for ProviderClient {
    fn authorize_url(
        &self,
        redirect_uri: &str,
        state: &str,
        screen_hint: Option<&str>,
    ) -> anyhow::Result<String> {
        let mut url = Url::parse(&format!("{}/authorize", self.issuer_base_url))?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("response_type", "code")
                .append_pair("client_id", &self.client_id)
                .append_pair("scope", &self.scope)
                .append_pair("redirect_uri", redirect_uri)
                .append_pair("state", state);
            if !self.audience.is_empty() {
                query.append_pair("audience", &self.audience);
            }
            if let Some(hint) = screen_hint {
                query.append_pair("screen_hint", hint);
            }
        }
        Ok(url.to_string())
    }

    fn logout_url(
        &self,
        id_token_hint: &str,
        post_logout_redirect_uri: &str,
    ) -> anyhow::Result<String> {
        let mut url = Url::parse(&format!("{}/oidc/logout", self.issuer_base_url))?;
        url.query_pairs_mut()
            .append_pair("id_token_hint", id_token_hint)
            .append_pair("post_logout_redirect_uri", post_logout_redirect_uri);
        Ok(url.to_string())
    }

    fn exchange_code<'a>(
        &'a self,
        code: &'a str,
        redirect_uri: &'a str,
    ) -> BoxFuture<'a, Result<RefreshedBundle, AuthError>> {
        Box::pin(async move {
            let url = self.token_url();
            let params = [
                ("grant_type", "authorization_code"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.expose_secret()),
                ("code", code),
                ("redirect_uri", redirect_uri),
            ];

            let span = info_span!("provider.exchange_code", http.method = "POST", url = %url);
            let response = self
                .http
                .post(&url)
                .form(&params)
                .send()
                .instrument(span)
                .await
                .map_err(|err| AuthError::from_upstream(&err))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(AuthError::UpstreamFetch {
                    status: Some(status.as_u16()),
                    message: body,
                });
            }

            let tokens: TokenEndpointResponse =
                response
                    .json()
                    .await
                    .map_err(|err| AuthError::UpstreamFetch {
                        status: None,
                        message: err.to_string(),
                    })?;

            Ok(RefreshedBundle {
                access_token: tokens.access_token,
                id_token: tokens.id_token,
                refresh_token: tokens.refresh_token.unwrap_or_default(),
                expires_at: Utc::now().timestamp() + tokens.expires_in,
            })
        })
    }

    fn refresh<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> BoxFuture<'a, Result<RefreshedBundle, AuthError>> {
        Box::pin(async move {
            if refresh_token.is_empty() {
                warn!("Refresh requested without a refresh token");
                return Err(AuthError::RefreshAccessToken);
            }

            let url = self.token_url();
            let params = [
                ("grant_type", "refresh_token"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.expose_secret()),
                ("refresh_token", refresh_token),
                ("scope", self.scope.as_str()),
            ];

            let span = info_span!("provider.refresh", http.method = "POST", url = %url);
            let response = match self.http.post(&url).form(&params).send().instrument(span).await
            {
                Ok(response) => response,
                Err(err) => {
                    warn!("Error refreshing access token: {err}");
                    return Err(AuthError::RefreshAccessToken);
                }
            };

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                warn!("Error refreshing access token: {status}, {body}");
                return Err(AuthError::RefreshAccessToken);
            }

            let tokens: TokenEndpointResponse = match response.json().await {
                Ok(tokens) => tokens,
                Err(err) => {
                    warn!("Error decoding token endpoint response: {err}");
                    return Err(AuthError::RefreshAccessToken);
                }
            };

            Ok(RefreshedBundle {
                access_token: tokens.access_token,
                id_token: tokens.id_token,
                // Providers may omit a rotated refresh token; keep the one we
                // already hold.
                refresh_token: refresh_token.to_string(),
                expires_at: Utc::now().timestamp() + tokens.expires_in,
            })
        })
    }

    fn userinfo<'a>(
        &'a self,
        access_token: &'a str,
    ) -> BoxFuture<'a, Result<serde_json::Value, AuthError>> {
        Box::pin(async move {
            let url = format!("{}/userinfo", self.issuer_base_url);

            let span = info_span!("provider.userinfo", http.method = "GET", url = %url);
            let response = self
                .http
                .get(&url)
                .bearer_auth(access_token)
                .send()
                .instrument(span)
                .await
                .map_err(|err| AuthError::from_upstream(&err))?;

            let status = response.status();
            if !status.is_success() {
                return Err(AuthError::UpstreamFetch {
                    status: Some(status.as_u16()),
                    message: "userinfo fetch failed".to_string(),
                });
            }

            response
                .json()
                .await
                .map_err(|err| AuthError::UpstreamFetch {
                    status: None,
                    message: err.to_string(),
                })
        })
    }
}
