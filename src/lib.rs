//! # Pordisto (Session Token Gateway)
//!
//! `pordisto` is an HTTP gateway that owns the server-side session and token
//! lifecycle for a browser application authenticating against an OIDC identity
//! provider. The browser never sees an access token: tokens live inside a
//! signed, possibly-split session cookie that only this service can read and
//! write.
//!
//! Responsibilities:
//!
//! 1. **Token lifecycle:** mint a token bundle from an authorization grant,
//!    pass unexpired tokens through, and refresh near-expiry tokens against
//!    the provider's token endpoint (at most one refresh per request).
//! 2. **Cookie reconciliation:** after a server-initiated refresh, replay the
//!    new bundle into the browser's session cookies so the client and server
//!    never drift apart.
//! 3. **Route guarding:** page navigations flow through a middleware chain
//!    that enforces restricted-route redirects and resolves every
//!    client-supplied redirect target against the request origin.

pub mod api;
pub mod auth;
pub mod cli;

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
