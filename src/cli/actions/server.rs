use crate::api::{self, state::GatewayConfig};
use anyhow::{Context, Result};
use secrecy::SecretString;
use tracing::info;
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub issuer_base_url: String,
    pub client_id: String,
    pub client_secret: SecretString,
    pub audience: String,
    pub scope: String,
    pub encryption_secret: SecretString,
    pub public_origin: String,
    pub restricted: Vec<String>,
    pub production: bool,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the configuration is invalid or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    // Both origins must parse; everything downstream assumes well-formed URLs.
    Url::parse(&args.issuer_base_url).context("invalid issuer base URL")?;
    Url::parse(&args.public_origin).context("invalid public origin")?;

    log_startup_args(&args);

    let config = GatewayConfig::new(
        args.issuer_base_url,
        args.client_id,
        args.client_secret,
        args.public_origin,
        args.encryption_secret,
    )
    .with_audience(args.audience)
    .with_scope(args.scope)
    .with_restricted_prefixes(args.restricted)
    .with_production(args.production);

    api::new(args.port, config).await
}

fn log_startup_args(args: &Args) {
    info!(
        port = args.port,
        issuer_base_url = %args.issuer_base_url,
        client_id = %args.client_id,
        audience = %args.audience,
        scope = %args.scope,
        public_origin = %args.public_origin,
        restricted = ?args.restricted,
        production = args.production,
        "Starting {} {} ({})",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        short_commit(crate::GIT_COMMIT_HASH),
    );
}

fn short_commit(hash: &str) -> String {
    let trimmed = hash.trim();
    if trimmed.len() > 7 {
        trimmed[..7].to_string()
    } else {
        trimmed.to_string()
    }
}
