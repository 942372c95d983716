use crate::cli::actions::{server::Args, Action};
use anyhow::{Context, Result};
use secrecy::SecretString;

/// # Errors
/// Returns an error if required arguments are missing.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);

    let required = |name: &str| -> Result<String> {
        matches
            .get_one::<String>(name)
            .cloned()
            .with_context(|| format!("missing required argument: --{name}"))
    };

    let restricted = matches
        .get_many::<String>("restricted")
        .map(|values| values.cloned().collect())
        .unwrap_or_default();

    Ok(Action::Server(Args {
        port,
        issuer_base_url: required("issuer-base-url")?,
        client_id: required("client-id")?,
        client_secret: SecretString::from(required("client-secret")?),
        audience: required("audience")?,
        scope: required("scope")?,
        encryption_secret: SecretString::from(required("encryption-secret")?),
        public_origin: required("public-origin")?,
        restricted,
        production: matches.get_flag("production"),
    }))
}
