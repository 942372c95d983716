use clap::{
    builder::{
        styling::{AnsiColor, Effects, Styles},
        ValueParser,
    },
    Arg, ArgAction, ColorChoice, Command,
};

pub fn validator_log_level() -> ValueParser {
    ValueParser::from(move |level: &str| -> std::result::Result<u8, String> {
        if let Ok(parsed) = level.parse::<u8>() {
            // Successfully parsed as a number
            if parsed <= 5 {
                return Ok(parsed);
            }
        }

        match level.to_lowercase().as_str() {
            "error" => Ok(0),
            "warn" => Ok(1),
            "info" => Ok(2),
            "debug" => Ok(3),
            "trace" => Ok(4),
            _ => Err("invalid log level".to_string()),
        }
    })
}

pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    Command::new("pordisto")
        .about("Session token gateway")
        .version(env!("CARGO_PKG_VERSION"))
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .help("Port to listen on")
                .default_value("8080")
                .env("PORDISTO_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("issuer-base-url")
                .long("issuer-base-url")
                .help("Identity provider issuer base URL, example: https://tenant.auth.example")
                .env("PORDISTO_ISSUER_BASE_URL")
                .required(true),
        )
        .arg(
            Arg::new("client-id")
                .long("client-id")
                .help("OAuth client id")
                .env("PORDISTO_CLIENT_ID")
                .required(true),
        )
        .arg(
            Arg::new("client-secret")
                .long("client-secret")
                .help("OAuth client secret")
                .env("PORDISTO_CLIENT_SECRET")
                .required(true),
        )
        .arg(
            Arg::new("audience")
                .long("audience")
                .help("API audience requested from the identity provider")
                .env("PORDISTO_AUDIENCE")
                .default_value(""),
        )
        .arg(
            Arg::new("scope")
                .long("scope")
                .help("OAuth scopes requested on sign-in and refresh")
                .env("PORDISTO_SCOPE")
                .default_value("openid profile email offline_access"),
        )
        .arg(
            Arg::new("encryption-secret")
                .long("encryption-secret")
                .help("Secret used to sign session and CSRF cookies")
                .env("PORDISTO_ENCRYPTION_SECRET")
                .required(true),
        )
        .arg(
            Arg::new("public-origin")
                .long("public-origin")
                .help("Public origin the gateway is served from, example: https://app.example")
                .env("PORDISTO_PUBLIC_ORIGIN")
                .required(true),
        )
        .arg(
            Arg::new("restricted")
                .long("restricted")
                .help("Path prefix that requires an authenticated session (repeatable)")
                .env("PORDISTO_RESTRICTED")
                .value_delimiter(',')
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("production")
                .long("production")
                .help("Use production cookie names (__Secure-/__Host- prefixes)")
                .env("PORDISTO_PRODUCTION")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbosity")
                .short('v')
                .long("verbose")
                .help("Verbosity level: ERROR, WARN, INFO, DEBUG, TRACE (default: ERROR)")
                .env("PORDISTO_LOG_LEVEL")
                .global(true)
                .action(ArgAction::Count)
                .value_parser(validator_log_level()),
        )
}
