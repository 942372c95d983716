use crate::api::handlers::{actions, force_refresh, health, oauth, pages, server_token, session};
use crate::auth::guard::{auth_guard, residual_guard};
use anyhow::{anyhow, Context, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{header::CONTENT_TYPE, HeaderName, HeaderValue, Method, Request},
    middleware,
    routing::{get, post},
    Extension, Router,
};
use state::{AppState, GatewayConfig};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;
use url::Url;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod handlers;
pub mod state;

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        session::get_session,
        session::update_session,
        server_token::server_token,
        force_refresh::force_refresh,
        actions::login,
        actions::logout_url,
        actions::register,
    ),
    components(schemas(
        health::Health,
        crate::auth::token::SessionDescriptor,
        session::UpdateBody,
        session::UpdateData,
        server_token::TokenRequest,
        server_token::TokenResponse,
        server_token::TokenErrorResponse,
        actions::LogoutUrlResponse,
    )),
    tags(
        (name = "health", description = "Service health"),
        (name = "session", description = "Session reads and forced refreshes"),
        (name = "auth", description = "Sign-in, sign-out, and provider round trips"),
    )
)]
struct ApiDoc;

/// Start the gateway.
/// # Errors
/// Return error if failed to start the server
pub async fn new(port: u16, config: GatewayConfig) -> Result<()> {
    let state = Arc::new(AppState::new(config, port)?);
    let app = router(state)?;

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn router(state: Arc<AppState>) -> Result<Router> {
    let cors = CorsLayer::new()
        .allow_headers([
            CONTENT_TYPE,
            HeaderName::from_static("x-auth-force-refresh"),
            HeaderName::from_static("x-debug-force-refresh"),
            HeaderName::from_static("xsrf-token"),
        ])
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(AllowOrigin::exact(public_origin(
            &state.config.public_origin,
        )?))
        .allow_credentials(true);

    // The guard chain applies to page navigations only; API consumers carry
    // their own cookies and CSRF tokens.
    let pages = Router::new()
        .route("/", get(pages::app_shell))
        .route("/signin", get(pages::signin))
        .route("/not-found", get(pages::not_found))
        .route("/*path", get(pages::app_shell))
        .layer(middleware::from_fn(residual_guard))
        .layer(middleware::from_fn(auth_guard));

    let api = Router::new()
        .route("/health", get(health::health))
        .route(
            "/api/auth/session",
            get(session::get_session).post(session::update_session),
        )
        .route("/api/auth/signin", get(oauth::signin))
        .route("/api/auth/callback", get(oauth::callback))
        .route("/api/auth/signout", post(oauth::signout))
        .route("/api/server-token", post(server_token::server_token))
        .route("/api/force-refresh", post(force_refresh::force_refresh))
        .route("/auth/login", get(actions::login))
        .route("/auth/logout-url", get(actions::logout_url))
        .route("/auth/register", get(actions::register));

    let app = Router::new()
        .merge(api)
        .merge(pages)
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(Extension(state)),
        );

    Ok(app)
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

fn public_origin(origin: &str) -> Result<HeaderValue> {
    let parsed =
        Url::parse(origin).with_context(|| format!("Invalid public origin: {origin}"))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| anyhow!("Public origin must include a valid host: {origin}"))?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    let value = format!("{}://{}{}", parsed.scheme(), host, port);
    HeaderValue::from_str(&value).context("Failed to build origin header")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_origin_normalizes_scheme_host_port() -> Result<()> {
        assert_eq!(
            public_origin("https://app.example/some/path")?,
            HeaderValue::from_static("https://app.example")
        );
        assert_eq!(
            public_origin("http://localhost:3000")?,
            HeaderValue::from_static("http://localhost:3000")
        );
        assert!(public_origin("not a url").is_err());
        Ok(())
    }
}
