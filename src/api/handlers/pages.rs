//! Minimal page handlers for the guarded namespace.
//!
//! The shell embeds the redacted auth snapshot so a hydrating client sees
//! authentication state without ever seeing token material.

use crate::auth::guard::SsrAuthInfo;
use axum::{
    extract::Query,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    Extension,
};
use serde::Deserialize;

pub async fn app_shell(info: Option<Extension<SsrAuthInfo>>) -> Response {
    let info = info.map_or_else(SsrAuthInfo::default, |Extension(info)| info);
    let snapshot =
        serde_json::to_string(&info.redacted()).unwrap_or_else(|_| "{}".to_string());
    Html(format!(
        "<!doctype html><html><head><title>pordisto</title></head>\
         <body><div id=\"app\"></div>\
         <script>window.__AUTH__ = {snapshot};</script></body></html>"
    ))
    .into_response()
}

#[derive(Debug, Default, Deserialize)]
pub struct SigninPageQuery {
    pub redirect: Option<String>,
}

pub async fn signin(query: Option<Query<SigninPageQuery>>) -> Html<String> {
    let query = query.map_or_else(SigninPageQuery::default, |Query(query)| query);
    // Re-encoding keeps the return path alive across the sign-in click and
    // keeps the value attribute-safe.
    let target = match query.redirect {
        Some(redirect) => {
            let encoded = url::form_urlencoded::Serializer::new(String::new())
                .append_pair("redirect", &redirect)
                .finish();
            format!("/api/auth/signin?{encoded}")
        }
        None => "/api/auth/signin".to_string(),
    };
    Html(format!(
        "<!doctype html><html><head><title>Sign in</title></head>\
         <body><a href=\"{target}\">Sign in</a> \
         <a href=\"/auth/register\">Register</a></body></html>"
    ))
}

pub async fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Html("<!doctype html><html><body><h1>Not found</h1></body></html>"),
    )
        .into_response()
}
