use axum::http::{header, HeaderValue};
use axum::response::Response;

pub mod actions;
pub mod force_refresh;
pub mod health;
pub mod oauth;
pub mod pages;
pub mod server_token;
pub mod session;

/// Append `Set-Cookie` headers onto a response, preserving order.
pub(crate) fn with_set_cookies(mut response: Response, cookies: Vec<String>) -> Response {
    for cookie in cookies {
        if let Ok(value) = HeaderValue::from_str(&cookie) {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
    }
    response
}
