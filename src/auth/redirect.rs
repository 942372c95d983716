//! Safe-redirect resolution.
//!
//! Every entry point that accepts a client-supplied return URL resolves it
//! here before use. The resolver is total: it never fails, it only falls
//! back.

use url::Url;

/// An untrusted redirect target as it arrives from a query string: a single
/// value, a repeated parameter, or nothing at all.
#[derive(Clone, Debug)]
pub enum RedirectCandidate {
    Single(String),
    Many(Vec<String>),
    Absent,
}

impl RedirectCandidate {
    /// Repeated query parameters resolve to their first string element.
    fn normalize(&self) -> Option<&str> {
        match self {
            Self::Single(value) => Some(value.as_str()),
            Self::Many(values) => values.first().map(String::as_str),
            Self::Absent => None,
        }
    }
}

impl From<Option<String>> for RedirectCandidate {
    fn from(value: Option<String>) -> Self {
        value.map_or(Self::Absent, Self::Single)
    }
}

/// Resolve a safe, same-origin redirect path.
///
/// Accepts absolute URLs and relative paths, but only returns a path when it
/// resolves to `origin`. Anything else collapses to `fallback`.
#[must_use]
pub fn resolve_safe_redirect_path(
    candidate: &RedirectCandidate,
    origin: &str,
    fallback: &str,
) -> String {
    let Some(candidate) = candidate.normalize() else {
        return fallback.to_string();
    };

    if candidate.is_empty() {
        return fallback.to_string();
    }

    let Ok(base) = Url::parse(origin) else {
        return fallback.to_string();
    };

    match base.join(candidate) {
        Ok(resolved) => {
            if resolved.origin() != base.origin() {
                return fallback.to_string();
            }

            let mut safe_path = resolved.path().to_string();
            if let Some(query) = resolved.query() {
                safe_path.push('?');
                safe_path.push_str(query);
            }
            if let Some(fragment) = resolved.fragment() {
                safe_path.push('#');
                safe_path.push_str(fragment);
            }

            if safe_path.is_empty() {
                fallback.to_string()
            } else {
                safe_path
            }
        }
        // Only allow clean internal paths as a last resort; `//` would be
        // scheme-relative and escape the origin.
        Err(_) => {
            if candidate.starts_with('/') && !candidate.starts_with("//") {
                candidate.to_string()
            } else {
                fallback.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORIGIN: &str = "https://app.example";

    fn resolve(candidate: &RedirectCandidate) -> String {
        resolve_safe_redirect_path(candidate, ORIGIN, "/")
    }

    #[test]
    fn absent_candidate_returns_fallback() {
        assert_eq!(resolve(&RedirectCandidate::Absent), "/");
    }

    #[test]
    fn relative_path_is_kept() {
        let c = RedirectCandidate::Single("/account?tab=profile#top".to_string());
        assert_eq!(resolve(&c), "/account?tab=profile#top");
    }

    #[test]
    fn same_origin_absolute_url_reduces_to_path() {
        let c = RedirectCandidate::Single("https://app.example/billing?plan=pro".to_string());
        assert_eq!(resolve(&c), "/billing?plan=pro");
    }

    #[test]
    fn foreign_origin_returns_fallback() {
        let c = RedirectCandidate::Single("https://evil.test/x".to_string());
        assert_eq!(resolve(&c), "/");
    }

    #[test]
    fn scheme_relative_url_is_rejected() {
        let c = RedirectCandidate::Single("//evil.test".to_string());
        assert_eq!(resolve(&c), "/");
    }

    #[test]
    fn repeated_parameter_uses_first_element() {
        let c = RedirectCandidate::Many(vec!["/a".to_string(), "/b".to_string()]);
        assert_eq!(resolve(&c), "/a");
    }

    #[test]
    fn empty_array_returns_fallback() {
        let c = RedirectCandidate::Many(vec![]);
        assert_eq!(resolve(&c), "/");
    }

    #[test]
    fn different_port_is_a_different_origin() {
        let c = RedirectCandidate::Single("https://app.example:8443/x".to_string());
        assert_eq!(resolve(&c), "/");
    }

    #[test]
    fn custom_fallback_is_used() {
        let c = RedirectCandidate::Single("https://evil.test/".to_string());
        assert_eq!(
            resolve_safe_redirect_path(&c, ORIGIN, "/home"),
            "/home"
        );
    }

    #[test]
    fn bare_relative_path_resolves_against_origin() {
        let c = RedirectCandidate::Single("account".to_string());
        assert_eq!(resolve(&c), "/account");
    }

    #[test]
    fn invalid_origin_returns_fallback() {
        let c = RedirectCandidate::Single("/account".to_string());
        assert_eq!(resolve_safe_redirect_path(&c, "not a url", "/"), "/");
    }
}
