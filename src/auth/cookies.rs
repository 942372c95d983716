//! Cookie naming policy and the signed session-cookie codec.
//!
//! All cookie names come from [`CookieNames`]; no call site spells a name
//! out. The session payload is JSON, HMAC-SHA256 signed, base64url encoded,
//! and split across two cookie slots when it outgrows a single one.

use crate::auth::token::SessionToken;
use base64ct::{Base64UrlUnpadded, Encoding};
use hmac::{Hmac, Mac};
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

/// Browsers cap a cookie at 4096 bytes including name and attributes; stay
/// comfortably under that for the value alone.
const SPLIT_THRESHOLD: usize = 3900;

const SESSION_MAX_AGE_SECS: i64 = 30 * 24 * 60 * 60;

/// Resolved cookie names for one deployment environment.
///
/// Production names carry the `__Secure-` prefix (and `__Host-` for the
/// CSRF cookie, which never needs a Domain attribute).
#[derive(Clone, Debug, PartialEq)]
pub struct CookieNames {
    pub session: String,
    pub session_part0: String,
    pub session_part1: String,
    pub csrf: String,
    pub callback: String,
    pub state: String,
}

impl CookieNames {
    #[must_use]
    pub fn for_env(production: bool) -> Self {
        let secure = if production { "__Secure-" } else { "" };
        let host = if production { "__Host-" } else { "" };
        Self {
            session: format!("{secure}pordisto.session-token"),
            session_part0: format!("{secure}pordisto.session-token.0"),
            session_part1: format!("{secure}pordisto.session-token.1"),
            csrf: format!("{host}pordisto.csrf-token"),
            callback: format!("{secure}pordisto.callback-url"),
            state: format!("{secure}pordisto.state"),
        }
    }

    /// Every name this service may have set, for wholesale clearing.
    #[must_use]
    pub fn all(&self) -> [&str; 6] {
        [
            &self.session,
            &self.session_part0,
            &self.session_part1,
            &self.csrf,
            &self.callback,
            &self.state,
        ]
    }
}

/// Extract one cookie's value from a raw `Cookie` request header.
#[must_use]
pub fn cookie_value(header: &str, name: &str) -> Option<String> {
    header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name).then(|| value.to_string())
    })
}

/// Reassemble the serialized session value from a `Cookie` header,
/// preferring the unsplit slot, then joining `.0` + `.1`.
#[must_use]
pub fn session_value(header: &str, names: &CookieNames) -> Option<String> {
    if let Some(whole) = cookie_value(header, &names.session) {
        return Some(whole);
    }
    let part0 = cookie_value(header, &names.session_part0)?;
    let part1 = cookie_value(header, &names.session_part1).unwrap_or_default();
    Some(format!("{part0}{part1}"))
}

/// Whether any session cookie slot is present, reassemblable or not. An
/// orphan split fragment still counts: it marks a session that existed and
/// must be cleared, not an anonymous visitor.
#[must_use]
pub fn has_session_slot(header: &str, names: &CookieNames) -> bool {
    [&names.session, &names.session_part0, &names.session_part1]
        .iter()
        .any(|name| cookie_value(header, name).is_some())
}

/// Rebuild a `Cookie` header carrying only this service's auth cookies.
///
/// Used when forging the re-entrant session-update call: the inbound header
/// is filtered down to the fragments this service owns, so unrelated
/// application cookies never travel on the internal hop.
#[must_use]
pub fn build_auth_cookie_header(raw: Option<&str>, names: &CookieNames) -> String {
    let Some(raw) = raw else {
        return String::new();
    };
    let owned = names.all();
    raw.split(';')
        .filter_map(|pair| {
            let trimmed = pair.trim();
            let (name, _) = trimmed.split_once('=')?;
            owned.contains(&name).then_some(trimmed)
        })
        .collect::<Vec<_>>()
        .join("; ")
}

/// Signs and verifies the session cookie payload.
#[derive(Clone)]
pub struct SessionCodec {
    secret: SecretString,
}

impl SessionCodec {
    #[must_use]
    pub fn new(secret: SecretString) -> Self {
        Self { secret }
    }

    fn mac(&self) -> HmacSha256 {
        // Infallible: HMAC accepts keys of any length.
        HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .unwrap_or_else(|_| unreachable!())
    }

    fn sign(&self, payload: &str) -> String {
        let mut mac = self.mac();
        mac.update(payload.as_bytes());
        Base64UrlUnpadded::encode_string(&mac.finalize().into_bytes())
    }

    /// Serialize a token bundle into the `payload.signature` cookie value.
    ///
    /// # Errors
    /// Returns an error if the bundle cannot be serialized.
    pub fn encode(&self, token: &SessionToken) -> anyhow::Result<String> {
        let json = serde_json::to_string(token)?;
        let payload = Base64UrlUnpadded::encode_string(json.as_bytes());
        let signature = self.sign(&payload);
        Ok(format!("{payload}.{signature}"))
    }

    /// Decode and verify a cookie value back into a token bundle.
    ///
    /// Returns `None` on any structural or signature failure; a tampered
    /// cookie is indistinguishable from an absent one.
    #[must_use]
    pub fn decode(&self, value: &str) -> Option<SessionToken> {
        let (payload, signature) = value.split_once('.')?;

        let mut mac = self.mac();
        mac.update(payload.as_bytes());
        let given = Base64UrlUnpadded::decode_vec(signature).ok()?;
        if mac.verify_slice(&given).is_err() {
            debug!("Session cookie signature mismatch");
            return None;
        }

        let json = Base64UrlUnpadded::decode_vec(payload).ok()?;
        serde_json::from_slice(&json).ok()
    }

    /// Mint a CSRF cookie value of the form `token|hash`, where the hash
    /// binds the token to this service's secret. Returns `(cookie_value,
    /// token)`; only the token half ever travels in a header or body.
    #[must_use]
    pub fn mint_csrf(&self) -> (String, String) {
        let mut raw = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut raw);
        let token = Base64UrlUnpadded::encode_string(&raw);
        let hash = self.sign(&token);
        (format!("{token}|{hash}"), token)
    }

    /// Check a submitted CSRF token against the double-submit cookie value.
    #[must_use]
    pub fn verify_csrf(&self, cookie: &str, submitted: &str) -> bool {
        let Some(token) = csrf_token_half(cookie) else {
            return false;
        };
        token == submitted && self.sign(token) == csrf_hash_half(cookie).unwrap_or_default()
    }
}

/// The token half of a `token|hash` CSRF cookie value. A bare value with no
/// separator is taken as the token itself.
#[must_use]
pub fn csrf_token_half(cookie: &str) -> Option<&str> {
    let token = cookie.split('|').next().unwrap_or(cookie);
    (!token.is_empty()).then_some(token)
}

fn csrf_hash_half(cookie: &str) -> Option<&str> {
    cookie.split_once('|').map(|(_, hash)| hash)
}

/// Render the `Set-Cookie` headers that persist a serialized session value,
/// splitting across two slots above the size threshold and clearing the
/// slots the split leaves unused.
#[must_use]
pub fn session_set_cookies(value: &str, names: &CookieNames, production: bool) -> Vec<String> {
    if value.len() <= SPLIT_THRESHOLD {
        vec![
            set_cookie(&names.session, value, production, SESSION_MAX_AGE_SECS),
            clear_cookie(&names.session_part0, production),
            clear_cookie(&names.session_part1, production),
        ]
    } else {
        let (part0, part1) = value.split_at(SPLIT_THRESHOLD);
        vec![
            set_cookie(&names.session_part0, part0, production, SESSION_MAX_AGE_SECS),
            set_cookie(&names.session_part1, part1, production, SESSION_MAX_AGE_SECS),
            clear_cookie(&names.session, production),
        ]
    }
}

/// `Set-Cookie` headers expiring every auth cookie this service owns.
#[must_use]
pub fn clear_session_cookies(names: &CookieNames, production: bool) -> Vec<String> {
    names
        .all()
        .iter()
        .map(|name| clear_cookie(name, production))
        .collect()
}

#[must_use]
pub fn set_cookie(name: &str, value: &str, production: bool, max_age: i64) -> String {
    let secure = if production { "; Secure" } else { "" };
    format!("{name}={value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}{secure}")
}

/// A cookie with no `Max-Age`, scoped to the browser session. Used for the
/// CSRF cookie, which must outlive any fixed window but not the browser.
#[must_use]
pub fn set_session_scoped_cookie(name: &str, value: &str, production: bool) -> String {
    let secure = if production { "; Secure" } else { "" };
    format!("{name}={value}; Path=/; HttpOnly; SameSite=Lax{secure}")
}

#[must_use]
pub fn clear_cookie(name: &str, production: bool) -> String {
    let secure = if production { "; Secure" } else { "" };
    format!("{name}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0{secure}")
}
