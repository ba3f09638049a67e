// ============================
// debate-backend-lib/src/auth/mod.rs
// ============================
//! Session identity and socket authentication.

pub mod authenticator;
pub mod session;

pub use authenticator::{authenticate, Authorized, SocketQuery};
pub use session::{BrowserSession, SessionStore};

use axum::http::{header::COOKIE, HeaderMap};

/// Value of cookie `name` from the request headers
pub fn session_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim_matches('"').to_string())
        .filter(|value| !value.is_empty())
}
