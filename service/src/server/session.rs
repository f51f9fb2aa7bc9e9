use axum::http::{HeaderMap, HeaderValue, header};

use sql_gate_core::config::SessionRules;
use sql_gate_core::session::SessionToken;

const MAX_COOKIE_HEADER_BYTES: usize = 8192;

/// Value of the session cookie across every `Cookie` header; first match wins.
pub(super) fn session_cookie<'a>(headers: &'a HeaderMap, cookie_name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter(|value| value.len() <= MAX_COOKIE_HEADER_BYTES)
        .filter_map(|value| value.to_str().ok())
        .flat_map(|raw| raw.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == cookie_name)
        .map(|(_, value)| value.trim_matches('"'))
}

/// No `Max-Age` / `Expires`: the cookie lives for the browser session.
pub(super) fn set_cookie(rules: &SessionRules, token: &SessionToken) -> Option<HeaderValue> {
    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax",
        rules.cookie_name,
        token.as_str()
    );
    if rules.secure_cookie {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie).ok()
}

/// The request body, if the request declares it as JSON.
pub(super) fn json_body<'a>(headers: &HeaderMap, body: &'a [u8]) -> Option<&'a [u8]> {
    let content_type = headers.get(header::CONTENT_TYPE)?.to_str().ok()?;
    let mime = content_type.split(';').next()?.trim();
    mime.eq_ignore_ascii_case("application/json").then_some(body)
}
