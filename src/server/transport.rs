//! Reading and writing the session credential on HTTP messages.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequest, FromRequestParts};
use axum::http::header::{COOKIE, USER_AGENT};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue};

use super::AppState;
use crate::config::Settings;
use crate::error::AppError;
use crate::identity::CredentialCarrier;

pub fn parse_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    for cookie in headers.get_all(COOKIE) {
        let Ok(s) = cookie.to_str() else { continue; };
        for part in s.split(';') {
            let p = part.trim();
            if let Some((k, v)) = p.split_once('=') {
                if k.trim() == name { return Some(v.trim().to_string()); }
            }
        }
    }
    None
}

/// Collect both possible credential sources; precedence is decided by the carrier.
pub fn carrier_from_headers(headers: &HeaderMap, settings: &Settings) -> CredentialCarrier {
    CredentialCarrier {
        cookie: parse_cookie(headers, &settings.cookie_name),
        header: headers
            .get(settings.header_name.as_str())
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string()),
    }
}

/// Browser clients are recognised by a marker substring in the user-agent.
pub fn is_web_client(user_agent: Option<&str>, marker: &str) -> bool {
    let marker = marker.trim().to_ascii_lowercase();
    if marker.is_empty() { return false; }
    user_agent.is_some_and(|ua| ua.to_ascii_lowercase().contains(&marker))
}

pub fn set_session_cookie(settings: &Settings, token: &str) -> Result<HeaderValue, AppError> {
    let secure = if settings.cookie_secure { " Secure;" } else { "" };
    HeaderValue::from_str(&format!(
        "{}={}; HttpOnly;{} SameSite=Strict; Path=/; Max-Age={}",
        settings.cookie_name, token, secure, settings.session_ttl_secs
    ))
    .map_err(|e| AppError::internal("cookie_encoding".to_string(), e.to_string()))
}

pub fn clear_session_cookie(settings: &Settings) -> Result<HeaderValue, AppError> {
    let secure = if settings.cookie_secure { " Secure;" } else { "" };
    HeaderValue::from_str(&format!(
        "{}=deleted; Expires=Thu, 01 Jan 1970 00:00:00 GMT; Max-Age=0; HttpOnly;{} SameSite=Strict; Path=/",
        settings.cookie_name, secure
    ))
    .map_err(|e| AppError::internal("cookie_encoding".to_string(), e.to_string()))
}

/// JSON body extractor whose rejections use the crate's error body.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

/// Client provenance recorded on new sessions.
#[derive(Debug, Clone, Default)]
pub struct ClientMeta {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

/// Client address for the audit record. `X-Forwarded-For` is only consulted
/// when configured as trusted; otherwise the socket peer is used.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>, trust_forwarded_for: bool) -> Option<String> {
    let forwarded = trust_forwarded_for
        .then(|| headers.get("x-forwarded-for"))
        .flatten()
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    forwarded.or_else(|| peer.map(|addr| addr.ip().to_string()))
}

impl FromRequestParts<AppState> for ClientMeta {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let peer = parts.extensions.get::<ConnectInfo<SocketAddr>>().map(|ConnectInfo(addr)| *addr);
        let ip = client_ip(&parts.headers, peer, state.settings.trust_forwarded_for);
        let user_agent = parts.headers.get(USER_AGENT).and_then(|v| v.to_str().ok()).map(|s| s.to_string());
        Ok(ClientMeta { ip, user_agent })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::CarrierKind;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut h = HeaderMap::new();
        for (k, v) in pairs {
            h.append(*k, HeaderValue::from_str(v).unwrap());
        }
        h
    }

    #[test]
    fn cookie_is_found_among_others() {
        let h = headers(&[("cookie", "theme=dark; session_id=abc123; lang=en")]);
        assert_eq!(parse_cookie(&h, "session_id").as_deref(), Some("abc123"));
        assert_eq!(parse_cookie(&h, "missing"), None);
    }

    #[test]
    fn carrier_reads_configured_names_and_prefers_cookie() {
        let settings = Settings::default();
        let h = headers(&[("cookie", "session_id=from-cookie"), ("x-session-id", "from-header")]);
        let carrier = carrier_from_headers(&h, &settings);
        assert_eq!(carrier.token(), Some((CarrierKind::Cookie, "from-cookie")));

        let h = headers(&[("x-session-id", "from-header")]);
        let carrier = carrier_from_headers(&h, &settings);
        assert_eq!(carrier.token(), Some((CarrierKind::Header, "from-header")));
    }

    #[test]
    fn web_client_detection_is_case_insensitive() {
        assert!(is_web_client(Some("CareBridge-Web/2.1"), "web"));
        assert!(!is_web_client(Some("carebridge-ios/3"), "web"));
        assert!(!is_web_client(None, "web"));
        assert!(!is_web_client(Some("web"), ""));
    }

    #[test]
    fn forwarded_for_ignored_unless_trusted() {
        let peer: SocketAddr = "10.1.2.3:55000".parse().unwrap();
        let h = headers(&[("x-forwarded-for", "203.0.113.9, 10.0.0.1")]);
        assert_eq!(client_ip(&h, Some(peer), false).as_deref(), Some("10.1.2.3"));
        assert_eq!(client_ip(&h, None, false), None);
        assert_eq!(client_ip(&h, Some(peer), true).as_deref(), Some("203.0.113.9"));
        assert_eq!(client_ip(&HeaderMap::new(), Some(peer), true).as_deref(), Some("10.1.2.3"));
    }

    #[test]
    fn cookie_attributes() {
        let mut settings = Settings::default();
        let v = set_session_cookie(&settings, "tok").unwrap();
        let s = v.to_str().unwrap();
        assert!(s.starts_with("session_id=tok;"));
        assert!(s.contains("HttpOnly") && s.contains("Secure") && s.contains("SameSite=Strict"));
        assert!(s.contains("Max-Age=86400"));

        settings.cookie_secure = false;
        let v = clear_session_cookie(&settings).unwrap();
        assert!(!v.to_str().unwrap().contains("Secure"));
        assert!(v.to_str().unwrap().contains("Max-Age=0"));
    }
}
