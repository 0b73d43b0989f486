//! Bearer-token auth for the HTTP surface.
//!
//! `AuthMode::None` accepts everything; `AuthMode::Token` checks the
//! `Authorization: Bearer <token>` header against the configured token.
//! The other modes listed in `skynet_core::config::AuthMode` (password,
//! Tailscale, device-token, trusted-proxy) are not implemented here —
//! nothing in `spec.md` names them, so they fall through to "deny" rather
//! than being half-built.

use axum::http::HeaderMap;

use skynet_core::config::AuthMode;

use crate::app::AppState;

pub fn check_auth(state: &AppState, headers: &HeaderMap) -> bool {
    match &state.config.gateway.auth.mode {
        AuthMode::None => true,
        AuthMode::Token => {
            let expected = match &state.config.gateway.auth.token {
                Some(t) => t.as_str(),
                None => return false,
            };
            extract_bearer(headers).map(|t| t == expected).unwrap_or(false)
        }
        _ => false,
    }
}

pub fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn extract_bearer_strips_prefix() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer abc123"));
        assert_eq!(extract_bearer(&headers), Some("abc123"));
    }

    #[test]
    fn extract_bearer_missing_header() {
        let headers = HeaderMap::new();
        assert_eq!(extract_bearer(&headers), None);
    }
}
