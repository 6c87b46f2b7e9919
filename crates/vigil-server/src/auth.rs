//! Shared-key credential check for write endpoints.

use axum::http::{header, HeaderMap};

pub const API_KEY_HEADER: &str = "X-API-Key";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("missing credential")]
    Missing,
    #[error("invalid credential")]
    Invalid,
}

/// Extracts the caller's credential from `X-API-Key` or
/// `Authorization: Bearer <key>`, in that order.
pub fn presented_credential(headers: &HeaderMap) -> Option<&str> {
    if let Some(key) = headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok()) {
        let key = key.trim();
        if !key.is_empty() {
            return Some(key);
        }
    }
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Checks `presented` against the configured key. With no key configured
/// every caller is accepted.
pub fn check_credential(expected: Option<&str>, presented: Option<&str>) -> Result<(), AuthError> {
    let Some(expected) = expected else {
        return Ok(());
    };
    match presented {
        None => Err(AuthError::Missing),
        Some(key) if constant_time_eq(expected.as_bytes(), key.as_bytes()) => Ok(()),
        Some(_) => Err(AuthError::Invalid),
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn credential_from_either_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(presented_credential(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(presented_credential(&headers), Some("abc"));

        headers.insert(API_KEY_HEADER, HeaderValue::from_static("xyz"));
        assert_eq!(presented_credential(&headers), Some("xyz"));

        let mut basic = HeaderMap::new();
        basic.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(presented_credential(&basic), None);
    }

    #[test]
    fn check_credential_cases() {
        assert_eq!(check_credential(None, None), Ok(()));
        assert_eq!(check_credential(None, Some("anything")), Ok(()));
        assert_eq!(check_credential(Some("k"), None), Err(AuthError::Missing));
        assert_eq!(check_credential(Some("k"), Some("kk")), Err(AuthError::Invalid));
        assert_eq!(check_credential(Some("k"), Some("k")), Ok(()));
    }
}
