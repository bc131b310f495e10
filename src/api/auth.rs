//! Shared-secret API key check

use crate::error::ChurnError;
use axum::http::HeaderMap;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Verify the `x-api-key` header against the configured key
pub fn authorize(headers: &HeaderMap, expected: &str) -> Result<(), ChurnError> {
    let presented = headers
        .get(API_KEY_HEADER)
        .map(|v| v.as_bytes())
        .unwrap_or_default();

    if !expected.is_empty() && constant_time_eq(presented, expected.as_bytes()) {
        Ok(())
    } else {
        Err(ChurnError::Unauthorized)
    }
}

/// Presented key as it may appear in logs
pub fn masked_key(headers: &HeaderMap) -> String {
    match headers.get(API_KEY_HEADER) {
        None => "<absent>".to_string(),
        Some(value) => {
            let bytes = value.as_bytes();
            match bytes.len() {
                0 => "<empty>".to_string(),
                n if n <= 4 => "*".repeat(n),
                n => format!(
                    "{}{}",
                    String::from_utf8_lossy(&bytes[..2]),
                    "*".repeat(n - 2)
                ),
            }
        }
    }
}

/// Constant-time byte comparison
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(key: Option<&str>) -> HeaderMap {
        let mut map = HeaderMap::new();
        if let Some(key) = key {
            map.insert(API_KEY_HEADER, HeaderValue::from_str(key).unwrap());
        }
        map
    }

    #[test]
    fn test_exact_key_accepted() {
        assert!(authorize(&headers(Some("s3cret")), "s3cret").is_ok());
    }

    #[test]
    fn test_wrong_or_absent_key_rejected() {
        assert!(authorize(&headers(Some("s3cre")), "s3cret").is_err());
        assert!(authorize(&headers(Some("S3CRET")), "s3cret").is_err());
        assert!(authorize(&headers(None), "s3cret").is_err());
        assert!(authorize(&headers(Some("")), "").is_err());
    }

    #[test]
    fn test_masking() {
        assert_eq!(masked_key(&headers(None)), "<absent>");
        assert_eq!(masked_key(&headers(Some("abc"))), "***");
        assert_eq!(masked_key(&headers(Some("mysecret"))), "my******");
    }
}
