use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Byte-for-byte comparison without early exit, for signature checks.
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

pub fn hmac_sha256_hex(secret: &str, body: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(body.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Verify a plain hex HMAC-SHA256 signature over the raw body.
pub fn verify_hmac_hex(secret: &str, body: &str, provided: &str) -> bool {
    let expected = hmac_sha256_hex(secret, body);
    constant_time_compare(provided, &expected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hmac_is_deterministic() {
        let a = hmac_sha256_hex("secret", r#"{"id":"evt_1"}"#);
        let b = hmac_sha256_hex("secret", r#"{"id":"evt_1"}"#);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn hmac_changes_with_secret_and_body() {
        let base = hmac_sha256_hex("secret_a", r#"{"id":"evt_1"}"#);
        assert_ne!(base, hmac_sha256_hex("secret_b", r#"{"id":"evt_1"}"#));
        assert_ne!(base, hmac_sha256_hex("secret_a", r#"{"id":"evt_2"}"#));
    }

    #[test]
    fn verify_accepts_matching_signature() {
        let body = r#"{"event":{"id":"evt_1"}}"#;
        let sig = hmac_sha256_hex("shared_secret", body);
        assert!(verify_hmac_hex("shared_secret", body, &sig));
    }

    #[test]
    fn verify_rejects_wrong_signature() {
        let body = r#"{"event":{"id":"evt_1"}}"#;
        let sig = hmac_sha256_hex("other_secret", body);
        assert!(!verify_hmac_hex("shared_secret", body, &sig));
        assert!(!verify_hmac_hex("shared_secret", body, "deadbeef"));
        assert!(!verify_hmac_hex("shared_secret", body, ""));
    }

    #[test]
    fn compare_is_length_sensitive() {
        assert!(constant_time_compare("abc", "abc"));
        assert!(!constant_time_compare("abc", "abcd"));
        assert!(!constant_time_compare("abc", "abd"));
        assert!(constant_time_compare("", ""));
    }
}
