use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Name of the signature header attached to every outgoing delivery.
pub const SIGNATURE_HEADER: &str = "X-Webhooks-Signature";

/// Computes the hex digest of `HMAC_SHA256(secret, "<timestamp_ms>.<body>")`.
///
/// The signed bytes are the decimal timestamp, a literal `.`, and the exact
/// body bytes that go on the wire. Lowercase hex output.
pub fn sign(secret: &str, timestamp_ms: i64, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(timestamp_ms.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Builds the header value: `t=<epoch_ms>, s=<hex_digest>`.
pub fn signature_header(secret: &str, timestamp_ms: i64, body: &[u8]) -> String {
    format!("t={}, s={}", timestamp_ms, sign(secret, timestamp_ms, body))
}

/// Verifies a received header value against the body it accompanied.
///
/// Recomputes the digest from the timestamp carried in the header and
/// compares in constant time. Returns false on any malformed header.
pub fn verify_header(secret: &str, header: &str, body: &[u8]) -> bool {
    let Some((timestamp_ms, digest)) = parse_header(header) else {
        return false;
    };
    let Ok(digest_bytes) = hex::decode(digest) else {
        return false;
    };

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(timestamp_ms.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    mac.verify_slice(&digest_bytes).is_ok()
}

fn parse_header(header: &str) -> Option<(i64, &str)> {
    let mut timestamp = None;
    let mut digest = None;
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", v)) => timestamp = v.parse::<i64>().ok(),
            Some(("s", v)) => digest = Some(v),
            _ => return None,
        }
    }
    Some((timestamp?, digest?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signing_is_deterministic() {
        let a = sign("secret", 1_700_000_000_000, br#"{"event":"created"}"#);
        let b = sign("secret", 1_700_000_000_000, br#"{"event":"created"}"#);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64, "SHA-256 digest should be 32 hex-encoded bytes");
        assert_eq!(a, a.to_lowercase());
    }

    #[test]
    fn header_round_trips() {
        let body = br#"{"order_id":42}"#;
        let header = signature_header("topsecret", 1_700_000_000_123, body);
        assert!(header.starts_with("t=1700000000123, s="));
        assert!(verify_header("topsecret", &header, body));
    }

    #[test]
    fn mutated_body_fails_verification() {
        let header = signature_header("topsecret", 1_700_000_000_123, b"original");
        assert!(!verify_header("topsecret", &header, b"tampered"));
    }

    #[test]
    fn wrong_secret_fails_verification() {
        let header = signature_header("topsecret", 1_700_000_000_123, b"body");
        assert!(!verify_header("othersecret", &header, b"body"));
    }

    #[test]
    fn malformed_headers_are_rejected() {
        for header in ["", "t=,s=", "t=abc, s=ff", "s=ff", "t=123", "garbage"] {
            assert!(
                !verify_header("topsecret", header, b"body"),
                "accepted malformed header {header:?}"
            );
        }
    }

    #[test]
    fn timestamp_is_part_of_the_signed_input() {
        let a = sign("secret", 1, b"body");
        let b = sign("secret", 2, b"body");
        assert_ne!(a, b);
    }
}
