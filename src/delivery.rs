use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{CONTENT_TYPE, RETRY_AFTER};
use tracing::debug;

use crate::signer::SIGNATURE_HEADER;

/// Classified result of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// 2xx response; done.
    Delivered { status: u16 },
    /// Worth retrying: 408, 429, 5xx, anything outside the 2xx/4xx families,
    /// or a network-level failure with no status at all. May carry a
    /// server-supplied retry-after hint, already normalized to milliseconds.
    Retryable {
        status: Option<u16>,
        error: String,
        retry_after_ms: Option<u64>,
    },
    /// 4xx other than 408/429; retrying cannot help.
    Permanent { status: u16, error: String },
}

/// Maps a response status (and optional retry-after hint) onto the outcome
/// taxonomy. Network failures never reach this; they are retryable by
/// construction.
pub fn classify(status: u16, retry_after_ms: Option<u64>) -> DeliveryOutcome {
    match status {
        200..=299 => DeliveryOutcome::Delivered { status },
        408 | 429 => DeliveryOutcome::Retryable {
            status: Some(status),
            error: format!("destination answered {status}"),
            retry_after_ms,
        },
        400..=499 => DeliveryOutcome::Permanent {
            status,
            error: format!("destination answered {status}"),
        },
        // 1xx, 3xx, 5xx and anything else undistinguishable: retry.
        _ => DeliveryOutcome::Retryable {
            status: Some(status),
            error: format!("destination answered {status}"),
            retry_after_ms,
        },
    }
}

/// Normalizes a Retry-After header to milliseconds.
///
/// Accepts the delta-seconds form and the HTTP-date form; a date in the past
/// collapses to 0. Anything unparseable is discarded here so the backoff
/// calculator only ever sees a clean number.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<u64> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return seconds.checked_mul(1000);
    }
    if let Ok(at) = DateTime::parse_from_rfc2822(value) {
        let delta_ms = (at.with_timezone(&Utc) - now).num_milliseconds();
        return Some(delta_ms.max(0) as u64);
    }
    debug!(retry_after = value, "Ignoring unparseable Retry-After header");
    None
}

/// One HTTP POST attempt against a destination endpoint.
#[async_trait]
pub trait DeliveryClient: Send + Sync {
    async fn deliver(&self, endpoint: &str, body: &[u8], signature: &str) -> DeliveryOutcome;
}

/// reqwest-backed delivery client with a bounded per-request timeout.
pub struct HttpDeliveryClient {
    client: reqwest::Client,
}

impl HttpDeliveryClient {
    pub fn new(request_timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(request_timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl DeliveryClient for HttpDeliveryClient {
    async fn deliver(&self, endpoint: &str, body: &[u8], signature: &str) -> DeliveryOutcome {
        let response = self
            .client
            .post(endpoint)
            .header(CONTENT_TYPE, "application/json")
            .header(SIGNATURE_HEADER, signature)
            .body(body.to_vec())
            .send()
            .await;

        match response {
            Ok(response) => {
                let status = response.status().as_u16();
                let retry_after = response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| parse_retry_after(v, Utc::now()));
                classify(status, retry_after)
            }
            // Timeouts, refused connections, and DNS failures all land here
            // and are treated like a 5xx.
            Err(e) => DeliveryOutcome::Retryable {
                status: None,
                error: e.to_string(),
                retry_after_ms: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn two_hundreds_are_delivered() {
        assert_eq!(classify(200, None), DeliveryOutcome::Delivered { status: 200 });
        assert_eq!(classify(204, None), DeliveryOutcome::Delivered { status: 204 });
    }

    #[test]
    fn timeouts_and_throttles_are_retryable() {
        for status in [408, 429, 500, 502, 503, 504] {
            assert!(
                matches!(classify(status, None), DeliveryOutcome::Retryable { .. }),
                "{status} should be retryable"
            );
        }
    }

    #[test]
    fn other_client_errors_are_permanent() {
        for status in [400, 401, 403, 404, 410, 422] {
            assert!(
                matches!(classify(status, None), DeliveryOutcome::Permanent { .. }),
                "{status} should be permanent"
            );
        }
    }

    #[test]
    fn odd_status_families_are_retryable() {
        for status in [100, 301, 302] {
            assert!(
                matches!(classify(status, None), DeliveryOutcome::Retryable { .. }),
                "{status} should be retryable"
            );
        }
    }

    #[test]
    fn retry_after_hint_is_carried_through() {
        let outcome = classify(429, Some(2000));
        assert_eq!(
            outcome,
            DeliveryOutcome::Retryable {
                status: Some(429),
                error: "destination answered 429".to_string(),
                retry_after_ms: Some(2000),
            }
        );
    }

    #[test]
    fn retry_after_delta_seconds() {
        let now = Utc::now();
        assert_eq!(parse_retry_after("2", now), Some(2000));
        assert_eq!(parse_retry_after(" 120 ", now), Some(120_000));
        assert_eq!(parse_retry_after("0", now), Some(0));
    }

    #[test]
    fn retry_after_http_date() {
        let now = DateTime::parse_from_rfc2822("Fri, 28 Aug 2026 12:00:00 GMT")
            .unwrap()
            .with_timezone(&Utc);
        let later = now + ChronoDuration::seconds(30);
        assert_eq!(
            parse_retry_after(&later.to_rfc2822(), now),
            Some(30_000)
        );
    }

    #[test]
    fn retry_after_date_in_the_past_is_zero() {
        let now = Utc::now();
        let earlier = now - ChronoDuration::seconds(30);
        assert_eq!(parse_retry_after(&earlier.to_rfc2822(), now), Some(0));
    }

    #[test]
    fn unparseable_retry_after_is_discarded() {
        let now = Utc::now();
        assert_eq!(parse_retry_after("soon", now), None);
        assert_eq!(parse_retry_after("-5", now), None);
        assert_eq!(parse_retry_after("", now), None);
    }
}
