//! Retry loop with exponential backoff.
//!
//! # Retry Policy
//!
//! - Attempts are numbered 1..=`max_attempts`; the same request is re-issued
//!   each time.
//! - Only transport-level failures are retried: any error raised by the send
//!   itself (connection refused, TLS handshake, timeout, lower-level I/O)
//!   before a complete response is in hand.
//! - An HTTP error status is terminal on first occurrence. A status-level
//!   rejection from a reachable, correctly-speaking peer is unlikely to be
//!   transient within this budget, and a 404 must not be retried as if it
//!   were a network blip.
//! - The pause before attempt k+1 is `backoff_unit * 2^(k-1)`: 1, 2, 4, 8 ...
//!   units. The wait is a cooperative suspension; other in-flight work on the
//!   runtime keeps making progress.

use std::time::Duration;

use reqwest::StatusCode;

/// Response bodies attached to status errors are capped at this size.
const MAX_ERROR_BODY_BYTES: usize = 32 * 1024;

#[derive(Debug, Clone, Copy)]
pub(crate) struct RetryPolicy {
    /// Total attempt budget, at least 1.
    pub max_attempts: u32,
    /// Duration of one backoff unit.
    pub backoff_unit: Duration,
}

/// Backoff pause taken after a failed attempt `attempt` (1-based):
/// `unit * 2^(attempt - 1)`.
#[must_use]
pub fn backoff_delay(attempt: u32, unit: Duration) -> Duration {
    let doublings = attempt.saturating_sub(1).min(31);
    unit.saturating_mul(2u32.saturating_pow(doublings))
}

/// How a dispatch attempt sequence ended.
///
/// Structurally separates the three terminal shapes so the caller cannot
/// mistake an error response for success.
#[derive(Debug)]
pub(crate) enum RetryOutcome {
    /// Success status; full body captured.
    Success { status: StatusCode, body: Vec<u8> },
    /// Error status from the peer; body capped for diagnostics.
    Status { status: StatusCode, body: String },
    /// The whole budget was consumed by transport failures.
    Exhausted { attempts: u32, source: reqwest::Error },
}

/// Issue a request up to `policy.max_attempts` times.
///
/// `build_request` is called once per attempt. A failure to read the body of
/// a success response counts as a transport failure for that attempt: the
/// attempt did not produce a complete response.
pub(crate) async fn send_with_retry<F>(
    build_request: F,
    policy: RetryPolicy,
    method: &str,
    url: &str,
) -> RetryOutcome
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut attempt = 1u32;
    loop {
        let failure = match build_request().send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    match response.bytes().await {
                        Ok(body) => {
                            return RetryOutcome::Success {
                                status,
                                body: body.to_vec(),
                            };
                        }
                        Err(e) => e,
                    }
                } else {
                    let body = read_capped_error_body(response).await;
                    return RetryOutcome::Status { status, body };
                }
            }
            Err(e) => e,
        };

        tracing::warn!(method, url, attempt, error = %failure, "transport failure");

        if attempt >= policy.max_attempts {
            return RetryOutcome::Exhausted {
                attempts: attempt,
                source: failure,
            };
        }

        let delay = backoff_delay(attempt, policy.backoff_unit);
        tracing::debug!(
            method,
            url,
            attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "backing off before retry"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

/// Read a response body for diagnostics, truncating at [`MAX_ERROR_BODY_BYTES`].
///
/// Read failures terminate the capture early; whatever was received is kept.
pub(crate) async fn read_capped_error_body(response: reqwest::Response) -> String {
    use futures_util::StreamExt;

    let mut collected = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let Ok(chunk) = chunk else { break };
        collected.extend_from_slice(&chunk);
        if collected.len() > MAX_ERROR_BODY_BYTES {
            collected.truncate(MAX_ERROR_BODY_BYTES);
            return format!("{}...(truncated)", String::from_utf8_lossy(&collected));
        }
    }
    String::from_utf8_lossy(&collected).into_owned()
}
