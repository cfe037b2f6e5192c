//! HTTP retry with exponential backoff.
//!
//! Every request to a map service goes through [`send_json`] so that
//! timeouts, dropped connections, rate limiting, and server errors are
//! retried before a batch is given up on.
//!
//! ```ignore
//! let body = retry::send_json(&policy, || client.post(&url).form(&params)).await?;
//! ```

use std::time::Duration;

use serde::Deserialize;

use crate::FetchError;

/// Maximum length of the response body preview included in error logs.
const BODY_PREVIEW_LEN: usize = 500;

/// How often and how patiently to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt for connection errors, timeouts,
    /// HTTP 429, and HTTP 5xx.
    pub max_retries: u32,
    /// Full re-fetches when a response arrives but its body cannot be read
    /// or decoded.
    pub max_body_retries: u32,
    /// Delay before the first retry, in milliseconds; doubled on each
    /// further retry.
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            max_body_retries: 2,
            base_delay_ms: 2000,
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry number `attempt` (1-based).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor))
    }
}

/// Sends a request and decodes the body as JSON, retrying per `policy`.
///
/// `build_request` is called once per attempt since a
/// [`reqwest::RequestBuilder`] is consumed by sending it.
///
/// # Errors
///
/// Returns [`FetchError`] if the request still fails after all retries, the
/// server answers with a permanent 4xx status, or the body never decodes.
#[allow(clippy::future_not_send)]
pub async fn send_json<F>(
    policy: &RetryPolicy,
    build_request: F,
) -> Result<serde_json::Value, FetchError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut body_attempt = 0;

    loop {
        let response = send_inner(policy, &build_request).await?;
        let url = response.url().to_string();
        let status = response.status();

        let failure = match response.text().await {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(value) => return Ok(value),
                Err(e) => {
                    let preview = text.chars().take(BODY_PREVIEW_LEN).collect::<String>();
                    log::warn!(
                        "JSON parse failed\n  url: {url}\n  status: {status}\n  \
                         received: {} bytes\n  error: {e}\n  body preview: {preview}",
                        text.len()
                    );
                    FetchError::Json(e)
                }
            },
            Err(e) => {
                log::warn!("Response body read failed\n  url: {url}\n  status: {status}\n  error: {e}");
                FetchError::Http(e)
            }
        };

        if body_attempt >= policy.max_body_retries {
            log::error!("Giving up on {url} after {body_attempt} body retries");
            return Err(failure);
        }

        body_attempt += 1;
        let delay = policy.delay(body_attempt);
        log::warn!(
            "  body retry {body_attempt}/{} in {delay:?}...",
            policy.max_body_retries
        );
        tokio::time::sleep(delay).await;
    }
}

/// Sends the request, retrying transient failures. Returns the first
/// response with a 2xx or 3xx status.
#[allow(clippy::future_not_send)]
async fn send_inner<F>(policy: &RetryPolicy, build_request: &F) -> Result<reqwest::Response, FetchError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut attempt = 0;

    loop {
        if attempt > 0 {
            let delay = policy.delay(attempt);
            log::warn!("  retry {attempt}/{} in {delay:?}...", policy.max_retries);
            tokio::time::sleep(delay).await;
        }
        let can_retry = attempt < policy.max_retries;
        attempt += 1;

        let response = match build_request().send().await {
            Ok(response) => response,
            Err(e) if is_transient(&e) && can_retry => {
                log::warn!("  transient error: {e}");
                continue;
            }
            Err(e) => return Err(FetchError::Http(e)),
        };

        let status = response.status();
        match classify(status) {
            StatusClass::Success => return Ok(response),
            StatusClass::Transient if can_retry => {
                log::warn!("  HTTP {status}");
            }
            StatusClass::Transient => {
                return Err(FetchError::Service {
                    message: format!("HTTP {status} after {} retries", policy.max_retries),
                });
            }
            StatusClass::Permanent => {
                return Err(FetchError::Service {
                    message: format!("HTTP {status}"),
                });
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatusClass {
    Success,
    Transient,
    Permanent,
}

/// 429 and 5xx are worth retrying; any other 4xx is not.
fn classify(status: reqwest::StatusCode) -> StatusClass {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        StatusClass::Transient
    } else if status.is_client_error() {
        StatusClass::Permanent
    } else {
        StatusClass::Success
    }
}

/// Returns `true` if the error is likely transient and worth retrying.
fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_body() || e.is_request()
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;

    use super::*;

    #[test]
    fn backoff_doubles_from_base_delay() {
        let policy = RetryPolicy {
            base_delay_ms: 100,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay(1), Duration::from_millis(100));
        assert_eq!(policy.delay(2), Duration::from_millis(200));
        assert_eq!(policy.delay(4), Duration::from_millis(800));
    }

    #[test]
    fn rate_limit_and_server_errors_are_transient() {
        assert_eq!(classify(StatusCode::TOO_MANY_REQUESTS), StatusClass::Transient);
        assert_eq!(classify(StatusCode::GATEWAY_TIMEOUT), StatusClass::Transient);
        assert_eq!(classify(StatusCode::SERVICE_UNAVAILABLE), StatusClass::Transient);
    }

    #[test]
    fn other_client_errors_are_permanent() {
        assert_eq!(classify(StatusCode::BAD_REQUEST), StatusClass::Permanent);
        assert_eq!(classify(StatusCode::NOT_FOUND), StatusClass::Permanent);
        assert_eq!(classify(StatusCode::OK), StatusClass::Success);
    }

    #[tokio::test]
    async fn connection_refused_gives_up_after_retries() {
        let policy = RetryPolicy {
            max_retries: 1,
            max_body_retries: 0,
            base_delay_ms: 1,
        };
        let client = reqwest::Client::new();
        // Port 9 on localhost is reserved (discard) and normally closed.
        let result = send_json(&policy, || client.get("http://127.0.0.1:9/")).await;
        assert!(matches!(result, Err(FetchError::Http(_))));
    }
}
