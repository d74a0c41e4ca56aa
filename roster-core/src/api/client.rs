use super::error::*;
use backoff::{future::retry, ExponentialBackoff};
use reqwest::{ClientBuilder, StatusCode};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_USER_AGENT: &str = concat!("roster-sync/", env!("CARGO_PKG_VERSION"));

/// Settings shared by every outbound HTTP call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpSettings {
    /// Uniform timeout applied to every request
    pub timeout: Duration,
    /// Upper bound on retrying idempotent source reads; zero disables retries
    pub retry_max_elapsed: Duration,
    pub user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            retry_max_elapsed: Duration::from_secs(30),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Builder for the shared `reqwest::Client`
pub struct HttpClientBuilder {
    timeout: Option<Duration>,
    user_agent: Option<String>,
}

impl HttpClientBuilder {
    pub fn new() -> Self {
        Self {
            timeout: None,
            user_agent: None,
        }
    }

    pub fn from_settings(settings: &HttpSettings) -> Self {
        Self::new()
            .timeout(settings.timeout)
            .user_agent(settings.user_agent.clone())
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn build(self) -> Result<reqwest::Client> {
        let mut client_builder = ClientBuilder::new();

        if let Some(timeout) = self.timeout {
            client_builder = client_builder.timeout(timeout);
        }

        if let Some(user_agent) = self.user_agent {
            client_builder = client_builder.user_agent(user_agent);
        }

        client_builder.build().map_err(ApiError::Network)
    }
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Turn a non-success response into an `ApiError`, consuming the body.
pub(crate) async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = retry_after(&response);
    let error_text = response.text().await.unwrap_or_default();
    Err(status_error(status, retry_after, &error_text))
}

/// Seconds from a numeric `Retry-After` header.
pub(crate) fn retry_after(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get("retry-after")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
}

/// Error for a non-success status whose body was already read.
pub(crate) fn status_error(status: StatusCode, retry_after: Option<u64>, body: &str) -> ApiError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => ApiError::RateLimit { retry_after },
        _ => ApiError::Server {
            status: status.as_u16(),
            message: truncate(body, 500).to_string(),
        },
    }
}

/// Retry an idempotent operation on transient errors until `max_elapsed` runs out.
pub(crate) async fn retry_transient<F, Fut, T>(max_elapsed: Duration, operation: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    if max_elapsed.is_zero() {
        return operation().await;
    }

    let backoff = ExponentialBackoff {
        initial_interval: Duration::from_millis(200),
        max_interval: Duration::from_secs(10),
        max_elapsed_time: Some(max_elapsed),
        ..Default::default()
    };

    retry(backoff, || async {
        match operation().await {
            Ok(result) => Ok(result),
            Err(error) if error.is_retryable() => {
                warn!("Retryable error occurred: {}", error);
                match error.retry_after() {
                    Some(secs) => Err(backoff::Error::retry_after(error, Duration::from_secs(secs))),
                    None => Err(backoff::Error::transient(error)),
                }
            }
            Err(error) => {
                debug!("Non-retryable error: {}", error);
                Err(backoff::Error::permanent(error))
            }
        }
    })
    .await
}

/// Cut `text` to at most `max_chars` characters on a char boundary.
pub fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_client_builder() {
        let client = HttpClientBuilder::new()
            .timeout(Duration::from_secs(60))
            .user_agent("test-client/1.0")
            .build();
        assert!(client.is_ok());
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("short", 300), "short");
    }

    #[tokio::test]
    async fn test_retry_disabled_calls_once() {
        let calls = AtomicUsize::new(0);
        let result: Result<()> = retry_transient(Duration::ZERO, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ApiError::Server {
                status: 503,
                message: "unavailable".to_string(),
            })
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_error() {
        let calls = AtomicUsize::new(0);
        let result = retry_transient(Duration::from_secs(5), || async {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(ApiError::Server {
                    status: 502,
                    message: "bad gateway".to_string(),
                })
            } else {
                Ok(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_stops_on_permanent_error() {
        let calls = AtomicUsize::new(0);
        let result: Result<()> = retry_transient(Duration::from_secs(5), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ApiError::UnrecognizedShape("nope".to_string()))
        })
        .await;

        assert!(matches!(result, Err(ApiError::UnrecognizedShape(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
