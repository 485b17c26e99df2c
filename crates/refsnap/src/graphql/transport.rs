//! The transport boundary: execute one GraphQL document, get JSON back.
//!
//! The fetch engine never talks HTTP directly. It goes through
//! [`GraphqlTransport`], which classifies every failure into a
//! [`TransportError`] variant so the scheduler can decide what is
//! retryable. [`HttpTransport`] is the production implementation against
//! `api.github.com/graphql`; tests substitute scripted transports.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Value};
use thiserror::Error;

/// GitHub's GraphQL endpoint.
pub const GITHUB_GRAPHQL_URL: &str = "https://api.github.com/graphql";

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Fallback wait when the API rate-limits us without a `Retry-After` header.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Classified failures at the transport boundary.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Credentials missing or rejected. Never retried.
    #[error("authentication rejected by the API")]
    Unauthorized,

    /// The API asked us to back off. The scheduler retries the same
    /// request unchanged after the indicated wait.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    /// Connection-level failure, including request timeouts.
    #[error("network error: {message}")]
    Network { message: String },

    /// The response body did not have the shape we asked for, or the
    /// API reported GraphQL-level errors. Never retried.
    #[error("malformed response: {message}")]
    Malformed { message: String },

    /// Server-side HTTP error.
    #[error("server error: HTTP {status}")]
    Server { status: u16 },
}

impl TransportError {
    /// Create a network error from anything displayable.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create a malformed-response error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    /// Whether the scheduler may retry after this error.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::Network { .. } | Self::Server { .. }
        )
    }
}

/// Executes GraphQL documents against an API endpoint.
///
/// Implementations perform exactly one request per call and return the
/// `data` member of the GraphQL response. All retry policy belongs to
/// the scheduler, not here.
#[async_trait]
pub trait GraphqlTransport: Send + Sync {
    async fn execute(&self, document: &str, variables: Value) -> Result<Value, TransportError>;
}

/// reqwest-backed transport for the GitHub GraphQL API.
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    token: String,
}

impl HttpTransport {
    /// Build a transport with the given bearer token and per-request timeout.
    pub fn new(token: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("refsnap/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::network(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: GITHUB_GRAPHQL_URL.to_string(),
            token: token.into(),
        })
    }

    /// Override the endpoint, for GitHub Enterprise hosts.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

fn header_u64(headers: &reqwest::header::HeaderMap, name: &str) -> Option<u64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

/// Wait hinted by a rate-limiting response: the `Retry-After` header, or
/// the time until `x-ratelimit-reset` when the quota is exhausted.
/// `None` when the response carries no rate-limit signal at all, which
/// distinguishes an actual rate limit from a plain 403 (insufficient
/// token scopes, org policy) that waiting can never cure.
fn rate_limit_wait(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    if let Some(secs) = header_u64(headers, "retry-after") {
        return Some(Duration::from_secs(secs));
    }
    if header_u64(headers, "x-ratelimit-remaining")? > 0 {
        return None;
    }
    let wait = header_u64(headers, "x-ratelimit-reset")
        .and_then(|epoch| {
            let now = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .ok()?;
            Some(Duration::from_secs(epoch.saturating_sub(now.as_secs())))
        })
        .unwrap_or(DEFAULT_RETRY_AFTER);
    Some(wait)
}

#[async_trait]
impl GraphqlTransport for HttpTransport {
    async fn execute(&self, document: &str, variables: Value) -> Result<Value, TransportError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .json(&json!({ "query": document, "variables": variables }))
            .send()
            .await
            .map_err(|e| TransportError::network(e.to_string()))?;

        let status = response.status();
        match status {
            StatusCode::UNAUTHORIZED => return Err(TransportError::Unauthorized),
            StatusCode::TOO_MANY_REQUESTS => {
                return Err(TransportError::RateLimited {
                    retry_after: rate_limit_wait(response.headers())
                        .unwrap_or(DEFAULT_RETRY_AFTER),
                });
            }
            StatusCode::FORBIDDEN => {
                // A 403 is only a rate limit when the response says so;
                // otherwise it is a scope/policy rejection and retrying
                // the same token would loop forever.
                return Err(match rate_limit_wait(response.headers()) {
                    Some(retry_after) => TransportError::RateLimited { retry_after },
                    None => TransportError::Unauthorized,
                });
            }
            s if s.is_server_error() => {
                return Err(TransportError::Server { status: s.as_u16() });
            }
            s if !s.is_success() => {
                return Err(TransportError::malformed(format!(
                    "unexpected HTTP status {s}"
                )));
            }
            _ => {}
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| TransportError::malformed(e.to_string()))?;

        // GraphQL-level errors come back with HTTP 200.
        if let Some(errors) = body.get("errors").and_then(Value::as_array) {
            if !errors.is_empty() {
                let message = errors[0]
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown GraphQL error");
                return Err(TransportError::malformed(message.to_string()));
            }
        }

        match body.get("data") {
            Some(data) if !data.is_null() => Ok(data.clone()),
            _ => Err(TransportError::malformed("response has no data member")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderMap;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        pairs
            .iter()
            .map(|(k, v)| (k.parse().unwrap(), v.parse().unwrap()))
            .collect()
    }

    #[test]
    fn retry_after_header_wins() {
        let wait = rate_limit_wait(&headers(&[("retry-after", "30")]));
        assert_eq!(wait, Some(Duration::from_secs(30)));
    }

    #[test]
    fn exhausted_quota_is_a_rate_limit() {
        let wait = rate_limit_wait(&headers(&[("x-ratelimit-remaining", "0")]));
        assert_eq!(wait, Some(DEFAULT_RETRY_AFTER));

        let future = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs()
            + 300;
        let wait = rate_limit_wait(&headers(&[
            ("x-ratelimit-remaining", "0"),
            ("x-ratelimit-reset", &future.to_string()),
        ]))
        .unwrap();
        assert!(wait <= Duration::from_secs(300));
    }

    #[test]
    fn forbidden_without_rate_limit_signal_is_not_a_rate_limit() {
        // Scope/policy 403s carry neither header; waiting cannot cure
        // them, so the caller must not classify them as retryable.
        assert_eq!(rate_limit_wait(&headers(&[])), None);
        assert_eq!(
            rate_limit_wait(&headers(&[("x-ratelimit-remaining", "4321")])),
            None
        );
    }

    #[test]
    fn retryable_classification() {
        assert!(TransportError::RateLimited {
            retry_after: Duration::from_secs(1)
        }
        .is_retryable());
        assert!(TransportError::network("reset by peer").is_retryable());
        assert!(TransportError::Server { status: 502 }.is_retryable());
        assert!(!TransportError::Unauthorized.is_retryable());
        assert!(!TransportError::malformed("bad shape").is_retryable());
    }
}
