//! Retry policy for transport executions.
//!
//! Rate-limit responses suspend the caller for the advertised wait and
//! retry the same request unchanged, without consuming a retry attempt.
//! Transient network and server errors back off exponentially up to a
//! bounded attempt count. Authentication and malformed-response errors
//! are never retried.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBuilder};
use serde_json::Value;

use crate::graphql::{GraphqlTransport, TransportError};

/// Initial backoff delay in milliseconds.
pub const INITIAL_BACKOFF_MS: u64 = 1_000;

/// Maximum backoff delay in milliseconds.
pub const MAX_BACKOFF_MS: u64 = 60_000;

/// Default retry attempts for transient transport failures.
pub const DEFAULT_MAX_RETRIES: usize = 5;

/// Configuration for retrying transient transport failures.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Minimum delay between retries.
    pub min_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Maximum number of retry attempts.
    pub max_retries: usize,
    /// Whether to add jitter to delays.
    pub with_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(INITIAL_BACKOFF_MS),
            max_delay: Duration::from_millis(MAX_BACKOFF_MS),
            max_retries: DEFAULT_MAX_RETRIES,
            with_jitter: true,
        }
    }
}

impl RetryConfig {
    /// Create a new retry configuration with custom values.
    #[must_use]
    pub fn new(min_delay: Duration, max_delay: Duration, max_retries: usize) -> Self {
        Self {
            min_delay,
            max_delay,
            max_retries,
            with_jitter: true,
        }
    }

    /// Set whether to use jitter.
    #[must_use]
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.with_jitter = jitter;
        self
    }

    /// Build an exponential backoff strategy from this configuration.
    #[must_use]
    pub fn backoff(&self) -> ExponentialBuilder {
        let mut builder = ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_retries);

        if self.with_jitter {
            builder = builder.with_jitter();
        }

        builder
    }
}

/// Execute one document against the transport, applying the retry policy.
///
/// Every attempt increments `requests`, so the counter reflects actual
/// API cost rather than logical queries.
pub(crate) async fn execute_with_retry(
    transport: &dyn GraphqlTransport,
    document: &str,
    variables: &Value,
    config: &RetryConfig,
    requests: &AtomicUsize,
) -> Result<Value, TransportError> {
    let mut backoff = config.backoff().build();
    loop {
        requests.fetch_add(1, Ordering::Relaxed);
        match transport.execute(document, variables.clone()).await {
            Ok(value) => return Ok(value),
            Err(TransportError::RateLimited { retry_after }) => {
                tracing::debug!(
                    wait_ms = retry_after.as_millis() as u64,
                    "rate limited, suspending before retrying the same batch"
                );
                tokio::time::sleep(retry_after).await;
            }
            Err(err @ (TransportError::Network { .. } | TransportError::Server { .. })) => {
                match backoff.next() {
                    Some(delay) => {
                        tracing::warn!(
                            error = %err,
                            delay_ms = delay.as_millis() as u64,
                            "transient transport failure, backing off"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => return Err(err),
                }
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    struct ScriptedTransport {
        responses: Mutex<Vec<Result<Value, TransportError>>>,
    }

    impl ScriptedTransport {
        fn new(responses: Vec<Result<Value, TransportError>>) -> Self {
            Self {
                responses: Mutex::new(responses),
            }
        }
    }

    #[async_trait]
    impl GraphqlTransport for ScriptedTransport {
        async fn execute(&self, _: &str, _: Value) -> Result<Value, TransportError> {
            self.responses
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(0)
        }
    }

    fn fast_config() -> RetryConfig {
        RetryConfig::new(Duration::from_millis(1), Duration::from_millis(10), 3).with_jitter(false)
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried_until_success() {
        let transport = ScriptedTransport::new(vec![
            Err(TransportError::network("reset")),
            Err(TransportError::Server { status: 503 }),
            Ok(json!({"ok": true})),
        ]);
        let requests = AtomicUsize::new(0);

        let value =
            execute_with_retry(&transport, "query {}", &json!({}), &fast_config(), &requests)
                .await
                .unwrap();
        assert_eq!(value["ok"], true);
        assert_eq!(requests.load(Ordering::Relaxed), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_are_bounded() {
        let failures = (0..10)
            .map(|_| Err(TransportError::network("down")))
            .collect();
        let transport = ScriptedTransport::new(failures);
        let requests = AtomicUsize::new(0);

        let err = execute_with_retry(&transport, "query {}", &json!({}), &fast_config(), &requests)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Network { .. }));
        // Initial attempt plus max_retries.
        assert_eq!(requests.load(Ordering::Relaxed), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_waits_do_not_consume_attempts() {
        let transport = ScriptedTransport::new(vec![
            Err(TransportError::RateLimited {
                retry_after: Duration::from_secs(30),
            }),
            Err(TransportError::RateLimited {
                retry_after: Duration::from_secs(30),
            }),
            Ok(json!(null)),
        ]);
        let requests = AtomicUsize::new(0);

        let started = tokio::time::Instant::now();
        execute_with_retry(&transport, "query {}", &json!({}), &fast_config(), &requests)
            .await
            .unwrap();
        assert!(started.elapsed() >= Duration::from_secs(60));
        assert_eq!(requests.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn unauthorized_is_not_retried() {
        let transport = ScriptedTransport::new(vec![Err(TransportError::Unauthorized)]);
        let requests = AtomicUsize::new(0);

        let err = execute_with_retry(&transport, "query {}", &json!({}), &fast_config(), &requests)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Unauthorized));
        assert_eq!(requests.load(Ordering::Relaxed), 1);
    }
}
